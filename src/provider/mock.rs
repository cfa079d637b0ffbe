use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use super::TranslationProvider;
use crate::error::ProviderError;

const NAME: &str = "mock";

/// What the mock answers for text it has no mapping for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fallback {
    /// `"[<lang>] <text>"`
    Tagged,
    Echo,
    Fail,
}

/// Deterministic offline provider.
///
/// Answers from an exact-match table, then from its fallback rule. It can
/// also fail its first few calls with a transient error, sleep before
/// answering, and count how often it was called.
#[derive(Debug)]
pub struct MockProvider {
    mappings: HashMap<String, String>,
    fallback: Fallback,
    transient_failures: AtomicU32,
    delay: Duration,
    calls: AtomicUsize,
    available: AtomicBool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            mappings: HashMap::new(),
            fallback: Fallback::Tagged,
            transient_failures: AtomicU32::new(0),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, source: &str, translated: &str) -> Self {
        self.mappings
            .insert(source.to_string(), translated.to_string());
        self
    }

    /// Returns unmapped text unchanged.
    #[must_use]
    pub fn echo(mut self) -> Self {
        self.fallback = Fallback::Echo;
        self
    }

    /// Fails unmapped text with a permanent error.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fallback = Fallback::Fail;
        self
    }

    /// Fails the next `n` calls with a network error.
    #[must_use]
    pub fn failing_first(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `translate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::Network {
                provider: NAME.to_string(),
                message: "connection reset".to_string(),
            });
        }

        if let Some(translated) = self.mappings.get(text) {
            return Ok(translated.clone());
        }

        match self.fallback {
            Fallback::Tagged => Ok(format!("[{target_language}] {text}")),
            Fallback::Echo => Ok(text.to_string()),
            Fallback::Fail => Err(ProviderError::Http {
                provider: NAME.to_string(),
                status: 400,
                body: format!("cannot translate '{text}'"),
            }),
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mapping_then_fallback() {
        let provider = MockProvider::new().with_mapping("Sword", "劍");

        assert_eq!(provider.translate("Sword", "zh-TW").await.unwrap(), "劍");
        assert_eq!(
            provider.translate("Shield", "ja").await.unwrap(),
            "[ja] Shield"
        );
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_first_is_transient() {
        let provider = MockProvider::new().echo().failing_first(1);

        let err = provider.translate("Sword", "ja").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(provider.translate("Sword", "ja").await.unwrap(), "Sword");
    }

    #[tokio::test]
    async fn test_failing_is_permanent() {
        let provider = MockProvider::new().failing();
        let err = provider.translate("Sword", "ja").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
