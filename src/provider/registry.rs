use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{GeminiProvider, GoogleProvider, MockProvider, OpenAiProvider, TranslationProvider};
use crate::config::ProviderConfig;

/// Builds a provider from its `[providers.<name>]` table.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn TranslationProvider>> + Send + Sync>;

/// Provider constructors keyed by the name used in `[translation] provider`.
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("google", |config| {
            Ok(Arc::new(GoogleProvider::new(config)?) as Arc<dyn TranslationProvider>)
        });
        registry.register("openai", |config| {
            Ok(Arc::new(OpenAiProvider::new(config)?) as Arc<dyn TranslationProvider>)
        });
        registry.register("gemini", |config| {
            Ok(Arc::new(GeminiProvider::new(config)?) as Arc<dyn TranslationProvider>)
        });
        registry.register("mock", |_| {
            Ok(Arc::new(MockProvider::new()) as Arc<dyn TranslationProvider>)
        });
        registry
    }
}

impl ProviderRegistry {
    /// A registry with no providers.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Adds or replaces the factory for `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn TranslationProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Registers an already built provider instance under `name`.
    pub fn register_instance(&mut self, name: &str, provider: Arc<dyn TranslationProvider>) {
        self.register(name, move |_| Ok(Arc::clone(&provider)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str, config: &ProviderConfig) -> Result<Arc<dyn TranslationProvider>> {
        let Some(factory) = self.factories.get(name) else {
            bail!(
                "Provider '{name}' not found\n\n\
                 Available providers:\n  \
                 - {}\n\n\
                 Run 'tlp providers' for details.",
                self.names().collect::<Vec<_>>().join("\n  - ")
            );
        };
        factory(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers() {
        let registry = ProviderRegistry::default();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["gemini", "google", "mock", "openai"]);
    }

    #[test]
    fn test_create_known_provider() {
        let registry = ProviderRegistry::default();
        let provider = registry.create("mock", &ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "mock");
        assert!(provider.is_available());
    }

    #[test]
    fn test_unknown_provider_lists_alternatives() {
        let registry = ProviderRegistry::default();
        let err = registry
            .create("deepl", &ProviderConfig::default())
            .err()
            .unwrap();
        let message = err.to_string();
        assert!(message.contains("Provider 'deepl' not found"));
        assert!(message.contains("- google"));
    }

    #[test]
    fn test_register_instance_shares_provider() {
        let mock = Arc::new(MockProvider::new().with_mapping("Sword", "劍"));
        let mut registry = ProviderRegistry::empty();
        registry.register_instance("custom", mock.clone());

        let created = registry.create("custom", &ProviderConfig::default()).unwrap();
        assert_eq!(created.name(), "mock");
        assert!(!registry.contains("google"));
    }
}
