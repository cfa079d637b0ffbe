//! Translation back-ends and the registry that builds them from config.

mod gemini;
mod google;
mod mock;
mod openai;
mod registry;
mod sse;

use async_trait::async_trait;

pub use gemini::GeminiProvider;
pub use google::GoogleProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use registry::{ProviderFactory, ProviderRegistry};

use crate::error::ProviderError;

/// An external service able to translate a single text fragment.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Registry name, used in logs and errors.
    fn name(&self) -> &str;

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError>;

    /// Whether the provider has what it needs (credentials, model) to be called.
    fn is_available(&self) -> bool;
}

/// Builds the HTTP client every network provider uses.
fn http_client(timeout: std::time::Duration) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Turns a non-success response into [`ProviderError::Http`].
async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    })
}
