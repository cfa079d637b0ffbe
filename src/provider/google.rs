use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{TranslationProvider, check_status, http_client};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const NAME: &str = "google";
const DEFAULT_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// The keyless `translate_a/single` endpoint.
pub struct GoogleProvider {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl GoogleProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let timeout = config.timeout();
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout,
        })
    }

    fn request_url(&self, text: &str, target_language: &str) -> Result<Url, ProviderError> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_language),
                ("dt", "t"),
                ("q", text),
            ],
        )
        .map_err(|e| ProviderError::Unavailable {
            provider: NAME.to_string(),
            message: format!("invalid endpoint '{}': {e}", self.endpoint),
        })
    }
}

#[async_trait]
impl TranslationProvider for GoogleProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        let url = self.request_url(text, target_language)?;
        debug!(provider = NAME, target_language, "Sending translation request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e, self.timeout))?;
        let body: Value = check_status(NAME, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e, self.timeout))?;

        parse_response(&body)
    }

    fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

/// Joins the translated segments of a `[[["segment", "source", ...], ...], ...]` body.
fn parse_response(body: &Value) -> Result<String, ProviderError> {
    let parse_error = |message: &str| ProviderError::Parse {
        provider: NAME.to_string(),
        message: message.to_string(),
    };

    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| parse_error("missing segment list"))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if translated.is_empty() {
        Err(parse_error("no translated segments"))
    } else {
        Ok(translated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_joins_segments() {
        let body = json!([
            [
                ["光之劍。", "Sword of Light.", null, null, 10],
                ["攻擊力 +5", " Damage +5", null, null, 10]
            ],
            null,
            "en"
        ]);
        assert_eq!(parse_response(&body).unwrap(), "光之劍。攻擊力 +5");
    }

    #[test]
    fn test_parse_response_rejects_unexpected_shape() {
        assert!(matches!(
            parse_response(&json!({"error": "quota"})),
            Err(ProviderError::Parse { .. })
        ));
        assert!(matches!(
            parse_response(&json!([[]])),
            Err(ProviderError::Parse { .. })
        ));
    }

    #[test]
    fn test_request_url_encodes_text() {
        let provider = GoogleProvider::new(&ProviderConfig::default()).unwrap();
        let url = provider.request_url("Red & Blue", "zh-TW").unwrap();

        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("tl".to_string(), "zh-TW".to_string())));
        assert!(query.contains(&("q".to_string(), "Red & Blue".to_string())));
    }

    #[test]
    fn test_invalid_endpoint_is_unavailable_error() {
        let provider = GoogleProvider::new(&ProviderConfig {
            endpoint: Some("not a url".to_string()),
            ..ProviderConfig::default()
        })
        .unwrap();
        assert!(matches!(
            provider.request_url("x", "ja"),
            Err(ProviderError::Unavailable { .. })
        ));
    }
}
