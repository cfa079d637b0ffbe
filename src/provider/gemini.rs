use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::openai::build_system_prompt;
use super::{TranslationProvider, check_status, http_client};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const NAME: &str = "gemini";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Google's `generateContent` REST API.
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let timeout = config.timeout();
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: config.get_api_key(),
            timeout,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl TranslationProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable {
                provider: NAME.to_string(),
                message: "no API key; set api_key_env under [providers.gemini]".to_string(),
            })?;

        let prompt = build_system_prompt(target_language);
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: [Part { text: &prompt }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text }],
            }],
        };

        debug!(provider = NAME, model = %self.model, target_language, "Sending translation request");
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e, self.timeout))?;
        let body: GenerateResponse = check_status(NAME, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e, self.timeout))?;

        first_candidate_text(body)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

fn first_candidate_text(body: GenerateResponse) -> Result<String, ProviderError> {
    let text: String = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        Err(ProviderError::Parse {
            provider: NAME.to_string(),
            message: "response had no candidate text".to_string(),
        })
    } else {
        Ok(text.to_string())
    }
}
