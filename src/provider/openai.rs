use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;

use super::sse::sse_to_text_stream;
use super::{TranslationProvider, check_status, http_client};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::language::language_name;

const NAME: &str = "openai";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub const SYSTEM_PROMPT_TEMPLATE: &str = "You are a translator for short in-game text. \
     Translate the following text to {target_language}. \
     Output only the translated text without any explanations. \
     Keep placeholders such as [S1] and the currency tokens EB, EL and E exactly as they are.";

#[allow(clippy::literal_string_with_formatting_args)]
pub fn build_system_prompt(target_language: &str) -> String {
    // {target_language} is a placeholder for string replacement, not a format argument
    let name = language_name(target_language).unwrap_or(target_language);
    SYSTEM_PROMPT_TEMPLATE.replace("{target_language}", name)
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Cow<'a, str>,
}

/// Any OpenAI-compatible `/v1/chat/completions` endpoint, streamed over SSE.
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiProvider {
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
            "{}/v1/chat/completions",
            self.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TranslationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        let chat_request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: Cow::Owned(build_system_prompt(target_language)),
                },
                Message {
                    role: "user",
                    content: Cow::Borrowed(text),
                },
            ],
            stream: true,
        };

        let mut http_request = self.client.post(self.url()).json(&chat_request);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        debug!(provider = NAME, model = %self.model, target_language, "Sending translation request");
        let response = http_request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &e, self.timeout))?;
        let response = check_status(NAME, response).await?;

        let mut stream = std::pin::pin!(sse_to_text_stream(response.bytes_stream()));
        let mut translated = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::from_reqwest(NAME, &e, self.timeout))?;
            translated.push_str(&chunk);
        }

        let translated = translated.trim();
        if translated.is_empty() {
            return Err(ProviderError::Parse {
                provider: NAME.to_string(),
                message: "stream ended without content".to_string(),
            });
        }
        Ok(translated.to_string())
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() || self.endpoint != DEFAULT_ENDPOINT
    }
}
