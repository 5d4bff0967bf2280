use super::{Completion, CompletionProvider, GenerationOptions};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::LayoutReader;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Instruction for the vision extraction path
const LAYOUT_PROMPT: &str = "Extract all text content from this document. \
Preserve the reading order. Render tables as rows of labeled values and \
keep form fields as 'label: value' lines. Output plain text only.";

/// OpenAI-compatible `/chat/completions` backend.
///
/// Doubles as the vision-capable layout reader for PDF extraction; both
/// paths speak the same wire shape.
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    vision_model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: Option<u32>,
}

impl HttpCompletionProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider.timeout_secs))
            .build()
            .map_err(|e| Error::Generation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.provider.base_url().trim_end_matches('/').to_string(),
            api_key: config.provider_api_key()?,
            vision_model: config.generation.model.clone(),
        })
    }

    #[cfg(test)]
    pub fn for_endpoint(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: "test-key".to_string(),
            vision_model: "test-vision".to_string(),
        }
    }

    async fn chat(&self, body: serde_json::Value) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("Completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "Completion provider returned {}: {}",
                status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("Invalid completion response: {}", e)))
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        options: &GenerationOptions,
    ) -> Result<Completion> {
        debug!(model = %options.model, "Requesting completion");

        let body = json!({
            "model": options.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message }
            ],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        let parsed = self.chat(body).await?;
        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| Error::Generation("Provider returned no completion".to_string()))?;

        Ok(Completion {
            text,
            tokens_used: parsed.usage.and_then(|u| u.total_tokens),
            model: parsed.model.unwrap_or_else(|| options.model.clone()),
        })
    }
}

#[async_trait]
impl LayoutReader for HttpCompletionProvider {
    async fn read_layout(&self, bytes: &[u8], mime: &str) -> Result<String> {
        let data_url = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));

        let body = json!({
            "model": self.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": LAYOUT_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "temperature": 0.0,
        });

        let parsed = self
            .chat(body)
            .await
            .map_err(|e| Error::Extraction(e.to_string()))?;
        parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| Error::Extraction("Vision model returned no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "test-model".to_string(),
            temperature: 0.7,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_complete_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-key"))
            .and(body_partial_json(json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "You get 25 days." } }],
                "model": "test-model",
                "usage": { "prompt_tokens": 80, "completion_tokens": 6, "total_tokens": 86 }
            })))
            .mount(&server)
            .await;

        let provider = HttpCompletionProvider::for_endpoint(&server.uri());
        let completion = provider
            .complete("You are a helpful assistant.", "How many leave days?", &options())
            .await
            .unwrap();

        assert_eq!(completion.text, "You get 25 days.");
        assert_eq!(completion.tokens_used, Some(86));
        assert_eq!(completion.model, "test-model");
    }

    #[tokio::test]
    async fn test_error_status_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = HttpCompletionProvider::for_endpoint(&server.uri());
        let err = provider
            .complete("sys", "user", &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let provider = HttpCompletionProvider::for_endpoint(&server.uri());
        let err = provider
            .complete("sys", "user", &options())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no completion"));
    }

    #[tokio::test]
    async fn test_layout_reader_sends_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Name: Ann\nDays: 25" } }]
            })))
            .mount(&server)
            .await;

        let provider = HttpCompletionProvider::for_endpoint(&server.uri());
        let text = provider
            .read_layout(b"%PDF-1.4", "application/pdf")
            .await
            .unwrap();
        assert!(text.contains("Days: 25"));
    }
}
