//! OpenAI Chat Completions Client
//!
//! Provider B. Direct HTTP with a bearer credential; only image attachments
//! are forwarded, as `data:` URLs.

use super::prompts;
use super::provider::{
    AnalysisProvider, AnalysisRequest, AnalysisStage, Location, ProviderKind, SynthesisInput,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI API URL
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const PROVIDER: ProviderKind = ProviderKind::OpenAi;

/// Sampling parameters for long-form analysis
const ANALYSIS_TEMPERATURE: f32 = 0.2;
const ANALYSIS_MAX_TOKENS: u32 = 4000;

/// Verification is a short statement
const VERIFY_TEMPERATURE: f32 = 0.1;
const VERIFY_MAX_TOKENS: u32 = 200;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_url: String,
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_url: OPENAI_API_URL.to_string(),
            model: "gpt-4-turbo".to_string(),
        }
    }
}

/// OpenAI adapter
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: Option<String>, config: OpenAiConfig) -> Self {
        Self {
            client,
            api_key,
            config,
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingCredential { provider: PROVIDER })
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;

        tracing::debug!(model = %request.model, max_tokens = request.max_tokens, "Sending OpenAI request");

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transport {
            provider: PROVIDER,
            message: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "OpenAI API error");
            return Err(ProviderError::Http {
                provider: PROVIDER,
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        parse_response(&body)
    }

    fn request(
        &self,
        system: String,
        user: Vec<ContentPart>,
        temperature: f32,
        max_tokens: u32,
    ) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: vec![ContentPart::Text { text: system }],
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    async fn chat(
        &self,
        prompt: &str,
        location: Option<Location>,
    ) -> Result<String, ProviderError> {
        let request = self.request(
            prompts::analyst_system_prompt(),
            user_content(prompts::build_chat_prompt(prompt, location), None),
            ANALYSIS_TEMPERATURE,
            ANALYSIS_MAX_TOKENS,
        );
        self.complete(&request).await
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, ProviderError> {
        let system = match request.stage {
            AnalysisStage::Report => prompts::analyst_system_prompt(),
            AnalysisStage::Preliminary => prompts::preliminary_system_prompt(),
        };
        let body = self.request(
            system,
            user_content(prompts::build_analysis_prompt(request), Some(request)),
            ANALYSIS_TEMPERATURE,
            ANALYSIS_MAX_TOKENS,
        );
        self.complete(&body).await
    }

    async fn consult(
        &self,
        request: &AnalysisRequest,
        preliminary: &str,
    ) -> Result<String, ProviderError> {
        let body = self.request(
            prompts::CONSULTANT_SYSTEM_PROMPT.to_string(),
            user_content(
                prompts::build_consultation_prompt(request, preliminary),
                Some(request),
            ),
            ANALYSIS_TEMPERATURE,
            ANALYSIS_MAX_TOKENS,
        );
        self.complete(&body).await
    }

    async fn synthesize(
        &self,
        request: &AnalysisRequest,
        input: &SynthesisInput,
    ) -> Result<String, ProviderError> {
        let body = self.request(
            prompts::synthesis_system_prompt(),
            user_content(prompts::build_synthesis_prompt(request, input), Some(request)),
            ANALYSIS_TEMPERATURE,
            ANALYSIS_MAX_TOKENS,
        );
        self.complete(&body).await
    }

    async fn verify(
        &self,
        request: &AnalysisRequest,
        report: &str,
    ) -> Result<String, ProviderError> {
        // The verifier sees the file listing, not the file contents
        let body = self.request(
            prompts::VERIFIER_SYSTEM_PROMPT.to_string(),
            user_content(prompts::build_verification_prompt(request, report), None),
            VERIFY_TEMPERATURE,
            VERIFY_MAX_TOKENS,
        );
        self.complete(&body).await
    }
}

/// Text part followed by one image part per attached image
fn user_content(text: String, request: Option<&AnalysisRequest>) -> Vec<ContentPart> {
    let mut parts = vec![ContentPart::Text { text }];
    if let Some(request) = request {
        parts.extend(request.images().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrlContent {
                url: image.data_url(),
            },
        }));
    }
    parts
}

// API request/response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrlContent },
}

#[derive(Debug, Serialize)]
struct ImageUrlContent {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn parse_response(body: &str) -> Result<String, ProviderError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(ProviderError::EmptyResponse { provider: PROVIDER })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::FilePayload;
    use crate::case::FileType;

    fn request_with(files: Vec<FilePayload>) -> AnalysisRequest {
        AnalysisRequest {
            prompt: "Review the lease".to_string(),
            files,
            stage: AnalysisStage::Report,
            deep: false,
            location: None,
        }
    }

    fn file(name: &str, mime: &str, file_type: FileType) -> FilePayload {
        FilePayload {
            name: name.to_string(),
            mime_type: mime.to_string(),
            file_type,
            base64: "QUJD".to_string(),
        }
    }

    #[test]
    fn test_only_images_are_forwarded() {
        let request = request_with(vec![
            file("scan.png", "image/png", FileType::Image),
            file("lease.pdf", "application/pdf", FileType::Document),
        ]);
        let parts = user_content("text".to_string(), Some(&request));
        let json = serde_json::to_value(&parts).unwrap();

        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[1]["type"], "image_url");
        assert_eq!(json[1]["image_url"]["url"], "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_request_carries_sampling_parameters() {
        let client = OpenAiClient::new(Client::new(), None, OpenAiConfig::default());
        let request = client.request(
            "sys".to_string(),
            user_content("u".to_string(), None),
            VERIFY_TEMPERATURE,
            VERIFY_MAX_TOKENS,
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4-turbo");
        assert_eq!(json["max_tokens"], 200);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"][0]["text"], "u");
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Triple Verified  "}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Triple Verified");

        assert!(matches!(
            parse_response(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(ProviderError::EmptyResponse { .. })
        ));
        assert!(matches!(
            parse_response("<html>"),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
    }

    #[tokio::test]
    async fn test_missing_key_is_typed() {
        let client = OpenAiClient::new(Client::new(), None, OpenAiConfig::default());
        let err = client
            .verify(&request_with(vec![]), "report")
            .await
            .unwrap_err();
        assert!(err.is_missing_credential());
    }
}
