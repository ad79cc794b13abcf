//! Gemini API Client
//!
//! Provider A. Talks to the `generateContent` REST endpoint and sends every
//! attached file as an inline base64 part.

use super::prompts;
use super::provider::{
    AnalysisProvider, AnalysisRequest, AnalysisStage, FilePayload, Location, ProviderKind,
    SynthesisInput,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

const PROVIDER: ProviderKind = ProviderKind::Gemini;

/// Model selection and endpoint for the Gemini adapter
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    /// Used for chat, verification and non-deep analysis
    pub fast_model: String,
    /// Used for complex-mode analysis and synthesis
    pub deep_model: String,
    pub thinking_budget: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: GEMINI_API_URL.to_string(),
            fast_model: "gemini-2.5-flash".to_string(),
            deep_model: "gemini-2.5-pro".to_string(),
            thinking_budget: 32_768,
        }
    }
}

/// Gemini adapter
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: Option<String>, config: GeminiConfig) -> Self {
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

    fn model_for(&self, deep: bool) -> &str {
        if deep {
            &self.config.deep_model
        } else {
            &self.config.fast_model
        }
    }

    fn thinking_for(&self, deep: bool) -> Option<u32> {
        deep.then_some(self.config.thinking_budget)
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        tracing::debug!(model = model, parts = request.contents[0].parts.len(), "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
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
            return Err(ProviderError::Http {
                provider: PROVIDER,
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        parse_response(&body)
    }
}

#[async_trait]
impl AnalysisProvider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    async fn chat(
        &self,
        prompt: &str,
        location: Option<Location>,
    ) -> Result<String, ProviderError> {
        let request = build_request(
            prompts::analyst_system_prompt(),
            prompts::build_chat_prompt(prompt, location),
            &[],
            None,
        );
        self.generate(&self.config.fast_model, &request).await
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, ProviderError> {
        let system = match request.stage {
            AnalysisStage::Report => prompts::analyst_system_prompt(),
            AnalysisStage::Preliminary => prompts::preliminary_system_prompt(),
        };
        let body = build_request(
            system,
            prompts::build_analysis_prompt(request),
            &request.files,
            self.thinking_for(request.deep),
        );
        self.generate(self.model_for(request.deep), &body).await
    }

    async fn consult(
        &self,
        request: &AnalysisRequest,
        preliminary: &str,
    ) -> Result<String, ProviderError> {
        let body = build_request(
            prompts::CONSULTANT_SYSTEM_PROMPT.to_string(),
            prompts::build_consultation_prompt(request, preliminary),
            &request.files,
            None,
        );
        self.generate(&self.config.fast_model, &body).await
    }

    async fn synthesize(
        &self,
        request: &AnalysisRequest,
        input: &SynthesisInput,
    ) -> Result<String, ProviderError> {
        let body = build_request(
            prompts::synthesis_system_prompt(),
            prompts::build_synthesis_prompt(request, input),
            &request.files,
            self.thinking_for(request.deep),
        );
        self.generate(self.model_for(request.deep), &body).await
    }

    async fn verify(
        &self,
        request: &AnalysisRequest,
        report: &str,
    ) -> Result<String, ProviderError> {
        // Verification always uses the fast model
        let body = build_request(
            prompts::VERIFIER_SYSTEM_PROMPT.to_string(),
            prompts::build_verification_prompt(request, report),
            &request.files,
            None,
        );
        self.generate(&self.config.fast_model, &body).await
    }
}

// API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// Thought summaries are never part of the answer
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn build_request(
    system: String,
    user_prompt: String,
    files: &[FilePayload],
    thinking_budget: Option<u32>,
) -> GenerateContentRequest {
    let mut parts = Vec::with_capacity(files.len() + 1);
    parts.push(Part::Text { text: user_prompt });
    parts.extend(files.iter().map(|f| Part::Inline {
        inline_data: InlineData {
            mime_type: f.mime_type.clone(),
            data: f.base64.clone(),
        },
    }));

    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part::Text { text: system }],
        },
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: thinking_budget.map(|budget| GenerationConfig {
            thinking_config: ThinkingConfig {
                thinking_budget: budget,
            },
        }),
    }
}

/// Concatenate the answer text of the first candidate
fn parse_response(body: &str) -> Result<String, ProviderError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(ProviderError::MalformedResponse {
            provider: PROVIDER,
            message: format!("prompt blocked: {}", reason),
        });
    }

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::EmptyResponse { provider: PROVIDER });
    }
    Ok(text.to_string())
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::FileType;

    fn payload() -> FilePayload {
        FilePayload {
            name: "photo.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            file_type: FileType::Image,
            base64: "/9j/4AAQ".to_string(),
        }
    }

    #[test]
    fn test_request_shape_with_inline_files() {
        let request = build_request(
            "system".to_string(),
            "user".to_string(),
            &[payload()],
            Some(32_768),
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "system");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "user");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(
            json["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            32_768
        );
    }

    #[test]
    fn test_request_without_thinking_omits_config() {
        let request = build_request("s".to_string(), "u".to_string(), &[], None);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("generationConfig").is_none());
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_parse_response_skips_thoughts() {
        let body = r###"{"candidates":[{"content":{"parts":[
            {"text":"thinking...","thought":true},
            {"text":"## Summary\n"},
            {"text":"All consistent."}
        ]}}]}"###;
        assert_eq!(parse_response(body).unwrap(), "## Summary\nAll consistent.");
    }

    #[test]
    fn test_parse_response_errors() {
        assert!(matches!(
            parse_response(r#"{"candidates":[]}"#),
            Err(ProviderError::EmptyResponse { .. })
        ));
        assert!(matches!(
            parse_response("not json"),
            Err(ProviderError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_error_message_prefers_api_detail() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "API key not valid");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn test_missing_key_is_typed() {
        let client = GeminiClient::new(Client::new(), None, GeminiConfig::default());
        let err = client.chat("hello", None).await.unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential { provider: PROVIDER });
    }

    #[test]
    fn test_model_selection() {
        let client = GeminiClient::new(
            Client::new(),
            Some("key".to_string()),
            GeminiConfig::default(),
        );
        assert_eq!(client.model_for(true), "gemini-2.5-pro");
        assert_eq!(client.model_for(false), "gemini-2.5-flash");
        assert_eq!(client.thinking_for(false), None);
    }
}
