use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{OracleConfig, OracleProviderType};
use crate::error::{PipelineError, Result};
use crate::http;

/// An external vision model that judges a photo.
///
/// Implementations return the model's raw text reply. They are asked for JSON
/// but callers must cope with anything.
pub trait VisionOracle: Send + Sync {
    fn analyze_image(&self, prompt: &str, image: &[u8], mime_type: &str) -> Result<String>;

    /// Get the provider name for display
    fn provider_name(&self) -> &'static str;
}

fn oracle_error(provider: &str, err: ureq::Error) -> PipelineError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            PipelineError::OracleUnavailable(format!(
                "{} returned HTTP {}: {}",
                provider,
                code,
                body.trim()
            ))
        }
        ureq::Error::Transport(t) => {
            PipelineError::OracleUnavailable(format!("{} request failed: {}", provider, t))
        }
    }
}

// ============================================================================
// Google Gemini provider
// ============================================================================

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            endpoint: GEMINI_ENDPOINT.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Option<&str>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        self
    }

    fn build_request(prompt: &str, image: &[u8], mime_type: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: prompt.to_string(),
                    },
                    GeminiPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: mime_type.to_string(),
                            data: BASE64.encode(image),
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        }
    }
}

impl VisionOracle for GeminiProvider {
    fn analyze_image(&self, prompt: &str, image: &[u8], mime_type: &str) -> Result<String> {
        let request = Self::build_request(prompt, image, mime_type);
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        let response = http::agent(self.timeout)
            .post(&url)
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", &self.api_key)
            .send_json(&request)
            .map_err(|e| oracle_error(self.provider_name(), e))?;

        let gemini_response: GeminiResponse = response.into_json().map_err(|e| {
            PipelineError::OracleUnavailable(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text: String = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PipelineError::OracleUnavailable(
                "No response from Gemini".to_string(),
            ));
        }
        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "Gemini"
    }
}

// ============================================================================
// OpenAI-compatible provider (works with LM Studio, OpenAI, and compatible APIs)
// ============================================================================

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

pub struct OpenAICompatibleProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
    response_format: OpenAIResponseFormat,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: Vec<OpenAIContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum OpenAIContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

impl OpenAICompatibleProvider {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            timeout,
        }
    }
}

impl VisionOracle for OpenAICompatibleProvider {
    fn analyze_image(&self, prompt: &str, image: &[u8], mime_type: &str) -> Result<String> {
        let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(image));

        let request = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: vec![
                    OpenAIContentPart::Text {
                        text: prompt.to_string(),
                    },
                    OpenAIContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 800,
            temperature: 0.2,
            response_format: OpenAIResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let url = format!("{}/chat/completions", self.endpoint);
        let mut req = http::agent(self.timeout)
            .post(&url)
            .set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| oracle_error(self.provider_name(), e))?;

        let chat_response: OpenAIChatResponse = response.into_json().map_err(|e| {
            PipelineError::OracleUnavailable(format!("Failed to parse LLM response: {}", e))
        })?;

        chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PipelineError::OracleUnavailable("No response from LLM".to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Build the configured oracle.
///
/// Returns `None` when a provider that needs a credential has none; analysis
/// is then disabled rather than failing.
pub fn create_oracle(config: &OracleConfig) -> Option<Box<dyn VisionOracle>> {
    let timeout = http::timeout_from_secs(config.timeout_secs);
    let api_key = config.api_key.as_deref().filter(|k| !k.is_empty());

    match config.provider {
        OracleProviderType::Gemini => {
            let api_key = api_key?;
            Some(Box::new(
                GeminiProvider::new(api_key, config.model_name(), timeout)
                    .with_endpoint(config.endpoint.as_deref()),
            ))
        }
        OracleProviderType::OpenAI => {
            let endpoint = config.endpoint.as_deref().unwrap_or(OPENAI_ENDPOINT);
            Some(Box::new(OpenAICompatibleProvider::new(
                endpoint,
                config.model_name(),
                api_key,
                timeout,
            )))
        }
    }
}
