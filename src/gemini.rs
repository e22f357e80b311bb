use crate::error::CandidateError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const GEMINI_API_HOST: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT_SECS: u64 = 60; // upper bound even when the dispatcher allows longer
const CONNECT_TIMEOUT_SECS: u64 = 10;

// Model constants
pub const GEMINI_2_0_FLASH: &str = "gemini-2.0-flash";
pub const GEMINI_1_5_FLASH: &str = "gemini-1.5-flash";
pub const GEMINI_1_5_FLASH_8B: &str = "gemini-1.5-flash-8b";

/// One model identifier plus the API version it is served under.
///
/// Each candidate draws on its own quota, which is why the dispatcher can
/// fall through from one to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateModel {
    pub name: String,
    pub version: String,
}

impl CandidateModel {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// Parse `model@version`, e.g. `gemini-1.5-flash@v1`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (name, version) = spec.trim().split_once('@')?;
        let (name, version) = (name.trim(), version.trim());
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(name, version))
    }
}

impl fmt::Display for CandidateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Priority order used when no override is configured.
pub fn default_candidates() -> Vec<CandidateModel> {
    vec![
        CandidateModel::new(GEMINI_2_0_FLASH, "v1beta"),
        CandidateModel::new(GEMINI_1_5_FLASH, "v1"),
        CandidateModel::new(GEMINI_1_5_FLASH_8B, "v1"),
    ]
}

// ============ Request Types ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: GeminiRole,
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    pub fn text(role: GeminiRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![GeminiPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: "BLOCK_ONLY_HIGH",
    })
    .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [GeminiContent],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

// ============ Response Types ============

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: Option<String>,
}

/// Pull the first candidate's first text part out of a success body.
pub fn parse_completion(body: &str) -> Result<String, CandidateError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| CandidateError::Malformed(e.to_string()))?;

    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|text| !text.is_empty())
        .ok_or(CandidateError::EmptyText)
}

/// Turn a non-success response into a candidate error, preferring the
/// provider's own message over the bare status.
pub fn parse_error(status: u16, body: &str) -> CandidateError {
    let message = serde_json::from_str::<GeminiError>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status));

    CandidateError::Http { status, message }
}

// ============ Transport ============

/// Anything that can run one `generateContent` call against one model.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        model: &CandidateModel,
        contents: &[GeminiContent],
    ) -> Result<String, CandidateError>;
}

pub struct GeminiClient {
    client: Client,
    host: String,
    generation_config: GenerationConfig,
}

impl GeminiClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            host: GEMINI_API_HOST.to_string(),
            generation_config: GenerationConfig::default(),
        }
    }

    /// Point the client at a different host, e.g. a local proxy.
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self, model: &CandidateModel, api_key: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent?key={}",
            self.host, model.version, model.name, api_key
        )
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(
        &self,
        api_key: &str,
        model: &CandidateModel,
        contents: &[GeminiContent],
    ) -> Result<String, CandidateError> {
        let request = GenerateContentRequest {
            contents,
            generation_config: self.generation_config.clone(),
            safety_settings: default_safety_settings(),
        };

        let response = self
            .client
            .post(self.endpoint(model, api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| CandidateError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CandidateError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &body));
        }

        parse_completion(&body)
    }
}
