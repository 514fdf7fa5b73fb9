use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::prompt::Prompt;

/// Classified failure of a single provider call. Consumed by the retry policy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Backend is cold-starting ("model is loading")
    #[error("model is loading (estimated wait {wait_hint:?})")]
    ServerBusy { wait_hint: Option<Duration> },

    /// Rate limited or server-side failure
    #[error("transient upstream failure: HTTP {status}")]
    Transient { status: u16 },

    #[error("request rejected: HTTP {status}: {detail}")]
    NonRetryable { status: u16, detail: String },

    #[error("network failure: {0}")]
    Network(String),
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::ServerBusy { .. } => "server_busy",
            ProviderError::Transient { .. } => "transient",
            ProviderError::NonRetryable { .. } => "non_retryable",
            ProviderError::Network(_) => "network",
        }
    }
}

/// Anything that can turn a prompt into text. The reading chain only talks to this seam.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

/// Common message structure for chat-style requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

/// Per-request knobs shared by every backend
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            max_tokens: 800,
            temperature: 0.7,
        }
    }
}

/// Enum-based provider implementation, one variant per wire format
#[derive(Debug, Clone)]
pub enum LLMProvider {
    OpenAI(OpenAIProvider),
    Gemini(GeminiProvider),
    HuggingFace(HuggingFaceProvider),
}

impl LLMProvider {
    pub async fn make_request(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        match self {
            LLMProvider::OpenAI(provider) => provider.make_request(prompt).await,
            LLMProvider::Gemini(provider) => provider.make_request(prompt).await,
            LLMProvider::HuggingFace(provider) => provider.make_request(prompt).await,
        }
    }

    /// Get the provider name for logging
    pub fn provider_name(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI(_) => LLMProviderType::OpenAI.name(),
            LLMProvider::Gemini(_) => LLMProviderType::Gemini.name(),
            LLMProvider::HuggingFace(_) => LLMProviderType::HuggingFace.name(),
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            LLMProvider::OpenAI(provider) => &provider.model,
            LLMProvider::Gemini(provider) => &provider.model,
            LLMProvider::HuggingFace(provider) => &provider.model,
        }
    }
}

#[async_trait]
impl GenerationBackend for LLMProvider {
    fn name(&self) -> &str {
        self.provider_name()
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        self.make_request(prompt).await
    }
}

// ============================================================================
// OpenAI chat completions
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    options: RequestOptions,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<LLMMessage>,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        options: RequestOptions,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: trim_base_url(base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string())),
            model: model.unwrap_or_else(|| "gpt-4o".to_string()),
            options,
        }
    }

    pub async fn make_request(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                LLMMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                LLMMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        log_request(LLMProviderType::OpenAI, &self.model, &self.base_url, prompt);

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body);

        let body = send(LLMProviderType::OpenAI, request, self.options.timeout).await?;
        finish(LLMProviderType::OpenAI, &body, None)
    }
}

// ============================================================================
// Gemini generateContent
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    options: RequestOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: i32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        options: RequestOptions,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: trim_base_url(
                base_url.unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            ),
            model: model.unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            options,
        }
    }

    pub async fn make_request(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.as_single_input(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.options.temperature,
                top_k: 40,
                top_p: 0.9,
                max_output_tokens: self.options.max_tokens,
            },
        };

        log_request(LLMProviderType::Gemini, &self.model, &self.base_url, prompt);

        let request = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body);

        let body = send(LLMProviderType::Gemini, request, self.options.timeout).await?;
        finish(LLMProviderType::Gemini, &body, None)
    }
}

// ============================================================================
// Hugging Face inference
// ============================================================================

#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    options: RequestOptions,
}

#[derive(Debug, Clone, Serialize)]
struct HuggingFaceRequest {
    inputs: String,
    parameters: HuggingFaceParameters,
    options: HuggingFaceOptions,
}

#[derive(Debug, Clone, Serialize)]
struct HuggingFaceParameters {
    max_new_tokens: u32,
    temperature: f32,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Clone, Serialize)]
struct HuggingFaceOptions {
    wait_for_model: bool,
}

impl HuggingFaceProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        options: RequestOptions,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: trim_base_url(
                base_url.unwrap_or_else(|| "https://api-inference.huggingface.co".to_string()),
            ),
            model: model.unwrap_or_else(|| "mistralai/Mistral-7B-Instruct-v0.3".to_string()),
            options,
        }
    }

    pub async fn make_request(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let inputs = prompt.as_single_input();
        let request_body = HuggingFaceRequest {
            inputs: inputs.clone(),
            parameters: HuggingFaceParameters {
                max_new_tokens: self.options.max_tokens,
                temperature: self.options.temperature,
                do_sample: true,
                return_full_text: false,
            },
            // Loading is handled by our own retry policy rather than a server-side wait
            options: HuggingFaceOptions {
                wait_for_model: false,
            },
        };

        log_request(LLMProviderType::HuggingFace, &self.model, &self.base_url, prompt);

        let request = self
            .client
            .post(format!("{}/models/{}", self.base_url, self.model))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body);

        let body = send(LLMProviderType::HuggingFace, request, self.options.timeout).await?;
        finish(LLMProviderType::HuggingFace, &body, Some(&inputs))
    }
}

// ============================================================================
// Shared transport and classification
// ============================================================================

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn log_request(provider: LLMProviderType, model: &str, base_url: &str, prompt: &Prompt) {
    info!(
        provider = provider.name(),
        model = %model,
        base_url = %base_url,
        prompt_length = prompt.user.len(),
        "Making LLM request"
    );
}

/// Send one request and return the raw body of a 2xx response
async fn send(
    provider: LLMProviderType,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.without_url().to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Network(e.without_url().to_string()))?;

    if !status.is_success() {
        let classified = classify_failure(status, &body);
        error!(
            provider = provider.name(),
            status = %status,
            error = %truncate(&body, 500),
            classification = classified.kind(),
            "LLM API request failed"
        );
        return Err(classified);
    }

    Ok(body)
}

fn finish(
    provider: LLMProviderType,
    body: &str,
    echoed_input: Option<&str>,
) -> Result<String, ProviderError> {
    let Some(text) = extract_text(body) else {
        debug!(provider = provider.name(), body = %truncate(body, 500), "Unrecognized response body");
        return Err(ProviderError::NonRetryable {
            status: 200,
            detail: "no extractable text in response".to_string(),
        });
    };

    let text = normalize_output(&text, echoed_input);
    info!(
        provider = provider.name(),
        response_chars = text.chars().count(),
        "Successfully received LLM response"
    );
    Ok(text)
}

#[derive(Debug, Deserialize)]
struct BusyBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    estimated_time: Option<f64>,
}

/// Map a non-2xx status (and its body) onto the retry taxonomy
pub fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        let busy = serde_json::from_str::<BusyBody>(body).ok();
        let estimated = busy
            .as_ref()
            .and_then(|b| b.estimated_time)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        let loading = busy
            .as_ref()
            .and_then(|b| b.error.as_deref())
            .is_some_and(|e| e.to_lowercase().contains("loading"))
            || body.to_lowercase().contains("loading");

        if estimated.is_some() || loading {
            return ProviderError::ServerBusy { wait_hint: estimated };
        }
    }

    match status.as_u16() {
        408 | 429 | 500..=599 => ProviderError::Transient {
            status: status.as_u16(),
        },
        code => ProviderError::NonRetryable {
            status: code,
            detail: truncate(body, 200),
        },
    }
}

// ============================================================================
// Response envelopes
// ============================================================================

/// Known response shapes, probed in declaration order
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseEnvelope {
    Choices { choices: Vec<Choice> },
    Candidates { candidates: Vec<Candidate> },
    Generations(Vec<Generation>),
    Single(Generation),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

impl ResponseEnvelope {
    fn into_text(self) -> Option<String> {
        match self {
            ResponseEnvelope::Choices { choices } => choices
                .into_iter()
                .next()
                .and_then(|c| c.message.and_then(|m| m.content).or(c.text)),
            ResponseEnvelope::Candidates { candidates } => candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|content| {
                    content
                        .parts
                        .into_iter()
                        .filter_map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                }),
            ResponseEnvelope::Generations(generations) => {
                generations.into_iter().next().map(|g| g.generated_text)
            }
            ResponseEnvelope::Single(generation) => Some(generation.generated_text),
            ResponseEnvelope::Text(text) => Some(text),
        }
    }
}

/// Pull generated text out of any supported envelope; a non-JSON body is taken as raw text
pub fn extract_text(body: &str) -> Option<String> {
    let text = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::from_value::<ResponseEnvelope>(value)
            .ok()
            .and_then(ResponseEnvelope::into_text)?,
        Err(_) => body.to_string(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").expect("valid heading regex"));
static MARKDOWN_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)").expect("valid emphasis regex"));

/// Strip an echoed prompt and stray markdown so the reading is plain text
pub fn normalize_output(text: &str, echoed_input: Option<&str>) -> String {
    let mut text = text.trim();
    if let Some(input) = echoed_input {
        if let Some(rest) = text.strip_prefix(input.trim()) {
            text = rest.trim();
        }
    }

    let text = MARKDOWN_HEADING.replace_all(text, "");
    let text = MARKDOWN_EMPHASIS.replace_all(&text, "$2");
    text.trim().to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

// ============================================================================
// Factory
// ============================================================================

pub struct LLMProviderFactory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProviderType {
    OpenAI,
    Gemini,
    HuggingFace,
}

impl LLMProviderType {
    pub fn name(&self) -> &'static str {
        match self {
            LLMProviderType::OpenAI => "OpenAI",
            LLMProviderType::Gemini => "Gemini",
            LLMProviderType::HuggingFace => "HuggingFace",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" | "chatgpt" | "gpt" => Some(LLMProviderType::OpenAI),
            "gemini" | "google" => Some(LLMProviderType::Gemini),
            "huggingface" | "hugging-face" | "hf" => Some(LLMProviderType::HuggingFace),
            _ => None,
        }
    }
}

impl LLMProviderFactory {
    pub fn create_provider(
        provider_type: LLMProviderType,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        options: RequestOptions,
    ) -> LLMProvider {
        match provider_type {
            LLMProviderType::OpenAI => {
                LLMProvider::OpenAI(OpenAIProvider::new(api_key, base_url, model, options))
            }
            LLMProviderType::Gemini => {
                LLMProvider::Gemini(GeminiProvider::new(api_key, base_url, model, options))
            }
            LLMProviderType::HuggingFace => {
                LLMProvider::HuggingFace(HuggingFaceProvider::new(api_key, base_url, model, options))
            }
        }
    }
}
