//! Hosted abstractive summarization models.
//!
//! Two backends share the [`PrimaryModel`] trait: a Hugging Face
//! Inference-API style endpoint (BART-like models with length controls) and
//! Ollama's /api/generate. Clients are built once at startup; a backend that
//! cannot be built (or fails its optional probe) leaves the summarizer in
//! [`PrimaryModelState::Unavailable`] for the lifetime of the process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{PrimaryBackend, SummarizerConfig};

/// Fixed decoding parameters for the abstractive model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    pub max_length: u32,
    pub min_length: u32,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 150,
            min_length: 40,
            do_sample: false,
        }
    }
}

/// Outcome of one primary-model invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryResult {
    Ok(String),
    /// The model exists but cannot serve right now (e.g. still loading).
    Unavailable,
    Failed(String),
}

#[async_trait]
pub trait PrimaryModel: Send + Sync {
    fn name(&self) -> &str;

    /// Summarize `text`. Implementations must give up after `deadline`.
    async fn generate(
        &self,
        text: &str,
        params: &GenerationParams,
        deadline: Duration,
    ) -> PrimaryResult;
}

/// Process-wide primary model handle, decided once at startup.
#[derive(Clone)]
pub enum PrimaryModelState {
    Ready(Arc<dyn PrimaryModel>),
    Unavailable { reason: String },
}

impl PrimaryModelState {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Ready(model) => format!("ready ({})", model.name()),
            Self::Unavailable { reason } => format!("unavailable: {reason}"),
        }
    }
}

impl std::fmt::Debug for PrimaryModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Build the configured primary model. Never fails: problems are captured
/// as [`PrimaryModelState::Unavailable`].
pub async fn load_primary(config: &SummarizerConfig) -> PrimaryModelState {
    let model: Arc<dyn PrimaryModel> = match config.backend {
        PrimaryBackend::None => {
            info!("No primary summarization model configured, using LexRank only");
            return PrimaryModelState::unavailable("no backend configured");
        }
        PrimaryBackend::Huggingface => match HuggingFaceSummarizer::new(config) {
            Ok(m) => Arc::new(m),
            Err(e) => return load_failed(e),
        },
        PrimaryBackend::Ollama => match OllamaSummarizer::new(config) {
            Ok(m) => Arc::new(m),
            Err(e) => return load_failed(e),
        },
    };

    if config.probe_on_start {
        let probe = model
            .generate(PROBE_TEXT, &GenerationParams::default(), config.timeout())
            .await;
        match probe {
            PrimaryResult::Ok(_) => info!("Primary model {} answered startup probe", model.name()),
            PrimaryResult::Unavailable => {
                return load_failed(format!("{} unavailable during startup probe", model.name()))
            }
            PrimaryResult::Failed(e) => {
                return load_failed(format!("{} startup probe failed: {e}", model.name()))
            }
        }
    }

    info!("Primary summarization model: {}", model.name());
    PrimaryModelState::Ready(model)
}

fn load_failed(reason: String) -> PrimaryModelState {
    warn!("Primary model not loaded ({reason}). Using LexRank fallback.");
    PrimaryModelState::Unavailable { reason }
}

const PROBE_TEXT: &str = "The library opens at nine in the morning. \
    Students can borrow up to five books at a time. \
    Late returns are charged a small daily fee.";

fn build_client() -> Result<Client, String> {
    Client::builder()
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))
}

fn describe_request_error(e: &reqwest::Error, host: &str) -> String {
    if e.is_connect() {
        format!("cannot connect to {host}")
    } else if e.is_timeout() {
        "request timed out".to_string()
    } else {
        format!("request failed: {e}")
    }
}

/// Hugging Face Inference-API compatible summarization endpoint.
pub struct HuggingFaceSummarizer {
    name: String,
    url: String,
    api_token: Option<String>,
    client: Client,
}

impl HuggingFaceSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self, String> {
        Ok(Self {
            name: format!("huggingface:{}", config.model),
            url: format!("{}/models/{}", config.host.trim_end_matches('/'), config.model),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
            client: build_client()?,
        })
    }
}

#[async_trait]
impl PrimaryModel for HuggingFaceSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        text: &str,
        params: &GenerationParams,
        deadline: Duration,
    ) -> PrimaryResult {
        let body = json!({
            "inputs": text,
            "parameters": {
                "max_length": params.max_length,
                "min_length": params.min_length,
                "do_sample": params.do_sample,
            }
        });

        let mut request = self.client.post(&self.url).timeout(deadline).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let t_start = Instant::now();
        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => return PrimaryResult::Failed(describe_request_error(&e, &self.url)),
        };

        if resp.status() == StatusCode::SERVICE_UNAVAILABLE {
            warn!("{} is loading (503)", self.name);
            return PrimaryResult::Unavailable;
        }
        if !resp.status().is_success() {
            return PrimaryResult::Failed(format!("status {}", resp.status()));
        }

        match resp.json::<serde_json::Value>().await {
            Ok(data) => {
                let summary = parse_huggingface_summary(&data);
                if summary.is_empty() {
                    PrimaryResult::Failed("empty or malformed response".into())
                } else {
                    debug!(
                        "{} summarized {} chars in {:.0}ms",
                        self.name,
                        text.len(),
                        t_start.elapsed().as_secs_f64() * 1000.0
                    );
                    PrimaryResult::Ok(summary)
                }
            }
            Err(e) => PrimaryResult::Failed(format!("failed to parse response: {e}")),
        }
    }
}

/// Best output of a `[{"summary_text": ...}]` response, or empty.
fn parse_huggingface_summary(data: &serde_json::Value) -> String {
    data.get(0)
        .and_then(|first| first["summary_text"].as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

const OLLAMA_PROMPT: &str = r#"Summarize the following notes in one short paragraph of at least {min} words. Output ONLY the summary, nothing else.

Text: {text}

Summary:"#;

/// Ollama /api/generate with a summarization prompt.
pub struct OllamaSummarizer {
    name: String,
    model: String,
    host: String,
    client: Client,
}

impl OllamaSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self, String> {
        Ok(Self {
            name: format!("ollama:{}", config.model),
            model: config.model.clone(),
            host: config.host.trim_end_matches('/').to_string(),
            client: build_client()?,
        })
    }
}

#[async_trait]
impl PrimaryModel for OllamaSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        text: &str,
        params: &GenerationParams,
        deadline: Duration,
    ) -> PrimaryResult {
        let prompt = OLLAMA_PROMPT
            .replace("{min}", &params.min_length.to_string())
            .replace("{text}", text);

        let temperature = if params.do_sample { 0.7 } else { 0.0 };
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": params.max_length
            }
        });

        let url = format!("{}/api/generate", self.host);
        let resp = match self.client.post(&url).timeout(deadline).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => return PrimaryResult::Failed(describe_request_error(&e, &self.host)),
        };

        if !resp.status().is_success() {
            return PrimaryResult::Failed(format!("Ollama returned status {}", resp.status()));
        }

        match resp.json::<serde_json::Value>().await {
            Ok(data) => {
                let result = data["response"].as_str().unwrap_or("").trim().to_string();
                if result.is_empty() {
                    PrimaryResult::Failed("Ollama returned empty response".into())
                } else {
                    PrimaryResult::Ok(result)
                }
            }
            Err(e) => PrimaryResult::Failed(format!("failed to parse Ollama response: {e}")),
        }
    }
}
