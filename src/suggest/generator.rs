//! Suggestion backends and the composed, total generator.
//!
//! Backend selection happens once, at construction, from configuration
//! presence. The composed [`SuggestionGenerator`] has no failure path:
//! whatever the generative backend does (time out, 5xx, emit prose),
//! the heuristic fallback produces the suggestion.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GenerativeConfig;
use crate::error::GenerativeError;
use crate::suggest::heuristic::HeuristicBackend;
use crate::suggest::model::SuggestionDraft;
use crate::suggest::parse;
use crate::suggest::prompt::{self, TriageContext};

/// Max tokens requested per triage completion (kept tight; one call per
/// trigger event).
const COMPLETION_MAX_TOKENS: u32 = 512;

/// Temperature for triage (deterministic-ish).
const COMPLETION_TEMPERATURE: f32 = 0.1;

/// A strategy producing a suggestion draft from ticket context.
#[async_trait]
pub trait SuggestionBackend: Send + Sync {
    /// Short label for logging and audit detail.
    fn name(&self) -> &'static str;

    /// Produce a draft. Errors are recovered by the composed generator.
    async fn draft(&self, context: &TriageContext) -> Result<SuggestionDraft, GenerativeError>;
}

// ── Generative backend ──────────────────────────────────────────────

/// Chat-completion response shape (OpenAI-compatible endpoints).
#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// HTTP-backed generative backend with a bounded timeout.
pub struct GenerativeBackend {
    http: reqwest::Client,
    config: GenerativeConfig,
}

impl GenerativeBackend {
    pub fn new(config: GenerativeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Issue one completion request. The whole round trip (connect, send,
    /// read body) sits under the configured timeout.
    async fn complete(&self, prompt_text: &str) -> Result<String, GenerativeError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": COMPLETION_TEMPERATURE,
            "max_tokens": COMPLETION_MAX_TOKENS,
            "messages": [
                { "role": "system", "content": prompt::system_prompt() },
                { "role": "user", "content": prompt_text },
            ],
        });

        let round_trip = async {
            let response = self
                .http
                .post(&self.config.endpoint)
                .bearer_auth(self.config.api_key.expose_secret())
                .json(&body)
                .send()
                .await
                .map_err(|e| GenerativeError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GenerativeError::Status(status.as_u16()));
            }

            let completion: ChatCompletion = response
                .json()
                .await
                .map_err(|e| GenerativeError::Unparsable(format!("response body: {e}")))?;

            completion
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| GenerativeError::Unparsable("empty choices".into()))
        };

        tokio::time::timeout(self.config.timeout, round_trip)
            .await
            .map_err(|_| GenerativeError::Timeout(self.config.timeout))?
    }
}

#[async_trait]
impl SuggestionBackend for GenerativeBackend {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn draft(&self, context: &TriageContext) -> Result<SuggestionDraft, GenerativeError> {
        let prompt_text = prompt::build_prompt(context);
        let completion = self.complete(&prompt_text).await?;
        let parsed = parse::parse_completion(&completion)?;

        Ok(SuggestionDraft {
            category: parsed.category,
            priority: parsed.priority,
            risk: parsed.risk,
            confidence: parsed.confidence,
            input_tokens: prompt::estimate_tokens(&prompt_text),
            output_tokens: prompt::estimate_tokens(&completion),
            prompt_hash: prompt::prompt_hash(&prompt_text),
            draft_response: parsed.draft_response,
        })
    }
}

// ── Composed generator ──────────────────────────────────────────────

/// The generator ticket workflows actually call. Total: never errors.
pub struct SuggestionGenerator {
    backend: Option<Arc<dyn SuggestionBackend>>,
    fallback: HeuristicBackend,
}

impl SuggestionGenerator {
    /// Select the backend from configuration presence: a configured
    /// generative backend is tried first, otherwise heuristic-only.
    pub fn from_config(config: Option<GenerativeConfig>) -> Self {
        match config {
            Some(config) => {
                debug!(model = %config.model, "Suggestion generator using generative backend");
                Self::with_backend(Arc::new(GenerativeBackend::new(config)))
            }
            None => {
                debug!("Suggestion generator running heuristic-only");
                Self::heuristic_only()
            }
        }
    }

    pub fn with_backend(backend: Arc<dyn SuggestionBackend>) -> Self {
        Self {
            backend: Some(backend),
            fallback: HeuristicBackend::new(),
        }
    }

    pub fn heuristic_only() -> Self {
        Self {
            backend: None,
            fallback: HeuristicBackend::new(),
        }
    }

    /// Which backend name will appear in audit detail for a success path.
    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("heuristic", |b| b.name())
    }

    /// Produce a suggestion draft. Every generative failure mode falls
    /// through to the deterministic fallback.
    pub async fn generate(&self, context: &TriageContext) -> SuggestionDraft {
        if let Some(backend) = &self.backend {
            match backend.draft(context).await {
                Ok(draft) => {
                    debug!(
                        backend = backend.name(),
                        category = %draft.category,
                        confidence = draft.confidence,
                        "Suggestion drafted"
                    );
                    return draft;
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        error = %e,
                        "Generative backend failed, using heuristic fallback"
                    );
                }
            }
        }
        self.fallback.draft_for(context)
    }
}
