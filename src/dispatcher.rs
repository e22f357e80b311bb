//! Model dispatch with ordered fallback.
//!
//! One call walks the candidate list in order, one attempt per candidate,
//! and stops at the first non-empty completion. Failures are collected and
//! only surface as a hint inside a friendly reply; the caller always gets
//! content plus a tone.

use crate::classifier::{detect_tone, ToneLabel};
use crate::config::{AppConfig, DEFAULT_ATTEMPT_TIMEOUT_SECS};
use crate::db::{ChatMessage, Role, UserProfile};
use crate::error::CandidateError;
use crate::gemini::{default_candidates, CandidateModel, GeminiClient, GeminiContent, GeminiRole, GenerativeBackend};
use crate::logging;
use crate::prompts::{build_greeting, build_system_prompt, PROMPT_HANDOFF};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How many of the latest turns are sent as context.
pub const HISTORY_WINDOW: usize = 20;

pub const NOT_CONFIGURED_MESSAGE: &str = "⚠️ Gemini API key not configured. Set GEMINI_API_KEY in your environment to enable AI responses.";

pub const CANCELLED_MESSAGE: &str = "Request cancelled before a reply arrived.";

const RATE_LIMIT_HINT: &str = "API rate limit reached";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub content: String,
    pub tone: ToneLabel,
}

/// Terminal state of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No credential; nothing was attempted.
    NotConfigured,
    Success { model: CandidateModel, text: String },
    /// Every candidate failed; errors are in attempt order.
    AllFailed { errors: Vec<String> },
    /// Cancelled mid-way; errors from attempts that finished before that.
    Cancelled { errors: Vec<String> },
}

impl DispatchOutcome {
    /// Render the outcome for the user, pairing it with the request's tone.
    pub fn into_reply(self, tone: ToneLabel) -> AssistantReply {
        match self {
            DispatchOutcome::NotConfigured => AssistantReply {
                content: NOT_CONFIGURED_MESSAGE.to_string(),
                tone: ToneLabel::Calm,
            },
            DispatchOutcome::Success { text, .. } => AssistantReply { content: text, tone },
            DispatchOutcome::AllFailed { errors } => AssistantReply {
                content: unavailable_message(&errors),
                tone,
            },
            DispatchOutcome::Cancelled { .. } => AssistantReply {
                content: CANCELLED_MESSAGE.to_string(),
                tone,
            },
        }
    }
}

fn unavailable_message(errors: &[String]) -> String {
    let hint = match errors.first() {
        Some(first) if first.to_lowercase().contains("quota") => RATE_LIMIT_HINT,
        Some(first) => first.as_str(),
        None => "no models configured",
    };
    format!(
        "😔 I'm having trouble connecting right now. All AI models are at capacity. This usually resolves in a minute. Please try again shortly!\n\n(Technical: {})",
        hint
    )
}

/// Tone of the reply: taken from the most recent user turn, never from the model.
pub fn reply_tone(history: &[ChatMessage]) -> ToneLabel {
    let last_user = history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");
    detect_tone(last_user)
}

/// Build the provider `contents`: the persona prompt as a synthetic opening
/// exchange, then the latest turns of history.
pub fn build_contents(history: &[ChatMessage], profile: Option<&UserProfile>) -> Vec<GeminiContent> {
    let tone_preference = profile.and_then(|p| p.tone_preference);
    let system_prompt = build_system_prompt(profile, tone_preference);

    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

    let mut contents = Vec::with_capacity(recent.len() + 2);
    contents.push(GeminiContent::text(
        GeminiRole::User,
        format!("{}{}", system_prompt, PROMPT_HANDOFF),
    ));
    contents.push(GeminiContent::text(GeminiRole::Model, build_greeting(profile)));

    for msg in recent {
        let role = match msg.role {
            Role::User => GeminiRole::User,
            Role::Assistant => GeminiRole::Model,
        };
        contents.push(GeminiContent::text(role, msg.content.clone()));
    }

    contents
}

pub struct ModelDispatcher {
    backend: Arc<dyn GenerativeBackend>,
    api_key: Option<String>,
    candidates: Vec<CandidateModel>,
    attempt_timeout: Duration,
}

impl ModelDispatcher {
    pub fn new(backend: Arc<dyn GenerativeBackend>, api_key: Option<String>) -> Self {
        Self {
            backend,
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            candidates: default_candidates(),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }

    /// Dispatcher talking to the real Gemini API with the configured models.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Arc::new(GeminiClient::new()), config.api_key.clone())
            .with_candidates(config.candidates.clone())
            .with_attempt_timeout(config.attempt_timeout)
    }

    pub fn with_candidates(mut self, candidates: Vec<CandidateModel>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn candidates(&self) -> &[CandidateModel] {
        &self.candidates
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Get the assistant's reply to the latest turn in `history`.
    ///
    /// Never fails: configuration problems, provider errors and cancellation
    /// all come back as reply text.
    pub async fn send_message(
        &self,
        history: &[ChatMessage],
        profile: Option<&UserProfile>,
        cancel: &CancellationToken,
    ) -> AssistantReply {
        let tone = reply_tone(history);
        let session_id = history.last().map(|m| m.session_id.as_str());
        self.dispatch(history, profile, cancel, session_id)
            .await
            .into_reply(tone)
    }

    /// Try each candidate in order until one yields text.
    pub async fn dispatch(
        &self,
        history: &[ChatMessage],
        profile: Option<&UserProfile>,
        cancel: &CancellationToken,
        session_id: Option<&str>,
    ) -> DispatchOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            logging::log_dispatch(session_id, "No API key configured, skipping model calls");
            return DispatchOutcome::NotConfigured;
        };

        let contents = build_contents(history, profile);
        let mut errors = Vec::new();

        for model in &self.candidates {
            if cancel.is_cancelled() {
                logging::log_dispatch(session_id, "Cancelled before next candidate");
                return DispatchOutcome::Cancelled { errors };
            }

            logging::log_dispatch(session_id, &format!("Trying model: {}", model));

            let attempt = tokio::time::timeout(
                self.attempt_timeout,
                self.backend.generate(api_key, model, &contents),
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    logging::log_dispatch(session_id, &format!("Cancelled during {}", model));
                    return DispatchOutcome::Cancelled { errors };
                }
                result = attempt => result,
            };

            let failure = match result {
                Ok(Ok(text)) if !text.is_empty() => {
                    logging::log_dispatch(session_id, &format!("Success with model: {}", model));
                    return DispatchOutcome::Success {
                        model: model.clone(),
                        text,
                    };
                }
                Ok(Ok(_)) => CandidateError::EmptyText,
                Ok(Err(e)) => e,
                Err(_) => CandidateError::Timeout(self.attempt_timeout.as_millis() as u64),
            };

            let message = format!("{}: {}", model.name, failure);
            logging::log_dispatch(session_id, &format!("Model failed, {}", message));
            errors.push(message);
        }

        logging::log_error(
            session_id,
            &format!("All {} models failed: {}", self.candidates.len(), errors.join(" | ")),
        );
        DispatchOutcome::AllFailed { errors }
    }
}
