//! AI assist client.
//!
//! Three request kinds (summary, next steps, explain term), each with one
//! active [`AssistRequest`]. A new request of the same kind supersedes the
//! old one: every request takes the next per-kind sequence number and a
//! response is applied only if its number is still the latest. Requests are
//! never retried, timed out or cancelled.

pub mod gemini;
pub mod prompts;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AssistError, ErrorKind};
use crate::research::Accuracy;

pub use self::gemini::GeminiClient;

/// Something that turns a prompt into generated text.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AssistError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistKind {
    Summary,
    NextSteps,
    ExplainTerm,
}

impl AssistKind {
    pub const ALL: [AssistKind; 3] = [Self::Summary, Self::NextSteps, Self::ExplainTerm];

    fn index(self) -> usize {
        match self {
            Self::Summary => 0,
            Self::NextSteps => 1,
            Self::ExplainTerm => 2,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Summary => "Research Summary",
            Self::NextSteps => "Suggested Next Steps",
            Self::ExplainTerm => "Medical Term Explanation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistInputs {
    Summary {
        topic: String,
        accuracy: Accuracy,
        result_hash: String,
    },
    NextSteps {
        topic: String,
        accuracy: Accuracy,
    },
    ExplainTerm {
        term: String,
    },
}

impl AssistInputs {
    pub fn kind(&self) -> AssistKind {
        match self {
            Self::Summary { .. } => AssistKind::Summary,
            Self::NextSteps { .. } => AssistKind::NextSteps,
            Self::ExplainTerm { .. } => AssistKind::ExplainTerm,
        }
    }

    fn prompt(&self) -> String {
        match self {
            Self::Summary {
                topic,
                accuracy,
                result_hash,
            } => prompts::summary(topic, *accuracy, result_hash),
            Self::NextSteps { topic, accuracy } => prompts::next_steps(topic, *accuracy),
            Self::ExplainTerm { term } => prompts::explain_term(term),
        }
    }
}

/// Snapshot of one request slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistRequest {
    pub kind: AssistKind,
    pub inputs: Option<AssistInputs>,
    pub status: AssistStatus,
    /// Generated text when ready, the fixed fallback string when failed.
    pub result_text: Option<String>,
    pub error: Option<ErrorKind>,
    pub seq: u64,
}

impl AssistRequest {
    fn idle(kind: AssistKind) -> Self {
        Self {
            kind,
            inputs: None,
            status: AssistStatus::Idle,
            result_text: None,
            error: None,
            seq: 0,
        }
    }
}

/// What happened to a request once its response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistOutcome {
    Ready(String),
    Failed {
        error: ErrorKind,
        fallback: &'static str,
        reason: String,
    },
    /// A newer request of the same kind was issued; this response was dropped.
    Superseded,
}

pub struct AssistClient {
    backend: Arc<dyn GenerativeBackend>,
    slots: Mutex<[AssistRequest; 3]>,
}

impl AssistClient {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            slots: Mutex::new(AssistKind::ALL.map(AssistRequest::idle)),
        }
    }

    fn slots(&self) -> MutexGuard<'_, [AssistRequest; 3]> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self, kind: AssistKind) -> AssistRequest {
        self.slots()[kind.index()].clone()
    }

    pub async fn request_summary(
        &self,
        topic: &str,
        accuracy: Accuracy,
        result_hash: &str,
    ) -> AssistOutcome {
        self.run(AssistInputs::Summary {
            topic: topic.to_string(),
            accuracy,
            result_hash: result_hash.to_string(),
        })
        .await
    }

    pub async fn request_next_steps(&self, topic: &str, accuracy: Accuracy) -> AssistOutcome {
        self.run(AssistInputs::NextSteps {
            topic: topic.to_string(),
            accuracy,
        })
        .await
    }

    /// A blank term fails immediately; no state changes and nothing is sent.
    pub async fn request_explanation(&self, term: &str) -> Result<AssistOutcome, AssistError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(AssistError::MissingField {
                field: "medical term",
            });
        }
        Ok(self
            .run(AssistInputs::ExplainTerm {
                term: term.to_string(),
            })
            .await)
    }

    /// Return every slot to idle. Responses still in flight become stale.
    pub fn reset(&self) {
        let mut slots = self.slots();
        for slot in slots.iter_mut() {
            let seq = slot.seq + 1;
            *slot = AssistRequest {
                seq,
                ..AssistRequest::idle(slot.kind)
            };
        }
    }

    async fn run(&self, inputs: AssistInputs) -> AssistOutcome {
        let kind = inputs.kind();
        let prompt = inputs.prompt();
        let seq = {
            let mut slots = self.slots();
            let slot = &mut slots[kind.index()];
            slot.seq += 1;
            slot.inputs = Some(inputs);
            slot.status = AssistStatus::Loading;
            slot.result_text = None;
            slot.error = None;
            slot.seq
        };
        tracing::debug!(?kind, seq, "Assist request issued");

        let result = self.backend.generate(&prompt).await;

        let mut slots = self.slots();
        let slot = &mut slots[kind.index()];
        if slot.seq != seq {
            tracing::debug!(?kind, seq, latest = slot.seq, "Discarding superseded assist response");
            return AssistOutcome::Superseded;
        }

        match result {
            Ok(text) => {
                slot.status = AssistStatus::Ready;
                slot.result_text = Some(text.clone());
                AssistOutcome::Ready(text)
            }
            Err(e) => {
                let error = e.kind();
                let fallback = match error {
                    ErrorKind::UnexpectedResponseShape => prompts::unexpected_response_fallback(kind),
                    _ => prompts::network_failure_fallback(kind),
                };
                tracing::warn!(?kind, seq, "Assist request failed: {}", e);
                slot.status = AssistStatus::Failed;
                slot.result_text = Some(fallback.to_string());
                slot.error = Some(error);
                AssistOutcome::Failed {
                    error,
                    fallback,
                    reason: e.to_string(),
                }
            }
        }
    }
}
