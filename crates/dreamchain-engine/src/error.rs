use std::fmt;

use dreamchain_contracts::{ConfigError, HistoryError};
use serde::{Deserialize, Serialize};

/// Which remote step of a cycle an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Image,
    Description,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Description => "description",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a run can end early. All variants are terminal for the run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The service answered with a non-success status.
    #[error("{stage} request failed ({status}): {body}")]
    Remote {
        stage: Stage,
        status: u16,
        body: String,
    },

    /// The request never produced a status (DNS, TLS, connection reset).
    #[error("{stage} request failed: {message}")]
    Transport { stage: Stage, message: String },

    #[error("{stage} response was malformed: {detail}")]
    InvalidResponse { stage: Stage, detail: String },

    #[error("{stage} request rejected before sending: {detail}")]
    InvalidRequest { stage: Stage, detail: String },

    #[error("{stage} request needs an API key: {detail}")]
    MissingCredential { stage: Stage, detail: String },

    #[error("cycle {cycle} started without a description from the previous cycle")]
    Sequence { cycle: u64 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("no generation client registered for provider '{0}'")]
    NoClient(String),

    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("run task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Remote { stage, .. }
            | Self::Transport { stage, .. }
            | Self::InvalidResponse { stage, .. }
            | Self::InvalidRequest { stage, .. }
            | Self::MissingCredential { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn transport(stage: Stage, err: &(dyn std::error::Error + 'static)) -> Self {
        Self::Transport {
            stage,
            message: error_chain_text(err, 512),
        }
    }

    pub(crate) fn invalid_response(stage: Stage, detail: impl Into<String>) -> Self {
        Self::InvalidResponse {
            stage,
            detail: detail.into(),
        }
    }
}

fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
