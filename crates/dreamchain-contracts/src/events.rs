use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::blocks::Block;
use crate::run::{RunConfig, RunState};

/// One engine mutation, as seen by a subscriber.
///
/// Serialized as a single compact JSON object with `type`, `run_id` and
/// `ts` alongside the variant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted { config: RunConfig },
    BlockAppended { index: usize, block: Block },
    BlockResolved { index: usize, block: Block },
    LogLine { line: String },
    StateChanged { state: RunState },
    RunFinished { state: RunState },
}

impl RunEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::BlockAppended { .. } => "block_appended",
            Self::BlockResolved { .. } => "block_resolved",
            Self::LogLine { .. } => "log_line",
            Self::StateChanged { .. } => "state_changed",
            Self::RunFinished { .. } => "run_finished",
        }
    }
}

impl RunEvent {
    pub fn new(run_id: impl Into<String>, kind: RunEventKind) -> Self {
        Self {
            run_id: run_id.into(),
            ts: now_utc_iso(),
            kind,
        }
    }

    pub fn to_json_line(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
