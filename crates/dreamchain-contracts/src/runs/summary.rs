use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::blocks::{Block, BlockStatus};
use crate::run::RunState;

/// End-of-run report handed to the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub cycles: u64,
    pub total_blocks: u64,
    pub failed_blocks: u64,
    pub last_error: Option<String>,
}

impl RunSummary {
    pub fn from_run(
        run_id: impl Into<String>,
        started_at: impl Into<String>,
        finished_at: impl Into<String>,
        state: &RunState,
        blocks: &[Block],
    ) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: started_at.into(),
            finished_at: finished_at.into(),
            cycles: state.loop_count,
            total_blocks: blocks.len() as u64,
            failed_blocks: blocks
                .iter()
                .filter(|block| block.status == BlockStatus::Error)
                .count() as u64,
            last_error: state.last_error.clone(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.last_error.is_none()
    }

    pub fn to_payload(&self, extra: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("run_id".to_string(), Value::String(self.run_id.clone()));
        payload.insert(
            "started_at".to_string(),
            Value::String(self.started_at.clone()),
        );
        payload.insert(
            "finished_at".to_string(),
            Value::String(self.finished_at.clone()),
        );
        payload.insert("cycles".to_string(), Value::Number(self.cycles.into()));
        payload.insert(
            "total_blocks".to_string(),
            Value::Number(self.total_blocks.into()),
        );
        payload.insert(
            "failed_blocks".to_string(),
            Value::Number(self.failed_blocks.into()),
        );
        payload.insert(
            "last_error".to_string(),
            self.last_error
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        if let Some(extra) = extra {
            for (key, value) in extra {
                payload.insert(key.clone(), value.clone());
            }
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::RunSummary;
    use crate::blocks::{Block, BlockKind, BlockStatus};
    use crate::run::RunState;

    #[test]
    fn summary_counts_cycles_and_failed_blocks() {
        let state = RunState {
            loop_count: 1,
            last_error: Some("description request failed (500)".to_string()),
            ..RunState::default()
        };
        let mut failed = Block::pending(BlockKind::Description, "Describing...");
        failed.status = BlockStatus::Error;
        let blocks = vec![
            Block::done(BlockKind::Image, "https://img/1.png"),
            Block::done(BlockKind::Description, "A tall lighthouse."),
            Block::done(BlockKind::Image, "https://img/2.png"),
            failed,
        ];

        let summary = RunSummary::from_run(
            "run-1",
            "2026-02-19T00:00:00+00:00",
            "2026-02-19T00:01:00+00:00",
            &state,
            &blocks,
        );
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.total_blocks, 4);
        assert_eq!(summary.failed_blocks, 1);
        assert!(!summary.succeeded());
    }

    #[test]
    fn payload_merges_extra_keys() {
        let summary = RunSummary::from_run("run-2", "a", "b", &RunState::default(), &[]);
        let mut extra = Map::new();
        extra.insert("stopped_by_user".to_string(), Value::Bool(true));
        let payload = summary.to_payload(Some(&extra));
        assert_eq!(payload["run_id"], json!("run-2"));
        assert_eq!(payload["last_error"], Value::Null);
        assert_eq!(payload["stopped_by_user"], json!(true));
    }
}
