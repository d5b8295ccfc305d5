use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Prompt,
    Image,
    Description,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Image => "image",
            Self::Description => "description",
        }
    }

    /// Placeholder content shown while a block of this kind is pending.
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Prompt => "Composing...",
            Self::Image => "Generating...",
            Self::Description => "Describing...",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a block. Only `Pending -> Done` and `Pending -> Error`
/// are legal; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Pending,
    Done,
    Error,
}

impl BlockStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub content: String,
    pub status: BlockStatus,
}

impl Block {
    pub fn pending(kind: BlockKind, placeholder: impl Into<String>) -> Self {
        Self {
            kind,
            content: placeholder.into(),
            status: BlockStatus::Pending,
        }
    }

    pub fn done(kind: BlockKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            status: BlockStatus::Done,
        }
    }
}

/// How a pending block settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Done(String),
    /// Status flips to `Error`; the placeholder content is kept.
    Error,
}

/// Ordered, append-only block history for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    blocks: Vec<Block>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Appends a pending block and returns its index.
    pub fn append_pending(&mut self, kind: BlockKind, placeholder: impl Into<String>) -> usize {
        self.push(Block::pending(kind, placeholder))
    }

    /// Appends a block that is already settled, e.g. the prompt record of
    /// the annotated flow.
    pub fn append_done(&mut self, kind: BlockKind, content: impl Into<String>) -> usize {
        self.push(Block::done(kind, content))
    }

    /// Settles the most recently appended pending block of `kind`.
    ///
    /// Scans backwards so the caller never has to carry a block handle
    /// across an await point. Calling this twice without a new
    /// `append_pending` in between fails on the second call.
    pub fn resolve_last_pending(
        &mut self,
        kind: BlockKind,
        outcome: BlockOutcome,
    ) -> Result<usize, HistoryError> {
        let index = self
            .last_pending_index(kind)
            .ok_or(HistoryError::NoPendingBlock(kind))?;
        let block = &mut self.blocks[index];
        match outcome {
            BlockOutcome::Done(content) => {
                block.content = content;
                block.status = BlockStatus::Done;
            }
            BlockOutcome::Error => block.status = BlockStatus::Error,
        }
        Ok(index)
    }

    pub fn last_pending_index(&self, kind: BlockKind) -> Option<usize> {
        self.blocks
            .iter()
            .rposition(|block| block.kind == kind && block.status == BlockStatus::Pending)
    }

    pub fn has_pending(&self) -> bool {
        self.blocks
            .iter()
            .any(|block| block.status == BlockStatus::Pending)
    }

    pub fn reset(&mut self) {
        self.blocks.clear();
    }

    fn push(&mut self, block: Block) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockKind, BlockOutcome, BlockStatus, HistoryLog};
    use crate::error::HistoryError;

    #[test]
    fn append_then_resolve_marks_block_done() -> anyhow::Result<()> {
        let mut history = HistoryLog::new();
        let index = history.append_pending(BlockKind::Image, "Generating...");
        assert_eq!(history.blocks()[index].status, BlockStatus::Pending);

        let resolved = history.resolve_last_pending(
            BlockKind::Image,
            BlockOutcome::Done("https://img/1.png".to_string()),
        )?;
        assert_eq!(resolved, index);
        assert_eq!(history.blocks()[0].content, "https://img/1.png");
        assert_eq!(history.blocks()[0].status, BlockStatus::Done);
        Ok(())
    }

    #[test]
    fn error_resolution_keeps_placeholder() -> anyhow::Result<()> {
        let mut history = HistoryLog::new();
        history.append_pending(BlockKind::Description, "Describing...");
        history.resolve_last_pending(BlockKind::Description, BlockOutcome::Error)?;

        let block = &history.blocks()[0];
        assert_eq!(block.status, BlockStatus::Error);
        assert_eq!(block.content, "Describing...");
        Ok(())
    }

    #[test]
    fn resolve_targets_most_recent_pending_of_kind() -> anyhow::Result<()> {
        let mut history = HistoryLog::new();
        history.append_pending(BlockKind::Image, "first");
        history.resolve_last_pending(BlockKind::Image, BlockOutcome::Done("a".to_string()))?;
        history.append_pending(BlockKind::Description, "Describing...");
        history.append_pending(BlockKind::Image, "second");

        let index =
            history.resolve_last_pending(BlockKind::Image, BlockOutcome::Done("b".to_string()))?;
        assert_eq!(index, 2);
        assert_eq!(history.blocks()[0].content, "a");
        assert_eq!(history.blocks()[1].status, BlockStatus::Pending);
        Ok(())
    }

    #[test]
    fn second_resolution_without_append_is_rejected() -> anyhow::Result<()> {
        let mut history = HistoryLog::new();
        history.append_pending(BlockKind::Image, "Generating...");
        history.resolve_last_pending(BlockKind::Image, BlockOutcome::Done("x".to_string()))?;

        let err = history
            .resolve_last_pending(BlockKind::Image, BlockOutcome::Error)
            .unwrap_err();
        assert_eq!(err, HistoryError::NoPendingBlock(BlockKind::Image));
        assert_eq!(history.blocks()[0].status, BlockStatus::Done);
        assert_eq!(history.blocks()[0].content, "x");
        Ok(())
    }

    #[test]
    fn resolving_unknown_kind_on_empty_history_fails() {
        let mut history = HistoryLog::new();
        assert!(history
            .resolve_last_pending(BlockKind::Description, BlockOutcome::Error)
            .is_err());
        assert!(history.is_empty());
    }

    #[test]
    fn reset_clears_all_blocks() {
        let mut history = HistoryLog::new();
        history.append_done(BlockKind::Prompt, "a lighthouse");
        history.append_pending(BlockKind::Image, "Generating...");
        assert!(history.has_pending());

        history.reset();
        assert!(history.is_empty());
        assert!(!history.has_pending());
    }

    #[test]
    fn block_kinds_serialize_as_snake_case() -> anyhow::Result<()> {
        let mut history = HistoryLog::new();
        history.append_pending(BlockKind::Description, "Describing...");
        let value = serde_json::to_value(&history.blocks()[0])?;
        assert_eq!(value["kind"], "description");
        assert_eq!(value["status"], "pending");
        Ok(())
    }
}
