use crate::blocks::BlockKind;

/// Rejected run configuration. Raised by `start` before any cycle begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid loop bound '{0}': expected 'infinite' or a positive integer")]
    InvalidLoopBound(String),

    #[error("initial prompt must not be empty")]
    EmptyPrompt,

    #[error("description prompt template must not be empty")]
    EmptyTemplate,

    #[error("model '{model}' is not a supported {capability} model")]
    UnsupportedModel { model: String, capability: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("no pending {0} block to resolve")]
    NoPendingBlock(BlockKind),
}
