//! Shared data model for the dreamchain image loop: blocks and their
//! lifecycle, run configuration and state, prompt templates, the model
//! registry and the event envelope published by the engine.

pub mod blocks;
pub mod debug_log;
pub mod error;
pub mod events;
pub mod models;
pub mod prompts;
pub mod run;
pub mod runs;

pub use blocks::{Block, BlockKind, BlockOutcome, BlockStatus, HistoryLog};
pub use debug_log::{DebugLog, DEBUG_LOG_CAPACITY};
pub use error::{ConfigError, HistoryError};
pub use run::{EngineStatus, LoopBound, RunConfig, RunPhase, RunState};
