//! Iteration engine for the generate -> describe -> generate image loop.
//!
//! [`IterationEngine`] drives one run at a time against any
//! [`GenerationClient`]; [`OpenAiClient`] talks to the real service and
//! [`DryrunClient`] produces deterministic offline results.

mod bus;
mod client;
mod dryrun;
mod engine;
mod error;
mod openai;

pub use bus::EventBus;
pub use client::{default_client_registry, ClientRegistry, GenerationClient};
pub use dryrun::DryrunClient;
pub use engine::{EngineSettings, EngineSnapshot, IterationEngine, RunHandle, DEFAULT_CYCLE_DELAY};
pub use error::{EngineError, Stage};
pub use openai::{OpenAiClient, DESCRIPTION_MAX_TOKENS, IMAGE_SIZE};
