use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::{ModelRegistry, IMAGE_CAPABILITY, VISION_CAPABILITY};
use crate::prompts::DEFAULT_DESCRIPTION_TEMPLATE;

pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// How many full cycles a run may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LoopBound {
    #[default]
    Infinite,
    Count(NonZeroU64),
}

impl LoopBound {
    pub fn count(value: u64) -> Result<Self, ConfigError> {
        NonZeroU64::new(value)
            .map(Self::Count)
            .ok_or_else(|| ConfigError::InvalidLoopBound(value.to_string()))
    }

    /// True while another cycle may begin after `completed` cycles.
    pub fn allows(self, completed: u64) -> bool {
        match self {
            Self::Infinite => true,
            Self::Count(limit) => completed < limit.get(),
        }
    }

    pub fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl fmt::Display for LoopBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => f.write_str("infinite"),
            Self::Count(limit) => write!(f, "{limit}"),
        }
    }
}

impl FromStr for LoopBound {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("infinite") || trimmed == "∞" {
            return Ok(Self::Infinite);
        }
        trimmed
            .parse::<u64>()
            .ok()
            .and_then(NonZeroU64::new)
            .map(Self::Count)
            .ok_or_else(|| ConfigError::InvalidLoopBound(raw.to_string()))
    }
}

impl From<LoopBound> for String {
    fn from(value: LoopBound) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for LoopBound {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Immutable per-run snapshot of the user's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub prompt: String,
    pub style: String,
    pub loops: LoopBound,
    pub text_model: String,
    pub image_model: String,
    pub description_template: String,
    /// Record each image prompt as its own `Prompt` block before the image.
    #[serde(default)]
    pub record_prompts: bool,
}

impl RunConfig {
    pub fn new(prompt: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: style.into(),
            loops: LoopBound::Infinite,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            description_template: DEFAULT_DESCRIPTION_TEMPLATE.to_string(),
            record_prompts: false,
        }
    }

    pub fn with_loops(mut self, loops: LoopBound) -> Self {
        self.loops = loops;
        self
    }

    pub fn with_models(
        mut self,
        text_model: impl Into<String>,
        image_model: impl Into<String>,
    ) -> Self {
        self.text_model = text_model.into();
        self.image_model = image_model.into();
        self
    }

    pub fn with_description_template(mut self, template: impl Into<String>) -> Self {
        self.description_template = template.into();
        self
    }

    pub fn with_recorded_prompts(mut self, record_prompts: bool) -> Self {
        self.record_prompts = record_prompts;
        self
    }

    /// Checks everything that can be known before the first remote call.
    pub fn validate(&self, registry: &ModelRegistry) -> Result<(), ConfigError> {
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::EmptyPrompt);
        }
        if self.description_template.trim().is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }
        if registry.ensure(&self.image_model, IMAGE_CAPABILITY).is_none() {
            return Err(ConfigError::UnsupportedModel {
                model: self.image_model.clone(),
                capability: IMAGE_CAPABILITY.to_string(),
            });
        }
        if registry.ensure(&self.text_model, VISION_CAPABILITY).is_none() {
            return Err(ConfigError::UnsupportedModel {
                model: self.text_model.clone(),
                capability: VISION_CAPABILITY.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    #[default]
    Idle,
    Running,
    /// Stop requested; the in-flight step is still settling.
    Stopping,
    Stopped,
}

/// Step of the current cycle while the engine is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    GeneratingFirstImage,
    GeneratingNextImage,
    Describing,
}

/// Observable state of the active (or last) run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunState {
    pub status: EngineStatus,
    pub running: bool,
    /// A remote call for the current step is outstanding.
    pub awaiting: bool,
    /// Completed full cycles.
    pub loop_count: u64,
    pub phase: Option<RunPhase>,
    pub last_error: Option<String>,
}

impl RunState {
    pub fn started() -> Self {
        Self {
            status: EngineStatus::Running,
            running: true,
            ..Self::default()
        }
    }
}
