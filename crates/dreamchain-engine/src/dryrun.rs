use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::client::{ensure_non_empty, GenerationClient};
use crate::error::{EngineError, Stage};

const DRYRUN_SCHEME: &str = "dryrun://image/";

/// Offline client: deterministic image references and descriptions derived
/// from the request text, with an optional simulated latency.
#[derive(Debug, Clone, Default)]
pub struct DryrunClient {
    latency: Duration,
}

impl DryrunClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl GenerationClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn generate_image(&self, prompt: &str, model: &str) -> Result<String, EngineError> {
        ensure_non_empty(Stage::Image, "prompt", prompt)?;
        self.simulate_latency().await;
        let (r, g, b) = color_from_prompt(prompt, model);
        Ok(format!(
            "{DRYRUN_SCHEME}{}?color=%23{r:02x}{g:02x}{b:02x}",
            short_id(prompt, model)
        ))
    }

    async fn describe_image(
        &self,
        image_ref: &str,
        instruction: &str,
        model: &str,
    ) -> Result<String, EngineError> {
        ensure_non_empty(Stage::Description, "image reference", image_ref)?;
        ensure_non_empty(Stage::Description, "instruction", instruction)?;
        self.simulate_latency().await;
        let frame = image_ref
            .strip_prefix(DRYRUN_SCHEME)
            .and_then(|rest| rest.split('?').next())
            .unwrap_or("external");
        Ok(format!(
            "Frame {frame} ({model}): a quiet scene holds still under a single color wash. \
             Following \"{}\", the frame dissolves into the next.",
            instruction.trim()
        ))
    }
}

fn color_from_prompt(prompt: &str, model: &str) -> (u8, u8, u8) {
    let digest = digest(prompt, model);
    (digest[0], digest[1], digest[2])
}

fn short_id(prompt: &str, model: &str) -> String {
    hex::encode(&digest(prompt, model)[..4])
}

fn digest(prompt: &str, model: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(model.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::DryrunClient;
    use crate::client::GenerationClient;
    use crate::error::EngineError;

    #[tokio::test]
    async fn image_reference_is_stable_per_prompt() -> anyhow::Result<()> {
        let client = DryrunClient::new();
        let first = client.generate_image("a lighthouse", "dryrun-image-1").await?;
        let again = client.generate_image("a lighthouse", "dryrun-image-1").await?;
        let other = client.generate_image("a harbor", "dryrun-image-1").await?;

        assert!(first.starts_with("dryrun://image/"));
        assert!(first.contains("?color=%23"));
        assert_eq!(first, again);
        assert_ne!(first, other);
        Ok(())
    }

    #[tokio::test]
    async fn description_names_the_frame_and_instruction() -> anyhow::Result<()> {
        let client = DryrunClient::new();
        let image = client.generate_image("a lighthouse", "dryrun-image-1").await?;
        let frame = image
            .trim_start_matches("dryrun://image/")
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();

        let text = client
            .describe_image(&image, "Describe it briefly.", "dryrun-vision-1")
            .await?;
        assert!(text.starts_with(&format!("Frame {frame} (dryrun-vision-1)")));
        assert!(text.contains("Describe it briefly."));
        Ok(())
    }

    #[tokio::test]
    async fn blank_inputs_are_rejected() {
        let client = DryrunClient::new();
        assert!(matches!(
            client.generate_image(" ", "dryrun-image-1").await,
            Err(EngineError::InvalidRequest { .. })
        ));
        assert!(matches!(
            client.describe_image("", "Describe.", "dryrun-vision-1").await,
            Err(EngineError::InvalidRequest { .. })
        ));
    }
}
