use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::dryrun::DryrunClient;
use crate::error::{EngineError, Stage};
use crate::openai::OpenAiClient;

/// The two remote operations a cycle needs.
///
/// Each call is exactly one round trip with no retry; the first failure is
/// returned as-is.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Provider name, matched against `ModelSpec::provider`.
    fn name(&self) -> &str;

    /// Synthesizes one image and returns an opaque reference (a URL).
    async fn generate_image(&self, prompt: &str, model: &str) -> Result<String, EngineError>;

    /// Describes the referenced image following `instruction`.
    async fn describe_image(
        &self,
        image_ref: &str,
        instruction: &str,
        model: &str,
    ) -> Result<String, EngineError>;
}

#[derive(Default, Clone)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Arc<dyn GenerationClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: GenerationClient + 'static>(&mut self, client: C) {
        self.register_shared(Arc::new(client));
    }

    pub fn register_shared(&mut self, client: Arc<dyn GenerationClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn GenerationClient>> {
        self.clients.get(provider).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}

/// OpenAI (credentials from the environment) plus the offline dryrun client.
pub fn default_client_registry() -> ClientRegistry {
    let mut clients = ClientRegistry::new();
    clients.register(OpenAiClient::from_env());
    clients.register(DryrunClient::new());
    clients
}

pub(crate) fn ensure_non_empty(stage: Stage, field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidRequest {
            stage,
            detail: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{default_client_registry, ensure_non_empty, ClientRegistry};
    use crate::dryrun::DryrunClient;
    use crate::error::{EngineError, Stage};

    #[test]
    fn default_registry_includes_openai_and_dryrun() {
        let registry = default_client_registry();
        assert_eq!(registry.names(), vec!["dryrun", "openai"]);
        assert!(registry.get("openai").is_some());
        assert!(registry.get("stability").is_none());
    }

    #[test]
    fn register_replaces_client_with_same_name() {
        let mut registry = ClientRegistry::new();
        registry.register(DryrunClient::new());
        registry.register(DryrunClient::new());
        assert_eq!(registry.names().len(), 1);
    }

    #[test]
    fn empty_fields_are_rejected_with_stage() {
        let err = ensure_non_empty(Stage::Image, "prompt", "  ").unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidRequest {
                stage: Stage::Image,
                ..
            }
        ));
        assert!(ensure_non_empty(Stage::Image, "prompt", "a boat").is_ok());
    }
}
