use indexmap::IndexMap;

pub const IMAGE_CAPABILITY: &str = "image";
pub const VISION_CAPABILITY: &str = "vision";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }

    pub fn provider_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|model| model.provider.as_str())
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    insert("gpt-4o", "openai", &["text", VISION_CAPABILITY]);
    insert("gpt-4-vision-preview", "openai", &["text", VISION_CAPABILITY]);
    insert("gpt-4o-mini", "openai", &["text", VISION_CAPABILITY]);
    insert("dall-e-3", "openai", &[IMAGE_CAPABILITY]);
    insert("dall-e-2", "openai", &[IMAGE_CAPABILITY]);
    insert("gpt-image-1", "openai", &[IMAGE_CAPABILITY]);
    insert("dryrun-vision-1", "dryrun", &["text", VISION_CAPABILITY]);
    insert("dryrun-image-1", "dryrun", &[IMAGE_CAPABILITY]);

    map
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{ModelRegistry, ModelSpec, IMAGE_CAPABILITY, VISION_CAPABILITY};

    #[test]
    fn default_registry_covers_both_capabilities() {
        let registry = ModelRegistry::default();
        let image_models: Vec<String> = registry
            .by_capability(IMAGE_CAPABILITY)
            .into_iter()
            .map(|model| model.name)
            .collect();
        assert_eq!(image_models[0], "dall-e-3");
        assert!(image_models.contains(&"dryrun-image-1".to_string()));
        assert!(registry.ensure("gpt-4o", VISION_CAPABILITY).is_some());
        assert!(registry.ensure("gpt-4o", IMAGE_CAPABILITY).is_none());
        assert_eq!(registry.provider_of("dryrun-vision-1"), Some("dryrun"));
    }

    #[test]
    fn custom_registry_replaces_defaults() {
        let mut models = IndexMap::new();
        models.insert(
            "local-image".to_string(),
            ModelSpec {
                name: "local-image".to_string(),
                provider: "dryrun".to_string(),
                capabilities: vec![IMAGE_CAPABILITY.to_string()],
            },
        );
        let registry = ModelRegistry::new(Some(models));
        assert_eq!(registry.list().count(), 1);
        assert!(registry.get("dall-e-3").is_none());
        assert!(registry.ensure("local-image", IMAGE_CAPABILITY).is_some());
    }
}
