use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::prompts::DEFAULT_DESCRIPTION_TEMPLATE;

const TEMPLATE_KEY: &str = "description_template";

/// Persists the description-prompt template between sessions.
///
/// The file is a small JSON object; only the template key is owned here
/// and other keys on disk are preserved on write.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored template, if one was saved and is not blank.
    pub fn stored(&self) -> Option<String> {
        read_json_object(&self.path)?
            .get(TEMPLATE_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn load(&self) -> String {
        self.stored()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION_TEMPLATE.to_string())
    }

    pub fn save(&self, template: &str) -> anyhow::Result<()> {
        let trimmed = template.trim();
        if trimmed.is_empty() {
            anyhow::bail!("description template must not be empty");
        }
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if on_disk.get(TEMPLATE_KEY).and_then(Value::as_str) == Some(trimmed) {
            return Ok(());
        }
        on_disk.insert(TEMPLATE_KEY.to_string(), Value::String(trimmed.to_string()));
        write_json_object(&self.path, &on_disk)
    }

    pub fn reset(&self) -> anyhow::Result<()> {
        let Some(mut on_disk) = read_json_object(&self.path) else {
            return Ok(());
        };
        if on_disk.remove(TEMPLATE_KEY).is_none() {
            return Ok(());
        }
        write_json_object(&self.path, &on_disk)
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
