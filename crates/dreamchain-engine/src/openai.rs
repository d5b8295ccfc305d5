use std::env;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{ensure_non_empty, GenerationClient};
use crate::error::{truncate_text, EngineError, Stage};

pub const IMAGE_SIZE: &str = "1024x1024";
pub const DESCRIPTION_MAX_TOKENS: u64 = 600;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    api_base: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: normalize_api_base(&api_base.into()),
            api_key: api_key
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            http: reqwest::Client::new(),
        }
    }

    /// Reads `OPENAI_API_KEY` (or `OPENAI_API_KEY_BACKUP`) and
    /// `OPENAI_API_BASE` (or `OPENAI_BASE_URL`).
    pub fn from_env() -> Self {
        Self::new(
            first_non_empty_env(&["OPENAI_API_BASE", "OPENAI_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            first_non_empty_env(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"]),
        )
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self, stage: Stage) -> Result<&str, EngineError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| EngineError::MissingCredential {
                stage,
                detail: "OPENAI_API_KEY or OPENAI_API_KEY_BACKUP not set".to_string(),
            })
    }

    async fn post_json(
        &self,
        stage: Stage,
        endpoint: &str,
        payload: &Value,
    ) -> Result<Value, EngineError> {
        let api_key = self.api_key(stage)?;
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| EngineError::transport(stage, &err))?;
        response_json_or_error(stage, response).await
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_image(&self, prompt: &str, model: &str) -> Result<String, EngineError> {
        ensure_non_empty(Stage::Image, "prompt", prompt)?;
        let endpoint = format!("{}/images/generations", self.api_base);
        tracing::debug!(%endpoint, model, "requesting image");
        let response = self
            .post_json(Stage::Image, &endpoint, &image_request_payload(prompt, model))
            .await?;
        extract_image_reference(&response)
    }

    async fn describe_image(
        &self,
        image_ref: &str,
        instruction: &str,
        model: &str,
    ) -> Result<String, EngineError> {
        ensure_non_empty(Stage::Description, "image reference", image_ref)?;
        ensure_non_empty(Stage::Description, "instruction", instruction)?;
        let endpoint = format!("{}/chat/completions", self.api_base);
        tracing::debug!(%endpoint, model, "requesting description");
        let response = self
            .post_json(
                Stage::Description,
                &endpoint,
                &description_request_payload(image_ref, instruction, model),
            )
            .await?;
        extract_description(&response)
    }
}

fn image_request_payload(prompt: &str, model: &str) -> Value {
    json!({
        "model": model,
        "prompt": prompt,
        "n": 1,
        "size": IMAGE_SIZE,
    })
}

fn description_request_payload(image_ref: &str, instruction: &str, model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": instruction},
                {"type": "image_url", "image_url": {"url": image_ref}},
            ],
        }],
        "max_tokens": DESCRIPTION_MAX_TOKENS,
    })
}

/// `data[0].url`, or a data URL built from `data[0].b64_json` for models
/// that only return inline bytes.
fn extract_image_reference(response: &Value) -> Result<String, EngineError> {
    let first = response
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .ok_or_else(|| EngineError::invalid_response(Stage::Image, "response has no data[0]"))?;

    if let Some(url) = first
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Ok(url.to_string());
    }
    if let Some(b64) = first
        .get("b64_json")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
    {
        return Ok(format!("data:image/png;base64,{b64}"));
    }
    Err(EngineError::invalid_response(
        Stage::Image,
        "data[0] has neither url nor b64_json",
    ))
}

fn extract_description(response: &Value) -> Result<String, EngineError> {
    let content = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .ok_or_else(|| {
            EngineError::invalid_response(
                Stage::Description,
                "response has no choices[0].message.content",
            )
        })?;

    let text = match content {
        Value::String(text) => text.trim().to_string(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<&str>>()
            .join("\n"),
        _ => String::new(),
    };
    if text.is_empty() {
        return Err(EngineError::invalid_response(
            Stage::Description,
            "description text is empty",
        ));
    }
    Ok(text)
}

async fn response_json_or_error(
    stage: Stage,
    response: reqwest::Response,
) -> Result<Value, EngineError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| EngineError::transport(stage, &err))?;
    if !status.is_success() {
        return Err(EngineError::Remote {
            stage,
            status: status.as_u16(),
            body: truncate_text(&body, 512),
        });
    }
    serde_json::from_str(&body)
        .map_err(|err| EngineError::invalid_response(stage, format!("invalid JSON payload: {err}")))
}

fn normalize_api_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_BASE.to_string();
    }
    let mut base = trimmed.to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/v1");
        }
    }
    base
}

fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}
