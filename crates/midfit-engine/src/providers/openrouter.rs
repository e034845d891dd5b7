use std::time::Duration;

use anyhow::{bail, Context, Result};
use midfit_contracts::data_uri::parse_data_uri;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use tracing::warn;

use super::response_json_or_error;
use crate::capability::{ContentPart, GeneratedFile, ImageModel, ModelOutput, ModelRequest};

/// OpenRouter's OpenAI-compatible chat completions with image output.
pub struct OpenRouterModel {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl OpenRouterModel {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn build_payload(request: &ModelRequest) -> Value {
        let messages = request
            .messages
            .iter()
            .map(|message| {
                let content = message
                    .content
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => json!({
                            "type": "text",
                            "text": text,
                        }),
                        ContentPart::Image { image } => json!({
                            "type": "image_url",
                            "image_url": { "url": image.as_str() },
                        }),
                    })
                    .collect::<Vec<Value>>();
                json!({
                    "role": message.role,
                    "content": content,
                })
            })
            .collect::<Vec<Value>>();
        json!({
            "model": request.model.trim(),
            "messages": messages,
            "modalities": ["image", "text"],
        })
    }

    fn extract_output(payload: &Value) -> Result<ModelOutput> {
        if let Some(message) = payload
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            bail!("OpenRouter returned an error: {message}");
        }

        let mut output = ModelOutput::default();
        let Some(message) = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("message"))
        else {
            return Ok(output);
        };

        output.text = match message.get("content") {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .collect::<Vec<&str>>()
                .join("\n"),
            _ => String::new(),
        };

        let images = message
            .get("images")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for image in images {
            let url = image
                .get("image_url")
                .and_then(|value| value.get("url").or(Some(value)))
                .and_then(Value::as_str)
                .unwrap_or_default();
            match parse_data_uri(url) {
                Ok(uri) => output.files.push(GeneratedFile {
                    media_type: uri.media_type.to_string(),
                    base64: uri.payload.to_string(),
                }),
                Err(err) => warn!(error = %err, "skipping OpenRouter image that is not a data URI"),
            }
        }
        Ok(output)
    }
}

impl ImageModel for OpenRouterModel {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn generate(&self, request: &ModelRequest) -> Result<ModelOutput> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENROUTER_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .header("X-Title", "midfit")
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("OpenRouter request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("OpenRouter", response)?;
        Self::extract_output(&response_payload)
    }
}
