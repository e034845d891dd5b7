use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::response_json_or_error;
use crate::capability::{ContentPart, GeneratedFile, ImageModel, ModelOutput, ModelRequest};

/// Google Generative Language `generateContent` transport.
pub struct GeminiModel {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiModel {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ModelRequest) -> Result<Value> {
        let mut contents = Vec::new();
        for message in &request.messages {
            let mut parts = Vec::new();
            for part in &message.content {
                parts.push(match part {
                    ContentPart::Text { text } => json!({ "text": text }),
                    ContentPart::Image { image } => {
                        let uri = image
                            .parts()
                            .context("Gemini image input is not a base64 data URI")?;
                        json!({
                            "inlineData": {
                                "mimeType": uri.media_type,
                                "data": uri.payload,
                            }
                        })
                    }
                });
            }
            contents.push(json!({
                "role": message.role,
                "parts": parts,
            }));
        }
        Ok(json!({
            "contents": contents,
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        }))
    }

    fn extract_output(payload: &Value) -> Result<ModelOutput> {
        let candidates = payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if candidates.is_empty() {
            if let Some(reason) = payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
            {
                bail!("Gemini blocked the request ({reason})");
            }
        }

        let mut output = ModelOutput::default();
        let mut texts: Vec<String> = Vec::new();
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                    continue;
                }
                if let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                {
                    let data = inline
                        .get("data")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if data.is_empty() {
                        continue;
                    }
                    let media_type = inline
                        .get("mimeType")
                        .or_else(|| inline.get("mime_type"))
                        .and_then(Value::as_str)
                        .unwrap_or("application/octet-stream");
                    output.files.push(GeneratedFile {
                        media_type: media_type.to_string(),
                        base64: data.to_string(),
                    });
                    continue;
                }
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        texts.push(trimmed.to_string());
                    }
                }
            }
        }
        output.text = texts.join("\n");
        Ok(output)
    }
}

impl ImageModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ModelRequest) -> Result<ModelOutput> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request)?;

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        Self::extract_output(&response_payload)
    }
}
