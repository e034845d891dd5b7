mod dryrun;
mod gemini;
mod openrouter;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use midfit_contracts::models::{ModelSpec, ProviderKind};
use reqwest::blocking::Response as HttpResponse;
use serde_json::Value;

use crate::capability::ImageModel;
use crate::config::ProviderCredentials;

pub use dryrun::DryrunModel;
pub use gemini::GeminiModel;
pub use openrouter::OpenRouterModel;

/// Instantiates the provider that serves `spec`.
pub fn build_model(
    spec: &ModelSpec,
    credentials: &ProviderCredentials,
    timeout: Duration,
) -> Arc<dyn ImageModel> {
    match spec.provider {
        ProviderKind::Gemini => Arc::new(GeminiModel::new(
            credentials.gemini_api_base.clone(),
            credentials.gemini_api_key.clone(),
            timeout,
        )),
        ProviderKind::OpenRouter => Arc::new(OpenRouterModel::new(
            credentials.openrouter_api_base.clone(),
            credentials.openrouter_api_key.clone(),
            timeout,
        )),
        ProviderKind::Dryrun => Arc::new(DryrunModel),
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            upstream_error_detail(&body)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Prefers `error.message` from a JSON error body, else the truncated raw body.
fn upstream_error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message").or(Some(error)))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(str::to_string)
        })
        .map(|message| truncate_text(&message, 512))
        .unwrap_or_else(|| truncate_text(body.trim(), 512))
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(err.to_string().trim(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
