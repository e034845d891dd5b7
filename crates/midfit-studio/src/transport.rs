use std::time::Duration;

use anyhow::{bail, Context, Result};
use midfit_contracts::wire::{GENERATE_OUTFIT_ROUTE, GENERATION_FALLBACK_MESSAGE};
use midfit_contracts::{GeneratedImage, GenerationRequest};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

pub const NO_IMAGE_RETURNED_MESSAGE: &str = "No image returned from the API";

/// A successful generation as the client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub image: GeneratedImage,
    pub text: String,
}

/// How the controller reaches the proxy. Called from a worker thread; the
/// error message is what the user sees.
pub trait GenerationTransport: Send + Sync {
    fn send(&self, request: &GenerationRequest) -> Result<Generated>;
}

/// Posts to a running proxy over HTTP.
pub struct HttpTransport {
    endpoint: String,
    timeout: Duration,
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(server: &str, timeout: Duration) -> Self {
        Self {
            endpoint: format!(
                "{}{GENERATE_OUTFIT_ROUTE}",
                server.trim().trim_end_matches('/')
            ),
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl GenerationTransport for HttpTransport {
    fn send(&self, request: &GenerationRequest) -> Result<Generated> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(request)
            .send()
            .with_context(|| format!("request to {} failed", self.endpoint))?;
        let status = response.status().as_u16();
        let body = response.text().context("response body read failed")?;
        interpret_response(status, &body)
    }
}

/// Turns an HTTP status and body into a result or a displayable error.
///
/// Non-2xx uses the body's `error` field, else the generic message. A 2xx
/// without an image is an error too.
pub fn interpret_response(status: u16, body: &str) -> Result<Generated> {
    let payload: Value = serde_json::from_str(body)
        .with_context(|| format!("server returned an unreadable response ({status})"))?;

    if !(200..300).contains(&status) {
        let message = payload
            .get("error")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .unwrap_or(GENERATION_FALLBACK_MESSAGE);
        bail!("{message}");
    }

    let Some(image) = payload.get("image").filter(|image| !image.is_null()) else {
        bail!("{NO_IMAGE_RETURNED_MESSAGE}");
    };
    let image: GeneratedImage =
        serde_json::from_value(image.clone()).context("server returned a malformed image")?;
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Generated { image, text })
}
