use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use midfit_contracts::events::{EventLog, EventPayload};
use midfit_contracts::models::{ModelRegistry, IMAGE_CAPABILITY};
use midfit_contracts::wire::{
    GENERATION_FALLBACK_MESSAGE, MISSING_INPUTS_MESSAGE, NO_IMAGE_MESSAGE,
};
use midfit_contracts::{GeneratedImage, GenerationRequest, GenerationResult};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{GeneratedFile, ImageModel};
use crate::config::ProxyConfig;
use crate::prompt::build_try_on_request;
use crate::providers::{build_model, error_chain_text};

/// Why a generation request did not produce an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{}", MISSING_INPUTS_MESSAGE)]
    Validation,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("{}", NO_IMAGE_MESSAGE)]
    EmptyResult,
    #[error("{0}")]
    Upstream(String),
    #[error("Generation timed out after {0}s")]
    TimedOut(u64),
}

impl GenerationError {
    pub fn upstream(err: &anyhow::Error) -> Self {
        let message = error_chain_text(err, 512);
        if message.trim().is_empty() {
            return Self::Upstream(GENERATION_FALLBACK_MESSAGE.to_string());
        }
        Self::Upstream(message)
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Validation | Self::InvalidBody(_) => 400,
            Self::EmptyResult | Self::Upstream(_) | Self::TimedOut(_) => 500,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InvalidBody(_) => "invalid_body",
            Self::EmptyResult => "empty_result",
            Self::Upstream(_) => "upstream",
            Self::TimedOut(_) => "timeout",
        }
    }
}

/// HTTP status plus JSON body, independent of any server framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyReply {
    pub status: u16,
    pub body: GenerationResult,
}

impl From<GenerationError> for ProxyReply {
    fn from(err: GenerationError) -> Self {
        Self {
            status: err.status(),
            body: GenerationResult::failure(err.to_string()),
        }
    }
}

const TICKET_PENDING: u8 = 0;
const TICKET_SETTLED: u8 = 1;
const TICKET_ABANDONED: u8 = 2;

/// Identity of one generation request, shared by the host and the call it runs.
///
/// Exactly one side wins the race to close it: the call by settling, or the
/// host by abandoning it after the time budget ran out. Only the winner
/// writes the outcome to the event log.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    id: String,
    state: Arc<AtomicU8>,
}

impl RequestTicket {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: Arc::new(AtomicU8::new(TICKET_PENDING)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns false if the call already settled.
    pub fn abandon(&self) -> bool {
        self.close(TICKET_ABANDONED)
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.load(Ordering::SeqCst) == TICKET_ABANDONED
    }

    fn settle(&self) -> bool {
        self.close(TICKET_SETTLED)
    }

    fn close(&self, to: u8) -> bool {
        self.state
            .compare_exchange(TICKET_PENDING, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for RequestTicket {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-side half of the try-on workflow.
///
/// Stateless across requests: the model handle, model id and event log are
/// fixed at construction and only read afterwards.
pub struct GenerationProxy {
    model: Arc<dyn ImageModel>,
    model_id: String,
    events: Option<EventLog>,
}

impl GenerationProxy {
    pub fn new(model: Arc<dyn ImageModel>, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
            events: None,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let spec = ModelRegistry::default()
            .resolve(&config.model, IMAGE_CAPABILITY)
            .context("invalid MIDFIT_MODEL")?;
        let model = build_model(&spec, &config.credentials, config.max_duration);
        let mut proxy = Self::new(model, spec.name);
        if let Some(path) = config.events_path.as_ref() {
            proxy = proxy.with_events(EventLog::new(path, "midfit-proxy"));
        }
        Ok(proxy)
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn provider(&self) -> &str {
        self.model.name()
    }

    /// Validates, calls the model once, and maps the outcome to a reply.
    pub fn handle(&self, request: &GenerationRequest) -> ProxyReply {
        self.handle_ticket(&RequestTicket::new(), request)
    }

    /// Like [`handle`](Self::handle), under a ticket the host can abandon.
    /// An abandoned call still returns its reply but logs no outcome.
    pub fn handle_ticket(&self, ticket: &RequestTicket, request: &GenerationRequest) -> ProxyReply {
        let request_id = ticket.id();
        let started = Instant::now();
        self.emit(
            "generation_started",
            json!({
                "request_id": request_id,
                "model": self.model_id,
                "provider": self.model.name(),
                "inputs_sha256": inputs_fingerprint(request),
            }),
        );

        let outcome = self.generate(request);
        let latency = started.elapsed();
        if !ticket.settle() {
            debug!(
                request_id = %request_id,
                latency_ms = latency.as_millis() as u64,
                "generation finished after the request was abandoned"
            );
            return match outcome {
                Ok((image, text)) => ProxyReply {
                    status: 200,
                    body: GenerationResult::Success { image, text },
                },
                Err(err) => ProxyReply::from(err),
            };
        }

        match outcome {
            Ok((image, text)) => {
                info!(
                    request_id = %request_id,
                    model = %self.model_id,
                    media_type = %image.media_type,
                    latency_ms = latency.as_millis() as u64,
                    "generation succeeded"
                );
                self.emit(
                    "generation_succeeded",
                    json!({
                        "request_id": request_id,
                        "model": self.model_id,
                        "status": 200,
                        "media_type": image.media_type,
                        "latency_ms": latency.as_millis() as u64,
                    }),
                );
                ProxyReply {
                    status: 200,
                    body: GenerationResult::Success { image, text },
                }
            }
            Err(err) => {
                self.record_failure(request_id, &err, latency);
                ProxyReply::from(err)
            }
        }
    }

    pub fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<(GeneratedImage, String), GenerationError> {
        if !request.is_complete() {
            return Err(GenerationError::Validation);
        }
        let model_request =
            build_try_on_request(&self.model_id, &request.person_image, &request.outfit_image);
        let output = self
            .model
            .generate(&model_request)
            .map_err(|err| GenerationError::upstream(&err))?;
        let image = first_image(&output.files).ok_or(GenerationError::EmptyResult)?;
        Ok((image, output.text))
    }

    /// Reply for a request the host gave up on, either for time or for a
    /// malformed body. Logged under the ticket's id.
    ///
    /// A body that cannot be decoded never starts a generation, so its trail
    /// is a lone `generation_failed` with kind `invalid_body`.
    pub fn reject(&self, ticket: &RequestTicket, err: GenerationError, elapsed: Duration) -> ProxyReply {
        self.record_failure(ticket.id(), &err, elapsed);
        ProxyReply::from(err)
    }

    fn record_failure(&self, request_id: &str, err: &GenerationError, elapsed: Duration) {
        warn!(
            request_id = %request_id,
            model = %self.model_id,
            kind = err.kind(),
            error = %err,
            "generation failed"
        );
        self.emit(
            "generation_failed",
            json!({
                "request_id": request_id,
                "model": self.model_id,
                "status": err.status(),
                "kind": err.kind(),
                "error": err.to_string(),
                "latency_ms": elapsed.as_millis() as u64,
            }),
        );
    }

    fn emit(&self, event: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        if let Err(err) = events.emit(event, payload) {
            warn!(error = %err, event, "failed to append generation event");
        }
    }
}

/// First asset whose media type is an image; earlier non-image assets are skipped.
pub fn first_image(files: &[GeneratedFile]) -> Option<GeneratedImage> {
    files
        .iter()
        .find(|file| file.is_image())
        .map(|file| GeneratedImage {
            base64: file.base64.clone(),
            media_type: file.media_type.trim().to_string(),
        })
}

fn inputs_fingerprint(request: &GenerationRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.person_image.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(request.outfit_image.as_str().as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
