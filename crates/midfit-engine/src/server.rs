use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use midfit_contracts::wire::GENERATE_OUTFIT_ROUTE;
use midfit_contracts::{GenerationRequest, GenerationResult};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::proxy::{GenerationError, GenerationProxy, ProxyReply, RequestTicket};

#[derive(Clone)]
pub struct ServerState {
    proxy: Arc<GenerationProxy>,
    max_duration: Duration,
    max_body_bytes: usize,
}

impl ServerState {
    pub fn new(proxy: Arc<GenerationProxy>, max_duration: Duration) -> Self {
        Self {
            proxy,
            max_duration,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Largest request body accepted; two base64 photos easily pass axum's 2 MB default.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

pub fn router(state: ServerState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route(GENERATE_OUTFIT_ROUTE, post(generate_outfit))
        .route("/healthz", get(healthz))
        .layer(body_limit)
        .with_state(state)
}

/// Binds `bind` and serves until ctrl-c.
pub async fn serve(state: ServerState, bind: std::net::SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(
        addr = %listener.local_addr()?,
        model = %state.proxy.model_id(),
        provider = %state.proxy.provider(),
        max_duration_s = state.max_duration.as_secs(),
        max_body_bytes = state.max_body_bytes,
        "midfit proxy listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;
    info!("midfit proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// `POST /api/generate-outfit`.
///
/// The model call is blocking, so it runs on the blocking pool under the
/// hosting time budget. A timed-out call is abandoned, not cancelled; if it
/// settles in the same instant the budget runs out, its own reply wins.
pub async fn generate_outfit(
    State(state): State<ServerState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> (StatusCode, Json<GenerationResult>) {
    let started = Instant::now();
    let ticket = RequestTicket::new();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let reply = state.proxy.reject(
                &ticket,
                GenerationError::InvalidBody(rejection.body_text()),
                started.elapsed(),
            );
            return into_response(reply);
        }
    };

    let proxy = Arc::clone(&state.proxy);
    let call_ticket = ticket.clone();
    let mut task = tokio::task::spawn_blocking(move || proxy.handle_ticket(&call_ticket, &request));
    let joined = match tokio::time::timeout(state.max_duration, &mut task).await {
        Ok(joined) => joined,
        Err(_) if ticket.abandon() => {
            let reply = state.proxy.reject(
                &ticket,
                GenerationError::TimedOut(state.max_duration.as_secs()),
                started.elapsed(),
            );
            return into_response(reply);
        }
        Err(_) => task.await,
    };
    let reply = match joined {
        Ok(reply) => reply,
        Err(join_err) => state.proxy.reject(
            &ticket,
            GenerationError::Upstream(format!("generation task failed: {join_err}")),
            started.elapsed(),
        ),
    };
    into_response(reply)
}

async fn healthz(State(state): State<ServerState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.proxy.model_id(),
    }))
}

fn into_response(reply: ProxyReply) -> (StatusCode, Json<GenerationResult>) {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use anyhow::anyhow;
    use midfit_contracts::events::EventLog;
    use midfit_contracts::EncodedImage;

    use super::*;
    use crate::capability::ModelOutput;
    use crate::testing::FakeModel;

    fn state(model: Arc<FakeModel>, max_duration: Duration) -> ServerState {
        ServerState::new(
            Arc::new(GenerationProxy::new(model, "fake-image")),
            max_duration,
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            EncodedImage::from_base64("PERSON", "image/png"),
            EncodedImage::from_base64("OUTFIT", "image/png"),
        )
    }

    async fn spawn_server(state: ServerState) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });
        Ok(addr)
    }

    #[tokio::test]
    async fn handler_returns_image_with_200() {
        let model = FakeModel::png("AAA");
        let (status, Json(body)) =
            generate_outfit(State(state(model.clone(), Duration::from_secs(5))), Ok(Json(request())))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.image().map(|image| image.base64.as_str()), Some("AAA"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn handler_maps_missing_inputs_to_400() {
        let model = FakeModel::png("AAA");
        let (status, Json(body)) = generate_outfit(
            State(state(model.clone(), Duration::from_secs(5))),
            Ok(Json(GenerationRequest::default())),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body.error(),
            Some("Both person image and outfit image are required")
        );
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn handler_maps_upstream_failure_to_500() {
        let model = FakeModel::returning(Err(anyhow!("model overloaded")));
        let (status, Json(body)) =
            generate_outfit(State(state(model, Duration::from_secs(5))), Ok(Json(request()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error(), Some("model overloaded"));
    }

    #[tokio::test]
    async fn handler_enforces_the_time_budget() {
        let model = FakeModel::delayed(
            Ok(ModelOutput::default()),
            Duration::from_millis(1500),
        );
        let (status, Json(body)) =
            generate_outfit(State(state(model, Duration::from_secs(1))), Ok(Json(request()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error(), Some("Generation timed out after 1s"));
    }

    #[tokio::test]
    async fn timed_out_requests_keep_one_audit_trail() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let model = FakeModel::delayed(
            Ok(ModelOutput {
                files: vec![crate::capability::GeneratedFile {
                    media_type: "image/png".to_string(),
                    base64: "AAA".to_string(),
                }],
                text: String::new(),
            }),
            Duration::from_millis(1500),
        );
        let proxy = GenerationProxy::new(model.clone(), "fake-image")
            .with_events(EventLog::new(&path, "test"));
        let state = ServerState::new(Arc::new(proxy), Duration::from_secs(1));

        let (status, _) = generate_outfit(State(state), Ok(Json(request()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        // Let the abandoned call finish before reading the log.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(model.call_count(), 1);

        let rows: Vec<Value> = std::fs::read_to_string(&path)?
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let kinds: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.get("event").and_then(Value::as_str))
            .collect();
        assert_eq!(kinds, vec!["generation_started", "generation_failed"]);
        assert_eq!(rows[0]["request_id"], rows[1]["request_id"]);
        assert_eq!(rows[1]["kind"], json!("timeout"));
        Ok(())
    }

    #[tokio::test]
    async fn http_round_trip_serves_json_contract() -> anyhow::Result<()> {
        let addr = spawn_server(state(FakeModel::png("AAA"), Duration::from_secs(5))).await?;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}{GENERATE_OUTFIT_ROUTE}"))
            .json(&request())
            .send()
            .await?;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await?;
        assert_eq!(
            body,
            json!({
                "image": { "base64": "AAA", "mediaType": "image/png" },
                "text": "fake commentary",
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn http_missing_keys_are_validation_errors() -> anyhow::Result<()> {
        let model = FakeModel::png("AAA");
        let addr = spawn_server(state(model.clone(), Duration::from_secs(5))).await?;
        let response = reqwest::Client::new()
            .post(format!("http://{addr}{GENERATE_OUTFIT_ROUTE}"))
            .json(&json!({ "personImage": "data:image/png;base64,AAA" }))
            .send()
            .await?;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await?;
        assert_eq!(
            body,
            json!({ "error": "Both person image and outfit image are required" })
        );
        assert_eq!(model.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn http_malformed_body_gets_structured_400() -> anyhow::Result<()> {
        let model = FakeModel::png("AAA");
        let addr = spawn_server(state(model.clone(), Duration::from_secs(5))).await?;
        let response = reqwest::Client::new()
            .post(format!("http://{addr}{GENERATE_OUTFIT_ROUTE}"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await?;
        assert_eq!(response.status().as_u16(), 400);
        let body: GenerationResult = response.json().await?;
        let message = body.error().unwrap_or_default();
        assert!(message.starts_with("Invalid request body"), "{message}");
        assert_eq!(model.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn http_accepts_photos_past_the_framework_default() -> anyhow::Result<()> {
        let model = FakeModel::png("AAA");
        let addr = spawn_server(state(model.clone(), Duration::from_secs(5))).await?;
        let photo = format!("data:image/jpeg;base64,{}", "A".repeat(1_600_000));
        let response = reqwest::Client::new()
            .post(format!("http://{addr}{GENERATE_OUTFIT_ROUTE}"))
            .json(&json!({ "personImage": photo, "outfitImage": photo }))
            .send()
            .await?;
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(model.call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn http_bodies_over_the_limit_are_rejected() -> anyhow::Result<()> {
        let model = FakeModel::png("AAA");
        let addr = spawn_server(
            state(model.clone(), Duration::from_secs(5)).with_max_body_bytes(1024),
        )
        .await?;
        let photo = format!("data:image/png;base64,{}", "A".repeat(4096));
        let response = reqwest::Client::new()
            .post(format!("http://{addr}{GENERATE_OUTFIT_ROUTE}"))
            .json(&json!({ "personImage": photo, "outfitImage": photo }))
            .send()
            .await?;
        assert_eq!(response.status().as_u16(), 400);
        let body: GenerationResult = response.json().await?;
        let message = body.error().unwrap_or_default();
        assert!(message.starts_with("Invalid request body"), "{message}");
        assert_eq!(model.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn http_null_images_are_validation_errors() -> anyhow::Result<()> {
        let model = FakeModel::png("AAA");
        let addr = spawn_server(state(model.clone(), Duration::from_secs(5))).await?;
        let response = reqwest::Client::new()
            .post(format!("http://{addr}{GENERATE_OUTFIT_ROUTE}"))
            .json(&json!({ "personImage": null, "outfitImage": "data:image/png;base64,AAA" }))
            .send()
            .await?;
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await?;
        assert_eq!(
            body,
            json!({ "error": "Both person image and outfit image are required" })
        );
        assert_eq!(model.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn healthz_reports_model() -> anyhow::Result<()> {
        let addr = spawn_server(state(FakeModel::png("AAA"), Duration::from_secs(5))).await?;
        let body: Value = reqwest::Client::new()
            .get(format!("http://{addr}/healthz"))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(body, json!({ "status": "ok", "model": "fake-image" }));
        Ok(())
    }
}
