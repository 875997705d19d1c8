use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::{error, info, warn};

use crate::line::{verify_signature, LineWebhook, SIGNATURE_HEADER};

use super::state::IntakeState;

pub const LIVENESS_MESSAGE: &str = "✅ Line webhook running!";

pub(super) async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, LIVENESS_MESSAGE)
}

pub(super) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn verify_line(state: &IntakeState, headers: &HeaderMap, body: &[u8]) -> Result<(), &'static str> {
    let Some(secret) = state.channel_secret.as_deref() else {
        return Ok(());
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or("missing_signature")?;
    if !verify_signature(secret, body, signature) {
        return Err("invalid_signature");
    }
    Ok(())
}

/// Queue the batch for the worker and acknowledge. No downstream call happens
/// on the request path.
pub(super) async fn ingest_line(
    State(state): State<Arc<IntakeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(reason) = verify_line(&state, &headers, &body) {
        warn!("webhook signature rejected: {}", reason);
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": reason})));
    }

    let webhook = match LineWebhook::parse(&body) {
        Ok(webhook) => webhook,
        Err(err) => {
            warn!("webhook body is not valid LINE JSON: {}", err);
            return (StatusCode::OK, Json(json!({"status": "bad_json"})));
        }
    };

    let events = webhook.chat_events();
    let count = events.len();
    info!("webhook received {} event(s)", count);
    if events.is_empty() {
        return (StatusCode::OK, Json(json!({"status": "accepted", "events": 0})));
    }

    if let Err(err) = state.queue.submit(events) {
        error!("failed to queue webhook batch of {} event(s): {}", count, err);
        return (StatusCode::OK, Json(json!({"status": "queue_closed"})));
    }

    (
        StatusCode::OK,
        Json(json!({"status": "accepted", "events": count})),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::to_bytes;
    use axum::http::HeaderValue;
    use axum::response::Response;
    use serde_json::Value;

    use super::*;
    use crate::event::ChatEvent;
    use crate::line::sign_body;
    use crate::pipeline::BatchOutcome;
    use crate::worker::{spawn_batch_worker, BatchProcessor};

    const BODY: &str = r#"{"destination":"U0bot","events":[
        {"type":"message","source":{"type":"user","userId":"U1"},
         "message":{"type":"text","id":"1","text":"Altis"}},
        {"type":"message","source":{"type":"user","userId":"U1"},
         "message":{"type":"image","id":"2"}}
    ]}"#;

    struct Collect(Arc<Mutex<Vec<usize>>>);

    impl BatchProcessor for Collect {
        fn process_batch(&self, events: Vec<ChatEvent>) -> BatchOutcome {
            self.0.lock().expect("lock").push(events.len());
            BatchOutcome {
                events: events.len(),
                ..Default::default()
            }
        }
    }

    async fn call(state: &Arc<IntakeState>, headers: HeaderMap, body: &str) -> (StatusCode, Value) {
        let response: Response = ingest_line(
            State(state.clone()),
            headers,
            Bytes::from(body.to_string()),
        )
        .await
        .into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn accepted_batches_reach_the_worker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (queue, worker) = spawn_batch_worker(Collect(seen.clone()));
        let state = Arc::new(IntakeState {
            queue,
            channel_secret: None,
        });

        let (status, body) = call(&state, HeaderMap::new(), BODY).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "accepted", "events": 2}));

        let (status, body) = call(&state, HeaderMap::new(), "{not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "bad_json");

        drop(state);
        let totals = tokio::task::spawn_blocking(move || worker.join())
            .await
            .expect("join task")
            .expect("worker");
        assert_eq!(totals.events, 2);
        assert_eq!(*seen.lock().expect("lock"), vec![2]);
    }

    #[tokio::test]
    async fn signature_is_enforced_when_secret_is_set() {
        let (queue, _worker) = spawn_batch_worker(Collect(Arc::new(Mutex::new(Vec::new()))));
        let state = Arc::new(IntakeState {
            queue,
            channel_secret: Some("channel-secret".to_string()),
        });

        let (status, body) = call(&state, HeaderMap::new(), BODY).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "missing_signature");

        let mut forged = HeaderMap::new();
        forged.insert(SIGNATURE_HEADER, HeaderValue::from_static("Zm9yZ2Vk"));
        let (status, body) = call(&state, forged, BODY).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "invalid_signature");

        let mut signed = HeaderMap::new();
        let signature = sign_body("channel-secret", BODY.as_bytes());
        signed.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&signature).expect("header"),
        );
        let (status, body) = call(&state, signed, BODY).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "accepted");
    }

    #[tokio::test]
    async fn stopped_worker_reports_queue_closed() {
        struct Panicker;
        impl BatchProcessor for Panicker {
            fn process_batch(&self, _: Vec<ChatEvent>) -> BatchOutcome {
                panic!("worker failure");
            }
        }

        let (queue, worker) = spawn_batch_worker(Panicker);
        let state = Arc::new(IntakeState {
            queue,
            channel_secret: None,
        });
        let (_, body) = call(&state, HeaderMap::new(), BODY).await;
        assert_eq!(body["status"], "accepted");

        let joined = tokio::task::spawn_blocking(move || worker.join())
            .await
            .expect("join task");
        assert!(joined.is_err());

        let (status, body) = call(&state, HeaderMap::new(), BODY).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queue_closed");
    }

    #[tokio::test]
    async fn liveness_and_health_bodies() {
        let response = liveness().await.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&bytes[..], LIVENESS_MESSAGE.as_bytes());

        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
