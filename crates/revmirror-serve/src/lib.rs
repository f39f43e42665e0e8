pub mod gate;
pub mod handoff;
pub mod notification;
pub mod signature;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

pub use gate::{admit, Admission, GateConfig, Rejection};
pub use handoff::{Handoff, ProcessHandoff};
pub use notification::{Notification, PushPayload, RepoRef};

// ── Config ──

pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

// ── App State ──

struct AppState {
    gate: GateConfig,
    handoff: Arc<dyn Handoff>,
}

// ── Entrypoint ──

pub async fn serve(
    config: ServeConfig,
    gate: GateConfig,
    handoff: Arc<dyn Handoff>,
) -> anyhow::Result<()> {
    let app = router(gate, handoff);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "webhook gate listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(gate: GateConfig, handoff: Arc<dyn Handoff>) -> Router {
    let state = Arc::new(AppState { gate, handoff });
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(post_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── POST /webhook ──

async fn post_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let job = match admit(&state.gate, &headers, &body) {
        Ok(Admission::Pong) => return (StatusCode::OK, "pong").into_response(),
        Ok(Admission::Job(job)) => job,
        Err(rejection) => return rejection.into_response(),
    };

    let repo = job.repo.clone();
    match state.handoff.hand_off(job) {
        Ok(()) => (StatusCode::ACCEPTED, "OK").into_response(),
        Err(e) => {
            tracing::error!(repo = %repo, error = %e, "handoff failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Handoff failed").into_response()
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use revmirror_mirror::{JobEvent, WorkerJob};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct ChannelHandoff(Mutex<mpsc::Sender<WorkerJob>>);

    impl Handoff for ChannelHandoff {
        fn hand_off(&self, job: WorkerJob) -> anyhow::Result<()> {
            self.0.lock().unwrap().send(job)?;
            Ok(())
        }
    }

    struct BrokenHandoff;

    impl Handoff for BrokenHandoff {
        fn hand_off(&self, _job: WorkerJob) -> anyhow::Result<()> {
            anyhow::bail!("fork failed")
        }
    }

    const SECRET: &str = "s3cret";

    fn setup() -> (tempfile::TempDir, GateConfig) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("reactos.git")).unwrap();
        let gate = GateConfig {
            project_root: Some(tmp.path().to_path_buf()),
            secret: Some(SECRET.into()),
            allow_insecure: false,
        };
        (tmp, gate)
    }

    fn channel_router(gate: GateConfig) -> (Router, mpsc::Receiver<WorkerJob>) {
        let (tx, rx) = mpsc::channel();
        (router(gate, Arc::new(ChannelHandoff(Mutex::new(tx)))), rx)
    }

    fn webhook(event: &str, body: &str) -> Request<Body> {
        let sig = signature::sign(SECRET.as_bytes(), body.as_bytes()).unwrap();
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-forwarded-proto", "https")
            .header("x-hub-signature", sig)
            .header("x-github-event", event)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn text(resp: Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn push_json() -> String {
        serde_json::json!({
            "ref": "refs/heads/master",
            "before": "1111111111111111111111111111111111111111",
            "after": "2222222222222222222222222222222222222222",
            "repository": {"name": "reactos"},
        })
        .to_string()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (_tmp, gate) = setup();
        let (app, _rx) = channel_router(gate);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&text(resp).await).unwrap();
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn push_is_handed_off_and_accepted() {
        let (_tmp, gate) = setup();
        let (app, rx) = channel_router(gate);
        let resp = app.oneshot(webhook("push", &push_json())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(text(resp).await, "OK");

        let job = rx.try_recv().unwrap();
        assert_eq!(job.repo, "reactos");
        assert!(matches!(job.event, JobEvent::Push(ref a) if a.after.starts_with("2222")));
    }

    #[tokio::test]
    async fn ping_gets_pong_without_handoff() {
        let (_tmp, gate) = setup();
        let (app, rx) = channel_router(gate);
        let resp = app.oneshot(webhook("ping", "{\"zen\":\"hi\"}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text(resp).await, "pong");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forged_body_is_rejected_as_plain_text() {
        let (_tmp, gate) = setup();
        let (app, rx) = channel_router(gate);
        let mut req = webhook("push", &push_json());
        let forged = push_json().replace("2222", "3333");
        *req.body_mut() = Body::from(forged);
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(text(resp).await, "Invalid signature");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_repo_is_not_found() {
        let (_tmp, gate) = setup();
        let (app, _rx) = channel_router(gate);
        let body = push_json().replace("reactos", "rosapps");
        let resp = app.oneshot(webhook("push", &body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(resp).await, "Invalid repo: rosapps");
    }

    #[tokio::test]
    async fn handoff_failure_is_a_server_error() {
        let (_tmp, gate) = setup();
        let app = router(gate, Arc::new(BrokenHandoff));
        let resp = app.oneshot(webhook("push", &push_json())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text(resp).await, "Handoff failed");
    }
}
