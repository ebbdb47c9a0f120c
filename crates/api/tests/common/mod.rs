#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use broadcast_api::config::ServerConfig;
use broadcast_api::router::build_app_router;
use broadcast_api::state::AppState;
use broadcast_core::dispatch::{
    Credential, DispatchGateway, DispatchRequest, DispatchResponse, GatewayResult, SendStatus,
};
use broadcast_core::error::CoreError;

/// PIN accepted by [`FakeGateway`].
pub const TEST_PIN: &str = "1234";

const BOUNDARY: &str = "broadcast-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        notice_dismiss_secs: 6,
        sms_base_rate: 0.0083,
        sms_carrier_fee: 0.0030,
        max_import_bytes: 5 * 1024 * 1024,
    }
}

// ---------------------------------------------------------------------------
// Fake gateway
// ---------------------------------------------------------------------------

/// In-memory dispatch gateway.
///
/// Numbers ending in `0` fail, everything else is sent. Requests are
/// recorded so tests can inspect what was dispatched.
#[derive(Default)]
pub struct FakeGateway {
    /// Answer with a transport failure instead of results.
    pub unreachable: AtomicBool,
    /// Echo results in reverse recipient order.
    pub reverse_echo: AtomicBool,
    /// Panic inside `send`.
    pub panics: AtomicBool,
    /// When set, `send` waits for a notification before answering.
    pub hold: Option<Arc<Notify>>,
    pub requests: Mutex<Vec<DispatchRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that blocks every send until `release` is notified.
    pub fn held(release: Arc<Notify>) -> Self {
        Self {
            hold: Some(release),
            ..Self::default()
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl DispatchGateway for FakeGateway {
    async fn send(
        &self,
        request: &DispatchRequest,
        credential: &Credential,
    ) -> Result<DispatchResponse, CoreError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(release) = &self.hold {
            release.notified().await;
        }
        if self.panics.load(Ordering::SeqCst) {
            panic!("gateway blew up");
        }
        if credential.expose() != TEST_PIN {
            return Err(CoreError::Unauthorized("Invalid or missing PIN".to_string()));
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CoreError::Transport(
                "Could not reach the SMS service. Please try again.".to_string(),
            ));
        }

        let mut results: Vec<GatewayResult> = request
            .recipients
            .iter()
            .map(|r| {
                let failed = r.phone.ends_with('0');
                GatewayResult {
                    name: r.name.clone(),
                    phone: r.phone.clone(),
                    status: if failed {
                        SendStatus::Failed
                    } else {
                        SendStatus::Sent
                    },
                    sid: (!failed).then(|| format!("SM{}", r.phone)),
                    error: failed.then(|| "Invalid phone number".to_string()),
                }
            })
            .collect();
        if self.reverse_echo.load(Ordering::SeqCst) {
            results.reverse();
        }
        Ok(DispatchResponse { results })
    }

    async fn verify_credential(&self, credential: &Credential) -> Result<bool, CoreError> {
        Ok(credential.expose() == TEST_PIN)
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build the full application router with all middleware layers and a
/// default [`FakeGateway`].
pub fn build_test_app() -> Router {
    build_test_app_with(Arc::new(FakeGateway::new()))
}

/// Build the full application router around the given gateway.
///
/// Uses the same builder as `main.rs`, so integration tests exercise the
/// production middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery). Clones of the returned router share one session.
pub fn build_test_app_with(gateway: Arc<FakeGateway>) -> Router {
    let state = AppState::new(test_config(), gateway);
    build_app_router(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    json_request(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: Value) -> Response {
    json_request(app, Method::PUT, uri, body).await
}

async fn json_request(app: Router, method: Method, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// POST a single-file multipart upload.
pub async fn post_file(app: Router, uri: &str, filename: &str, contents: &[u8]) -> Response {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// POST to the dispatch endpoint, with the credential header if given.
pub async fn dispatch(app: Router, pin: Option<&str>) -> Response {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/campaign/dispatch");
    if let Some(pin) = pin {
        builder = builder.header("x-marketing-pin", pin);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Campaign helpers
// ---------------------------------------------------------------------------

/// Three dialable contacts (one of which the fake gateway fails) and one
/// malformed number.
pub const SAMPLE_CSV: &str = "Name,Phone\n\
Alice,555-000-0001\n\
Bob,555-000-0002\n\
Carol,12345\n\
Dan,555-000-0010\n";

/// Import [`SAMPLE_CSV`] and set a draft, leaving the session previewing.
pub async fn previewing_app(gateway: Arc<FakeGateway>) -> Router {
    let app = build_test_app_with(gateway);
    let response = post_file(
        app.clone(),
        "/api/v1/campaign/import",
        "contacts.csv",
        SAMPLE_CSV.as_bytes(),
    )
    .await;
    assert!(response.status().is_success());

    let response = put_json(
        app.clone(),
        "/api/v1/campaign/draft",
        serde_json::json!({ "message": "Hi [name], 20% off today!" }),
    )
    .await;
    assert!(response.status().is_success());
    app
}

/// Current campaign view (`data` of `GET /api/v1/campaign`).
pub async fn view(app: &Router) -> Value {
    let json = body_json(get(app.clone(), "/api/v1/campaign").await).await;
    json["data"].clone()
}

/// Id of the row whose name is `name`.
pub fn row_id(view: &Value, name: &str) -> u64 {
    view["rows"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == name)
        .and_then(|r| r["id"].as_u64())
        .unwrap_or_else(|| panic!("no row named {name}"))
}
