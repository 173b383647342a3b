//! Response and error logging middleware on an axum router.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::rejection::JsonRejection;
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use http_body::Frame;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use tracing::Level;

use service_logger::capture::MemorySink;
use service_logger::config::LoggerConfig;
use service_logger::logger::{Logger, LoggerBuilder};
use service_logger::middleware::{
    error_logger, error_logging, response_logger, ApiError, Clock, HttpLogging, ReportableError,
    RequestSummary, SystemClock,
};

/// Returns queued timestamps in order, repeating the last one.
struct SteppingClock {
    ticks: Mutex<VecDeque<i64>>,
}

impl SteppingClock {
    fn new(ticks: &[i64]) -> Self {
        Self {
            ticks: Mutex::new(ticks.iter().copied().collect()),
        }
    }
}

impl Clock for SteppingClock {
    fn now_millis(&self) -> i64 {
        let mut ticks = self.ticks.lock().unwrap();
        if ticks.len() > 1 {
            ticks.pop_front().unwrap()
        } else {
            *ticks.front().unwrap()
        }
    }
}

/// Request body replaying a fixed list of chunks and errors, with no
/// size hint, like a chunked upload.
struct ScriptedBody {
    chunks: VecDeque<Result<Bytes, io::Error>>,
}

impl ScriptedBody {
    fn new(chunks: Vec<Result<&'static str, io::ErrorKind>>) -> Body {
        Body::new(Self {
            chunks: chunks
                .into_iter()
                .map(|chunk| match chunk {
                    Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
                    Err(kind) => Err(io::Error::new(kind, "client reset")),
                })
                .collect(),
        })
    }
}

impl http_body::Body for ScriptedBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        Poll::Ready(self.chunks.pop_front().map(|chunk| chunk.map(Frame::data)))
    }
}

fn logger(tmp: &TempDir) -> (Logger, MemorySink) {
    let memory = MemorySink::default();
    let logger = LoggerBuilder::new(LoggerConfig::new("cash-management").with_logs_folder(tmp.path()))
        .console_writer(io::sink())
        .sink(Arc::new(memory.clone()))
        .build()
        .unwrap();
    memory.clear();
    (logger, memory)
}

async fn create_payment(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payment) = payload?;
    Ok(Json(payment))
}

fn app(http: HttpLogging) -> Router {
    Router::new()
        .route(
            "/orders",
            post(|body: String| async move { (StatusCode::CREATED, [("x-order", "7")], body) }),
        )
        .route(
            "/fail",
            get(|| async { Err::<(), _>(ApiError::new("ledger offline")) }),
        )
        .route(
            "/teapot",
            get(|| async { Err::<(), _>(ApiError::new("short and stout").with_status_code(418)) }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(60)).await;
                "slow"
            }),
        )
        .route("/fast", get(|| async { "fast" }))
        .route("/payments", post(create_payment))
        .layer(from_fn_with_state(http.clone(), error_logging))
        .layer(from_fn_with_state(http, response_logger))
}

fn messages_at(memory: &MemorySink, level: Level) -> Vec<Value> {
    memory
        .records()
        .into_iter()
        .filter(|r| r.level == level)
        .map(|r| r.message)
        .collect()
}

#[tokio::test]
async fn logs_exchange_with_processing_time() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let http = HttpLogging::new(logger).with_clock(Arc::new(SteppingClock::new(&[1_000, 1_250])));

    let payload = r#"{"amount":10}"#;
    let resp = app(http)
        .oneshot(
            Request::post("/orders?src=test")
                .header("host", "cash.example.com:8080")
                .header("content-type", "application/json")
                .header("content-length", payload.len().to_string())
                .header("x-forwarded-for", "198.51.100.4")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Nothing is logged until the body has been sent.
    assert!(messages_at(&memory, Level::INFO).is_empty());
    let echoed = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&echoed[..], payload.as_bytes());

    let records = messages_at(&memory, Level::INFO);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["url"], "/orders?src=test");
    assert_eq!(record["method"], "POST");
    assert_eq!(record["hostname"], "cash.example.com");
    assert_eq!(record["httpVersion"], "1.1");
    assert_eq!(record["ip"], "198.51.100.4");
    assert_eq!(record["protocol"], "http");
    assert_eq!(record["req"]["body"], json!({"amount": 10}));
    assert_eq!(record["req"]["rawHeaders"][0], "host");
    assert_eq!(record["response"]["statusCode"], 201);
    assert_eq!(record["response"]["statusMessage"], "Created");
    assert_eq!(record["response"]["processingTime"], 250);
    assert_eq!(record["response"]["headers"]["x-order"], "7");
}

#[tokio::test]
async fn abandoned_response_is_still_logged_once() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let resp = app(HttpLogging::new(logger))
        .oneshot(Request::get("/fast").body(Body::empty()).unwrap())
        .await
        .unwrap();

    drop(resp);

    let records = messages_at(&memory, Level::INFO);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["url"], "/fast");
    assert_eq!(records[0]["req"]["body"], Value::Null);
}

#[tokio::test]
async fn concurrent_requests_are_attributed_independently() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let app = app(HttpLogging::new(logger).with_clock(Arc::new(SystemClock)));

    let slow = async {
        let resp = app
            .clone()
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        to_bytes(resp.into_body(), usize::MAX).await.unwrap()
    };
    let fast = async {
        let resp = app
            .clone()
            .oneshot(Request::get("/fast").body(Body::empty()).unwrap())
            .await
            .unwrap();
        to_bytes(resp.into_body(), usize::MAX).await.unwrap()
    };
    let (slow_body, fast_body) = tokio::join!(slow, fast);
    assert_eq!(&slow_body[..], b"slow");
    assert_eq!(&fast_body[..], b"fast");

    let records = messages_at(&memory, Level::INFO);
    assert_eq!(records.len(), 2);
    let slow = records.iter().find(|r| r["url"] == "/slow").unwrap();
    let fast = records.iter().find(|r| r["url"] == "/fast").unwrap();
    assert!(slow["response"]["processingTime"].as_i64().unwrap() >= 55);
    assert_eq!(fast["response"]["statusCode"], 200);
    assert!(
        fast["response"]["processingTime"].as_i64().unwrap()
            <= slow["response"]["processingTime"].as_i64().unwrap()
    );
}

#[tokio::test]
async fn handler_error_is_logged_with_default_status() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let resp = app(HttpLogging::new(logger))
        .oneshot(
            Request::get("/fail")
                .header("host", "cash.example.com")
                .header("x-forwarded-proto", "https")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"error": "ledger offline"}));

    let errors = messages_at(&memory, Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["url"], "/fail");
    assert_eq!(errors[0]["method"], "GET");
    assert_eq!(errors[0]["hostname"], "cash.example.com");
    assert_eq!(errors[0]["protocol"], "https");
    assert_eq!(errors[0]["status"], 500);
    assert_eq!(errors[0]["text"], "ledger offline");
    assert!(errors[0]["stack"].as_str().unwrap().starts_with("ledger offline"));

    let exchanges = messages_at(&memory, Level::INFO);
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0]["response"]["statusCode"], 500);
}

#[tokio::test]
async fn error_status_code_is_used_when_present() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let resp = app(HttpLogging::new(logger))
        .oneshot(Request::get("/teapot").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);

    let errors = messages_at(&memory, Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["status"], 418);
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("quota exceeded for {account}")]
struct QuotaError {
    account: String,
}

impl ReportableError for QuotaError {}

#[test]
fn error_logger_forwards_original_error() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let summary = RequestSummary {
        url: "/quota".into(),
        method: "PUT".into(),
        hostname: Some("cash.example.com".into()),
        http_version: "1.1".into(),
        ip: Some("203.0.113.1".into()),
        protocol: "http".into(),
        remote_address: None,
        remote_family: None,
        raw_headers: Vec::new(),
    };

    let mut calls = 0;
    let forwarded = error_logger(
        &logger,
        QuotaError {
            account: "acc-9".into(),
        },
        &summary,
        |err| {
            calls += 1;
            err
        },
    );

    assert_eq!(calls, 1);
    assert_eq!(
        forwarded,
        QuotaError {
            account: "acc-9".into()
        }
    );

    let errors = messages_at(&memory, Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["status"], 500);
    assert_eq!(errors[0]["text"], "quota exceeded for acc-9");
    assert_eq!(errors[0]["ip"], "203.0.113.1");
}

async fn post_orders(http: HttpLogging, body: Body, content_length: Option<usize>) -> (StatusCode, String) {
    let mut request = Request::post("/orders");
    if let Some(len) = content_length {
        request = request.header("content-length", len.to_string());
    }
    let resp = app(http).oneshot(request.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn body_over_capture_limit_reaches_handler_and_logs_null() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let payload = "amount=1000000";

    let (status, echoed) = post_orders(
        HttpLogging::new(logger).with_max_body_bytes(8),
        Body::from(payload),
        Some(payload.len()),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(echoed, payload);
    let records = messages_at(&memory, Level::INFO);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["req"]["body"], Value::Null);
}

#[tokio::test]
async fn chunked_body_reaches_handler_and_logs_null() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);

    let (status, echoed) = post_orders(
        HttpLogging::new(logger),
        ScriptedBody::new(vec![Ok("amount="), Ok("10")]),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(echoed, "amount=10");
    let records = messages_at(&memory, Level::INFO);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["req"]["body"], Value::Null);
}

#[tokio::test]
async fn failing_body_is_rejected_the_same_with_logging() {
    let body = || ScriptedBody::new(vec![Ok("abc"), Err(io::ErrorKind::ConnectionReset)]);

    let bare = Router::new().route("/orders", post(|body: String| async move { body }));
    let unlogged = bare
        .oneshot(
            Request::post("/orders")
                .header("content-length", "10")
                .body(body())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unlogged.status(), StatusCode::BAD_REQUEST);

    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let (status, text) = post_orders(HttpLogging::new(logger), body(), Some(10)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.contains("client reset"), "{text}");
    let records = messages_at(&memory, Level::INFO);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["response"]["statusCode"], 400);
    assert_eq!(records[0]["req"]["body"], Value::Null);
}

#[tokio::test]
async fn malformed_json_is_logged_as_error_with_rejection_status() {
    let tmp = TempDir::new().unwrap();
    let (logger, memory) = logger(&tmp);
    let resp = app(HttpLogging::new(logger))
        .oneshot(
            Request::post("/payments")
                .header("content-type", "application/json")
                .header("content-length", "4")
                .body(Body::from("{bad"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    to_bytes(resp.into_body(), usize::MAX).await.unwrap();

    let errors = messages_at(&memory, Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["url"], "/payments");
    assert_eq!(errors[0]["status"], 400);

    let exchanges = messages_at(&memory, Level::INFO);
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0]["req"]["body"], "{bad");
}
