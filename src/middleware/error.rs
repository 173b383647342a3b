use super::request::RequestSummary;
use super::HttpLogging;
use crate::logger::Logger;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// An error that can be reported by [`error_logger`].
///
/// `status` and `status_code` mirror the two places HTTP errors commonly
/// carry their status; `status` wins when both are set.
pub trait ReportableError: Error + Send + Sync + 'static {
    fn status(&self) -> Option<u16> {
        None
    }

    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Human-readable trace: the error and its `source()` chain.
    fn stack(&self) -> String {
        source_chain(self.to_string(), self.source())
    }
}

fn source_chain(message: String, mut source: Option<&(dyn Error + 'static)>) -> String {
    let mut stack = message;
    while let Some(cause) = source {
        stack.push_str("\n    caused by: ");
        stack.push_str(&cause.to_string());
        source = cause.source();
    }
    stack
}

/// `status`, else `status_code`, else 500.
pub fn resolve_status<E: ReportableError + ?Sized>(error: &E) -> u16 {
    error.status().or_else(|| error.status_code()).unwrap_or(500)
}

/// Log one `error` record describing `error` and the request it failed,
/// then hand the error, unchanged, to `next`.
pub fn error_logger<E, R>(
    logger: &Logger,
    error: E,
    request: &RequestSummary,
    next: impl FnOnce(E) -> R,
) -> R
where
    E: ReportableError,
{
    logger.error(json!({
        "url": request.url,
        "method": request.method,
        "ip": request.ip,
        "hostname": request.hostname,
        "protocol": request.protocol,
        "status": resolve_status(&error),
        "text": error.to_string(),
        "stack": error.stack(),
    }));
    next(error)
}

/// Shared handle to an error a handler returned, left in the response
/// extensions for [`error_logging`] to find.
#[derive(Clone)]
pub struct ReportedError(pub Arc<dyn ReportableError>);

impl fmt::Debug for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for ReportedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

impl ReportableError for ReportedError {
    fn status(&self) -> Option<u16> {
        self.0.status()
    }

    fn status_code(&self) -> Option<u16> {
        self.0.status_code()
    }

    fn stack(&self) -> String {
        self.0.stack()
    }
}

/// Log errors reported by handlers further down the stack.
///
/// Looks for a [`ReportedError`] in the response extensions, logs it with
/// [`error_logger`] and returns the response untouched, so outer error
/// handling still sees both the response and the error.
pub async fn error_logging(State(http): State<HttpLogging>, req: Request, next: Next) -> Response {
    let summary = RequestSummary::from_request(&req);
    let response = next.run(req).await;
    let reported = response.extensions().get::<ReportedError>().cloned();
    match reported {
        Some(reported) => error_logger(&http.logger, reported, &summary, |_| response),
        None => response,
    }
}

/// Handler error carrying an HTTP status.
///
/// Converting it into a response renders `{"error": message}` and records
/// the error in the response extensions for [`error_logging`].
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct ApiError {
    status: Option<u16>,
    status_code: Option<u16>,
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
    trace: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            status_code: None,
            message: message.into(),
            source: None,
            trace: capture_backtrace(),
        }
    }

    /// Wrap an underlying error, keeping it as the `source`.
    pub fn from_error(error: impl Error + Send + Sync + 'static) -> Self {
        let mut api = Self::new(error.to_string());
        api.source = Some(Box::new(error));
        api
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status.as_u16());
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// Extractor rejections keep their own status (400, 415, 422, ...).
macro_rules! from_rejection {
    ($($rejection:ty),* $(,)?) => {$(
        impl From<$rejection> for ApiError {
            fn from(rejection: $rejection) -> Self {
                let status = rejection.status();
                Self::from_error(rejection).with_status(status)
            }
        }
    )*};
}

from_rejection!(JsonRejection, PathRejection, QueryRejection, FormRejection);

fn capture_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

impl ReportableError for ApiError {
    fn status(&self) -> Option<u16> {
        self.status
    }

    fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    fn stack(&self) -> String {
        let mut stack = source_chain(self.message.clone(), self.source());
        if let Some(backtrace) = &self.trace {
            stack.push('\n');
            stack.push_str(backtrace);
        }
        stack
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(resolve_status(&self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.message.clone() }));
        let mut response = (status, body).into_response();
        response
            .extensions_mut()
            .insert(ReportedError(Arc::new(self)));
        response
    }
}
