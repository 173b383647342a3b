use super::body::{BodyRecording, CompletionBody, RecordingBody};
use super::request::RequestSummary;
use super::HttpLogging;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{json, Map, Value};

/// Log one `info` record per HTTP exchange, once the response body has
/// been sent (or abandoned).
///
/// The request is always passed on unchanged and the response is
/// returned as soon as the inner service produces it; the record is
/// written from the body's completion hook.
pub async fn response_logger(State(http): State<HttpLogging>, req: Request, next: Next) -> Response {
    let started = http.clock.now_millis();
    let summary = RequestSummary::from_request(&req);
    let (req, recording) = record_body(req, http.max_body_bytes);

    let response = next.run(req).await;

    let (parts, inner) = response.into_parts();
    let status = parts.status;
    let headers = headers_json(&parts.headers);
    let logger = http.logger.clone();
    let clock = http.clock.clone();

    let on_complete = move || {
        let processing_time = clock.now_millis() - started;
        let body = recording
            .and_then(|(recording, is_json)| Some(body_json(is_json, &recording.finished()?)))
            .unwrap_or(Value::Null);
        logger.info(json!({
            "url": summary.url,
            "method": summary.method,
            "hostname": summary.hostname,
            "httpVersion": summary.http_version,
            "ip": summary.ip,
            "protocol": summary.protocol,
            "remoteAddress": summary.remote_address,
            "remoteFamily": summary.remote_family,
            "req": {
                "rawHeaders": summary.raw_headers,
                "body": body,
            },
            "response": {
                "statusCode": status.as_u16(),
                "statusMessage": status.canonical_reason().unwrap_or(""),
                "processingTime": processing_time,
                "headers": headers,
            },
        }));
    };

    Response::from_parts(parts, Body::new(CompletionBody::new(inner, on_complete)))
}

/// Wrap small request bodies so the bytes the handler reads are kept
/// for the exchange record.
///
/// Only bodies with a declared `Content-Length` within `max` are
/// recorded. The handler always reads the original stream, errors
/// included; a body it never finishes reading logs as `null`.
fn record_body(req: Request, max: usize) -> (Request, Option<(BodyRecording, bool)>) {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    match declared {
        Some(len) if len > 0 && len <= max => {}
        _ => return (req, None),
    }

    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.contains("json"));
    let recording = BodyRecording::new(max);
    let (parts, body) = req.into_parts();
    let body = Body::new(RecordingBody::new(body, recording.clone()));
    (Request::from_parts(parts, body), Some((recording, is_json)))
}

fn body_json(is_json: bool, bytes: &[u8]) -> Value {
    if is_json {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return value;
        }
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::Null,
    }
}

/// Header map as a JSON object; repeated headers become arrays.
fn headers_json(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for name in headers.keys() {
        let values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let value = if values.len() == 1 {
            values.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(values)
        };
        out.insert(name.as_str().to_string(), value);
    }
    Value::Object(out)
}
