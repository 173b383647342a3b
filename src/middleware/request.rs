use axum::extract::{ConnectInfo, OriginalUri, Request};
use axum::http::header::{FORWARDED, HOST};
use axum::http::{HeaderMap, Version};
use std::net::SocketAddr;

/// Request metadata captured before the request is handed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSummary {
    /// Path and query as originally received, before any nesting.
    pub url: String,
    pub method: String,
    /// `Host` header without the port.
    pub hostname: Option<String>,
    /// `1.0`, `1.1`, `2.0`, ...
    pub http_version: String,
    /// First `X-Forwarded-For` hop, else the peer address.
    pub ip: Option<String>,
    /// `X-Forwarded-Proto`, else the URI scheme, else `http`.
    pub protocol: String,
    pub remote_address: Option<String>,
    /// `IPv4` or `IPv6`.
    pub remote_family: Option<String>,
    /// Header names and values, alternating, in arrival order.
    pub raw_headers: Vec<String>,
}

impl RequestSummary {
    pub fn from_request(req: &Request) -> Self {
        let uri = req
            .extensions()
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or_else(|| req.uri());
        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());

        let headers = req.headers();
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        let ip = forwarded_for(headers).or_else(|| peer.map(|p| p.ip().to_string()));
        let protocol = header_str(headers, "x-forwarded-proto")
            .map(|p| p.split(',').next().unwrap_or(p).trim().to_ascii_lowercase())
            .or_else(|| uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        Self {
            url,
            method: req.method().to_string(),
            hostname: hostname(headers),
            http_version: version_str(req.version()).to_string(),
            ip,
            protocol,
            remote_address: peer.map(|p| p.ip().to_string()),
            remote_family: peer.map(|p| if p.is_ipv4() { "IPv4" } else { "IPv6" }.to_string()),
            raw_headers: headers
                .iter()
                .flat_map(|(name, value)| {
                    [
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    ]
                })
                .collect(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(node_address)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            // RFC 7239: `Forwarded: for=192.0.2.60;proto=http`
            header_str(headers, FORWARDED.as_str())?
                .split([';', ','])
                .find_map(|part| {
                    let (key, value) = part.trim().split_once('=')?;
                    key.eq_ignore_ascii_case("for").then_some(value)
                })
                .map(node_address)
                .filter(|ip| !ip.is_empty())
        })
}

/// Address part of a forwarded node: quotes, IPv6 brackets and any port
/// removed. `"[2001:db8::1]:4711"` becomes `2001:db8::1`.
fn node_address(node: &str) -> String {
    let node = node.trim().trim_matches('"');
    if let Some(rest) = node.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest).to_string();
    }
    match node.split_once(':') {
        // `192.0.2.60:8080`; a bare IPv6 address has more than one colon.
        Some((addr, port)) if !port.contains(':') => addr.to_string(),
        _ => node.to_string(),
    }
}

fn hostname(headers: &HeaderMap) -> Option<String> {
    let host = header_str(headers, HOST.as_str())?;
    // Bracketed IPv6 literal, e.g. `[::1]:8080`.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().map(str::to_string);
    }
    Some(host.split(':').next().unwrap_or(host).to_string())
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "unknown",
    }
}
