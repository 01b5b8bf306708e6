//! Conversions between hyper types and the director's request model

use anyhow::Result;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use metaproxy_core::headers::names;
use metaproxy_core::{HeaderSet, InboundRequest, ProxyResponse};
use tracing::debug;

/// Copy a hyper header map, keeping the order values arrived in
pub fn header_set_from_map(map: &HeaderMap) -> HeaderSet {
    let mut headers = HeaderSet::new();
    for (name, value) in map.iter() {
        headers.append(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    headers
}

/// Build a hyper header map, skipping entries hyper cannot represent
pub fn header_map_from_set(headers: &HeaderSet) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, values) in headers.iter() {
        let header_name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => n,
            Err(_) => {
                debug!("Skipping invalid header name: {}", name);
                continue;
            }
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    map.append(header_name.clone(), v);
                }
                Err(_) => debug!("Skipping invalid value for header {}", name),
            }
        }
    }
    map
}

/// Buffer a hyper request into an [`InboundRequest`]
pub async fn inbound_from_hyper<B>(req: Request<B>, is_tls: bool) -> Result<InboundRequest>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    Ok(InboundRequest {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        query: parts
            .uri
            .query()
            .filter(|q| !q.is_empty())
            .map(str::to_string),
        headers: header_set_from_map(&parts.headers),
        is_tls,
        body,
    })
}

pub fn into_hyper_response(response: ProxyResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(response.body));
    *out.status_mut() = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    *out.headers_mut() = header_map_from_set(&response.headers);
    out
}

/// A response generated by the proxy itself rather than a destination
pub fn error_response(status: u16, reason: &str) -> ProxyResponse {
    ProxyResponse::new(status)
        .with_header("Content-Type", "text/plain; charset=utf-8")
        .with_header(names::PROXY_ERROR, "true")
        .with_body(format!("{}\n", reason))
}

pub fn not_found_response() -> ProxyResponse {
    ProxyResponse::new(StatusCode::NOT_FOUND.as_u16())
        .with_header("Content-Type", "text/plain; charset=utf-8")
        .with_body("Not Found\n")
}
