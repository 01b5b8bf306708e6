//! Request and response models flowing through the director

use crate::headers::HeaderSet;
use bytes::Bytes;
use url::Url;

/// A request as received by the proxy
#[derive(Clone, Debug, Default)]
pub struct InboundRequest {
    pub method: String,
    /// Request path; may still contain an embedded `?query` from the destination
    pub path: String,
    /// The request's own query string
    pub query: Option<String>,
    pub headers: HeaderSet,
    /// Whether the caller connected over TLS
    pub is_tls: bool,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_tls(mut self, is_tls: bool) -> Self {
        self.is_tls = is_tls;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A request ready to be handed to the transport
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub method: String,
    pub url: Url,
    pub headers: HeaderSet,
    pub body: Bytes,
}

impl OutboundRequest {
    /// Destination hostname without port
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// A response travelling back towards the caller
#[derive(Clone, Debug, Default)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderSet,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}
