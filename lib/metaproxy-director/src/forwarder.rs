//! HTTP/HTTPS forwarding of directed requests
//!
//! The director only decides *what* to send; a [`Transport`] performs the
//! network exchange. [`HttpsForwarder`] is the pooled hyper client used by
//! the gateway.

use crate::http::{header_map_from_set, header_set_from_map};
use anyhow::{anyhow, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::tokio::TokioExecutor;
use metaproxy_core::{HeaderSet, OutboundRequest, ProxyResponse};
use rustls::ClientConfig;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

/// Performs the network exchange for an already-directed request.
///
/// A returned response always comes from the destination; failures to reach
/// it are errors, preferably a [`TransportError`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn forward(&self, request: OutboundRequest) -> Result<ProxyResponse>;
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Destination request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Error communicating with destination: {0}")]
    Connection(String),

    #[error("Error reading destination response body: {0}")]
    Body(String),
}

/// Pooled HTTP/HTTPS client with a per-request timeout
pub struct HttpsForwarder {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

fn install_crypto_provider() -> Result<()> {
    static RUSTLS_INIT: OnceLock<bool> = OnceLock::new();
    let installed = RUSTLS_INIT.get_or_init(|| {
        // An already-installed provider is fine too
        rustls::crypto::ring::default_provider().install_default().is_ok()
            || rustls::crypto::CryptoProvider::get_default().is_some()
    });
    if *installed {
        Ok(())
    } else {
        Err(anyhow!("Failed to install rustls crypto provider"))
    }
}

impl HttpsForwarder {
    /// Create a forwarder trusting the platform's native root certificates
    pub fn new(timeout: Duration) -> Result<Self> {
        install_crypto_provider()?;

        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| anyhow!("Failed to load native TLS roots: {}", e))?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(Self::connector(timeout));

        Ok(Self::from_connector(https, timeout))
    }

    /// Create a forwarder with an explicit TLS client configuration
    pub fn with_tls_config(tls: ClientConfig, timeout: Duration) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(Self::connector(timeout));

        Self::from_connector(https, timeout)
    }

    fn connector(timeout: Duration) -> HttpConnector {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_keepalive(Some(Duration::from_secs(30)));
        connector.enforce_http(false);
        connector
    }

    fn from_connector(https: HttpsConnector<HttpConnector>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(https);
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check if header is hop-by-hop (should not be forwarded)
    fn is_hop_by_hop_header(name: &str) -> bool {
        matches!(
            name.to_ascii_lowercase().as_str(),
            "connection"
                | "keep-alive"
                | "proxy-authenticate"
                | "proxy-authorization"
                | "te"
                | "trailers"
                | "transfer-encoding"
                | "upgrade"
        )
    }

    fn strip_hop_by_hop(headers: &mut HeaderSet) {
        let hop_by_hop: Vec<String> = headers
            .names()
            .filter(|name| Self::is_hop_by_hop_header(name))
            .map(str::to_string)
            .collect();
        for name in &hop_by_hop {
            headers.remove(name);
        }
    }

    fn build_request(request: OutboundRequest) -> Result<Request<Full<Bytes>>> {
        let method = Method::from_bytes(request.method.as_bytes())?;
        let uri: Uri = request.url.as_str().parse()?;

        let mut headers = request.headers;
        Self::strip_hop_by_hop(&mut headers);

        let mut forwarded = Request::new(Full::new(request.body));
        *forwarded.method_mut() = method;
        *forwarded.uri_mut() = uri;
        *forwarded.headers_mut() = header_map_from_set(&headers);
        Ok(forwarded)
    }
}

#[async_trait::async_trait]
impl Transport for HttpsForwarder {
    async fn forward(&self, request: OutboundRequest) -> Result<ProxyResponse> {
        debug!("Forwarding request to: {}", request.url);
        let forwarded = Self::build_request(request)?;

        // One deadline covers the response head and the whole body
        let exchange = async {
            let response = self
                .client
                .request(forwarded)
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            debug!("Destination responded with status: {}", response.status());

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?
                .to_bytes();
            Ok::<_, TransportError>((parts, body))
        };

        match tokio_timeout(self.timeout, exchange).await {
            Ok(Ok((parts, body))) => {
                let mut headers = header_set_from_map(&parts.headers);
                Self::strip_hop_by_hop(&mut headers);

                Ok(ProxyResponse {
                    status: parts.status.as_u16(),
                    headers,
                    body,
                })
            }
            Ok(Err(e)) => {
                warn!("Destination request error: {}", e);
                Err(e.into())
            }
            Err(_) => {
                warn!("Destination request timeout after {}s", self.timeout.as_secs());
                Err(TransportError::Timeout(self.timeout).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    fn outbound(headers: HeaderSet) -> OutboundRequest {
        OutboundRequest {
            method: "PUT".to_string(),
            url: Url::parse("https://api.example.com/v1/items?page=2").unwrap(),
            headers,
            body: Bytes::from_static(b"{}"),
        }
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(HttpsForwarder::is_hop_by_hop_header("connection"));
        assert!(HttpsForwarder::is_hop_by_hop_header("Keep-Alive"));
        assert!(HttpsForwarder::is_hop_by_hop_header("transfer-encoding"));
        assert!(!HttpsForwarder::is_hop_by_hop_header("content-type"));
        assert!(!HttpsForwarder::is_hop_by_hop_header("authorization"));
    }

    #[test]
    fn test_build_request() {
        let headers: HeaderSet = [
            ("Host", "api.example.com"),
            ("Connection", "keep-alive"),
            ("Accept", "text/html"),
            ("Accept", "application/json"),
        ]
        .into_iter()
        .collect();

        let request = HttpsForwarder::build_request(outbound(headers)).expect("valid request");

        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.uri().to_string(), "https://api.example.com/v1/items?page=2");
        assert_eq!(request.headers()["host"], "api.example.com");
        assert!(request.headers().get("connection").is_none());
        assert_eq!(request.headers().get_all("accept").iter().count(), 2);
    }

    #[test]
    fn test_build_request_rejects_bad_method() {
        let mut request = outbound(HeaderSet::new());
        request.method = "BAD METHOD".to_string();
        assert!(HttpsForwarder::build_request(request).is_err());
    }

    fn plain_forwarder(timeout: Duration) -> HttpsForwarder {
        let tls = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        HttpsForwarder::with_tls_config(tls, timeout)
    }

    /// Serve one connection with a canned response head and body, then hold it open
    async fn serve_once(response: &'static [u8]) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            stream.write_all(response).await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        addr
    }

    fn get(addr: std::net::SocketAddr) -> OutboundRequest {
        OutboundRequest {
            method: "GET".to_string(),
            url: Url::parse(&format!("http://{}/items", addr)).unwrap(),
            headers: HeaderSet::new(),
            body: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_forward_collects_response() {
        let addr = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nSet-Cookie: a=1\r\nKeep-Alive: timeout=5\r\n\r\nok",
        )
        .await;

        let response = plain_forwarder(Duration::from_secs(5)).forward(get(addr)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"ok");
        assert_eq!(response.headers.get("set-cookie"), Some("a=1"));
        assert!(!response.headers.contains("keep-alive"));
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let addr = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial").await;
        let started = Instant::now();

        let err = plain_forwarder(Duration::from_millis(300))
            .forward(get(addr))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = plain_forwarder(Duration::from_secs(2))
            .forward(get(addr))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::Connection(_))
        ));
    }
}
