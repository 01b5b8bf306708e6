use anyhow::Result;
use http_body_util::Full;
use hyper::{body::Bytes, server::conn::http1, service::service_fn, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use metaproxy_core::{CredentialStore, MemoryCredentialStore, SharedHosts};
use metaproxy_director::http::{error_response, inbound_from_hyper, into_hyper_response, not_found_response};
use metaproxy_director::{Director, DirectorMetrics, HttpsForwarder, ProxyService};
use metaproxy_kube::KubeClient;
use metaproxy_signer::SignerRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod router;
mod tls;

use config::{GatewayConfig, LogFormat};
use router::{clean_path, Route, Router};

struct Gateway {
    router: Router,
    service: ProxyService,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::load()?;
    init_tracing(config.log_format);

    info!("Starting metaproxy-gateway...");

    let hosts = Arc::new(SharedHosts::new(config.allowed_hosts.clone()));
    info!("Allow-list seeded with {} host patterns", config.allowed_hosts.len());

    let credentials: Arc<dyn CredentialStore> = if config.kubernetes.enabled {
        let kube = KubeClient::new().await?;
        info!("Kubernetes client initialized");

        if let Some(source) = config.kubernetes.allow_list.clone() {
            let watcher = kube.allow_list_watcher(source, hosts.clone());
            tokio::spawn(async move {
                if let Err(e) = watcher.run().await {
                    warn!("Allow-list watcher stopped: {}", e);
                }
            });
        }

        Arc::new(kube.secret_store(&config.kubernetes.credential_namespace))
    } else {
        warn!("Kubernetes disabled - credential references cannot be resolved");
        Arc::new(MemoryCredentialStore::new())
    };

    let signers = SignerRegistry::with_defaults();
    info!("Signers registered: {:?}", signers.schemes());

    let director = Director::new(config.prefix.clone(), hosts, signers, credentials);

    let forwarder = HttpsForwarder::new(config.request_timeout())?;
    info!("Request forwarder initialized with {}s timeout", forwarder.timeout().as_secs());

    let metrics = DirectorMetrics::new()?;
    info!("Metrics collector initialized");

    let gateway = Arc::new(Gateway {
        router: Router::new(config.prefix.clone()),
        service: ProxyService::new(director, Arc::new(forwarder), metrics),
    });

    match (config.tls_listen, &config.tls_cert, &config.tls_key) {
        (Some(addr), Some(cert), Some(key)) => {
            let acceptor = tls::load_acceptor(cert, key)?;
            let listener = TcpListener::bind(&addr).await?;
            info!("HTTPS server listening on {}", addr);
            tokio::task::spawn(accept_https_connections(listener, gateway.clone(), acceptor));
        }
        _ => info!("TLS listener not configured"),
    }

    let http_listener = TcpListener::bind(&config.listen).await?;
    info!("HTTP server listening on {}", config.listen);

    loop {
        let (stream, peer_addr) = http_listener.accept().await?;
        let io = TokioIo::new(stream);
        let gateway = gateway.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, gateway.clone(), false));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Accept HTTPS connections; requests on them are marked as TLS
async fn accept_https_connections(listener: TcpListener, gateway: Arc<Gateway>, acceptor: TlsAcceptor) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let acceptor = acceptor.clone();
                let gateway = gateway.clone();

                tokio::task::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let io = TokioIo::new(tls_stream);
                            let service =
                                service_fn(move |req| handle_request(req, gateway.clone(), true));

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!("Error serving HTTPS connection from {}: {}", peer_addr, e);
                            }
                        }
                        Err(e) => {
                            debug!("TLS error from {}: {}", peer_addr, e);
                        }
                    }
                });
            }
            Err(e) => {
                warn!("Error accepting HTTPS connection: {}", e);
            }
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    gateway: Arc<Gateway>,
    is_tls: bool,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = clean_path(req.uri().path());

    match gateway.router.route(req.method().as_str(), &path) {
        Route::Health => Ok(text_response(StatusCode::OK, "OK\n".to_string())),
        Route::Metrics => {
            let metrics_text = gateway
                .service
                .metrics()
                .gather()
                .unwrap_or_else(|_| "Failed to gather metrics\n".to_string());
            let mut response = text_response(StatusCode::OK, metrics_text);
            if let Ok(value) = "text/plain; version=0.0.4".parse() {
                response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
            }
            Ok(response)
        }
        Route::Proxy => {
            let mut inbound = match inbound_from_hyper(req, is_tls).await {
                Ok(inbound) => inbound,
                Err(e) => {
                    debug!("Failed to read request body: {}", e);
                    return Ok(into_hyper_response(error_response(
                        StatusCode::BAD_REQUEST.as_u16(),
                        "Failed to read request body",
                    )));
                }
            };
            inbound.path = path;
            Ok(into_hyper_response(gateway.service.handle(inbound).await))
        }
        Route::NotFound => Ok(into_hyper_response(not_found_response())),
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
