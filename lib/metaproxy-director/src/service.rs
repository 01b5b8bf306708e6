//! Director, transport and metrics wired into one request handler

use crate::director::Director;
use crate::forwarder::{Transport, TransportError};
use crate::http::error_response;
use crate::metrics::DirectorMetrics;
use metaproxy_core::{InboundRequest, ProxyResponse};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ProxyService {
    director: Director,
    transport: Arc<dyn Transport>,
    metrics: DirectorMetrics,
}

impl ProxyService {
    pub fn new(director: Director, transport: Arc<dyn Transport>, metrics: DirectorMetrics) -> Self {
        Self {
            director,
            transport,
            metrics,
        }
    }

    pub fn director(&self) -> &Director {
        &self.director
    }

    pub fn metrics(&self) -> &DirectorMetrics {
        &self.metrics
    }

    /// Run one proxy exchange. Rejected requests never reach the transport.
    pub async fn handle(&self, inbound: InboundRequest) -> ProxyResponse {
        let outbound = match self.director.direct(&inbound).await {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!("Rejected {} {}: {}", inbound.method, inbound.path, e);
                self.metrics.record_rejection(e.kind());
                return error_response(e.status_code(), &e.to_string());
            }
        };

        let destination = outbound.url.to_string();
        let started = Instant::now();

        match self.transport.forward(outbound).await {
            Ok(response) => {
                debug!("{} responded {}", destination, response.status);
                self.metrics.record_forwarded(response.status, started.elapsed());
                self.director.rewrite_response(response)
            }
            Err(e) => {
                warn!("Forwarding to {} failed: {}", destination, e);
                self.metrics.record_transport_error(started.elapsed());
                match e.downcast_ref::<TransportError>() {
                    Some(TransportError::Timeout(_)) => {
                        error_response(504, "Destination request timeout")
                    }
                    _ => error_response(502, "Error communicating with destination"),
                }
            }
        }
    }
}
