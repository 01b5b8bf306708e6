//! Request director for the metaproxy gateway
//!
//! Turns an inbound `/meta/proxy/<destination>` request into a sanitized
//! outbound request, hands it to a [`Transport`], and rewrites the response
//! so destination cookies never land on the proxy's own origin.

pub mod auth;
pub mod cookies;
pub mod director;
pub mod forwarder;
pub mod http;
pub mod metrics;
pub mod sanitize;
pub mod service;

pub use auth::{AuthDecision, AuthResolver};
pub use director::Director;
pub use forwarder::{HttpsForwarder, Transport, TransportError};
pub use metrics::DirectorMetrics;
pub use service::ProxyService;
