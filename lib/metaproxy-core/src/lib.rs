//! Core types for the metaproxy request director
//!
//! This library provides:
//! - An ordered, case-insensitive header multi-map
//! - Inbound/outbound request and response models
//! - Destination extraction from the proxy path
//! - Host allow-list matching against a live supplier
//! - The credential store contract used by signers

pub mod allowlist;
pub mod credential;
pub mod destination;
pub mod error;
pub mod headers;
pub mod request;

pub use allowlist::{is_allowed, HostSupplier, HostValidator, SharedHosts, StaticHosts};
pub use credential::{
    credential_field, AuthParams, Credential, CredentialStore, MemoryCredentialStore,
};
pub use destination::{authority_host, resolve_destination};
pub use error::{DirectorError, Result, SignError};
pub use headers::HeaderSet;
pub use request::{InboundRequest, OutboundRequest, ProxyResponse};
