//! Kubernetes integration for metaproxy
pub mod allowlist;
pub mod client;
pub mod secrets;

pub use allowlist::{AllowListSource, ConfigMapHosts};
pub use client::KubeClient;
pub use secrets::KubeSecretStore;
