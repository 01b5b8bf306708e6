//! Destination host allow-listing

use crate::destination::authority_host;
use crate::error::{DirectorError, Result};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Source of the currently valid host patterns.
///
/// Queried on every request; implementations must be safe to call
/// concurrently and cheap enough to do so.
pub trait HostSupplier: Send + Sync {
    fn current_hosts(&self) -> Vec<String>;
}

/// Fixed allow-list
#[derive(Clone, Debug, Default)]
pub struct StaticHosts(pub Vec<String>);

impl StaticHosts {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(hosts.into_iter().map(Into::into).collect())
    }
}

impl HostSupplier for StaticHosts {
    fn current_hosts(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Allow-list that can be replaced at runtime while requests read it
#[derive(Debug, Default)]
pub struct SharedHosts {
    hosts: ArcSwap<Vec<String>>,
}

impl SharedHosts {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts: ArcSwap::from_pointee(hosts),
        }
    }

    /// Publish a new list; subsequent requests see it immediately
    pub fn replace(&self, hosts: Vec<String>) {
        debug!("Allow-list updated with {} host patterns", hosts.len());
        self.hosts.store(Arc::new(hosts));
    }
}

impl HostSupplier for SharedHosts {
    fn current_hosts(&self) -> Vec<String> {
        self.hosts.load().as_ref().clone()
    }
}

/// Check a host against patterns in order.
///
/// A pattern matches on exact equality, or when it starts with `*` and the
/// host ends with the rest of the pattern. Hostnames are case-insensitive,
/// so both sides are compared in ASCII lowercase.
pub fn is_allowed<S: AsRef<str>>(host: &str, patterns: &[S]) -> bool {
    let host = host.to_ascii_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.as_ref().to_ascii_lowercase();
        pattern == host
            || pattern
                .strip_prefix('*')
                .is_some_and(|suffix| host.ends_with(suffix))
    })
}

/// Validates destinations against a live [`HostSupplier`]
#[derive(Clone)]
pub struct HostValidator {
    supplier: Arc<dyn HostSupplier>,
}

impl HostValidator {
    pub fn new(supplier: Arc<dyn HostSupplier>) -> Self {
        Self { supplier }
    }

    /// Re-query the supplier and check the destination's host
    pub fn validate(&self, url: &Url) -> Result<()> {
        let host = authority_host(url);
        let patterns = self.supplier.current_hosts();
        if is_allowed(&host, &patterns) {
            Ok(())
        } else {
            Err(DirectorError::HostNotAllowed(host))
        }
    }
}
