//! Signer contract and scheme-keyed registry

use crate::{ArbitrarySigner, AwsV4Signer, BasicSigner, BearerSigner};
use metaproxy_core::{AuthParams, CredentialStore, OutboundRequest, SignError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Converts a credential reference into request authentication material
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// Scheme token this signer answers to (lowercase)
    fn scheme(&self) -> &'static str;

    /// Add authentication headers to `request` using secrets from `store`
    async fn sign(
        &self,
        request: &mut OutboundRequest,
        store: &dyn CredentialStore,
        reference: &AuthParams,
    ) -> Result<(), SignError>;
}

/// Maps reference schemes to signers
#[derive(Clone, Default)]
pub struct SignerRegistry {
    signers: HashMap<String, Arc<dyn Signer>>,
}

impl SignerRegistry {
    /// Create an empty registry; every reference falls back to a raw token
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bearer, basic, arbitrary and awsv4 signers
    pub fn with_defaults() -> Self {
        Self::new()
            .register(BearerSigner)
            .register(BasicSigner)
            .register(ArbitrarySigner)
            .register(AwsV4Signer::default())
    }

    /// Add a signer under its scheme, replacing any previous one
    pub fn register<S: Signer + 'static>(mut self, signer: S) -> Self {
        self.signers
            .insert(signer.scheme().to_ascii_lowercase(), Arc::new(signer));
        self
    }

    /// Find the signer for a reference; `None` means treat it as an opaque token
    pub fn resolve(&self, reference: &AuthParams) -> Option<Arc<dyn Signer>> {
        let signer = self
            .signers
            .get(&reference.scheme().to_ascii_lowercase())
            .cloned();
        debug!(
            "Signer lookup for scheme {:?}: {}",
            reference.scheme(),
            if signer.is_some() { "matched" } else { "none" }
        );
        signer
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<_> = self.signers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use bytes::Bytes;
    use metaproxy_core::{HeaderSet, OutboundRequest};
    use url::Url;

    pub fn request(url: &str) -> OutboundRequest {
        OutboundRequest {
            method: "GET".to_string(),
            url: Url::parse(url).expect("valid test url"),
            headers: HeaderSet::new(),
            body: Bytes::new(),
        }
    }
}
