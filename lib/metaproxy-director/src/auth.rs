//! Outbound `Authorization` resolution

use metaproxy_core::headers::names;
use metaproxy_core::{AuthParams, CredentialStore, HeaderSet, OutboundRequest, SignError};
use metaproxy_signer::SignerRegistry;
use std::sync::Arc;
use tracing::debug;

/// How the outbound `Authorization` was decided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    /// Caller's direct bearer value passed through
    DirectBearer,
    /// Credential reference signed by the named scheme
    Signed(&'static str),
    /// Unrecognised reference used as an opaque token
    RawToken,
    /// No credential headers; outbound request left as sanitized
    Unchanged,
}

/// Chooses between direct bearer, delegated signing, or nothing
#[derive(Clone)]
pub struct AuthResolver {
    registry: SignerRegistry,
    store: Arc<dyn CredentialStore>,
}

impl AuthResolver {
    pub fn new(registry: SignerRegistry, store: Arc<dyn CredentialStore>) -> Self {
        Self { registry, store }
    }

    /// Apply credentials from the original `inbound` headers to `request`
    pub async fn resolve(
        &self,
        inbound: &HeaderSet,
        request: &mut OutboundRequest,
    ) -> Result<AuthDecision, SignError> {
        let direct = inbound.get(names::API_AUTH).unwrap_or_default();
        if !direct.is_empty() {
            request.headers.set(names::AUTHORIZATION, direct);
            return Ok(AuthDecision::DirectBearer);
        }

        let reference = inbound.get(names::CATTLE_AUTH).unwrap_or_default();
        if reference.is_empty() {
            return Ok(AuthDecision::Unchanged);
        }

        let params = AuthParams::parse(reference);
        match self.registry.resolve(&params) {
            Some(signer) => {
                debug!("Signing request to {} with {}", request.hostname(), signer.scheme());
                signer.sign(request, self.store.as_ref(), &params).await?;
                Ok(AuthDecision::Signed(signer.scheme()))
            }
            None => {
                request.headers.set(names::AUTHORIZATION, reference);
                Ok(AuthDecision::RawToken)
            }
        }
    }
}
