use crate::Signer;
use metaproxy_core::headers::names;
use metaproxy_core::{credential_field, AuthParams, CredentialStore, OutboundRequest, SignError};

/// `bearer credID=<id> passwordField=<field>` → `Authorization: Bearer <secret>`
pub struct BearerSigner;

#[async_trait::async_trait]
impl Signer for BearerSigner {
    fn scheme(&self) -> &'static str {
        "bearer"
    }

    async fn sign(
        &self,
        request: &mut OutboundRequest,
        store: &dyn CredentialStore,
        reference: &AuthParams,
    ) -> Result<(), SignError> {
        let credential_id = reference.credential_id()?;
        let password_field = reference.require("passwordField")?;

        let credential = store.get(credential_id).await?;
        let token = credential_field(credential_id, &credential, password_field)?;

        request
            .headers
            .set(names::AUTHORIZATION, format!("Bearer {}", token));
        Ok(())
    }
}
