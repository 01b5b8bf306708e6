use crate::Signer;
use base64::{engine::general_purpose::STANDARD, Engine};
use metaproxy_core::headers::names;
use metaproxy_core::{credential_field, AuthParams, CredentialStore, OutboundRequest, SignError};

/// `basic credID=<id> usernameField=<field> passwordField=<field>`
/// → `Authorization: Basic base64(user:password)`
pub struct BasicSigner;

#[async_trait::async_trait]
impl Signer for BasicSigner {
    fn scheme(&self) -> &'static str {
        "basic"
    }

    async fn sign(
        &self,
        request: &mut OutboundRequest,
        store: &dyn CredentialStore,
        reference: &AuthParams,
    ) -> Result<(), SignError> {
        let credential_id = reference.credential_id()?;
        let username_field = reference.require("usernameField")?;
        let password_field = reference.require("passwordField")?;

        let credential = store.get(credential_id).await?;
        let username = credential_field(credential_id, &credential, username_field)?;
        let password = credential_field(credential_id, &credential, password_field)?;

        let encoded = STANDARD.encode(format!("{}:{}", username, password));
        request
            .headers
            .set(names::AUTHORIZATION, format!("Basic {}", encoded));
        Ok(())
    }
}
