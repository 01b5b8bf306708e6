use crate::Signer;
use metaproxy_core::headers::{is_denied, names};
use metaproxy_core::{credential_field, AuthParams, CredentialStore, OutboundRequest, SignError};

/// `arbitrary credID=<id> headers=<Name>:<field>[,<Name>:<field>...]`
///
/// Sets each named header to the value of a credential field, for APIs that
/// authenticate with custom headers such as `X-Auth-Token`.
pub struct ArbitrarySigner;

/// Headers a mapping may not target: the deny-list plus `Cookie`, which
/// cookie isolation owns
fn is_protected(header: &str) -> bool {
    is_denied(header) || header.eq_ignore_ascii_case(names::COOKIE)
}

fn parse_header_mapping(mapping: &str) -> Result<Vec<(&str, &str)>, SignError> {
    mapping
        .split(',')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((header, _)) if is_protected(header) => Err(SignError::InvalidParameter {
                name: "headers".to_string(),
                reason: format!("header {:?} cannot be set by a credential", header),
            }),
            Some((header, field)) if !header.is_empty() && !field.is_empty() => Ok((header, field)),
            _ => Err(SignError::InvalidParameter {
                name: "headers".to_string(),
                reason: format!("expected <Header>:<field>, got {:?}", entry),
            }),
        })
        .collect()
}

#[async_trait::async_trait]
impl Signer for ArbitrarySigner {
    fn scheme(&self) -> &'static str {
        "arbitrary"
    }

    async fn sign(
        &self,
        request: &mut OutboundRequest,
        store: &dyn CredentialStore,
        reference: &AuthParams,
    ) -> Result<(), SignError> {
        let credential_id = reference.credential_id()?;
        let mapping = parse_header_mapping(reference.require("headers")?)?;
        if mapping.is_empty() {
            return Err(SignError::MissingParameter("headers".to_string()));
        }

        let credential = store.get(credential_id).await?;
        // Resolve every field before touching the request
        let values = mapping
            .iter()
            .map(|(header, field)| {
                credential_field(credential_id, &credential, field).map(|v| (*header, v.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (header, value) in values {
            request.headers.set(header, value);
        }
        Ok(())
    }
}
