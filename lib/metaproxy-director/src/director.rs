//! The per-request transformation pipeline

use crate::auth::AuthResolver;
use crate::cookies::{isolate_cookies, relocate_set_cookies};
use crate::sanitize::{enforce_denied, sanitize_headers};
use metaproxy_core::headers::names;
use metaproxy_core::{
    resolve_destination, CredentialStore, HostSupplier, HostValidator, InboundRequest,
    OutboundRequest, ProxyResponse, Result,
};
use metaproxy_signer::SignerRegistry;
use std::sync::Arc;
use tracing::debug;

/// Rewrites proxy requests into safe outbound requests and their responses back
#[derive(Clone)]
pub struct Director {
    prefix: String,
    validator: HostValidator,
    auth: AuthResolver,
}

impl Director {
    pub fn new(
        prefix: impl Into<String>,
        hosts: Arc<dyn HostSupplier>,
        signers: SignerRegistry,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            validator: HostValidator::new(hosts),
            auth: AuthResolver::new(signers, credentials),
        }
    }

    /// Path prefix marking where the embedded destination begins
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the outbound request, or fail without producing anything to forward
    pub async fn direct(&self, inbound: &InboundRequest) -> Result<OutboundRequest> {
        let url = resolve_destination(&self.prefix, &inbound.path, inbound.query.as_deref())?;
        self.validator.validate(&url)?;

        let hostname = url.host_str().unwrap_or_default().to_string();
        let headers = sanitize_headers(&inbound.headers, &hostname, inbound.is_tls);

        let mut outbound = OutboundRequest {
            method: inbound.method.clone(),
            url,
            headers,
            body: inbound.body.clone(),
        };

        let decision = self.auth.resolve(&inbound.headers, &mut outbound).await?;
        enforce_denied(&mut outbound.headers, &hostname);
        isolate_cookies(&mut outbound.headers);

        debug!(
            "Directed {} {} -> {} (auth: {:?})",
            inbound.method, inbound.path, outbound.url, decision
        );
        Ok(outbound)
    }

    /// Rewrite a destination response before it reaches the caller.
    ///
    /// Only the proxy itself may mark a response as a proxy error.
    pub fn rewrite_response(&self, mut response: ProxyResponse) -> ProxyResponse {
        response.headers.remove(names::PROXY_ERROR);
        relocate_set_cookies(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::CountingSigner;
    use metaproxy_core::{DirectorError, MemoryCredentialStore, SharedHosts, SignError, StaticHosts};

    const PREFIX: &str = "/meta/proxy/";

    fn director(hosts: &[&str], signer: CountingSigner) -> Director {
        Director::new(
            PREFIX,
            Arc::new(StaticHosts::new(hosts.iter().copied())),
            SignerRegistry::with_defaults().register(signer),
            Arc::new(
                MemoryCredentialStore::new().with_credential("ns:do", [("token", "do-secret")]),
            ),
        )
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let d = director(&["*.example.com"], CountingSigner::default());
        let inbound = InboundRequest::new("POST", "/meta/proxy/https:/api.example.com/v1/items?embedded=1")
            .with_query("page=2")
            .with_header("Host", "rancher.local")
            .with_header("Content-Length", "5")
            .with_header("Accept", "rancher:application/json")
            .with_header("Cookie", "R_SESS=session")
            .with_header("X-Api-Cookie-Header", "theirs=1")
            .with_header("X-API-Auth-Header", "Bearer direct")
            .with_header("Impersonate-User", "admin")
            .with_tls(true)
            .with_body("hello");

        let outbound = d.direct(&inbound).await.expect("request is allowed");

        assert_eq!(outbound.method, "POST");
        assert_eq!(outbound.url.as_str(), "https://api.example.com/v1/items?page=2");
        assert_eq!(outbound.headers.get_all("host"), &["api.example.com"]);
        assert_eq!(outbound.headers.get("accept"), Some("application/json"));
        assert_eq!(outbound.headers.get_all("cookie"), &["theirs=1"]);
        assert_eq!(outbound.headers.get_all("authorization"), &["Bearer direct"]);
        assert_eq!(outbound.headers.get("x-forwarded-proto"), Some("https"));
        assert!(!outbound.headers.contains("content-length"));
        assert!(!outbound.headers.contains("x-api-auth-header"));
        assert!(!outbound.headers.contains("x-api-cookie-header"));
        assert!(!outbound.headers.contains("impersonate-user"));
        assert_eq!(&outbound.body[..], b"hello");
    }

    #[tokio::test]
    async fn test_disallowed_host_rejected() {
        let d = director(&["*.example.com"], CountingSigner::default());
        let inbound = InboundRequest::new("GET", "/meta/proxy/evilexample.com/steal");

        let err = d.direct(&inbound).await.unwrap_err();
        assert!(matches!(err, DirectorError::HostNotAllowed(h) if h == "evilexample.com"));
    }

    #[tokio::test]
    async fn test_allow_list_requeried_per_request() {
        let hosts = Arc::new(SharedHosts::new(vec!["api.example.com".to_string()]));
        let d = Director::new(
            PREFIX,
            hosts.clone(),
            SignerRegistry::new(),
            Arc::new(MemoryCredentialStore::new()),
        );
        let inbound = InboundRequest::new("GET", "/meta/proxy/api.example.com/");

        assert!(d.direct(&inbound).await.is_ok());
        hosts.replace(vec!["other.example.com".to_string()]);
        assert!(matches!(
            d.direct(&inbound).await,
            Err(DirectorError::HostNotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_signer_failure_blocks_request() {
        let signer = CountingSigner::failing();
        let d = director(&["api.example.com"], signer.clone());
        let inbound = InboundRequest::new("GET", "/meta/proxy/api.example.com/")
            .with_header("X-API-CattleAuth-Header", "counting credID=ns:missing");

        let err = d.direct(&inbound).await.unwrap_err();
        assert!(matches!(
            err,
            DirectorError::Signing(SignError::CredentialNotFound(_))
        ));
        assert_eq!(signer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_bearer_reference_signed_from_store() {
        let d = director(&["api.digitalocean.com"], CountingSigner::default());
        let inbound = InboundRequest::new("GET", "/meta/proxy/api.digitalocean.com/v2/sizes")
            .with_header("X-API-CattleAuth-Header", "Bearer credID=ns:do passwordField=token")
            .with_header("Cookie", "R_SESS=session");

        let outbound = d.direct(&inbound).await.expect("signed");
        assert_eq!(outbound.headers.get("authorization"), Some("Bearer do-secret"));
        // cookie isolation still applies after signing
        assert!(!outbound.headers.contains("cookie"));
    }

    #[tokio::test]
    async fn test_bad_destination_rejected() {
        let d = director(&["*"], CountingSigner::default());
        let inbound = InboundRequest::new("GET", "/meta/proxy/");
        assert!(matches!(
            d.direct(&inbound).await,
            Err(DirectorError::DestinationParse { .. })
        ));
    }

    /// Signer that writes headers it has no business touching
    struct OverreachingSigner;

    #[async_trait::async_trait]
    impl metaproxy_signer::Signer for OverreachingSigner {
        fn scheme(&self) -> &'static str {
            "overreach"
        }

        async fn sign(
            &self,
            request: &mut OutboundRequest,
            _store: &dyn CredentialStore,
            _reference: &metaproxy_core::AuthParams,
        ) -> std::result::Result<(), SignError> {
            request.headers.set("Impersonate-User", "system:admin");
            request.headers.set("Impersonate-Group", "system:masters");
            request.headers.set("Host", "evil.internal");
            request.headers.set("Transfer-Encoding", "chunked");
            request.headers.set("Authorization", "Signed overreach");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_signer_cannot_add_denied_headers() {
        let d = Director::new(
            PREFIX,
            Arc::new(StaticHosts::new(["api.example.com"])),
            SignerRegistry::new().register(OverreachingSigner),
            Arc::new(MemoryCredentialStore::new()),
        );
        let inbound = InboundRequest::new("GET", "/meta/proxy/api.example.com/")
            .with_header("X-API-CattleAuth-Header", "overreach credID=ns:x");

        let outbound = d.direct(&inbound).await.expect("signed");

        for denied in crate::sanitize::DENIED_HEADERS.iter().filter(|h| **h != "host") {
            assert!(!outbound.headers.contains(denied), "{} reached outbound", denied);
        }
        assert_eq!(outbound.headers.get_all("host"), &["api.example.com"]);
        assert_eq!(outbound.headers.get("authorization"), Some("Signed overreach"));
    }

    #[tokio::test]
    async fn test_arbitrary_mapping_to_denied_header_rejected() {
        let d = Director::new(
            PREFIX,
            Arc::new(StaticHosts::new(["api.example.com"])),
            SignerRegistry::with_defaults(),
            Arc::new(
                MemoryCredentialStore::new()
                    .with_credential("ns:c", [("u", "system:admin"), ("h", "evil.internal")]),
            ),
        );
        let inbound = InboundRequest::new("GET", "/meta/proxy/api.example.com/").with_header(
            "X-API-CattleAuth-Header",
            "arbitrary credID=ns:c headers=Impersonate-User:u,Host:h",
        );

        let err = d.direct(&inbound).await.unwrap_err();
        assert!(matches!(
            err,
            DirectorError::Signing(SignError::InvalidParameter { .. })
        ));
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_destination_cannot_claim_proxy_error() {
        let d = director(&[], CountingSigner::default());
        let response = ProxyResponse::new(200)
            .with_header("X-Api-Proxy-Error", "true")
            .with_header("Set-Cookie", "R_SESS=attacker; Path=/");

        let response = d.rewrite_response(response);
        assert!(!response.headers.contains("x-api-proxy-error"));
        assert!(!response.headers.contains("set-cookie"));
        assert_eq!(
            response.headers.get_all("x-api-set-cookie-header"),
            &["R_SESS=attacker; Path=/"]
        );
    }

    #[test]
    fn test_rewrite_response() {
        let d = director(&[], CountingSigner::default());
        let response = ProxyResponse::new(200)
            .with_header("Set-Cookie", "a=1")
            .with_header("Set-Cookie", "b=2")
            .with_body("ok");

        let response = d.rewrite_response(response);
        assert_eq!(response.headers.get_all("set-cookie").len(), 0);
        assert_eq!(response.headers.get_all("x-api-set-cookie-header"), &["a=1", "b=2"]);
        assert_eq!(&response.body[..], b"ok");
    }
}
