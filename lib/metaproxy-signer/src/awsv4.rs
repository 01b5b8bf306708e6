//! AWS Signature Version 4 signing

use crate::Signer;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use metaproxy_core::headers::names;
use metaproxy_core::{credential_field, AuthParams, CredentialStore, OutboundRequest, SignError};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const DEFAULT_REGION: &str = "us-east-1";

/// `awsv4 credID=<id> [accessKeyField=..] [secretKeyField=..] [sessionTokenField=..] [region=..] [service=..]`
///
/// Service and region default to the labels of a
/// `<service>.<region>.amazonaws.com` destination.
pub struct AwsV4Signer {
    clock: fn() -> DateTime<Utc>,
}

impl Default for AwsV4Signer {
    fn default() -> Self {
        Self { clock: Utc::now }
    }
}

impl AwsV4Signer {
    /// Signer with a fixed clock, for reproducible signatures
    pub fn with_clock(clock: fn() -> DateTime<Utc>) -> Self {
        Self { clock }
    }
}

/// Key material and scope for one signature
pub struct SigningScope<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub session_token: Option<&'a str>,
    pub region: &'a str,
    pub service: &'a str,
}

/// `(service, region)` derived from an `amazonaws.com` hostname
fn scope_from_host(host: &str) -> Option<(&str, &str)> {
    let labels: Vec<&str> = host.strip_suffix(".amazonaws.com")?.split('.').collect();
    match labels.as_slice() {
        [service] => Some((*service, DEFAULT_REGION)),
        [service, region, ..] => Some((*service, *region)),
        [] => None,
    }
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode everything outside the unreserved set, as SigV4 expects
fn uri_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Decode each pair, re-encode it canonically, then sort
fn canonical_query(query: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> =
        form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
            .collect();
    pairs.sort_unstable();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign `request` in place at time `now`
pub fn sign_request(request: &mut OutboundRequest, scope: &SigningScope<'_>, now: DateTime<Utc>) {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = sha256_hex(&request.body);

    let host = match request.headers.get(names::HOST) {
        Some(host) => host.to_string(),
        None => metaproxy_core::authority_host(&request.url),
    };

    request.headers.set("X-Amz-Date", amz_date.as_str());
    request.headers.set("X-Amz-Content-Sha256", payload_hash.as_str());

    let mut signed: Vec<(&str, &str)> = vec![
        ("host", host.as_str()),
        ("x-amz-content-sha256", payload_hash.as_str()),
        ("x-amz-date", amz_date.as_str()),
    ];
    if let Some(token) = scope.session_token {
        request.headers.set("X-Amz-Security-Token", token);
        signed.push(("x-amz-security-token", token));
    }

    let canonical_headers: String = signed
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = signed
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let path = match request.url.path() {
        "" => "/",
        path => path,
    };
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.to_ascii_uppercase(),
        path,
        canonical_query(request.url.query()),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date, scope.region, scope.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(format!("AWS4{}", scope.secret_key).as_bytes(), &date);
    let k_region = hmac_sha256(&k_date, scope.region);
    let k_service = hmac_sha256(&k_region, scope.service);
    let k_signing = hmac_sha256(&k_service, "aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign));

    debug!("Signed request for {} in {}", scope.service, scope.region);

    request.headers.set(
        names::AUTHORIZATION,
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, scope.access_key, credential_scope, signed_headers, signature
        ),
    );
}

#[async_trait::async_trait]
impl Signer for AwsV4Signer {
    fn scheme(&self) -> &'static str {
        "awsv4"
    }

    async fn sign(
        &self,
        request: &mut OutboundRequest,
        store: &dyn CredentialStore,
        reference: &AuthParams,
    ) -> Result<(), SignError> {
        let credential_id = reference.credential_id()?;

        let derived = scope_from_host(request.hostname());
        let service = match (reference.get("service"), derived) {
            (Some(service), _) => service.to_string(),
            (None, Some((service, _))) => service.to_string(),
            (None, None) => return Err(SignError::MissingParameter("service".to_string())),
        };
        let region = match (reference.get("region"), derived) {
            (Some(region), _) => region.to_string(),
            (None, Some((_, region))) => region.to_string(),
            (None, None) => DEFAULT_REGION.to_string(),
        };

        let credential = store.get(credential_id).await?;
        let access_key = credential_field(
            credential_id,
            &credential,
            reference.get("accessKeyField").unwrap_or("accessKey"),
        )?;
        let secret_key = credential_field(
            credential_id,
            &credential,
            reference.get("secretKeyField").unwrap_or("secretKey"),
        )?;
        let session_token = match reference.get("sessionTokenField") {
            Some(field) => Some(credential_field(credential_id, &credential, field)?),
            None => None,
        };

        let scope = SigningScope {
            access_key,
            secret_key,
            session_token,
            region: &region,
            service: &service,
        };
        sign_request(request, &scope, (self.clock)());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::test_support::request;
    use chrono::TimeZone;
    use metaproxy_core::MemoryCredentialStore;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn store() -> MemoryCredentialStore {
        MemoryCredentialStore::new().with_credential(
            "cattle-global-data:cc-aws",
            [
                ("accessKey", "AKIDEXAMPLE"),
                ("secretKey", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
            ],
        )
    }

    #[test]
    fn test_scope_from_host() {
        assert_eq!(scope_from_host("ec2.us-west-2.amazonaws.com"), Some(("ec2", "us-west-2")));
        assert_eq!(scope_from_host("iam.amazonaws.com"), Some(("iam", "us-east-1")));
        assert_eq!(scope_from_host("example.com"), None);
    }

    #[test]
    fn test_canonical_query_sorted() {
        assert_eq!(
            canonical_query(Some("Version=2016-11-15&Action=DescribeRegions")),
            "Action=DescribeRegions&Version=2016-11-15"
        );
        assert_eq!(canonical_query(Some("b&a=1")), "a=1&b=");
        assert_eq!(canonical_query(None), "");
    }

    #[test]
    fn test_canonical_query_encoded() {
        assert_eq!(
            canonical_query(Some("prefix=a/b&key=x%20y+z&k%C3%A9=1")),
            "k%C3%A9=1&key=x%20y%20z&prefix=a%2Fb"
        );
        // already-encoded and unreserved characters normalise the same way
        assert_eq!(canonical_query(Some("p=a%2fb&t=%7E")), "p=a%2Fb&t=~");
    }

    #[tokio::test]
    async fn test_known_signature() {
        let mut req = request("https://ec2.us-west-2.amazonaws.com/?Version=2016-11-15&Action=DescribeRegions");
        req.headers.set("Host", "ec2.us-west-2.amazonaws.com");

        AwsV4Signer::with_clock(fixed_clock)
            .sign(&mut req, &store(), &AuthParams::parse("awsv4 credID=cattle-global-data:cc-aws"))
            .await
            .expect("signing succeeds");

        assert_eq!(req.headers.get("x-amz-date"), Some("20261018T120000Z"));
        assert_eq!(
            req.headers.get("x-amz-content-sha256"),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
        assert_eq!(
            req.headers.get("authorization"),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20261018/us-west-2/ec2/aws4_request, \
                 SignedHeaders=host;x-amz-content-sha256;x-amz-date, \
                 Signature=cadf3e6e1534b1fe0585eb27d1205207c8a2609007e7ebf63b9c6a45ae3ab743"
            )
        );
    }

    #[tokio::test]
    async fn test_session_token_is_signed() {
        let store = MemoryCredentialStore::new().with_credential(
            "ns:sts",
            [("ak", "AKID"), ("sk", "secret"), ("token", "session-token")],
        );
        let mut req = request("https://sts.amazonaws.com/");

        AwsV4Signer::with_clock(fixed_clock)
            .sign(
                &mut req,
                &store,
                &AuthParams::parse(
                    "awsv4 credID=ns:sts accessKeyField=ak secretKeyField=sk sessionTokenField=token",
                ),
            )
            .await
            .expect("signing succeeds");

        assert_eq!(req.headers.get("x-amz-security-token"), Some("session-token"));
        let auth = req.headers.get("authorization").unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKID/20261018/us-east-1/sts/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"));
    }

    #[tokio::test]
    async fn test_non_aws_host_requires_service() {
        let mut req = request("https://minio.example.com/bucket");
        let err = AwsV4Signer::with_clock(fixed_clock)
            .sign(&mut req, &store(), &AuthParams::parse("awsv4 credID=cattle-global-data:cc-aws"))
            .await
            .unwrap_err();
        assert_eq!(err, SignError::MissingParameter("service".to_string()));

        AwsV4Signer::with_clock(fixed_clock)
            .sign(
                &mut req,
                &store(),
                &AuthParams::parse("awsv4 credID=cattle-global-data:cc-aws service=s3 region=eu-west-1"),
            )
            .await
            .expect("explicit scope signs");
        assert!(req
            .headers
            .get("authorization")
            .unwrap()
            .contains("/20261018/eu-west-1/s3/aws4_request"));
    }
}
