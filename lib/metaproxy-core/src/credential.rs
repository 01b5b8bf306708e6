//! Credential references and the secret store contract

use crate::error::SignError;
use std::collections::{BTreeMap, HashMap};

/// Secret fields of a stored credential
pub type Credential = BTreeMap<String, String>;

/// Keyed secret lookup shared by all signers
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a credential by id (`namespace:name` or `name`)
    async fn get(&self, credential_id: &str) -> Result<Credential, SignError>;
}

/// Look up a required field of a credential
pub fn credential_field<'a>(
    credential_id: &str,
    credential: &'a Credential,
    field: &str,
) -> Result<&'a str, SignError> {
    credential
        .get(field)
        .map(String::as_str)
        .ok_or_else(|| SignError::MissingField {
            credential: credential_id.to_string(),
            field: field.to_string(),
        })
}

/// In-memory credential store
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: HashMap<String, Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential<I, K, V>(mut self, credential_id: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.insert(credential_id, fields);
        self
    }

    pub fn insert<I, K, V>(&mut self, credential_id: &str, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let credential = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.credentials.insert(credential_id.to_string(), credential);
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, credential_id: &str) -> Result<Credential, SignError> {
        self.credentials
            .get(credential_id)
            .cloned()
            .ok_or_else(|| SignError::CredentialNotFound(credential_id.to_string()))
    }
}

/// A parsed delegated credential reference.
///
/// Syntax: `<scheme> key=value [key=value ...]`, separated by whitespace.
/// Tokens after the scheme without `=` are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthParams {
    scheme: String,
    params: BTreeMap<String, String>,
}

impl AuthParams {
    pub fn parse(raw: &str) -> Self {
        let mut tokens = raw.split_ascii_whitespace();
        let scheme = tokens.next().unwrap_or_default().to_string();
        let params = tokens
            .filter_map(|token| token.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { scheme, params }
    }

    /// Scheme token as written
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, SignError> {
        match self.get(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(SignError::MissingParameter(key.to_string())),
        }
    }

    /// The `credID` parameter naming the stored credential
    pub fn credential_id(&self) -> Result<&str, SignError> {
        self.require("credID")
    }
}
