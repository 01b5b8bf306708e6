//! Credential store backed by Kubernetes Secrets

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use metaproxy_core::{Credential, CredentialStore, SignError};
use tracing::debug;

/// Resolves credential ids (`namespace:name` or `name`) to Secret data
pub struct KubeSecretStore {
    client: Client,
    default_namespace: String,
}

impl KubeSecretStore {
    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            default_namespace: default_namespace.into(),
        }
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }
}

/// Split a credential id into namespace and name
pub fn split_credential_id<'a>(credential_id: &'a str, default_namespace: &'a str) -> (&'a str, &'a str) {
    match credential_id.split_once(':') {
        Some((namespace, name)) => (namespace, name),
        None => (default_namespace, credential_id),
    }
}

/// Decoded fields of a Secret; `stringData` wins over `data`
pub fn secret_fields(secret: &Secret) -> Credential {
    let mut fields: Credential = secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), String::from_utf8_lossy(&v.0).into_owned()))
        .collect();
    if let Some(string_data) = &secret.string_data {
        fields.extend(string_data.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    fields
}

#[async_trait::async_trait]
impl CredentialStore for KubeSecretStore {
    async fn get(&self, credential_id: &str) -> Result<Credential, SignError> {
        let (namespace, name) = split_credential_id(credential_id, &self.default_namespace);
        if namespace.is_empty() || name.is_empty() {
            return Err(SignError::CredentialNotFound(credential_id.to_string()));
        }

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match secrets.get_opt(name).await {
            Ok(Some(secret)) => {
                debug!("Loaded credential {}/{}", namespace, name);
                Ok(secret_fields(&secret))
            }
            Ok(None) => Err(SignError::CredentialNotFound(credential_id.to_string())),
            Err(e) => Err(SignError::Store(e.to_string())),
        }
    }
}
