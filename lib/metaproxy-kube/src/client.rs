//! Kubernetes client for metaproxy collaborators

use crate::{AllowListSource, ConfigMapHosts, KubeSecretStore};
use kube::Client;
use metaproxy_core::SharedHosts;
use std::sync::Arc;

/// KubeClient wraps the Kubernetes client and builds the cluster-backed collaborators
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Connect using the in-cluster or kubeconfig defaults
    pub async fn new() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Get the underlying Kubernetes client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Credential store reading Secrets, defaulting to `namespace` for bare ids
    pub fn secret_store(&self, namespace: &str) -> KubeSecretStore {
        KubeSecretStore::new(self.client.clone(), namespace)
    }

    /// Watcher publishing the ConfigMap's host patterns into `hosts`
    pub fn allow_list_watcher(&self, source: AllowListSource, hosts: Arc<SharedHosts>) -> ConfigMapHosts {
        ConfigMapHosts::new(self.client.clone(), source, hosts)
    }
}
