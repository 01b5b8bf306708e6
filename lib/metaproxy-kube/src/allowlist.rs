//! Allow-list sourced from a watched ConfigMap

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use kube_runtime::{watcher, WatchStreamExt};
use metaproxy_core::SharedHosts;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Location of the allow-list ConfigMap
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AllowListSource {
    pub namespace: String,
    pub name: String,
    /// Data key holding the host patterns
    #[serde(default = "default_key")]
    pub key: String,
}

fn default_key() -> String {
    "hosts".to_string()
}

/// Parse host patterns separated by commas, whitespace or newlines.
///
/// Lines starting with `#` are comments.
pub fn parse_hosts(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keeps a [`SharedHosts`] in sync with a ConfigMap.
///
/// A deleted ConfigMap, or one missing the key, empties the allow-list.
pub struct ConfigMapHosts {
    client: Client,
    source: AllowListSource,
    hosts: Arc<SharedHosts>,
}

impl ConfigMapHosts {
    pub fn new(client: Client, source: AllowListSource, hosts: Arc<SharedHosts>) -> Self {
        Self {
            client,
            source,
            hosts,
        }
    }

    fn hosts_from(&self, config_map: &ConfigMap) -> Vec<String> {
        config_map
            .data
            .as_ref()
            .and_then(|data| data.get(&self.source.key))
            .map(|raw| parse_hosts(raw))
            .unwrap_or_default()
    }

    fn publish(&self, hosts: Vec<String>) {
        info!(
            "Allow-list {}/{} now has {} host patterns",
            self.source.namespace,
            self.source.name,
            hosts.len()
        );
        self.hosts.replace(hosts);
    }

    /// Watch the ConfigMap until the stream ends
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "Watching allow-list ConfigMap {}/{} (key {:?})",
            self.source.namespace, self.source.name, self.source.key
        );

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.source.namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={}", self.source.name));
        let mut stream = watcher(config_maps, config).default_backoff().boxed();

        // Tracks whether the current (re)list saw the ConfigMap at all
        let mut seen_in_relist = false;

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Init) => {
                    debug!("Allow-list watch (re)listing");
                    seen_in_relist = false;
                }
                Ok(watcher::Event::InitApply(config_map)) => {
                    seen_in_relist = true;
                    self.publish(self.hosts_from(&config_map));
                }
                Ok(watcher::Event::InitDone) => {
                    if !seen_in_relist {
                        warn!(
                            "Allow-list ConfigMap {}/{} not found, rejecting all destinations",
                            self.source.namespace, self.source.name
                        );
                        self.publish(Vec::new());
                    }
                }
                Ok(watcher::Event::Apply(config_map)) => {
                    self.publish(self.hosts_from(&config_map));
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!(
                        "Allow-list ConfigMap {}/{} deleted, rejecting all destinations",
                        self.source.namespace, self.source.name
                    );
                    self.publish(Vec::new());
                }
                Err(e) => warn!("Allow-list watch error: {}", e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts_mixed_separators() {
        let raw = "api.example.com, *.amazonaws.com\n# legacy\n*.digitalocean.com  linode.com\n\n";
        assert_eq!(
            parse_hosts(raw),
            vec![
                "api.example.com",
                "*.amazonaws.com",
                "*.digitalocean.com",
                "linode.com",
            ]
        );
    }

    #[test]
    fn test_parse_hosts_empty() {
        assert!(parse_hosts("").is_empty());
        assert!(parse_hosts("# nothing here\n").is_empty());
    }

    #[test]
    fn test_source_key_defaults_to_hosts() {
        let source: AllowListSource =
            serde_json::from_str(r#"{"namespace":"cattle-system","name":"proxy-allow-list"}"#).unwrap();
        assert_eq!(source.key, "hosts");
    }
}
