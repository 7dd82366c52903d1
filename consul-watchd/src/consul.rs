use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::Deserialize;
use shared::types::{HealthMap, HealthRecord, HealthState, ServiceMap};
use crate::config::ConsulConfig;

/// One entry from `/v1/agent/services`, keyed by instance id.
#[derive(Debug, Deserialize)]
pub struct AgentService {
    #[serde(rename = "Service")]
    pub service: String,
}

/// One entry from `/v1/health/state/{state}`.
#[derive(Debug, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "CheckID")]
    pub check_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Node")]
    pub node: String,
    #[serde(rename = "Output", default)]
    pub output: String,
}

/// Thin client over the Consul HTTP API.
pub struct ConsulClient {
    client: reqwest::Client,
    base_url: String,
}

impl ConsulClient {
    pub fn new(config: &ConsulConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", config.address, config.port),
        })
    }

    /// Connectivity probe. Returns the current leader address.
    pub async fn leader(&self) -> Result<String> {
        let leader: String = self
            .client
            .get(format!("{}/v1/status/leader", self.base_url))
            .send()
            .await
            .context("Failed to reach consul")?
            .error_for_status()
            .context("Leader query failed")?
            .json()
            .await
            .context("Failed to decode leader response")?;
        Ok(leader)
    }

    /// Current service topology from the local agent.
    pub async fn fetch_service_map(&self) -> Result<ServiceMap> {
        let instances: HashMap<String, AgentService> = self
            .client
            .get(format!("{}/v1/agent/services", self.base_url))
            .send()
            .await
            .context("Failed to reach consul")?
            .error_for_status()
            .context("Service query failed")?
            .json()
            .await
            .context("Failed to decode service list")?;

        Ok(build_service_map(instances))
    }

    /// Current health snapshot, one state query per fixed state.
    pub async fn fetch_health_map(&self) -> Result<HealthMap> {
        let (passing, warning, critical) = futures::try_join!(
            self.fetch_state_checks(HealthState::Passing),
            self.fetch_state_checks(HealthState::Warning),
            self.fetch_state_checks(HealthState::Critical),
        )?;

        Ok(HealthMap {
            passing,
            warning,
            critical,
        })
    }

    async fn fetch_state_checks(
        &self,
        state: HealthState,
    ) -> Result<BTreeMap<String, HealthRecord>> {
        let checks: Vec<HealthCheck> = self
            .client
            .get(format!("{}/v1/health/state/{}", self.base_url, state))
            .send()
            .await
            .context("Failed to reach consul")?
            .error_for_status()
            .with_context(|| format!("Health query for state {} failed", state))?
            .json()
            .await
            .with_context(|| format!("Failed to decode {} health checks", state))?;

        Ok(key_by_check_id(checks))
    }

    /// Value of a single KV key, None when the key does not exist.
    pub async fn fetch_kv(&self, key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/v1/kv/{}?raw", self.base_url, key))
            .send()
            .await
            .context("Failed to reach consul")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let value = response
            .error_for_status()
            .with_context(|| format!("KV query for {} failed", key))?
            .text()
            .await
            .with_context(|| format!("Failed to read KV value for {}", key))?;

        Ok(Some(value))
    }

    /// Fetches the configured display variables from the KV store. Missing
    /// keys render as "null", matching the message format.
    pub async fn fetch_additional_vars(&self, keys: &[String]) -> Result<Vec<(String, String)>> {
        let mut vars = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self.fetch_kv(key).await?.unwrap_or_else(|| "null".to_string());
            vars.push((key.clone(), value));
        }
        Ok(vars)
    }
}

/// Folds the instance-keyed agent response into service name to instance ids.
fn build_service_map(instances: HashMap<String, AgentService>) -> ServiceMap {
    let mut map = ServiceMap::new();
    for (instance_id, entry) in instances {
        map.entry(entry.service).or_default().push(instance_id);
    }
    // Instance order within a service is display-only; keep it stable.
    for nodes in map.values_mut() {
        nodes.sort();
    }
    map
}

fn key_by_check_id(checks: Vec<HealthCheck>) -> BTreeMap<String, HealthRecord> {
    checks
        .into_iter()
        .map(|check| {
            (
                check.check_id.clone(),
                HealthRecord {
                    id: check.check_id,
                    name: check.name,
                    node: check.node,
                    output: check.output,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_service_map_groups_by_service_name() {
        let instances: HashMap<String, AgentService> = serde_json::from_str(
            r#"{
                "redis-2": {"ID": "redis-2", "Service": "redis", "Port": 8001},
                "redis-1": {"ID": "redis-1", "Service": "redis", "Port": 8000},
                "web-1": {"ID": "web-1", "Service": "web", "Port": 80}
            }"#,
        )
        .unwrap();

        let map = build_service_map(instances);
        assert_eq!(map.len(), 2);
        assert_eq!(map["redis"], vec!["redis-1", "redis-2"]);
        assert_eq!(map["web"], vec!["web-1"]);
    }

    #[test]
    fn test_key_by_check_id() {
        let checks: Vec<HealthCheck> = serde_json::from_str(
            r#"[{
                "Node": "node1",
                "CheckID": "service:redis",
                "Name": "Service 'redis' check",
                "Status": "critical",
                "Output": "connection refused"
            }]"#,
        )
        .unwrap();

        let records = key_by_check_id(checks);
        let record = &records["service:redis"];
        assert_eq!(record.node, "node1");
        assert_eq!(record.output, "connection refused");
    }

    #[test]
    fn test_check_output_defaults_to_empty() {
        let checks: Vec<HealthCheck> = serde_json::from_str(
            r#"[{"Node": "node1", "CheckID": "serf", "Name": "Serf Health Status"}]"#,
        )
        .unwrap();
        assert_eq!(key_by_check_id(checks)["serf"].output, "");
    }
}
