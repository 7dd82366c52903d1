use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use shared::types::{HealthMap, ServiceMap};
use crate::config::Config;
use crate::consul::ConsulClient;
use crate::diff::{diff_health, diff_topology};
use crate::slack::{
    self, connection_lost_message, health_message, startup_message, topology_message,
};

/// Registry connectivity, tracked explicitly so the "cant connect" alert
/// fires once per outage instead of once per failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    Disconnected { since: DateTime<Utc> },
}

impl ConnState {
    /// Records a failed cycle. Returns true only on the edge into the
    /// disconnected state; repeat failures return false.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        match self {
            ConnState::Connected => {
                *self = ConnState::Disconnected { since: now };
                true
            }
            ConnState::Disconnected { .. } => false,
        }
    }

    /// Records a successful cycle. Returns the outage duration when this
    /// cycle ends an outage.
    pub fn record_success(&mut self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match *self {
            ConnState::Connected => None,
            ConnState::Disconnected { since } => {
                *self = ConnState::Connected;
                Some(now - since)
            }
        }
    }
}

/// Exponential backoff for the startup retry, doubling from one second up to
/// the configured cap.
pub fn backoff_delay(attempt: u32, cap_secs: u64) -> Duration {
    let secs = 1u64
        .checked_shl(attempt)
        .unwrap_or(cap_secs)
        .min(cap_secs.max(1));
    Duration::from_secs(secs)
}

pub struct Watcher {
    consul: ConsulClient,
    notifier: slack::Notifier,
    config: Config,
    conn: ConnState,
    services: ServiceMap,
    health: HealthMap,
}

impl Watcher {
    pub fn new(consul: ConsulClient, notifier: slack::Notifier, config: Config) -> Self {
        Self {
            consul,
            notifier,
            config,
            conn: ConnState::Connected,
            services: ServiceMap::new(),
            health: HealthMap::default(),
        }
    }

    /// Waits until the registry reports at least one service, backing off
    /// between attempts. Honors `startup_max_attempts` when non-zero.
    async fn wait_for_services(&self, cancel: &CancellationToken) -> Result<ServiceMap> {
        let mut attempt = 0u32;
        loop {
            match self.startup_probe().await {
                Ok(services) if !services.is_empty() => return Ok(services),
                Ok(_) => {
                    tracing::info!("Registry returned no services yet, retrying");
                }
                Err(e) => {
                    tracing::warn!("Startup fetch failed: {:#}", e);
                }
            }

            attempt += 1;
            let max = self.config.watch.startup_max_attempts;
            if max != 0 && attempt >= max {
                anyhow::bail!("Registry still empty after {} attempts", attempt);
            }

            let delay = backoff_delay(attempt, self.config.watch.startup_retry_max_secs);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => anyhow::bail!("Cancelled during startup"),
            }
        }
    }

    async fn startup_probe(&self) -> Result<ServiceMap> {
        let leader = self.consul.leader().await?;
        tracing::debug!("Consul leader: {}", leader);
        self.consul.fetch_service_map().await
    }

    /// Main loop: fetch, diff against the retained snapshots, notify on a
    /// non-empty delta, replace the snapshots, sleep.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.services = self.wait_for_services(&cancel).await?;
        self.health = self
            .consul
            .fetch_health_map()
            .await
            .context("Initial health fetch failed")?;

        let vars = self.fetch_vars().await;
        let message = startup_message(&self.config.slack, &self.services, &vars);
        if let Err(e) = self.notifier.send(&message).await {
            tracing::error!("Failed to send startup message: {:#}", e);
        }

        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.watch.poll_interval_secs,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await;
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Watcher shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn poll_once(&mut self) {
        let snapshots = async {
            let services = self.consul.fetch_service_map().await?;
            let health = self.consul.fetch_health_map().await?;
            anyhow::Ok((services, health))
        }
        .await;

        match snapshots {
            Ok((services, health)) => self.handle_snapshots(services, health).await,
            Err(e) => self.handle_fetch_failure(e).await,
        }
    }

    async fn handle_snapshots(&mut self, services: ServiceMap, health: HealthMap) {
        if let Some(outage) = self.conn.record_success(Utc::now()) {
            tracing::info!(
                "Registry connectivity restored after {}s",
                outage.num_seconds()
            );
        }

        let topology_delta = diff_topology(&self.services, &services);
        let health_delta = diff_health(&self.health, &health);

        if !topology_delta.is_empty() {
            tracing::info!(
                "Topology changed: {}",
                serde_json::to_string(&topology_delta).unwrap_or_default()
            );
            let vars = self.fetch_vars().await;
            let message = topology_message(&self.config.slack, &topology_delta, &vars);
            if let Err(e) = self.notifier.send(&message).await {
                tracing::error!("Failed to send topology diff: {:#}", e);
            }
        }

        if !health_delta.is_empty() {
            tracing::info!(
                "Health changed: {}",
                serde_json::to_string(&health_delta).unwrap_or_default()
            );
            let vars = self.fetch_vars().await;
            let message = health_message(&self.config.slack, &health_delta, &vars);
            if let Err(e) = self.notifier.send(&message).await {
                tracing::error!("Failed to send health diff: {:#}", e);
            }
        }

        // Retained snapshots are replaced every cycle, diff or not. With set
        // semantics an empty delta means the snapshots are equivalent, so
        // this only refreshes display order.
        self.services = services;
        self.health = health;
    }

    async fn handle_fetch_failure(&mut self, error: anyhow::Error) {
        tracing::error!("Failed to fetch registry snapshot: {:#}", error);
        if self.conn.record_failure(Utc::now()) {
            let message = connection_lost_message(&self.config.slack, &format!("{:#}", error));
            if let Err(e) = self.notifier.send(&message).await {
                tracing::error!("Failed to send connectivity alert: {:#}", e);
            }
        }
    }

    async fn fetch_vars(&self) -> Vec<(String, String)> {
        match self
            .consul
            .fetch_additional_vars(&self.config.consul.additional_vars)
            .await
        {
            Ok(vars) => vars,
            Err(e) => {
                tracing::warn!("Failed to fetch additional vars: {:#}", e);
                Vec::new()
            }
        }
    }
}
