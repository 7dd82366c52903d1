use anyhow::{Context, Result};
use shared::protocol::{Attachment, Field, Message, COLOR_DANGER, COLOR_GOOD};
use shared::types::{HealthDelta, HealthState, ServiceMap, TopologyDelta};
use crate::config::SlackConfig;

/// Posts messages to the configured incoming webhook.
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.webhook_url.clone(),
        }
    }

    /// Delivery failures are reported to the caller but are never fatal to
    /// the watch loop; the caller logs and moves on.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(message)
            .send()
            .await
            .context("Failed to reach webhook")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::info!("Webhook response ({}): {}", status, body);

        if !status.is_success() {
            anyhow::bail!("Webhook rejected message: {} {}", status, body);
        }
        Ok(())
    }
}

fn base_message(config: &SlackConfig, text: String) -> Message {
    Message {
        username: config.bot_name.clone(),
        icon_emoji: config.icon_emoji.clone(),
        channel: config.channel.clone(),
        text,
        attachments: Vec::new(),
    }
}

fn mentions(config: &SlackConfig) -> String {
    config
        .notify_users
        .iter()
        .map(|user| format!(" @{}", user))
        .collect()
}

fn vars_attachment(vars: &[(String, String)]) -> Option<Attachment> {
    if vars.is_empty() {
        return None;
    }
    Some(Attachment {
        text: "appended variables from consul".to_string(),
        color: None,
        fields: vars
            .iter()
            .map(|(key, value)| Field {
                title: key.clone(),
                value: value.clone(),
                short: false,
            })
            .collect(),
    })
}

fn node_fields<'a, I>(services: I) -> Vec<Field>
where
    I: IntoIterator<Item = (&'a String, Vec<&'a str>)>,
{
    services
        .into_iter()
        .map(|(service, nodes)| Field {
            title: service.clone(),
            value: nodes.join(", "),
            short: false,
        })
        .collect()
}

/// Startup summary: every known service with its node count.
pub fn startup_message(
    config: &SlackConfig,
    services: &ServiceMap,
    vars: &[(String, String)],
) -> Message {
    let mut listing = String::new();
    for (service, nodes) in services {
        let term = if nodes.len() == 1 { "node" } else { "nodes" };
        listing.push_str(&format!("- {} ({} {})\n", service, nodes.len(), term));
    }

    let mut message = base_message(
        config,
        "starting! watching the following services:".to_string(),
    );
    message.attachments.push(Attachment {
        text: listing,
        color: Some(COLOR_GOOD),
        fields: Vec::new(),
    });
    message.attachments.extend(vars_attachment(vars));
    message
}

/// One attachment per non-empty delta field: green for additions, red for
/// removals, node maps rendered as per-service field lists.
pub fn topology_message(
    config: &SlackConfig,
    delta: &TopologyDelta,
    vars: &[(String, String)],
) -> Message {
    let text = format!("something changed in the registry!{}", mentions(config));
    let mut message = base_message(config, text);

    if !delta.new_services.is_empty() {
        let names: Vec<&str> = delta.new_services.iter().map(String::as_str).collect();
        message.attachments.push(Attachment {
            text: format!("new services:\n{}", names.join(", ")),
            color: Some(COLOR_GOOD),
            fields: Vec::new(),
        });
    }

    if !delta.missing_services.is_empty() {
        let names: Vec<&str> = delta.missing_services.iter().map(String::as_str).collect();
        message.attachments.push(Attachment {
            text: format!("missing services:\n{}", names.join(", ")),
            color: Some(COLOR_DANGER),
            fields: Vec::new(),
        });
    }

    if !delta.missing_nodes.is_empty() {
        message.attachments.push(Attachment {
            text: "missing nodes!".to_string(),
            color: Some(COLOR_DANGER),
            fields: node_fields(
                delta
                    .missing_nodes
                    .iter()
                    .map(|(service, nodes)| (service, nodes.iter().map(String::as_str).collect())),
            ),
        });
    }

    if !delta.new_nodes.is_empty() {
        message.attachments.push(Attachment {
            text: "new nodes!".to_string(),
            color: Some(COLOR_GOOD),
            fields: node_fields(
                delta
                    .new_nodes
                    .iter()
                    .map(|(service, nodes)| (service, nodes.iter().map(String::as_str).collect())),
            ),
        });
    }

    message.attachments.extend(vars_attachment(vars));
    message
}

/// One attachment per state with newly-appeared checks, colored by state.
pub fn health_message(
    config: &SlackConfig,
    delta: &HealthDelta,
    vars: &[(String, String)],
) -> Message {
    let text = format!("health state changed!{}", mentions(config));
    let mut message = base_message(config, text);

    for state in HealthState::ALL {
        let appeared = delta.state(state);
        if appeared.is_empty() {
            continue;
        }
        message.attachments.push(Attachment {
            text: format!("now {}:", state),
            color: Some(state.color()),
            fields: appeared
                .values()
                .map(|record| Field {
                    title: format!("{} ({})", record.id, record.node),
                    value: record.output.clone(),
                    short: false,
                })
                .collect(),
        });
    }

    message.attachments.extend(vars_attachment(vars));
    message
}

/// Sent once on the Connected to Disconnected transition.
pub fn connection_lost_message(config: &SlackConfig, error: &str) -> Message {
    let text = format!("cant connect to consul!{}", mentions(config));
    let mut message = base_message(config, text);
    message.attachments.push(Attachment {
        text: error.to_string(),
        color: Some(COLOR_DANGER),
        fields: Vec::new(),
    });
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use shared::protocol::COLOR_WARNING;
    use shared::types::HealthRecord;

    fn test_config() -> SlackConfig {
        SlackConfig {
            webhook_url: "https://hooks.slack.com/services/T000/B000/XXX".to_string(),
            bot_name: "consul-watchd".to_string(),
            icon_emoji: ":ghost:".to_string(),
            channel: None,
            notify_users: vec!["alice".to_string(), "bob".to_string()],
        }
    }

    #[test]
    fn test_topology_message_colors_and_mentions() {
        let delta = TopologyDelta {
            new_services: BTreeSet::from(["web".to_string()]),
            missing_services: BTreeSet::from(["redis".to_string()]),
            new_nodes: BTreeMap::from([(
                "web".to_string(),
                BTreeSet::from(["web-1".to_string()]),
            )]),
            missing_nodes: BTreeMap::from([(
                "redis".to_string(),
                BTreeSet::from(["redis-1".to_string(), "redis-2".to_string()]),
            )]),
        };

        let message = topology_message(&test_config(), &delta, &[]);
        assert!(message.text.contains("@alice"));
        assert!(message.text.contains("@bob"));
        assert_eq!(message.attachments.len(), 4);

        let colors: Vec<_> = message.attachments.iter().map(|a| a.color).collect();
        assert_eq!(
            colors,
            vec![
                Some(COLOR_GOOD),
                Some(COLOR_DANGER),
                Some(COLOR_DANGER),
                Some(COLOR_GOOD)
            ]
        );

        let missing = &message.attachments[2];
        assert_eq!(missing.fields[0].title, "redis");
        assert_eq!(missing.fields[0].value, "redis-1, redis-2");
    }

    #[test]
    fn test_topology_message_skips_empty_sections() {
        let delta = TopologyDelta {
            new_nodes: BTreeMap::from([(
                "web".to_string(),
                BTreeSet::from(["web-2".to_string()]),
            )]),
            ..Default::default()
        };
        let message = topology_message(&test_config(), &delta, &[]);
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].text, "new nodes!");
    }

    #[test]
    fn test_health_message_per_state_colors() {
        let mut delta = HealthDelta::default();
        delta.critical.insert(
            "service:redis".to_string(),
            HealthRecord {
                id: "service:redis".to_string(),
                name: "Service 'redis' check".to_string(),
                node: "node1".to_string(),
                output: "connection refused".to_string(),
            },
        );
        delta.warning.insert(
            "service:web".to_string(),
            HealthRecord {
                id: "service:web".to_string(),
                name: "Service 'web' check".to_string(),
                node: "node2".to_string(),
                output: "slow response".to_string(),
            },
        );

        let message = health_message(&test_config(), &delta, &[]);
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[0].color, Some(COLOR_WARNING));
        assert_eq!(message.attachments[1].color, Some(COLOR_DANGER));
        assert_eq!(
            message.attachments[1].fields[0].title,
            "service:redis (node1)"
        );
        assert_eq!(message.attachments[1].fields[0].value, "connection refused");
    }

    #[test]
    fn test_startup_message_node_counts() {
        let services = ServiceMap::from([
            ("redis".to_string(), vec!["redis-1".to_string()]),
            (
                "web".to_string(),
                vec!["web-1".to_string(), "web-2".to_string()],
            ),
        ]);
        let vars = vec![("deploy/version".to_string(), "1.4.2".to_string())];

        let message = startup_message(&test_config(), &services, &vars);
        let listing = &message.attachments[0].text;
        assert!(listing.contains("- redis (1 node)"));
        assert!(listing.contains("- web (2 nodes)"));

        let vars_block = &message.attachments[1];
        assert_eq!(vars_block.fields[0].title, "deploy/version");
        assert_eq!(vars_block.fields[0].value, "1.4.2");
    }

    #[test]
    fn test_message_serialization_shape() {
        let message = connection_lost_message(&test_config(), "timeout");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["username"], "consul-watchd");
        assert_eq!(json["icon_emoji"], ":ghost:");
        assert!(json.get("channel").is_none());
        assert_eq!(json["attachments"][0]["color"], COLOR_DANGER);
        assert_eq!(json["attachments"][0]["text"], "timeout");
    }
}
