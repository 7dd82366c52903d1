use std::collections::BTreeSet;
use shared::types::{HealthDelta, HealthMap, HealthState, ServiceMap, TopologyDelta};

/// Compares two topology snapshots and reports what appeared and what
/// vanished, at both the service and the node level.
///
/// Node differences are computed for every service in either snapshot, with
/// an absent service treated as having no nodes. A service present only in
/// `new` therefore lands in `new_services` and also contributes its whole
/// node list to `new_nodes`; a service present only in `old` does the
/// mirror image. The two signals are intentionally redundant.
pub fn diff_topology(old: &ServiceMap, new: &ServiceMap) -> TopologyDelta {
    let mut delta = TopologyDelta::default();

    let old_names: BTreeSet<&str> = old.keys().map(String::as_str).collect();
    let new_names: BTreeSet<&str> = new.keys().map(String::as_str).collect();

    delta.new_services = new_names
        .difference(&old_names)
        .map(|s| s.to_string())
        .collect();
    delta.missing_services = old_names
        .difference(&new_names)
        .map(|s| s.to_string())
        .collect();

    for service in old_names.union(&new_names) {
        let old_nodes: BTreeSet<&str> = old
            .get(*service)
            .map(|nodes| nodes.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let new_nodes: BTreeSet<&str> = new
            .get(*service)
            .map(|nodes| nodes.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let added: BTreeSet<String> = new_nodes
            .difference(&old_nodes)
            .map(|n| n.to_string())
            .collect();
        let missing: BTreeSet<String> = old_nodes
            .difference(&new_nodes)
            .map(|n| n.to_string())
            .collect();

        if !added.is_empty() {
            delta.new_nodes.insert(service.to_string(), added);
        }
        if !missing.is_empty() {
            delta.missing_nodes.insert(service.to_string(), missing);
        }
    }

    delta
}

/// Compares two health snapshots and reports, per state, the checks that are
/// newly in that state. A check transitioning between states counts as a new
/// appearance in its destination state; disappearances are not reported.
pub fn diff_health(old: &HealthMap, new: &HealthMap) -> HealthDelta {
    let mut delta = HealthDelta::default();

    for state in HealthState::ALL {
        let old_ids = old.state(state);
        let appeared = delta.state_mut(state);
        for (id, record) in new.state(state) {
            if !old_ids.contains_key(id) {
                appeared.insert(id.clone(), record.clone());
            }
        }
    }

    delta
}
