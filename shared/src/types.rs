use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Deserialize, Serialize};

/// Service topology as reported by the registry: service name mapped to the
/// node/instance ids currently registered for it.
///
/// A sorted map keeps display output stable across cycles. Node list order is
/// preserved for display only; diffing uses set semantics, so duplicates and
/// reordering never register as changes.
pub type ServiceMap = BTreeMap<String, Vec<String>>;

/// The three health states a registry check can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Passing,
    Warning,
    Critical,
}

impl HealthState {
    pub const ALL: [HealthState; 3] = [
        HealthState::Passing,
        HealthState::Warning,
        HealthState::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Passing => "passing",
            HealthState::Warning => "warning",
            HealthState::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single health check result for a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Check identifier, unique within a state.
    pub id: String,
    /// Human-readable check name.
    pub name: String,
    /// Node the check runs on.
    pub node: String,
    /// Free-text diagnostic output from the check.
    pub output: String,
}

/// Health snapshot: per state, the checks currently in that state keyed by
/// check id. One field per state rather than a map keyed by state, so a
/// snapshot missing a state is unrepresentable. An instance transitioning
/// simply disappears from one field's map and appears in another's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMap {
    pub passing: BTreeMap<String, HealthRecord>,
    pub warning: BTreeMap<String, HealthRecord>,
    pub critical: BTreeMap<String, HealthRecord>,
}

impl HealthMap {
    pub fn state(&self, state: HealthState) -> &BTreeMap<String, HealthRecord> {
        match state {
            HealthState::Passing => &self.passing,
            HealthState::Warning => &self.warning,
            HealthState::Critical => &self.critical,
        }
    }

    pub fn state_mut(&mut self, state: HealthState) -> &mut BTreeMap<String, HealthRecord> {
        match state {
            HealthState::Passing => &mut self.passing,
            HealthState::Warning => &mut self.warning,
            HealthState::Critical => &mut self.critical,
        }
    }
}

/// Difference between two topology snapshots.
///
/// Service-level and node-level differences are computed independently: a
/// brand-new service shows up in `new_services` and also contributes its full
/// node list to `new_nodes` (symmetrically for removed services). All four
/// collections hold unique, unordered entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologyDelta {
    pub new_services: BTreeSet<String>,
    pub missing_services: BTreeSet<String>,
    pub new_nodes: BTreeMap<String, BTreeSet<String>>,
    pub missing_nodes: BTreeMap<String, BTreeSet<String>>,
}

impl TopologyDelta {
    pub fn is_empty(&self) -> bool {
        self.new_services.is_empty()
            && self.missing_services.is_empty()
            && self.new_nodes.is_empty()
            && self.missing_nodes.is_empty()
    }
}

/// Difference between two health snapshots: per state, the checks newly
/// present in that state. Appearances only: a check vanishing from a state
/// produces no entry anywhere. Every state is always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthDelta {
    pub passing: BTreeMap<String, HealthRecord>,
    pub warning: BTreeMap<String, HealthRecord>,
    pub critical: BTreeMap<String, HealthRecord>,
}

impl HealthDelta {
    pub fn state(&self, state: HealthState) -> &BTreeMap<String, HealthRecord> {
        match state {
            HealthState::Passing => &self.passing,
            HealthState::Warning => &self.warning,
            HealthState::Critical => &self.critical,
        }
    }

    pub fn state_mut(&mut self, state: HealthState) -> &mut BTreeMap<String, HealthRecord> {
        match state {
            HealthState::Passing => &mut self.passing,
            HealthState::Warning => &mut self.warning,
            HealthState::Critical => &mut self.critical,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passing.is_empty() && self.warning.is_empty() && self.critical.is_empty()
    }
}
