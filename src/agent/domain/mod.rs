//! Agent domain types: catalog definitions, runtime state and the persisted
//! subset of that state.

mod catalog;
pub mod validation;

pub use catalog::default_catalog;
pub use validation::{ValidationChecks, ValidationReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_AMPLIFICATION: f64 = 0.1;
pub const MAX_AMPLIFICATION: f64 = 10.0;
pub const DEFAULT_AMPLIFICATION_FACTOR: f64 = 2.0;

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Standby,
    Active,
    Amplified,
    Validating,
    Error,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Standby => "standby",
            AgentState::Active => "active",
            AgentState::Amplified => "amplified",
            AgentState::Validating => "validating",
            AgentState::Error => "error",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standby" => Ok(AgentState::Standby),
            "active" => Ok(AgentState::Active),
            "amplified" => Ok(AgentState::Amplified),
            "validating" => Ok(AgentState::Validating),
            "error" => Ok(AgentState::Error),
            other => Err(format!("Unknown agent state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub activations: u64,
    pub validations: u64,
    pub amplifications: u64,
}

/// Static description of an agent. The catalog is fixed for the lifetime of
/// a registry; agents are never created or removed at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    /// Upper-case lookup key
    pub key: &'static str,
    /// Display name, which may differ from the key in case and diacritics
    pub name: &'static str,
    pub frequency: u32,
    pub role: &'static str,
    pub description: &'static str,
    pub operational: bool,
    pub capabilities: &'static [&'static str],
}

/// Full runtime view of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub name: String,
    pub frequency: u32,
    pub role: String,
    pub description: String,
    pub operational: bool,
    pub capabilities: Vec<String>,
    pub state: AgentState,
    pub amplification: f64,
    pub last_activated: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub metrics: AgentMetrics,
}

impl Agent {
    /// Fresh agent in `STANDBY` at amplification 1.0.
    pub fn from_definition(definition: &AgentDefinition) -> Self {
        Self {
            name: definition.name.to_string(),
            frequency: definition.frequency,
            role: definition.role.to_string(),
            description: definition.description.to_string(),
            operational: definition.operational,
            capabilities: definition
                .capabilities
                .iter()
                .map(|c| c.to_string())
                .collect(),
            state: AgentState::Standby,
            amplification: 1.0,
            last_activated: None,
            last_validated: None,
            error_count: 0,
            metrics: AgentMetrics::default(),
        }
    }

    pub fn persisted(&self) -> PersistedAgent {
        PersistedAgent {
            state: self.state,
            amplification: self.amplification,
            last_activated: self.last_activated,
            last_validated: self.last_validated,
            error_count: self.error_count,
            metrics: self.metrics,
        }
    }

    /// Overlay mutable fields recovered from storage.
    pub fn restore(&mut self, persisted: PersistedAgent) {
        self.state = persisted.state;
        self.amplification = persisted.amplification;
        self.last_activated = persisted.last_activated;
        self.last_validated = persisted.last_validated;
        self.error_count = persisted.error_count;
        self.metrics = persisted.metrics;
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            name: self.name.clone(),
            frequency: self.frequency,
            role: self.role.clone(),
            state: self.state,
            amplification: self.amplification,
            operational: self.operational,
            error_count: self.error_count,
            metrics: self.metrics,
        }
    }
}

/// Mutable fields written to storage on every registry mutation.
///
/// Missing fields fall back to catalog defaults so older or partial records
/// still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedAgent {
    pub state: AgentState,
    pub amplification: f64,
    pub last_activated: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub metrics: AgentMetrics,
}

impl Default for PersistedAgent {
    fn default() -> Self {
        Self {
            state: AgentState::Standby,
            amplification: 1.0,
            last_activated: None,
            last_validated: None,
            error_count: 0,
            metrics: AgentMetrics::default(),
        }
    }
}

/// Row returned by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub name: String,
    pub frequency: u32,
    pub role: String,
    pub state: AgentState,
    pub amplification: f64,
    pub operational: bool,
    pub error_count: u32,
    pub metrics: AgentMetrics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFilter {
    #[default]
    All,
    Active,
    Operational,
    Error,
}

impl ListFilter {
    pub fn matches(&self, agent: &Agent) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Active => agent.state == AgentState::Active,
            ListFilter::Operational => agent.operational,
            ListFilter::Error => agent.state == AgentState::Error,
        }
    }
}

impl FromStr for ListFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "all" | "none" => Ok(ListFilter::All),
            "active" => Ok(ListFilter::Active),
            "operational" => Ok(ListFilter::Operational),
            "error" => Ok(ListFilter::Error),
            other => Err(format!(
                "Invalid filter: {}. Must be active, operational or error",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Highest frequency first
    #[default]
    Frequency,
    Name,
    State,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frequency" => Ok(SortBy::Frequency),
            "name" => Ok(SortBy::Name),
            "state" => Ok(SortBy::State),
            other => Err(format!(
                "Invalid sort key: {}. Must be frequency, name or state",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(AgentState::Amplified).unwrap(), json!("amplified"));
        assert_eq!("ERROR".parse::<AgentState>().unwrap(), AgentState::Error);
    }

    #[test]
    fn test_partial_persisted_record_uses_defaults() {
        let persisted: PersistedAgent =
            serde_json::from_value(json!({"state": "active", "errorCount": 2})).unwrap();
        assert_eq!(persisted.state, AgentState::Active);
        assert_eq!(persisted.error_count, 2);
        assert_eq!(persisted.amplification, 1.0);
        assert_eq!(persisted.metrics, AgentMetrics::default());
    }

    #[test]
    fn test_persisted_round_trips_through_agent() {
        let catalog = default_catalog();
        let mut agent = Agent::from_definition(&catalog[0]);
        agent.state = AgentState::Amplified;
        agent.amplification = 4.0;
        agent.metrics.amplifications = 2;

        let mut fresh = Agent::from_definition(&catalog[0]);
        fresh.restore(agent.persisted());
        assert_eq!(fresh, agent);
    }

    #[test]
    fn test_filter_and_sort_parsing() {
        assert_eq!("Operational".parse::<ListFilter>().unwrap(), ListFilter::Operational);
        assert_eq!("none".parse::<ListFilter>().unwrap(), ListFilter::All);
        assert!("broken".parse::<ListFilter>().is_err());
        assert_eq!("name".parse::<SortBy>().unwrap(), SortBy::Name);
        assert!("size".parse::<SortBy>().is_err());
    }
}
