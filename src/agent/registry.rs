//! Agent state registry.
//!
//! Holds the in-memory aggregate of all catalog agents and writes every
//! mutation through the [`KvMutator`], so a new registry built over the same
//! storage resumes exactly where the previous one stopped.

use crate::agent::domain::{
    Agent, AgentDefinition, AgentState, AgentSummary, ListFilter, PersistedAgent, SortBy,
    ValidationReport, MAX_AMPLIFICATION, MIN_AMPLIFICATION,
};
use crate::error::{RegistryError, StorageError};
use crate::storage::KvMutator;
use crate::types::StorageArea;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Outcome of a passing or failing `validate` call together with the agent
/// as it stands afterwards.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub report: ValidationReport,
    pub agent: Agent,
}

pub struct AgentRegistry {
    /// Catalog key (upper case) to agent
    agents: Mutex<BTreeMap<String, Agent>>,
    kv: KvMutator,
    storage_key: String,
}

impl AgentRegistry {
    /// Seed every agent from `catalog`, then overlay state persisted under
    /// `storage_key` in `local` storage.
    ///
    /// Unreadable storage or malformed records leave the affected agents at
    /// their catalog defaults.
    pub async fn load(
        kv: KvMutator,
        storage_key: impl Into<String>,
        catalog: Vec<AgentDefinition>,
    ) -> Self {
        let storage_key = storage_key.into();
        let mut agents: BTreeMap<String, Agent> = catalog
            .iter()
            .map(|definition| (definition.key.to_uppercase(), Agent::from_definition(definition)))
            .collect();

        match kv.read(&storage_key, StorageArea::Local).await {
            Ok(Some(Value::Object(stored))) => {
                let mut restored = 0usize;
                for (key, record) in stored {
                    let Some(agent) = agents.get_mut(&key) else {
                        debug!(agent = %key, "Ignoring persisted state for unknown agent");
                        continue;
                    };
                    match serde_json::from_value::<PersistedAgent>(record) {
                        Ok(persisted) => {
                            agent.restore(persisted);
                            restored += 1;
                        }
                        Err(e) => {
                            warn!(agent = %key, error = %e, "Skipping malformed agent state");
                        }
                    }
                }
                info!(key = %storage_key, restored, "Restored agent states");
            }
            Ok(Some(other)) => {
                warn!(
                    key = %storage_key,
                    kind = %json_kind(&other),
                    "Stored agent states are not a map"
                );
            }
            Ok(None) => {
                debug!(key = %storage_key, "No persisted agent states");
            }
            Err(e) => {
                error!(key = %storage_key, error = %e, "Failed to load agent states");
            }
        }

        Self {
            agents: Mutex::new(agents),
            kv,
            storage_key,
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Snapshot of one agent. Names are matched case-insensitively.
    pub async fn status(&self, name: &str) -> Result<Agent, RegistryError> {
        let agents = self.agents.lock().await;
        agents
            .get(&lookup_key(name))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Move an agent to `ACTIVE`, reset its error count and persist.
    pub async fn activate(&self, name: &str) -> Result<Agent, RegistryError> {
        let key = lookup_key(name);
        let mut agents = self.agents.lock().await;
        {
            let agent = operational_agent(&mut agents, &key, name)?;
            if agent.state == AgentState::Error {
                return Err(RegistryError::InvalidTransition {
                    name: agent.name.clone(),
                    from: agent.state.to_string(),
                    action: "activate",
                });
            }

            agent.state = AgentState::Active;
            agent.last_activated = Some(Utc::now());
            agent.metrics.activations += 1;
            agent.error_count = 0;
        }

        self.commit(&mut agents, &key, "activate").await
    }

    /// Multiply the amplification by `factor`, clamped to `[0.1, 10.0]`.
    pub async fn amplify(&self, name: &str, factor: f64) -> Result<Agent, RegistryError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RegistryError::InvalidFactor(factor));
        }

        let key = lookup_key(name);
        let mut agents = self.agents.lock().await;
        {
            let agent = operational_agent(&mut agents, &key, name)?;
            if !matches!(
                agent.state,
                AgentState::Standby | AgentState::Active | AgentState::Amplified
            ) {
                return Err(RegistryError::InvalidTransition {
                    name: agent.name.clone(),
                    from: agent.state.to_string(),
                    action: "amplify",
                });
            }

            agent.amplification =
                (agent.amplification * factor).clamp(MIN_AMPLIFICATION, MAX_AMPLIFICATION);
            agent.state = AgentState::Amplified;
            agent.metrics.amplifications += 1;
        }

        self.commit(&mut agents, &key, "amplify").await
    }

    /// Run the five consistency checks.
    ///
    /// A failing check is reported in the outcome, not as an error. Only
    /// unknown agents and persistence failures produce `Err`.
    pub async fn validate(&self, name: &str) -> Result<ValidationOutcome, RegistryError> {
        let key = lookup_key(name);
        let mut agents = self.agents.lock().await;
        let report = {
            let agent = agents
                .get_mut(&key)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

            let previous = agent.state;
            agent.state = AgentState::Validating;
            let report = ValidationReport::evaluate(agent);

            if report.success {
                agent.state = match previous {
                    AgentState::Error => AgentState::Standby,
                    other => other,
                };
                agent.last_validated = Some(report.timestamp);
                agent.metrics.validations += 1;
            } else {
                agent.state = AgentState::Error;
                agent.error_count += 1;
                warn!(agent = %agent.name, checks = ?report.checks, "Agent failed validation");
            }
            report
        };

        let agent = self.commit(&mut agents, &key, "validate").await?;
        Ok(ValidationOutcome { report, agent })
    }

    /// Filtered, sorted summaries. Pure read; ties keep catalog-key order.
    pub async fn list(&self, filter: ListFilter, sort_by: SortBy) -> Vec<AgentSummary> {
        let agents = self.agents.lock().await;
        let mut selected: Vec<&Agent> = agents.values().filter(|a| filter.matches(a)).collect();
        selected.sort_by(|a, b| compare(a, b, sort_by));
        selected.into_iter().map(Agent::summary).collect()
    }

    /// Persist after a mutation of `key`. On failure the agent is forced into
    /// `ERROR` with its error count raised, and that is persisted too before
    /// the failure is returned.
    async fn commit(
        &self,
        agents: &mut BTreeMap<String, Agent>,
        key: &str,
        action: &'static str,
    ) -> Result<Agent, RegistryError> {
        let source = match self.persist(agents).await {
            Ok(()) => {
                return agents
                    .get(key)
                    .cloned()
                    .ok_or_else(|| RegistryError::NotFound(key.to_string()));
            }
            Err(e) => e,
        };

        let name = match agents.get_mut(key) {
            Some(agent) => {
                agent.error_count += 1;
                agent.state = AgentState::Error;
                agent.name.clone()
            }
            None => key.to_string(),
        };
        error!(agent = %name, action, error = %source, "Failed to persist agent state");

        if let Err(e) = self.persist(agents).await {
            error!(agent = %name, error = %e, "Failed to persist error state");
        }

        Err(RegistryError::Persistence {
            name,
            action,
            source,
        })
    }

    /// Merge every agent's mutable fields into the stored map in one write.
    async fn persist(&self, agents: &BTreeMap<String, Agent>) -> Result<(), StorageError> {
        let mut snapshot = Map::new();
        for (key, agent) in agents {
            snapshot.insert(key.clone(), serde_json::to_value(agent.persisted())?);
        }

        self.kv
            .update_storage(
                &self.storage_key,
                move |current| {
                    let mut states = match current {
                        Some(Value::Object(map)) => map,
                        _ => Map::new(),
                    };
                    states.extend(snapshot);
                    Value::Object(states)
                },
                StorageArea::Local,
            )
            .await?;
        Ok(())
    }
}

fn lookup_key(name: &str) -> String {
    name.trim().to_uppercase()
}

fn operational_agent<'a>(
    agents: &'a mut BTreeMap<String, Agent>,
    key: &str,
    name: &str,
) -> Result<&'a mut Agent, RegistryError> {
    let agent = agents
        .get_mut(key)
        .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
    if !agent.operational {
        return Err(RegistryError::NotOperational(agent.name.clone()));
    }
    Ok(agent)
}

fn compare(a: &Agent, b: &Agent, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::Frequency => b.frequency.cmp(&a.frequency),
        SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortBy::State => a.state.as_str().cmp(b.state.as_str()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::domain::default_catalog;
    use crate::concurrency::LockStore;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    const KEY: &str = "guardian_states";

    fn kv_over(storage: &Arc<MemoryStorage>) -> KvMutator {
        KvMutator::new(storage.clone(), Arc::new(LockStore::local()))
    }

    async fn registry_over(storage: &Arc<MemoryStorage>) -> AgentRegistry {
        AgentRegistry::load(kv_over(storage), KEY, default_catalog()).await
    }

    fn definition(key: &'static str, operational: bool) -> AgentDefinition {
        AgentDefinition {
            key,
            name: key,
            frequency: 100,
            role: "Test",
            description: "Test agent",
            operational,
            capabilities: &["testing"],
        }
    }

    #[tokio::test]
    async fn test_activate_persists_state() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;

        let agent = registry.activate("aeyon").await.unwrap();
        assert_eq!(agent.state, AgentState::Active);
        assert_eq!(agent.metrics.activations, 1);
        assert!(agent.last_activated.is_some());

        let stored = storage.peek(StorageArea::Local, KEY).unwrap();
        assert_eq!(stored["AEYON"]["state"], json!("active"));
        assert_eq!(stored["META"]["state"], json!("standby"));
    }

    #[tokio::test]
    async fn test_unknown_and_non_operational_are_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = AgentRegistry::load(
            kv_over(&storage),
            KEY,
            vec![definition("IDLE", false)],
        )
        .await;

        let err = registry.activate("nobody").await.unwrap_err();
        assert_eq!(err.to_string(), "Guardian nobody not found");

        let err = registry.amplify("idle", 2.0).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotOperational(_)));
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_amplify_clamps_to_bounds() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;

        assert_eq!(registry.amplify("AEYON", 3.0).await.unwrap().amplification, 3.0);
        let agent = registry.amplify("AEYON", 5.0).await.unwrap();
        assert_eq!(agent.amplification, 10.0);
        assert_eq!(agent.state, AgentState::Amplified);
        assert_eq!(agent.metrics.amplifications, 2);

        let agent = registry.amplify("META", 0.01).await.unwrap();
        assert_eq!(agent.amplification, MIN_AMPLIFICATION);

        assert!(matches!(
            registry.amplify("META", f64::NAN).await,
            Err(RegistryError::InvalidFactor(_))
        ));
    }

    #[tokio::test]
    async fn test_display_name_differs_from_key() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;

        let agent = registry.status("abe").await.unwrap();
        assert_eq!(agent.name, "Abë");
        assert!(registry.status("JØHN").await.is_ok());
    }

    #[tokio::test]
    async fn test_persist_failure_forces_error_state() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;
        storage.set_fail_writes(true);

        let err = registry.activate("ZERO").await.unwrap_err();
        assert!(matches!(err, RegistryError::Persistence { action: "activate", .. }));
        assert!(err.to_string().starts_with("Failed to activate ZERO"));

        let agent = registry.status("ZERO").await.unwrap();
        assert_eq!(agent.state, AgentState::Error);
        assert_eq!(agent.error_count, 1);

        // Only a passing validation leaves ERROR
        storage.set_fail_writes(false);
        assert!(matches!(
            registry.activate("ZERO").await,
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert!(matches!(
            registry.amplify("ZERO", 2.0).await,
            Err(RegistryError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_clears_error_without_touching_error_count() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;

        storage.set_fail_writes(true);
        assert!(registry.activate("LUX").await.is_err());
        assert!(registry.validate("LUX").await.is_err());
        assert!(registry.validate("LUX").await.is_err());
        storage.set_fail_writes(false);

        let before = registry.status("LUX").await.unwrap();
        assert_eq!(before.state, AgentState::Error);
        assert_eq!(before.error_count, 3);

        let outcome = registry.validate("LUX").await.unwrap();
        assert!(outcome.report.success);
        assert_eq!(outcome.agent.state, AgentState::Standby);
        assert_eq!(outcome.agent.error_count, 3);
    }

    #[tokio::test]
    async fn test_validate_keeps_prior_state_on_pass() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;

        registry.activate("YOU").await.unwrap();
        let outcome = registry.validate("YOU").await.unwrap();
        assert_eq!(outcome.agent.state, AgentState::Active);
        assert!(outcome.agent.last_validated.is_some());
    }

    #[tokio::test]
    async fn test_failing_validation_is_not_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            StorageArea::Local,
            KEY,
            json!({"POLY": {"state": "standby", "amplification": 42.0}}),
        );
        let registry = registry_over(&storage).await;

        let outcome = registry.validate("poly").await.unwrap();
        assert!(!outcome.report.success);
        assert!(!outcome.report.checks.amplification_valid);
        assert_eq!(outcome.agent.state, AgentState::Error);
        assert_eq!(outcome.agent.error_count, 1);
        assert_eq!(outcome.agent.metrics.validations, 0);
    }

    #[tokio::test]
    async fn test_rehydration_overlays_persisted_state() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let registry = registry_over(&storage).await;
            registry.activate("META").await.unwrap();
            registry.amplify("META", 4.0).await.unwrap();
        }

        let registry = registry_over(&storage).await;
        let meta = registry.status("META").await.unwrap();
        assert_eq!(meta.state, AgentState::Amplified);
        assert_eq!(meta.amplification, 4.0);
        assert_eq!(meta.metrics.activations, 1);
        assert_eq!(meta.role, "Pattern Integrity & Context Synthesis");
    }

    #[tokio::test]
    async fn test_malformed_records_fall_back_to_catalog() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            StorageArea::Local,
            KEY,
            json!({"AEYON": "garbage", "GHOST": {"state": "active"}, "YAGNI": {"state": "active"}}),
        );
        let registry = registry_over(&storage).await;

        assert_eq!(registry.status("AEYON").await.unwrap().state, AgentState::Standby);
        assert_eq!(registry.status("YAGNI").await.unwrap().state, AgentState::Active);
        assert!(registry.status("GHOST").await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;
        registry.activate("ZERO").await.unwrap();
        registry.activate("ALRAX").await.unwrap();

        let all = registry.list(ListFilter::All, SortBy::Frequency).await;
        assert_eq!(all.len(), 10);
        assert_eq!(all[0].name, "AEYON");
        assert_eq!(all[1].name, "META");

        let active = registry.list(ListFilter::Active, SortBy::Name).await;
        let names: Vec<&str> = active.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["ALRAX", "ZERO"]);

        let by_state = registry.list(ListFilter::All, SortBy::State).await;
        assert_eq!(by_state[0].state, AgentState::Active);
        assert!(registry.list(ListFilter::Error, SortBy::Name).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_does_not_write() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_over(&storage).await;
        registry.list(ListFilter::Operational, SortBy::Name).await;
        assert_eq!(storage.write_count(), 0);
    }
}
