//! Agent command service: single entry point for string-addressed agent commands.
//!
//! Callers outside the core (CLI, message handlers) send an action name and
//! get back a uniform [`CommandResponse`]. Business failures become
//! `success: false` with a readable `error`; nothing here returns `Err`.

use crate::agent::domain::{
    Agent, AgentSummary, ListFilter, SortBy, ValidationReport, DEFAULT_AMPLIFICATION_FACTOR,
};
use crate::agent::registry::AgentRegistry;
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};

pub const AVAILABLE_ACTIONS: &str = "status, activate, amplify, validate, list";

/// Optional arguments for `execute`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOptions {
    /// Amplification factor, defaults to 2.0
    pub factor: Option<f64>,
    pub filter: ListFilter,
    pub sort_by: SortBy,
}

/// Uniform result of an agent command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl CommandResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn with_agent(message: Option<String>, agent: Agent) -> Self {
        Self {
            success: true,
            message,
            agent: Some(agent),
            ..Self::default()
        }
    }
}

impl From<RegistryError> for CommandResponse {
    fn from(err: RegistryError) -> Self {
        Self::failure(err.to_string())
    }
}

pub struct AgentCommandService;

impl AgentCommandService {
    /// Dispatch `action` (case-insensitive) against the registry.
    pub async fn execute(
        registry: &AgentRegistry,
        action: &str,
        name: Option<&str>,
        options: &CommandOptions,
    ) -> CommandResponse {
        let action = action.trim().to_lowercase();
        if action == "list" {
            return Self::list(registry, options).await;
        }

        if !matches!(action.as_str(), "status" | "activate" | "amplify" | "validate") {
            return CommandResponse::failure(format!(
                "Unknown action: {}. Available: {}",
                action, AVAILABLE_ACTIONS
            ));
        }

        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return CommandResponse::failure(format!(
                "Guardian name required for {} command",
                action
            ));
        };

        match action.as_str() {
            "status" => Self::status(registry, name).await,
            "activate" => Self::activate(registry, name).await,
            "amplify" => {
                Self::amplify(
                    registry,
                    name,
                    options.factor.unwrap_or(DEFAULT_AMPLIFICATION_FACTOR),
                )
                .await
            }
            _ => Self::validate(registry, name).await,
        }
    }

    pub async fn status(registry: &AgentRegistry, name: &str) -> CommandResponse {
        match registry.status(name).await {
            Ok(agent) => CommandResponse::with_agent(None, agent),
            Err(e) => e.into(),
        }
    }

    pub async fn activate(registry: &AgentRegistry, name: &str) -> CommandResponse {
        match registry.activate(name).await {
            Ok(agent) => {
                let message = format!("Guardian {} activated", agent.name);
                CommandResponse::with_agent(Some(message), agent)
            }
            Err(e) => e.into(),
        }
    }

    pub async fn amplify(registry: &AgentRegistry, name: &str, factor: f64) -> CommandResponse {
        match registry.amplify(name, factor).await {
            Ok(agent) => {
                let message = format!(
                    "Guardian {} amplified to {:.2}x",
                    agent.name, agent.amplification
                );
                CommandResponse::with_agent(Some(message), agent)
            }
            Err(e) => e.into(),
        }
    }

    /// Succeeds whenever the checks ran, even if the agent failed them.
    pub async fn validate(registry: &AgentRegistry, name: &str) -> CommandResponse {
        match registry.validate(name).await {
            Ok(outcome) => {
                let verdict = if outcome.report.success { "passed" } else { "failed" };
                CommandResponse {
                    message: Some(format!(
                        "Guardian {} validation {}",
                        outcome.agent.name, verdict
                    )),
                    validation: Some(outcome.report),
                    ..CommandResponse::with_agent(None, outcome.agent)
                }
            }
            Err(e) => e.into(),
        }
    }

    pub async fn list(registry: &AgentRegistry, options: &CommandOptions) -> CommandResponse {
        let agents = registry.list(options.filter, options.sort_by).await;
        CommandResponse {
            success: true,
            count: Some(agents.len()),
            agents: Some(agents),
            ..CommandResponse::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::domain::{default_catalog, AgentState};
    use crate::concurrency::LockStore;
    use crate::storage::{KvMutator, MemoryStorage};
    use std::sync::Arc;

    async fn registry_with(storage: Arc<MemoryStorage>) -> AgentRegistry {
        let kv = KvMutator::new(storage, Arc::new(LockStore::local()));
        AgentRegistry::load(kv, "guardian_states", default_catalog()).await
    }

    #[tokio::test]
    async fn test_execute_requires_name() {
        let registry = registry_with(Arc::new(MemoryStorage::new())).await;
        let response =
            AgentCommandService::execute(&registry, "activate", None, &CommandOptions::default())
                .await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Guardian name required for activate command")
        );
    }

    #[tokio::test]
    async fn test_execute_unknown_action() {
        let registry = registry_with(Arc::new(MemoryStorage::new())).await;
        let response = AgentCommandService::execute(
            &registry,
            "summon",
            Some("AEYON"),
            &CommandOptions::default(),
        )
        .await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("Unknown action: summon"));
    }

    #[tokio::test]
    async fn test_execute_amplify_reports_factor() {
        let registry = registry_with(Arc::new(MemoryStorage::new())).await;
        let options = CommandOptions {
            factor: Some(3.0),
            ..CommandOptions::default()
        };
        let response =
            AgentCommandService::execute(&registry, "AMPLIFY", Some("lux"), &options).await;
        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("Guardian Lux amplified to 3.00x"));
        assert_eq!(response.agent.unwrap().state, AgentState::Amplified);
    }

    #[tokio::test]
    async fn test_validate_response_carries_checks() {
        let registry = registry_with(Arc::new(MemoryStorage::new())).await;
        let response = AgentCommandService::execute(
            &registry,
            "validate",
            Some("meta"),
            &CommandOptions::default(),
        )
        .await;
        assert!(response.success);
        assert!(response.validation.unwrap().success);
        assert_eq!(response.message.as_deref(), Some("Guardian META validation passed"));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_a_failed_response() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = registry_with(storage.clone()).await;
        storage.set_fail_writes(true);

        let response = AgentCommandService::activate(&registry, "YOU").await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("Failed to activate YOU"));
    }

    #[tokio::test]
    async fn test_list_response_serializes_count() {
        let registry = registry_with(Arc::new(MemoryStorage::new())).await;
        let response =
            AgentCommandService::execute(&registry, "list", None, &CommandOptions::default())
                .await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["count"], 10);
        assert_eq!(json["agents"][0]["name"], "AEYON");
        assert!(json.get("error").is_none());
    }
}
