//! Agent State Registry
//!
//! A fixed catalog of named agents, each a small state machine
//! (`STANDBY`, `ACTIVE`, `AMPLIFIED`, `VALIDATING`, `ERROR`) with an
//! amplification factor and usage metrics. Every mutation is persisted to
//! `local` storage so the registry can be rebuilt after a restart.

mod commands;
pub mod domain;
mod registry;

pub use commands::{AgentCommandService, CommandOptions, CommandResponse, AVAILABLE_ACTIONS};
pub use domain::{
    default_catalog, Agent, AgentDefinition, AgentMetrics, AgentState, AgentSummary, ListFilter,
    PersistedAgent, SortBy, ValidationChecks, ValidationReport,
};
pub use registry::{AgentRegistry, ValidationOutcome};
