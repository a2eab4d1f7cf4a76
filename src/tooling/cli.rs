//! CLI Tooling
//!
//! Command-line surface over the core: agent commands, counters, analysis
//! history and the subscription admission check.

use crate::agent::{
    Agent, AgentCommandService, AgentSummary, CommandOptions, CommandResponse, ListFilter, SortBy,
    ValidationReport,
};
use crate::config::{ConfigLoader, CoreConfig};
use crate::context::CoreContext;
use crate::error::ApiError;
use crate::storage::HistoryEntry;
use crate::subscription::{status_display_name, tier_display_name, RequestDecision};
use crate::types::StorageArea;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::PathBuf;

/// Guardian CLI - persistent agent state and request admission
#[derive(Parser)]
#[command(name = "guardian")]
#[command(about = "Inspect and drive the guardian agent registry and its durable state")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep all state in memory instead of the on-disk database
    #[arg(long)]
    pub memory: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Load configuration and apply the logging flags on top of it.
    pub fn resolve_config(&self) -> Result<CoreConfig, ApiError> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage guardian agents
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Atomic counters
    Counter {
        #[command(subcommand)]
        command: CounterCommands,
    },
    /// Analysis history kept in sync storage
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Subscription and usage
    Subscription {
        #[command(subcommand)]
        command: SubscriptionCommands,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// List agents
    List {
        /// Filter: active, operational or error
        #[arg(long, default_value = "all")]
        filter: ListFilter,
        /// Sort key: frequency, name or state
        #[arg(long, default_value = "frequency")]
        sort_by: SortBy,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one agent
    Status {
        name: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Activate an agent
    Activate { name: String },
    /// Multiply an agent's amplification
    Amplify {
        name: String,
        #[arg(long, default_value_t = crate::agent::domain::DEFAULT_AMPLIFICATION_FACTOR)]
        factor: f64,
    },
    /// Run an agent's consistency checks
    Validate {
        name: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum CounterCommands {
    /// Increment a counter
    Incr {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
        #[arg(long, default_value = "local")]
        area: StorageArea,
    },
    /// Decrement a counter
    Decr {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
        #[arg(long, default_value = "local")]
        area: StorageArea,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// Show the most recent analyses
    Show {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Record an analysis
    Add {
        text: String,
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        bias_type: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SubscriptionCommands {
    /// Decide whether a request may be made right now
    Check {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// CLI context holding the wired core
pub struct CliContext {
    core: CoreContext,
}

impl CliContext {
    pub async fn new(config: CoreConfig, in_memory: bool) -> Result<Self, ApiError> {
        let core = if in_memory {
            CoreContext::in_memory(config).await?
        } else {
            CoreContext::open(config).await?
        };
        Ok(Self { core })
    }

    pub fn core(&self) -> &CoreContext {
        &self.core
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Agent { command } => self.execute_agent(command).await,
            Commands::Counter { command } => self.execute_counter(command).await,
            Commands::History { command } => self.execute_history(command).await,
            Commands::Subscription { command } => self.execute_subscription(command).await,
        }
    }

    async fn execute_agent(&self, command: &AgentCommands) -> Result<String, ApiError> {
        let registry = self.core.registry();
        match command {
            AgentCommands::List {
                filter,
                sort_by,
                format,
            } => {
                let options = CommandOptions {
                    factor: None,
                    filter: *filter,
                    sort_by: *sort_by,
                };
                let response = AgentCommandService::list(registry, &options).await;
                render(format, &response, |r| {
                    format_agent_list_text(r.agents.as_deref().unwrap_or_default())
                })
            }
            AgentCommands::Status { name, format } => {
                let response = AgentCommandService::status(registry, name).await;
                render(format, &response, |r| match &r.agent {
                    Some(agent) => format_agent_text(agent),
                    None => String::new(),
                })
            }
            AgentCommands::Activate { name } => {
                let response = AgentCommandService::activate(registry, name).await;
                render("text", &response, message_text)
            }
            AgentCommands::Amplify { name, factor } => {
                let response = AgentCommandService::amplify(registry, name, *factor).await;
                render("text", &response, message_text)
            }
            AgentCommands::Validate { name, format } => {
                let response = AgentCommandService::validate(registry, name).await;
                render(format, &response, |r| {
                    let mut out = message_text(r);
                    if let Some(report) = &r.validation {
                        out.push_str("\n\n");
                        out.push_str(&format_validation_text(report));
                    }
                    out
                })
            }
        }
    }

    async fn execute_counter(&self, command: &CounterCommands) -> Result<String, ApiError> {
        let kv = self.core.kv();
        let (key, value) = match command {
            CounterCommands::Incr { key, by, area } => {
                (key, kv.increment_counter(key, *by, *area).await?)
            }
            CounterCommands::Decr { key, by, area } => {
                (key, kv.decrement_counter(key, *by, *area).await?)
            }
        };
        Ok(format!("{} = {}", key, value))
    }

    async fn execute_history(&self, command: &HistoryCommands) -> Result<String, ApiError> {
        let history = self.core.history();
        match command {
            HistoryCommands::Show { limit, format } => {
                let entries = history.recent(*limit).await;
                if format == "json" {
                    return to_json(&entries);
                }
                Ok(format_history_text(&entries))
            }
            HistoryCommands::Add {
                text,
                score,
                bias_type,
            } => {
                let entry = HistoryEntry::new(text, *score, bias_type.as_deref());
                if history.save(entry).await {
                    Ok("Saved analysis to history".to_string())
                } else {
                    Err(ApiError::CommandFailed(
                        "Failed to save analysis to history".to_string(),
                    ))
                }
            }
        }
    }

    async fn execute_subscription(
        &self,
        command: &SubscriptionCommands,
    ) -> Result<String, ApiError> {
        match command {
            SubscriptionCommands::Check { format } => {
                let decision = self.core.subscriptions().can_make_request().await;
                if format == "json" {
                    return to_json(&decision);
                }
                Ok(format_decision_text(&decision))
            }
        }
    }
}

/// Render a command response; a failed response becomes an error.
fn render<F>(format: &str, response: &CommandResponse, text: F) -> Result<String, ApiError>
where
    F: FnOnce(&CommandResponse) -> String,
{
    if !response.success {
        let error = response
            .error
            .clone()
            .unwrap_or_else(|| "Command failed".to_string());
        return Err(ApiError::CommandFailed(error));
    }
    match format {
        "json" => to_json(response),
        "text" => Ok(text(response)),
        other => Err(ApiError::ConfigError(format!(
            "Invalid format: {} (must be 'text' or 'json')",
            other
        ))),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::ConfigError(format!("Failed to render JSON: {}", e)))
}

fn message_text(response: &CommandResponse) -> String {
    response.message.clone().unwrap_or_default()
}

fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_agent_list_text(agents: &[AgentSummary]) -> String {
    if agents.is_empty() {
        return "No guardians match.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Frequency", "Role", "State", "Amp", "Errors"]);
    for agent in agents {
        table.add_row(vec![
            agent.name.clone(),
            format!("{} Hz", agent.frequency),
            agent.role.clone(),
            agent.state.to_string(),
            format!("{:.2}x", agent.amplification),
            agent.error_count.to_string(),
        ]);
    }
    format!(
        "{}\n\n{}\n\nTotal: {} guardian(s)",
        format_section_heading("Guardians"),
        table,
        agents.len()
    )
}

fn format_agent_text(agent: &Agent) -> String {
    let stamp = |t: &Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
    };
    let mut out = format!("{}\n\n", format_section_heading(&agent.name));
    out.push_str(&format!("  Role: {}\n", agent.role));
    out.push_str(&format!("  Frequency: {} Hz\n", agent.frequency));
    out.push_str(&format!("  State: {}\n", agent.state));
    out.push_str(&format!("  Amplification: {:.2}x\n", agent.amplification));
    out.push_str(&format!("  Operational: {}\n", agent.operational));
    out.push_str(&format!("  Capabilities: {}\n", agent.capabilities.join(", ")));
    out.push_str(&format!("  Last activated: {}\n", stamp(&agent.last_activated)));
    out.push_str(&format!("  Last validated: {}\n", stamp(&agent.last_validated)));
    out.push_str(&format!("  Errors: {}\n", agent.error_count));
    out.push_str(&format!(
        "  Metrics: {} activation(s), {} validation(s), {} amplification(s)",
        agent.metrics.activations, agent.metrics.validations, agent.metrics.amplifications
    ));
    out
}

fn format_validation_text(report: &ValidationReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Check", "Result"]);
    for (check, passed) in report.checks.entries() {
        table.add_row(vec![check, if passed { "pass" } else { "FAIL" }]);
    }
    table.to_string()
}

fn format_history_text(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No analyses recorded.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["When", "Bias", "Score", "Text"]);
    for entry in entries {
        table.add_row(vec![
            entry.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            entry.bias_type.clone(),
            entry
                .score
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "-".to_string()),
            entry.text.clone(),
        ]);
    }
    format!("{}\n\n{}", format_section_heading("Recent analyses"), table)
}

fn format_decision_text(decision: &RequestDecision) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Subscription"));
    out.push_str(&format!(
        "  Tier: {}\n",
        tier_display_name(&decision.subscription.tier)
    ));
    out.push_str(&format!(
        "  Status: {}\n",
        status_display_name(&decision.subscription.status)
    ));
    if let Some(usage) = &decision.usage {
        let limit = usage
            .requests_limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        out.push_str(&format!(
            "  Usage: {} / {} ({:.1}%)\n",
            usage.requests_made, limit, usage.usage_percentage
        ));
    }
    out.push_str(&format!(
        "  Allowed: {}\n",
        if decision.allowed { "yes" } else { "no" }
    ));
    if decision.error {
        out.push_str("  Note: subscription could not be verified\n");
    }
    if let Some(message) = &decision.message {
        out.push_str(&format!("  {}\n", message));
    }
    out
}
