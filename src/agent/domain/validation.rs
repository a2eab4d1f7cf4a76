//! Agent self-consistency checks.

use super::{Agent, MAX_AMPLIFICATION, MIN_AMPLIFICATION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_FREQUENCY: u32 = 9999;
const MAX_ERROR_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationChecks {
    pub operational: bool,
    pub has_capabilities: bool,
    pub frequency_valid: bool,
    pub amplification_valid: bool,
    pub error_count_acceptable: bool,
}

impl ValidationChecks {
    pub fn run(agent: &Agent) -> Self {
        Self {
            operational: agent.operational,
            has_capabilities: !agent.capabilities.is_empty(),
            frequency_valid: agent.frequency > 0 && agent.frequency <= MAX_FREQUENCY,
            amplification_valid: (MIN_AMPLIFICATION..=MAX_AMPLIFICATION)
                .contains(&agent.amplification),
            error_count_acceptable: agent.error_count < MAX_ERROR_COUNT,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.operational
            && self.has_capabilities
            && self.frequency_valid
            && self.amplification_valid
            && self.error_count_acceptable
    }

    /// Labelled checks in a fixed order, for display.
    pub fn entries(&self) -> [(&'static str, bool); 5] {
        [
            ("operational", self.operational),
            ("hasCapabilities", self.has_capabilities),
            ("frequencyValid", self.frequency_valid),
            ("amplificationValid", self.amplification_valid),
            ("errorCountAcceptable", self.error_count_acceptable),
        ]
    }
}

/// Outcome of one `validate` call. A failed report is a domain outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub checks: ValidationChecks,
    pub timestamp: DateTime<Utc>,
}

impl ValidationReport {
    pub fn evaluate(agent: &Agent) -> Self {
        let checks = ValidationChecks::run(agent);
        Self {
            success: checks.all_passed(),
            checks,
            timestamp: Utc::now(),
        }
    }
}
