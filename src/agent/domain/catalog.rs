use super::AgentDefinition;

/// The ten built-in guardians.
pub fn default_catalog() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition {
            key: "AEYON",
            name: "AEYON",
            frequency: 999,
            role: "Atomic Execution Engine",
            description: "Runtime execution and atomic operations",
            operational: true,
            capabilities: &["execution", "runtime", "atomic_ops"],
        },
        AgentDefinition {
            key: "META",
            name: "META",
            frequency: 777,
            role: "Pattern Integrity & Context Synthesis",
            description: "Pattern detection and context synthesis",
            operational: true,
            capabilities: &["pattern_detection", "context_synthesis", "pattern_integrity"],
        },
        AgentDefinition {
            key: "JØHN",
            name: "JØHN",
            frequency: 530,
            role: "Certification & Truth Validation",
            description: "Validation and truth certification",
            operational: true,
            capabilities: &["validation", "certification", "truth_check"],
        },
        AgentDefinition {
            key: "YOU",
            name: "YOU",
            frequency: 530,
            role: "Human Intent Alignment Channel",
            description: "Human intent alignment and communication",
            operational: true,
            capabilities: &["intent_alignment", "communication", "human_interface"],
        },
        AgentDefinition {
            key: "ALRAX",
            name: "ALRAX",
            frequency: 530,
            role: "Forensic Variance Analysis",
            description: "Forensic analysis and variance detection",
            operational: true,
            capabilities: &["forensic_analysis", "variance_detection", "monitoring"],
        },
        AgentDefinition {
            key: "ZERO",
            name: "ZERO",
            frequency: 530,
            role: "Risk-Bounding & Epistemic Control",
            description: "Risk control and epistemic validation",
            operational: true,
            capabilities: &["risk_control", "epistemic_validation", "bounding"],
        },
        AgentDefinition {
            key: "YAGNI",
            name: "YAGNI",
            frequency: 530,
            role: "Radical Simplification",
            description: "Simplification and complexity reduction",
            operational: true,
            capabilities: &["simplification", "complexity_reduction", "optimization"],
        },
        AgentDefinition {
            key: "ABE",
            name: "Abë",
            frequency: 530,
            role: "Coherence, Love, Intelligence Field",
            description: "Coherence and intelligence field maintenance",
            operational: true,
            capabilities: &["coherence", "intelligence_field", "love"],
        },
        AgentDefinition {
            key: "LUX",
            name: "Lux",
            frequency: 530,
            role: "Illumination, Structural Clarity",
            description: "Illumination and structural clarity",
            operational: true,
            capabilities: &["illumination", "structural_clarity", "clarity"],
        },
        AgentDefinition {
            key: "POLY",
            name: "Poly",
            frequency: 530,
            role: "Expression & Wisdom Delivery",
            description: "Expression and wisdom delivery",
            operational: true,
            capabilities: &["expression", "wisdom_delivery", "communication"],
        },
    ]
}
