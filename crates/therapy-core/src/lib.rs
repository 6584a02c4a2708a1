//! SafeTherapy Core - Minimum-Risk Drug Combination Search
//!
//! Selects the lowest-risk combination of drugs that jointly treats a set of
//! target diseases for one patient. The search is a best-first (A*) walk over
//! partial therapy plans, i.e. a multi-target weighted set cover where:
//!
//! - drug-disease approvals and guideline tiers come from a [`KnowledgeBase`]
//! - pairwise interaction severity is a hard constraint (`High` prunes)
//! - adverse-event probability and patient frailty come from [`RiskOracles`]
//!
//! # Example
//!
//! ```rust
//! use safetherapy_core::{
//!     FactBase, PatientProfile, RiskOracles, SearchConfig, Sex, TherapyOptimizer,
//! };
//! use std::sync::Arc;
//!
//! let facts = FactBase::builder()
//!     .indication("metformin", "type_2_diabetes", 1)
//!     .indication("lisinopril", "hypertension", 1)
//!     .build();
//!
//! let optimizer = TherapyOptimizer::new(
//!     Arc::new(facts),
//!     RiskOracles::neutral(),
//!     SearchConfig::default(),
//! );
//!
//! let patient = PatientProfile::new(67.0, 82.5, Sex::Male, vec!["asthma".into()]);
//! let plan = optimizer
//!     .solve(&patient, &["type_2_diabetes".into(), "hypertension".into()])
//!     .unwrap();
//!
//! assert_eq!(plan.assignments.len(), 2);
//! ```

pub mod atoms;
pub mod config;
pub mod cost;
pub mod knowledge;
pub mod node;
pub mod oracle;
pub mod search;

// Re-export commonly used types for convenience
pub use atoms::{canonical_atom, NameMap};
pub use config::{SearchConfig, TierCosts};
pub use cost::{CostModel, EdgeCost};
pub use knowledge::{
    FactBase, FactBaseBuilder, Indication, Interaction, InteractionConflict, KnowledgeBase,
    PairSafety, Severity, TherapeuticTier,
};
pub use node::{PlanStep, StateSignature, TherapyNode};
pub use oracle::{
    AdverseEventModel, AdverseEventTable, FrailtyModel, FrailtyTable, OracleError, RiskOracles,
};
pub use search::{
    audit_plan, CancellationToken, SearchBudget, SearchStats, TherapyOptimizer, TherapyPlan,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! interned_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl AsRef<str>) -> Self {
                $name(Arc::from(id.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), &*self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(Arc::from(id))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

interned_id!(
    /// Canonical drug identifier (e.g. `acetylsalicylic_acid`)
    DrugId
);

interned_id!(
    /// Canonical disease identifier (e.g. `coronary_artery_disease`)
    DiseaseId
);

// ============================================================================
// Patient
// ============================================================================

/// Biological sex as recorded in the patient profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(alias = "M", alias = "male")]
    Male,
    #[serde(alias = "F", alias = "female")]
    Female,
    #[serde(alias = "U", alias = "unknown")]
    Unknown,
}

impl Sex {
    /// Single-letter code used by the risk tables
    pub fn code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Unknown => "U",
        }
    }
}

/// Read-only patient context for one search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    /// Age in years
    pub age: f64,
    /// Body weight in kilograms
    pub weight: f64,
    pub sex: Sex,
    /// Concomitant conditions, in the order they were reported
    #[serde(default)]
    pub concomitant: Vec<String>,
}

impl PatientProfile {
    pub fn new(age: f64, weight: f64, sex: Sex, concomitant: Vec<String>) -> Self {
        PatientProfile {
            age,
            weight,
            sex,
            concomitant,
        }
    }

    /// Whether any real concomitant condition is recorded (`none` does not count)
    pub fn has_concomitant(&self) -> bool {
        self.concomitant.iter().any(|c| {
            let c = c.trim();
            !c.is_empty() && !c.eq_ignore_ascii_case("none")
        })
    }

    /// Stable digest of every field, used as a memoisation key
    pub fn fingerprint(&self) -> PatientFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.age.to_bits().to_le_bytes());
        hasher.update(self.weight.to_bits().to_le_bytes());
        hasher.update(self.sex.code().as_bytes());
        for condition in &self.concomitant {
            hasher.update((condition.len() as u64).to_le_bytes());
            hasher.update(condition.as_bytes());
        }
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        PatientFingerprint(digest)
    }
}

/// SHA-256 digest of a [`PatientProfile`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PatientFingerprint(pub [u8; 32]);

// ============================================================================
// Errors
// ============================================================================

/// Outcomes surfaced to callers of [`TherapyOptimizer::solve`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// None of the requested diseases has a candidate drug
    #[error("no treatable disease among {} requested target(s)", requested.len())]
    NoCoverage { requested: Vec<DiseaseId> },

    /// Frontier exhausted without a safe complete cover
    #[error("no safe therapy found after expanding {expanded} state(s)")]
    NoSafeTherapyFound { expanded: usize },

    /// Expansion, time or cancellation budget hit before a solution was reached
    #[error("no solution within budget ({limit}) after expanding {expanded} state(s)")]
    BudgetExhausted { expanded: usize, limit: BudgetLimit },
}

/// Which budget stopped the search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetLimit {
    Expansions(usize),
    Deadline,
    Cancelled,
}

impl fmt::Display for BudgetLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetLimit::Expansions(max) => write!(f, "max {} expansions", max),
            BudgetLimit::Deadline => write!(f, "time limit"),
            BudgetLimit::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors raised while loading configuration, facts or oracle tables
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub(crate) fn read_json_file<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
    what: &'static str,
) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse { what, source })
}
