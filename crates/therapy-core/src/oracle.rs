//! Risk oracles
//!
//! Two independent scores feed the cost model:
//!
//! - **Adverse-event probability**: likelihood that a specific drug causes an
//!   adverse reaction in this patient.
//! - **Frailty**: the patient's intrinsic vulnerability, independent of drug.
//!
//! Models may fail. [`RiskOracles`] is the boundary where failures and
//! out-of-range values become the neutral score, so the search itself only
//! ever sees a number in `[0, 1]`.

use crate::{read_json_file, ConfigError, DrugId, PatientProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Neutral score used when a model cannot answer
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Internal model failure; never escapes [`RiskOracles`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    #[error("model not loaded")]
    Unavailable,

    #[error("unknown drug: {0}")]
    UnknownDrug(DrugId),

    #[error("no evidence for {0}")]
    MissingEvidence(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Adverse-event probability model
pub trait AdverseEventModel: Send + Sync {
    fn adverse_event_probability(
        &self,
        patient: &PatientProfile,
        drug: &DrugId,
    ) -> Result<f64, OracleError>;
}

/// Patient frailty model
pub trait FrailtyModel: Send + Sync {
    fn frailty(&self, patient: &PatientProfile) -> Result<f64, OracleError>;
}

/// Model that never answers; every query falls back to the neutral score
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableModel;

impl AdverseEventModel for UnavailableModel {
    fn adverse_event_probability(
        &self,
        _: &PatientProfile,
        _: &DrugId,
    ) -> Result<f64, OracleError> {
        Err(OracleError::Unavailable)
    }
}

impl FrailtyModel for UnavailableModel {
    fn frailty(&self, _: &PatientProfile) -> Result<f64, OracleError> {
        Err(OracleError::Unavailable)
    }
}

// ============================================================================
// Guarded Boundary
// ============================================================================

/// Infallible view over both models
#[derive(Clone)]
pub struct RiskOracles {
    adverse_events: Arc<dyn AdverseEventModel>,
    frailty: Arc<dyn FrailtyModel>,
    neutral: f64,
}

impl std::fmt::Debug for RiskOracles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskOracles")
            .field("neutral", &self.neutral)
            .finish_non_exhaustive()
    }
}

impl RiskOracles {
    pub fn new(adverse_events: Arc<dyn AdverseEventModel>, frailty: Arc<dyn FrailtyModel>) -> Self {
        RiskOracles {
            adverse_events,
            frailty,
            neutral: NEUTRAL_SCORE,
        }
    }

    /// Oracles that answer the neutral score for everything
    pub fn neutral() -> Self {
        Self::new(Arc::new(UnavailableModel), Arc::new(UnavailableModel))
    }

    /// Override the fallback score
    pub fn with_neutral_score(mut self, neutral: f64) -> Self {
        self.neutral = neutral.clamp(0.0, 1.0);
        self
    }

    pub fn neutral_score(&self) -> f64 {
        self.neutral
    }

    pub fn adverse_event_probability(&self, patient: &PatientProfile, drug: &DrugId) -> f64 {
        let raw = self.adverse_events.adverse_event_probability(patient, drug);
        self.sanitize(raw, "adverse_event", Some(drug))
    }

    pub fn frailty(&self, patient: &PatientProfile) -> f64 {
        let raw = self.frailty.frailty(patient);
        self.sanitize(raw, "frailty", None)
    }

    fn sanitize(
        &self,
        raw: Result<f64, OracleError>,
        oracle: &'static str,
        drug: Option<&DrugId>,
    ) -> f64 {
        match raw {
            Ok(p) if p.is_finite() => p.clamp(0.0, 1.0),
            Ok(p) => {
                tracing::warn!(
                    oracle,
                    drug = ?drug,
                    value = p,
                    fallback = self.neutral,
                    "non-finite oracle score"
                );
                self.neutral
            }
            Err(err) => {
                tracing::warn!(
                    oracle,
                    drug = ?drug,
                    error = %err,
                    fallback = self.neutral,
                    "oracle failure"
                );
                self.neutral
            }
        }
    }
}

// ============================================================================
// Adverse-Event Table
// ============================================================================

/// Per-drug adverse-event probabilities, conditioned on a concomitant condition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrugRiskProfile {
    /// Probability when no concomitant condition matches
    #[serde(default)]
    pub baseline: Option<f64>,
    /// Canonical condition atom -> probability
    #[serde(default)]
    pub by_condition: HashMap<String, f64>,
}

/// Lookup-table adverse-event model
///
/// A patient's probability for a drug is the worst case over their
/// concomitant conditions. Conditions absent from the table use the drug's
/// baseline. A computed probability of exactly zero is reported as missing
/// evidence, so [`RiskOracles`] substitutes its configured neutral score: no
/// recorded event is not evidence of safety.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdverseEventTable {
    drugs: HashMap<DrugId, DrugRiskProfile>,
}

impl AdverseEventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            what: "adverse-event table",
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json_file(path.as_ref(), "adverse-event table")
    }

    pub fn with_baseline(mut self, drug: &str, probability: f64) -> Self {
        self.drugs.entry(DrugId::from(drug)).or_default().baseline = Some(probability);
        self
    }

    pub fn with_condition(mut self, drug: &str, condition: &str, probability: f64) -> Self {
        self.drugs
            .entry(DrugId::from(drug))
            .or_default()
            .by_condition
            .insert(crate::canonical_atom(condition), probability);
        self
    }

    pub fn len(&self) -> usize {
        self.drugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }
}

impl AdverseEventModel for AdverseEventTable {
    fn adverse_event_probability(
        &self,
        patient: &PatientProfile,
        drug: &DrugId,
    ) -> Result<f64, OracleError> {
        let profile = self
            .drugs
            .get(drug)
            .ok_or_else(|| OracleError::UnknownDrug(drug.clone()))?;

        let conditions: Vec<String> = patient
            .concomitant
            .iter()
            .map(|c| crate::canonical_atom(c))
            .filter(|c| c != "none" && c != crate::atoms::UNKNOWN_ATOM)
            .collect();

        let mut worst: Option<f64> = None;
        if conditions.is_empty() {
            worst = profile.baseline;
        }
        for condition in &conditions {
            let p = profile.by_condition.get(condition).copied().or(profile.baseline);
            if let Some(p) = p {
                worst = Some(worst.map_or(p, |w| w.max(p)));
            }
        }

        match worst {
            Some(p) if p > 0.0 => Ok(p),
            Some(_) => Err(OracleError::MissingEvidence(format!(
                "no recorded adverse events for {}",
                drug
            ))),
            None => Err(OracleError::MissingEvidence(format!(
                "no baseline or condition entry for {}",
                drug
            ))),
        }
    }
}

// ============================================================================
// Frailty Table
// ============================================================================

/// Clinical age bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    Pediatric,
    Adult,
    Geriatric,
}

impl AgeGroup {
    pub fn from_age(age: f64) -> Self {
        if age < 18.0 {
            AgeGroup::Pediatric
        } else if age < 65.0 {
            AgeGroup::Adult
        } else {
            AgeGroup::Geriatric
        }
    }
}

/// Metabolic weight bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightGroup {
    Underweight,
    Normal,
    Overweight,
}

impl WeightGroup {
    pub fn from_weight(weight: f64) -> Self {
        if weight < 50.0 {
            WeightGroup::Underweight
        } else if weight <= 90.0 {
            WeightGroup::Normal
        } else {
            WeightGroup::Overweight
        }
    }
}

/// One row of the frailty table: P(frail | age, weight, concomitant)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrailtyEntry {
    pub age_group: AgeGroup,
    pub weight_group: WeightGroup,
    pub has_concomitant: bool,
    pub probability: f64,
}

/// Conditional probability table frailty model
#[derive(Debug, Clone, Default)]
pub struct FrailtyTable {
    cells: HashMap<(AgeGroup, WeightGroup, bool), f64>,
}

impl FrailtyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = FrailtyEntry>) -> Self {
        let cells = entries
            .into_iter()
            .map(|e| ((e.age_group, e.weight_group, e.has_concomitant), e.probability))
            .collect();
        FrailtyTable { cells }
    }

    /// Parse a JSON array of [`FrailtyEntry`]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: Vec<FrailtyEntry> =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse {
                what: "frailty table",
                source,
            })?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let entries: Vec<FrailtyEntry> = read_json_file(path.as_ref(), "frailty table")?;
        Ok(Self::from_entries(entries))
    }

    pub fn with_cell(
        mut self,
        age: AgeGroup,
        weight: WeightGroup,
        has_concomitant: bool,
        probability: f64,
    ) -> Self {
        self.cells.insert((age, weight, has_concomitant), probability);
        self
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FrailtyModel for FrailtyTable {
    fn frailty(&self, patient: &PatientProfile) -> Result<f64, OracleError> {
        if !(patient.age.is_finite() && patient.weight.is_finite()) {
            return Err(OracleError::Inference(format!(
                "non-finite evidence: age {}, weight {}",
                patient.age, patient.weight
            )));
        }
        let key = (
            AgeGroup::from_age(patient.age),
            WeightGroup::from_weight(patient.weight),
            patient.has_concomitant(),
        );
        self.cells
            .get(&key)
            .copied()
            .ok_or_else(|| OracleError::MissingEvidence(format!("{:?}", key)))
    }
}
