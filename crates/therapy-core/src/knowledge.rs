//! Knowledge-base contract and in-memory fact base
//!
//! The search only reads from the knowledge base: which drugs are approved for
//! a disease, at which guideline line, and how two drugs interact.

use crate::{read_json_file, ConfigError, DiseaseId, DrugId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

// ============================================================================
// Contract Types
// ============================================================================

/// Guideline appropriateness of a drug for a disease
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TherapeuticTier {
    /// First-line therapy
    First,
    /// Second-line therapy
    Second,
    /// Last resort
    Third,
    /// No recorded line, or not approved
    Unknown,
}

impl TherapeuticTier {
    /// Tier from a numeric guideline line (1, 2, 3)
    pub fn from_line(line: u8) -> Self {
        match line {
            1 => TherapeuticTier::First,
            2 => TherapeuticTier::Second,
            3 => TherapeuticTier::Third,
            _ => TherapeuticTier::Unknown,
        }
    }
}

/// Severity of a recorded drug-drug interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Monitoring or dose adjustment required; penalised
    #[serde(alias = "moderate", alias = "Medium", alias = "Moderate")]
    Medium,
    /// Absolute contraindication; never co-prescribed
    #[serde(alias = "major", alias = "contraindicated", alias = "High", alias = "Major")]
    High,
}

/// Result of checking one unordered drug pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairSafety {
    Safe,
    Conflict { severity: Severity, message: String },
}

impl PairSafety {
    pub fn is_contraindicated(&self) -> bool {
        matches!(self, PairSafety::Conflict { severity: Severity::High, .. })
    }
}

/// A conflicting pair found while verifying a drug combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionConflict {
    pub drug_a: DrugId,
    pub drug_b: DrugId,
    pub severity: Severity,
    pub message: String,
}

// ============================================================================
// Knowledge Base Trait
// ============================================================================

/// Read-only query interface over drug, disease and interaction facts
pub trait KnowledgeBase: Send + Sync {
    /// Drugs with at least one approved indication for `disease`
    fn candidates_for(&self, disease: &DiseaseId) -> BTreeSet<DrugId>;

    /// The subset of `diseases` that `drug` treats
    fn covered_diseases(
        &self,
        drug: &DrugId,
        diseases: &BTreeSet<DiseaseId>,
    ) -> BTreeSet<DiseaseId>;

    /// Guideline tier of `drug` for this specific `disease`
    fn therapeutic_tier(&self, drug: &DrugId, disease: &DiseaseId) -> TherapeuticTier;

    /// Interaction between two drugs, order-independent
    fn pairwise_safety(&self, drug_a: &DrugId, drug_b: &DrugId) -> PairSafety;

    /// Check every unordered pair of a combination
    fn verify_combination(&self, drugs: &[DrugId]) -> Vec<InteractionConflict> {
        let mut conflicts = Vec::new();
        for (i, a) in drugs.iter().enumerate() {
            for b in &drugs[i + 1..] {
                if let PairSafety::Conflict { severity, message } = self.pairwise_safety(a, b) {
                    conflicts.push(InteractionConflict {
                        drug_a: a.clone(),
                        drug_b: b.clone(),
                        severity,
                        message,
                    });
                }
            }
        }
        conflicts
    }
}

// ============================================================================
// In-Memory Fact Base
// ============================================================================

/// `approved_for(drug, disease, line)` fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indication {
    pub drug: DrugId,
    pub disease: DiseaseId,
    /// Guideline line: 1 first choice, 2 second, 3 last resort
    pub line: u8,
}

/// Drug-drug interaction fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub drug_a: DrugId,
    pub drug_b: DrugId,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FactFile {
    #[serde(default)]
    indications: Vec<Indication>,
    #[serde(default)]
    interactions: Vec<Interaction>,
}

/// Indexed, immutable fact store implementing [`KnowledgeBase`]
#[derive(Debug, Clone, Default)]
pub struct FactBase {
    by_disease: BTreeMap<DiseaseId, BTreeMap<DrugId, TherapeuticTier>>,
    interactions: HashMap<(DrugId, DrugId), (Severity, String)>,
}

impl FactBase {
    pub fn builder() -> FactBaseBuilder {
        FactBaseBuilder::default()
    }

    /// Parse `{"indications": [...], "interactions": [...]}`
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: FactFile = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            what: "fact base",
            source,
        })?;
        Ok(Self::from_facts(file.indications, file.interactions))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file: FactFile = read_json_file(path.as_ref(), "fact base")?;
        Ok(Self::from_facts(file.indications, file.interactions))
    }

    /// Load facts, degrading to an empty base when the file is unusable
    ///
    /// With an empty base every target is dropped and the search reports
    /// [`SolveError::NoCoverage`](crate::SolveError::NoCoverage).
    pub fn from_file_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path.as_ref()) {
            Ok(facts) => facts,
            Err(err) => {
                tracing::error!(
                    path = %path.as_ref().display(),
                    error = %err,
                    "knowledge base unavailable, continuing with no facts"
                );
                Self::default()
            }
        }
    }

    pub fn from_facts(
        indications: impl IntoIterator<Item = Indication>,
        interactions: impl IntoIterator<Item = Interaction>,
    ) -> Self {
        let mut builder = FactBaseBuilder::default();
        for fact in indications {
            builder.add_indication(fact);
        }
        for fact in interactions {
            builder.add_interaction(fact);
        }
        builder.build()
    }

    /// Every drug mentioned by an indication
    pub fn drugs(&self) -> BTreeSet<DrugId> {
        self.by_disease
            .values()
            .flat_map(|drugs| drugs.keys().cloned())
            .collect()
    }

    pub fn diseases(&self) -> impl Iterator<Item = &DiseaseId> {
        self.by_disease.keys()
    }

    pub fn indication_count(&self) -> usize {
        self.by_disease.values().map(BTreeMap::len).sum()
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }
}

fn pair_key(a: &DrugId, b: &DrugId) -> (DrugId, DrugId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl KnowledgeBase for FactBase {
    fn candidates_for(&self, disease: &DiseaseId) -> BTreeSet<DrugId> {
        self.by_disease
            .get(disease)
            .map(|drugs| drugs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn covered_diseases(
        &self,
        drug: &DrugId,
        diseases: &BTreeSet<DiseaseId>,
    ) -> BTreeSet<DiseaseId> {
        diseases
            .iter()
            .filter(|disease| {
                self.by_disease
                    .get(*disease)
                    .map_or(false, |drugs| drugs.contains_key(drug))
            })
            .cloned()
            .collect()
    }

    fn therapeutic_tier(&self, drug: &DrugId, disease: &DiseaseId) -> TherapeuticTier {
        self.by_disease
            .get(disease)
            .and_then(|drugs| drugs.get(drug))
            .copied()
            .unwrap_or(TherapeuticTier::Unknown)
    }

    fn pairwise_safety(&self, drug_a: &DrugId, drug_b: &DrugId) -> PairSafety {
        match self.interactions.get(&pair_key(drug_a, drug_b)) {
            Some((severity, message)) => PairSafety::Conflict {
                severity: *severity,
                message: message.clone(),
            },
            None => PairSafety::Safe,
        }
    }
}

/// Incremental constructor for [`FactBase`]
#[derive(Debug, Default)]
pub struct FactBaseBuilder {
    facts: FactBase,
}

impl FactBaseBuilder {
    /// Record `drug` as approved for `disease` at guideline `line`
    pub fn indication(mut self, drug: &str, disease: &str, line: u8) -> Self {
        self.add_indication(Indication {
            drug: DrugId::from(drug),
            disease: DiseaseId::from(disease),
            line,
        });
        self
    }

    pub fn interaction(
        mut self,
        drug_a: &str,
        drug_b: &str,
        severity: Severity,
        message: &str,
    ) -> Self {
        self.add_interaction(Interaction {
            drug_a: DrugId::from(drug_a),
            drug_b: DrugId::from(drug_b),
            severity,
            message: message.to_string(),
        });
        self
    }

    /// Add an indication; the best (lowest) line wins on duplicates
    pub fn add_indication(&mut self, fact: Indication) {
        let tier = TherapeuticTier::from_line(fact.line);
        let entry = self
            .facts
            .by_disease
            .entry(fact.disease)
            .or_default()
            .entry(fact.drug)
            .or_insert(tier);
        if tier < *entry {
            *entry = tier;
        }
    }

    /// Add an interaction; the most severe record wins on duplicates
    pub fn add_interaction(&mut self, fact: Interaction) {
        if fact.drug_a == fact.drug_b {
            tracing::warn!(drug = %fact.drug_a, "ignoring self-interaction fact");
            return;
        }
        let key = pair_key(&fact.drug_a, &fact.drug_b);
        match self.facts.interactions.get(&key) {
            Some((existing, _)) if *existing >= fact.severity => {}
            _ => {
                self.facts.interactions.insert(key, (fact.severity, fact.message));
            }
        }
    }

    pub fn build(self) -> FactBase {
        self.facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FactBase {
        FactBase::builder()
            .indication("aspirin", "coronary_artery_disease", 1)
            .indication("aspirin", "pain", 2)
            .indication("ibuprofen", "pain", 1)
            .indication("warfarin", "atrial_fibrillation", 1)
            .interaction("warfarin", "aspirin", Severity::High, "bleeding risk")
            .interaction("ibuprofen", "aspirin", Severity::Medium, "reduced antiplatelet effect")
            .build()
    }

    fn set(ids: &[&str]) -> BTreeSet<DiseaseId> {
        ids.iter().map(|id| DiseaseId::from(*id)).collect()
    }

    #[test]
    fn test_candidates_for_known_and_unknown() {
        let facts = sample();
        let pain: Vec<String> = facts
            .candidates_for(&"pain".into())
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(pain, vec!["aspirin", "ibuprofen"]);
        assert!(facts.candidates_for(&"gout".into()).is_empty());
    }

    #[test]
    fn test_covered_diseases_pleiotropy() {
        let facts = sample();
        let covered = facts.covered_diseases(
            &"aspirin".into(),
            &set(&["pain", "coronary_artery_disease", "atrial_fibrillation"]),
        );
        assert_eq!(covered, set(&["coronary_artery_disease", "pain"]));
    }

    #[test]
    fn test_tier_is_disease_specific() {
        let facts = sample();
        assert_eq!(
            facts.therapeutic_tier(&"aspirin".into(), &"coronary_artery_disease".into()),
            TherapeuticTier::First
        );
        assert_eq!(
            facts.therapeutic_tier(&"aspirin".into(), &"pain".into()),
            TherapeuticTier::Second
        );
        assert_eq!(
            facts.therapeutic_tier(&"aspirin".into(), &"gout".into()),
            TherapeuticTier::Unknown
        );
    }

    #[test]
    fn test_duplicate_indication_keeps_best_line() {
        let facts = FactBase::builder()
            .indication("d", "x", 3)
            .indication("d", "x", 1)
            .indication("d", "x", 2)
            .build();
        assert_eq!(facts.therapeutic_tier(&"d".into(), &"x".into()), TherapeuticTier::First);
        assert_eq!(facts.indication_count(), 1);
    }

    #[test]
    fn test_pairwise_safety_is_symmetric() {
        let facts = sample();
        let ab = facts.pairwise_safety(&"aspirin".into(), &"warfarin".into());
        let ba = facts.pairwise_safety(&"warfarin".into(), &"aspirin".into());
        assert_eq!(ab, ba);
        assert!(ab.is_contraindicated());
        assert_eq!(
            facts.pairwise_safety(&"ibuprofen".into(), &"warfarin".into()),
            PairSafety::Safe
        );
    }

    #[test]
    fn test_verify_combination_reports_all_pairs() {
        let facts = sample();
        let drugs: Vec<DrugId> = vec!["aspirin".into(), "ibuprofen".into(), "warfarin".into()];
        let conflicts = facts.verify_combination(&drugs);
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.iter().any(|c| c.severity == Severity::High));
        assert!(conflicts.iter().any(|c| c.severity == Severity::Medium));
    }

    #[test]
    fn test_from_json_accepts_clinical_severity_names() {
        let json = r#"{
            "indications": [
                {"drug": "clarithromycin", "disease": "pneumonia", "line": 1},
                {"drug": "simvastatin", "disease": "hyperlipidemia", "line": 1}
            ],
            "interactions": [
                {"drug_a": "clarithromycin", "drug_b": "simvastatin", "severity": "contraindicated",
                 "message": "rhabdomyolysis"},
                {"drug_a": "clarithromycin", "drug_b": "digoxin", "severity": "moderate"}
            ]
        }"#;
        let facts = FactBase::from_json(json).unwrap();
        assert!(facts
            .pairwise_safety(&"simvastatin".into(), &"clarithromycin".into())
            .is_contraindicated());
        assert!(matches!(
            facts.pairwise_safety(&"digoxin".into(), &"clarithromycin".into()),
            PairSafety::Conflict { severity: Severity::Medium, .. }
        ));
        assert_eq!(facts.drugs().len(), 2);
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let facts = FactBase::from_file_or_empty("/nonexistent/facts.json");
        assert_eq!(facts.indication_count(), 0);
        assert_eq!(facts.interaction_count(), 0);
    }
}
