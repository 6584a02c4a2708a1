//! Cost model
//!
//! Edge cost of adding drug `X` to resolve disease `d`, given the drugs `S`
//! already in the plan:
//!
//! ```text
//! X in S:  0
//! else:    polypharmacy_base + tier_cost(X, d) + risk_penalty(X) + safety_penalty(S, X)
//!
//! risk_penalty(X)   = P(adverse event | patient, X) * risk_scale * (1 + frailty(patient))
//! safety_penalty    = +inf if any {s, X} is High, else medium_penalty * #Medium pairs
//! ```
//!
//! The heuristic is `polypharmacy_base` while anything remains uncovered and
//! `0` at the goal. Every new prescription pays at least the base, and an
//! already-selected drug never covers a remaining disease (it was credited
//! with all of them when first selected), so the heuristic never overestimates.
//!
//! A `CostModel` lives for one search and memoises oracle and interaction
//! lookups, which are pure for the duration of that search.

use crate::config::SearchConfig;
use crate::knowledge::{KnowledgeBase, PairSafety, Severity};
use crate::oracle::RiskOracles;
use crate::{DiseaseId, DrugId, PatientFingerprint, PatientProfile};
use std::collections::{BTreeSet, HashMap};

/// Cost of one expansion edge
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeCost {
    Finite(f64),
    /// Absolute contraindication with a drug already in the plan
    Contraindicated { with: DrugId, message: String },
}

impl EdgeCost {
    /// Numeric value, `+inf` for a contraindication
    pub fn value(&self) -> f64 {
        match self {
            EdgeCost::Finite(cost) => *cost,
            EdgeCost::Contraindicated { .. } => f64::INFINITY,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, EdgeCost::Finite(_))
    }
}

/// Per-search cost evaluator
pub struct CostModel<'a> {
    config: &'a SearchConfig,
    kb: &'a dyn KnowledgeBase,
    oracles: &'a RiskOracles,
    patient: &'a PatientProfile,
    fingerprint: PatientFingerprint,
    frailty: Option<f64>,
    risk_cache: HashMap<(DrugId, PatientFingerprint), f64>,
    pair_cache: HashMap<(DrugId, DrugId), PairSafety>,
}

impl<'a> CostModel<'a> {
    pub fn new(
        config: &'a SearchConfig,
        kb: &'a dyn KnowledgeBase,
        oracles: &'a RiskOracles,
        patient: &'a PatientProfile,
    ) -> Self {
        CostModel {
            config,
            kb,
            oracles,
            patient,
            fingerprint: patient.fingerprint(),
            frailty: None,
            risk_cache: HashMap::new(),
            pair_cache: HashMap::new(),
        }
    }

    pub fn knowledge_base(&self) -> &'a dyn KnowledgeBase {
        self.kb
    }

    /// Cost of crediting `drug` with resolving `disease` on top of `selected`
    pub fn edge_cost(
        &mut self,
        selected: &BTreeSet<DrugId>,
        drug: &DrugId,
        disease: &DiseaseId,
    ) -> EdgeCost {
        if selected.contains(drug) {
            return EdgeCost::Finite(0.0);
        }

        let safety = match self.safety_penalty(selected, drug) {
            EdgeCost::Finite(penalty) => penalty,
            contraindicated => return contraindicated,
        };

        let cost = self.config.polypharmacy_base
            + self.tier_cost(drug, disease)
            + self.risk_penalty(drug)
            + safety;
        EdgeCost::Finite(non_negative(cost))
    }

    /// Guideline cost for this specific (drug, disease) pair
    pub fn tier_cost(&self, drug: &DrugId, disease: &DiseaseId) -> f64 {
        let tier = self.kb.therapeutic_tier(drug, disease);
        non_negative(self.config.tier_costs.cost(tier))
    }

    /// Patient-specific risk cost of prescribing `drug`
    pub fn risk_penalty(&mut self, drug: &DrugId) -> f64 {
        let key = (drug.clone(), self.fingerprint);
        if let Some(&penalty) = self.risk_cache.get(&key) {
            return penalty;
        }

        let frailty = self.frailty();
        let probability = self.oracles.adverse_event_probability(self.patient, drug);
        let penalty = non_negative(probability * self.config.risk_scale * (1.0 + frailty));

        self.risk_cache.insert(key, penalty);
        penalty
    }

    /// Interaction cost of adding `drug` to `selected`
    ///
    /// Pairs are checked in drug order and the first `High` pair wins.
    pub fn safety_penalty(&mut self, selected: &BTreeSet<DrugId>, drug: &DrugId) -> EdgeCost {
        if selected.len() + 1 < 2 {
            return EdgeCost::Finite(0.0);
        }

        let mut penalty = 0.0;
        for other in selected {
            if other == drug {
                continue;
            }
            match self.pair_safety(other, drug) {
                PairSafety::Safe => {}
                PairSafety::Conflict { severity: Severity::Medium, .. } => {
                    penalty += self.config.medium_interaction_penalty;
                }
                PairSafety::Conflict { severity: Severity::High, message } => {
                    return EdgeCost::Contraindicated {
                        with: other.clone(),
                        message,
                    };
                }
            }
        }
        EdgeCost::Finite(non_negative(penalty))
    }

    /// Admissible estimate of the cost still needed to cover `remaining`
    pub fn heuristic(&self, remaining: &BTreeSet<DiseaseId>) -> f64 {
        if remaining.is_empty() {
            0.0
        } else {
            non_negative(self.config.polypharmacy_base)
        }
    }

    fn frailty(&mut self) -> f64 {
        match self.frailty {
            Some(frailty) => frailty,
            None => {
                let frailty = self.oracles.frailty(self.patient);
                self.frailty = Some(frailty);
                frailty
            }
        }
    }

    fn pair_safety(&mut self, a: &DrugId, b: &DrugId) -> PairSafety {
        let key = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        if let Some(cached) = self.pair_cache.get(&key) {
            return cached.clone();
        }
        let safety = self.kb.pairwise_safety(&key.0, &key.1);
        self.pair_cache.insert(key, safety.clone());
        safety
    }
}

fn non_negative(cost: f64) -> f64 {
    // NaN.max(0.0) is 0.0
    cost.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::FactBase;
    use crate::oracle::{AdverseEventModel, FrailtyModel, OracleError};
    use crate::Sex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        value: f64,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(value: f64) -> Arc<Self> {
            Arc::new(Counting {
                value,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl AdverseEventModel for Counting {
        fn adverse_event_probability(
            &self,
            _: &PatientProfile,
            _: &DrugId,
        ) -> Result<f64, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value)
        }
    }

    impl FrailtyModel for Counting {
        fn frailty(&self, _: &PatientProfile) -> Result<f64, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value)
        }
    }

    fn facts() -> FactBase {
        FactBase::builder()
            .indication("d1", "a", 1)
            .indication("d2", "a", 2)
            .indication("d2", "b", 3)
            .indication("d3", "b", 1)
            .indication("d4", "c", 1)
            .interaction("d1", "d3", Severity::High, "QT prolongation")
            .interaction("d1", "d4", Severity::Medium, "monitor INR")
            .interaction("d2", "d4", Severity::Medium, "monitor potassium")
            .build()
    }

    fn patient() -> PatientProfile {
        PatientProfile::new(50.0, 70.0, Sex::Male, vec![])
    }

    fn selected(ids: &[&str]) -> BTreeSet<DrugId> {
        ids.iter().map(|id| DrugId::from(*id)).collect()
    }

    #[test]
    fn test_already_selected_drug_is_free() {
        let (config, kb, oracles, p) = (
            SearchConfig::default(),
            facts(),
            RiskOracles::neutral(),
            patient(),
        );
        let mut model = CostModel::new(&config, &kb, &oracles, &p);
        let cost = model.edge_cost(&selected(&["d2"]), &"d2".into(), &"b".into());
        assert_eq!(cost, EdgeCost::Finite(0.0));
    }

    #[test]
    fn test_edge_cost_components() {
        let config = SearchConfig::default();
        let kb = facts();
        let oracles = RiskOracles::new(Counting::new(0.1), Counting::new(0.2));
        let p = patient();
        let mut model = CostModel::new(&config, &kb, &oracles, &p);

        // 20 + tier2 (2000) + 0.1 * 1000 * 1.2
        let cost = model.edge_cost(&selected(&[]), &"d2".into(), &"a".into());
        assert!((cost.value() - 2140.0).abs() < 1e-9);

        // Tier follows the disease being resolved: d2 is third line for b
        let cost = model.edge_cost(&selected(&[]), &"d2".into(), &"b".into());
        assert!((cost.value() - 4140.0).abs() < 1e-9);
    }

    #[test]
    fn test_unapproved_pair_costs_unknown_tier() {
        let (config, kb, oracles, p) = (
            SearchConfig::default(),
            facts(),
            RiskOracles::neutral(),
            patient(),
        );
        let model = CostModel::new(&config, &kb, &oracles, &p);
        assert_eq!(model.tier_cost(&"d4".into(), &"a".into()), 10000.0);
    }

    #[test]
    fn test_high_interaction_is_contraindicated() {
        let (config, kb, oracles, p) = (
            SearchConfig::default(),
            facts(),
            RiskOracles::neutral(),
            patient(),
        );
        let mut model = CostModel::new(&config, &kb, &oracles, &p);
        let cost = model.edge_cost(&selected(&["d1"]), &"d3".into(), &"b".into());
        match &cost {
            EdgeCost::Contraindicated { with, message } => {
                assert_eq!(with.as_str(), "d1");
                assert_eq!(message, "QT prolongation");
            }
            other => panic!("expected contraindication, got {:?}", other),
        }
        assert!(cost.value().is_infinite());
        assert!(!cost.is_finite());
    }

    #[test]
    fn test_medium_interactions_accumulate() {
        let (config, kb, oracles, p) = (
            SearchConfig::default(),
            facts(),
            RiskOracles::neutral(),
            patient(),
        );
        let mut model = CostModel::new(&config, &kb, &oracles, &p);
        let penalty = model.safety_penalty(&selected(&["d1", "d2"]), &"d4".into());
        assert_eq!(penalty, EdgeCost::Finite(1000.0));
        let penalty = model.safety_penalty(&selected(&[]), &"d4".into());
        assert_eq!(penalty, EdgeCost::Finite(0.0));
    }

    #[test]
    fn test_risk_penalty_is_memoised() {
        let config = SearchConfig::default();
        let kb = facts();
        let adverse = Counting::new(0.3);
        let frailty = Counting::new(0.5);
        let oracles = RiskOracles::new(adverse.clone(), frailty.clone());
        let p = patient();
        let mut model = CostModel::new(&config, &kb, &oracles, &p);

        let first = model.risk_penalty(&"d1".into());
        let second = model.risk_penalty(&"d1".into());
        model.risk_penalty(&"d3".into());

        assert_eq!(first, second);
        assert!((first - 450.0).abs() < 1e-9);
        assert_eq!(adverse.calls.load(Ordering::SeqCst), 2);
        assert_eq!(frailty.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_heuristic() {
        let (config, kb, oracles, p) = (
            SearchConfig::default(),
            facts(),
            RiskOracles::neutral(),
            patient(),
        );
        let model = CostModel::new(&config, &kb, &oracles, &p);
        assert_eq!(model.heuristic(&BTreeSet::new()), 0.0);
        let remaining: BTreeSet<DiseaseId> = ["a".into(), "b".into()].into_iter().collect();
        assert_eq!(model.heuristic(&remaining), 20.0);
    }

    #[test]
    fn test_negative_base_clamps_heuristic_and_cost() {
        let config = SearchConfig::default().with_polypharmacy_base(-50.0);
        let (kb, oracles, p) = (facts(), RiskOracles::neutral(), patient());
        let mut model = CostModel::new(&config, &kb, &oracles, &p);

        let remaining: BTreeSet<DiseaseId> = ["a".into()].into_iter().collect();
        assert_eq!(model.heuristic(&remaining), 0.0);
        let cost = model.edge_cost(&selected(&[]), &"d1".into(), &"a".into());
        assert!(cost.value() >= 0.0);
    }
}
