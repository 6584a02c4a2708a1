//! State space: partial therapy plans
//!
//! A node is a partial plan plus the diseases it still has to cover. Plans
//! are persistent chains of [`PlanStep`]s shared through `Arc`, so a child
//! costs one new step instead of a copy of its parent's drug map, and a
//! parent can hand out any number of independent children.

use crate::cost::{CostModel, EdgeCost};
use crate::{DiseaseId, DrugId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One prescribing decision: `drug` was chosen to resolve `resolved` and is
/// credited with every disease in `covered`
#[derive(Debug)]
pub struct PlanStep {
    pub drug: DrugId,
    pub resolved: DiseaseId,
    pub covered: BTreeSet<DiseaseId>,
    /// Edge cost paid for this step
    pub cost: f64,
    prev: Option<Arc<PlanStep>>,
}

/// Duplicate-detection key: selected drugs and uncovered diseases
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateSignature {
    pub drugs: BTreeSet<DrugId>,
    pub remaining: BTreeSet<DiseaseId>,
}

/// Search node; immutable after construction
#[derive(Debug, Clone)]
pub struct TherapyNode {
    plan: Option<Arc<PlanStep>>,
    remaining: BTreeSet<DiseaseId>,
    g: f64,
    h: f64,
    f: f64,
    depth: usize,
}

/// Successors of one node and the number of candidates pruned on the way
#[derive(Debug, Default)]
pub struct Expansion {
    pub successors: Vec<TherapyNode>,
    pub pruned: usize,
}

impl TherapyNode {
    /// Empty plan over the admitted target diseases
    pub fn root(admitted: BTreeSet<DiseaseId>, cost: &CostModel<'_>) -> Self {
        let h = cost.heuristic(&admitted);
        TherapyNode::new(None, admitted, 0.0, h, 0)
    }

    fn new(
        plan: Option<Arc<PlanStep>>,
        remaining: BTreeSet<DiseaseId>,
        g: f64,
        h: f64,
        depth: usize,
    ) -> Self {
        TherapyNode {
            plan,
            remaining,
            g,
            h,
            f: g + h,
            depth,
        }
    }

    /// Accumulated cost
    pub fn g(&self) -> f64 {
        self.g
    }

    /// Heuristic estimate of the remaining cost
    pub fn h(&self) -> f64 {
        self.h
    }

    pub fn f(&self) -> f64 {
        self.f
    }

    /// Number of prescribing steps taken from the root
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn remaining(&self) -> &BTreeSet<DiseaseId> {
        &self.remaining
    }

    pub fn is_goal(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Steps from the most recent back to the root
    pub fn steps(&self) -> impl Iterator<Item = &PlanStep> {
        std::iter::successors(self.plan.as_deref(), |step| step.prev.as_deref())
    }

    pub fn selected_drug_set(&self) -> BTreeSet<DrugId> {
        self.steps().map(|step| step.drug.clone()).collect()
    }

    /// Drug -> diseases it is credited with covering
    pub fn selected_drugs(&self) -> BTreeMap<DrugId, BTreeSet<DiseaseId>> {
        let mut selected: BTreeMap<DrugId, BTreeSet<DiseaseId>> = BTreeMap::new();
        for step in self.steps() {
            selected
                .entry(step.drug.clone())
                .or_default()
                .extend(step.covered.iter().cloned());
        }
        selected
    }

    pub fn signature(&self) -> StateSignature {
        StateSignature {
            drugs: self.selected_drug_set(),
            remaining: self.remaining.clone(),
        }
    }

    /// The disease resolved next: the smallest remaining id
    pub fn next_disease(&self) -> Option<&DiseaseId> {
        self.remaining.first()
    }

    /// Generate every safe successor that resolves [`next_disease`](Self::next_disease)
    ///
    /// Candidates whose edge cost is infinite are pruned. Candidates that
    /// cover nothing still remaining are skipped since they cannot progress.
    pub fn expand(&self, cost: &mut CostModel<'_>) -> Expansion {
        let mut expansion = Expansion::default();
        let Some(target) = self.next_disease() else {
            return expansion;
        };

        let kb = cost.knowledge_base();
        let candidates = kb.candidates_for(target);
        let selected = self.selected_drug_set();

        for drug in candidates {
            let covered = kb.covered_diseases(&drug, &self.remaining);
            if covered.is_empty() {
                tracing::debug!(
                    drug = %drug,
                    disease = %target,
                    "candidate covers no remaining disease"
                );
                continue;
            }

            let step_cost = match cost.edge_cost(&selected, &drug, target) {
                EdgeCost::Finite(step_cost) => step_cost,
                EdgeCost::Contraindicated { with, message } => {
                    tracing::debug!(
                        drug = %drug,
                        with = %with,
                        reason = %message,
                        "absolute contraindication, branch pruned"
                    );
                    expansion.pruned += 1;
                    continue;
                }
            };

            let remaining: BTreeSet<DiseaseId> =
                self.remaining.difference(&covered).cloned().collect();
            let h = cost.heuristic(&remaining);
            let step = PlanStep {
                drug,
                resolved: target.clone(),
                covered,
                cost: step_cost,
                prev: self.plan.clone(),
            };

            expansion.successors.push(TherapyNode::new(
                Some(Arc::new(step)),
                remaining,
                self.g + step_cost,
                h,
                self.depth + 1,
            ));
        }

        expansion
    }
}
