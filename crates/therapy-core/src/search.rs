//! A* search over partial therapy plans
//!
//! # Algorithm
//!
//! 1. Admit the target diseases that have at least one candidate drug; warn
//!    about and drop the rest. Nothing admitted is [`SolveError::NoCoverage`].
//! 2. Push the root (empty plan, `g = 0`).
//! 3. Pop the lowest `f = g + h` node (ties: earliest pushed). A goal node is
//!    returned; since `h` is admissible and edge costs are non-negative, the
//!    first goal popped is optimal.
//! 4. Otherwise expand it and push every successor whose signature is new
//!    or strictly improves the best recorded `g`. Entries superseded in the
//!    meantime are skipped when popped.
//! 5. An empty frontier is [`SolveError::NoSafeTherapyFound`].
//!
//! The frontier and the best-cost table belong to one `solve` call, so one
//! optimiser can serve concurrent searches.

use crate::config::SearchConfig;
use crate::cost::CostModel;
use crate::knowledge::{KnowledgeBase, Severity};
use crate::node::{StateSignature, TherapyNode};
use crate::oracle::RiskOracles;
use crate::{BudgetLimit, DiseaseId, DrugId, PatientProfile, SolveError};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Budget
// ============================================================================

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, atomic::Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(atomic::Ordering::Relaxed)
    }
}

/// Limits checked before every expansion
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    pub max_expansions: Option<usize>,
    pub time_limit: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        SearchBudget {
            max_expansions: config.max_expansions,
            time_limit: config.time_limit(),
            cancel: None,
        }
    }

    pub fn with_max_expansions(mut self, max: usize) -> Self {
        self.max_expansions = Some(max);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn exceeded(&self, expanded: usize, started: Instant) -> Option<BudgetLimit> {
        if self.cancel.as_ref().map_or(false, CancellationToken::is_cancelled) {
            return Some(BudgetLimit::Cancelled);
        }
        if let Some(max) = self.max_expansions {
            if expanded >= max {
                return Some(BudgetLimit::Expansions(max));
            }
        }
        if let Some(limit) = self.time_limit {
            if started.elapsed() >= limit {
                return Some(BudgetLimit::Deadline);
            }
        }
        None
    }
}

// ============================================================================
// Results
// ============================================================================

/// Counters from one search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Nodes popped and expanded
    pub expanded: usize,
    /// Successors pushed onto the frontier
    pub generated: usize,
    /// Candidates discarded for an absolute contraindication
    pub pruned: usize,
    /// Frontier entries skipped because a cheaper path to the same state was found
    pub stale_skipped: usize,
}

/// Optimal safe cover
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TherapyPlan {
    /// Drug -> diseases it covers
    pub assignments: BTreeMap<DrugId, BTreeSet<DiseaseId>>,
    /// Total real cost
    pub g: f64,
    /// Estimated total cost of the terminal node (equals `g` at the goal)
    pub f: f64,
    /// Requested diseases dropped for having no candidate drug
    pub dropped: Vec<DiseaseId>,
    pub stats: SearchStats,
}

impl TherapyPlan {
    pub fn drugs(&self) -> impl Iterator<Item = &DrugId> {
        self.assignments.keys()
    }

    /// Every disease the plan covers
    pub fn covered(&self) -> BTreeSet<DiseaseId> {
        self.assignments.values().flatten().cloned().collect()
    }

    /// Drugs credited with more than one disease
    pub fn multi_target_drugs(&self) -> impl Iterator<Item = &DrugId> {
        self.assignments
            .iter()
            .filter(|(_, diseases)| diseases.len() > 1)
            .map(|(drug, _)| drug)
    }
}

/// Check that a plan covers exactly `admitted` and contains no `High` pair
pub fn audit_plan(
    kb: &dyn KnowledgeBase,
    assignments: &BTreeMap<DrugId, BTreeSet<DiseaseId>>,
    admitted: &BTreeSet<DiseaseId>,
) -> Result<(), String> {
    let covered: BTreeSet<DiseaseId> = assignments.values().flatten().cloned().collect();
    if &covered != admitted {
        return Err(format!(
            "coverage mismatch: covered {:?}, admitted {:?}",
            covered, admitted
        ));
    }

    let drugs: Vec<DrugId> = assignments.keys().cloned().collect();
    if let Some(conflict) = kb
        .verify_combination(&drugs)
        .into_iter()
        .find(|c| c.severity == Severity::High)
    {
        return Err(format!(
            "contraindicated pair {} + {}: {}",
            conflict.drug_a, conflict.drug_b, conflict.message
        ));
    }

    Ok(())
}

// ============================================================================
// Frontier
// ============================================================================

/// Min-heap entry ordered by `f`, then insertion order
struct FrontierEntry {
    f: f64,
    seq: u64,
    node: TherapyNode,
    signature: StateSignature,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
    next_seq: u64,
}

impl Frontier {
    fn push(&mut self, node: TherapyNode, signature: StateSignature) {
        let entry = FrontierEntry {
            f: node.f(),
            seq: self.next_seq,
            node,
            signature,
        };
        self.next_seq += 1;
        self.heap.push(entry);
    }

    fn pop(&mut self) -> Option<FrontierEntry> {
        self.heap.pop()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

// ============================================================================
// Optimizer
// ============================================================================

/// Best-first therapy optimiser
///
/// Holds read-only collaborators; each [`solve`](Self::solve) call owns its
/// own frontier, best-cost table and memo caches.
#[derive(Clone)]
pub struct TherapyOptimizer {
    kb: Arc<dyn KnowledgeBase>,
    oracles: RiskOracles,
    config: SearchConfig,
}

impl std::fmt::Debug for TherapyOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TherapyOptimizer")
            .field("oracles", &self.oracles)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TherapyOptimizer {
    pub fn new(kb: Arc<dyn KnowledgeBase>, oracles: RiskOracles, config: SearchConfig) -> Self {
        if let Err(err) = config.validate() {
            tracing::warn!(
                error = %err,
                "search config failed validation; costs are clamped at use"
            );
        }
        let oracles = oracles.with_neutral_score(config.neutral_score);
        TherapyOptimizer { kb, oracles, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &dyn KnowledgeBase {
        self.kb.as_ref()
    }

    /// Solve with the budget from the configuration
    pub fn solve(
        &self,
        patient: &PatientProfile,
        targets: &[DiseaseId],
    ) -> Result<TherapyPlan, SolveError> {
        self.solve_with_budget(patient, targets, &SearchBudget::from_config(&self.config))
    }

    /// Keep the targets that have at least one candidate drug
    ///
    /// Returns `(admitted, dropped)`; duplicates are collapsed.
    pub fn admit_targets(&self, targets: &[DiseaseId]) -> (BTreeSet<DiseaseId>, Vec<DiseaseId>) {
        let mut admitted = BTreeSet::new();
        let mut dropped = Vec::new();
        for disease in targets {
            if admitted.contains(disease) || dropped.contains(disease) {
                continue;
            }
            if self.kb.candidates_for(disease).is_empty() {
                tracing::warn!(
                    disease = %disease,
                    "target disease unknown or without approved therapy, ignored"
                );
                dropped.push(disease.clone());
            } else {
                admitted.insert(disease.clone());
            }
        }
        (admitted, dropped)
    }

    pub fn solve_with_budget(
        &self,
        patient: &PatientProfile,
        targets: &[DiseaseId],
        budget: &SearchBudget,
    ) -> Result<TherapyPlan, SolveError> {
        let (admitted, dropped) = self.admit_targets(targets);
        if admitted.is_empty() {
            tracing::error!(requested = targets.len(), "no treatable disease supplied");
            return Err(SolveError::NoCoverage {
                requested: targets.to_vec(),
            });
        }

        let started = Instant::now();
        let mut cost = CostModel::new(&self.config, self.kb.as_ref(), &self.oracles, patient);
        let mut frontier = Frontier::default();
        let mut best_g: HashMap<StateSignature, f64> = HashMap::new();
        let mut stats = SearchStats::default();

        let root = TherapyNode::root(admitted.clone(), &cost);
        let root_signature = root.signature();
        best_g.insert(root_signature.clone(), 0.0);
        frontier.push(root, root_signature);

        tracing::info!(
            targets = admitted.len(),
            dropped = dropped.len(),
            "starting therapy search"
        );

        while let Some(entry) = frontier.pop() {
            let FrontierEntry { node, signature, .. } = entry;

            if best_g.get(&signature).map_or(false, |&best| node.g() > best) {
                stats.stale_skipped += 1;
                continue;
            }

            if node.is_goal() {
                let assignments = node.selected_drugs();
                if let Err(violation) = audit_plan(self.kb.as_ref(), &assignments, &admitted) {
                    tracing::error!(%violation, "goal node failed audit, discarded");
                    debug_assert!(false, "goal node failed audit: {}", violation);
                    continue;
                }
                tracing::info!(
                    cost = node.g(),
                    drugs = assignments.len(),
                    expanded = stats.expanded,
                    generated = stats.generated,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "therapy found"
                );
                return Ok(TherapyPlan {
                    assignments,
                    g: node.g(),
                    f: node.f(),
                    dropped,
                    stats,
                });
            }

            if let Some(limit) = budget.exceeded(stats.expanded, started) {
                tracing::warn!(
                    %limit,
                    expanded = stats.expanded,
                    frontier = frontier.len(),
                    "search budget exhausted"
                );
                return Err(SolveError::BudgetExhausted {
                    expanded: stats.expanded,
                    limit,
                });
            }

            stats.expanded += 1;
            let expansion = node.expand(&mut cost);
            stats.pruned += expansion.pruned;

            for child in expansion.successors {
                debug_assert!(child.g() >= node.g());
                let child_signature = child.signature();
                let improves = best_g
                    .get(&child_signature)
                    .map_or(true, |&best| child.g() < best);
                if improves {
                    best_g.insert(child_signature.clone(), child.g());
                    frontier.push(child, child_signature);
                    stats.generated += 1;
                }
            }
        }

        tracing::info!(
            expanded = stats.expanded,
            pruned = stats.pruned,
            "frontier exhausted without a safe therapy"
        );
        Err(SolveError::NoSafeTherapyFound {
            expanded: stats.expanded,
        })
    }
}
