//! The generic monotone worklist fixed-point solver (C2 / §4.2).
//!
//! Grounded in the teacher's `Analyzer`/`analyze` worklist loops
//! (`analysis::fixed_point`, `analysis::jvm_fixed_point`): a dirty-set of
//! locations drained until empty, each location's fact re-merged and
//! re-transferred, successors re-enqueued on change. This version adds
//! direction (forward/backward) and a pluggable edge transfer, per §4.1/§4.7.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::cfg::{Cfg, EdgeKind};
use crate::error::LatticeInvariantViolation;
use crate::ir::StmtId;

/// A single dataflow analysis instance bound to one method's CFG.
///
/// `transfer_node` always reads the "upstream" fact and writes the
/// "downstream" one: for a forward analysis that's `IN -> OUT`; for a
/// backward analysis it's `OUT -> IN`. This lets one solver loop drive
/// both directions without duplicating the fixed-point machinery.
pub trait DataflowAnalysis {
    type Fact: Clone + PartialEq;

    fn is_forward(&self) -> bool;

    /// The fact installed at the entry node (forward) or every exit node
    /// (backward) before the first iteration.
    fn boundary_fact(&self) -> Self::Fact;

    /// The fact every other node starts with.
    fn initial_fact(&self) -> Self::Fact;

    /// Monotone merge: `dst <- dst ⊓ src`.
    fn meet_into(&self, src: &Self::Fact, dst: &mut Self::Fact);

    /// Returns whether the downstream fact changed.
    fn transfer_node(&self, node: StmtId, upstream: &Self::Fact, downstream: &mut Self::Fact) -> bool;

    /// Identity for the intraprocedural solver; interprocedural analyses
    /// override this per §4.8.
    fn transfer_edge(
        &self,
        _from: StmtId,
        _to: StmtId,
        _kind: EdgeKind,
        fact: &Self::Fact,
    ) -> Self::Fact {
        fact.clone()
    }
}

/// IN/OUT facts for every CFG node, owned exclusively by the run that
/// produced it (§3 lifecycle).
#[derive(Debug, Clone)]
pub struct DataflowResult<F> {
    facts: BTreeMap<StmtId, (F, F)>,
}

impl<F> DataflowResult<F> {
    #[must_use]
    pub fn in_fact(&self, node: StmtId) -> Option<&F> {
        self.facts.get(&node).map(|(i, _)| i)
    }

    #[must_use]
    pub fn out_fact(&self, node: StmtId) -> Option<&F> {
        self.facts.get(&node).map(|(_, o)| o)
    }

    pub fn nodes(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.facts.keys().copied()
    }
}

/// Checks that `new` subsumes `before` under `analysis`'s meet (§7's
/// monotonicity invariant: a transfer function must never produce a fact
/// that loses information a previous call already established). Only active
/// in debug builds; a violation is a solver defect, not a recoverable
/// condition, so it is asserted rather than returned.
fn assert_monotonic<A: DataflowAnalysis>(analysis: &A, node: StmtId, before: &A::Fact, new: &A::Fact) {
    let mut merged = new.clone();
    analysis.meet_into(before, &mut merged);
    if merged != *new {
        let violation = LatticeInvariantViolation {
            location: format!("{node}"),
            detail: "transfer_node produced a fact that does not subsume its previous value".to_string(),
        };
        debug_assert!(false, "{violation}");
    }
}

/// Runs `analysis` to a fixed point over `cfg` (§4.2).
pub fn solve<A: DataflowAnalysis>(analysis: &A, cfg: &Cfg) -> DataflowResult<A::Fact> {
    let mut in_facts: BTreeMap<StmtId, A::Fact> = BTreeMap::new();
    let mut out_facts: BTreeMap<StmtId, A::Fact> = BTreeMap::new();
    for node in cfg.nodes() {
        in_facts.insert(node, analysis.initial_fact());
        out_facts.insert(node, analysis.initial_fact());
    }

    let exits: HashSet<StmtId> = cfg.exits().iter().copied().collect();
    let mut queue: VecDeque<StmtId> = VecDeque::new();
    let mut queued: HashSet<StmtId> = HashSet::new();

    if analysis.is_forward() {
        in_facts.insert(cfg.entry(), analysis.boundary_fact());
        for node in cfg.nodes() {
            if queued.insert(node) {
                queue.push_back(node);
            }
        }
    } else {
        for exit in &exits {
            out_facts.insert(*exit, analysis.boundary_fact());
        }
        for node in cfg.nodes() {
            if queued.insert(node) {
                queue.push_back(node);
            }
        }
    }

    while let Some(node) = queue.pop_front() {
        queued.remove(&node);

        if analysis.is_forward() {
            if node != cfg.entry() {
                let mut merged = analysis.initial_fact();
                for (pred, kind) in cfg.predecessors(node) {
                    let pred_out = &out_facts[pred];
                    let edge_fact = analysis.transfer_edge(*pred, node, *kind, pred_out);
                    analysis.meet_into(&edge_fact, &mut merged);
                }
                in_facts.insert(node, merged);
            }
            let upstream = in_facts[&node].clone();
            let before = out_facts[&node].clone();
            let mut downstream = before.clone();
            let changed = analysis.transfer_node(node, &upstream, &mut downstream);
            assert_monotonic(analysis, node, &before, &downstream);
            out_facts.insert(node, downstream);
            if changed {
                for (succ, _) in cfg.successors(node) {
                    if queued.insert(*succ) {
                        queue.push_back(*succ);
                    }
                }
            }
        } else {
            if !exits.contains(&node) {
                let mut merged = analysis.initial_fact();
                for (succ, kind) in cfg.successors(node) {
                    let succ_in = &in_facts[succ];
                    let edge_fact = analysis.transfer_edge(node, *succ, *kind, succ_in);
                    analysis.meet_into(&edge_fact, &mut merged);
                }
                out_facts.insert(node, merged);
            }
            let upstream = out_facts[&node].clone();
            let before = in_facts[&node].clone();
            let mut downstream = before.clone();
            let changed = analysis.transfer_node(node, &upstream, &mut downstream);
            assert_monotonic(analysis, node, &before, &downstream);
            in_facts.insert(node, downstream);
            if changed {
                for (pred, _) in cfg.predecessors(node) {
                    if queued.insert(*pred) {
                        queue.push_back(*pred);
                    }
                }
            }
        }
    }

    let facts = in_facts
        .into_iter()
        .map(|(node, in_fact)| {
            let out_fact = out_facts.remove(&node).expect("every node has an OUT fact");
            (node, (in_fact, out_fact))
        })
        .collect();
    DataflowResult { facts }
}
