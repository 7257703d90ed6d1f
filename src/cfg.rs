//! Control-flow graph builder (C0b): derives per-method CFG edges from a
//! method's control-transfer statements. Grounded in the teacher's
//! `ControlFlowGraph` (a `BTreeMap`-backed adjacency structure keyed by
//! program point, rather than a `petgraph::Graph`, so lookups by statement
//! id stay direct).

use std::collections::BTreeMap;

use crate::ir::{Method, Stmt, StmtId};

/// The kind of control transfer a CFG edge represents (§6's edge kind labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Normal,
    IfTrue,
    IfFalse,
    SwitchCase(i32),
    SwitchDefault,
}

/// The intraprocedural control-flow graph of a single method.
#[derive(Debug, Clone)]
pub struct Cfg {
    entry: StmtId,
    exits: Vec<StmtId>,
    succ: BTreeMap<StmtId, Vec<(StmtId, EdgeKind)>>,
    pred: BTreeMap<StmtId, Vec<(StmtId, EdgeKind)>>,
}

impl Cfg {
    /// Builds the CFG for `method` from its statements' explicit control
    /// transfers and fallthrough order.
    #[must_use]
    pub fn build(method: &Method) -> Self {
        let mut succ: BTreeMap<StmtId, Vec<(StmtId, EdgeKind)>> = BTreeMap::new();
        let mut pred: BTreeMap<StmtId, Vec<(StmtId, EdgeKind)>> = BTreeMap::new();
        let mut exits = Vec::new();

        fn add_edge(
            succ: &mut BTreeMap<StmtId, Vec<(StmtId, EdgeKind)>>,
            pred: &mut BTreeMap<StmtId, Vec<(StmtId, EdgeKind)>>,
            from: StmtId,
            to: StmtId,
            kind: EdgeKind,
        ) {
            succ.entry(from).or_default().push((to, kind));
            pred.entry(to).or_default().push((from, kind));
        }

        for (idx, (id, stmt)) in method.stmts.iter().enumerate() {
            succ.entry(*id).or_default();
            pred.entry(*id).or_default();
            let fallthrough = method.stmts.get(idx + 1).map(|(next, _)| *next);
            match stmt {
                Stmt::If(_, then_target, else_target) => {
                    add_edge(&mut succ, &mut pred, *id, *then_target, EdgeKind::IfTrue);
                    add_edge(&mut succ, &mut pred, *id, *else_target, EdgeKind::IfFalse);
                }
                Stmt::Switch(_, cases, default) => {
                    for (value, target) in cases {
                        add_edge(&mut succ, &mut pred, *id, *target, EdgeKind::SwitchCase(*value));
                    }
                    add_edge(&mut succ, &mut pred, *id, *default, EdgeKind::SwitchDefault);
                }
                Stmt::Goto(target) => add_edge(&mut succ, &mut pred, *id, *target, EdgeKind::Normal),
                Stmt::Return(_) => exits.push(*id),
                Stmt::Assign(_, _)
                | Stmt::StoreInstanceField(_, _, _)
                | Stmt::StoreStaticField(_, _)
                | Stmt::StoreArray(_, _, _)
                | Stmt::Invoke(_) => {
                    if let Some(next) = fallthrough {
                        add_edge(&mut succ, &mut pred, *id, next, EdgeKind::Normal);
                    } else {
                        exits.push(*id);
                    }
                }
            }
        }

        let entry = method.entry().unwrap_or(StmtId(0));
        Self {
            entry,
            exits,
            succ,
            pred,
        }
    }

    #[must_use]
    pub fn entry(&self) -> StmtId {
        self.entry
    }

    #[must_use]
    pub fn exits(&self) -> &[StmtId] {
        &self.exits
    }

    #[must_use]
    pub fn nodes(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.succ.keys().copied()
    }

    /// Successors in insertion (construction) order, as required for
    /// deterministic worklist enqueueing (§4.2, §5).
    #[must_use]
    pub fn successors(&self, node: StmtId) -> &[(StmtId, EdgeKind)] {
        self.succ.get(&node).map_or(&[], |v| v.as_slice())
    }

    #[must_use]
    pub fn predecessors(&self, node: StmtId) -> &[(StmtId, EdgeKind)] {
        self.pred.get(&node).map_or(&[], |v| v.as_slice())
    }
}
