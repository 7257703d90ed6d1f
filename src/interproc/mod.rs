//! Interprocedural control-flow graph (C0b, whole-program half) and the
//! alias-aware interprocedural constant propagation it feeds (C8, §4.8).

pub mod constprop;

use std::collections::BTreeMap;

use crate::cfg::Cfg;
use crate::ir::{CallSite, MethodRef, Program, StmtId};

/// The four ICFG edge kinds (§4.8): `Normal` collapses every intraprocedural
/// CFG edge kind (branch/switch/goto/fallthrough) that isn't part of a call,
/// since the interprocedural transfer doesn't condition on branch labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IcfgEdgeKind {
    Normal,
    Call,
    CallToReturn,
    Return,
}

/// A statement, addressed globally by its owning method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IcfgNode {
    pub method: MethodRef,
    pub stmt: StmtId,
}

/// The whole-program interprocedural CFG (§6): one node per reachable
/// statement, edges labeled with one of the four kinds above.
#[derive(Debug, Clone)]
pub struct Icfg {
    entry: MethodRef,
    succ: BTreeMap<IcfgNode, Vec<(IcfgNode, IcfgEdgeKind)>>,
    pred: BTreeMap<IcfgNode, Vec<(IcfgNode, IcfgEdgeKind)>>,
}

fn add_edge(
    succ: &mut BTreeMap<IcfgNode, Vec<(IcfgNode, IcfgEdgeKind)>>,
    pred: &mut BTreeMap<IcfgNode, Vec<(IcfgNode, IcfgEdgeKind)>>,
    from: IcfgNode,
    to: IcfgNode,
    kind: IcfgEdgeKind,
) {
    let s = succ.entry(from.clone()).or_default();
    if !s.iter().any(|(n, k)| *n == to && *k == kind) {
        s.push((to.clone(), kind));
    }
    let p = pred.entry(to).or_default();
    if !p.iter().any(|(n, k)| *n == from && *k == kind) {
        p.push((from, kind));
    }
}

impl Icfg {
    /// Builds the whole-program ICFG. `call_edges` is the resolved call
    /// graph, as `(call site, callee)` pairs — context is irrelevant here
    /// since C8's facts are keyed per statement, not per context (§6).
    #[must_use]
    pub fn build(program: &Program, call_edges: impl IntoIterator<Item = (CallSite, MethodRef)>, entry: &MethodRef) -> Self {
        let mut succ: BTreeMap<IcfgNode, Vec<(IcfgNode, IcfgEdgeKind)>> = BTreeMap::new();
        let mut pred: BTreeMap<IcfgNode, Vec<(IcfgNode, IcfgEdgeKind)>> = BTreeMap::new();

        let cfgs: BTreeMap<MethodRef, Cfg> = program
            .methods
            .values()
            .map(|m| (m.method_ref(), Cfg::build(m)))
            .collect();

        let mut callees_by_site: BTreeMap<(MethodRef, StmtId), Vec<MethodRef>> = BTreeMap::new();
        for (call_site, callee) in call_edges {
            callees_by_site
                .entry((call_site.method, call_site.stmt))
                .or_default()
                .push(callee);
        }

        for (method_ref, cfg) in &cfgs {
            let Some(method) = program.method(method_ref) else { continue };
            for stmt_id in cfg.nodes() {
                let node = IcfgNode {
                    method: method_ref.clone(),
                    stmt: stmt_id,
                };
                succ.entry(node.clone()).or_default();
                pred.entry(node.clone()).or_default();
                let Some(stmt) = method.stmt(stmt_id) else { continue };
                let cfg_succs = cfg.successors(stmt_id).to_vec();

                if stmt.as_invoke().is_some() {
                    for (next, _) in &cfg_succs {
                        let to = IcfgNode {
                            method: method_ref.clone(),
                            stmt: *next,
                        };
                        add_edge(&mut succ, &mut pred, node.clone(), to, IcfgEdgeKind::CallToReturn);
                    }
                    if let Some(callees) = callees_by_site.get(&(method_ref.clone(), stmt_id)) {
                        for callee in callees {
                            let Some(callee_method) = program.method(callee) else { continue };
                            let Some(entry_stmt) = callee_method.entry() else { continue };
                            let callee_entry = IcfgNode {
                                method: callee.clone(),
                                stmt: entry_stmt,
                            };
                            add_edge(&mut succ, &mut pred, node.clone(), callee_entry, IcfgEdgeKind::Call);
                            let Some(callee_cfg) = cfgs.get(callee) else { continue };
                            for exit in callee_cfg.exits() {
                                let exit_node = IcfgNode {
                                    method: callee.clone(),
                                    stmt: *exit,
                                };
                                for (next, _) in &cfg_succs {
                                    let to = IcfgNode {
                                        method: method_ref.clone(),
                                        stmt: *next,
                                    };
                                    add_edge(&mut succ, &mut pred, exit_node.clone(), to, IcfgEdgeKind::Return);
                                }
                            }
                        }
                    }
                } else {
                    for (next, _) in cfg_succs {
                        let to = IcfgNode {
                            method: method_ref.clone(),
                            stmt: next,
                        };
                        add_edge(&mut succ, &mut pred, node.clone(), to, IcfgEdgeKind::Normal);
                    }
                }
            }
        }

        Self {
            entry: entry.clone(),
            succ,
            pred,
        }
    }

    #[must_use]
    pub fn entry(&self) -> &MethodRef {
        &self.entry
    }

    pub fn nodes(&self) -> impl Iterator<Item = &IcfgNode> {
        self.succ.keys()
    }

    #[must_use]
    pub fn successors(&self, node: &IcfgNode) -> &[(IcfgNode, IcfgEdgeKind)] {
        self.succ.get(node).map_or(&[], |v| v.as_slice())
    }

    #[must_use]
    pub fn predecessors(&self, node: &IcfgNode) -> &[(IcfgNode, IcfgEdgeKind)] {
        self.pred.get(node).map_or(&[], |v| v.as_slice())
    }
}
