//! Call graph construction: CHA (C5) as the baseline resolver used by early
//! stages; the on-the-fly call graph built by pointer analysis (C6/C7) lives
//! in [`crate::pointer`].

pub mod cha;

use std::collections::BTreeSet;

use crate::ir::{CallSite, InvokeKind, MethodRef};

/// Reachable methods plus directed call edges tagged with their dispatch
/// kind (§3 `CallGraph`).
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    reachable: BTreeSet<MethodRef>,
    edges: BTreeSet<(CallSite, MethodRef, InvokeKind)>,
}

impl CallGraph {
    /// Marks `method` reachable; returns `true` if it was newly added.
    pub fn mark_reachable(&mut self, method: MethodRef) -> bool {
        self.reachable.insert(method)
    }

    pub fn add_edge(&mut self, call_site: CallSite, callee: MethodRef, kind: InvokeKind) {
        self.edges.insert((call_site, callee, kind));
    }

    #[must_use]
    pub fn is_reachable(&self, method: &MethodRef) -> bool {
        self.reachable.contains(method)
    }

    pub fn reachable_methods(&self) -> impl Iterator<Item = &MethodRef> {
        self.reachable.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &(CallSite, MethodRef, InvokeKind)> {
        self.edges.iter()
    }

    #[must_use]
    pub fn callees(&self, call_site: &CallSite) -> BTreeSet<MethodRef> {
        self.edges
            .iter()
            .filter(|(cs, _, _)| cs == call_site)
            .map(|(_, m, _)| m.clone())
            .collect()
    }
}
