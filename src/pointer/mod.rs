//! Pointer analysis (C6/C7, §4.7): PFG, points-to sets, and heap objects,
//! shared by the context-insensitive and context-sensitive variants.

pub mod context;
pub mod solver;

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{CallSite, ClassRef, FieldRef, MethodRef, Type, VarId};

pub use context::{Context, ContextSelector};
pub use solver::{CsCallGraph, CsCallSite, PointerAnalysis, PointerAnalysisReport};

/// A heap object: identified by its allocation site plus (in the CS variant)
/// a heap context, or — for the distinguished taint subset (§3, §4.9) — by
/// (source call site, type).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum Obj {
    Alloc {
        site: CallSite,
        class: ClassRef,
        heap_ctx: Context,
    },
    Taint {
        source_call: CallSite,
        ty: Type,
    },
}

impl Obj {
    #[must_use]
    pub fn heap_context(&self) -> Option<&Context> {
        match self {
            Obj::Alloc { heap_ctx, .. } => Some(heap_ctx),
            Obj::Taint { .. } => None,
        }
    }

    #[must_use]
    pub fn allocated_type(&self) -> ClassRef {
        match self {
            Obj::Alloc { class, .. } => class.clone(),
            Obj::Taint { ty, .. } => match ty {
                Type::Reference(c) => c.clone(),
                other => ClassRef::new(format!("{other:?}")),
            },
        }
    }

    #[must_use]
    pub fn is_taint(&self) -> bool {
        matches!(self, Obj::Taint { .. })
    }
}

pub type PointsToSet = BTreeSet<Obj>;

/// A PFG node (§3 `Pointer`): a context-sensitive variable, or a
/// context-free instance field / array / static field slot (heap objects
/// already carry their own context).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum Pointer {
    Var(Context, MethodRef, VarId),
    InstanceField(Obj, FieldRef),
    ArrayIndex(Obj),
    StaticField(FieldRef),
}

/// Directed graph on pointers. Edge insertion is idempotent; successor
/// iteration is insertion-ordered for reproducibility (§3, §5).
#[derive(Debug, Clone, Default)]
pub struct PointerFlowGraph {
    succ: BTreeMap<Pointer, Vec<Pointer>>,
}

impl PointerFlowGraph {
    /// Adds the edge `from -> to`. Returns `true` if it is new.
    pub fn add_edge(&mut self, from: Pointer, to: Pointer) -> bool {
        let targets = self.succ.entry(from).or_default();
        if targets.contains(&to) {
            false
        } else {
            targets.push(to);
            true
        }
    }

    #[must_use]
    pub fn successors(&self, from: &Pointer) -> &[Pointer] {
        self.succ.get(from).map_or(&[], |v| v.as_slice())
    }
}
