//! Taint analysis overlay (C9 / §4.9): rides inside the CS pointer solver,
//! minting synthetic tainted objects at sources, propagating them through
//! transfer records, and collecting flows at sinks.

pub mod config;

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{CallSite, InvokeExpr, MethodRef, Type, VarId};
use crate::pointer::{Context, Obj, Pointer, PointsToSet};

pub use config::{Sink, Source, TaintConfig, Transfer};

/// Which argument slot a source/sink/transfer record refers to (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Slot {
    Base,
    Result,
    Arg(usize),
}

/// `TaintFlow(sourceCall, sinkCall, sinkArgIndex)`, ordered deterministically
/// (§3: by source call, then sink call, then arg index — `CallSite`'s own
/// `Ord` stands in for "call index" since calls are identified by owning
/// method + statement id, itself a total, deterministic order).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct TaintFlow {
    pub source_call: CallSite,
    pub sink_call: CallSite,
    pub arg_index: usize,
}

fn resolve_slot(
    slot: Slot,
    ctx: &Context,
    caller: &MethodRef,
    invoke: &InvokeExpr,
    lhs: Option<VarId>,
) -> Option<Pointer> {
    match slot {
        Slot::Base => invoke
            .receiver
            .map(|r| Pointer::Var(ctx.clone(), caller.clone(), r)),
        Slot::Arg(i) => invoke
            .args
            .get(i)
            .map(|a| Pointer::Var(ctx.clone(), caller.clone(), *a)),
        Slot::Result => lhs.map(|l| Pointer::Var(ctx.clone(), caller.clone(), l)),
    }
}

/// A registered transfer: taint objects reaching `from` are retyped as `ty`
/// (preserving the original source call) and injected at `to`.
struct Watch {
    from: Pointer,
    to: Pointer,
    ty: Type,
}

pub struct TaintManager {
    config: TaintConfig,
    watches: Vec<Watch>,
    sink_sites: Vec<(CallSite, Pointer, usize)>,
}

impl TaintManager {
    #[must_use]
    pub fn new(config: TaintConfig) -> Self {
        Self {
            config,
            watches: Vec::new(),
            sink_sites: Vec::new(),
        }
    }

    /// Called once when the solver processes an invocation (statically for
    /// static/special calls, per receiver object for instance calls). Mints
    /// source taint, registers transfer watches and sink sites. Returns
    /// immediate injections (source minting only — transfers and sinks are
    /// handled reactively/at completion since their source slot's points-to
    /// set may still be growing).
    pub fn on_invoke(
        &mut self,
        ctx: &Context,
        call_site: &CallSite,
        caller_method: &MethodRef,
        invoke: &InvokeExpr,
        lhs: Option<VarId>,
    ) -> Vec<(Pointer, PointsToSet)> {
        let mut injections = Vec::new();

        if let Some(source) = self.config.sources.iter().find(|s| s.method == invoke.method) {
            if let Some(l) = lhs {
                let obj = Obj::Taint {
                    source_call: call_site.clone(),
                    ty: source.result_type.clone(),
                };
                let ptr = Pointer::Var(ctx.clone(), caller_method.clone(), l);
                injections.push((ptr, BTreeSet::from([obj])));
            }
        }

        for transfer in self.config.transfers.iter().filter(|t| t.method == invoke.method) {
            if let (Some(from), Some(to)) = (
                resolve_slot(transfer.from, ctx, caller_method, invoke, lhs),
                resolve_slot(transfer.to, ctx, caller_method, invoke, lhs),
            ) {
                self.watches.push(Watch {
                    from,
                    to,
                    ty: transfer.ty.clone(),
                });
            }
        }

        if let Some(sink) = self.config.sinks.iter().find(|s| s.method == invoke.method) {
            if let Some(arg_var) = invoke.args.get(sink.arg_index) {
                let ptr = Pointer::Var(ctx.clone(), caller_method.clone(), *arg_var);
                self.sink_sites.push((call_site.clone(), ptr, sink.arg_index));
            }
        }

        injections
    }

    /// Called by the solver's worklist loop whenever `ptr` gains `delta`:
    /// forwards any taint objects across matching transfer watches.
    pub fn on_pts_grow(&self, ptr: &Pointer, delta: &PointsToSet) -> Vec<(Pointer, PointsToSet)> {
        let mut out = Vec::new();
        for watch in &self.watches {
            if &watch.from != ptr {
                continue;
            }
            let retyped: PointsToSet = delta
                .iter()
                .filter_map(|o| match o {
                    Obj::Taint { source_call, .. } => Some(Obj::Taint {
                        source_call: source_call.clone(),
                        ty: watch.ty.clone(),
                    }),
                    Obj::Alloc { .. } => None,
                })
                .collect();
            if !retyped.is_empty() {
                out.push((watch.to.clone(), retyped));
            }
        }
        out
    }

    /// Sink collection (§4.9), run once the fixed point has converged.
    #[must_use]
    pub fn collect_flows(&self, pts: &BTreeMap<Pointer, PointsToSet>) -> BTreeSet<TaintFlow> {
        let mut flows = BTreeSet::new();
        for (call_site, ptr, arg_index) in &self.sink_sites {
            let Some(set) = pts.get(ptr) else { continue };
            for obj in set {
                if let Obj::Taint { source_call, .. } = obj {
                    flows.insert(TaintFlow {
                        source_call: source_call.clone(),
                        sink_call: call_site.clone(),
                        arg_index: *arg_index,
                    });
                }
            }
        }
        flows
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ir::{CrossIndex, Expr, InvokeKind, Method, Program, Stmt, StmtId, Var};
    use crate::ir::ClassRef;
    use crate::pointer::PointerAnalysis;
    use crate::pointer::context::ContextInsensitive;

    /// S6: `t = source(); u = concat(t); sink(u);` — taint flows from the
    /// `source()` call to the `sink()` call through the `concat()` transfer.
    #[test]
    fn s6_taint_flows_through_transfer_to_sink() {
        let lib = ClassRef::new("Lib");
        let main_class = ClassRef::new("Main");
        let source_ref = MethodRef { class: lib.clone(), subsignature: "source()".into() };
        let concat_ref = MethodRef { class: lib.clone(), subsignature: "concat(Object)".into() };
        let sink_ref = MethodRef { class: lib.clone(), subsignature: "sink(Object)".into() };
        let main_ref = MethodRef { class: main_class.clone(), subsignature: "main()".into() };

        let t = VarId(0);
        let u = VarId(1);
        let mut vars = BTreeMap::new();
        vars.insert(t, Var { name: "t".into(), ty: Type::Reference(ClassRef::new("Object")) });
        vars.insert(u, Var { name: "u".into(), ty: Type::Reference(ClassRef::new("Object")) });

        let stmts = vec![
            (
                StmtId(0),
                Stmt::Assign(
                    t,
                    Expr::Invoke(InvokeExpr { kind: InvokeKind::Static, method: source_ref.clone(), receiver: None, args: vec![] }),
                ),
            ),
            (
                StmtId(1),
                Stmt::Assign(
                    u,
                    Expr::Invoke(InvokeExpr { kind: InvokeKind::Static, method: concat_ref.clone(), receiver: None, args: vec![t] }),
                ),
            ),
            (
                StmtId(2),
                Stmt::Invoke(InvokeExpr { kind: InvokeKind::Static, method: sink_ref.clone(), receiver: None, args: vec![u] }),
            ),
            (StmtId(3), Stmt::Return(None)),
        ];
        let mut main_index = CrossIndex::default();
        main_index.invokes = vec![StmtId(0), StmtId(1), StmtId(2)];
        let main_method = Method {
            class: main_class,
            subsignature: main_ref.subsignature.clone(),
            is_static: true,
            is_abstract: false,
            params: vec![],
            this_var: None,
            vars,
            stmts,
            index: main_index,
        };

        let mut methods = BTreeMap::new();
        methods.insert(main_ref.clone(), main_method);
        let program = Program::new(BTreeMap::new(), methods);

        let config = TaintConfig::from_records(
            vec![Source { method: source_ref.clone(), result_type: Type::Boolean }],
            vec![Sink { method: sink_ref.clone(), arg_index: 0 }],
            vec![Transfer { method: concat_ref.clone(), from: Slot::Arg(0), to: Slot::Result, ty: Type::Boolean }],
        );
        let taint = TaintManager::new(config);

        let report = PointerAnalysis::new(&program, ContextInsensitive)
            .with_taint(taint)
            .analyze(&main_ref);

        let flows = report.taint_flows();
        assert_eq!(flows.len(), 1);
        let flow = flows.iter().next().unwrap();
        assert_eq!(flow.source_call, CallSite { method: main_ref.clone(), stmt: StmtId(0) });
        assert_eq!(flow.sink_call, CallSite { method: main_ref, stmt: StmtId(2) });
        assert_eq!(flow.arg_index, 0);
    }
}
