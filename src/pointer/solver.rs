//! The shared pointer-analysis algorithm (C6/C7, §4.7): PFG construction and
//! worklist propagation, with an on-the-fly context-sensitive call graph.
//! C6 (context-insensitive) and C7 (context-sensitive) are the same engine
//! parameterized by [`ContextSelector`] — [`context::ContextInsensitive`]
//! collapses every context to empty.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::ir::{CallSite, Expr, InvokeExpr, InvokeKind, MethodRef, Program, Stmt, StmtId, VarId};
use crate::taint::{TaintFlow, TaintManager};

use super::{Context, ContextSelector, Obj, Pointer, PointerFlowGraph, PointsToSet};

/// A call site tagged with the context it executes in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct CsCallSite {
    pub context: Context,
    pub call_site: CallSite,
}

/// The on-the-fly, context-sensitive call graph pointer analysis builds as
/// it discovers reachable `(context, method)` pairs (§3 `CallGraph`,
/// CS variant).
#[derive(Debug, Clone, Default)]
pub struct CsCallGraph {
    reachable: BTreeSet<(Context, MethodRef)>,
    edges: BTreeSet<(CsCallSite, Context, MethodRef, InvokeKind)>,
}

impl CsCallGraph {
    fn mark_reachable(&mut self, ctx: Context, method: MethodRef) -> bool {
        self.reachable.insert((ctx, method))
    }

    fn add_edge(&mut self, call_site: CsCallSite, callee_ctx: Context, callee: MethodRef, kind: InvokeKind) {
        self.edges.insert((call_site, callee_ctx, callee, kind));
    }

    #[must_use]
    pub fn is_reachable(&self, ctx: &Context, method: &MethodRef) -> bool {
        self.reachable.contains(&(ctx.clone(), method.clone()))
    }

    pub fn reachable_methods(&self) -> impl Iterator<Item = &(Context, MethodRef)> {
        self.reachable.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &(CsCallSite, Context, MethodRef, InvokeKind)> {
        self.edges.iter()
    }
}

/// The final, frozen output of a pointer-analysis run (§3 lifecycle: built
/// monotonically, then handed to clients read-only).
#[derive(Debug, Clone, Default)]
pub struct PointerAnalysisReport {
    pts: BTreeMap<Pointer, PointsToSet>,
    pfg: PointerFlowGraph,
    call_graph: CsCallGraph,
    taint_flows: BTreeSet<TaintFlow>,
}

impl PointerAnalysisReport {
    #[must_use]
    pub fn points_to(&self, ptr: &Pointer) -> PointsToSet {
        self.pts.get(ptr).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn call_graph(&self) -> &CsCallGraph {
        &self.call_graph
    }

    #[must_use]
    pub fn pfg(&self) -> &PointerFlowGraph {
        &self.pfg
    }

    #[must_use]
    pub fn taint_flows(&self) -> &BTreeSet<TaintFlow> {
        &self.taint_flows
    }

    /// Every `(context, method, variable, points-to set)` computed for a
    /// `Var` pointer. Consumed by C8 to build its (context-flattened) alias
    /// oracle.
    pub fn var_entries(&self) -> impl Iterator<Item = (&Context, &MethodRef, &VarId, &PointsToSet)> {
        self.pts.iter().filter_map(|(ptr, pts)| match ptr {
            Pointer::Var(ctx, method, var) => Some((ctx, method, var, pts)),
            _ => None,
        })
    }
}

/// The engine itself: PFG, on-the-fly call graph, worklist, and the
/// per-pointer points-to sets it owns exclusively for the run (§3, §5).
pub struct PointerAnalysis<'p, S: ContextSelector> {
    program: &'p Program,
    selector: S,
    pfg: PointerFlowGraph,
    pts: BTreeMap<Pointer, PointsToSet>,
    call_graph: CsCallGraph,
    worklist: VecDeque<(Pointer, PointsToSet)>,
    taint: Option<TaintManager>,
}

impl<'p, S: ContextSelector> PointerAnalysis<'p, S> {
    #[must_use]
    pub fn new(program: &'p Program, selector: S) -> Self {
        Self {
            program,
            selector,
            pfg: PointerFlowGraph::default(),
            pts: BTreeMap::new(),
            call_graph: CsCallGraph::default(),
            worklist: VecDeque::new(),
            taint: None,
        }
    }

    /// Attaches the taint overlay (C9). Per §4.9 it is designed to ride
    /// inside the context-sensitive variant, but the hook point is the same
    /// regardless of which `ContextSelector` is plugged in.
    #[must_use]
    pub fn with_taint(mut self, taint: TaintManager) -> Self {
        self.taint = Some(taint);
        self
    }

    fn pts_of(&self, ptr: &Pointer) -> PointsToSet {
        self.pts.get(ptr).cloned().unwrap_or_default()
    }

    fn worklist_add(&mut self, ptr: Pointer, objs: PointsToSet) {
        if !objs.is_empty() {
            self.worklist.push_back((ptr, objs));
        }
    }

    /// Adds a PFG edge; if new and the source already has a non-empty
    /// points-to set, that set is propagated immediately (§4.7).
    fn add_pfg_edge(&mut self, from: Pointer, to: Pointer) {
        if self.pfg.add_edge(from.clone(), to.clone()) {
            let existing = self.pts_of(&from);
            if !existing.is_empty() {
                self.worklist_add(to, existing);
            }
        }
    }

    /// Runs the fixed point and returns the frozen report (§4.7, §4.9).
    #[must_use]
    pub fn analyze(mut self, entry: &MethodRef) -> PointerAnalysisReport {
        let empty_ctx = self.selector.empty_context();
        if self.call_graph.mark_reachable(empty_ctx.clone(), entry.clone()) {
            self.process_reachable(&empty_ctx, entry);
        }

        while let Some((ptr, delta_in)) = self.worklist.pop_front() {
            let existing = self.pts_of(&ptr);
            let delta: PointsToSet = delta_in.difference(&existing).cloned().collect();
            if delta.is_empty() {
                continue;
            }
            let mut merged = existing;
            merged.extend(delta.iter().cloned());
            self.pts.insert(ptr.clone(), merged);

            let successors = self.pfg.successors(&ptr).to_vec();
            for succ in successors {
                self.worklist_add(succ, delta.clone());
            }

            if let Some(taint) = &self.taint {
                let injections = taint.on_pts_grow(&ptr, &delta);
                for (p, objs) in injections {
                    self.worklist_add(p, objs);
                }
            }

            if let Pointer::Var(ctx, method_ref, v) = ptr.clone() {
                self.handle_new_objects_at_var(&ctx, &method_ref, v, &delta);
            }
        }

        let taint_flows = self
            .taint
            .as_ref()
            .map(|t| t.collect_flows(&self.pts))
            .unwrap_or_default();

        PointerAnalysisReport {
            pts: self.pts,
            pfg: self.pfg,
            call_graph: self.call_graph,
            taint_flows,
        }
    }

    /// Processes the allocation/copy/static-field/static-call statements of
    /// a newly discovered `(context, method)` pair. Instance field/array
    /// accesses and instance calls are handled reactively instead, when the
    /// base variable's points-to set actually gains an object (§4.7).
    fn process_reachable(&mut self, ctx: &Context, method_ref: &MethodRef) {
        let program = self.program;
        let Some(method) = program.method(method_ref) else { return };
        for (stmt_id, stmt) in method.stmts.clone() {
            match &stmt {
                Stmt::Assign(x, Expr::New(class)) => {
                    let alloc_site = CallSite {
                        method: method_ref.clone(),
                        stmt: stmt_id,
                    };
                    let heap_ctx = self.selector.select_heap_context(ctx, &alloc_site);
                    let obj = Obj::Alloc {
                        site: alloc_site,
                        class: class.clone(),
                        heap_ctx,
                    };
                    self.worklist_add(
                        Pointer::Var(ctx.clone(), method_ref.clone(), *x),
                        BTreeSet::from([obj]),
                    );
                }
                Stmt::Assign(x, Expr::Var(y)) => {
                    self.add_pfg_edge(
                        Pointer::Var(ctx.clone(), method_ref.clone(), *y),
                        Pointer::Var(ctx.clone(), method_ref.clone(), *x),
                    );
                }
                Stmt::Assign(x, Expr::StaticFieldAccess(f)) => {
                    self.add_pfg_edge(
                        Pointer::StaticField(f.clone()),
                        Pointer::Var(ctx.clone(), method_ref.clone(), *x),
                    );
                }
                Stmt::StoreStaticField(f, y) => {
                    self.add_pfg_edge(
                        Pointer::Var(ctx.clone(), method_ref.clone(), *y),
                        Pointer::StaticField(f.clone()),
                    );
                }
                Stmt::Assign(_, Expr::Invoke(invoke)) if invoke.kind == InvokeKind::Static => {
                    let lhs = stmt.invoke_lhs();
                    self.process_static_invoke(ctx, method_ref, stmt_id, invoke, lhs);
                }
                Stmt::Invoke(invoke) if invoke.kind == InvokeKind::Static => {
                    self.process_static_invoke(ctx, method_ref, stmt_id, invoke, None);
                }
                _ => {}
            }
        }
    }

    fn process_static_invoke(
        &mut self,
        ctx: &Context,
        caller: &MethodRef,
        stmt_id: StmtId,
        invoke: &InvokeExpr,
        lhs: Option<VarId>,
    ) {
        let call_site = CallSite {
            method: caller.clone(),
            stmt: stmt_id,
        };

        if let Some(taint) = self.taint.as_mut() {
            let injections = taint.on_invoke(ctx, &call_site, caller, invoke, lhs);
            for (p, objs) in injections {
                self.worklist_add(p, objs);
            }
        }

        let Some(target) = self
            .program
            .hierarchy
            .dispatch(&invoke.method.class, &invoke.method.subsignature)
        else {
            return; // ResolutionFailure (§7): logged and elided, not an error.
        };

        let callee_ctx = self.selector.select_for_static_call(ctx, &call_site);
        self.call_graph.add_edge(
            CsCallSite {
                context: ctx.clone(),
                call_site,
            },
            callee_ctx.clone(),
            target.clone(),
            invoke.kind,
        );
        let newly_reachable = self.call_graph.mark_reachable(callee_ctx.clone(), target.clone());
        self.wire_params_and_return(ctx, caller, &callee_ctx, &target, invoke, lhs);
        if newly_reachable {
            self.process_reachable(&callee_ctx, &target);
        }
    }

    fn handle_instance_call(
        &mut self,
        ctx: &Context,
        caller: &MethodRef,
        stmt_id: StmtId,
        recv_obj: &Obj,
        invoke: &InvokeExpr,
        lhs: Option<VarId>,
    ) {
        let call_site = CallSite {
            method: caller.clone(),
            stmt: stmt_id,
        };

        if let Some(taint) = self.taint.as_mut() {
            let injections = taint.on_invoke(ctx, &call_site, caller, invoke, lhs);
            for (p, objs) in injections {
                self.worklist_add(p, objs);
            }
        }

        let target = match invoke.kind {
            InvokeKind::Special => self
                .program
                .hierarchy
                .dispatch(&invoke.method.class, &invoke.method.subsignature),
            _ => self.program.hierarchy.dispatch(&recv_obj.allocated_type(), &invoke.method.subsignature),
        };
        let Some(target) = target else { return };

        let callee_ctx = self.selector.select_for_instance_call(ctx, &call_site, recv_obj);
        self.call_graph.add_edge(
            CsCallSite {
                context: ctx.clone(),
                call_site,
            },
            callee_ctx.clone(),
            target.clone(),
            invoke.kind,
        );

        if let Some(callee_method) = self.program.method(&target) {
            if let Some(this_var) = callee_method.this_var {
                self.worklist_add(
                    Pointer::Var(callee_ctx.clone(), target.clone(), this_var),
                    BTreeSet::from([recv_obj.clone()]),
                );
            }
        }

        let newly_reachable = self.call_graph.mark_reachable(callee_ctx.clone(), target.clone());
        self.wire_params_and_return(ctx, caller, &callee_ctx, &target, invoke, lhs);
        if newly_reachable {
            self.process_reachable(&callee_ctx, &target);
        }
    }

    fn wire_params_and_return(
        &mut self,
        caller_ctx: &Context,
        caller: &MethodRef,
        callee_ctx: &Context,
        callee_ref: &MethodRef,
        invoke: &InvokeExpr,
        lhs: Option<VarId>,
    ) {
        let Some(callee) = self.program.method(callee_ref) else { return };
        let params = callee.params.clone();
        let return_vars = callee.return_vars();
        for (formal, actual) in params.iter().zip(invoke.args.iter()) {
            self.add_pfg_edge(
                Pointer::Var(caller_ctx.clone(), caller.clone(), *actual),
                Pointer::Var(callee_ctx.clone(), callee_ref.clone(), *formal),
            );
        }
        if let Some(r) = lhs {
            for rv in return_vars {
                self.add_pfg_edge(
                    Pointer::Var(callee_ctx.clone(), callee_ref.clone(), rv),
                    Pointer::Var(caller_ctx.clone(), caller.clone(), r),
                );
            }
        }
    }

    /// §4.7's worklist-loop bullet: for each new object reaching a `CSVar`,
    /// wire instance field/array edges and dispatch instance calls whose
    /// receiver is this variable, using the per-variable cross-indices
    /// instead of rescanning the method.
    fn handle_new_objects_at_var(&mut self, ctx: &Context, method_ref: &MethodRef, v: VarId, delta: &PointsToSet) {
        let Some(method) = self.program.method(method_ref) else { return };
        let store_fields = method.index.store_fields.get(&v).cloned().unwrap_or_default();
        let load_fields = method.index.load_fields.get(&v).cloned().unwrap_or_default();
        let store_arrays = method.index.store_arrays.get(&v).cloned().unwrap_or_default();
        let load_arrays = method.index.load_arrays.get(&v).cloned().unwrap_or_default();
        let invokes = method.index.invokes.clone();
        let stmts = method.stmts.clone();
        let stmt_at = |id: StmtId| stmts.iter().find(|(i, _)| *i == id).map(|(_, s)| s.clone());

        for obj in delta {
            for stmt_id in &store_fields {
                if let Some(Stmt::StoreInstanceField(_, f, y)) = stmt_at(*stmt_id) {
                    self.add_pfg_edge(
                        Pointer::Var(ctx.clone(), method_ref.clone(), y),
                        Pointer::InstanceField(obj.clone(), f),
                    );
                }
            }
            for stmt_id in &load_fields {
                if let Some(Stmt::Assign(z, Expr::InstanceFieldAccess(_, f))) = stmt_at(*stmt_id) {
                    self.add_pfg_edge(
                        Pointer::InstanceField(obj.clone(), f),
                        Pointer::Var(ctx.clone(), method_ref.clone(), z),
                    );
                }
            }
            for stmt_id in &store_arrays {
                if let Some(Stmt::StoreArray(_, _, y)) = stmt_at(*stmt_id) {
                    self.add_pfg_edge(
                        Pointer::Var(ctx.clone(), method_ref.clone(), y),
                        Pointer::ArrayIndex(obj.clone()),
                    );
                }
            }
            for stmt_id in &load_arrays {
                if let Some(Stmt::Assign(z, Expr::ArrayAccess(_, _))) = stmt_at(*stmt_id) {
                    self.add_pfg_edge(
                        Pointer::ArrayIndex(obj.clone()),
                        Pointer::Var(ctx.clone(), method_ref.clone(), z),
                    );
                }
            }
            for stmt_id in &invokes {
                let Some(stmt) = stmt_at(*stmt_id) else { continue };
                let Some(invoke) = stmt.as_invoke() else { continue };
                if invoke.receiver == Some(v) && invoke.kind != InvokeKind::Static {
                    let lhs = stmt.invoke_lhs();
                    self.handle_instance_call(ctx, method_ref, *stmt_id, obj, invoke, lhs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ir::{Class, ClassRef, CrossIndex, Method, Program, Type, Var};
    use crate::pointer::context::{CallSiteSensitive, ContextInsensitive};

    fn identity_program() -> (Program, MethodRef, MethodRef, VarId, VarId, VarId, VarId) {
        let demo = ClassRef::new("Demo");
        let id_ref = MethodRef {
            class: demo.clone(),
            subsignature: "id(LObject;)LObject;".into(),
        };
        let caller_ref = MethodRef {
            class: demo.clone(),
            subsignature: "caller()V".into(),
        };

        let p = VarId(0);
        let mut id_vars = BTreeMap::new();
        id_vars.insert(
            p,
            Var {
                name: "p".into(),
                ty: Type::Reference(ClassRef::new("Object")),
            },
        );
        let id_method = Method {
            class: demo.clone(),
            subsignature: id_ref.subsignature.clone(),
            is_static: true,
            is_abstract: false,
            params: vec![p],
            this_var: None,
            vars: id_vars,
            stmts: vec![(StmtId(0), Stmt::Return(Some(p)))],
            index: CrossIndex::default(),
        };

        let (o1, r1, o2, r2) = (VarId(0), VarId(1), VarId(2), VarId(3));
        let mut caller_vars = BTreeMap::new();
        for (v, name) in [(o1, "o1"), (r1, "r1"), (o2, "o2"), (r2, "r2")] {
            caller_vars.insert(
                v,
                Var {
                    name: name.into(),
                    ty: Type::Reference(ClassRef::new("Object")),
                },
            );
        }
        let invoke_with = |arg: VarId| {
            Expr::Invoke(InvokeExpr {
                kind: InvokeKind::Static,
                method: id_ref.clone(),
                receiver: None,
                args: vec![arg],
            })
        };
        let caller_method = Method {
            class: demo.clone(),
            subsignature: caller_ref.subsignature.clone(),
            is_static: true,
            is_abstract: false,
            params: vec![],
            this_var: None,
            vars: caller_vars,
            stmts: vec![
                (StmtId(0), Stmt::Assign(o1, Expr::New(ClassRef::new("O1")))),
                (StmtId(1), Stmt::Assign(r1, invoke_with(o1))),
                (StmtId(2), Stmt::Assign(o2, Expr::New(ClassRef::new("O2")))),
                (StmtId(3), Stmt::Assign(r2, invoke_with(o2))),
                (StmtId(4), Stmt::Return(None)),
            ],
            index: CrossIndex::default(),
        };

        let mut methods = BTreeMap::new();
        let mut class_methods = BTreeMap::new();
        class_methods.insert(id_ref.subsignature.clone(), id_ref.clone());
        class_methods.insert(caller_ref.subsignature.clone(), caller_ref.clone());
        methods.insert(id_ref.clone(), id_method);
        methods.insert(caller_ref.clone(), caller_method);

        let mut classes = BTreeMap::new();
        classes.insert(
            demo.clone(),
            Class {
                name: demo,
                super_class: None,
                interfaces: vec![],
                is_interface: false,
                is_abstract: false,
                methods: class_methods,
            },
        );

        let program = Program::new(classes, methods);
        (program, id_ref, caller_ref, p, o1, o2, r1)
    }

    /// S5: context-insensitive analysis conflates the two call sites' `p`,
    /// while 1-call-site-sensitivity keeps them apart.
    #[test]
    fn s5_call_site_sensitivity_avoids_contamination() {
        let (program, id_ref, caller_ref, p, _, _, _) = identity_program();

        let ci_report = PointerAnalysis::new(&program, ContextInsensitive).analyze(&caller_ref);
        let ci_p_pts = ci_report.points_to(&Pointer::Var(Context::empty(), id_ref.clone(), p));
        assert_eq!(ci_p_pts.len(), 2, "CI conflates both allocations at `p`");

        let selector = CallSiteSensitive { k: 1 };
        let cs_report = PointerAnalysis::new(&program, selector).analyze(&caller_ref);

        let call1 = CallSite {
            method: caller_ref.clone(),
            stmt: StmtId(1),
        };
        let call2 = CallSite {
            method: caller_ref.clone(),
            stmt: StmtId(3),
        };
        let ctx1 = selector.select_for_static_call(&Context::empty(), &call1);
        let ctx2 = selector.select_for_static_call(&Context::empty(), &call2);
        assert_ne!(ctx1, ctx2);

        let pts1 = cs_report.points_to(&Pointer::Var(ctx1, id_ref.clone(), p));
        let pts2 = cs_report.points_to(&Pointer::Var(ctx2, id_ref, p));
        assert_eq!(pts1.len(), 1);
        assert_eq!(pts2.len(), 1);
        assert_ne!(pts1, pts2, "each call site's `p` sees only its own argument");
    }
}
