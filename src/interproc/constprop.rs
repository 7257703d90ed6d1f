//! Alias-aware interprocedural constant propagation (C8, §4.8): runs after
//! pointer analysis, using its points-to result as a sound-over-approximate
//! alias oracle rather than recomputing it.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::dataflow::constprop::ConstantPropagation;
use crate::dataflow::solver::DataflowAnalysis;
use crate::dataflow::value::{CPFact, Value};
use crate::ir::{Expr, FieldRef, MethodRef, Program, Stmt, StmtId, Type, VarId};
use crate::pointer::{PointerAnalysisReport, PointsToSet};

use super::{Icfg, IcfgEdgeKind, IcfgNode};

/// Two array indices are index-compatible (§4.8.1) if neither is `UNDEF` and
/// they are either both `NAC`, one `NAC` and one `CONST`, or equal `CONST`s.
fn index_compatible(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Undef, _) | (_, Value::Undef) => false,
        (Value::Nac, _) | (_, Value::Nac) => true,
        (Value::Const(x), Value::Const(y)) => x == y,
    }
}

type FactTable = BTreeMap<IcfgNode, (CPFact, CPFact)>;

/// The global, flow-insensitive-per-variable alias index C8 queries instead
/// of rescanning the program: which variables point to overlapping objects,
/// and where every heap store/load statement lives (§4.8.1).
struct AliasOracle {
    var_pts: BTreeMap<(MethodRef, VarId), PointsToSet>,
    store_fields: Vec<(MethodRef, VarId, FieldRef, VarId, StmtId)>,
    load_fields: Vec<(MethodRef, VarId, FieldRef, VarId, StmtId)>,
    store_static: BTreeMap<FieldRef, Vec<(MethodRef, VarId, StmtId)>>,
    load_static: BTreeMap<FieldRef, Vec<(MethodRef, VarId, StmtId)>>,
    store_arrays: Vec<(MethodRef, VarId, VarId, VarId, StmtId)>,
    load_arrays: Vec<(MethodRef, VarId, VarId, VarId, StmtId)>,
}

impl AliasOracle {
    fn build(program: &Program, pts: &PointerAnalysisReport) -> Self {
        let mut var_pts: BTreeMap<(MethodRef, VarId), PointsToSet> = BTreeMap::new();
        for (_, method, var, set) in pts.var_entries() {
            var_pts.entry((method.clone(), *var)).or_default().extend(set.iter().cloned());
        }

        let mut store_fields = Vec::new();
        let mut load_fields = Vec::new();
        let mut store_static: BTreeMap<FieldRef, Vec<(MethodRef, VarId, StmtId)>> = BTreeMap::new();
        let mut load_static: BTreeMap<FieldRef, Vec<(MethodRef, VarId, StmtId)>> = BTreeMap::new();
        let mut store_arrays = Vec::new();
        let mut load_arrays = Vec::new();

        for method in program.methods.values() {
            let method_ref = method.method_ref();
            for (stmt_id, stmt) in &method.stmts {
                match stmt {
                    Stmt::StoreInstanceField(base, field, rhs) => {
                        store_fields.push((method_ref.clone(), *base, field.clone(), *rhs, *stmt_id));
                    }
                    Stmt::Assign(lhs, Expr::InstanceFieldAccess(base, field)) => {
                        load_fields.push((method_ref.clone(), *base, field.clone(), *lhs, *stmt_id));
                    }
                    Stmt::StoreStaticField(field, rhs) => {
                        store_static.entry(field.clone()).or_default().push((method_ref.clone(), *rhs, *stmt_id));
                    }
                    Stmt::Assign(lhs, Expr::StaticFieldAccess(field)) => {
                        load_static.entry(field.clone()).or_default().push((method_ref.clone(), *lhs, *stmt_id));
                    }
                    Stmt::StoreArray(base, idx, rhs) => {
                        store_arrays.push((method_ref.clone(), *base, *idx, *rhs, *stmt_id));
                    }
                    Stmt::Assign(lhs, Expr::ArrayAccess(base, idx)) => {
                        load_arrays.push((method_ref.clone(), *base, *idx, *lhs, *stmt_id));
                    }
                    _ => {}
                }
            }
        }

        Self {
            var_pts,
            store_fields,
            load_fields,
            store_static,
            load_static,
            store_arrays,
            load_arrays,
        }
    }

    fn aliases(&self, m1: &MethodRef, v1: VarId, m2: &MethodRef, v2: VarId) -> bool {
        let empty = PointsToSet::new();
        let p1 = self.var_pts.get(&(m1.clone(), v1)).unwrap_or(&empty);
        let p2 = self.var_pts.get(&(m2.clone(), v2)).unwrap_or(&empty);
        p1.intersection(p2).next().is_some()
    }

    fn load_instance_field(&self, method: &MethodRef, base: VarId, field: &FieldRef, facts: &FactTable) -> Value {
        let mut r = Value::Undef;
        for (m, b, f, rhs, stmt_id) in &self.store_fields {
            if f != field || !self.aliases(method, base, m, *b) {
                continue;
            }
            let node = IcfgNode { method: m.clone(), stmt: *stmt_id };
            let v = facts.get(&node).map_or(Value::Undef, |(inf, _)| inf.get(*rhs));
            r = r.meet(v);
        }
        r
    }

    fn load_static_field(&self, field: &FieldRef, facts: &FactTable) -> Value {
        let mut r = Value::Undef;
        for (m, rhs, stmt_id) in self.store_static.get(field).map_or(&[][..], Vec::as_slice) {
            let node = IcfgNode { method: m.clone(), stmt: *stmt_id };
            let v = facts.get(&node).map_or(Value::Undef, |(inf, _)| inf.get(*rhs));
            r = r.meet(v);
        }
        r
    }

    fn load_array(&self, method: &MethodRef, base: VarId, idx_val: Value, facts: &FactTable) -> Value {
        let mut r = Value::Undef;
        for (m, b, j, rhs, stmt_id) in &self.store_arrays {
            if !self.aliases(method, base, m, *b) {
                continue;
            }
            let node = IcfgNode { method: m.clone(), stmt: *stmt_id };
            let Some((store_in, _)) = facts.get(&node) else { continue };
            if !index_compatible(idx_val, store_in.get(*j)) {
                continue;
            }
            r = r.meet(store_in.get(*rhs));
        }
        r
    }

    fn aliased_load_field_nodes(&self, store_method: &MethodRef, store_base: VarId, field: &FieldRef) -> Vec<IcfgNode> {
        self.load_fields
            .iter()
            .filter(|(m, b, f, _, _)| f == field && self.aliases(store_method, store_base, m, *b))
            .map(|(m, _, _, _, stmt_id)| IcfgNode { method: m.clone(), stmt: *stmt_id })
            .collect()
    }

    fn aliased_load_static_nodes(&self, field: &FieldRef) -> Vec<IcfgNode> {
        self.load_static
            .get(field)
            .map(|v| v.iter().map(|(m, _, stmt_id)| IcfgNode { method: m.clone(), stmt: *stmt_id }).collect())
            .unwrap_or_default()
    }

    fn aliased_load_array_nodes(
        &self,
        store_method: &MethodRef,
        store_base: VarId,
        store_idx_val: Value,
        facts: &FactTable,
    ) -> Vec<IcfgNode> {
        let mut out = Vec::new();
        for (m, b, j, _, stmt_id) in &self.load_arrays {
            if !self.aliases(store_method, store_base, m, *b) {
                continue;
            }
            let node = IcfgNode { method: m.clone(), stmt: *stmt_id };
            let Some((load_in, _)) = facts.get(&node) else { continue };
            if index_compatible(store_idx_val, load_in.get(*j)) {
                out.push(node);
            }
        }
        out
    }
}

/// Per-statement IN/OUT facts produced by [`InterprocConstantPropagation::solve`].
#[derive(Debug, Clone, Default)]
pub struct InterprocResult {
    facts: FactTable,
}

impl InterprocResult {
    #[must_use]
    pub fn in_fact(&self, node: &IcfgNode) -> Option<&CPFact> {
        self.facts.get(node).map(|(inf, _)| inf)
    }

    #[must_use]
    pub fn out_fact(&self, node: &IcfgNode) -> Option<&CPFact> {
        self.facts.get(node).map(|(_, out)| out)
    }
}

/// The C8 engine: ICFG-based worklist with four edge transfers plus the
/// alias-aware heap-access transfer (§4.8, §4.8.1).
pub struct InterprocConstantPropagation<'p> {
    program: &'p Program,
    icfg: &'p Icfg,
    alias: AliasOracle,
}

impl<'p> InterprocConstantPropagation<'p> {
    #[must_use]
    pub fn new(program: &'p Program, icfg: &'p Icfg, pts: &PointerAnalysisReport) -> Self {
        Self {
            program,
            icfg,
            alias: AliasOracle::build(program, pts),
        }
    }

    #[must_use]
    pub fn solve(&self) -> InterprocResult {
        let mut facts: FactTable = self
            .icfg
            .nodes()
            .map(|n| (n.clone(), (CPFact::new(), CPFact::new())))
            .collect();

        let entry = self.program.method(self.icfg.entry());
        let entry_node = entry.and_then(crate::ir::Method::entry).map(|stmt| IcfgNode {
            method: self.icfg.entry().clone(),
            stmt,
        });
        if let (Some(method), Some(node)) = (entry, &entry_node) {
            let boundary = ConstantPropagation::new(method).boundary_fact();
            facts.entry(node.clone()).or_default().0 = boundary;
        }

        let mut worklist: VecDeque<IcfgNode> = self.icfg.nodes().cloned().collect();
        let mut queued: HashSet<IcfgNode> = worklist.iter().cloned().collect();

        while let Some(node) = worklist.pop_front() {
            queued.remove(&node);

            let mut in_fact = if Some(&node) == entry_node.as_ref() {
                facts[&node].0.clone()
            } else {
                CPFact::new()
            };
            for (pred, kind) in self.icfg.predecessors(&node) {
                let pred_out = facts[pred].1.clone();
                let edge_fact = self.transfer_edge(pred, &node, *kind, &pred_out);
                in_fact = in_fact.meet(&edge_fact);
            }
            facts.get_mut(&node).unwrap().0 = in_fact.clone();

            let Some(method) = self.program.method(&node.method) else { continue };
            let Some(stmt) = method.stmt(node.stmt) else { continue };

            let new_out = if stmt.as_invoke().is_some() {
                in_fact.clone()
            } else {
                self.transfer_non_call(method, &node, stmt, &in_fact, &facts)
            };
            let changed = new_out != facts[&node].1;
            facts.get_mut(&node).unwrap().1 = new_out;

            if changed {
                for (succ, _) in self.icfg.successors(&node) {
                    if queued.insert(succ.clone()) {
                        worklist.push_back(succ.clone());
                    }
                }
            }

            match stmt {
                Stmt::StoreInstanceField(base, field, _) => {
                    for load_node in self.alias.aliased_load_field_nodes(&node.method, *base, field) {
                        if queued.insert(load_node.clone()) {
                            worklist.push_back(load_node);
                        }
                    }
                }
                Stmt::StoreStaticField(field, _) => {
                    for load_node in self.alias.aliased_load_static_nodes(field) {
                        if queued.insert(load_node.clone()) {
                            worklist.push_back(load_node);
                        }
                    }
                }
                Stmt::StoreArray(base, idx, _) => {
                    let idx_val = in_fact.get(*idx);
                    for load_node in self.alias.aliased_load_array_nodes(&node.method, *base, idx_val, &facts) {
                        if queued.insert(load_node.clone()) {
                            worklist.push_back(load_node);
                        }
                    }
                }
                _ => {}
            }
        }

        InterprocResult { facts }
    }

    fn transfer_edge(&self, from: &IcfgNode, to: &IcfgNode, kind: IcfgEdgeKind, out: &CPFact) -> CPFact {
        match kind {
            IcfgEdgeKind::Normal => out.clone(),
            IcfgEdgeKind::CallToReturn => {
                let mut f = out.clone();
                if let Some(method) = self.program.method(&from.method) {
                    if let Some(stmt) = method.stmt(from.stmt) {
                        if let Some(lhs) = stmt.invoke_lhs() {
                            f.set(lhs, Value::Undef);
                        }
                    }
                }
                f
            }
            IcfgEdgeKind::Call => {
                let mut f = CPFact::new();
                let Some(from_method) = self.program.method(&from.method) else { return f };
                let Some(from_stmt) = from_method.stmt(from.stmt) else { return f };
                let Some(invoke) = from_stmt.as_invoke() else { return f };
                let Some(to_method) = self.program.method(&to.method) else { return f };
                for (formal, actual) in to_method.params.iter().zip(invoke.args.iter()) {
                    f.set(*formal, out.get(*actual));
                }
                f
            }
            IcfgEdgeKind::Return => {
                let mut f = CPFact::new();
                let Some(from_method) = self.program.method(&from.method) else { return f };
                let Some(Stmt::Return(Some(ret_var))) = from_method.stmt(from.stmt) else { return f };
                let Some((call_node, _)) = self
                    .icfg
                    .predecessors(to)
                    .iter()
                    .find(|(_, k)| *k == IcfgEdgeKind::CallToReturn)
                else {
                    return f;
                };
                let Some(call_method) = self.program.method(&call_node.method) else { return f };
                let Some(call_stmt) = call_method.stmt(call_node.stmt) else { return f };
                if let Some(lhs) = call_stmt.invoke_lhs() {
                    f.set(lhs, out.get(*ret_var));
                }
                f
            }
        }
    }

    fn transfer_non_call(&self, method: &crate::ir::Method, node: &IcfgNode, stmt: &Stmt, in_fact: &CPFact, facts: &FactTable) -> CPFact {
        let mut out = in_fact.clone();
        let holds_int = |v: VarId| method.var_type(v).is_some_and(Type::can_hold_int);
        match stmt {
            Stmt::Assign(x, Expr::InstanceFieldAccess(base, field)) if holds_int(*x) => {
                out.set(*x, self.alias.load_instance_field(&node.method, *base, field, facts));
            }
            Stmt::Assign(x, Expr::StaticFieldAccess(field)) if holds_int(*x) => {
                out.set(*x, self.alias.load_static_field(field, facts));
            }
            Stmt::Assign(x, Expr::ArrayAccess(base, idx)) if holds_int(*x) => {
                let idx_val = in_fact.get(*idx);
                out.set(*x, self.alias.load_array(&node.method, *base, idx_val, facts));
            }
            Stmt::Assign(x, e) if holds_int(*x) => {
                out.set(*x, ConstantPropagation::new(method).evaluate(e, in_fact));
            }
            _ => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallSite, Class, ClassRef, CrossIndex, InvokeExpr, InvokeKind, Method, Var};
    use crate::pointer::context::ContextInsensitive;
    use crate::pointer::PointerAnalysis;

    /// `int id(int x){ return x; } int caller(){ int a = 1; int r = id(a); return r; }`
    /// proves a value flows through a call's Call/Return edges.
    #[test]
    fn constant_flows_through_call_and_return() {
        let x = VarId(0);
        let a = VarId(1);
        let r = VarId(2);

        let mut id_vars = BTreeMap::new();
        id_vars.insert(x, Var { name: "x".into(), ty: Type::Int });
        let id_method = Method {
            class: ClassRef::new("Demo"),
            subsignature: "id(int)".into(),
            is_static: true,
            is_abstract: false,
            params: vec![x],
            this_var: None,
            vars: id_vars,
            stmts: vec![(StmtId(0), Stmt::Return(Some(x)))],
            index: CrossIndex::default(),
        };
        let id_ref = id_method.method_ref();

        let mut caller_vars = BTreeMap::new();
        for (id, name) in [(a, "a"), (r, "r")] {
            caller_vars.insert(id, Var { name: name.into(), ty: Type::Int });
        }
        let call_stmt = StmtId(1);
        let invoke = InvokeExpr {
            kind: InvokeKind::Static,
            method: id_ref.clone(),
            receiver: None,
            args: vec![a],
        };
        let mut caller_method = Method {
            class: ClassRef::new("Demo"),
            subsignature: "caller()".into(),
            is_static: true,
            is_abstract: false,
            params: vec![],
            this_var: None,
            vars: caller_vars,
            stmts: vec![
                (StmtId(0), Stmt::Assign(a, Expr::IntLiteral(1))),
                (call_stmt, Stmt::Assign(r, Expr::Invoke(invoke))),
                (StmtId(2), Stmt::Return(Some(r))),
            ],
            index: CrossIndex::default(),
        };
        caller_method.reindex();
        let caller_ref = caller_method.method_ref();

        let mut classes = BTreeMap::new();
        classes.insert(
            ClassRef::new("Demo"),
            Class {
                name: ClassRef::new("Demo"),
                super_class: None,
                interfaces: vec![],
                is_interface: false,
                is_abstract: false,
                methods: [(id_ref.subsignature.clone(), id_ref.clone()), (caller_ref.subsignature.clone(), caller_ref.clone())]
                    .into_iter()
                    .collect(),
            },
        );
        let mut methods = BTreeMap::new();
        methods.insert(id_ref.clone(), id_method);
        methods.insert(caller_ref.clone(), caller_method);
        let program = Program::new(classes, methods);

        let pts_report = PointerAnalysis::new(&program, ContextInsensitive).analyze(&caller_ref);
        let call_edges = vec![(
            CallSite { method: caller_ref.clone(), stmt: call_stmt },
            id_ref.clone(),
        )];
        let icfg = Icfg::build(&program, call_edges, &caller_ref);
        let result = InterprocConstantPropagation::new(&program, &icfg, &pts_report).solve();

        let at_return = result.in_fact(&IcfgNode { method: caller_ref, stmt: StmtId(2) }).unwrap();
        assert_eq!(at_return.get(r), Value::Const(1));
    }
}
