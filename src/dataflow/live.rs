//! Live-variable analysis (§4.4): a backward set-lattice analysis used only
//! as an oracle by the dead-code detector (C4).

use std::collections::BTreeSet;

use crate::ir::{Expr, InvokeExpr, Method, Stmt, StmtId, VarId};

use super::solver::DataflowAnalysis;

/// A set-lattice fact: union is the meet (backward analyses join along
/// control flow).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetFact<T: Ord + Clone> {
    vars: BTreeSet<T>,
}

impl<T: Ord + Clone> SetFact<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { vars: BTreeSet::new() }
    }

    pub fn contains(&self, v: &T) -> bool {
        self.vars.contains(v)
    }

    pub fn insert(&mut self, v: T) {
        self.vars.insert(v);
    }

    pub fn remove(&mut self, v: &T) {
        self.vars.remove(v);
    }

    #[must_use]
    pub fn union(&self, other: &SetFact<T>) -> SetFact<T> {
        SetFact {
            vars: self.vars.union(&other.vars).cloned().collect(),
        }
    }
}

fn expr_vars(expr: &Expr, out: &mut Vec<VarId>) {
    match expr {
        Expr::IntLiteral(_) | Expr::New(_) | Expr::NewArray(_) | Expr::StaticFieldAccess(_) => {}
        Expr::Var(v) | Expr::Cast(_, v) => out.push(*v),
        Expr::Binary(_, l, r) => {
            expr_vars(l, out);
            expr_vars(r, out);
        }
        Expr::InstanceFieldAccess(base, _) => out.push(*base),
        Expr::ArrayAccess(base, index) => {
            out.push(*base);
            out.push(*index);
        }
        Expr::Invoke(invoke) => invoke_vars(invoke, out),
    }
}

fn invoke_vars(invoke: &InvokeExpr, out: &mut Vec<VarId>) {
    if let Some(recv) = invoke.receiver {
        out.push(recv);
    }
    out.extend(invoke.args.iter().copied());
}

/// `use(s)`: variables read by `s`.
#[must_use]
pub fn uses(stmt: &Stmt) -> Vec<VarId> {
    let mut out = Vec::new();
    match stmt {
        Stmt::Assign(_, e) => expr_vars(e, &mut out),
        Stmt::StoreInstanceField(base, _, value) => {
            out.push(*base);
            out.push(*value);
        }
        Stmt::StoreStaticField(_, value) => out.push(*value),
        Stmt::StoreArray(arr, index, value) => {
            out.push(*arr);
            out.push(*index);
            out.push(*value);
        }
        Stmt::Invoke(invoke) => invoke_vars(invoke, &mut out),
        Stmt::If(cond, _, _) => expr_vars(cond, &mut out),
        Stmt::Switch(key, _, _) => out.push(*key),
        Stmt::Goto(_) => {}
        Stmt::Return(v) => out.extend(v.iter().copied()),
    }
    out
}

/// `def(s)`: the variable `s` defines, if any.
#[must_use]
pub fn def(stmt: &Stmt) -> Option<VarId> {
    match stmt {
        Stmt::Assign(x, _) => Some(*x),
        _ => None,
    }
}

pub struct LiveVariableAnalysis<'m> {
    method: &'m Method,
}

impl<'m> LiveVariableAnalysis<'m> {
    #[must_use]
    pub fn new(method: &'m Method) -> Self {
        Self { method }
    }
}

impl<'m> DataflowAnalysis for LiveVariableAnalysis<'m> {
    type Fact = SetFact<VarId>;

    fn is_forward(&self) -> bool {
        false
    }

    fn boundary_fact(&self) -> SetFact<VarId> {
        SetFact::new()
    }

    fn initial_fact(&self) -> SetFact<VarId> {
        SetFact::new()
    }

    fn meet_into(&self, src: &SetFact<VarId>, dst: &mut SetFact<VarId>) {
        *dst = dst.union(src);
    }

    fn transfer_node(
        &self,
        node: StmtId,
        out_fact: &SetFact<VarId>,
        in_fact: &mut SetFact<VarId>,
    ) -> bool {
        let stmt = self.method.stmt(node).expect("node exists in method");
        let mut new_in = out_fact.clone();
        if let Some(d) = def(stmt) {
            new_in.remove(&d);
        }
        for u in uses(stmt) {
            new_in.insert(u);
        }
        let changed = new_in != *in_fact;
        *in_fact = new_in;
        changed
    }
}
