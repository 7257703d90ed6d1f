//! Dead-code detection (C4 / §4.5): control-flow reachability plus useless
//! assignments, combining constant propagation and live-variable analysis.

use std::collections::{BTreeSet, VecDeque};

use crate::cfg::{Cfg, EdgeKind};
use crate::ir::{Method, Stmt, StmtId};

use super::constprop::ConstantPropagation;
use super::live::LiveVariableAnalysis;
use super::solver::solve;
use super::value::Value;

/// Statements reported dead, ordered by IR index (§4.5).
#[must_use]
pub fn detect_dead_code(method: &Method, cfg: &Cfg) -> BTreeSet<StmtId> {
    let cp = ConstantPropagation::new(method);
    let cp_result = solve(&cp, cfg);
    let live = LiveVariableAnalysis::new(method);
    let live_result = solve(&live, cfg);

    let mut reachable = BTreeSet::new();
    let mut queue = VecDeque::new();
    reachable.insert(cfg.entry());
    queue.push_back(cfg.entry());
    while let Some(node) = queue.pop_front() {
        let Some(stmt) = method.stmt(node) else { continue };
        let in_fact = cp_result.in_fact(node);
        for (succ, kind) in cfg.successors(node) {
            if edge_is_unreachable(stmt, *kind, in_fact, &cp) {
                continue;
            }
            if reachable.insert(*succ) {
                queue.push_back(*succ);
            }
        }
    }

    let mut dead: BTreeSet<StmtId> = method
        .stmts
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| !reachable.contains(id))
        .collect();

    for (id, stmt) in &method.stmts {
        if !reachable.contains(id) {
            continue;
        }
        if let Stmt::Assign(x, rhs) = stmt {
            if Stmt::rhs_has_no_side_effect(rhs) {
                let live_out = live_result.out_fact(*id);
                let live = live_out.is_some_and(|f| f.contains(x));
                if !live {
                    dead.insert(*id);
                }
            }
        }
    }

    dead
}

fn edge_is_unreachable(
    stmt: &Stmt,
    kind: EdgeKind,
    in_fact: Option<&super::value::CPFact>,
    cp: &ConstantPropagation<'_>,
) -> bool {
    let Some(in_fact) = in_fact else { return false };
    match (stmt, kind) {
        (Stmt::If(cond, _, _), EdgeKind::IfTrue) => {
            matches!(cp.evaluate(cond, in_fact), Value::Const(0))
        }
        (Stmt::If(cond, _, _), EdgeKind::IfFalse) => {
            matches!(cp.evaluate(cond, in_fact), Value::Const(1))
        }
        (Stmt::Switch(key, _, _), EdgeKind::SwitchCase(case_value)) => {
            match in_fact.get(*key) {
                Value::Const(k) => k != case_value,
                _ => false,
            }
        }
        (Stmt::Switch(key, cases, _), EdgeKind::SwitchDefault) => match in_fact.get(*key) {
            Value::Const(k) => cases.iter().any(|(v, _)| *v == k),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, ClassRef, CrossIndex, Expr, Type, Var, VarId};
    use std::collections::BTreeMap;

    fn int_var(id: u32, name: &str) -> (VarId, Var) {
        (
            VarId(id),
            Var {
                name: name.into(),
                ty: Type::Int,
            },
        )
    }

    /// S3: `switch(1){ case 1: x=1; break; case 2: x=2; break; default: x=3; }`
    #[test]
    fn s3_unreachable_switch_cases() {
        let key = VarId(0);
        let x = VarId(1);
        let mut vars = BTreeMap::new();
        let (id, v) = int_var(0, "key");
        vars.insert(id, v);
        let (id, v) = int_var(1, "x");
        vars.insert(id, v);

        let stmts = vec![
            (StmtId(0), Stmt::Assign(key, Expr::IntLiteral(1))),
            (
                StmtId(1),
                Stmt::Switch(key, vec![(1, StmtId(2)), (2, StmtId(4))], StmtId(6)),
            ),
            (StmtId(2), Stmt::Assign(x, Expr::IntLiteral(1))),
            (StmtId(3), Stmt::Goto(StmtId(7))),
            (StmtId(4), Stmt::Assign(x, Expr::IntLiteral(2))),
            (StmtId(5), Stmt::Goto(StmtId(7))),
            (StmtId(6), Stmt::Assign(x, Expr::IntLiteral(3))),
            (StmtId(7), Stmt::Return(Some(x))),
        ];
        let method = Method {
            class: ClassRef::new("Demo"),
            subsignature: "m()".into(),
            is_static: true,
            is_abstract: false,
            params: vec![],
            this_var: None,
            vars,
            stmts,
            index: CrossIndex::default(),
        };
        let cfg = Cfg::build(&method);
        let dead = detect_dead_code(&method, &cfg);
        assert!(dead.contains(&StmtId(4)));
        assert!(dead.contains(&StmtId(5)));
        assert!(dead.contains(&StmtId(6)));
        assert!(!dead.contains(&StmtId(2)));
        assert!(!dead.contains(&StmtId(3)));
    }

    #[test]
    fn useless_assignment_is_dead() {
        let x = VarId(0);
        let y = VarId(1);
        let mut vars = BTreeMap::new();
        let (id, v) = int_var(0, "x");
        vars.insert(id, v);
        let (id, v) = int_var(1, "y");
        vars.insert(id, v);
        let stmts = vec![
            (StmtId(0), Stmt::Assign(x, Expr::IntLiteral(1))),
            (
                StmtId(1),
                Stmt::Assign(x, Expr::Binary(BinOp::Add, Box::new(Expr::Var(x)), Box::new(Expr::IntLiteral(1)))),
            ),
            (StmtId(2), Stmt::Assign(y, Expr::IntLiteral(5))),
            (StmtId(3), Stmt::Return(Some(y))),
        ];
        let method = Method {
            class: ClassRef::new("Demo"),
            subsignature: "m()".into(),
            is_static: true,
            is_abstract: false,
            params: vec![],
            this_var: None,
            vars,
            stmts,
            index: CrossIndex::default(),
        };
        let cfg = Cfg::build(&method);
        let dead = detect_dead_code(&method, &cfg);
        // x's value from stmt 0 is live-out (stmt 1 reads it), so only the
        // recomputed value at stmt 1 is a useless assignment per liveOut.
        assert!(!dead.contains(&StmtId(0)));
        assert!(dead.contains(&StmtId(1)));
        assert!(!dead.contains(&StmtId(2)));
    }
}
