//! Constant propagation (C3 / §4.3): a forward instance of the generic
//! solver over the integer lattice.

use crate::cfg::EdgeKind;
use crate::ir::{BinOp, Expr, Method, Stmt, StmtId, Type};

use super::solver::DataflowAnalysis;
use super::value::{CPFact, Value};

pub struct ConstantPropagation<'m> {
    method: &'m Method,
}

impl<'m> ConstantPropagation<'m> {
    #[must_use]
    pub fn new(method: &'m Method) -> Self {
        Self { method }
    }

    fn can_hold_int(&self, var: crate::ir::VarId) -> bool {
        self.method.var_type(var).is_some_and(Type::can_hold_int)
    }

    /// `evaluate(e, in)` (§4.3): pure, total.
    #[must_use]
    pub fn evaluate(&self, expr: &Expr, in_fact: &CPFact) -> Value {
        match expr {
            Expr::IntLiteral(n) => Value::Const(*n),
            Expr::Var(v) => {
                if self.can_hold_int(*v) {
                    in_fact.get(*v)
                } else {
                    Value::Nac
                }
            }
            Expr::Binary(op, l, r) => {
                let lv = self.evaluate(l, in_fact);
                let rv = self.evaluate(r, in_fact);
                apply_binop(*op, lv, rv)
            }
            Expr::New(_)
            | Expr::NewArray(_)
            | Expr::InstanceFieldAccess(_, _)
            | Expr::StaticFieldAccess(_)
            | Expr::ArrayAccess(_, _)
            | Expr::Invoke(_)
            | Expr::Cast(_, _) => Value::Nac,
        }
    }
}

/// Applies a binary operator on 32-bit signed integers (§4.3). Divide/modulo
/// by a literal zero yields `UNDEF` regardless of the other operand's
/// lattice value — see the §9 note on not blindly copying the mis-parenthesized
/// original zero-check.
#[must_use]
pub fn apply_binop(op: BinOp, l: Value, r: Value) -> Value {
    use Value::{Const, Nac, Undef};

    if matches!(op, BinOp::Div | BinOp::Rem) && r == Const(0) {
        return Undef;
    }

    match (l, r) {
        (Const(a), Const(b)) => match op {
            BinOp::Add => Const(a.wrapping_add(b)),
            BinOp::Sub => Const(a.wrapping_sub(b)),
            BinOp::Mul => Const(a.wrapping_mul(b)),
            BinOp::Div => Const(a.wrapping_div(b)),
            BinOp::Rem => Const(a.wrapping_rem(b)),
            BinOp::And => Const(a & b),
            BinOp::Or => Const(a | b),
            BinOp::Xor => Const(a ^ b),
            BinOp::Shl => Const(a.wrapping_shl(b as u32)),
            BinOp::Shr => Const(a.wrapping_shr(b as u32)),
            BinOp::UShr => Const(((a as u32).wrapping_shr(b as u32)) as i32),
            BinOp::Eq => Const(i32::from(a == b)),
            BinOp::Ne => Const(i32::from(a != b)),
            BinOp::Lt => Const(i32::from(a < b)),
            BinOp::Le => Const(i32::from(a <= b)),
            BinOp::Gt => Const(i32::from(a > b)),
            BinOp::Ge => Const(i32::from(a >= b)),
        },
        (Nac, _) | (_, Nac) => Nac,
        _ => Undef,
    }
}

impl<'m> DataflowAnalysis for ConstantPropagation<'m> {
    type Fact = CPFact;

    fn is_forward(&self) -> bool {
        true
    }

    /// Each integer-like formal parameter is bound to `NAC`; everything else
    /// starts `UNDEF` (§4.3 boundary fact).
    fn boundary_fact(&self) -> CPFact {
        let mut fact = CPFact::new();
        for param in &self.method.params {
            if self.can_hold_int(*param) {
                fact.set(*param, Value::Nac);
            }
        }
        fact
    }

    fn initial_fact(&self) -> CPFact {
        CPFact::new()
    }

    fn meet_into(&self, src: &CPFact, dst: &mut CPFact) {
        *dst = dst.meet(src);
    }

    fn transfer_node(&self, node: StmtId, in_fact: &CPFact, out_fact: &mut CPFact) -> bool {
        let stmt = self.method.stmt(node).expect("node exists in method");
        let mut new_out = in_fact.clone();
        if let Stmt::Assign(x, e) = stmt {
            if self.can_hold_int(*x) {
                new_out.set(*x, self.evaluate(e, in_fact));
            }
        }
        let changed = new_out != *out_fact;
        *out_fact = new_out;
        changed
    }

    fn transfer_edge(&self, _from: StmtId, _to: StmtId, _kind: EdgeKind, fact: &CPFact) -> CPFact {
        fact.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg;
    use crate::dataflow::solver::solve;
    use crate::ir::{CrossIndex, Var, VarId};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn arb_binop() -> impl Strategy<Value = BinOp> {
        prop_oneof![
            Just(BinOp::Add),
            Just(BinOp::Sub),
            Just(BinOp::Mul),
            Just(BinOp::Div),
            Just(BinOp::Rem),
            Just(BinOp::And),
            Just(BinOp::Or),
            Just(BinOp::Xor),
            Just(BinOp::Shl),
            Just(BinOp::Shr),
            Just(BinOp::UShr),
            Just(BinOp::Eq),
            Just(BinOp::Ne),
            Just(BinOp::Lt),
            Just(BinOp::Le),
            Just(BinOp::Gt),
            Just(BinOp::Ge),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![Just(Value::Undef), any::<i32>().prop_map(Value::Const), Just(Value::Nac)]
    }

    /// Any value `⊑ b` under the meet-induced order (`x ⊑ y` iff `x.meet(y) == y`).
    fn arb_below(b: Value) -> BoxedStrategy<Value> {
        match b {
            Value::Undef => Just(Value::Undef).boxed(),
            Value::Const(n) => prop_oneof![Just(Value::Undef), Just(Value::Const(n))].boxed(),
            Value::Nac => arb_value().boxed(),
        }
    }

    /// `(op, a1, a2, b1, b2)` with `a1 ⊑ b1` and `a2 ⊑ b2` guaranteed by
    /// construction, for testing monotonicity of a binary transfer.
    fn arb_monotonic_binop_inputs() -> impl Strategy<Value = (BinOp, Value, Value, Value, Value)> {
        (arb_binop(), arb_value(), arb_value()).prop_flat_map(|(op, b1, b2)| {
            (Just(op), arb_below(b1), arb_below(b2), Just(b1), Just(b2))
        })
    }

    proptest! {
        /// Law 1 (§8): `apply_binop` is monotone — refining either operand
        /// can only refine or leave unchanged the result, never contradict it.
        #[test]
        fn apply_binop_is_monotonic((op, a1, a2, b1, b2) in arb_monotonic_binop_inputs()) {
            let lo = apply_binop(op, a1, a2);
            let hi = apply_binop(op, b1, b2);
            prop_assert_eq!(lo.meet(hi), hi);
        }
    }

    /// S1: `int f(int p){ int a=1; int b=2; int c=a+b; if (c==3) return c; else return 0; }`
    #[test]
    fn s1_constant_propagation_and_branch() {
        let p = VarId(0);
        let a = VarId(1);
        let b = VarId(2);
        let c = VarId(3);
        let zero = VarId(4);

        let mut vars = BTreeMap::new();
        for (id, name) in [(p, "p"), (a, "a"), (b, "b"), (c, "c"), (zero, "zero")] {
            vars.insert(
                id,
                Var {
                    name: name.into(),
                    ty: Type::Int,
                },
            );
        }

        let stmts = vec![
            (StmtId(0), Stmt::Assign(a, Expr::IntLiteral(1))),
            (StmtId(1), Stmt::Assign(b, Expr::IntLiteral(2))),
            (
                StmtId(2),
                Stmt::Assign(
                    c,
                    Expr::Binary(BinOp::Add, Box::new(Expr::Var(a)), Box::new(Expr::Var(b))),
                ),
            ),
            (
                StmtId(3),
                Stmt::If(
                    Expr::Binary(BinOp::Eq, Box::new(Expr::Var(c)), Box::new(Expr::IntLiteral(3))),
                    StmtId(4),
                    StmtId(5),
                ),
            ),
            (StmtId(4), Stmt::Return(Some(c))),
            (StmtId(5), Stmt::Assign(zero, Expr::IntLiteral(0))),
            (StmtId(6), Stmt::Return(Some(zero))),
        ];

        let method = Method {
            class: crate::ir::ClassRef::new("Demo"),
            subsignature: "f(int)".into(),
            is_static: true,
            is_abstract: false,
            params: vec![p],
            this_var: None,
            vars,
            stmts,
            index: CrossIndex::default(),
        };

        let cfg = Cfg::build(&method);
        let analysis = ConstantPropagation::new(&method);
        let result = solve(&analysis, &cfg);

        let at_return = result.in_fact(StmtId(4)).unwrap();
        assert_eq!(at_return.get(a), Value::Const(1));
        assert_eq!(at_return.get(b), Value::Const(2));
        assert_eq!(at_return.get(c), Value::Const(3));
    }

    /// S2: `int g(int p){ int z=0; return p/z; }`
    #[test]
    fn s2_divide_by_zero_is_undef() {
        let p = VarId(0);
        let z = VarId(1);
        let r = VarId(2);
        let mut vars = BTreeMap::new();
        for (id, name) in [(p, "p"), (z, "z"), (r, "r")] {
            vars.insert(
                id,
                Var {
                    name: name.into(),
                    ty: Type::Int,
                },
            );
        }
        let stmts = vec![
            (StmtId(0), Stmt::Assign(z, Expr::IntLiteral(0))),
            (
                StmtId(1),
                Stmt::Assign(
                    r,
                    Expr::Binary(BinOp::Div, Box::new(Expr::Var(p)), Box::new(Expr::Var(z))),
                ),
            ),
            (StmtId(2), Stmt::Return(Some(r))),
        ];
        let method = Method {
            class: crate::ir::ClassRef::new("Demo"),
            subsignature: "g(int)".into(),
            is_static: true,
            is_abstract: false,
            params: vec![p],
            this_var: None,
            vars,
            stmts,
            index: CrossIndex::default(),
        };
        let cfg = Cfg::build(&method);
        let analysis = ConstantPropagation::new(&method);
        let result = solve(&analysis, &cfg);

        let out_z = result.out_fact(StmtId(0)).unwrap();
        assert_eq!(out_z.get(p), Value::Nac);
        assert_eq!(out_z.get(z), Value::Const(0));

        let out_r = result.out_fact(StmtId(1)).unwrap();
        assert_eq!(out_r.get(r), Value::Undef);
    }

    /// One instruction in a randomly generated straight-line method: assign
    /// `dst` either a literal or a binary op over two (possibly
    /// not-yet-defined) variables from the fixed pool.
    #[derive(Debug, Clone)]
    enum ArbInstr {
        Literal(u32, i32),
        Binary(u32, BinOp, u32, u32),
    }

    const POOL_SIZE: u32 = 4;

    fn arb_instr() -> impl Strategy<Value = ArbInstr> {
        let dst = 0..POOL_SIZE;
        prop_oneof![
            (dst.clone(), any::<i32>()).prop_map(|(d, n)| ArbInstr::Literal(d, n)),
            (dst, arb_binop(), 0..POOL_SIZE, 0..POOL_SIZE)
                .prop_map(|(d, op, a, b)| ArbInstr::Binary(d, op, a, b)),
        ]
    }

    /// Builds a straight-line method (no branches) from a random instruction
    /// sequence, used to check the solver is deterministic run-to-run (§8 Law 4)
    /// independent of what happens to be assigned along the way.
    fn build_straight_line_method(instrs: &[ArbInstr]) -> Method {
        let var = |i: u32| VarId(i);
        let mut vars = BTreeMap::new();
        for i in 0..POOL_SIZE {
            vars.insert(
                var(i),
                Var {
                    name: format!("v{i}"),
                    ty: Type::Int,
                },
            );
        }
        let mut stmts: Vec<(StmtId, Stmt)> = instrs
            .iter()
            .enumerate()
            .map(|(i, instr)| {
                let expr = match instr {
                    ArbInstr::Literal(_, n) => Expr::IntLiteral(*n),
                    ArbInstr::Binary(_, op, a, b) => {
                        Expr::Binary(*op, Box::new(Expr::Var(var(*a))), Box::new(Expr::Var(var(*b))))
                    }
                };
                let dst = match instr {
                    ArbInstr::Literal(d, _) | ArbInstr::Binary(d, _, _, _) => *d,
                };
                (StmtId(i as u32), Stmt::Assign(var(dst), expr))
            })
            .collect();
        let ret_id = StmtId(stmts.len() as u32);
        stmts.push((ret_id, Stmt::Return(Some(var(0)))));

        Method {
            class: crate::ir::ClassRef::new("Fuzz"),
            subsignature: "f()".into(),
            is_static: true,
            is_abstract: false,
            params: vec![],
            this_var: None,
            vars,
            stmts,
            index: CrossIndex::default(),
        }
    }

    proptest! {
        /// Law 4 (§8): solving the same CFG twice produces byte-for-byte
        /// identical IN/OUT facts at every node.
        #[test]
        fn solve_is_deterministic(instrs in prop::collection::vec(arb_instr(), 1..12)) {
            let method = build_straight_line_method(&instrs);
            let cfg = Cfg::build(&method);
            let analysis = ConstantPropagation::new(&method);

            let first = solve(&analysis, &cfg);
            let second = solve(&analysis, &cfg);

            for node in first.nodes() {
                prop_assert_eq!(first.in_fact(node), second.in_fact(node));
                prop_assert_eq!(first.out_fact(node), second.out_fact(node));
            }
        }
    }
}
