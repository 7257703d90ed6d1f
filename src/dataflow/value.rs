//! The integer constant-propagation lattice (§3) and its fact table.

use std::collections::BTreeMap;

use crate::ir::VarId;

/// `UNDEF ⊏ CONST(n) ⊏ NAC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum Value {
    Undef,
    Const(i32),
    Nac,
}

impl Value {
    #[must_use]
    pub fn is_const(self) -> bool {
        matches!(self, Value::Const(_))
    }

    #[must_use]
    pub fn as_const(self) -> Option<i32> {
        match self {
            Value::Const(n) => Some(n),
            _ => None,
        }
    }

    /// The lattice meet `⊓`: NAC absorbs, UNDEF is identity, equal constants
    /// meet to themselves, unequal constants meet to NAC.
    #[must_use]
    pub fn meet(self, other: Value) -> Value {
        match (self, other) {
            (Value::Nac, _) | (_, Value::Nac) => Value::Nac,
            (Value::Undef, v) | (v, Value::Undef) => v,
            (Value::Const(a), Value::Const(b)) => {
                if a == b {
                    Value::Const(a)
                } else {
                    Value::Nac
                }
            }
        }
    }
}

/// A mapping from variable to `Value`; an absent key denotes `UNDEF` (§3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CPFact {
    values: BTreeMap<VarId, Value>,
}

impl CPFact {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, var: VarId) -> Value {
        self.values.get(&var).copied().unwrap_or(Value::Undef)
    }

    pub fn set(&mut self, var: VarId, value: Value) {
        if value == Value::Undef {
            self.values.remove(&var);
        } else {
            self.values.insert(var, value);
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.values.iter().map(|(v, val)| (*v, *val))
    }

    /// Pointwise meet of `self` and `other`, returned as a new fact.
    #[must_use]
    pub fn meet(&self, other: &CPFact) -> CPFact {
        let mut vars: Vec<VarId> = self.values.keys().chain(other.values.keys()).copied().collect();
        vars.sort_unstable();
        vars.dedup();
        let mut out = CPFact::new();
        for v in vars {
            out.set(v, self.get(v).meet(other.get(v)));
        }
        out
    }

    /// Merges `other` into `self` in place; returns whether `self` changed.
    pub fn meet_into(&mut self, other: &CPFact) -> bool {
        let merged = self.meet(other);
        if merged == *self {
            false
        } else {
            *self = merged;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn meet_absorption() {
        assert_eq!(Value::Nac.meet(Value::Const(1)), Value::Nac);
        assert_eq!(Value::Undef.meet(Value::Const(1)), Value::Const(1));
        assert_eq!(Value::Const(1).meet(Value::Const(1)), Value::Const(1));
        assert_eq!(Value::Const(1).meet(Value::Const(2)), Value::Nac);
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![Just(Value::Undef), any::<i32>().prop_map(Value::Const), Just(Value::Nac)]
    }

    proptest! {
        /// Law 1/2 (§8): `meet` is commutative and associative, so confluence
        /// doesn't depend on predecessor visit order.
        #[test]
        fn meet_is_commutative(a in arb_value(), b in arb_value()) {
            prop_assert_eq!(a.meet(b), b.meet(a));
        }

        #[test]
        fn meet_is_associative(a in arb_value(), b in arb_value(), c in arb_value()) {
            prop_assert_eq!(a.meet(b).meet(c), a.meet(b.meet(c)));
        }

        #[test]
        fn meet_is_idempotent(a in arb_value()) {
            prop_assert_eq!(a.meet(a), a);
        }

        /// Law 1: `a ⊑ a ⊓ b` under the order the meet itself induces
        /// (`x ⊑ y` iff `x.meet(y) == y`) — meeting never loses information
        /// already present in either operand.
        #[test]
        fn meet_subsumes_both_operands(a in arb_value(), b in arb_value()) {
            let m = a.meet(b);
            prop_assert_eq!(a.meet(m), m);
            prop_assert_eq!(b.meet(m), m);
        }
    }
}
