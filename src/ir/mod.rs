//! The three-address-code intermediate representation this framework analyzes.
//!
//! This module owns a small, hand-buildable IR: enough to construct method
//! bodies directly in test fixtures without a bytecode frontend. Real
//! front-ends are expected to lower into this shape.

pub mod class_hierarchy;

use std::collections::BTreeMap;
use std::fmt;

pub use class_hierarchy::ClassHierarchy;

/// Identifies a local variable within a single method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifies a statement within a single method's body, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct StmtId(pub u32);

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reference to a class or interface by its fully qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display, serde::Serialize, serde::Deserialize)]
pub struct ClassRef(pub String);

impl ClassRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// A reference to an instance or static field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct FieldRef {
    pub class: ClassRef,
    pub name: String,
}

/// A reference to a method by its declaring class and subsignature
/// (name + erased parameter/return shape, analogous to a JVM subsignature).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct MethodRef {
    pub class: ClassRef,
    pub subsignature: String,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class, self.subsignature)
    }
}

/// A call site: the statement that performs the invocation, in its owning method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct CallSite {
    pub method: MethodRef,
    pub stmt: StmtId,
}

/// The static type of a variable, field, or expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Type {
    Byte,
    Short,
    Int,
    Char,
    Boolean,
    Long,
    Float,
    Double,
    Reference(ClassRef),
    Array(Box<Type>),
}

impl Type {
    /// `canHoldInt` in §4.3: the primitive integer-like types.
    #[must_use]
    pub fn can_hold_int(&self) -> bool {
        matches!(
            self,
            Type::Byte | Type::Short | Type::Int | Type::Char | Type::Boolean
        )
    }
}

#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub ty: Type,
}

/// Binary operators evaluated by constant propagation (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum InvokeKind {
    Static,
    Special,
    Virtual,
    Interface,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvokeExpr {
    pub kind: InvokeKind,
    pub method: MethodRef,
    /// `None` for static/dynamic invocations.
    pub receiver: Option<VarId>,
    pub args: Vec<VarId>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    IntLiteral(i32),
    Var(VarId),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    New(ClassRef),
    NewArray(Type),
    InstanceFieldAccess(VarId, FieldRef),
    StaticFieldAccess(FieldRef),
    ArrayAccess(VarId, VarId),
    Invoke(InvokeExpr),
    Cast(Type, VarId),
}

/// A three-address-code statement. Calls that produce a value are
/// `Assign(lhs, Expr::Invoke(..))`; void calls are the bare `Invoke` variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stmt {
    Assign(VarId, Expr),
    StoreInstanceField(VarId, FieldRef, VarId),
    StoreStaticField(FieldRef, VarId),
    /// `array[index] := value`.
    StoreArray(VarId, VarId, VarId),
    Invoke(InvokeExpr),
    /// Condition, then-target, else-target.
    If(Expr, StmtId, StmtId),
    /// Switch key variable, (case value, target) pairs, default target.
    Switch(VarId, Vec<(i32, StmtId)>, StmtId),
    Goto(StmtId),
    Return(Option<VarId>),
}

impl Stmt {
    /// The invocation this statement performs, whether or not it binds a
    /// result (§6's per-variable `getInvokes` index feeds off this).
    #[must_use]
    pub fn as_invoke(&self) -> Option<&InvokeExpr> {
        match self {
            Stmt::Invoke(i) | Stmt::Assign(_, Expr::Invoke(i)) => Some(i),
            _ => None,
        }
    }

    /// The variable bound by this call, if it has a LHS.
    #[must_use]
    pub fn invoke_lhs(&self) -> Option<VarId> {
        match self {
            Stmt::Assign(x, Expr::Invoke(_)) => Some(*x),
            _ => None,
        }
    }

    /// True iff evaluating this statement has no effect other than binding
    /// its own LHS (§4.5 `hasNoSideEffect`). Only meaningful for `Assign`.
    #[must_use]
    pub fn rhs_has_no_side_effect(expr: &Expr) -> bool {
        !matches!(
            expr,
            Expr::New(_)
                | Expr::NewArray(_)
                | Expr::Cast(_, _)
                | Expr::InstanceFieldAccess(_, _)
                | Expr::StaticFieldAccess(_)
                | Expr::ArrayAccess(_, _)
                | Expr::Binary(BinOp::Div | BinOp::Rem, _, _)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrossIndex {
    pub store_fields: BTreeMap<VarId, Vec<StmtId>>,
    pub load_fields: BTreeMap<VarId, Vec<StmtId>>,
    pub store_arrays: BTreeMap<VarId, Vec<StmtId>>,
    pub load_arrays: BTreeMap<VarId, Vec<StmtId>>,
    pub invokes: Vec<StmtId>,
}

/// A method body: parameters, locals, statements in program order, and the
/// per-variable cross-indices the solver consumes instead of rescanning
/// statements (§6).
#[derive(Debug, Clone)]
pub struct Method {
    pub class: ClassRef,
    pub subsignature: String,
    pub is_static: bool,
    pub is_abstract: bool,
    pub params: Vec<VarId>,
    pub this_var: Option<VarId>,
    pub vars: BTreeMap<VarId, Var>,
    pub stmts: Vec<(StmtId, Stmt)>,
    pub index: CrossIndex,
}

impl Method {
    #[must_use]
    pub fn method_ref(&self) -> MethodRef {
        MethodRef {
            class: self.class.clone(),
            subsignature: self.subsignature.clone(),
        }
    }

    #[must_use]
    pub fn entry(&self) -> Option<StmtId> {
        self.stmts.first().map(|(id, _)| *id)
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> Option<&Stmt> {
        self.stmts.iter().find(|(i, _)| *i == id).map(|(_, s)| s)
    }

    #[must_use]
    pub fn var_type(&self, v: VarId) -> Option<&Type> {
        self.vars.get(&v).map(|var| &var.ty)
    }

    /// Returns every variable returned by a `Return(Some(_))` statement,
    /// the set C8's Return edge transfer joins over.
    #[must_use]
    pub fn return_vars(&self) -> Vec<VarId> {
        self.stmts
            .iter()
            .filter_map(|(_, s)| match s {
                Stmt::Return(Some(v)) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Rebuilds the cross-indices from `stmts`. Called once after the body
    /// is fully constructed.
    pub fn reindex(&mut self) {
        let mut index = CrossIndex::default();
        for (id, stmt) in &self.stmts {
            match stmt {
                Stmt::StoreInstanceField(base, _, _) => {
                    index.store_fields.entry(*base).or_default().push(*id);
                }
                Stmt::Assign(_, Expr::InstanceFieldAccess(base, _)) => {
                    index.load_fields.entry(*base).or_default().push(*id);
                }
                Stmt::StoreArray(base, _, _) => {
                    index.store_arrays.entry(*base).or_default().push(*id);
                }
                Stmt::Assign(_, Expr::ArrayAccess(base, _)) => {
                    index.load_arrays.entry(*base).or_default().push(*id);
                }
                Stmt::Invoke(_) | Stmt::Assign(_, Expr::Invoke(_)) => {
                    index.invokes.push(*id);
                }
                _ => {}
            }
        }
        self.index = index;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Class {
    pub name: ClassRef,
    pub super_class: Option<ClassRef>,
    pub interfaces: Vec<ClassRef>,
    pub is_interface: bool,
    pub is_abstract: bool,
    /// Methods declared directly in this class, keyed by subsignature.
    pub methods: BTreeMap<String, MethodRef>,
}

/// The whole analyzed program: classes, methods, and the hierarchy built
/// from them.
#[derive(Debug, Clone)]
pub struct Program {
    pub classes: BTreeMap<ClassRef, Class>,
    pub methods: BTreeMap<MethodRef, Method>,
    pub hierarchy: ClassHierarchy,
}

impl Program {
    /// Builds a program from its classes and methods, rebuilding every
    /// method's cross-indices so callers never have to remember to call
    /// `Method::reindex` themselves (the solver's call-site and field/array
    /// discovery reads exclusively from those indices, with no fallback scan
    /// of `stmts`).
    #[must_use]
    pub fn new(classes: BTreeMap<ClassRef, Class>, mut methods: BTreeMap<MethodRef, Method>) -> Self {
        let hierarchy = ClassHierarchy::from_classes(classes.values());
        methods.values_mut().for_each(Method::reindex);
        Self {
            classes,
            methods,
            hierarchy,
        }
    }

    #[must_use]
    pub fn method(&self, m: &MethodRef) -> Option<&Method> {
        self.methods.get(m)
    }
}
