//! Class-hierarchy call-graph construction (C5 / §4.6).

use std::collections::{BTreeSet, VecDeque};

use crate::ir::{CallSite, ClassHierarchy, InvokeExpr, InvokeKind, MethodRef, Program};

use super::CallGraph;

/// `resolve` (§4.6): STATIC/SPECIAL walk the superclass chain for the first
/// declaration; VIRTUAL/INTERFACE fan out to every concrete subclass or
/// implementor. Dynamic call sites are never resolved by CHA.
#[must_use]
pub fn resolve(invoke: &InvokeExpr, hierarchy: &ClassHierarchy) -> BTreeSet<MethodRef> {
    match invoke.kind {
        InvokeKind::Static | InvokeKind::Special => hierarchy
            .dispatch(&invoke.method.class, &invoke.method.subsignature)
            .into_iter()
            .collect(),
        InvokeKind::Virtual => {
            let mut classes = hierarchy.subclasses_of(&invoke.method.class);
            classes.insert(invoke.method.class.clone());
            classes
                .into_iter()
                .filter(|c| !hierarchy.is_abstract(c) && !hierarchy.is_interface(c))
                .filter_map(|c| hierarchy.dispatch(&c, &invoke.method.subsignature))
                .collect()
        }
        InvokeKind::Interface => {
            let classes = hierarchy.implementors_of(&invoke.method.class);
            classes
                .into_iter()
                .filter(|c| !hierarchy.is_abstract(c) && !hierarchy.is_interface(c))
                .filter_map(|c| hierarchy.dispatch(&c, &invoke.method.subsignature))
                .collect()
        }
        InvokeKind::Dynamic => BTreeSet::new(),
    }
}

/// Builds a CHA call graph by BFS from `entry` (§4.6). An over-approximation
/// suitable for dead-code and preliminary analyses, unsound for
/// pointer-aware clients (they use C6/C7 instead).
#[must_use]
pub fn build(program: &Program, entry: &MethodRef) -> CallGraph {
    let mut cg = CallGraph::default();
    let mut queue = VecDeque::new();
    if cg.mark_reachable(entry.clone()) {
        queue.push_back(entry.clone());
    }

    while let Some(caller) = queue.pop_front() {
        let Some(method) = program.method(&caller) else {
            continue;
        };
        for stmt_id in &method.index.invokes {
            let Some(stmt) = method.stmt(*stmt_id) else { continue };
            let Some(invoke) = stmt.as_invoke() else { continue };
            let call_site = CallSite {
                method: caller.clone(),
                stmt: *stmt_id,
            };
            for target in resolve(invoke, &program.hierarchy) {
                cg.add_edge(call_site.clone(), target.clone(), invoke.kind);
                if cg.mark_reachable(target.clone()) {
                    queue.push_back(target);
                }
            }
        }
    }

    cg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Class, ClassRef, CrossIndex, Method, Stmt, StmtId, Type, Var, VarId};
    use std::collections::BTreeMap;

    fn method_ref(class: &str, sub: &str) -> MethodRef {
        MethodRef {
            class: ClassRef::new(class),
            subsignature: sub.into(),
        }
    }

    /// S4: interface I{void m();}, class A implements I, class B implements I;
    /// call i.m() resolves to {A.m, B.m}.
    #[test]
    fn s4_interface_dispatch() {
        let i = method_ref("I", "m()");
        let a_m = method_ref("A", "m()");
        let b_m = method_ref("B", "m()");

        let mut classes = BTreeMap::new();
        classes.insert(
            ClassRef::new("I"),
            Class {
                name: ClassRef::new("I"),
                is_interface: true,
                methods: BTreeMap::from([("m()".to_string(), i.clone())]),
                ..Default::default()
            },
        );
        classes.insert(
            ClassRef::new("A"),
            Class {
                name: ClassRef::new("A"),
                interfaces: vec![ClassRef::new("I")],
                methods: BTreeMap::from([("m()".to_string(), a_m.clone())]),
                ..Default::default()
            },
        );
        classes.insert(
            ClassRef::new("B"),
            Class {
                name: ClassRef::new("B"),
                interfaces: vec![ClassRef::new("I")],
                methods: BTreeMap::from([("m()".to_string(), b_m.clone())]),
                ..Default::default()
            },
        );
        classes.insert(
            ClassRef::new("Main"),
            Class {
                name: ClassRef::new("Main"),
                methods: BTreeMap::from([(
                    "main()".to_string(),
                    method_ref("Main", "main()"),
                )]),
                ..Default::default()
            },
        );

        let recv = VarId(0);
        let mut vars = BTreeMap::new();
        vars.insert(
            recv,
            Var {
                name: "i".into(),
                ty: Type::Reference(ClassRef::new("I")),
            },
        );
        let invoke = crate::ir::InvokeExpr {
            kind: InvokeKind::Interface,
            method: i.clone(),
            receiver: Some(recv),
            args: vec![],
        };
        let mut main_method = Method {
            class: ClassRef::new("Main"),
            subsignature: "main()".into(),
            is_static: true,
            is_abstract: false,
            params: vec![],
            this_var: None,
            vars,
            stmts: vec![
                (StmtId(0), Stmt::Invoke(invoke)),
                (StmtId(1), Stmt::Return(None)),
            ],
            index: CrossIndex::default(),
        };
        main_method.reindex();

        let mut methods = BTreeMap::new();
        let main_ref = method_ref("Main", "main()");
        methods.insert(main_ref.clone(), main_method);
        for (m, class) in [(a_m.clone(), "A"), (b_m.clone(), "B")] {
            let mut stub = Method {
                class: ClassRef::new(class),
                subsignature: "m()".into(),
                is_static: false,
                is_abstract: false,
                params: vec![],
                this_var: Some(VarId(0)),
                vars: BTreeMap::from([(
                    VarId(0),
                    Var {
                        name: "this".into(),
                        ty: Type::Reference(ClassRef::new(class)),
                    },
                )]),
                stmts: vec![(StmtId(0), Stmt::Return(None))],
                index: CrossIndex::default(),
            };
            stub.reindex();
            methods.insert(m, stub);
        }

        let program = Program::new(classes, methods);
        let cg = build(&program, &main_ref);
        assert!(cg.is_reachable(&a_m));
        assert!(cg.is_reachable(&b_m));
        let call_site = CallSite {
            method: main_ref,
            stmt: StmtId(0),
        };
        let callees = cg.callees(&call_site);
        assert_eq!(callees, BTreeSet::from([a_m, b_m]));
    }
}
