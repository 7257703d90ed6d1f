//! Class hierarchy queries used by CHA (§4.6) and by CS pointer analysis's
//! instance-call dispatch (§4.7). Grounded in the same
//! petgraph-`depth_first_search` idiom used for JVM type hierarchy queries.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Control, DfsEvent, depth_first_search};

use super::{Class, ClassRef, MethodRef};

#[derive(Debug, Clone)]
struct ClassInfo {
    super_class: Option<ClassRef>,
    interfaces: Vec<ClassRef>,
    is_interface: bool,
    is_abstract: bool,
    methods: BTreeMap<String, MethodRef>,
}

/// Subclass/sub-interface/implementor/superclass-chain queries over a fixed
/// set of classes, plus `dispatch` (§4.6's `dispatch(declaredClass,
/// subsignature)`).
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: HashMap<ClassRef, ClassInfo>,
    /// super class -> direct subclasses
    subclasses: HashMap<ClassRef, HashSet<ClassRef>>,
    /// interface -> direct implementors (classes with `implements` this interface)
    direct_implementors: HashMap<ClassRef, HashSet<ClassRef>>,
}

impl ClassHierarchy {
    #[must_use]
    pub fn from_classes<'a, I>(classes: I) -> Self
    where
        I: IntoIterator<Item = &'a Class>,
    {
        let mut info = HashMap::new();
        let mut subclasses: HashMap<ClassRef, HashSet<ClassRef>> = HashMap::new();
        let mut direct_implementors: HashMap<ClassRef, HashSet<ClassRef>> = HashMap::new();
        for class in classes {
            if let Some(sup) = &class.super_class {
                subclasses.entry(sup.clone()).or_default().insert(class.name.clone());
            }
            if !class.is_interface {
                for iface in &class.interfaces {
                    direct_implementors
                        .entry(iface.clone())
                        .or_default()
                        .insert(class.name.clone());
                }
            }
            info.insert(
                class.name.clone(),
                ClassInfo {
                    super_class: class.super_class.clone(),
                    interfaces: class.interfaces.clone(),
                    is_interface: class.is_interface,
                    is_abstract: class.is_abstract,
                    methods: class.methods.clone(),
                },
            );
        }
        Self {
            classes: info,
            subclasses,
            direct_implementors,
        }
    }

    #[must_use]
    pub fn is_interface(&self, class: &ClassRef) -> bool {
        self.classes.get(class).is_some_and(|c| c.is_interface)
    }

    #[must_use]
    pub fn is_abstract(&self, class: &ClassRef) -> bool {
        self.classes.get(class).is_some_and(|c| c.is_abstract)
    }

    /// The full superclass chain, nearest first.
    #[must_use]
    pub fn superclasses(&self, class: &ClassRef) -> Vec<ClassRef> {
        let mut out = Vec::new();
        let mut current = class;
        while let Some(info) = self.classes.get(current) {
            let Some(sup) = &info.super_class else { break };
            out.push(sup.clone());
            current = sup;
        }
        out
    }

    /// `dispatch(declaredClass, subsignature)` (§4.6): the first class in
    /// `declaredClass`'s superclass chain (starting at itself) that declares
    /// `subsignature`, if any.
    #[must_use]
    pub fn dispatch(&self, declared_class: &ClassRef, subsignature: &str) -> Option<MethodRef> {
        let mut current = Some(declared_class.clone());
        while let Some(class) = current {
            let info = self.classes.get(&class)?;
            if let Some(m) = info.methods.get(subsignature) {
                return Some(m.clone());
            }
            current = info.super_class.clone();
        }
        None
    }

    /// All proper subclasses of `class` (transitive, not including itself).
    #[must_use]
    pub fn subclasses_of(&self, class: &ClassRef) -> HashSet<ClassRef> {
        let mut graph: DiGraphMap<&ClassRef, ()> = DiGraphMap::new();
        graph.add_node(class);
        for (sup, subs) in &self.subclasses {
            for sub in subs {
                graph.add_edge(sup, sub, ());
            }
        }

        let mut found = HashSet::new();
        depth_first_search(&graph, [class], |event| {
            if let DfsEvent::TreeEdge(_, i) = event {
                found.insert(i.clone());
            }
            Control::<()>::Continue
        });
        found.remove(class);
        found
    }

    /// All transitive sub-interfaces and implementing classes of `interface`.
    #[must_use]
    pub fn implementors_of(&self, interface: &ClassRef) -> HashSet<ClassRef> {
        let mut found = HashSet::new();
        // Sub-interfaces reachable via the subclass graph (interfaces extend
        // interfaces through `super_class` links is not modeled; interfaces
        // use `interfaces` for `extends`). We walk both the direct
        // implementors edge and, for interfaces, their sub-interfaces.
        let mut frontier = vec![interface.clone()];
        let mut seen = HashSet::new();
        while let Some(cur) = frontier.pop() {
            if !seen.insert(cur.clone()) {
                continue;
            }
            if let Some(implementors) = self.direct_implementors.get(&cur) {
                for implementor in implementors {
                    found.insert(implementor.clone());
                    frontier.push(implementor.clone());
                }
            }
            // Interfaces extending `cur` list it in their own `interfaces`.
            for (name, info) in &self.classes {
                if info.is_interface && info.interfaces.contains(&cur) {
                    found.insert(name.clone());
                    frontier.push(name.clone());
                }
            }
        }
        found.remove(interface);
        found
    }
}
