//! Client-facing report types (C12, ambient expansion): thin views over the
//! internal fact tables, cheaply built once a run completes and safe to hand
//! to a caller (or serialize) without exposing the solver's own state.

use std::collections::BTreeSet;

use crate::callgraph::CallGraph;
use crate::dataflow::solver::DataflowResult;
use crate::dataflow::value::{CPFact, Value};
use crate::interproc::constprop::InterprocResult;
use crate::interproc::Icfg;
use crate::ir::{CallSite, InvokeKind, MethodRef, StmtId, VarId};
use crate::pointer::{Context, CsCallGraph, CsCallSite, Pointer, PointerAnalysisReport, PointsToSet};
use crate::taint::TaintFlow;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeadCodeResult {
    pub dead_statements: BTreeSet<StmtId>,
}

impl DeadCodeResult {
    #[must_use]
    pub fn new(dead_statements: BTreeSet<StmtId>) -> Self {
        Self { dead_statements }
    }
}

/// Every variable's value at each statement's OUT fact, as `(statement,
/// variable, value)` triples — a `Vec` rather than a map since statement and
/// variable ids aren't strings, and JSON object keys must be.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConstPropResult {
    pub out_values: Vec<(StmtId, VarId, Value)>,
}

impl ConstPropResult {
    #[must_use]
    pub fn from_solver_result(result: &DataflowResult<CPFact>) -> Self {
        let mut out_values = Vec::new();
        for node in result.nodes() {
            if let Some(fact) = result.out_fact(node) {
                for (var, value) in fact.iter() {
                    out_values.push((node, var, value));
                }
            }
        }
        Self { out_values }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CallGraphResult {
    pub reachable: BTreeSet<MethodRef>,
    pub edges: BTreeSet<(CallSite, MethodRef, InvokeKind)>,
}

impl CallGraphResult {
    #[must_use]
    pub fn from_call_graph(cg: &CallGraph) -> Self {
        Self {
            reachable: cg.reachable_methods().cloned().collect(),
            edges: cg.edges().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PointerAnalysisResult {
    pub points_to: Vec<(Pointer, PointsToSet)>,
    pub reachable: BTreeSet<(Context, MethodRef)>,
    pub edges: BTreeSet<(CsCallSite, Context, MethodRef, InvokeKind)>,
}

impl PointerAnalysisResult {
    #[must_use]
    pub fn from_report(report: &PointerAnalysisReport, all_pointers: impl IntoIterator<Item = Pointer>) -> Self {
        let points_to = all_pointers
            .into_iter()
            .map(|ptr| {
                let pts = report.points_to(&ptr);
                (ptr, pts)
            })
            .collect();
        Self {
            points_to,
            reachable: report.call_graph().reachable_methods().cloned().collect(),
            edges: report.call_graph().edges().cloned().collect(),
        }
    }

    #[must_use]
    pub fn call_graph(report: &PointerAnalysisReport) -> &CsCallGraph {
        report.call_graph()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct InterprocConstPropResult {
    pub out_values: Vec<(MethodRef, StmtId, VarId, Value)>,
}

impl InterprocConstPropResult {
    #[must_use]
    pub fn from_result(icfg: &Icfg, result: &InterprocResult) -> Self {
        let mut out_values = Vec::new();
        for node in icfg.nodes() {
            if let Some(fact) = result.out_fact(node) {
                for (var, value) in fact.iter() {
                    out_values.push((node.method.clone(), node.stmt, var, value));
                }
            }
        }
        Self { out_values }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaintAnalysisResult {
    pub flows: BTreeSet<TaintFlow>,
}

impl TaintAnalysisResult {
    #[must_use]
    pub fn from_report(report: &PointerAnalysisReport) -> Self {
        Self {
            flows: report.taint_flows().clone(),
        }
    }
}
