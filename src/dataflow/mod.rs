//! Lattice, generic solver, and the client analyses built on it (C1–C4).

pub mod constprop;
pub mod dead_code;
pub mod live;
pub mod solver;
pub mod value;

pub use constprop::ConstantPropagation;
pub use dead_code::detect_dead_code;
pub use live::{LiveVariableAnalysis, SetFact};
pub use solver::{DataflowAnalysis, DataflowResult, solve};
pub use value::{CPFact, Value};
