//! Semantic analysis for GTA3script.
//!
//! The analyzer walks the parsed statement tree and produces a typed tree
//! in which every command call carries a resolved command id and coerced
//! arguments, every identifier is bound to a variable, label, enum
//! constant, model or text label, and the structured statements are
//! validated (`BREAK` placement, switch case rules, entity types). The
//! control-flow lowerer consumes this tree without looking at names again.
//!
//! Global variables of the main script and subscripts share one index
//! space, so they are collected into a [`symtable::GlobalScope`] before
//! the per-script jobs run (see [`symtable::collect_globals`]).

pub mod analyzer;
pub mod symtable;
pub mod tree;

pub use analyzer::analyze;
pub use symtable::{collect_globals, GlobalScope, Var, VarScope};
pub use tree::*;
