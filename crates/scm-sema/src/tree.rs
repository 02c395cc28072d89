//! The typed statement tree the analyzer produces.

use std::sync::Arc;

use scm_config::CommandId;
use scm_syntax::ast::CondJoin;
use scm_syntax::diag::DiagContext;
use scm_syntax::source::{Loc, SourceFile};
use scm_syntax::ScriptKind;

use crate::symtable::Var;

/// A fully analyzed script, ready for control-flow lowering.
pub struct SemaScript {
    pub name: String,
    pub kind: ScriptKind,
    pub file: Arc<SourceFile>,
    pub body: Vec<SemaStmt>,
    /// Number of user labels; ids `0..label_count` are taken.
    pub label_count: u32,
    /// Words of global storage this job requires (guessed and mission
    /// variables included), folded into the header's variable space.
    pub storage_watermark: u32,
    /// `SCRIPT_NAME` arguments seen in this script, for the program-level
    /// uniqueness check the driver runs after all jobs complete.
    pub script_names: Vec<(String, DiagContext)>,
}

/// Reference to a variable, with the subscript for array accesses.
#[derive(Debug, Clone)]
pub struct VarRef {
    pub var: Arc<Var>,
    pub index: Option<VarIndex>,
}

#[derive(Debug, Clone)]
pub enum VarIndex {
    Literal(i32),
    Var(Arc<Var>),
}

/// A resolved, coerced argument.
#[derive(Debug, Clone)]
pub enum SemaArg {
    Int(i32),
    Float(f32),
    Var(VarRef),
    /// User label, by pre-assigned id.
    Label(u32),
    TextLabel(String),
    String(String),
    /// Level-model name; the emitter allocates its used-models slot.
    Model(String),
}

/// A command call with its opcode resolved.
#[derive(Debug, Clone)]
pub struct SemaCommand {
    pub command: CommandId,
    pub not: bool,
    pub args: Vec<SemaArg>,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub struct SemaConds {
    pub join: CondJoin,
    pub conds: Vec<SemaCommand>,
}

#[derive(Debug, Clone)]
pub struct SwitchArm {
    pub value: i32,
    pub body: Vec<SemaStmt>,
    pub loc: Loc,
}

/// Statements after analysis. Lexical scopes are dissolved (locals and
/// labels are resolved), so only control-flow structure remains.
#[derive(Debug, Clone)]
pub enum SemaStmt {
    Command(SemaCommand),
    Label(u32),
    If {
        conds: SemaConds,
        then_body: Vec<SemaStmt>,
        else_body: Option<Vec<SemaStmt>>,
    },
    While {
        conds: SemaConds,
        body: Vec<SemaStmt>,
    },
    Repeat {
        init: SemaCommand,
        add: SemaCommand,
        check: SemaCommand,
        body: Vec<SemaStmt>,
    },
    Switch {
        var: VarRef,
        cases: Vec<SwitchArm>,
        default: Option<Vec<SemaStmt>>,
        loc: Loc,
    },
    Break(Loc),
    Continue(Loc),
}
