//! AST (abstract syntax tree) types for GTA3script.

use crate::source::Loc;

/// What kind of translation unit a script file is. The single main script
/// is the entry point; subscripts and missions are compiled into the same
/// image; streamed scripts go to separate files (San Andreas).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Main,
    Subscript,
    Mission,
    Streamed,
}

impl ScriptKind {
    pub fn is_mission_like(self) -> bool {
        matches!(self, ScriptKind::Mission | ScriptKind::Streamed)
    }
}

/// Declared variable storage class. Whether a `VAR_*` declaration lands in
/// the shared global space or the mission-variable region depends on the
/// kind of script declaring it, not on the syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarClass {
    Global,
    Local,
}

/// Declared variable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Int,
    Float,
    TextLabel,
}

/// One name within a `VAR_INT a b c[10]` declaration line.
#[derive(Debug, Clone)]
pub struct VarName {
    pub name: String,
    pub array_len: Option<u32>,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub class: VarClass,
    pub ty: VarType,
    pub names: Vec<VarName>,
    pub loc: Loc,
}

/// An argument as written in the source. The analyzer decides what an
/// identifier denotes (variable, enum constant, text label, label, model).
#[derive(Debug, Clone)]
pub struct Arg {
    pub kind: ArgKind,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub enum ArgKind {
    Int(i32),
    Float(f32),
    Ident(String),
    String(String),
    /// `name[index]` subscript.
    Array { name: String, index: ArrayIndex },
}

#[derive(Debug, Clone)]
pub enum ArrayIndex {
    Literal(i32),
    Ident(String),
}

/// A plain command invocation: `NAME arg arg ...`.
#[derive(Debug, Clone)]
pub struct CommandStmt {
    pub name: String,
    pub args: Vec<Arg>,
    pub loc: Loc,
}

/// Binary operators usable in `x = y op z` expression statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Assignment forms: `x = y` and the compound `x op= y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison operators usable in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Greater,
    GreaterEq,
    Less,
    LessEq,
}

/// A single condition of an `IF`/`WHILE` list.
#[derive(Debug, Clone)]
pub enum Cond {
    /// `[NOT] COMMAND args...`
    Command { not: bool, cmd: CommandStmt },
    /// `[NOT] lhs op rhs`
    Cmp { not: bool, lhs: Arg, op: CmpOp, rhs: Arg, loc: Loc },
}

/// How the conditions of a list combine. Mixing `AND` and `OR` within one
/// list is a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondJoin {
    Single,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct CondList {
    pub join: CondJoin,
    pub conds: Vec<Cond>,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub value: Arg,
    pub body: Vec<Stmt>,
    pub loc: Loc,
}

/// Statements of the language.
#[derive(Debug, Clone)]
pub enum Stmt {
    VarDecl(VarDecl),
    Label { name: String, loc: Loc },
    Command(CommandStmt),
    /// `x = y`, `x += y`, ...
    Assign { target: Arg, op: AssignOp, value: Arg, loc: Loc },
    /// `x = y op z`
    AssignExpr { target: Arg, lhs: Arg, op: BinOp, rhs: Arg, loc: Loc },
    If { conds: CondList, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>, loc: Loc },
    While { conds: CondList, body: Vec<Stmt>, loc: Loc },
    Repeat { count: Arg, var: Arg, body: Vec<Stmt>, loc: Loc },
    Switch {
        var: Arg,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
        default_loc: Option<Loc>,
        loc: Loc,
    },
    Break(Loc),
    Continue(Loc),
    /// `{ ... }` lexical scope.
    Scope { body: Vec<Stmt>, loc: Loc },
}

impl Stmt {
    pub fn loc(&self) -> Loc {
        match self {
            Stmt::VarDecl(d) => d.loc,
            Stmt::Label { loc, .. }
            | Stmt::Command(CommandStmt { loc, .. })
            | Stmt::Assign { loc, .. }
            | Stmt::AssignExpr { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::While { loc, .. }
            | Stmt::Repeat { loc, .. }
            | Stmt::Switch { loc, .. }
            | Stmt::Break(loc)
            | Stmt::Continue(loc)
            | Stmt::Scope { loc, .. } => *loc,
        }
    }
}
