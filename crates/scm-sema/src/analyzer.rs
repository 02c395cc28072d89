//! The semantic analyzer.
//!
//! Resolves every command call against the command database (directly or
//! through an alternator), binds identifiers, checks arity and types,
//! tracks entity types, and validates structured statements. Errors are
//! reported and analysis continues with the next statement; only
//! unsupported commands (in non-pedantic mode) and an overflowing error
//! count halt the job.

use std::sync::Arc;

use scm_config::commands::{ArgType, ParamDesc, ParamKind, ResolveError};
use scm_config::ProgramContext;
use scm_syntax::ast::*;
use scm_syntax::diag::{DiagContext, Halted};
use scm_syntax::source::{Loc, SourceFile};

use crate::symtable::{source_context, GlobalScope, SymbolTable, Var};
use crate::tree::*;

/// Names the analyzer accepts as case-terminating besides `BREAK`.
const TERMINATORS: [&str; 3] = ["GOTO", "RETURN", "TERMINATE_THIS_SCRIPT"];

pub fn analyze(
    cx: &ProgramContext,
    globals: &GlobalScope,
    file: &Arc<SourceFile>,
    kind: ScriptKind,
    stmts: &[Stmt],
) -> Result<SemaScript, Halted> {
    let mut symbols = SymbolTable::new(globals, &cx.opt, kind);
    symbols.install_timers();
    let mut analyzer = Analyzer {
        cx,
        file: Arc::clone(file),
        symbols,
        script_names: Vec::new(),
        break_stack: Vec::new(),
        scope_path: Vec::new(),
        scope_counters: vec![0],
        scope_depth: 0,
    };
    analyzer.declare_labels(stmts);
    analyzer.scope_path.clear();
    analyzer.scope_counters = vec![0];
    let body = analyzer.block(stmts)?;
    Ok(SemaScript {
        name: file.script_name(),
        kind,
        file: Arc::clone(file),
        body,
        label_count: analyzer.symbols.label_count(),
        storage_watermark: analyzer.symbols.storage_watermark(),
        script_names: analyzer.script_names,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakCtx {
    Loop,
    Switch,
}

struct Analyzer<'a> {
    cx: &'a ProgramContext,
    file: Arc<SourceFile>,
    symbols: SymbolTable<'a>,
    script_names: Vec<(String, DiagContext)>,
    break_stack: Vec<BreakCtx>,
    scope_path: Vec<u32>,
    scope_counters: Vec<u32>,
    scope_depth: u32,
}

impl<'a> Analyzer<'a> {
    fn ctx(&self, loc: Loc) -> DiagContext {
        source_context(&self.file, loc)
    }

    fn error(&self, loc: Loc, message: &str) {
        self.cx.diag.error(&self.ctx(loc), message);
    }

    // ---- label pre-pass ----

    /// Declares every label before analysis so forward `GOTO`s resolve.
    fn declare_labels(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::Label { name, loc } => {
                    if self.symbols.declare_label(name, &self.scope_path).is_none() {
                        self.error(*loc, &format!("label '{name}' redeclared"));
                    }
                }
                Stmt::If { then_body, else_body, .. } => {
                    self.declare_labels(then_body);
                    if let Some(body) = else_body {
                        self.declare_labels(body);
                    }
                }
                Stmt::While { body, .. } | Stmt::Repeat { body, .. } => {
                    self.declare_labels(body);
                }
                Stmt::Switch { cases, default, .. } => {
                    for case in cases {
                        self.declare_labels(&case.body);
                    }
                    if let Some(body) = default {
                        self.declare_labels(body);
                    }
                }
                Stmt::Scope { body, .. } => {
                    self.enter_scope_path();
                    self.declare_labels(body);
                    self.leave_scope_path();
                }
                _ => {}
            }
        }
    }

    fn enter_scope_path(&mut self) {
        let ordinal = *self.scope_counters.last().expect("counter stack never empty");
        *self.scope_counters.last_mut().unwrap() += 1;
        self.scope_path.push(ordinal);
        self.scope_counters.push(0);
    }

    fn leave_scope_path(&mut self) {
        self.scope_path.pop();
        self.scope_counters.pop();
    }

    // ---- statements ----

    fn block(&mut self, stmts: &[Stmt]) -> Result<Vec<SemaStmt>, Halted> {
        let mut out = Vec::new();
        for stmt in stmts {
            if self.cx.diag.too_many_errors() {
                return Err(self.cx.diag.fatal(&DiagContext::None, "too many errors"));
            }
            self.stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn stmt(&mut self, stmt: &Stmt, out: &mut Vec<SemaStmt>) -> Result<(), Halted> {
        match stmt {
            Stmt::VarDecl(decl) => self.var_decl(decl),
            Stmt::Label { name, .. } => {
                if let Some(id) = self.symbols.lookup_label(name, &self.scope_path) {
                    out.push(SemaStmt::Label(id));
                }
            }
            Stmt::Scope { body, loc } => {
                if self.scope_depth > 0 {
                    self.error(*loc, "lexical scopes cannot nest");
                }
                self.scope_depth += 1;
                self.symbols.push_scope();
                self.enter_scope_path();
                let inner = self.block(body)?;
                self.leave_scope_path();
                self.symbols.pop_scope();
                self.scope_depth -= 1;
                out.extend(inner);
            }
            Stmt::Command(cmd) => {
                if let Some(sema) = self.command_stmt(cmd, false, false)? {
                    self.record_script_name(&sema);
                    out.push(SemaStmt::Command(sema));
                }
            }
            Stmt::Assign { target, op, value, loc } => {
                let name = match op {
                    AssignOp::Set => "SET",
                    AssignOp::Add => "ADD_THING_TO_THING",
                    AssignOp::Sub => "SUB_THING_FROM_THING",
                    AssignOp::Mul => "MULT_THING_BY_THING",
                    AssignOp::Div => "DIV_THING_BY_THING",
                };
                if *op == AssignOp::Set {
                    self.guess_assignment_target(target, value);
                }
                let args = [self.classify(target), self.classify(value)];
                if let [Some(a), Some(b)] = args {
                    if let Some(sema) = self.alt_command(name, vec![a, b], *loc, false)? {
                        out.push(SemaStmt::Command(sema));
                    }
                }
            }
            Stmt::AssignExpr { target, lhs, op, rhs, loc } => {
                self.assign_expr(target, lhs, *op, rhs, *loc, out)?;
            }
            Stmt::If { conds, then_body, else_body, loc: _ } => {
                let conds = self.cond_list(conds)?;
                let then_body = self.block(then_body)?;
                let else_body = match else_body {
                    Some(body) => Some(self.block(body)?),
                    None => None,
                };
                out.push(SemaStmt::If { conds, then_body, else_body });
            }
            Stmt::While { conds, body, loc: _ } => {
                let conds = self.cond_list(conds)?;
                self.break_stack.push(BreakCtx::Loop);
                let body = self.block(body)?;
                self.break_stack.pop();
                out.push(SemaStmt::While { conds, body });
            }
            Stmt::Repeat { count, var, body, loc } => {
                self.repeat(count, var, body, *loc, out)?;
            }
            Stmt::Switch { var, cases, default, default_loc: _, loc } => {
                self.switch(var, cases, default.as_deref(), *loc, out)?;
            }
            Stmt::Break(loc) => match self.break_stack.last() {
                None => self.error(*loc, "BREAK outside of a SWITCH statement or loop"),
                Some(BreakCtx::Loop) if !self.cx.opt.allow_break_continue => {
                    self.error(*loc, "BREAK inside a loop requires --allow-break-continue")
                }
                Some(_) => out.push(SemaStmt::Break(*loc)),
            },
            Stmt::Continue(loc) => {
                if !self.break_stack.contains(&BreakCtx::Loop) {
                    self.error(*loc, "CONTINUE outside of a loop");
                } else if !self.cx.opt.allow_break_continue {
                    self.error(*loc, "CONTINUE requires --allow-break-continue");
                } else {
                    out.push(SemaStmt::Continue(*loc));
                }
            }
        }
        Ok(())
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        for name in &decl.names {
            if name.array_len.is_some() && !self.cx.opt.farrays {
                self.error(name.loc, "array declarations require --farrays");
                continue;
            }
            if let (Some(len), Some(limit)) = (name.array_len, self.cx.opt.array_elem_limit) {
                if len > limit {
                    self.error(name.loc, &format!("array exceeds the element limit of {limit}"));
                    continue;
                }
            }
            match decl.class {
                VarClass::Local => {
                    if let Err(msg) = self.symbols.declare_local(&name.name, decl.ty, name.array_len)
                    {
                        self.error(name.loc, msg);
                    }
                }
                VarClass::Global if self.symbols.owns_global_decls() => {
                    if let Err(msg) =
                        self.symbols.declare_mission_var(&name.name, decl.ty, name.array_len)
                    {
                        self.error(name.loc, &msg);
                    }
                }
                // shared globals were collected before the jobs started
                VarClass::Global => {}
            }
        }
    }

    fn record_script_name(&mut self, sema: &SemaCommand) {
        if !self.cx.opt.script_name_check {
            return;
        }
        if self.cx.commands.command(sema.command).name != "SCRIPT_NAME" {
            return;
        }
        if let Some(SemaArg::TextLabel(name)) = sema.args.first() {
            self.script_names.push((name.clone(), self.ctx(sema.loc)));
        }
    }

    // ---- expression statements ----

    /// Under `--guesser`, an assignment to an undeclared name declares it
    /// with the type of the assigned value.
    fn guess_assignment_target(&mut self, target: &Arg, value: &Arg) {
        if !self.cx.opt.guesser {
            return;
        }
        let ArgKind::Ident(name) = &target.kind else { return };
        if self.symbols.lookup_var(name).is_some() {
            return;
        }
        let ty = match &value.kind {
            ArgKind::Int(_) => VarType::Int,
            ArgKind::Float(_) => VarType::Float,
            ArgKind::Ident(v) => match self.symbols.lookup_var(v) {
                Some(var) => var.ty,
                None => VarType::TextLabel,
            },
            _ => return,
        };
        if let Err(msg) = self.symbols.guess_var(name, ty) {
            self.error(target.loc, &msg);
        }
    }

    fn assign_expr(
        &mut self,
        target: &Arg,
        lhs: &Arg,
        op: BinOp,
        rhs: &Arg,
        loc: Loc,
        out: &mut Vec<SemaStmt>,
    ) -> Result<(), Halted> {
        let compound = match op {
            BinOp::Add => "ADD_THING_TO_THING",
            BinOp::Sub => "SUB_THING_FROM_THING",
            BinOp::Mul => "MULT_THING_BY_THING",
            BinOp::Div => "DIV_THING_BY_THING",
        };
        let commutative = matches!(op, BinOp::Add | BinOp::Mul);
        let (first, second) = if args_textually_equal(target, lhs) {
            (None, rhs)
        } else if args_textually_equal(target, rhs) && commutative {
            (None, lhs)
        } else if args_textually_equal(target, rhs) {
            self.error(loc, "the target of this expression may only appear on its left side");
            return Ok(());
        } else {
            (Some(lhs), rhs)
        };
        if let Some(copy_from) = first {
            let args = [self.classify(target), self.classify(copy_from)];
            if let [Some(a), Some(b)] = args {
                if let Some(sema) = self.alt_command("SET", vec![a, b], loc, false)? {
                    out.push(SemaStmt::Command(sema));
                }
            } else {
                return Ok(());
            }
        }
        let args = [self.classify(target), self.classify(second)];
        if let [Some(a), Some(b)] = args {
            if let Some(sema) = self.alt_command(compound, vec![a, b], loc, false)? {
                out.push(SemaStmt::Command(sema));
            }
        }
        Ok(())
    }

    fn repeat(
        &mut self,
        count: &Arg,
        var: &Arg,
        body: &[Stmt],
        loc: Loc,
        out: &mut Vec<SemaStmt>,
    ) -> Result<(), Halted> {
        let count_value = match count.kind {
            ArgKind::Int(v) => v,
            _ => {
                self.error(count.loc, "REPEAT count must be an integer constant");
                return Ok(());
            }
        };
        let Some((var_arg, var_ty)) = self.classify(var) else { return Ok(()) };
        if !matches!(var_ty, ArgType::GlobalVarInt | ArgType::LocalVarInt) {
            self.error(var.loc, "REPEAT counter must be an integer variable");
            return Ok(());
        }
        let init = self.alt_command(
            "SET",
            vec![(var_arg.clone(), var_ty), (SemaArg::Int(0), ArgType::Int)],
            loc,
            false,
        )?;
        let add = self.alt_command(
            "ADD_THING_TO_THING",
            vec![(var_arg.clone(), var_ty), (SemaArg::Int(1), ArgType::Int)],
            loc,
            false,
        )?;
        let check = self.alt_command(
            "IS_THING_GREATER_OR_EQUAL_TO_THING",
            vec![(var_arg, var_ty), (SemaArg::Int(count_value), ArgType::Int)],
            loc,
            false,
        )?;
        self.break_stack.push(BreakCtx::Loop);
        let body = self.block(body)?;
        self.break_stack.pop();
        if let (Some(init), Some(add), Some(check)) = (init, add, check) {
            out.push(SemaStmt::Repeat { init, add, check, body });
        }
        Ok(())
    }

    fn switch(
        &mut self,
        var: &Arg,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
        loc: Loc,
        out: &mut Vec<SemaStmt>,
    ) -> Result<(), Halted> {
        if !self.cx.opt.fswitch {
            self.error(loc, "SWITCH statements require --fswitch");
        }
        let var_ref = match self.classify(var) {
            Some((SemaArg::Var(vr), ArgType::GlobalVarInt | ArgType::LocalVarInt)) => Some(vr),
            Some(_) => {
                self.error(var.loc, "SWITCH requires an integer variable");
                None
            }
            None => None,
        };
        if let Some(limit) = self.cx.opt.switch_case_limit {
            if cases.len() as u32 > limit {
                self.error(loc, &format!("SWITCH exceeds the case limit of {limit}"));
            }
        }
        let mut arms: Vec<SwitchArm> = Vec::new();
        for case in cases {
            let value = match self.case_value(&case.value) {
                Some(v) => v,
                None => continue,
            };
            if arms.iter().any(|arm| arm.value == value) {
                self.error(case.loc, &format!("duplicate CASE value {value}"));
                continue;
            }
            self.break_stack.push(BreakCtx::Switch);
            let body = self.block(&case.body)?;
            self.break_stack.pop();
            if !self.case_terminates(&body) {
                self.error(case.loc, "CASE body must end with BREAK or a terminating statement");
            }
            arms.push(SwitchArm { value, body, loc: case.loc });
        }
        let default = match default {
            Some(body) => {
                self.break_stack.push(BreakCtx::Switch);
                let body = self.block(body)?;
                self.break_stack.pop();
                if !self.case_terminates(&body) {
                    self.error(loc, "DEFAULT body must end with BREAK or a terminating statement");
                }
                Some(body)
            }
            None => None,
        };
        if let Some(var) = var_ref {
            out.push(SemaStmt::Switch { var, cases: arms, default, loc });
        }
        Ok(())
    }

    fn case_value(&mut self, arg: &Arg) -> Option<i32> {
        match &arg.kind {
            ArgKind::Int(v) => Some(*v),
            ArgKind::Ident(name) => match self.cx.commands.global_constant(name) {
                Some((_, v)) => Some(v),
                None => {
                    self.error(arg.loc, "CASE requires an integer constant");
                    None
                }
            },
            _ => {
                self.error(arg.loc, "CASE requires an integer constant");
                None
            }
        }
    }

    fn case_terminates(&self, body: &[SemaStmt]) -> bool {
        match body.last() {
            Some(SemaStmt::Break(_)) => true,
            Some(SemaStmt::Command(c)) => {
                let name = &self.cx.commands.command(c.command).name;
                TERMINATORS.iter().any(|t| t == name)
            }
            _ => false,
        }
    }

    // ---- conditions ----

    fn cond_list(&mut self, conds: &CondList) -> Result<SemaConds, Halted> {
        let mut list = Vec::new();
        for cond in &conds.conds {
            let sema = match cond {
                Cond::Command { not, cmd } => self.command_stmt(cmd, true, *not)?,
                Cond::Cmp { not, lhs, op, rhs, loc } => self.comparison(*not, lhs, *op, rhs, *loc)?,
            };
            if let Some(sema) = sema {
                list.push(sema);
            }
        }
        Ok(SemaConds { join: conds.join, conds: list })
    }

    fn comparison(
        &mut self,
        not: bool,
        lhs: &Arg,
        op: CmpOp,
        rhs: &Arg,
        loc: Loc,
    ) -> Result<Option<SemaCommand>, Halted> {
        // `<` and `<=` compile to the swapped `>`/`>=` alternators
        let (name, swap) = match op {
            CmpOp::Eq => ("IS_THING_EQUAL_TO_THING", false),
            CmpOp::Greater => ("IS_THING_GREATER_THAN_THING", false),
            CmpOp::GreaterEq => ("IS_THING_GREATER_OR_EQUAL_TO_THING", false),
            CmpOp::Less => ("IS_THING_GREATER_THAN_THING", true),
            CmpOp::LessEq => ("IS_THING_GREATER_OR_EQUAL_TO_THING", true),
        };
        let (a, b) = if swap { (rhs, lhs) } else { (lhs, rhs) };
        let args = [self.classify(a), self.classify(b)];
        if let [Some(a), Some(b)] = args {
            self.alt_command(name, vec![a, b], loc, not)
        } else {
            Ok(None)
        }
    }

    // ---- command resolution ----

    fn command_stmt(
        &mut self,
        cmd: &CommandStmt,
        in_condition: bool,
        not: bool,
    ) -> Result<Option<SemaCommand>, Halted> {
        if not && !in_condition {
            self.error(cmd.loc, "NOT is only allowed in conditions");
        }
        if let Some(alternator) = self.cx.commands.find_alternator(&cmd.name) {
            let alternator = alternator.clone();
            let mut args = Vec::with_capacity(cmd.args.len());
            for arg in &cmd.args {
                match self.classify(arg) {
                    Some(pair) => args.push(pair),
                    None => return Ok(None),
                }
            }
            let sema = self.resolve_alternator(&alternator, args, cmd.loc, not)?;
            return Ok(sema);
        }
        let (id, command) = match self.cx.commands.find_command(&cmd.name) {
            Some(found) => found,
            None => {
                self.error(cmd.loc, &format!("unknown command '{}'", cmd.name));
                return Ok(None);
            }
        };
        if command.is_keyword {
            self.error(cmd.loc, &format!("command '{}' is for internal use", cmd.name));
            return Ok(None);
        }
        if !command.supported {
            if self.cx.opt.pedantic {
                self.error(cmd.loc, &format!("command '{}' is not supported by this game", cmd.name));
                return Ok(None);
            }
            return Err(self
                .cx
                .diag
                .fatal(&self.ctx(cmd.loc), &format!("command '{}' undefined or unsupported", cmd.name)));
        }
        if not && !condition_command_name(&cmd.name) && !self.cx.opt.relax_not {
            self.error(cmd.loc, &format!("command '{}' cannot be negated", cmd.name));
        }
        let command = command.clone();
        let required = command.params.iter().filter(|p| !p.optional).count();
        if cmd.args.len() < required || cmd.args.len() > command.params.len() {
            self.error(
                cmd.loc,
                &format!(
                    "wrong number of arguments to '{}': expected {}, found {}",
                    cmd.name,
                    if required == command.params.len() {
                        required.to_string()
                    } else {
                        format!("{required} to {}", command.params.len())
                    },
                    cmd.args.len()
                ),
            );
            return Ok(None);
        }
        let mut args = Vec::with_capacity(cmd.args.len());
        let mut ok = true;
        for (param, arg) in command.params.iter().zip(&cmd.args) {
            match self.bind_arg(param, arg) {
                Some(sema) => {
                    self.check_entity(param, &sema, arg.loc);
                    args.push(sema);
                }
                None => ok = false,
            }
        }
        if !ok {
            return Ok(None);
        }
        Ok(Some(SemaCommand { command: id, not, args, loc: cmd.loc }))
    }

    /// Builds a command through an alternator from pre-classified args.
    fn alt_command(
        &mut self,
        name: &str,
        args: Vec<(SemaArg, ArgType)>,
        loc: Loc,
        not: bool,
    ) -> Result<Option<SemaCommand>, Halted> {
        let ctx = self.ctx(loc);
        let alternator = self.cx.alternator_or_fatal(&ctx, name)?.clone();
        self.resolve_alternator(&alternator, args, loc, not)
    }

    fn resolve_alternator(
        &mut self,
        alternator: &scm_config::Alternator,
        args: Vec<(SemaArg, ArgType)>,
        loc: Loc,
        not: bool,
    ) -> Result<Option<SemaCommand>, Halted> {
        let types: Vec<ArgType> = args.iter().map(|&(_, ty)| ty).collect();
        match self.cx.commands.resolve_alternator(alternator, &types, &self.cx.opt) {
            Ok(id) => Ok(Some(SemaCommand {
                command: id,
                not,
                args: args.into_iter().map(|(a, _)| a).collect(),
                loc,
            })),
            Err(ResolveError::NoMatch) => {
                self.error(
                    loc,
                    &format!("no alternative of '{}' accepts these arguments", alternator.name),
                );
                Ok(None)
            }
            Err(ResolveError::Ambiguous) => {
                self.error(loc, &format!("ambiguous use of '{}'", alternator.name));
                Ok(None)
            }
        }
    }

    // ---- argument binding ----

    /// Infers what an argument denotes without a parameter expectation
    /// (used for alternator resolution).
    fn classify(&mut self, arg: &Arg) -> Option<(SemaArg, ArgType)> {
        match &arg.kind {
            ArgKind::Int(v) => Some((SemaArg::Int(*v), ArgType::Int)),
            ArgKind::Float(v) => Some((SemaArg::Float(*v), ArgType::Float)),
            ArgKind::String(s) => Some((SemaArg::String(s.clone()), ArgType::String)),
            ArgKind::Ident(name) => {
                if let Some(var) = self.symbols.lookup_var(name) {
                    if var.array_len.is_some() {
                        self.error(arg.loc, &format!("array '{name}' requires a subscript"));
                        return None;
                    }
                    let ty = var_arg_type(&var);
                    return Some((SemaArg::Var(VarRef { var, index: None }), ty));
                }
                if let Some((enum_id, value)) = self.cx.commands.global_constant(name) {
                    return Some((SemaArg::Int(value), ArgType::Const(enum_id)));
                }
                Some((SemaArg::TextLabel(name.clone()), ArgType::TextLabel))
            }
            ArgKind::Array { name, index } => {
                let var_ref = self.array_ref(name, index, arg.loc)?;
                let ty = var_arg_type(&var_ref.var);
                Some((SemaArg::Var(var_ref), ty))
            }
        }
    }

    fn array_ref(&mut self, name: &str, index: &ArrayIndex, loc: Loc) -> Option<VarRef> {
        if !self.cx.opt.farrays {
            self.error(loc, "array subscripts require --farrays");
            return None;
        }
        let var = match self.symbols.lookup_var(name) {
            Some(var) => var,
            None => {
                self.error(loc, &format!("undeclared variable '{name}'"));
                return None;
            }
        };
        let Some(len) = var.array_len else {
            self.error(loc, &format!("variable '{name}' is not an array"));
            return None;
        };
        let index = match index {
            ArrayIndex::Literal(v) => {
                if *v < 0 || *v as u32 >= len {
                    self.error(loc, &format!("array index {v} out of bounds (length {len})"));
                    return None;
                }
                VarIndex::Literal(*v)
            }
            ArrayIndex::Ident(idx_name) => match self.symbols.lookup_var(idx_name) {
                Some(idx) if idx.ty == VarType::Int && idx.array_len.is_none() => {
                    VarIndex::Var(idx)
                }
                Some(_) => {
                    self.error(loc, "array index must be an integer variable");
                    return None;
                }
                None => {
                    self.error(loc, &format!("undeclared variable '{idx_name}'"));
                    return None;
                }
            },
        };
        Some(VarRef { var, index: Some(index) })
    }

    /// Binds one argument against one parameter descriptor.
    fn bind_arg(&mut self, param: &ParamDesc, arg: &Arg) -> Option<SemaArg> {
        match param.kind {
            ParamKind::Int => self.bind_int_constant(param, arg),
            ParamKind::Float => match arg.kind {
                ArgKind::Float(v) => Some(SemaArg::Float(v)),
                ArgKind::Int(v) => Some(SemaArg::Float(v as f32)),
                _ => {
                    self.error(arg.loc, "expected float constant");
                    None
                }
            },
            ParamKind::Label => match &arg.kind {
                ArgKind::Ident(name) => {
                    match self.symbols.lookup_label(name, &self.scope_path) {
                        Some(id) => Some(SemaArg::Label(id)),
                        None => {
                            self.error(arg.loc, &format!("label '{name}' does not exist"));
                            None
                        }
                    }
                }
                _ => {
                    self.error(arg.loc, "expected label");
                    None
                }
            },
            ParamKind::TextLabel => match &arg.kind {
                ArgKind::Ident(name) => {
                    if let Some(var) = self.symbols.lookup_var(name) {
                        if var.ty == VarType::TextLabel && self.cx.opt.text_label_vars {
                            return Some(SemaArg::Var(VarRef { var, index: None }));
                        }
                    }
                    Some(SemaArg::TextLabel(name.clone()))
                }
                _ => {
                    self.error(arg.loc, "expected text label");
                    None
                }
            },
            ParamKind::String => match &arg.kind {
                ArgKind::String(s) => Some(SemaArg::String(s.clone())),
                _ => {
                    self.error(arg.loc, "expected string literal");
                    None
                }
            },
            ParamKind::InputInt => {
                if let ArgKind::Int(v) = arg.kind {
                    return Some(SemaArg::Int(v));
                }
                if let Some(var) = self.try_var(arg, VarType::Int, None) {
                    return Some(var);
                }
                self.bind_int_constant(param, arg)
            }
            ParamKind::InputFloat => match arg.kind {
                ArgKind::Float(v) => Some(SemaArg::Float(v)),
                ArgKind::Int(v) => Some(SemaArg::Float(v as f32)),
                _ => match self.try_var(arg, VarType::Float, None) {
                    Some(var) => Some(var),
                    None => {
                        self.error(arg.loc, "expected float value or variable");
                        None
                    }
                },
            },
            ParamKind::OutputInt => self.bind_var(arg, VarType::Int, None, true),
            ParamKind::OutputFloat => self.bind_var(arg, VarType::Float, None, true),
            ParamKind::VarInt => self.bind_var(arg, VarType::Int, Some(true), false),
            ParamKind::LVarInt => self.bind_var(arg, VarType::Int, Some(false), false),
            ParamKind::VarFloat => self.bind_var(arg, VarType::Float, Some(true), false),
            ParamKind::LVarFloat => self.bind_var(arg, VarType::Float, Some(false), false),
            ParamKind::VarTextLabel => self.bind_var(arg, VarType::TextLabel, Some(true), false),
            ParamKind::LVarTextLabel => self.bind_var(arg, VarType::TextLabel, Some(false), false),
        }
    }

    /// Integer-constant slots: literals, enum constants, and model names
    /// for `MODEL`-typed slots.
    fn bind_int_constant(&mut self, param: &ParamDesc, arg: &Arg) -> Option<SemaArg> {
        match &arg.kind {
            ArgKind::Int(v) => Some(SemaArg::Int(*v)),
            ArgKind::Ident(name) => {
                if let Some(enum_id) = param.enum_ref {
                    if let Some(v) = self.cx.commands.enum_def(enum_id).constant(name) {
                        return Some(SemaArg::Int(v));
                    }
                    if Some(enum_id) == self.cx.commands.model_enum() {
                        match self.cx.models.find(name) {
                            Some((_, true)) => return Some(SemaArg::Model(name.clone())),
                            Some((id, false)) => return Some(SemaArg::Int(id as i32)),
                            None => {
                                self.error(arg.loc, &format!("unknown model '{name}'"));
                                return None;
                            }
                        }
                    }
                    self.error(
                        arg.loc,
                        &format!(
                            "'{name}' is not a constant of {}",
                            self.cx.commands.enum_def(enum_id).name
                        ),
                    );
                    return None;
                }
                if let Some((_, v)) = self.cx.commands.global_constant(name) {
                    return Some(SemaArg::Int(v));
                }
                self.error(arg.loc, &format!("'{name}' is not an integer constant"));
                None
            }
            _ => {
                self.error(arg.loc, "expected integer constant");
                None
            }
        }
    }

    /// Variable-slot binding. `global`: `Some(true)` demands global
    /// storage, `Some(false)` local, `None` accepts both.
    fn bind_var(
        &mut self,
        arg: &Arg,
        ty: VarType,
        global: Option<bool>,
        output: bool,
    ) -> Option<SemaArg> {
        if output && self.cx.opt.guesser {
            if let ArgKind::Ident(name) = &arg.kind {
                if self.symbols.lookup_var(name).is_none() {
                    if let Err(msg) = self.symbols.guess_var(name, ty) {
                        self.error(arg.loc, &msg);
                    }
                }
            }
        }
        match self.try_var(arg, ty, global) {
            Some(var) => Some(var),
            None => {
                let class = match global {
                    Some(true) => "global ",
                    Some(false) => "local ",
                    None => "",
                };
                let tyname = match ty {
                    VarType::Int => "integer",
                    VarType::Float => "float",
                    VarType::TextLabel => "text label",
                };
                self.error(arg.loc, &format!("expected {class}{tyname} variable"));
                None
            }
        }
    }

    fn try_var(&mut self, arg: &Arg, ty: VarType, global: Option<bool>) -> Option<SemaArg> {
        let var_ref = match &arg.kind {
            ArgKind::Ident(name) => {
                let var = self.symbols.lookup_var(name)?;
                if var.array_len.is_some() {
                    return None;
                }
                VarRef { var, index: None }
            }
            ArgKind::Array { name, index } => self.array_ref(name, index, arg.loc)?,
            _ => return None,
        };
        if var_ref.var.ty != ty {
            return None;
        }
        if let Some(want_global) = global {
            if var_ref.var.uses_global_storage() != want_global {
                return None;
            }
        }
        Some(SemaArg::Var(var_ref))
    }

    // ---- entity tracking ----

    fn check_entity(&mut self, param: &ParamDesc, arg: &SemaArg, loc: Loc) {
        if !self.cx.opt.entity_tracking {
            return;
        }
        let Some(expected) = param.entity else { return };
        let SemaArg::Var(var_ref) = arg else { return };
        let var = &var_ref.var;
        match self.symbols.entity_of(var) {
            None => self.symbols.set_entity(var, expected),
            Some(actual) if actual != expected => {
                let have = self.cx.commands.entity_name(actual).to_string();
                let want = self.cx.commands.entity_name(expected).to_string();
                self.error(
                    loc,
                    &format!("variable '{}' holds a {have}, but a {want} is expected", var.name),
                );
            }
            Some(_) => {}
        }
    }
}

fn var_arg_type(var: &Arc<Var>) -> ArgType {
    match (var.uses_global_storage(), var.ty) {
        (true, VarType::Int) => ArgType::GlobalVarInt,
        (true, VarType::Float) => ArgType::GlobalVarFloat,
        (true, VarType::TextLabel) => ArgType::GlobalVarTextLabel,
        (false, VarType::Int) => ArgType::LocalVarInt,
        (false, VarType::Float) => ArgType::LocalVarFloat,
        (false, VarType::TextLabel) => ArgType::LocalVarTextLabel,
    }
}

fn condition_command_name(name: &str) -> bool {
    ["IS_", "HAS_", "CAN_", "ARE_", "LOCATE_"].iter().any(|p| name.starts_with(p))
}

fn args_textually_equal(a: &Arg, b: &Arg) -> bool {
    match (&a.kind, &b.kind) {
        (ArgKind::Ident(x), ArgKind::Ident(y)) => x == y,
        (
            ArgKind::Array { name: x, index: ix },
            ArgKind::Array { name: y, index: iy },
        ) => {
            x == y
                && match (ix, iy) {
                    (ArrayIndex::Literal(i), ArrayIndex::Literal(j)) => i == j,
                    (ArrayIndex::Ident(i), ArrayIndex::Ident(j)) => i == j,
                    _ => false,
                }
        }
        _ => false,
    }
}
