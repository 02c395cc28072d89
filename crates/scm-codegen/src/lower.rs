//! Control-flow lowering: structured statements to labeled linear IR.

use scm_config::{CommandId, ProgramContext};
use scm_sema::{SemaArg, SemaCommand, SemaConds, SemaScript, SemaStmt, SwitchArm, VarIndex, VarRef};
use scm_syntax::ast::{CondJoin, VarType};
use scm_syntax::diag::{DiagContext, Halted};

use crate::ir::{IndexVar, Instr, IrItem, LabelId, Operand, ScriptIr};

/// `SWITCH_START` carries seven `(value, label)` slots.
const SWITCH_START_SLOTS: usize = 7;
/// Each `SWITCH_CONTINUED` carries nine more.
const SWITCH_CONTINUED_SLOTS: usize = 9;
/// `OR` condition lists bias the `ANDOR` argument by 20.
const ANDOR_OR_BASE: i32 = 20;

pub fn lower(cx: &ProgramContext, script: &SemaScript) -> Result<ScriptIr, Halted> {
    let ctx = DiagContext::Script(script.file.path.clone());
    let (goto_, _) = cx.supported_or_fatal(&ctx, "GOTO")?;
    let (goto_if_false, _) = cx.supported_or_fatal(&ctx, "GOTO_IF_FALSE")?;
    let (andor, _) = cx.supported_or_fatal(&ctx, "ANDOR")?;

    let mut lowerer = Lowerer {
        cx,
        ctx,
        items: Vec::new(),
        label_count: script.label_count,
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
        goto_,
        goto_if_false,
        andor,
    };
    for stmt in &script.body {
        lowerer.stmt(stmt)?;
    }
    let label_count = lowerer.label_count;
    Ok(ScriptIr {
        name: script.name.clone(),
        kind: script.kind,
        items: lowerer.items,
        label_count,
        label_names: vec![None; label_count as usize],
        storage_watermark: script.storage_watermark,
    })
}

struct Lowerer<'a> {
    cx: &'a ProgramContext,
    ctx: DiagContext,
    items: Vec<IrItem>,
    label_count: u32,
    break_targets: Vec<LabelId>,
    continue_targets: Vec<LabelId>,
    goto_: CommandId,
    goto_if_false: CommandId,
    andor: CommandId,
}

impl<'a> Lowerer<'a> {
    fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.label_count);
        self.label_count += 1;
        id
    }

    fn label(&mut self, id: LabelId) {
        self.items.push(IrItem::Label(id));
    }

    fn emit(&mut self, command: CommandId, not: bool, args: Vec<Operand>) {
        self.items.push(IrItem::Instr(Instr { command, not, args }));
    }

    fn goto(&mut self, target: LabelId) {
        self.emit(self.goto_, false, vec![Operand::Label(target)]);
    }

    fn goto_if_false(&mut self, target: LabelId) {
        self.emit(self.goto_if_false, false, vec![Operand::Label(target)]);
    }

    fn command(&mut self, cmd: &SemaCommand) {
        let args = cmd.args.iter().map(operand).collect();
        self.emit(cmd.command, cmd.not, args);
    }

    /// Emits a condition list: the `ANDOR` prelude, the condition
    /// commands, then the jump taken when the list is false.
    fn conds(&mut self, conds: &SemaConds, false_target: LabelId, fused: bool) {
        if !fused && !conds.conds.is_empty() {
            let value = match conds.join {
                CondJoin::Single => 0,
                CondJoin::And => conds.conds.len() as i32 - 1,
                CondJoin::Or => ANDOR_OR_BASE + conds.conds.len() as i32 - 1,
            };
            self.emit(self.andor, false, vec![Operand::Int(value)]);
        }
        for cond in &conds.conds {
            self.command(cond);
        }
        self.goto_if_false(false_target);
    }

    fn stmt(&mut self, stmt: &SemaStmt) -> Result<(), Halted> {
        match stmt {
            SemaStmt::Command(cmd) => self.command(cmd),
            SemaStmt::Label(id) => self.label(LabelId(*id)),
            SemaStmt::If { conds, then_body, else_body } => {
                let fused = self.cx.opt.skip_single_ifs
                    && conds.conds.len() == 1
                    && then_body.len() == 1
                    && else_body.is_none();
                let else_or_end = self.new_label();
                self.conds(conds, else_or_end, fused);
                for s in then_body {
                    self.stmt(s)?;
                }
                if let Some(else_body) = else_body {
                    let end = self.new_label();
                    self.goto(end);
                    self.label(else_or_end);
                    for s in else_body {
                        self.stmt(s)?;
                    }
                    self.label(end);
                } else {
                    self.label(else_or_end);
                }
            }
            SemaStmt::While { conds, body } => {
                let top = self.new_label();
                let end = self.new_label();
                self.label(top);
                self.conds(conds, end, false);
                self.break_targets.push(end);
                self.continue_targets.push(top);
                for s in body {
                    self.stmt(s)?;
                }
                self.continue_targets.pop();
                self.break_targets.pop();
                self.goto(top);
                self.label(end);
            }
            SemaStmt::Repeat { init, add, check, body } => {
                let top = self.new_label();
                let next = self.new_label();
                let end = self.new_label();
                self.command(init);
                self.label(top);
                self.break_targets.push(end);
                self.continue_targets.push(next);
                for s in body {
                    self.stmt(s)?;
                }
                self.continue_targets.pop();
                self.break_targets.pop();
                self.label(next);
                self.command(add);
                self.command(check);
                self.goto_if_false(top);
                self.label(end);
            }
            SemaStmt::Switch { var, cases, default, loc: _ } => {
                self.switch(var, cases, default.as_deref())?;
            }
            SemaStmt::Break(_) => {
                if let Some(&target) = self.break_targets.last() {
                    self.goto(target);
                }
            }
            SemaStmt::Continue(_) => {
                if let Some(&target) = self.continue_targets.last() {
                    self.goto(target);
                }
            }
        }
        Ok(())
    }

    /// The `SWITCH` kernel: a packed `SWITCH_START` (seven slots) plus as
    /// many nine-slot `SWITCH_CONTINUED`s as the case count demands, the
    /// table sorted ascending, unused slots padded with `(-1, @end)`.
    fn switch(
        &mut self,
        var: &VarRef,
        cases: &[SwitchArm],
        default: Option<&[SemaStmt]>,
    ) -> Result<(), Halted> {
        let (switch_start, _) = self.cx.supported_or_fatal(&self.ctx, "SWITCH_START")?;
        let (switch_continued, _) = self.cx.supported_or_fatal(&self.ctx, "SWITCH_CONTINUED")?;

        let end = self.new_label();
        let default_label = if default.is_some() { self.new_label() } else { end };
        let case_labels: Vec<LabelId> = cases.iter().map(|_| self.new_label()).collect();

        let mut table: Vec<(i32, LabelId)> =
            cases.iter().zip(&case_labels).map(|(arm, &label)| (arm.value, label)).collect();
        table.sort_by_key(|&(value, _)| value);

        let mut slots = table.into_iter();
        let mut args = vec![
            var_operand(var),
            Operand::Int(cases.len() as i32),
            Operand::Label(default_label),
        ];
        push_slots(&mut args, &mut slots, SWITCH_START_SLOTS, end);
        self.emit(switch_start, false, args);

        let continued = cases.len().saturating_sub(SWITCH_START_SLOTS);
        let continued = continued.div_ceil(SWITCH_CONTINUED_SLOTS);
        for _ in 0..continued {
            let mut args = Vec::with_capacity(SWITCH_CONTINUED_SLOTS * 2);
            push_slots(&mut args, &mut slots, SWITCH_CONTINUED_SLOTS, end);
            self.emit(switch_continued, false, args);
        }

        self.break_targets.push(end);
        for (arm, &label) in cases.iter().zip(&case_labels) {
            self.label(label);
            for s in &arm.body {
                self.stmt(s)?;
            }
        }
        if let Some(body) = default {
            self.label(default_label);
            for s in body {
                self.stmt(s)?;
            }
        }
        self.break_targets.pop();
        self.label(end);
        Ok(())
    }
}

fn push_slots(
    args: &mut Vec<Operand>,
    slots: &mut impl Iterator<Item = (i32, LabelId)>,
    count: usize,
    end: LabelId,
) {
    for _ in 0..count {
        match slots.next() {
            Some((value, label)) => {
                args.push(Operand::Int(value));
                args.push(Operand::Label(label));
            }
            None => {
                args.push(Operand::Int(-1));
                args.push(Operand::Label(end));
            }
        }
    }
}

fn operand(arg: &SemaArg) -> Operand {
    match arg {
        SemaArg::Int(v) => Operand::Int(*v),
        SemaArg::Float(v) => Operand::Float(*v),
        SemaArg::Var(var_ref) => var_operand(var_ref),
        SemaArg::Label(id) => Operand::Label(LabelId(*id)),
        SemaArg::TextLabel(s) => Operand::TextLabel(s.clone()),
        SemaArg::String(s) => Operand::String(s.clone()),
        SemaArg::Model(name) => Operand::Model(name.clone()),
    }
}

fn var_operand(var_ref: &VarRef) -> Operand {
    let var = &var_ref.var;
    let global = var.uses_global_storage();
    let elem_words: u32 = if var.ty == VarType::TextLabel { 2 } else { 1 };
    match &var_ref.index {
        // literal subscripts fold into a plain variable access
        None => plain_var(global, var.index),
        Some(VarIndex::Literal(i)) => plain_var(global, var.index + *i as u32 * elem_words),
        Some(VarIndex::Var(index_var)) => {
            let index = if index_var.uses_global_storage() {
                IndexVar::Global(index_var.index * 4)
            } else {
                IndexVar::Local(index_var.index)
            };
            let len = var.array_len.unwrap_or(1).min(255) as u8;
            if global {
                Operand::GArr { offset: var.index * 4, index, len }
            } else {
                Operand::LArr { slot: var.index, index, len }
            }
        }
    }
}

fn plain_var(global: bool, word_index: u32) -> Operand {
    if global {
        Operand::GVar(word_index * 4)
    } else {
        Operand::LVar(word_index)
    }
}
