//! Textual IR2 emission.
//!
//! One instruction per line, one token per operand: `100i8`, `200i16`,
//! `1.5f`, `&8` (global at byte offset 8), `1@` (local slot 1),
//! `@MAIN_5` (label reference), `MAIN_5:` (label definition). Labels are
//! mangled `{SCRIPT}_{seq}` with `seq` starting at 1 per script in
//! emission order; names carried over from IR2 input are kept.

use std::fmt::Write;

use scm_config::ProgramContext;
use scm_syntax::diag::{DiagContext, Halted};
use scm_syntax::ScriptKind;

use crate::ir::{int_width, IndexVar, Instr, IntWidth, IrItem, Operand, ScriptIr, UsedModels};

pub fn emit_ir2(cx: &ProgramContext, scripts: &[ScriptIr]) -> Result<String, Halted> {
    let mut out = String::new();
    let mut models = UsedModels::new();
    let mut mission_index = 0u32;
    let mut streamed_index = 0u32;
    for script in scripts {
        match script.kind {
            ScriptKind::Mission => {
                let _ = writeln!(out, "#MISSION_BLOCK_START {mission_index}");
                emit_script(cx, script, &mut models, &mut out)?;
                let _ = writeln!(out, "#MISSION_BLOCK_END");
                mission_index += 1;
            }
            ScriptKind::Streamed => {
                let _ = writeln!(out, "#STREAMED_BLOCK_START {streamed_index}");
                emit_script(cx, script, &mut models, &mut out)?;
                let _ = writeln!(out, "#STREAMED_BLOCK_END");
                streamed_index += 1;
            }
            _ => emit_script(cx, script, &mut models, &mut out)?,
        }
    }
    Ok(out)
}

fn emit_script(
    cx: &ProgramContext,
    script: &ScriptIr,
    models: &mut UsedModels,
    out: &mut String,
) -> Result<(), Halted> {
    let names = label_names(cx, script)?;
    for item in &script.items {
        match item {
            IrItem::Label(id) => {
                let _ = writeln!(out, "{}:", names[id.0 as usize]);
            }
            IrItem::Instr(instr) => {
                emit_instr(cx, instr, &names, models, out);
            }
        }
    }
    Ok(())
}

/// Assigns every label its printed name, in definition order. A label
/// referenced but never defined is a compiler bug.
fn label_names(cx: &ProgramContext, script: &ScriptIr) -> Result<Vec<String>, Halted> {
    let mut names: Vec<Option<String>> = script.label_names.clone();
    names.resize(script.label_count as usize, None);
    let mut seq = 1u32;
    for item in &script.items {
        if let IrItem::Label(id) = item {
            let slot = &mut names[id.0 as usize];
            if slot.is_none() {
                *slot = Some(format!("{}_{}", script.name, seq));
                seq += 1;
            }
        }
    }
    let mut defined = vec![false; script.label_count as usize];
    for item in &script.items {
        if let IrItem::Label(id) = item {
            defined[id.0 as usize] = true;
        }
    }
    for item in &script.items {
        if let IrItem::Instr(instr) = item {
            for arg in &instr.args {
                if let Operand::Label(id) = arg {
                    if !defined[id.0 as usize] {
                        return Err(cx.diag.internal_error(
                            &DiagContext::None,
                            &format!("unresolved label in script '{}'", script.name),
                        ));
                    }
                }
            }
        }
    }
    Ok(names.into_iter().map(|n| n.unwrap_or_default()).collect())
}

fn emit_instr(
    cx: &ProgramContext,
    instr: &Instr,
    names: &[String],
    models: &mut UsedModels,
    out: &mut String,
) {
    if instr.not {
        out.push_str("NOT ");
    }
    out.push_str(&cx.commands.command(instr.command).name);
    for arg in &instr.args {
        out.push(' ');
        emit_operand(arg, names, models, out);
    }
    out.push('\n');
}

fn emit_operand(arg: &Operand, names: &[String], models: &mut UsedModels, out: &mut String) {
    match arg {
        Operand::Int(v) => emit_int(*v, out),
        Operand::Float(v) => {
            let _ = write!(out, "{v:?}f");
        }
        Operand::GVar(offset) => {
            let _ = write!(out, "&{offset}");
        }
        Operand::LVar(slot) => {
            let _ = write!(out, "{slot}@");
        }
        Operand::GArr { offset, index, len } => {
            let _ = write!(out, "&{offset}({},{len}i)", index_str(index));
        }
        Operand::LArr { slot, index, len } => {
            let _ = write!(out, "{slot}@({},{len}i)", index_str(index));
        }
        Operand::TextLabel(s) => out.push_str(s),
        Operand::String(s) => {
            let _ = write!(out, "\"{s}\"");
        }
        Operand::Label(id) => {
            let _ = write!(out, "@{}", names[id.0 as usize]);
        }
        Operand::Model(name) => emit_int(models.value_of(name), out),
    }
}

fn emit_int(v: i32, out: &mut String) {
    let suffix = match int_width(v) {
        IntWidth::I8 => "i8",
        IntWidth::I16 => "i16",
        IntWidth::I32 => "i32",
    };
    let _ = write!(out, "{v}{suffix}");
}

fn index_str(index: &IndexVar) -> String {
    match index {
        IndexVar::Global(offset) => format!("&{offset}"),
        IndexVar::Local(slot) => format!("{slot}@"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lower::lower;
    use scm_config::{xml, Game, ModelRegistry, Options, ProgramContext};
    use scm_sema::{analyze, collect_globals};
    use scm_syntax::diag::{Diagnostics, Reporter, Severity};
    use scm_syntax::source::SourceFile;
    use std::sync::Arc;

    pub(crate) const TEST_DB: &str = r#"
        <GTA3Script>
          <Commands>
            <Command Name="NOP" ID="0x0000"/>
            <Command Name="WAIT" ID="0x0001"><Args><Arg Type="INPUT_INT"/></Args></Command>
            <Command Name="GOTO" ID="0x0002"><Args><Arg Type="LABEL"/></Args></Command>
            <Command Name="GOTO_IF_FALSE" ID="0x004D" IsKeyword="true"><Args><Arg Type="LABEL"/></Args></Command>
            <Command Name="ANDOR" ID="0x00D6" IsKeyword="true"><Args><Arg Type="INT"/></Args></Command>
            <Command Name="TERMINATE_THIS_SCRIPT" ID="0x004E"/>
            <Command Name="SCRIPT_NAME" ID="0x03A4"><Args><Arg Type="TEXT_LABEL"/></Args></Command>
            <Command Name="PRINT_HELP" ID="0x03E5"><Args><Arg Type="TEXT_LABEL"/></Args></Command>
            <Command Name="SAVE_STRING_TO_DEBUG_FILE" ID="0x05B8"><Args><Arg Type="STRING"/></Args></Command>
            <Command Name="SWITCH_START" ID="0x0871" IsKeyword="true">
              <Args>
                <Arg Type="INPUT_INT"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/>
              </Args>
            </Command>
            <Command Name="SWITCH_CONTINUED" ID="0x0872" IsKeyword="true">
              <Args>
                <Arg Type="INT"/><Arg Type="LABEL"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/><Arg Type="INT"/><Arg Type="LABEL"/>
                <Arg Type="INT"/><Arg Type="LABEL"/>
              </Args>
            </Command>
            <Command Name="SET_VAR_INT" ID="0x0004"><Args><Arg Type="VAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="SET_LVAR_INT" ID="0x0006"><Args><Arg Type="LVAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="SET_VAR_FLOAT" ID="0x0005"><Args><Arg Type="VAR_FLOAT"/><Arg Type="FLOAT"/></Args></Command>
            <Command Name="ADD_VAL_TO_INT_VAR" ID="0x0008"><Args><Arg Type="VAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="ADD_VAL_TO_INT_LVAR" ID="0x000A"><Args><Arg Type="LVAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="IS_INT_VAR_EQUAL_TO_NUMBER" ID="0x0038"><Args><Arg Type="VAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="IS_INT_LVAR_EQUAL_TO_NUMBER" ID="0x0039"><Args><Arg Type="LVAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="IS_INT_VAR_GREATER_THAN_NUMBER" ID="0x0018"><Args><Arg Type="VAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="IS_NUMBER_GREATER_THAN_INT_VAR" ID="0x001C"><Args><Arg Type="INT"/><Arg Type="VAR_INT"/></Args></Command>
            <Command Name="IS_INT_VAR_GREATER_OR_EQUAL_TO_NUMBER" ID="0x0028"><Args><Arg Type="VAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="IS_INT_LVAR_GREATER_OR_EQUAL_TO_NUMBER" ID="0x0029"><Args><Arg Type="LVAR_INT"/><Arg Type="INT"/></Args></Command>
            <Command Name="CREATE_CAR" ID="0x00A5">
              <Args>
                <Arg Type="INPUT_INT" Enum="MODEL"/>
                <Arg Type="INPUT_FLOAT"/><Arg Type="INPUT_FLOAT"/><Arg Type="INPUT_FLOAT"/>
                <Arg Type="OUTPUT_INT" Entity="CAR"/>
              </Args>
            </Command>
          </Commands>
          <Alternators>
            <Alternator Name="SET">
              <Alternative Command="SET_VAR_INT"/>
              <Alternative Command="SET_LVAR_INT"/>
              <Alternative Command="SET_VAR_FLOAT"/>
            </Alternator>
            <Alternator Name="ADD_THING_TO_THING">
              <Alternative Command="ADD_VAL_TO_INT_VAR"/>
              <Alternative Command="ADD_VAL_TO_INT_LVAR"/>
            </Alternator>
            <Alternator Name="IS_THING_EQUAL_TO_THING">
              <Alternative Command="IS_INT_VAR_EQUAL_TO_NUMBER"/>
              <Alternative Command="IS_INT_LVAR_EQUAL_TO_NUMBER"/>
            </Alternator>
            <Alternator Name="IS_THING_GREATER_THAN_THING">
              <Alternative Command="IS_INT_VAR_GREATER_THAN_NUMBER"/>
              <Alternative Command="IS_NUMBER_GREATER_THAN_INT_VAR"/>
            </Alternator>
            <Alternator Name="IS_THING_GREATER_OR_EQUAL_TO_THING">
              <Alternative Command="IS_INT_VAR_GREATER_OR_EQUAL_TO_NUMBER"/>
              <Alternative Command="IS_INT_LVAR_GREATER_OR_EQUAL_TO_NUMBER"/>
            </Alternator>
          </Alternators>
          <Enums>
            <Enum Name="MODEL">
              <Constant Name="CELLPHONE" Value="258"/>
            </Enum>
          </Enums>
        </GTA3Script>
    "#;

    struct NullReporter;
    impl Reporter for NullReporter {
        fn report(&self, _s: Severity, _r: &str) {}
    }

    pub(crate) fn test_context(mutate: impl FnOnce(&mut Options)) -> ProgramContext {
        let mut opt = Options::for_game(Game::GtaSa);
        opt.fswitch = true;
        mutate(&mut opt);
        let mut models = ModelRegistry::new();
        scm_config::models::load_ide_str(
            "objs\n90, LANDSTAL, generic, 1, 150, 0\nend\n",
            false,
            &mut models,
        );
        ProgramContext::new(
            opt,
            xml::load_commands_str(TEST_DB).unwrap(),
            models,
            Diagnostics::new(Box::new(NullReporter)),
        )
    }

    pub(crate) fn compile_main(cx: &ProgramContext, src: &str) -> ScriptIr {
        let file = SourceFile::new("main.sc", src);
        let lines = scm_lexer::Lexer::new(&file, &cx.opt, &cx.diag).tokenize();
        let stmts = scm_parser::Parser::new(&lines, &file, &cx.diag)
            .parse_program(scm_syntax::ScriptKind::Main);
        let globals = collect_globals(
            &[(scm_syntax::ScriptKind::Main, Arc::clone(&file), &stmts)],
            &cx.opt,
            &cx.diag,
        );
        let sema = analyze(cx, &globals, &file, scm_syntax::ScriptKind::Main, &stmts).unwrap();
        lower(cx, &sema).unwrap()
    }

    fn compile_ir2(src: &str) -> String {
        let cx = test_context(|_| {});
        let script = compile_main(&cx, src);
        assert!(!cx.diag.has_errors(), "unexpected diagnostics");
        emit_ir2(&cx, &[script]).unwrap()
    }

    #[test]
    fn plain_commands() {
        let ir2 = compile_ir2("start:\nWAIT 0\nGOTO start\n");
        assert_eq!(ir2, "MAIN_1:\nWAIT 0i8\nGOTO @MAIN_1\n");
    }

    #[test]
    fn integer_width_suffixes() {
        let ir2 = compile_ir2("WAIT 0\nWAIT 200\nWAIT 40000\n");
        assert_eq!(ir2, "WAIT 0i8\nWAIT 200i16\nWAIT 40000i32\n");
    }

    #[test]
    fn variables_and_floats() {
        let ir2 = compile_ir2("VAR_INT a b\nVAR_FLOAT f\nb = 5\nf = 1.5\n{\nLVAR_INT x\nx = 1\n}\n");
        assert_eq!(ir2, "SET_VAR_INT &4 5i8\nSET_VAR_FLOAT &8 1.5f\nSET_LVAR_INT 0@ 1i8\n");
    }

    #[test]
    fn if_else_shape() {
        let ir2 = compile_ir2("VAR_INT x\nIF x = 0\nWAIT 0\nELSE\nWAIT 1\nENDIF\n");
        assert_eq!(
            ir2,
            "ANDOR 0i8\n\
             IS_INT_VAR_EQUAL_TO_NUMBER &0 0i8\n\
             GOTO_IF_FALSE @MAIN_1\n\
             WAIT 0i8\n\
             GOTO @MAIN_2\n\
             MAIN_1:\n\
             WAIT 1i8\n\
             MAIN_2:\n"
        );
    }

    #[test]
    fn skip_single_ifs_elides_the_andor() {
        let cx = test_context(|opt| opt.skip_single_ifs = true);
        let script = compile_main(&cx, "VAR_INT x\nIF x = 0\nWAIT 0\nENDIF\n");
        let ir2 = emit_ir2(&cx, &[script]).unwrap();
        assert_eq!(
            ir2,
            "IS_INT_VAR_EQUAL_TO_NUMBER &0 0i8\n\
             GOTO_IF_FALSE @MAIN_1\n\
             WAIT 0i8\n\
             MAIN_1:\n"
        );
    }

    #[test]
    fn while_shape() {
        let ir2 = compile_ir2("VAR_INT x\nWHILE x < 10\nx += 1\nENDWHILE\n");
        assert_eq!(
            ir2,
            "MAIN_1:\n\
             ANDOR 0i8\n\
             IS_NUMBER_GREATER_THAN_INT_VAR 10i8 &0\n\
             GOTO_IF_FALSE @MAIN_2\n\
             ADD_VAL_TO_INT_VAR &0 1i8\n\
             GOTO @MAIN_1\n\
             MAIN_2:\n"
        );
    }

    #[test]
    fn repeat_shape() {
        let ir2 = compile_ir2("VAR_INT i\nREPEAT 3 i\nWAIT 0\nENDREPEAT\n");
        assert_eq!(
            ir2,
            "SET_VAR_INT &0 0i8\n\
             MAIN_1:\n\
             WAIT 0i8\n\
             MAIN_2:\n\
             ADD_VAL_TO_INT_VAR &0 1i8\n\
             IS_INT_VAR_GREATER_OR_EQUAL_TO_NUMBER &0 3i8\n\
             GOTO_IF_FALSE @MAIN_1\n\
             MAIN_3:\n"
        );
    }

    #[test]
    fn and_list_emits_andor_value() {
        let ir2 = compile_ir2("VAR_INT x y\nIF x = 0\nAND y = 1\nWAIT 0\nENDIF\n");
        assert!(ir2.starts_with("ANDOR 1i8\n"));
        let ir2 = compile_ir2("VAR_INT x y\nIF x = 0\nOR y = 1\nWAIT 0\nENDIF\n");
        assert!(ir2.starts_with("ANDOR 21i8\n"));
    }

    #[test]
    fn negated_condition_prints_not() {
        let ir2 = compile_ir2("VAR_INT x\nIF NOT x = 0\nWAIT 0\nENDIF\n");
        assert!(ir2.contains("NOT IS_INT_VAR_EQUAL_TO_NUMBER &0 0i8\n"));
    }

    // Switch scenario: out-of-order cases with a default, under seven
    // cases. One SWITCH_START, count 4, default label first, table
    // sorted ascending, three sentinel slots aimed at the end label.
    #[test]
    fn switch_with_default_under_seven_cases() {
        let ir2 = compile_ir2(
            "VAR_INT x\nSWITCH x\n\
             CASE 100\nWAIT 100\nBREAK\n\
             CASE 200\nWAIT 200\nBREAK\n\
             CASE 300\nWAIT 300\nBREAK\n\
             CASE 50\nWAIT 50\nBREAK\n\
             DEFAULT\nWAIT 0\nBREAK\n\
             ENDSWITCH\n",
        );
        // case bodies are emitted in source order, so their labels are
        // named MAIN_1..MAIN_4 (100, 200, 300, 50), the default body is
        // MAIN_5 and the end label MAIN_6
        let first_line = ir2.lines().next().unwrap();
        assert_eq!(
            first_line,
            "SWITCH_START &0 4i8 @MAIN_5 50i8 @MAIN_4 100i8 @MAIN_1 200i8 @MAIN_2 300i16 @MAIN_3 \
             -1i8 @MAIN_6 -1i8 @MAIN_6 -1i8 @MAIN_6"
        );
        assert!(!ir2.contains("SWITCH_CONTINUED"));
        // bodies stay in source order, default last, end label closes
        let body_order: Vec<&str> =
            ir2.lines().filter(|l| l.starts_with("WAIT")).collect();
        assert_eq!(body_order, vec!["WAIT 100i8", "WAIT 200i16", "WAIT 300i16", "WAIT 50i8", "WAIT 0i8"]);
        assert!(ir2.trim_end().ends_with("MAIN_6:"));
    }

    // Switch scenario: no default; the end label doubles as the default
    // and fills the four sentinel slots.
    #[test]
    fn switch_without_default() {
        let ir2 = compile_ir2(
            "VAR_INT x\nSWITCH x\n\
             CASE 100\nWAIT 100\nBREAK\n\
             CASE 200\nWAIT 200\nBREAK\n\
             CASE 50\nWAIT 50\nBREAK\n\
             ENDSWITCH\n",
        );
        // end label (MAIN_4) doubles as the default label
        let first_line = ir2.lines().next().unwrap();
        assert_eq!(
            first_line,
            "SWITCH_START &0 3i8 @MAIN_4 50i8 @MAIN_3 100i8 @MAIN_1 200i8 @MAIN_2 \
             -1i8 @MAIN_4 -1i8 @MAIN_4 -1i8 @MAIN_4 -1i8 @MAIN_4"
        );
    }

    // Switch scenario: nine cases overflow into one SWITCH_CONTINUED
    // with two live slots and seven sentinels.
    #[test]
    fn switch_with_nine_cases_overflows() {
        let mut src = String::from("VAR_INT x\nSWITCH x\n");
        for i in 1..=9 {
            src.push_str(&format!("CASE {}\nWAIT {}\nBREAK\n", i * 100, i * 100));
        }
        src.push_str("ENDSWITCH\n");
        let ir2 = compile_ir2(&src);
        let lines: Vec<&str> = ir2.lines().collect();
        // nine case bodies name MAIN_1..MAIN_9; the end label, which is
        // also the default, becomes MAIN_10
        assert!(lines[0].starts_with("SWITCH_START &0 9i8 @MAIN_10 100i8 @MAIN_1"));
        assert!(lines[1].starts_with("SWITCH_CONTINUED 800i16 @MAIN_8 900i16 @MAIN_9"));
        let sentinels = lines[1].matches("-1i8 @MAIN_10").count();
        assert_eq!(sentinels, 7);
        assert_eq!(ir2.matches("SWITCH_CONTINUED").count(), 1);
    }

    #[test]
    fn switch_case_width_is_minimal_per_value() {
        let ir2 = compile_ir2(
            "VAR_INT x\nSWITCH x\n\
             CASE 5\nWAIT 0\nBREAK\n\
             CASE 300\nWAIT 0\nBREAK\n\
             CASE 70000\nWAIT 0\nBREAK\n\
             ENDSWITCH\n",
        );
        let first_line = ir2.lines().next().unwrap();
        assert!(first_line.contains(" 5i8 "));
        assert!(first_line.contains(" 300i16 "));
        assert!(first_line.contains(" 70000i32 "));
    }

    #[test]
    fn break_in_switch_jumps_to_the_end_label() {
        let ir2 = compile_ir2(
            "VAR_INT x\nSWITCH x\nCASE 1\nWAIT 0\nBREAK\nENDSWITCH\n",
        );
        // the case body is MAIN_1, the end label MAIN_2; BREAK becomes a
        // GOTO to the end label
        assert!(ir2.contains("GOTO @MAIN_2\n"));
        assert!(ir2.trim_end().ends_with("MAIN_2:"));
    }

    #[test]
    fn model_arguments_use_the_used_models_table() {
        let ir2 = compile_ir2(
            "VAR_INT car\nCREATE_CAR LANDSTAL 0.0 0.0 0.0 car\nCREATE_CAR CELLPHONE 0.0 0.0 0.0 car\n",
        );
        assert!(ir2.contains("CREATE_CAR -1i8 0.0f 0.0f 0.0f &0\n"));
        assert!(ir2.contains("CREATE_CAR 258i16 0.0f 0.0f 0.0f &0\n"));
    }

    #[test]
    fn text_labels_and_strings() {
        let ir2 = compile_ir2("PRINT_HELP INTRO_1\nSAVE_STRING_TO_DEBUG_FILE \"Hello World\"\n");
        assert_eq!(ir2, "PRINT_HELP INTRO_1\nSAVE_STRING_TO_DEBUG_FILE \"Hello World\"\n");
    }

    #[test]
    fn array_access_operands() {
        let ir2 = compile_ir2(
            "VAR_INT grid[10]\nVAR_INT i\ngrid[3] = 1\ngrid[i] = 2\n",
        );
        assert_eq!(ir2, "SET_VAR_INT &12 1i8\nSET_VAR_INT &0(&40,10i) 2i8\n");
    }
}
