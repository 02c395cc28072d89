//! The compilation driver.
//!
//! Each script is a job. Jobs run in parallel over scoped threads; the
//! shared state is the read-only [`ProgramContext`] (diagnostic counters
//! are atomic). A fatal diagnostic halts only its own job. Two parallel
//! phases bracket the sequential global-variable collection, which must
//! see every script's declarations in a fixed order so global indices
//! are deterministic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use scm_codegen::{lower, ScriptIr};
use scm_config::ProgramContext;
use scm_sema::{analyze, collect_globals, GlobalScope};
use scm_syntax::ast::Stmt;
use scm_syntax::diag::DiagContext;
use scm_syntax::{ScriptKind, SourceFile};

pub struct InputScript {
    pub path: PathBuf,
    pub kind: ScriptKind,
}

pub struct CompiledProgram {
    pub scripts: Vec<ScriptIr>,
    pub globals_words: u32,
}

struct ParsedScript {
    kind: ScriptKind,
    file: Arc<SourceFile>,
    stmts: Vec<Stmt>,
}

struct JobOutput {
    script: Option<ScriptIr>,
    script_names: Vec<(String, DiagContext)>,
    storage_watermark: u32,
}

/// Compiles every input. Returns `None` under `--fsyntax-only` or when
/// every job failed; the caller decides the exit status from the
/// diagnostic counters either way.
pub fn compile(cx: &ProgramContext, inputs: &[InputScript]) -> Option<CompiledProgram> {
    // phase 1: read, lex and parse every script in parallel
    let parsed: Vec<Option<ParsedScript>> = thread::scope(|scope| {
        let handles: Vec<_> =
            inputs.iter().map(|input| scope.spawn(move || parse_job(cx, input))).collect();
        handles.into_iter().map(|h| h.join().expect("parse job panicked")).collect()
    });
    let parsed: Vec<ParsedScript> = parsed.into_iter().flatten().collect();

    // sequential: globals of the main script and subscripts share one
    // index space and must be collected in driver order
    let decls: Vec<(ScriptKind, Arc<SourceFile>, &[Stmt])> =
        parsed.iter().map(|p| (p.kind, Arc::clone(&p.file), p.stmts.as_slice())).collect();
    let globals = collect_globals(&decls, &cx.opt, &cx.diag);

    // phase 2: analyze and lower in parallel
    let outputs: Vec<Option<JobOutput>> = thread::scope(|scope| {
        let globals = &globals;
        let handles: Vec<_> =
            parsed.iter().map(|p| scope.spawn(move || compile_job(cx, globals, p))).collect();
        handles.into_iter().map(|h| h.join().expect("compile job panicked")).collect()
    });
    let outputs: Vec<JobOutput> = outputs.into_iter().flatten().collect();

    check_script_names(cx, &outputs);

    let mut globals_words = globals.storage_words(&cx.opt);
    for output in &outputs {
        globals_words = globals_words.max(output.storage_watermark);
    }
    let scripts: Vec<ScriptIr> = outputs.into_iter().filter_map(|o| o.script).collect();
    if scripts.is_empty() {
        return None;
    }
    Some(CompiledProgram { scripts, globals_words })
}

fn parse_job(cx: &ProgramContext, input: &InputScript) -> Option<ParsedScript> {
    let text = match std::fs::read_to_string(&input.path) {
        Ok(text) => text,
        Err(err) => {
            cx.diag.error(
                &DiagContext::Script(input.path.clone()),
                &format!("cannot open file: {err}"),
            );
            return None;
        }
    };
    let file = SourceFile::new(input.path.clone(), text);
    let lines = scm_lexer::Lexer::new(&file, &cx.opt, &cx.diag).tokenize();
    let stmts = scm_parser::Parser::new(&lines, &file, &cx.diag).parse_program(input.kind);
    Some(ParsedScript { kind: input.kind, file, stmts })
}

fn compile_job(cx: &ProgramContext, globals: &GlobalScope, parsed: &ParsedScript) -> Option<JobOutput> {
    let sema = analyze(cx, globals, &parsed.file, parsed.kind, &parsed.stmts).ok()?;
    let script_names = sema.script_names.clone();
    let storage_watermark = sema.storage_watermark;
    let script = if cx.opt.fsyntax_only { None } else { Some(lower(cx, &sema).ok()?) };
    Some(JobOutput { script, script_names, storage_watermark })
}

/// Every `SCRIPT_NAME` must be unique across the whole program; the
/// duplicate diagnostic points at both uses.
fn check_script_names(cx: &ProgramContext, outputs: &[JobOutput]) {
    if !cx.opt.script_name_check {
        return;
    }
    let mut seen: HashMap<&str, &DiagContext> = HashMap::new();
    for output in outputs {
        for (name, context) in &output.script_names {
            match seen.get(name.as_str()) {
                Some(first) => {
                    cx.diag.error(context, &format!("duplicate SCRIPT_NAME '{name}'"));
                    cx.diag.note(first, "previously used here");
                }
                None => {
                    seen.insert(name, context);
                }
            }
        }
    }
}
