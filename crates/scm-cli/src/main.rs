mod driver;
mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};

use scm_codegen::{emit_binary, emit_ir2, parse_ir2};
use scm_config::{models, xml, Game, Options, ProgramContext};
use scm_syntax::diag::Diagnostics;
use scm_syntax::ScriptKind;

use driver::InputScript;
use report::ColorReporter;

#[derive(Parser, Debug)]
#[command(name = "scmc", version, about = "GTA3script compiler")]
struct Cli {
    /// The main script (or an IR2 listing with --lang=ir2)
    input: PathBuf,

    /// Output file; defaults to the input stem plus .scm/.ir2/.cs
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Target game: decides the command set and header layout
    #[arg(long = "config", value_enum, default_value_t = GameArg::Gtasa)]
    config: GameArg,

    /// Directory holding commands.xml and default.ide
    #[arg(long = "config-path")]
    config_path: Option<PathBuf>,

    /// Input language
    #[arg(long = "lang", value_enum, default_value_t = LangArg::Gta3script)]
    lang: LangArg,

    /// Compile FILE as a subscript (repeatable)
    #[arg(long = "subscript", value_name = "FILE")]
    subscripts: Vec<PathBuf>,

    /// Compile FILE as a mission, indexed in the given order (repeatable)
    #[arg(long = "mission", value_name = "FILE")]
    missions: Vec<PathBuf>,

    /// Compile FILE as a streamed script (San Andreas, repeatable)
    #[arg(long = "streamed", value_name = "FILE")]
    streamed: Vec<PathBuf>,

    /// Load level models from an IDE file (repeatable)
    #[arg(long = "ide", value_name = "FILE")]
    ides: Vec<PathBuf>,

    /// Load level models from the IDE files a DAT file lists
    #[arg(long = "levelfile", value_name = "FILE")]
    levelfile: Option<PathBuf>,

    /// Infer variable types from their first use
    #[arg(long)]
    guesser: bool,

    /// Escalate nonstandard usage to errors
    #[arg(long)]
    pedantic: bool,

    /// Emit textual IR2 instead of binary SCM
    #[arg(long = "emit-ir2")]
    emit_ir2: bool,

    /// Parse and analyze only; no output
    #[arg(long = "fsyntax-only")]
    fsyntax_only: bool,

    /// Enable the SWITCH statement
    #[arg(long = "fswitch")]
    fswitch: bool,

    /// Enable array syntax
    #[arg(long = "farrays")]
    farrays: bool,

    /// Open scopes before binding their labels
    #[arg(long = "fscope-then-label")]
    fscope_then_label: bool,

    /// Allow BREAK and CONTINUE inside WHILE/REPEAT
    #[arg(long = "allow-break-continue")]
    allow_break_continue: bool,

    /// Allow NOT on commands not known to be conditions
    #[arg(long = "relax-not")]
    relax_not: bool,

    /// Store 0.0 literals in the smallest encoding
    #[arg(long = "optimize-zero-floats")]
    optimize_zero_floats: bool,

    /// Emit CLEO output (headerless, local offsets), version N
    #[arg(long = "cleo", value_name = "N", num_args = 0..=1, require_equals = true, default_missing_value = "3")]
    cleo: Option<u8>,

    /// Omit the SCM header
    #[arg(long)]
    headerless: bool,

    /// Emit the streamed-script table (San Andreas)
    #[arg(long = "streamed-scripts")]
    streamed_scripts: bool,

    /// First word index of the mission-variable region
    #[arg(long = "mission-var-begin", value_name = "N")]
    mission_var_begin: Option<u32>,

    /// Maximum cases per SWITCH
    #[arg(long = "switch-case-limit", value_name = "N")]
    switch_case_limit: Option<u32>,

    /// Predefine a preprocessor symbol
    #[arg(short = 'D', value_name = "SYM[=VAL]")]
    defines: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GameArg {
    Gta3,
    Gtavc,
    Gtasa,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum LangArg {
    Gta3script,
    Ir2,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("scmc: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let game = match cli.config {
        GameArg::Gta3 => Game::Gta3,
        GameArg::Gtavc => Game::GtaVc,
        GameArg::Gtasa => Game::GtaSa,
    };
    let opt = build_options(&cli, game);

    let config_dir = resolve_config_dir(cli.config_path.clone(), game);
    let commands_path = config_dir.join("commands.xml");
    let commands = xml::load_commands(&commands_path)
        .with_context(|| format!("cannot load {}", commands_path.display()))?;

    let mut registry = models::ModelRegistry::new();
    let default_ide = config_dir.join("default.ide");
    if default_ide.exists() {
        models::load_ide(&default_ide, true, &mut registry)
            .with_context(|| format!("cannot load {}", default_ide.display()))?;
    }
    for ide in &cli.ides {
        models::load_ide(ide, false, &mut registry)
            .with_context(|| format!("cannot load {}", ide.display()))?;
    }
    if let Some(dat) = &cli.levelfile {
        models::load_dat(dat, false, &mut registry)
            .with_context(|| format!("cannot load {}", dat.display()))?;
    }

    if !cli.streamed.is_empty() && !opt.streamed_scripts {
        bail!("--streamed requires --streamed-scripts");
    }

    let emit_ir2_out = opt.emit_ir2;
    let cleo = opt.cleo;
    let fsyntax_only = opt.fsyntax_only;
    let cx = ProgramContext::new(opt, commands, registry, Diagnostics::new(Box::new(ColorReporter::new())));

    let program = match cli.lang {
        LangArg::Gta3script => {
            let mut inputs = vec![InputScript { path: cli.input.clone(), kind: ScriptKind::Main }];
            inputs.extend(
                cli.subscripts
                    .iter()
                    .map(|p| InputScript { path: p.clone(), kind: ScriptKind::Subscript }),
            );
            inputs.extend(
                cli.missions
                    .iter()
                    .map(|p| InputScript { path: p.clone(), kind: ScriptKind::Mission }),
            );
            inputs.extend(
                cli.streamed
                    .iter()
                    .map(|p| InputScript { path: p.clone(), kind: ScriptKind::Streamed }),
            );
            driver::compile(&cx, &inputs)
        }
        LangArg::Ir2 => {
            let text = std::fs::read_to_string(&cli.input)
                .with_context(|| format!("cannot open {}", cli.input.display()))?;
            match parse_ir2(&cx, &cli.input, &text) {
                Ok(scripts) if !scripts.is_empty() => {
                    let globals_words =
                        scripts.iter().map(|s| s.storage_watermark).max().unwrap_or(0);
                    Some(driver::CompiledProgram { scripts, globals_words })
                }
                _ => None,
            }
        }
    };

    if cx.has_error() {
        return Ok(ExitCode::FAILURE);
    }
    if fsyntax_only {
        return Ok(ExitCode::SUCCESS);
    }
    let Some(program) = program else {
        return Ok(ExitCode::FAILURE);
    };

    let output_path = cli.output.clone().unwrap_or_else(|| {
        let ext = if emit_ir2_out {
            "ir2"
        } else if cleo.is_some() {
            "cs"
        } else {
            "scm"
        };
        cli.input.with_extension(ext)
    });

    if emit_ir2_out {
        let Ok(text) = emit_ir2(&cx, &program.scripts) else {
            return Ok(ExitCode::FAILURE);
        };
        std::fs::write(&output_path, text)
            .with_context(|| format!("cannot write {}", output_path.display()))?;
    } else {
        let Ok(output) = emit_binary(&cx, &program.scripts, program.globals_words) else {
            return Ok(ExitCode::FAILURE);
        };
        std::fs::write(&output_path, &output.image)
            .with_context(|| format!("cannot write {}", output_path.display()))?;
        let dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        for (name, bytes) in &output.streamed {
            let path = dir.join(format!("{}.sco", name.to_lowercase()));
            std::fs::write(&path, bytes)
                .with_context(|| format!("cannot write {}", path.display()))?;
        }
    }

    if cx.has_error() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn build_options(cli: &Cli, game: Game) -> Options {
    let mut opt = Options::for_game(game);
    opt.guesser = cli.guesser;
    opt.pedantic = cli.pedantic;
    opt.emit_ir2 = cli.emit_ir2;
    opt.fsyntax_only = cli.fsyntax_only;
    opt.fswitch |= cli.fswitch;
    opt.farrays |= cli.farrays;
    opt.scope_then_label = cli.fscope_then_label;
    opt.allow_break_continue = cli.allow_break_continue;
    opt.relax_not = cli.relax_not;
    opt.optimize_zero_floats = cli.optimize_zero_floats;
    opt.streamed_scripts = cli.streamed_scripts;
    opt.headerless = cli.headerless || cli.cleo.is_some();
    opt.cleo = cli.cleo;
    if let Some(begin) = cli.mission_var_begin {
        opt.mission_var_begin = begin;
    }
    if cli.switch_case_limit.is_some() {
        opt.switch_case_limit = cli.switch_case_limit;
    }
    for define in &cli.defines {
        match define.split_once('=') {
            Some((symbol, value)) => opt.define(symbol, value),
            None => opt.define(define, "1"),
        }
    }
    opt
}

/// `--config-path` wins; otherwise look for `config/<game>` next to the
/// executable, then in the working directory.
fn resolve_config_dir(explicit: Option<PathBuf>, game: Game) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let relative = PathBuf::from("config").join(game.name());
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let beside_exe = dir.join(&relative);
            if beside_exe.exists() {
                return beside_exe;
            }
        }
    }
    relative
}
