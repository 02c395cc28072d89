//! IR2 reader: parses the textual form back into [`ScriptIr`] so a
//! pre-compiled program can be re-emitted (`--lang=ir2`). Label names
//! found in the input are preserved, which makes emit-parse-emit
//! round-trips byte-idempotent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use scm_config::ProgramContext;
use scm_syntax::diag::{DiagContext, Halted};
use scm_syntax::source::Loc;
use scm_syntax::ScriptKind;

use crate::ir::{IndexVar, Instr, IrItem, LabelId, Operand, ScriptIr};

pub fn parse_ir2(cx: &ProgramContext, path: &Path, text: &str) -> Result<Vec<ScriptIr>, Halted> {
    let mut parser = Ir2Parser {
        cx,
        path: path.to_path_buf(),
        scripts: Vec::new(),
        current: ScriptBuilder::new("MAIN", ScriptKind::Main),
    };
    for (idx, line) in text.lines().enumerate() {
        parser.line(line, (idx + 1) as u32);
    }
    parser.finish_current();
    Ok(parser.scripts)
}

struct ScriptBuilder {
    name: String,
    kind: ScriptKind,
    items: Vec<IrItem>,
    labels: HashMap<String, LabelId>,
    defined: Vec<bool>,
}

impl ScriptBuilder {
    fn new(name: &str, kind: ScriptKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            items: Vec::new(),
            labels: HashMap::new(),
            defined: Vec::new(),
        }
    }

    fn intern(&mut self, name: &str) -> LabelId {
        if let Some(&id) = self.labels.get(name) {
            return id;
        }
        let id = LabelId(self.labels.len() as u32);
        self.labels.insert(name.to_string(), id);
        self.defined.push(false);
        id
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct Ir2Parser<'a> {
    cx: &'a ProgramContext,
    path: PathBuf,
    scripts: Vec<ScriptIr>,
    current: ScriptBuilder,
}

impl<'a> Ir2Parser<'a> {
    fn error(&self, line: u32, message: &str) {
        let context = DiagContext::Point { file: self.path.clone(), loc: Loc::new(line, 1) };
        self.cx.diag.error(&context, message);
    }

    fn finish_current(&mut self) {
        let builder = std::mem::replace(&mut self.current, ScriptBuilder::new("MAIN", ScriptKind::Main));
        if builder.is_empty() {
            return;
        }
        let mut names: Vec<Option<String>> = vec![None; builder.labels.len()];
        for (name, id) in &builder.labels {
            names[id.0 as usize] = Some(name.clone());
        }
        for (name, id) in &builder.labels {
            if !builder.defined[id.0 as usize] {
                self.cx.diag.error(
                    &DiagContext::Script(self.path.clone()),
                    &format!("label '{name}' is referenced but never defined"),
                );
            }
        }
        let storage_watermark = storage_watermark(&builder.items);
        self.scripts.push(ScriptIr {
            name: builder.name,
            kind: builder.kind,
            items: builder.items,
            label_count: builder.labels.len() as u32,
            label_names: names,
            storage_watermark,
        });
    }

    fn line(&mut self, raw: &str, line_no: u32) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        if let Some(directive) = line.strip_prefix('#') {
            self.directive(directive, line_no);
            return;
        }
        if let Some(label) = line.strip_suffix(':') {
            if !label.contains(' ') {
                let id = self.current.intern(label);
                if self.current.defined[id.0 as usize] {
                    self.error(line_no, &format!("label '{label}' redefined"));
                    return;
                }
                self.current.defined[id.0 as usize] = true;
                self.current.items.push(IrItem::Label(id));
                return;
            }
        }
        self.instruction(line, line_no);
    }

    fn directive(&mut self, directive: &str, line_no: u32) {
        let mut words = directive.split_whitespace();
        match words.next() {
            Some("MISSION_BLOCK_START") => {
                self.finish_current();
                let index = words.next().unwrap_or("0");
                self.current = ScriptBuilder::new(&format!("MISSION{index}"), ScriptKind::Mission);
            }
            Some("STREAMED_BLOCK_START") => {
                self.finish_current();
                let index = words.next().unwrap_or("0");
                self.current = ScriptBuilder::new(&format!("STREAM{index}"), ScriptKind::Streamed);
            }
            Some("MISSION_BLOCK_END") | Some("STREAMED_BLOCK_END") => {
                self.finish_current();
            }
            other => {
                self.error(line_no, &format!("unknown directive '#{}'", other.unwrap_or("")));
            }
        }
    }

    fn instruction(&mut self, line: &str, line_no: u32) {
        let mut tokens = tokenize(line);
        if tokens.is_empty() {
            return;
        }
        let mut not = false;
        if tokens[0] == "NOT" {
            not = true;
            tokens.remove(0);
        }
        let Some(name) = tokens.first() else {
            self.error(line_no, "missing command name");
            return;
        };
        let Some((command, _)) = self.cx.commands.find_command(name) else {
            self.error(line_no, &format!("unknown command '{name}'"));
            return;
        };
        let mut args = Vec::with_capacity(tokens.len() - 1);
        for token in &tokens[1..] {
            match self.operand(token) {
                Some(op) => args.push(op),
                None => {
                    self.error(line_no, &format!("bad operand '{token}'"));
                    return;
                }
            }
        }
        self.current.items.push(IrItem::Instr(Instr { command, not, args }));
    }

    fn operand(&mut self, token: &str) -> Option<Operand> {
        if let Some(stripped) = token.strip_prefix('"') {
            return Some(Operand::String(stripped.strip_suffix('"')?.to_string()));
        }
        if let Some(label) = token.strip_prefix('@') {
            let id = self.current.intern(label);
            return Some(Operand::Label(id));
        }
        if let Some(rest) = token.strip_prefix('&') {
            return parse_global(rest);
        }
        if let Some(paren) = token.find('@') {
            // local slot, possibly an array access
            if token[..paren].chars().all(|c| c.is_ascii_digit()) && !token[..paren].is_empty() {
                let slot: u32 = token[..paren].parse().ok()?;
                let rest = &token[paren + 1..];
                if rest.is_empty() {
                    return Some(Operand::LVar(slot));
                }
                let (index, len) = parse_subscript(rest)?;
                return Some(Operand::LArr { slot, index, len });
            }
        }
        if let Some(value) = parse_int_token(token) {
            return Some(Operand::Int(value));
        }
        if let Some(value) = parse_float_token(token) {
            return Some(Operand::Float(value));
        }
        if token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Some(Operand::TextLabel(token.to_string()));
        }
        None
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for c in line.chars() {
        if in_string {
            current.push(c);
            if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            current.push(c);
            in_string = true;
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_global(rest: &str) -> Option<Operand> {
    match rest.find('(') {
        None => Some(Operand::GVar(rest.parse().ok()?)),
        Some(paren) => {
            let offset: u32 = rest[..paren].parse().ok()?;
            let (index, len) = parse_subscript(&rest[paren..])?;
            Some(Operand::GArr { offset, index, len })
        }
    }
}

/// Parses `(index,leni)` where index is `&off` or `slot@`.
fn parse_subscript(rest: &str) -> Option<(IndexVar, u8)> {
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    let (index_str, len_str) = inner.split_once(',')?;
    let index = if let Some(offset) = index_str.strip_prefix('&') {
        IndexVar::Global(offset.parse().ok()?)
    } else {
        IndexVar::Local(index_str.strip_suffix('@')?.parse().ok()?)
    };
    let len: u8 = len_str.strip_suffix('i')?.parse().ok()?;
    Some((index, len))
}

fn parse_int_token(token: &str) -> Option<i32> {
    let digits = token
        .strip_suffix("i8")
        .or_else(|| token.strip_suffix("i16"))
        .or_else(|| token.strip_suffix("i32"))
        .unwrap_or(token);
    if digits.is_empty() {
        return None;
    }
    let body = digits.strip_prefix('-').unwrap_or(digits);
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_float_token(token: &str) -> Option<f32> {
    let body = token.strip_suffix('f').unwrap_or(token);
    if !body.contains('.') {
        return None;
    }
    body.parse().ok()
}

fn storage_watermark(items: &[IrItem]) -> u32 {
    let mut words = 0u32;
    for item in items {
        if let IrItem::Instr(instr) = item {
            for arg in &instr.args {
                let top = match arg {
                    Operand::GVar(offset) => offset / 4 + 1,
                    Operand::GArr { offset, len, .. } => offset / 4 + *len as u32,
                    _ => 0,
                };
                words = words.max(top);
            }
        }
    }
    words
}
