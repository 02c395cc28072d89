//! The statement parser.
//!
//! GTA3script is line-oriented, so the parser walks [`TokenLine`]s:
//! simple statements consume one line, structured statements (`IF`,
//! `WHILE`, `SWITCH`, scopes) consume lines until their closing keyword.
//! Parse errors are reported into the diagnostic sink and the offending
//! line is skipped, keeping the parser going to surface more problems.

use std::sync::Arc;

use scm_syntax::ast::*;
use scm_syntax::diag::{DiagContext, Diagnostics};
use scm_syntax::source::{Loc, SourceFile};
use scm_syntax::token::{Token, TokenKind, TokenLine};

/// Condition lists compile to a single `ANDOR`, which caps them.
const MAX_CONDITIONS: usize = 8;

pub struct Parser<'a> {
    lines: &'a [TokenLine],
    pos: usize,
    file: &'a Arc<SourceFile>,
    diag: &'a Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(lines: &'a [TokenLine], file: &'a Arc<SourceFile>, diag: &'a Diagnostics) -> Self {
        Self { lines, pos: 0, file, diag }
    }

    pub fn parse_program(&mut self, kind: ScriptKind) -> Vec<Stmt> {
        if !kind.is_mission_like() {
            return self.parse_block(&[]);
        }
        if self.line_starts_with("MISSION_START") {
            self.pos += 1;
        } else {
            self.diag.error(
                &DiagContext::Script(self.file.path.clone()),
                "mission script must start with MISSION_START",
            );
        }
        let mut stmts = self.parse_block(&["MISSION_END"]);
        if self.line_starts_with("MISSION_END") {
            self.pos += 1;
        } else {
            self.diag
                .error(&DiagContext::Script(self.file.path.clone()), "missing MISSION_END");
        }
        // subroutines may follow the MISSION_END marker
        stmts.extend(self.parse_block(&[]));
        stmts
    }

    /// Parses statements until end of input or a line opening with one of
    /// `terminators` (left unconsumed for the caller).
    fn parse_block(&mut self, terminators: &[&str]) -> Vec<Stmt> {
        let mut out = Vec::new();
        while let Some(line) = self.peek() {
            if let Some(TokenKind::Ident(word)) = line.tokens.first().map(|t| &t.kind) {
                if terminators.iter().any(|t| t == word) {
                    break;
                }
            }
            let line = line.clone();
            self.pos += 1;
            self.parse_line(&line, &mut out);
        }
        out
    }

    fn parse_line(&mut self, line: &TokenLine, out: &mut Vec<Stmt>) {
        let Some(first) = line.tokens.first() else { return };
        match &first.kind {
            TokenKind::Label(name) => {
                out.push(Stmt::Label { name: name.clone(), loc: first.loc });
                if line.tokens.len() > 1 {
                    if let Some(stmt) = self.parse_simple(&line.tokens[1..]) {
                        out.push(stmt);
                    }
                }
            }
            TokenKind::ScopeOpen => {
                if let Some(stmt) = self.parse_scope(first.loc, &line.tokens) {
                    out.push(stmt);
                }
            }
            TokenKind::Ident(word) => match word.as_str() {
                "VAR_INT" | "VAR_FLOAT" | "VAR_TEXT_LABEL" | "LVAR_INT" | "LVAR_FLOAT"
                | "LVAR_TEXT_LABEL" => {
                    if let Some(stmt) = self.parse_var_decl(line) {
                        out.push(stmt);
                    }
                }
                "IF" => {
                    if let Some(stmt) = self.parse_if(line) {
                        out.push(stmt);
                    }
                }
                "WHILE" => {
                    if let Some(stmt) = self.parse_while(line) {
                        out.push(stmt);
                    }
                }
                "REPEAT" => {
                    if let Some(stmt) = self.parse_repeat(line) {
                        out.push(stmt);
                    }
                }
                "SWITCH" => {
                    if let Some(stmt) = self.parse_switch(line) {
                        out.push(stmt);
                    }
                }
                "BREAK" => {
                    self.expect_alone(line);
                    out.push(Stmt::Break(first.loc));
                }
                "CONTINUE" => {
                    self.expect_alone(line);
                    out.push(Stmt::Continue(first.loc));
                }
                "MISSION_START" | "MISSION_END" => {
                    self.error(first.loc, &format!("{word} is only allowed in mission scripts"));
                }
                "AND" | "OR" | "ELSE" | "ENDIF" | "ENDWHILE" | "ENDREPEAT" | "CASE"
                | "DEFAULT" | "ENDSWITCH" => {
                    self.error(first.loc, &format!("'{word}' without a matching statement"));
                }
                _ => {
                    if let Some(stmt) = self.parse_simple(&line.tokens) {
                        out.push(stmt);
                    }
                }
            },
            _ => {
                if let Some(stmt) = self.parse_simple(&line.tokens) {
                    out.push(stmt);
                }
            }
        }
    }

    /// A one-line statement: command invocation or assignment form.
    fn parse_simple(&mut self, tokens: &[Token]) -> Option<Stmt> {
        let first = tokens.first()?;
        if let TokenKind::ScopeOpen = first.kind {
            return self.parse_scope(first.loc, tokens);
        }
        let mut cursor = Cursor { tokens, pos: 0 };
        let target = self.parse_arg(&mut cursor)?;
        let loc = first.loc;
        match cursor.peek().map(|t| &t.kind) {
            Some(TokenKind::Eq) => {
                cursor.next();
                let value = self.parse_arg(&mut cursor)?;
                if let Some(op) = cursor.peek().and_then(|t| binop(&t.kind)) {
                    cursor.next();
                    let rhs = self.parse_arg(&mut cursor)?;
                    self.expect_end(&cursor)?;
                    return Some(Stmt::AssignExpr { target, lhs: value, op, rhs, loc });
                }
                self.expect_end(&cursor)?;
                Some(Stmt::Assign { target, op: AssignOp::Set, value, loc })
            }
            Some(TokenKind::PlusEq | TokenKind::MinusEq | TokenKind::StarEq | TokenKind::SlashEq) => {
                let op = match cursor.next().unwrap().kind {
                    TokenKind::PlusEq => AssignOp::Add,
                    TokenKind::MinusEq => AssignOp::Sub,
                    TokenKind::StarEq => AssignOp::Mul,
                    _ => AssignOp::Div,
                };
                let value = self.parse_arg(&mut cursor)?;
                self.expect_end(&cursor)?;
                Some(Stmt::Assign { target, op, value, loc })
            }
            _ => {
                // not an assignment, so the first token names a command
                let name = match &first.kind {
                    TokenKind::Ident(name) => name.clone(),
                    other => {
                        self.error(first.loc, &format!("expected command, found {}", other.describe()));
                        return None;
                    }
                };
                let mut cursor = Cursor { tokens, pos: 1 };
                let mut args = Vec::new();
                while cursor.peek().is_some() {
                    args.push(self.parse_arg(&mut cursor)?);
                }
                Some(Stmt::Command(CommandStmt { name, args, loc }))
            }
        }
    }

    fn parse_scope(&mut self, loc: Loc, tokens: &[Token]) -> Option<Stmt> {
        if tokens.len() > 1 {
            self.error(tokens[1].loc, "'{' must be alone on its line");
        }
        let mut body = Vec::new();
        loop {
            match self.peek().cloned() {
                None => {
                    self.error(loc, "missing '}' before end of file");
                    break;
                }
                Some(line) if matches!(line.tokens.first().map(|t| &t.kind), Some(TokenKind::ScopeClose)) => {
                    self.pos += 1;
                    break;
                }
                Some(line) => {
                    self.pos += 1;
                    self.parse_line(&line, &mut body);
                }
            }
        }
        Some(Stmt::Scope { body, loc })
    }

    fn parse_var_decl(&mut self, line: &TokenLine) -> Option<Stmt> {
        let first = &line.tokens[0];
        let word = match &first.kind {
            TokenKind::Ident(w) => w.as_str(),
            _ => unreachable!(),
        };
        let class = if word.starts_with("LVAR") { VarClass::Local } else { VarClass::Global };
        let ty = if word.ends_with("_INT") {
            VarType::Int
        } else if word.ends_with("_FLOAT") {
            VarType::Float
        } else {
            VarType::TextLabel
        };
        let mut cursor = Cursor { tokens: &line.tokens, pos: 1 };
        let mut names = Vec::new();
        while let Some(token) = cursor.next() {
            let name = match &token.kind {
                TokenKind::Ident(n) => n.clone(),
                other => {
                    self.error(token.loc, &format!("expected variable name, found {}", other.describe()));
                    return None;
                }
            };
            let mut array_len = None;
            if matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::BracketOpen)) {
                cursor.next();
                match cursor.next().map(|t| (&t.kind, t.loc)) {
                    Some((TokenKind::Int(n), _)) if *n > 0 => array_len = Some(*n as u32),
                    Some((_, loc)) => {
                        self.error(loc, "array length must be a positive integer");
                        return None;
                    }
                    None => {
                        self.error(token.loc, "unterminated array declaration");
                        return None;
                    }
                }
                if !matches!(cursor.next().map(|t| &t.kind), Some(TokenKind::BracketClose)) {
                    self.error(token.loc, "expected ']'");
                    return None;
                }
            }
            names.push(VarName { name, array_len, loc: token.loc });
        }
        if names.is_empty() {
            self.error(first.loc, &format!("{word} requires at least one name"));
            return None;
        }
        Some(Stmt::VarDecl(VarDecl { class, ty, names, loc: first.loc }))
    }

    fn parse_if(&mut self, line: &TokenLine) -> Option<Stmt> {
        let loc = line.tokens[0].loc;
        let conds = self.parse_cond_list(line)?;
        let then_body = self.parse_block(&["ELSE", "ENDIF"]);
        let else_body = if self.line_starts_with("ELSE") {
            self.pos += 1;
            Some(self.parse_block(&["ENDIF"]))
        } else {
            None
        };
        if self.line_starts_with("ENDIF") {
            self.pos += 1;
        } else {
            self.error(loc, "missing ENDIF");
        }
        Some(Stmt::If { conds, then_body, else_body, loc })
    }

    fn parse_while(&mut self, line: &TokenLine) -> Option<Stmt> {
        let loc = line.tokens[0].loc;
        let conds = self.parse_cond_list(line)?;
        let body = self.parse_block(&["ENDWHILE"]);
        if self.line_starts_with("ENDWHILE") {
            self.pos += 1;
        } else {
            self.error(loc, "missing ENDWHILE");
        }
        Some(Stmt::While { conds, body, loc })
    }

    fn parse_repeat(&mut self, line: &TokenLine) -> Option<Stmt> {
        let loc = line.tokens[0].loc;
        let mut cursor = Cursor { tokens: &line.tokens, pos: 1 };
        let count = self.parse_arg(&mut cursor)?;
        let var = self.parse_arg(&mut cursor)?;
        self.expect_end(&cursor)?;
        let body = self.parse_block(&["ENDREPEAT"]);
        if self.line_starts_with("ENDREPEAT") {
            self.pos += 1;
        } else {
            self.error(loc, "missing ENDREPEAT");
        }
        Some(Stmt::Repeat { count, var, body, loc })
    }

    fn parse_switch(&mut self, line: &TokenLine) -> Option<Stmt> {
        let loc = line.tokens[0].loc;
        let mut cursor = Cursor { tokens: &line.tokens, pos: 1 };
        let var = self.parse_arg(&mut cursor)?;
        self.expect_end(&cursor)?;

        let mut cases: Vec<SwitchCase> = Vec::new();
        let mut default: Option<Vec<Stmt>> = None;
        let mut default_loc: Option<Loc> = None;
        loop {
            let Some(next) = self.peek().cloned() else {
                self.error(loc, "missing ENDSWITCH");
                break;
            };
            let first = next.tokens.first().map(|t| (t.kind.clone(), t.loc));
            match first {
                Some((TokenKind::Ident(word), case_loc)) if word == "CASE" => {
                    self.pos += 1;
                    let mut cursor = Cursor { tokens: &next.tokens, pos: 1 };
                    let value = self.parse_arg(&mut cursor)?;
                    self.expect_end(&cursor)?;
                    let body = self.parse_block(&["CASE", "DEFAULT", "ENDSWITCH"]);
                    cases.push(SwitchCase { value, body, loc: case_loc });
                }
                Some((TokenKind::Ident(word), dloc)) if word == "DEFAULT" => {
                    self.pos += 1;
                    if default.is_some() {
                        self.error(dloc, "duplicate DEFAULT");
                    }
                    default_loc = Some(dloc);
                    default = Some(self.parse_block(&["CASE", "DEFAULT", "ENDSWITCH"]));
                }
                Some((TokenKind::Ident(word), _)) if word == "ENDSWITCH" => {
                    self.pos += 1;
                    break;
                }
                Some((_, bad_loc)) => {
                    self.error(bad_loc, "expected CASE, DEFAULT or ENDSWITCH");
                    self.pos += 1;
                }
                None => {
                    self.pos += 1;
                }
            }
        }
        Some(Stmt::Switch { var, cases, default, default_loc, loc })
    }

    /// Parses the `IF`/`WHILE` head plus any `AND`/`OR` continuation lines.
    fn parse_cond_list(&mut self, line: &TokenLine) -> Option<CondList> {
        let loc = line.tokens[0].loc;
        let mut conds = vec![self.parse_cond(&line.tokens[1..], loc)?];
        let mut join = CondJoin::Single;
        while let Some(next) = self.peek() {
            let word = match next.tokens.first().map(|t| &t.kind) {
                Some(TokenKind::Ident(w)) if w == "AND" || w == "OR" => w.clone(),
                _ => break,
            };
            let next = next.clone();
            self.pos += 1;
            let this_join = if word == "AND" { CondJoin::And } else { CondJoin::Or };
            if join == CondJoin::Single {
                join = this_join;
            } else if join != this_join {
                self.error(next.tokens[0].loc, "cannot mix AND and OR in one condition list");
            }
            if let Some(cond) = self.parse_cond(&next.tokens[1..], next.tokens[0].loc) {
                conds.push(cond);
            }
        }
        if conds.len() > MAX_CONDITIONS {
            self.error(loc, &format!("too many conditions (limit is {MAX_CONDITIONS})"));
        }
        Some(CondList { join, conds, loc })
    }

    fn parse_cond(&mut self, tokens: &[Token], loc: Loc) -> Option<Cond> {
        let mut tokens = tokens;
        let mut not = false;
        if let Some(TokenKind::Ident(w)) = tokens.first().map(|t| &t.kind) {
            if w == "NOT" {
                not = true;
                tokens = &tokens[1..];
            }
        }
        if tokens.is_empty() {
            self.error(loc, "missing condition");
            return None;
        }
        let mut cursor = Cursor { tokens, pos: 0 };
        let lhs = self.parse_arg(&mut cursor)?;
        if let Some(op) = cursor.peek().and_then(|t| cmpop(&t.kind)) {
            cursor.next();
            let rhs = self.parse_arg(&mut cursor)?;
            self.expect_end(&cursor)?;
            return Some(Cond::Cmp { not, lhs, op, rhs, loc });
        }
        // plain command condition
        let name = match &tokens[0].kind {
            TokenKind::Ident(name) => name.clone(),
            other => {
                self.error(tokens[0].loc, &format!("expected condition, found {}", other.describe()));
                return None;
            }
        };
        let mut cursor = Cursor { tokens, pos: 1 };
        let mut args = Vec::new();
        while cursor.peek().is_some() {
            args.push(self.parse_arg(&mut cursor)?);
        }
        Some(Cond::Command { not, cmd: CommandStmt { name, args, loc: tokens[0].loc } })
    }

    fn parse_arg(&mut self, cursor: &mut Cursor<'_>) -> Option<Arg> {
        let token = match cursor.next() {
            Some(t) => t,
            None => {
                self.error(
                    cursor.tokens.last().map(|t| t.loc).unwrap_or(Loc::new(0, 0)),
                    "missing argument",
                );
                return None;
            }
        };
        let loc = token.loc;
        let kind = match &token.kind {
            TokenKind::Int(v) => ArgKind::Int(*v),
            TokenKind::Float(v) => ArgKind::Float(*v),
            TokenKind::String(s) => ArgKind::String(s.clone()),
            TokenKind::Ident(name) => {
                if matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::BracketOpen)) {
                    cursor.next();
                    let index = match cursor.next().map(|t| (&t.kind, t.loc)) {
                        Some((TokenKind::Int(v), _)) => ArrayIndex::Literal(*v),
                        Some((TokenKind::Ident(n), _)) => ArrayIndex::Ident(n.clone()),
                        _ => {
                            self.error(loc, "expected array index");
                            return None;
                        }
                    };
                    if !matches!(cursor.next().map(|t| &t.kind), Some(TokenKind::BracketClose)) {
                        self.error(loc, "expected ']'");
                        return None;
                    }
                    ArgKind::Array { name: name.clone(), index }
                } else {
                    ArgKind::Ident(name.clone())
                }
            }
            other => {
                self.error(loc, &format!("unexpected {}", other.describe()));
                return None;
            }
        };
        Some(Arg { kind, loc })
    }

    fn expect_end(&mut self, cursor: &Cursor<'_>) -> Option<()> {
        match cursor.peek() {
            None => Some(()),
            Some(token) => {
                self.error(token.loc, &format!("unexpected {}", token.kind.describe()));
                None
            }
        }
    }

    fn expect_alone(&mut self, line: &TokenLine) {
        if line.tokens.len() > 1 {
            self.error(line.tokens[1].loc, "unexpected tokens after statement");
        }
    }

    fn peek(&self) -> Option<&TokenLine> {
        self.lines.get(self.pos)
    }

    fn line_starts_with(&self, word: &str) -> bool {
        matches!(
            self.peek().and_then(|l| l.tokens.first()).map(|t| &t.kind),
            Some(TokenKind::Ident(w)) if w == word
        )
    }

    fn error(&self, loc: Loc, message: &str) {
        let context = DiagContext::Source {
            file: self.file.path.clone(),
            loc,
            line_text: self.file.line(loc.line).unwrap_or("").to_string(),
        };
        self.diag.error(&context, message);
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }
}

fn binop(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        _ => return None,
    })
}

fn cmpop(kind: &TokenKind) -> Option<CmpOp> {
    Some(match kind {
        TokenKind::Eq => CmpOp::Eq,
        TokenKind::Greater => CmpOp::Greater,
        TokenKind::GreaterEq => CmpOp::GreaterEq,
        TokenKind::Less => CmpOp::Less,
        TokenKind::LessEq => CmpOp::LessEq,
        _ => return None,
    })
}
