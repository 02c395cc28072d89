//! GTA3script lexer: converts source text into per-line token lists.
//!
//! The language is line-oriented; a statement never spans lines, so the
//! lexer hands the parser one [`TokenLine`] per non-blank source line.
//! Commas count as whitespace. `#IFDEF`/`#IFNDEF`/`#ELSE`/`#ENDIF` lines
//! are consumed here, filtering inactive lines against the predefined
//! symbols in [`Options`].

use std::sync::Arc;

use scm_config::Options;
use scm_syntax::diag::{DiagContext, Diagnostics};
use scm_syntax::source::{Loc, SourceFile};
use scm_syntax::token::{Token, TokenKind, TokenLine};

pub struct Lexer<'a> {
    file: &'a Arc<SourceFile>,
    opt: &'a Options,
    diag: &'a Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(file: &'a Arc<SourceFile>, opt: &'a Options, diag: &'a Diagnostics) -> Self {
        Self { file, opt, diag }
    }

    /// Lexes the whole file. Bad tokens are reported and skipped so one
    /// run surfaces every lexical problem.
    pub fn tokenize(&mut self) -> Vec<TokenLine> {
        let mut out = Vec::new();
        // #IFDEF nesting; each frame remembers whether its branch is live
        // and whether #ELSE was already seen.
        let mut cond_stack: Vec<(bool, bool)> = Vec::new();

        let text = self.file.text.clone();
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            let trimmed = raw_line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                self.directive(directive, line_no, &mut cond_stack);
                continue;
            }
            if cond_stack.iter().any(|&(live, _)| !live) {
                continue;
            }
            let tokens = self.scan_line(raw_line, line_no);
            if !tokens.is_empty() {
                out.push(TokenLine { line: line_no, tokens });
            }
        }

        if !cond_stack.is_empty() {
            self.diag.error(
                &DiagContext::Script(self.file.path.clone()),
                "missing #ENDIF at end of file",
            );
        }
        out
    }

    fn directive(&mut self, directive: &str, line: u32, stack: &mut Vec<(bool, bool)>) {
        let mut words = directive.split_whitespace();
        let name = words.next().unwrap_or("").to_ascii_uppercase();
        let ctx = self.context(line, 1);
        match name.as_str() {
            "IFDEF" | "IFNDEF" => match words.next() {
                Some(symbol) => {
                    let defined = self.opt.is_defined(symbol);
                    let live = if name == "IFDEF" { defined } else { !defined };
                    stack.push((live, false));
                }
                None => self.diag.error(&ctx, &format!("#{name} requires a symbol")),
            },
            "ELSE" => match stack.last_mut() {
                Some((live, else_seen)) if !*else_seen => {
                    *live = !*live;
                    *else_seen = true;
                }
                _ => self.diag.error(&ctx, "#ELSE without matching #IFDEF"),
            },
            "ENDIF" => {
                if stack.pop().is_none() {
                    self.diag.error(&ctx, "#ENDIF without matching #IFDEF");
                }
            }
            _ => self.diag.error(&ctx, &format!("unknown directive '#{name}'")),
        }
    }

    fn scan_line(&mut self, line: &str, line_no: u32) -> Vec<Token> {
        let chars: Vec<char> = line.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0usize;

        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() || c == ',' {
                i += 1;
                continue;
            }
            let col = (i + 1) as u32;
            let loc = Loc::new(line_no, col);

            if c == '/' && chars.get(i + 1) == Some(&'/') {
                break;
            }
            match c {
                '{' => {
                    tokens.push(Token { kind: TokenKind::ScopeOpen, loc });
                    i += 1;
                    continue;
                }
                '}' => {
                    tokens.push(Token { kind: TokenKind::ScopeClose, loc });
                    i += 1;
                    continue;
                }
                '[' => {
                    tokens.push(Token { kind: TokenKind::BracketOpen, loc });
                    i += 1;
                    continue;
                }
                ']' => {
                    tokens.push(Token { kind: TokenKind::BracketClose, loc });
                    i += 1;
                    continue;
                }
                '"' => {
                    let mut s = String::new();
                    i += 1;
                    let mut closed = false;
                    while i < chars.len() {
                        if chars[i] == '"' {
                            closed = true;
                            i += 1;
                            break;
                        }
                        s.push(chars[i]);
                        i += 1;
                    }
                    if !closed {
                        self.diag.error(&self.context(line_no, col), "unterminated string literal");
                    }
                    tokens.push(Token { kind: TokenKind::String(s), loc });
                    continue;
                }
                _ => {}
            }

            // operators; '-' directly before a digit starts a number instead
            let next = chars.get(i + 1).copied();
            let op = match (c, next) {
                ('-', Some(d)) if d.is_ascii_digit() || d == '.' => None,
                ('+', Some('=')) => Some((TokenKind::PlusEq, 2)),
                ('-', Some('=')) => Some((TokenKind::MinusEq, 2)),
                ('*', Some('=')) => Some((TokenKind::StarEq, 2)),
                ('/', Some('=')) => Some((TokenKind::SlashEq, 2)),
                ('<', Some('=')) => Some((TokenKind::LessEq, 2)),
                ('>', Some('=')) => Some((TokenKind::GreaterEq, 2)),
                ('=', _) => Some((TokenKind::Eq, 1)),
                ('+', _) => Some((TokenKind::Plus, 1)),
                ('-', _) => Some((TokenKind::Minus, 1)),
                ('*', _) => Some((TokenKind::Star, 1)),
                ('/', _) => Some((TokenKind::Slash, 1)),
                ('<', _) => Some((TokenKind::Less, 1)),
                ('>', _) => Some((TokenKind::Greater, 1)),
                _ => None,
            };
            if let Some((kind, len)) = op {
                tokens.push(Token { kind, loc });
                i += len;
                continue;
            }

            // number or word; model names may start with a digit, so a
            // digit run followed by word characters is an identifier
            let start = i;
            if c == '-' {
                i += 1;
            }
            let mut is_word = false;
            while i < chars.len() {
                let ch = chars[i];
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                    if ch.is_ascii_alphabetic() || ch == '_' {
                        is_word = true;
                    }
                    i += 1;
                } else {
                    break;
                }
            }
            if i == start {
                self.diag
                    .error(&self.context(line_no, col), &format!("unexpected character '{c}'"));
                i += 1;
                continue;
            }
            let word: String = chars[start..i].iter().collect();
            if is_word {
                let upper = word.to_ascii_uppercase();
                if chars.get(i) == Some(&':') {
                    i += 1;
                    tokens.push(Token { kind: TokenKind::Label(upper), loc });
                } else {
                    tokens.push(Token { kind: TokenKind::Ident(upper), loc });
                }
                continue;
            }
            if word.contains('.') {
                match word.parse::<f32>() {
                    Ok(v) => tokens.push(Token { kind: TokenKind::Float(v), loc }),
                    Err(_) => {
                        self.diag.error(
                            &self.context(line_no, col),
                            &format!("invalid float literal '{word}'"),
                        );
                    }
                }
            } else {
                match word.parse::<i64>() {
                    Ok(v) if i32::try_from(v).is_ok() => {
                        tokens.push(Token { kind: TokenKind::Int(v as i32), loc })
                    }
                    _ => {
                        self.diag.error(
                            &self.context(line_no, col),
                            &format!("integer literal '{word}' out of range"),
                        );
                    }
                }
            }
        }
        tokens
    }

    fn context(&self, line: u32, col: u32) -> DiagContext {
        DiagContext::Source {
            file: self.file.path.clone(),
            loc: Loc::new(line, col),
            line_text: self.file.line(line).unwrap_or("").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_config::{Game, Options};
    use scm_syntax::diag::{Reporter, Severity};

    struct NullReporter;
    impl Reporter for NullReporter {
        fn report(&self, _s: Severity, _r: &str) {}
    }

    fn lex(src: &str) -> (Vec<TokenLine>, Diagnostics) {
        lex_with(src, Options::for_game(Game::GtaSa))
    }

    fn lex_with(src: &str, opt: Options) -> (Vec<TokenLine>, Diagnostics) {
        let diag = Diagnostics::new(Box::new(NullReporter));
        let file = SourceFile::new("test.sc", src);
        let lines = Lexer::new(&file, &opt, &diag).tokenize();
        (lines, diag)
    }

    fn kinds(line: &TokenLine) -> Vec<&TokenKind> {
        line.tokens.iter().map(|t| &t.kind).collect()
    }

    #[test]
    fn commands_and_literals() {
        let (lines, diag) = lex("WAIT 250\nSET_CAR_HEADING car 180.0\n");
        assert!(!diag.has_errors());
        assert_eq!(
            kinds(&lines[0]),
            vec![&TokenKind::Ident("WAIT".into()), &TokenKind::Int(250)]
        );
        assert_eq!(lines[1].tokens[2].kind, TokenKind::Float(180.0));
    }

    #[test]
    fn identifiers_are_uppercased() {
        let (lines, _) = lex("wait 0\n");
        assert_eq!(lines[0].tokens[0].kind, TokenKind::Ident("WAIT".into()));
    }

    #[test]
    fn negative_numbers_and_operators() {
        let (lines, diag) = lex("x = -5\ny -= 2\nz = a - b\n");
        assert!(!diag.has_errors());
        assert_eq!(
            kinds(&lines[0]),
            vec![&TokenKind::Ident("X".into()), &TokenKind::Eq, &TokenKind::Int(-5)]
        );
        assert_eq!(lines[1].tokens[1].kind, TokenKind::MinusEq);
        assert_eq!(lines[2].tokens[3].kind, TokenKind::Minus);
    }

    #[test]
    fn labels_and_scopes() {
        let (lines, _) = lex("main_loop:\n{\n}\n");
        assert_eq!(lines[0].tokens[0].kind, TokenKind::Label("MAIN_LOOP".into()));
        assert_eq!(lines[1].tokens[0].kind, TokenKind::ScopeOpen);
        assert_eq!(lines[2].tokens[0].kind, TokenKind::ScopeClose);
    }

    #[test]
    fn strings_and_comments() {
        let (lines, diag) = lex("SAVE_STRING_TO_DEBUG_FILE \"Hello World\" // trailing\n");
        assert!(!diag.has_errors());
        assert_eq!(lines[0].tokens.len(), 2);
        assert_eq!(lines[0].tokens[1].kind, TokenKind::String("Hello World".into()));
    }

    #[test]
    fn commas_are_whitespace() {
        let (lines, _) = lex("CREATE_CAR 90, 0.0, 0.0, 0.0, car\n");
        assert_eq!(lines[0].tokens.len(), 6);
    }

    #[test]
    fn digit_leading_model_name_is_an_identifier() {
        let (lines, diag) = lex("REQUEST_MODEL 2FLOORS\n");
        assert!(!diag.has_errors());
        assert_eq!(lines[0].tokens[1].kind, TokenKind::Ident("2FLOORS".into()));
    }

    #[test]
    fn array_subscript() {
        let (lines, _) = lex("SET_VAR_INT cars[5] 1\n");
        assert_eq!(
            kinds(&lines[0]),
            vec![
                &TokenKind::Ident("SET_VAR_INT".into()),
                &TokenKind::Ident("CARS".into()),
                &TokenKind::BracketOpen,
                &TokenKind::Int(5),
                &TokenKind::BracketClose,
                &TokenKind::Int(1),
            ]
        );
    }

    #[test]
    fn ifdef_filtering() {
        let mut opt = Options::for_game(Game::Gta3);
        opt.define("DEBUG", "1");
        let src = "#IFDEF DEBUG\nWAIT 1\n#ELSE\nWAIT 2\n#ENDIF\nWAIT 3\n";
        let (lines, diag) = lex_with(src, opt);
        assert!(!diag.has_errors());
        let ints: Vec<_> = lines.iter().map(|l| l.tokens[1].kind.clone()).collect();
        assert_eq!(ints, vec![TokenKind::Int(1), TokenKind::Int(3)]);
    }

    #[test]
    fn unbalanced_ifdef_is_an_error() {
        let (_, diag) = lex("#IFDEF MISSING_ENDIF\nWAIT 0\n");
        assert!(diag.has_errors());
    }

    #[test]
    fn out_of_range_integer_is_an_error() {
        let (_, diag) = lex("WAIT 4294967296\n");
        assert!(diag.has_errors());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (_, diag) = lex("SAVE_STRING_TO_DEBUG_FILE \"oops\n");
        assert!(diag.has_errors());
    }
}
