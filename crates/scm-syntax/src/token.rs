//! Token types produced by the line-oriented lexer.

use crate::source::Loc;

/// A single lexical element. GTA3script identifiers and keywords are
/// case-insensitive; the lexer uppercases them so later stages compare
/// directly. String literal contents keep their original case.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier, command name or keyword (uppercased).
    Ident(String),
    /// Integer literal.
    Int(i32),
    /// Float literal.
    Float(f32),
    /// Double-quoted string literal.
    String(String),
    /// `NAME:` label definition (uppercased, colon stripped).
    Label(String),

    // operators
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    Plus,
    Minus,
    Star,
    Slash,
    Less,
    LessEq,
    Greater,
    GreaterEq,

    ScopeOpen,
    ScopeClose,
    BracketOpen,
    BracketClose,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("'{s}'"),
            TokenKind::Int(v) => format!("'{v}'"),
            TokenKind::Float(v) => format!("'{v:?}'"),
            TokenKind::String(_) => "string literal".into(),
            TokenKind::Label(s) => format!("label '{s}'"),
            TokenKind::Eq => "'='".into(),
            TokenKind::PlusEq => "'+='".into(),
            TokenKind::MinusEq => "'-='".into(),
            TokenKind::StarEq => "'*='".into(),
            TokenKind::SlashEq => "'/='".into(),
            TokenKind::Plus => "'+'".into(),
            TokenKind::Minus => "'-'".into(),
            TokenKind::Star => "'*'".into(),
            TokenKind::Slash => "'/'".into(),
            TokenKind::Less => "'<'".into(),
            TokenKind::LessEq => "'<='".into(),
            TokenKind::Greater => "'>'".into(),
            TokenKind::GreaterEq => "'>='".into(),
            TokenKind::ScopeOpen => "'{'".into(),
            TokenKind::ScopeClose => "'}'".into(),
            TokenKind::BracketOpen => "'['".into(),
            TokenKind::BracketClose => "']'".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
}

/// All tokens of one physical line. Statements never span lines, so the
/// parser consumes the program line by line.
#[derive(Debug, Clone)]
pub struct TokenLine {
    pub line: u32,
    pub tokens: Vec<Token>,
}
