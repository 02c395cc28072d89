//! GTA3script syntax definitions and diagnostics.
//!
//! This crate provides the foundational types for the scmc toolchain:
//! token definitions, abstract syntax tree (AST) nodes, source bookkeeping
//! and the diagnostic sink every compiler pass reports through. All other
//! crates in the workspace depend on these fundamental types.
//!
//! # Overview
//!
//! The crate is organized into four modules:
//!
//! - [`token`]: Token types and lexical elements
//! - [`ast`]: Abstract syntax tree node definitions
//! - [`source`]: Source files and locations
//! - [`diag`]: The diagnostic sink, severities and the `Halted` token
//!
//! # Diagnostics
//!
//! Unlike a parser that stops at the first problem, this compiler keeps
//! analyzing after an error so a single run surfaces as many problems as
//! possible. Passes therefore do not return their errors; they report them
//! into a shared [`diag::Diagnostics`] sink and continue. Only a *fatal*
//! diagnostic aborts the current compilation job, by handing the caller a
//! [`diag::Halted`] token which is propagated with `?` out of the job.

/// Token definitions produced by the lexer.
pub mod token;

/// Abstract syntax tree node definitions.
pub mod ast;

/// Source files and locations within them.
pub mod source;

/// Diagnostic sink, severities, rendering.
pub mod diag;

pub use ast::*;
pub use diag::{DiagContext, Diagnostics, Halted, Reporter, Severity};
pub use source::{Loc, SourceFile};
pub use token::*;
