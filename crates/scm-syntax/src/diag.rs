//! Diagnostic sink and message rendering.
//!
//! Every pass reports problems through a shared [`Diagnostics`] value.
//! Counters are atomic so parallel jobs can share one sink; message output
//! goes through a [`Reporter`] so the CLI decides how lines reach the user
//! (colored stderr) while library code stays silent in tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::source::Loc;

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
    Internal,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
            Severity::Internal => "internal_error",
        }
    }
}

/// Where a diagnostic points at.
///
/// The four constructors cover the contexts the compiler can be in when a
/// problem surfaces: no location at all (configuration, driver), a whole
/// script, a bare file position, or a position with the offending source
/// line available for a caret rendering.
#[derive(Debug, Clone)]
pub enum DiagContext {
    None,
    Script(PathBuf),
    Point { file: PathBuf, loc: Loc },
    Source { file: PathBuf, loc: Loc, line_text: String },
}

impl DiagContext {
    /// Renders `{file}:{line}:{col}: {kind}: {message}` plus, when the
    /// source line is known, the line itself and a caret under the column.
    pub fn render(&self, severity: Severity, message: &str) -> String {
        let mut out = String::with_capacity(128);
        match self {
            DiagContext::None => {
                out.push_str("scmc: ");
            }
            DiagContext::Script(path) => {
                out.push_str(&path.display().to_string());
                out.push_str(": ");
            }
            DiagContext::Point { file, loc } | DiagContext::Source { file, loc, .. } => {
                out.push_str(&format!("{}:{}:{}: ", file.display(), loc.line, loc.col));
            }
        }
        out.push_str(severity.label());
        out.push_str(": ");
        out.push_str(message);
        if let DiagContext::Source { loc, line_text, .. } = self {
            out.push_str("\n ");
            out.push_str(line_text);
            out.push_str("\n ");
            for _ in 1..loc.col {
                out.push(' ');
            }
            out.push('^');
        }
        out
    }
}

/// Proof that a fatal diagnostic was issued. Returned by [`Diagnostics::fatal`]
/// so the current job unwinds as `Result<_, Halted>`; it carries no payload
/// because the message already went to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halted;

/// Receives rendered diagnostic messages, one call per message.
pub trait Reporter: Send + Sync {
    fn report(&self, severity: Severity, rendered: &str);
}

/// Default reporter: plain lines on stderr. A single `eprintln!` per
/// message keeps output atomic per-message across jobs.
pub struct StderrReporter;

impl Reporter for StderrReporter {
    fn report(&self, _severity: Severity, rendered: &str) {
        eprintln!("{rendered}");
    }
}

/// Process-wide diagnostic sink: counters plus a reporter.
pub struct Diagnostics {
    reporter: Box<dyn Reporter>,
    error_count: AtomicU32,
    warn_count: AtomicU32,
    fatal_count: AtomicU32,
}

/// Errors beyond this many escalate to a fatal `too many errors`.
pub const ERROR_LIMIT: u32 = 100;

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Box::new(StderrReporter))
    }
}

impl Diagnostics {
    pub fn new(reporter: Box<dyn Reporter>) -> Self {
        Self {
            reporter,
            error_count: AtomicU32::new(0),
            warn_count: AtomicU32::new(0),
            fatal_count: AtomicU32::new(0),
        }
    }

    pub fn note(&self, context: &DiagContext, message: &str) {
        self.emit(Severity::Note, context, message);
    }

    pub fn warning(&self, context: &DiagContext, message: &str) {
        self.warn_count.fetch_add(1, Ordering::Relaxed);
        self.emit(Severity::Warning, context, message);
    }

    pub fn error(&self, context: &DiagContext, message: &str) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.emit(Severity::Error, context, message);
    }

    /// Reports a fatal diagnostic and hands back the [`Halted`] token the
    /// job must propagate.
    #[must_use]
    pub fn fatal(&self, context: &DiagContext, message: &str) -> Halted {
        self.fatal_count.fetch_add(1, Ordering::Relaxed);
        self.emit(Severity::Fatal, context, message);
        Halted
    }

    /// Reports a compiler bug. Never silenced, always halts the job.
    #[must_use]
    pub fn internal_error(&self, context: &DiagContext, message: &str) -> Halted {
        self.fatal_count.fetch_add(1, Ordering::Relaxed);
        self.emit(Severity::Internal, context, message);
        Halted
    }

    /// Folds in errors counted elsewhere. `n` may be zero.
    pub fn register_errors(&self, n: u32) {
        self.error_count.fetch_add(n, Ordering::Relaxed);
    }

    /// True once the accumulated error count crosses [`ERROR_LIMIT`];
    /// callers turn this into a `too many errors` fatal.
    pub fn too_many_errors(&self) -> bool {
        self.error_count.load(Ordering::Relaxed) > ERROR_LIMIT
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn warn_count(&self) -> u32 {
        self.warn_count.load(Ordering::Relaxed)
    }

    pub fn fatal_count(&self) -> u32 {
        self.fatal_count.load(Ordering::Relaxed)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0 || self.fatal_count() > 0
    }

    fn emit(&self, severity: Severity, context: &DiagContext, message: &str) {
        self.reporter.report(severity, &context.render(severity, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullReporter;
    impl Reporter for NullReporter {
        fn report(&self, _severity: Severity, _rendered: &str) {}
    }

    fn sink() -> Diagnostics {
        Diagnostics::new(Box::new(NullReporter))
    }

    #[test]
    fn counters_accumulate() {
        let diag = sink();
        diag.error(&DiagContext::None, "one");
        diag.error(&DiagContext::None, "two");
        diag.warning(&DiagContext::None, "meh");
        assert_eq!(diag.error_count(), 2);
        assert_eq!(diag.warn_count(), 1);
        assert_eq!(diag.fatal_count(), 0);
        assert!(diag.has_errors());
    }

    #[test]
    fn fatal_returns_halted() {
        let diag = sink();
        let halted = diag.fatal(&DiagContext::None, "boom");
        assert_eq!(halted, Halted);
        assert_eq!(diag.fatal_count(), 1);
    }

    #[test]
    fn notes_do_not_count() {
        let diag = sink();
        diag.note(&DiagContext::None, "fyi");
        assert!(!diag.has_errors());
    }

    #[test]
    fn render_with_caret() {
        let ctx = DiagContext::Source {
            file: "main.sc".into(),
            loc: Loc::new(3, 6),
            line_text: "WAIT oops".into(),
        };
        let rendered = ctx.render(Severity::Error, "expected integer");
        assert_eq!(rendered, "main.sc:3:6: error: expected integer\n WAIT oops\n      ^");
    }

    #[test]
    fn render_without_context() {
        let rendered = DiagContext::None.render(Severity::Fatal, "too many errors");
        assert_eq!(rendered, "scmc: fatal error: too many errors");
    }

    #[test]
    fn error_limit() {
        let diag = sink();
        diag.register_errors(ERROR_LIMIT);
        assert!(!diag.too_many_errors());
        diag.error(&DiagContext::None, "tip over");
        assert!(diag.too_many_errors());
    }
}
