//! Colored diagnostic reporting for the terminal.

use owo_colors::OwoColorize;
use scm_syntax::diag::{Reporter, Severity};

pub struct ColorReporter {
    color: bool,
}

impl ColorReporter {
    pub fn new() -> Self {
        // piped stderr gets plain text
        let color = std::env::var_os("NO_COLOR").is_none() && std::io::IsTerminal::is_terminal(&std::io::stderr());
        Self { color }
    }
}

impl Reporter for ColorReporter {
    fn report(&self, severity: Severity, rendered: &str) {
        if !self.color {
            eprintln!("{rendered}");
            return;
        }
        match severity {
            Severity::Error | Severity::Fatal | Severity::Internal => {
                eprintln!("{}", rendered.red());
            }
            Severity::Warning => eprintln!("{}", rendered.yellow()),
            Severity::Note => eprintln!("{}", rendered.bright_black()),
        }
    }
}
