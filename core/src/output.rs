//! Console reporting: a small `Message` severity enum, modeled on a text-output convention where
//! `Error`/`Debug` print to `stderr` and everything else to `stdout`, plus a `Progress` reporter
//! wrapping the solver's `--quiet`/`--verbose` flags.

use colored::Colorize;
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::EnumIter)]
pub enum Message {
    Info,
    Warning,
    /// Printed to `stderr`, unlike every other variant.
    Error,
    /// Also printed to `stderr`.
    Debug,
}

impl Message {
    fn prefix(self) -> &'static str {
        match self {
            Message::Info => "",
            Message::Warning => "warning:",
            Message::Error => "error:",
            Message::Debug => "debug:",
        }
    }

    fn colorize(self, text: &str) -> String {
        match self {
            Message::Info => text.to_string(),
            Message::Warning => text.yellow().to_string(),
            Message::Error => text.red().bold().to_string(),
            Message::Debug => text.cyan().to_string(),
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Message::Error | Message::Debug)
    }

    /// Writes `text` to stdout or stderr per [`Self::to_stderr`], prefixed and colorized.
    pub fn emit(self, text: &str) {
        let line = if self.prefix().is_empty() { self.colorize(text) } else { self.colorize(&format!("{} {text}", self.prefix())) };
        if self.to_stderr() {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Thin wrapper around the CLI's `--quiet`/`--verbose` flags: `Progress::info`/`warning`/`error`
/// respect `quiet` (suppressing `Info`), `Progress::debug` is gated on `verbose`.
#[derive(Debug, Copy, Clone)]
pub struct Progress {
    quiet: bool,
    verbose: bool,
}

impl Progress {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }

    pub fn info(&self, text: &str) {
        if !self.quiet {
            Message::Info.emit(text);
        }
    }

    pub fn warning(&self, text: &str) {
        Message::Warning.emit(text);
    }

    pub fn error(&self, text: &str) {
        Message::Error.emit(text);
    }

    pub fn debug(&self, text: &str) {
        if self.verbose {
            Message::Debug.emit(text);
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(false, false)
    }
}
