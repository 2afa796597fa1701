//! Colored terminal output for the CLI.
//!
//! Uses `termcolor`. Respects the `NO_COLOR` environment variable and the
//! `--color` flag.

use ember_compiler::{Diagnostic, Severity};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled output writer for terminal.
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn styled(stream: &mut StandardStream, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = stream.set_color(&spec);
        let _ = write!(stream, "{}", text);
        let _ = stream.reset();
    }

    /// Green bold text.
    pub fn success(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, Some(Color::Green), true);
    }

    /// Cyan text.
    pub fn info(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, Some(Color::Cyan), false);
    }

    /// Plain text (no color).
    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    /// `file:line:col: error: message` on stderr, severity colored
    pub fn diagnostic(&mut self, diag: &Diagnostic) {
        let color = match diag.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
            Severity::Note => Color::Cyan,
        };
        if diag.span.is_known() {
            let _ = write!(self.stderr, "{}: ", diag.span);
        }
        Self::styled(&mut self.stderr, &format!("{}", diag.severity), Some(color), true);
        let _ = writeln!(self.stderr, ": {}", diag.message);
    }

    /// Red `error:` prefix followed by a message on stderr
    pub fn error(&mut self, message: &str) {
        Self::styled(&mut self.stderr, "error", Some(Color::Red), true);
        let _ = writeln!(self.stderr, ": {}", message);
    }

    /// Extra detail below an error, dimmed
    pub fn note(&mut self, text: &str) {
        Self::styled(&mut self.stderr, text, Some(Color::White), false);
        let _ = writeln!(self.stderr);
    }

    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
        let _ = self.stderr.flush();
    }
}
