//! Colored terminal output for lane progress and summaries.

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::io::{self, Write};

/// Writes user-facing messages to stdout/stderr, honoring `--quiet`.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
    color: ColorChoice,
}

impl OutputManager {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        let color = if std::env::var_os("NO_COLOR").is_some() {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };
        Self {
            verbose,
            quiet,
            color,
        }
    }

    fn write_colored(&self, stderr: bool, color: Option<Color>, bold: bool, message: &str) -> io::Result<()> {
        let mut stream = if stderr {
            StandardStream::stderr(self.color)
        } else {
            StandardStream::stdout(self.color)
        };
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        stream.set_color(&spec)?;
        write!(stream, "{message}")?;
        stream.reset()?;
        writeln!(stream)
    }

    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if !self.verbose || self.quiet {
            return Ok(());
        }
        self.write_colored(false, Some(Color::Cyan), false, message)
    }

    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write_colored(false, None, true, title)
    }

    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write_colored(false, None, false, &format!("  {message}"))
    }

    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write_colored(false, Some(Color::Green), true, &format!("✓ {message}"))
    }

    pub fn warn(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.write_colored(true, Some(Color::Yellow), false, &format!("⚠ {message}"))
    }

    /// Errors are printed even in quiet mode.
    pub fn error(&self, message: &str) -> io::Result<()> {
        self.write_colored(true, Some(Color::Red), true, &format!("✗ {message}"))
    }

    /// The final summary line. Always printed.
    pub fn summary(&self, ok: bool, message: &str) -> io::Result<()> {
        let color = if ok { Color::Green } else { Color::Red };
        self.write_colored(!ok, Some(color), true, message)
    }
}
