//! Terminal styling.
//!
//! A [`Theme`] is built once from the command line and passed to every
//! function that prints. With colour disabled it returns text untouched.

use anstyle::{AnsiColor, Color, Style};
use std::io::IsTerminal;

/// Styles for each kind of output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    header: Style,
    muted: Style,
    success: Style,
    error: Style,
    prompt: Style,
    enabled: bool,
}

const fn fg(color: AnsiColor) -> Option<Color> {
    Some(Color::Ansi(color))
}

impl Theme {
    /// The coloured theme.
    pub const fn colored() -> Self {
        Self {
            header: Style::new().bold().fg_color(fg(AnsiColor::Magenta)),
            muted: Style::new().fg_color(fg(AnsiColor::BrightBlack)),
            success: Style::new().fg_color(fg(AnsiColor::Green)),
            error: Style::new().bold().fg_color(fg(AnsiColor::Red)),
            prompt: Style::new().bold().fg_color(fg(AnsiColor::Cyan)),
            enabled: true,
        }
    }

    /// A theme that never emits escape codes.
    pub const fn plain() -> Self {
        Self {
            header: Style::new(),
            muted: Style::new(),
            success: Style::new(),
            error: Style::new(),
            prompt: Style::new(),
            enabled: false,
        }
    }

    /// Coloured unless `no_color` is set, `NO_COLOR` is present or stdout
    /// is not a terminal.
    pub fn detect(no_color: bool) -> Self {
        let color = !no_color
            && std::env::var_os("NO_COLOR").is_none()
            && std::io::stdout().is_terminal();
        if color {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    /// Returns true if styles are applied.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn header(&self, text: &str) -> String {
        self.paint(self.header, text)
    }

    pub fn muted(&self, text: &str) -> String {
        self.paint(self.muted, text)
    }

    pub fn success(&self, text: &str) -> String {
        self.paint(self.success, text)
    }

    pub fn error(&self, text: &str) -> String {
        self.paint(self.error, text)
    }

    pub fn prompt(&self, text: &str) -> String {
        self.paint(self.prompt, text)
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.enabled {
            format!("{}{text}{}", style.render(), style.render_reset())
        } else {
            text.to_string()
        }
    }
}
