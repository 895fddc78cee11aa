//! Escape sequence builder
//!
//! Assembles the handful of sequences the rest of the crate emits.

use std::fmt;

use super::parser::{Attribute, Color, Erase};

/// Accumulates text and escape sequences into a `String`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ansi {
    builder: String,
}

impl Ansi {
    pub fn new() -> Self {
        Self::default()
    }

    fn csi(mut self, params: &[u16], command: char) -> Self {
        self.builder.push_str("\x1b[");
        for (i, param) in params.iter().enumerate() {
            if i != 0 {
                self.builder.push(';');
            }
            self.builder.push_str(&param.to_string());
        }
        self.builder.push(command);
        self
    }

    /// Move to a 1-based column on the current line
    pub fn cursor_to_column(self, column: u16) -> Self {
        self.csi(&[column], 'G')
    }

    pub fn cursor_up(self, n: u16) -> Self {
        self.csi(&[n], 'A')
    }

    pub fn cursor_down(self, n: u16) -> Self {
        self.csi(&[n], 'B')
    }

    pub fn cursor_right(self, n: u16) -> Self {
        self.csi(&[n], 'C')
    }

    pub fn cursor_left(self, n: u16) -> Self {
        self.csi(&[n], 'D')
    }

    /// Move to a 1-based row and column
    pub fn cursor(self, row: u16, col: u16) -> Self {
        self.csi(&[row, col], 'H')
    }

    pub fn erase_screen(self, kind: Erase) -> Self {
        self.csi(&[kind.param()], 'J')
    }

    pub fn erase_line(self, kind: Erase) -> Self {
        self.csi(&[kind.param()], 'K')
    }

    pub fn attribute(self, attribute: Attribute) -> Self {
        self.csi(&[attribute.code()], 'm')
    }

    pub fn fg(self, color: Color) -> Self {
        self.attribute(Attribute::Foreground(color))
    }

    pub fn fg_bright(self, color: Color) -> Self {
        self.attribute(Attribute::BrightForeground(color))
    }

    pub fn bg(self, color: Color) -> Self {
        self.attribute(Attribute::Background(color))
    }

    pub fn bg_bright(self, color: Color) -> Self {
        self.attribute(Attribute::BrightBackground(color))
    }

    pub fn bold(self) -> Self {
        self.attribute(Attribute::Bold)
    }

    /// ESC [ m
    pub fn reset(mut self) -> Self {
        self.builder.push_str("\x1b[m");
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.builder.push_str(text);
        self
    }

    pub fn repeat(mut self, ch: char, count: usize) -> Self {
        self.builder.extend(std::iter::repeat(ch).take(count));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.builder
    }
}

impl fmt::Display for Ansi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erase_sequence() {
        let seq = Ansi::new().cursor_to_column(3).repeat(' ', 4).cursor_to_column(3);
        assert_eq!(seq.as_str(), "\x1b[3G    \x1b[3G");
    }

    #[test]
    fn test_colors() {
        let seq = Ansi::new().fg(Color::Red).bg_bright(Color::Blue).text("hi").reset();
        assert_eq!(seq.to_string(), "\x1b[31m\x1b[104mhi\x1b[m");
    }
}
