//! HTML rendering of colored output
//!
//! [`HtmlHandler`] turns SGR attributes into `<b>`, `<u>` and styled
//! `<span>` tags and escapes the text between them. Tags stay open until a
//! reset, normal intensity, underline off, the end of a line written with
//! [`HtmlWriter::write_line`], or close. Cursor and erase commands have no
//! HTML form and are dropped.

use std::io::{self, Write};

use super::parser::{AnsiCommand, Attribute, Color};
use super::writer::{AnsiHandler, AnsiWriter};

/// Writer producing HTML from ANSI-colored text
pub type HtmlWriter<W> = AnsiWriter<W, HtmlHandler>;

fn css_color(color: Color) -> &'static str {
    match color {
        Color::Black => "black",
        Color::Red => "red",
        Color::Green => "green",
        Color::Yellow => "yellow",
        Color::Blue => "blue",
        Color::Magenta => "magenta",
        Color::Cyan => "cyan",
        Color::White => "white",
    }
}

fn entity(byte: u8) -> Option<&'static [u8]> {
    match byte {
        b'"' => Some(b"&quot;"),
        b'&' => Some(b"&amp;"),
        b'<' => Some(b"&lt;"),
        b'>' => Some(b"&gt;"),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct HtmlHandler {
    /// Names of open tags, innermost last
    open: Vec<&'static str>,
}

impl HtmlHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tags not yet closed
    pub fn open_tags(&self) -> usize {
        self.open.len()
    }

    fn open_tag(&mut self, name: &'static str, style: Option<String>, out: &mut dyn Write) -> io::Result<()> {
        match style {
            Some(style) => write!(out, "<{} style=\"{}\">", name, style)?,
            None => write!(out, "<{}>", name)?,
        }
        self.open.push(name);
        Ok(())
    }

    fn close_tags(&mut self, out: &mut dyn Write) -> io::Result<()> {
        while let Some(name) = self.open.pop() {
            write!(out, "</{}>", name)?;
        }
        Ok(())
    }

    fn apply(&mut self, attribute: Attribute, out: &mut dyn Write) -> io::Result<()> {
        match attribute {
            Attribute::Bold => self.open_tag("b", None, out),
            Attribute::Underline | Attribute::UnderlineDouble => self.open_tag("u", None, out),
            Attribute::Conceal => self.open_tag("span", Some("visibility: hidden;".into()), out),
            Attribute::Foreground(c) | Attribute::BrightForeground(c) => {
                self.open_tag("span", Some(format!("color: {};", css_color(c))), out)
            }
            Attribute::Background(c) | Attribute::BrightBackground(c) => {
                self.open_tag("span", Some(format!("background-color: {};", css_color(c))), out)
            }
            Attribute::Reset | Attribute::NormalIntensity | Attribute::UnderlineOff => self.close_tags(out),
            _ => Ok(()),
        }
    }
}

impl AnsiHandler for HtmlHandler {
    fn handle(&mut self, command: &AnsiCommand, out: &mut dyn Write) -> io::Result<()> {
        if let AnsiCommand::SetAttributes(attributes) = command {
            for &attribute in attributes {
                self.apply(attribute, out)?;
            }
        }
        Ok(())
    }

    fn write_text(&mut self, text: &[u8], out: &mut dyn Write) -> io::Result<()> {
        let mut start = 0;
        for (i, &byte) in text.iter().enumerate() {
            if let Some(escaped) = entity(byte) {
                out.write_all(&text[start..i])?;
                out.write_all(escaped)?;
                start = i + 1;
            }
        }
        out.write_all(&text[start..])
    }

    fn finish(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.close_tags(out)
    }
}

impl<W: Write> AnsiWriter<W, HtmlHandler> {
    pub fn html(out: W) -> Self {
        Self::new(out, HtmlHandler::new())
    }

    /// Write `line` and close every tag it left open
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.write_all(line)?;
        let (handler, out) = self.split_mut();
        handler.close_tags(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ansi::builder::Ansi;

    fn render(input: &str) -> String {
        let mut writer = HtmlWriter::html(Vec::new());
        writer.write_all(input.as_bytes()).unwrap();
        writer.close().unwrap();
        String::from_utf8(writer.get_ref().clone()).unwrap()
    }

    #[test]
    fn test_colors_become_spans() {
        let input = Ansi::new().fg(Color::Red).text("err").reset().text(" ok").to_string();
        assert_eq!(render(&input), "<span style=\"color: red;\">err</span> ok");
    }

    #[test]
    fn test_nested_tags_close_in_reverse() {
        let input = Ansi::new().bold().bg(Color::Blue).text("x").reset().to_string();
        assert_eq!(render(&input), "<b><span style=\"background-color: blue;\">x</span></b>");
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(render("a < b && \"c\" > d"), "a &lt; b &amp;&amp; &quot;c&quot; &gt; d");
    }

    #[test]
    fn test_close_ends_open_tags() {
        assert_eq!(render("\x1b[4;32mgo"), "<u><span style=\"color: green;\">go</span></u>");
    }

    #[test]
    fn test_cursor_commands_are_dropped() {
        assert_eq!(render("\x1b[2J\x1b[5;1Hhi\x1b[K"), "hi");
    }

    #[test]
    fn test_write_line_closes_tags() {
        let mut writer = HtmlWriter::html(Vec::new());
        writer.write_line(b"\x1b[1mhead").unwrap();
        assert_eq!(writer.handler().open_tags(), 0);
        writer.write_all(b"\x1b[33mtail").unwrap();
        assert_eq!(writer.handler().open_tags(), 1);
        writer.close().unwrap();
        assert_eq!(
            writer.get_ref(),
            b"<b>head</b><span style=\"color: yellow;\">tail</span>"
        );
    }
}
