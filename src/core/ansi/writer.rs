//! ANSI-processing writers
//!
//! [`AnsiWriter`] runs every byte through the [`EscapeParser`] and hands
//! recognized commands to an [`AnsiHandler`]; text and malformed sequences
//! are forwarded through [`AnsiHandler::write_text`], unchanged unless the
//! handler overrides it. [`PassThroughWriter`] forwards everything and
//! guarantees an attribute reset when it is closed.

use std::io::{self, Write};

use super::parser::{AnsiCommand, EscapeParser, Feed, RESET_CODE};

/// Acts on recognized escape commands
pub trait AnsiHandler {
    /// `out` is the underlying stream; all text preceding the command has
    /// already been written to it (but not necessarily flushed).
    fn handle(&mut self, command: &AnsiCommand, out: &mut dyn Write) -> io::Result<()>;

    /// Plain text between commands
    fn write_text(&mut self, text: &[u8], out: &mut dyn Write) -> io::Result<()> {
        out.write_all(text)
    }

    /// Called once when the writer is closed, before the final flush
    fn finish(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}

/// Drops every command, leaving only text
#[derive(Debug, Default, Clone, Copy)]
pub struct StripHandler;

impl AnsiHandler for StripHandler {
    fn handle(&mut self, _command: &AnsiCommand, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that parses escape sequences out of the stream
pub struct AnsiWriter<W: Write, H: AnsiHandler> {
    out: W,
    parser: EscapeParser,
    handler: H,
    closed: bool,
}

impl<W: Write> AnsiWriter<W, StripHandler> {
    /// Writer that removes all escape sequences
    pub fn strip(out: W) -> Self {
        Self::new(out, StripHandler)
    }
}

impl<W: Write, H: AnsiHandler> AnsiWriter<W, H> {
    pub fn new(out: W, handler: H) -> Self {
        Self {
            out,
            parser: EscapeParser::new(),
            handler,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub(crate) fn split_mut(&mut self) -> (&mut H, &mut W) {
        (&mut self.handler, &mut self.out)
    }

    /// Write out any half-finished sequence as raw bytes and flush
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.parser.is_pending() {
            let raw = self.parser.take_pending();
            self.handler.write_text(&raw, &mut self.out)?;
        }
        self.handler.finish(&mut self.out)?;
        self.out.flush()
    }
}

impl<W: Write, H: AnsiHandler> Write for AnsiWriter<W, H> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut text = Vec::with_capacity(buf.len());

        for &byte in buf {
            match self.parser.feed(byte) {
                Feed::Text(b) => text.push(b),
                Feed::Pending => {}
                Feed::Rejected(raw) => text.extend_from_slice(&raw),
                Feed::Command(command) => {
                    if !text.is_empty() {
                        self.handler.write_text(&text, &mut self.out)?;
                        text.clear();
                    }
                    self.handler.handle(&command, &mut self.out)?;
                }
            }
        }

        if !text.is_empty() {
            self.handler.write_text(&text, &mut self.out)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write, H: AnsiHandler> Drop for AnsiWriter<W, H> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Forwards bytes unchanged; writes `ESC [ m` once on close or drop
pub struct PassThroughWriter<W: Write> {
    out: W,
    closed: bool,
}

impl<W: Write> PassThroughWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, closed: false }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Reset attributes so the terminal is never left colored
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.out.write_all(RESET_CODE)?;
        self.out.flush()
    }
}

impl<W: Write> Write for PassThroughWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write> Drop for PassThroughWriter<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ansi::builder::Ansi;
    use crate::core::ansi::parser::{Color, Erase};

    #[test]
    fn test_strip_removes_supported_sequences() {
        let seq = Ansi::new()
            .cursor_up(2)
            .cursor_down(1)
            .cursor_right(4)
            .cursor_left(3)
            .cursor_to_column(7)
            .cursor(3, 9)
            .erase_screen(Erase::All)
            .erase_line(Erase::ToEnd)
            .fg(Color::Red)
            .bg_bright(Color::Cyan)
            .bold()
            .reset();
        let input = format!("{seq}\x1b[2S\x1b[T\x1b[s\x1b[u");

        let mut writer = AnsiWriter::strip(Vec::new());
        writer.write_all(input.as_bytes()).unwrap();
        writer.close().unwrap();

        let out = writer.get_ref();
        assert!(!out.contains(&0x1B));
        assert!(!out.contains(&b'['));
        assert!(out.is_empty());
    }

    #[test]
    fn test_strip_preserves_text() {
        let mut writer = AnsiWriter::strip(Vec::new());
        writer.write_all(b"red:\x1b[31m[x] caf\xc3\xa9\x1b[0m done\n").unwrap();
        assert_eq!(writer.get_ref(), b"red:[x] caf\xc3\xa9 done\n");
    }

    #[test]
    fn test_strip_sequence_split_across_writes() {
        let mut writer = AnsiWriter::strip(Vec::new());
        writer.write_all(b"a\x1b[3").unwrap();
        writer.write_all(b"1mb").unwrap();
        assert_eq!(writer.get_ref(), b"ab");
    }

    #[test]
    fn test_close_flushes_partial_sequence() {
        let mut writer = AnsiWriter::strip(Vec::new());
        writer.write_all(b"x\x1b[1").unwrap();
        writer.close().unwrap();
        assert_eq!(writer.get_ref(), b"x\x1b[1");
    }

    #[test]
    fn test_pass_through_resets_once() {
        let mut writer = PassThroughWriter::new(Vec::new());
        writer.write_all(b"\x1b[31mred").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert_eq!(writer.get_ref(), b"\x1b[31mred\x1b[m");
    }

    #[test]
    fn test_pass_through_resets_on_drop() {
        struct Shared<'a>(&'a mut Vec<u8>);
        impl Write for Shared<'_> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut sink = Vec::new();
        {
            let mut writer = PassThroughWriter::new(Shared(&mut sink));
            writer.write_all(b"\x1b[44m").unwrap();
        }
        assert_eq!(sink, b"\x1b[44m\x1b[m");
    }
}
