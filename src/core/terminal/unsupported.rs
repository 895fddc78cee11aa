//! Fallback driver: plain line-buffered input
//!
//! Used when stdin is redirected, when the platform driver can't start, or
//! when the terminal type is `none`. Lines are read whole and handed out a
//! character at a time, followed by `'\n'`.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::{Result, TerminalDriver, DEFAULT_HEIGHT, DEFAULT_WIDTH};

struct LineSource {
    input: Box<dyn BufRead + Send>,
    pending: VecDeque<char>,
}

pub struct UnsupportedTerminal {
    source: Mutex<LineSource>,
}

impl UnsupportedTerminal {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }

    pub fn new(input: impl BufRead + Send + 'static) -> Self {
        Self {
            source: Mutex::new(LineSource {
                input: Box::new(input),
                pending: VecDeque::new(),
            }),
        }
    }
}

impl TerminalDriver for UnsupportedTerminal {
    fn enable_raw(&self) -> Result<()> {
        Ok(())
    }

    fn restore(&self) -> Result<()> {
        Ok(())
    }

    fn set_echo(&self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn set_interrupt(&self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn width(&self) -> u16 {
        DEFAULT_WIDTH
    }

    fn height(&self) -> u16 {
        DEFAULT_HEIGHT
    }

    fn read_raw(&self) -> Option<char> {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ch) = source.pending.pop_front() {
            return Some(ch);
        }

        let mut line = Vec::new();
        loop {
            match source.input.read_until(b'\n', &mut line) {
                Ok(0) if line.is_empty() => return None,
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("line read failed: {}", e);
                    return None;
                }
            }
        }
        // undecodable bytes become U+FFFD rather than ending input
        let line = String::from_utf8_lossy(&line);
        let text = line.trim_end_matches(['\r', '\n']);
        source.pending.extend(text.chars());
        source.pending.push_back('\n');
        source.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(terminal: &UnsupportedTerminal) -> String {
        std::iter::from_fn(|| terminal.read_raw()).collect()
    }

    #[test]
    fn test_lines_become_characters() {
        let terminal = UnsupportedTerminal::new(io::Cursor::new("ab\r\ncé\n"));
        assert_eq!(drain(&terminal), "ab\ncé\n");
    }

    #[test]
    fn test_last_line_without_newline() {
        let terminal = UnsupportedTerminal::new(io::Cursor::new("x"));
        assert_eq!(terminal.read_raw(), Some('x'));
        assert_eq!(terminal.read_raw(), Some('\n'));
        assert_eq!(terminal.read_raw(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let terminal = UnsupportedTerminal::new(io::Cursor::new(b"a\xffb\nhello\n".to_vec()));
        assert_eq!(drain(&terminal), "a\u{fffd}b\nhello\n");
    }

    #[test]
    fn test_empty_input() {
        let terminal = UnsupportedTerminal::new(io::empty());
        assert_eq!(terminal.read_raw(), None);
    }

    #[test]
    fn test_mode_changes_are_noops() {
        let terminal = UnsupportedTerminal::new(io::empty());
        assert!(terminal.enable_raw().is_ok());
        assert!(terminal.set_echo(false).is_ok());
        assert!(terminal.set_interrupt(true).is_ok());
        assert!(terminal.restore().is_ok());
        assert_eq!((terminal.width(), terminal.height()), (80, 24));
    }
}
