//! termios driver for Unix-like systems

use std::io;
use std::sync::{Mutex, PoisonError};

use rustix::fd::{AsFd, BorrowedFd};
use rustix::io::Errno;
use rustix::termios::{
    self, ControlModes, InputModes, LocalModes, OptionalActions, SpecialCodeIndex, Termios,
};
use tracing::debug;

use super::{Result, TerminalDriver, TerminalError, DEFAULT_HEIGHT, DEFAULT_WIDTH};

fn native(call: &'static str) -> impl FnOnce(Errno) -> TerminalError {
    move |e| TerminalError::NativeCall {
        call,
        source: io::Error::from(e),
    }
}

/// Raw mode on the process's stdin
pub struct PosixTerminal {
    /// Settings found at startup
    original: Termios,
    /// Serializes read-modify-write of the terminal modes
    modes: Mutex<()>,
}

impl PosixTerminal {
    /// Fails with `NotATerminal` when stdin is redirected
    pub fn new() -> Result<Self> {
        let stdin = io::stdin();
        if !termios::isatty(stdin.as_fd()) {
            return Err(TerminalError::NotATerminal);
        }
        let original = termios::tcgetattr(stdin.as_fd())
            .map_err(|e| TerminalError::Initialization(io::Error::from(e)))?;
        Ok(Self {
            original,
            modes: Mutex::new(()),
        })
    }

    fn update(&self, call: &'static str, f: impl FnOnce(&mut Termios)) -> Result<()> {
        let _guard = self.modes.lock().unwrap_or_else(PoisonError::into_inner);
        let stdin = io::stdin();
        let mut current = termios::tcgetattr(stdin.as_fd()).map_err(native("tcgetattr"))?;
        f(&mut current);
        termios::tcsetattr(stdin.as_fd(), OptionalActions::Now, &current).map_err(native(call))
    }
}

/// Apply the raw-mode flags: no canonical line editing, no flow control,
/// 8-bit clean, one byte per read. Echo and signals are left alone.
pub fn make_raw(t: &mut Termios) {
    t.input_modes.remove(
        InputModes::IXON
            | InputModes::IXOFF
            | InputModes::BRKINT
            | InputModes::INPCK
            | InputModes::PARMRK
            | InputModes::ISTRIP,
    );
    t.input_modes.insert(InputModes::IGNBRK);

    t.local_modes.remove(LocalModes::ICANON);
    t.local_modes.insert(LocalModes::ECHOCTL);

    t.control_modes.remove(ControlModes::CSIZE | ControlModes::PARENB);
    t.control_modes.insert(ControlModes::CS8 | ControlModes::CREAD);

    t.special_codes[SpecialCodeIndex::VMIN] = 1;
    t.special_codes[SpecialCodeIndex::VTIME] = 0;
}

fn read_byte(fd: BorrowedFd<'_>) -> Option<u8> {
    let mut byte = [0u8; 1];
    loop {
        match rustix::io::read(fd, &mut byte[..]) {
            Ok(0) => return None,
            Ok(_) => return Some(byte[0]),
            Err(Errno::INTR) => continue,
            Err(e) => {
                debug!("stdin read failed: {}", e);
                return None;
            }
        }
    }
}

/// Length of the UTF-8 sequence introduced by `lead`
fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

/// Decode one character from a byte source
fn decode(mut next: impl FnMut() -> Option<u8>) -> Option<char> {
    let lead = next()?;
    let len = utf8_len(lead);
    let mut buf = [lead, 0, 0, 0];
    for slot in buf.iter_mut().take(len).skip(1) {
        *slot = next()?;
    }
    let ch = std::str::from_utf8(&buf[..len])
        .ok()
        .and_then(|s| s.chars().next())
        .unwrap_or(char::REPLACEMENT_CHARACTER);
    Some(ch)
}

impl TerminalDriver for PosixTerminal {
    fn enable_raw(&self) -> Result<()> {
        self.update("tcsetattr", make_raw)
    }

    fn restore(&self) -> Result<()> {
        let _guard = self.modes.lock().unwrap_or_else(PoisonError::into_inner);
        termios::tcsetattr(io::stdin().as_fd(), OptionalActions::Now, &self.original)
            .map_err(native("tcsetattr"))
    }

    fn set_echo(&self, enabled: bool) -> Result<()> {
        self.update("tcsetattr", |t| t.local_modes.set(LocalModes::ECHO, enabled))
    }

    fn set_interrupt(&self, enabled: bool) -> Result<()> {
        self.update("tcsetattr", |t| t.local_modes.set(LocalModes::ISIG, enabled))
    }

    fn width(&self) -> u16 {
        match termios::tcgetwinsize(io::stdin().as_fd()) {
            Ok(size) if size.ws_col > 0 => size.ws_col,
            _ => DEFAULT_WIDTH,
        }
    }

    fn height(&self) -> u16 {
        match termios::tcgetwinsize(io::stdin().as_fd()) {
            Ok(size) if size.ws_row > 0 => size.ws_row,
            _ => DEFAULT_HEIGHT,
        }
    }

    fn read_raw(&self) -> Option<char> {
        let stdin = io::stdin();
        let fd = stdin.as_fd();
        decode(|| read_byte(fd))
    }
}
