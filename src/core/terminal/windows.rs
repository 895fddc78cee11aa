//! Windows console driver
//!
//! Raw mode clears every input mode flag, which also turns off the
//! console's own echo. Echo is therefore done here: characters are written
//! back to stdout as they are read.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use ::windows::Win32::Foundation::HANDLE;
use ::windows::Win32::System::Console::{
    GetConsoleMode, GetConsoleScreenBufferInfo, GetStdHandle, ReadConsoleInputW, SetConsoleMode,
    CONSOLE_MODE, CONSOLE_SCREEN_BUFFER_INFO, INPUT_RECORD, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use tracing::debug;

use super::{Result, TerminalDriver, TerminalError, DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// ENABLE_PROCESSED_INPUT: Ctrl+C is handled by the system
const PROCESSED_INPUT: u32 = 0x0001;
/// INPUT_RECORD event type for keyboard input
const KEY_EVENT: u16 = 0x0001;

fn native(call: &'static str) -> impl FnOnce(::windows::core::Error) -> TerminalError {
    move |e| TerminalError::NativeCall {
        call,
        source: io::Error::from_raw_os_error(e.code().0),
    }
}

pub struct WindowsTerminal {
    input: HANDLE,
    output: HANDLE,
    /// Input mode found at startup
    original: CONSOLE_MODE,
    echo: AtomicBool,
    modes: Mutex<()>,
}

// Safety: console handles may be used from any thread
unsafe impl Send for WindowsTerminal {}
unsafe impl Sync for WindowsTerminal {}

impl WindowsTerminal {
    /// Fails with `NotATerminal` when stdin isn't a console
    pub fn new() -> Result<Self> {
        let input = unsafe { GetStdHandle(STD_INPUT_HANDLE) }
            .map_err(|e| TerminalError::Initialization(io::Error::from_raw_os_error(e.code().0)))?;
        let output = unsafe { GetStdHandle(STD_OUTPUT_HANDLE) }
            .map_err(|e| TerminalError::Initialization(io::Error::from_raw_os_error(e.code().0)))?;

        let mut original = CONSOLE_MODE::default();
        if unsafe { GetConsoleMode(input, &mut original) }.is_err() {
            return Err(TerminalError::NotATerminal);
        }

        Ok(Self {
            input,
            output,
            original,
            echo: AtomicBool::new(true),
            modes: Mutex::new(()),
        })
    }

    fn update(&self, f: impl FnOnce(u32) -> u32) -> Result<()> {
        let _guard = self.modes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut mode = CONSOLE_MODE::default();
        unsafe { GetConsoleMode(self.input, &mut mode) }.map_err(native("GetConsoleMode"))?;
        unsafe { SetConsoleMode(self.input, CONSOLE_MODE(f(mode.0))) }.map_err(native("SetConsoleMode"))
    }

    fn window(&self) -> Option<(u16, u16)> {
        let mut info = CONSOLE_SCREEN_BUFFER_INFO::default();
        unsafe { GetConsoleScreenBufferInfo(self.output, &mut info) }.ok()?;
        let width = info.srWindow.Right - info.srWindow.Left + 1;
        let height = info.srWindow.Bottom - info.srWindow.Top + 1;
        (width > 0 && height > 0).then_some((width as u16, height as u16))
    }

    /// Next UTF-16 unit from a key-down event
    fn read_unit(&self) -> Option<u16> {
        let mut records = [INPUT_RECORD::default(); 1];
        loop {
            let mut read = 0u32;
            if let Err(e) = unsafe { ReadConsoleInputW(self.input, &mut records, &mut read) } {
                debug!("ReadConsoleInputW failed: {}", e);
                return None;
            }
            if read == 0 {
                continue;
            }
            let record = &records[0];
            if record.EventType != KEY_EVENT {
                continue;
            }
            let key = unsafe { record.Event.KeyEvent };
            if !key.bKeyDown.as_bool() {
                continue;
            }
            let unit = unsafe { key.uChar.UnicodeChar };
            if unit != 0 {
                return Some(unit);
            }
        }
    }

    fn echo(&self, ch: char) {
        if !self.echo.load(Ordering::Relaxed) {
            return;
        }
        let mut buf = [0u8; 4];
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(ch.encode_utf8(&mut buf).as_bytes());
        let _ = stdout.flush();
    }
}

impl TerminalDriver for WindowsTerminal {
    fn enable_raw(&self) -> Result<()> {
        self.update(|_| 0)
    }

    fn restore(&self) -> Result<()> {
        let _guard = self.modes.lock().unwrap_or_else(PoisonError::into_inner);
        unsafe { SetConsoleMode(self.input, self.original) }.map_err(native("SetConsoleMode"))
    }

    fn set_echo(&self, enabled: bool) -> Result<()> {
        self.echo.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    fn set_interrupt(&self, enabled: bool) -> Result<()> {
        self.update(|mode| {
            if enabled {
                mode | PROCESSED_INPUT
            } else {
                mode & !PROCESSED_INPUT
            }
        })
    }

    fn width(&self) -> u16 {
        self.window().map(|(w, _)| w).unwrap_or(DEFAULT_WIDTH)
    }

    fn height(&self) -> u16 {
        self.window().map(|(_, h)| h).unwrap_or(DEFAULT_HEIGHT)
    }

    fn read_raw(&self) -> Option<char> {
        loop {
            let unit = self.read_unit()?;
            let ch = match unit {
                // Enter arrives as CR; a bare LF (Ctrl+J) is dropped
                0x0D => '\n',
                0x0A => continue,
                0xD800..=0xDBFF => {
                    let low = self.read_unit()?;
                    char::decode_utf16([unit, low])
                        .next()
                        .and_then(|r| r.ok())
                        .unwrap_or(char::REPLACEMENT_CHARACTER)
                }
                _ => char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER),
            };
            self.echo(ch);
            return Some(ch);
        }
    }
}
