//! Win32 console backend for the translator

use std::io;

use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Console::{
    FillConsoleOutputAttribute, FillConsoleOutputCharacterW, GetConsoleScreenBufferInfo,
    GetStdHandle, ScrollConsoleScreenBufferW, SetConsoleCursorPosition, SetConsoleTextAttribute,
    CHAR_INFO, CHAR_INFO_0, CONSOLE_CHARACTER_ATTRIBUTES, CONSOLE_SCREEN_BUFFER_INFO, COORD,
    SMALL_RECT, STD_ERROR_HANDLE, STD_HANDLE, STD_OUTPUT_HANDLE,
};

use super::translate::{ConsoleApi, Coord, Rect, ScreenInfo};

fn to_io(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(e.code().0)
}

fn coord(c: Coord) -> COORD {
    COORD { X: c.x, Y: c.y }
}

fn small_rect(r: Rect) -> SMALL_RECT {
    SMALL_RECT {
        Left: r.left,
        Top: r.top,
        Right: r.right,
        Bottom: r.bottom,
    }
}

/// Screen buffer behind stdout or stderr
pub struct Win32Console {
    handle: HANDLE,
}

// Safety: console handles may be used from any thread
unsafe impl Send for Win32Console {}
unsafe impl Sync for Win32Console {}

impl Win32Console {
    pub fn stdout() -> io::Result<Self> {
        Self::from_std(STD_OUTPUT_HANDLE)
    }

    pub fn stderr() -> io::Result<Self> {
        Self::from_std(STD_ERROR_HANDLE)
    }

    fn from_std(which: STD_HANDLE) -> io::Result<Self> {
        let handle = unsafe { GetStdHandle(which) }.map_err(to_io)?;
        if handle.is_invalid() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no console handle"));
        }
        Ok(Self { handle })
    }
}

impl ConsoleApi for Win32Console {
    fn screen_info(&self) -> io::Result<ScreenInfo> {
        let mut info = CONSOLE_SCREEN_BUFFER_INFO::default();
        unsafe { GetConsoleScreenBufferInfo(self.handle, &mut info) }.map_err(to_io)?;
        Ok(ScreenInfo {
            size: Coord::new(info.dwSize.X, info.dwSize.Y),
            cursor: Coord::new(info.dwCursorPosition.X, info.dwCursorPosition.Y),
            attributes: info.wAttributes.0,
            window: Rect {
                left: info.srWindow.Left,
                top: info.srWindow.Top,
                right: info.srWindow.Right,
                bottom: info.srWindow.Bottom,
            },
        })
    }

    fn set_text_attribute(&self, attributes: u16) -> io::Result<()> {
        unsafe { SetConsoleTextAttribute(self.handle, CONSOLE_CHARACTER_ATTRIBUTES(attributes)) }
            .map_err(to_io)
    }

    fn set_cursor_position(&self, position: Coord) -> io::Result<()> {
        unsafe { SetConsoleCursorPosition(self.handle, coord(position)) }.map_err(to_io)
    }

    fn fill(&self, ch: char, attributes: u16, length: u32, origin: Coord) -> io::Result<()> {
        let mut unit = [0u16; 2];
        let unit = ch.encode_utf16(&mut unit)[0];
        let mut written = 0u32;
        unsafe {
            FillConsoleOutputCharacterW(self.handle, unit, length, coord(origin), &mut written)
                .map_err(to_io)?;
            FillConsoleOutputAttribute(self.handle, attributes, length, coord(origin), &mut written)
                .map_err(to_io)
        }
    }

    fn scroll(&self, region: Rect, clip: Rect, destination: Coord, fill_attributes: u16) -> io::Result<()> {
        let fill = CHAR_INFO {
            Char: CHAR_INFO_0 { UnicodeChar: b' ' as u16 },
            Attributes: fill_attributes,
        };
        let region = small_rect(region);
        let clip = small_rect(clip);
        unsafe {
            ScrollConsoleScreenBufferW(self.handle, &region, Some(&clip as *const SMALL_RECT), coord(destination), &fill)
        }
        .map_err(to_io)
    }
}
