//! ANSI to Windows console translation
//!
//! Legacy Windows consoles don't interpret escape sequences, so each
//! command is mapped onto the console API instead. The mapping lives here
//! and only talks to the console through [`ConsoleApi`]; the real Win32
//! implementation is in `win32.rs`.
//!
//! The console attribute word has no underline, strikethrough or reverse
//! video. Reverse ("negative") and conceal are tracked in software and
//! folded into the word each time it is applied. Underline and
//! strikethrough are approximated with `BACKGROUND_INTENSITY`, which is
//! lossy: turning one off also turns off the other.

use std::io::{self, Write};

use bitflags::bitflags;
use tracing::debug;

use super::parser::{AnsiCommand, Attribute, Color, Erase};
use super::writer::AnsiHandler;
use crate::core::terminal::TerminalError;

bitflags! {
    /// Native console character attributes
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ConsoleAttributes: u16 {
        const FOREGROUND_BLUE      = 0x0001;
        const FOREGROUND_GREEN     = 0x0002;
        const FOREGROUND_RED       = 0x0004;
        const FOREGROUND_INTENSITY = 0x0008;
        const BACKGROUND_BLUE      = 0x0010;
        const BACKGROUND_GREEN     = 0x0020;
        const BACKGROUND_RED       = 0x0040;
        const BACKGROUND_INTENSITY = 0x0080;

        const FOREGROUND_MASK = 0x000F;
        const BACKGROUND_MASK = 0x00F0;
    }
}

impl ConsoleAttributes {
    /// Foreground bits for an ANSI color (without intensity)
    pub fn foreground(color: Color) -> Self {
        match color {
            Color::Black => Self::empty(),
            Color::Red => Self::FOREGROUND_RED,
            Color::Green => Self::FOREGROUND_GREEN,
            Color::Yellow => Self::FOREGROUND_RED | Self::FOREGROUND_GREEN,
            Color::Blue => Self::FOREGROUND_BLUE,
            Color::Magenta => Self::FOREGROUND_RED | Self::FOREGROUND_BLUE,
            Color::Cyan => Self::FOREGROUND_GREEN | Self::FOREGROUND_BLUE,
            Color::White => Self::FOREGROUND_RED | Self::FOREGROUND_GREEN | Self::FOREGROUND_BLUE,
        }
    }

    /// Background bits for an ANSI color (without intensity)
    pub fn background(color: Color) -> Self {
        Self::from_bits_retain(Self::foreground(color).bits() << 4)
    }
}

/// Software view of the console attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeState {
    word: ConsoleAttributes,
    original: ConsoleAttributes,
    negative: bool,
    concealed: bool,
}

impl AttributeState {
    pub fn new(original: u16) -> Self {
        let original = ConsoleAttributes::from_bits_retain(original);
        Self {
            word: original,
            original,
            negative: false,
            concealed: false,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn original(&self) -> u16 {
        self.original.bits()
    }

    pub fn set_foreground(&mut self, color: Color, bright: bool) {
        self.word.remove(ConsoleAttributes::FOREGROUND_MASK);
        self.word.insert(ConsoleAttributes::foreground(color));
        if bright {
            self.word.insert(ConsoleAttributes::FOREGROUND_INTENSITY);
        }
    }

    pub fn set_background(&mut self, color: Color, bright: bool) {
        self.word.remove(ConsoleAttributes::BACKGROUND_MASK);
        self.word.insert(ConsoleAttributes::background(color));
        if bright {
            self.word.insert(ConsoleAttributes::BACKGROUND_INTENSITY);
        }
    }

    pub fn set_negative(&mut self, negative: bool) {
        self.negative = negative;
    }

    /// Apply one SGR attribute. Returns false when it has no console equivalent.
    pub fn apply(&mut self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Reset => {
                let keep = self.word.bits() & !0x00FF;
                self.word = ConsoleAttributes::from_bits_retain(keep | (self.original.bits() & 0x00FF));
                self.negative = false;
                self.concealed = false;
            }
            Attribute::Bold => self.word.insert(ConsoleAttributes::FOREGROUND_INTENSITY),
            Attribute::Faint | Attribute::NormalIntensity => {
                self.word.remove(ConsoleAttributes::FOREGROUND_INTENSITY)
            }
            Attribute::Underline | Attribute::UnderlineDouble | Attribute::Strikethrough => {
                self.word.insert(ConsoleAttributes::BACKGROUND_INTENSITY)
            }
            Attribute::UnderlineOff | Attribute::StrikethroughOff => {
                self.word.remove(ConsoleAttributes::BACKGROUND_INTENSITY)
            }
            Attribute::Negative => self.negative = true,
            Attribute::NegativeOff => self.negative = false,
            Attribute::Conceal => self.concealed = true,
            Attribute::ConcealOff => self.concealed = false,
            Attribute::Foreground(color) => self.set_foreground(color, false),
            Attribute::Background(color) => self.set_background(color, false),
            Attribute::BrightForeground(color) => self.set_foreground(color, true),
            Attribute::BrightBackground(color) => self.set_background(color, true),
            Attribute::DefaultForeground => {
                self.word.remove(ConsoleAttributes::FOREGROUND_MASK);
                self.word.insert(self.original & ConsoleAttributes::FOREGROUND_MASK);
            }
            Attribute::DefaultBackground => {
                self.word.remove(ConsoleAttributes::BACKGROUND_MASK);
                self.word.insert(self.original & ConsoleAttributes::BACKGROUND_MASK);
            }
            Attribute::Italic
            | Attribute::ItalicOff
            | Attribute::BlinkSlow
            | Attribute::BlinkFast
            | Attribute::BlinkOff
            | Attribute::Unknown(_) => return false,
        }
        true
    }

    /// The word to hand to the console, with conceal and negative folded in
    pub fn effective(&self) -> u16 {
        let mut word = self.word.bits();
        if self.concealed {
            word = (word & !0x000F) | ((word & 0x00F0) >> 4);
        }
        if self.negative {
            let fg = (word & 0x000F) << 4;
            let bg = (word & 0x00F0) >> 4;
            word = (word & 0xFF00) | fg | bg;
        }
        word
    }
}

/// Console cell coordinate (0-based)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coord {
    pub x: i16,
    pub y: i16,
}

impl Coord {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Inclusive rectangle of console cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.right as i32 - self.left as i32 + 1
    }

    pub fn height(&self) -> i32 {
        self.bottom as i32 - self.top as i32 + 1
    }
}

/// Screen buffer snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenInfo {
    /// Buffer size in cells
    pub size: Coord,
    pub cursor: Coord,
    pub attributes: u16,
    /// Visible window within the buffer
    pub window: Rect,
}

/// The console operations the translator needs
pub trait ConsoleApi {
    fn screen_info(&self) -> io::Result<ScreenInfo>;
    fn set_text_attribute(&self, attributes: u16) -> io::Result<()>;
    fn set_cursor_position(&self, position: Coord) -> io::Result<()>;
    /// Fill `length` cells from `origin` with `ch` in `attributes`
    fn fill(&self, ch: char, attributes: u16, length: u32, origin: Coord) -> io::Result<()>;
    /// Move `region` so its top-left lands on `destination`, clipped to `clip`
    fn scroll(&self, region: Rect, clip: Rect, destination: Coord, fill_attributes: u16) -> io::Result<()>;
}

/// Failed console calls are cosmetic: logged, asserted in debug builds, never propagated
fn check(call: &'static str, result: io::Result<()>) {
    if let Err(source) = result {
        let error = TerminalError::NativeCall { call, source };
        debug!("{error}");
        debug_assert!(false, "{error}");
    }
}

fn clamp(value: i32, low: i16, high: i16) -> i16 {
    value.clamp(low as i32, (high as i32).max(low as i32)) as i16
}

/// [`AnsiHandler`] that drives a Windows console
pub struct WindowsTranslator<C: ConsoleApi> {
    console: C,
    state: AttributeState,
    saved_cursor: Option<Coord>,
}

impl<C: ConsoleApi> WindowsTranslator<C> {
    /// Fails if the screen buffer can't be queried (e.g. output is redirected)
    pub fn new(console: C) -> io::Result<Self> {
        let info = console.screen_info()?;
        Ok(Self {
            console,
            state: AttributeState::new(info.attributes),
            saved_cursor: None,
        })
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn attributes(&self) -> &AttributeState {
        &self.state
    }

    fn apply_attributes(&self) {
        check("SetConsoleTextAttribute", self.console.set_text_attribute(self.state.effective()));
    }

    fn move_cursor(&self, f: impl FnOnce(&ScreenInfo) -> Coord) {
        match self.console.screen_info() {
            Ok(info) => {
                let position = f(&info);
                check("SetConsoleCursorPosition", self.console.set_cursor_position(position));
            }
            Err(e) => check("GetConsoleScreenBufferInfo", Err(e)),
        }
    }

    fn erase_screen(&self, info: &ScreenInfo, mode: Erase) {
        let width = info.size.x as i32;
        let window = info.window;
        let cursor = info.cursor;
        let (origin, length) = match mode {
            Erase::All => (Coord::new(0, window.top), window.height() * width),
            Erase::ToBeginning => (
                Coord::new(0, window.top),
                (cursor.y as i32 - window.top as i32) * width + cursor.x as i32 + 1,
            ),
            Erase::ToEnd => (
                cursor,
                (window.bottom as i32 - cursor.y as i32) * width + (width - cursor.x as i32),
            ),
        };
        self.fill(origin, length);
    }

    fn erase_line(&self, info: &ScreenInfo, mode: Erase) {
        let width = info.size.x as i32;
        let cursor = info.cursor;
        let (origin, length) = match mode {
            Erase::All => (Coord::new(0, cursor.y), width),
            Erase::ToBeginning => (Coord::new(0, cursor.y), cursor.x as i32 + 1),
            Erase::ToEnd => (cursor, width - cursor.x as i32),
        };
        self.fill(origin, length);
    }

    fn fill(&self, origin: Coord, length: i32) {
        if length <= 0 {
            return;
        }
        check(
            "FillConsoleOutput",
            self.console.fill(' ', self.state.original(), length as u32, origin),
        );
    }

    /// Positive scrolls content up, negative down
    fn scroll(&self, info: &ScreenInfo, rows: i32) {
        if rows == 0 {
            return;
        }
        let region = Rect {
            left: 0,
            top: info.window.top,
            right: info.size.x.saturating_sub(1),
            bottom: info.window.bottom,
        };
        let destination = Coord::new(0, clamp(info.window.top as i32 - rows, i16::MIN, i16::MAX));
        check(
            "ScrollConsoleScreenBuffer",
            self.console.scroll(region, region, destination, self.state.effective()),
        );
    }
}

impl<C: ConsoleApi> AnsiHandler for WindowsTranslator<C> {
    fn handle(&mut self, command: &AnsiCommand, out: &mut dyn Write) -> io::Result<()> {
        // text written so far must reach the console before its state changes
        out.flush()?;

        match *command {
            AnsiCommand::CursorUp(n) => self.move_cursor(|info| Coord {
                x: info.cursor.x,
                y: clamp(info.cursor.y as i32 - n as i32, info.window.top, info.window.bottom),
            }),
            AnsiCommand::CursorDown(n) => self.move_cursor(|info| Coord {
                x: info.cursor.x,
                y: clamp(info.cursor.y as i32 + n as i32, info.window.top, info.window.bottom),
            }),
            AnsiCommand::CursorForward(n) => self.move_cursor(|info| Coord {
                x: clamp(info.cursor.x as i32 + n as i32, info.window.left, info.window.right),
                y: info.cursor.y,
            }),
            AnsiCommand::CursorBack(n) => self.move_cursor(|info| Coord {
                x: clamp(info.cursor.x as i32 - n as i32, info.window.left, info.window.right),
                y: info.cursor.y,
            }),
            AnsiCommand::CursorNextLine(n) => self.move_cursor(|info| Coord {
                x: info.window.left,
                y: clamp(info.cursor.y as i32 + n as i32, info.window.top, info.window.bottom),
            }),
            AnsiCommand::CursorPrevLine(n) => self.move_cursor(|info| Coord {
                x: info.window.left,
                y: clamp(info.cursor.y as i32 - n as i32, info.window.top, info.window.bottom),
            }),
            AnsiCommand::CursorToColumn(col) => self.move_cursor(|info| Coord {
                x: clamp(info.window.left as i32 + col as i32 - 1, info.window.left, info.window.right),
                y: info.cursor.y,
            }),
            AnsiCommand::CursorPosition { row, col } => self.move_cursor(|info| Coord {
                x: clamp(info.window.left as i32 + col as i32 - 1, info.window.left, info.window.right),
                y: clamp(info.window.top as i32 + row as i32 - 1, info.window.top, info.window.bottom),
            }),
            AnsiCommand::EraseScreen(mode) => match self.console.screen_info() {
                Ok(info) => self.erase_screen(&info, mode),
                Err(e) => check("GetConsoleScreenBufferInfo", Err(e)),
            },
            AnsiCommand::EraseLine(mode) => match self.console.screen_info() {
                Ok(info) => self.erase_line(&info, mode),
                Err(e) => check("GetConsoleScreenBufferInfo", Err(e)),
            },
            AnsiCommand::ScrollUp(n) | AnsiCommand::ScrollDown(n) => {
                let rows = if matches!(command, AnsiCommand::ScrollUp(_)) { n as i32 } else { -(n as i32) };
                match self.console.screen_info() {
                    Ok(info) => self.scroll(&info, rows),
                    Err(e) => check("GetConsoleScreenBufferInfo", Err(e)),
                }
            }
            AnsiCommand::SaveCursor => match self.console.screen_info() {
                Ok(info) => self.saved_cursor = Some(info.cursor),
                Err(e) => check("GetConsoleScreenBufferInfo", Err(e)),
            },
            AnsiCommand::RestoreCursor => {
                // only after a save
                if let Some(position) = self.saved_cursor {
                    check("SetConsoleCursorPosition", self.console.set_cursor_position(position));
                }
            }
            AnsiCommand::SetAttributes(ref attributes) => {
                let mut changed = false;
                for &attribute in attributes {
                    changed |= self.state.apply(attribute);
                }
                if changed {
                    self.apply_attributes();
                }
            }
            AnsiCommand::Unknown { .. } | AnsiCommand::OperatingSystem { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::core::ansi::writer::AnsiWriter;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Attribute(u16),
        Cursor(Coord),
        Fill { ch: char, attributes: u16, length: u32, origin: Coord },
        Scroll { region: Rect, destination: Coord },
    }

    /// In-memory console: 80x300 buffer, 80x25 window scrolled to row 100
    pub struct FakeConsole {
        pub info: RefCell<ScreenInfo>,
        pub calls: RefCell<Vec<Call>>,
    }

    impl FakeConsole {
        pub fn new() -> Self {
            Self {
                info: RefCell::new(ScreenInfo {
                    size: Coord::new(80, 300),
                    cursor: Coord::new(10, 105),
                    attributes: 0x0007,
                    window: Rect { left: 0, top: 100, right: 79, bottom: 124 },
                }),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn cursor(&self) -> Coord {
            self.info.borrow().cursor
        }
    }

    impl ConsoleApi for FakeConsole {
        fn screen_info(&self) -> io::Result<ScreenInfo> {
            Ok(*self.info.borrow())
        }

        fn set_text_attribute(&self, attributes: u16) -> io::Result<()> {
            self.info.borrow_mut().attributes = attributes;
            self.calls.borrow_mut().push(Call::Attribute(attributes));
            Ok(())
        }

        fn set_cursor_position(&self, position: Coord) -> io::Result<()> {
            self.info.borrow_mut().cursor = position;
            self.calls.borrow_mut().push(Call::Cursor(position));
            Ok(())
        }

        fn fill(&self, ch: char, attributes: u16, length: u32, origin: Coord) -> io::Result<()> {
            self.calls.borrow_mut().push(Call::Fill { ch, attributes, length, origin });
            Ok(())
        }

        fn scroll(&self, region: Rect, _clip: Rect, destination: Coord, _fill: u16) -> io::Result<()> {
            self.calls.borrow_mut().push(Call::Scroll { region, destination });
            Ok(())
        }
    }

    fn writer() -> AnsiWriter<Vec<u8>, WindowsTranslator<FakeConsole>> {
        AnsiWriter::new(Vec::new(), WindowsTranslator::new(FakeConsole::new()).unwrap())
    }

    fn last_call(w: &AnsiWriter<Vec<u8>, WindowsTranslator<FakeConsole>>) -> Option<Call> {
        w.handler().console().calls.borrow().last().cloned()
    }

    #[test]
    fn test_negative_is_a_pure_swap() {
        let mut swapped = AttributeState::new(0x0007);
        swapped.set_foreground(Color::Red, false);
        swapped.set_background(Color::Blue, false);
        swapped.set_negative(true);

        let mut plain = AttributeState::new(0x0007);
        plain.set_foreground(Color::Blue, false);
        plain.set_background(Color::Red, false);

        assert_eq!(swapped.effective(), plain.effective());
        assert_eq!(plain.effective(), 0x0041);
    }

    #[test]
    fn test_negative_swap_keeps_high_byte() {
        let mut state = AttributeState::new(0x8007);
        state.apply(Attribute::Negative);
        assert_eq!(state.effective(), 0x8070);
    }

    #[test]
    fn test_bright_colors_add_intensity() {
        let mut state = AttributeState::new(0x0007);
        state.apply(Attribute::BrightForeground(Color::Green));
        state.apply(Attribute::BrightBackground(Color::Black));
        assert_eq!(state.effective(), 0x000A | 0x0080);
    }

    #[test]
    fn test_reset_restores_original() {
        let mut state = AttributeState::new(0x001E);
        state.apply(Attribute::Foreground(Color::Red));
        state.apply(Attribute::Bold);
        state.apply(Attribute::Negative);
        state.apply(Attribute::Reset);
        assert_eq!(state.effective(), 0x001E);
        assert!(!state.is_negative());
    }

    #[test]
    fn test_default_colors_use_original_nibbles() {
        let mut state = AttributeState::new(0x001E);
        state.apply(Attribute::Foreground(Color::Red));
        state.apply(Attribute::Background(Color::Green));
        state.apply(Attribute::DefaultForeground);
        assert_eq!(state.effective(), 0x002E);
        state.apply(Attribute::DefaultBackground);
        assert_eq!(state.effective(), 0x001E);
    }

    #[test]
    fn test_underline_and_strikethrough_use_background_intensity() {
        let mut state = AttributeState::new(0x0007);
        state.apply(Attribute::Underline);
        assert_eq!(state.effective(), 0x0087);
        state.apply(Attribute::StrikethroughOff);
        assert_eq!(state.effective(), 0x0007);
        assert!(!state.apply(Attribute::Italic));
    }

    #[test]
    fn test_conceal_hides_foreground() {
        let mut state = AttributeState::new(0x0007);
        state.apply(Attribute::Background(Color::Blue));
        state.apply(Attribute::Conceal);
        assert_eq!(state.effective(), 0x0011);
        state.apply(Attribute::ConcealOff);
        assert_eq!(state.effective(), 0x0017);
    }

    #[test]
    fn test_sgr_sets_console_attribute() {
        let mut w = writer();
        w.write_all(b"ab\x1b[31;44mcd").unwrap();
        assert_eq!(w.get_ref(), b"abcd");
        assert_eq!(last_call(&w), Some(Call::Attribute(0x0014)));
    }

    #[test]
    fn test_cursor_moves_clamp_to_window() {
        let mut w = writer();
        w.write_all(b"\x1b[50A").unwrap();
        assert_eq!(w.handler().console().cursor(), Coord::new(10, 100));
        w.write_all(b"\x1b[500C").unwrap();
        assert_eq!(w.handler().console().cursor(), Coord::new(79, 100));
        w.write_all(b"\x1b[99B\x1b[3D").unwrap();
        assert_eq!(w.handler().console().cursor(), Coord::new(76, 124));
        w.write_all(b"\x1b[2;5H").unwrap();
        assert_eq!(w.handler().console().cursor(), Coord::new(4, 101));
        w.write_all(b"\x1b[12G").unwrap();
        assert_eq!(w.handler().console().cursor(), Coord::new(11, 101));
        w.write_all(b"\x1b[E").unwrap();
        assert_eq!(w.handler().console().cursor(), Coord::new(0, 102));
    }

    #[test]
    fn test_erase_line_cell_counts() {
        let mut w = writer();
        w.write_all(b"\x1b[K").unwrap();
        assert_eq!(
            last_call(&w),
            Some(Call::Fill { ch: ' ', attributes: 0x0007, length: 70, origin: Coord::new(10, 105) })
        );
        w.write_all(b"\x1b[1K").unwrap();
        assert_eq!(
            last_call(&w),
            Some(Call::Fill { ch: ' ', attributes: 0x0007, length: 11, origin: Coord::new(0, 105) })
        );
        w.write_all(b"\x1b[2K").unwrap();
        assert_eq!(
            last_call(&w),
            Some(Call::Fill { ch: ' ', attributes: 0x0007, length: 80, origin: Coord::new(0, 105) })
        );
    }

    #[test]
    fn test_erase_screen_cell_counts() {
        let mut w = writer();
        w.write_all(b"\x1b[2J").unwrap();
        assert_eq!(
            last_call(&w),
            Some(Call::Fill { ch: ' ', attributes: 0x0007, length: 25 * 80, origin: Coord::new(0, 100) })
        );
        w.write_all(b"\x1b[J").unwrap();
        assert_eq!(
            last_call(&w),
            Some(Call::Fill { ch: ' ', attributes: 0x0007, length: 19 * 80 + 70, origin: Coord::new(10, 105) })
        );
        w.write_all(b"\x1b[1J").unwrap();
        assert_eq!(
            last_call(&w),
            Some(Call::Fill { ch: ' ', attributes: 0x0007, length: 5 * 80 + 11, origin: Coord::new(0, 100) })
        );
    }

    #[test]
    fn test_scroll_moves_window_region() {
        let mut w = writer();
        w.write_all(b"\x1b[3S").unwrap();
        let region = Rect { left: 0, top: 100, right: 79, bottom: 124 };
        assert_eq!(last_call(&w), Some(Call::Scroll { region, destination: Coord::new(0, 97) }));
        w.write_all(b"\x1b[T").unwrap();
        assert_eq!(last_call(&w), Some(Call::Scroll { region, destination: Coord::new(0, 101) }));
    }

    #[test]
    fn test_save_restore_cursor() {
        let mut w = writer();
        w.write_all(b"\x1b[u").unwrap();
        assert!(w.handler().console().calls.borrow().is_empty());

        w.write_all(b"\x1b[s\x1b[1;1H\x1b[u").unwrap();
        assert_eq!(w.handler().console().cursor(), Coord::new(10, 105));
    }

    #[test]
    fn test_unknown_sequences_are_swallowed() {
        let mut w = writer();
        w.write_all(b"\x1b[?25lx\x1b]0;title\x07").unwrap();
        assert_eq!(w.get_ref(), b"x");
        assert!(w.handler().console().calls.borrow().is_empty());
    }
}
