//! ANSI escape sequence parser
//!
//! Splits an output byte stream into plain text and [`AnsiCommand`]s.
//! Anything that does not parse is handed back as raw bytes so the
//! caller can forward it unchanged.

/// Longest sequence the parser will buffer before giving up on it
pub const MAX_ESCAPE_SEQUENCE_LENGTH: usize = 100;

/// Attribute reset: ESC [ m
pub const RESET_CODE: &[u8] = b"\x1b[m";

const ESC: u8 = 0x1B;
const BEL: u8 = 0x07;

/// Erase mode for ED / EL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Erase {
    /// From the cursor to the end of the screen or line
    ToEnd,
    /// From the start of the screen or line to the cursor
    ToBeginning,
    /// The whole screen or line
    All,
}

impl Erase {
    pub fn from_param(param: u16) -> Option<Self> {
        match param {
            0 => Some(Erase::ToEnd),
            1 => Some(Erase::ToBeginning),
            2 => Some(Erase::All),
            _ => None,
        }
    }

    pub fn param(self) -> u16 {
        match self {
            Erase::ToEnd => 0,
            Erase::ToBeginning => 1,
            Erase::All => 2,
        }
    }
}

/// The eight base ANSI colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    pub const ALL: [Color; 8] = [
        Color::Black,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::White,
    ];

    pub fn from_index(index: u16) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u16 {
        self as u16
    }
}

/// A single SGR parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Reset,
    Bold,
    Faint,
    Italic,
    Underline,
    BlinkSlow,
    BlinkFast,
    Negative,
    Conceal,
    Strikethrough,
    UnderlineDouble,
    /// Neither bold nor faint
    NormalIntensity,
    ItalicOff,
    UnderlineOff,
    BlinkOff,
    NegativeOff,
    ConcealOff,
    StrikethroughOff,
    Foreground(Color),
    Background(Color),
    BrightForeground(Color),
    BrightBackground(Color),
    DefaultForeground,
    DefaultBackground,
    Unknown(u16),
}

impl Attribute {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Attribute::Reset,
            1 => Attribute::Bold,
            2 => Attribute::Faint,
            3 => Attribute::Italic,
            4 => Attribute::Underline,
            5 => Attribute::BlinkSlow,
            6 => Attribute::BlinkFast,
            7 => Attribute::Negative,
            8 => Attribute::Conceal,
            9 => Attribute::Strikethrough,
            21 => Attribute::UnderlineDouble,
            22 => Attribute::NormalIntensity,
            23 => Attribute::ItalicOff,
            24 => Attribute::UnderlineOff,
            25 => Attribute::BlinkOff,
            27 => Attribute::NegativeOff,
            28 => Attribute::ConcealOff,
            29 => Attribute::StrikethroughOff,
            39 => Attribute::DefaultForeground,
            49 => Attribute::DefaultBackground,
            30..=37 => Color::from_index(code - 30).map_or(Attribute::Unknown(code), Attribute::Foreground),
            40..=47 => Color::from_index(code - 40).map_or(Attribute::Unknown(code), Attribute::Background),
            90..=97 => Color::from_index(code - 90).map_or(Attribute::Unknown(code), Attribute::BrightForeground),
            100..=107 => Color::from_index(code - 100).map_or(Attribute::Unknown(code), Attribute::BrightBackground),
            _ => Attribute::Unknown(code),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Attribute::Reset => 0,
            Attribute::Bold => 1,
            Attribute::Faint => 2,
            Attribute::Italic => 3,
            Attribute::Underline => 4,
            Attribute::BlinkSlow => 5,
            Attribute::BlinkFast => 6,
            Attribute::Negative => 7,
            Attribute::Conceal => 8,
            Attribute::Strikethrough => 9,
            Attribute::UnderlineDouble => 21,
            Attribute::NormalIntensity => 22,
            Attribute::ItalicOff => 23,
            Attribute::UnderlineOff => 24,
            Attribute::BlinkOff => 25,
            Attribute::NegativeOff => 27,
            Attribute::ConcealOff => 28,
            Attribute::StrikethroughOff => 29,
            Attribute::Foreground(c) => 30 + c.index(),
            Attribute::Background(c) => 40 + c.index(),
            Attribute::BrightForeground(c) => 90 + c.index(),
            Attribute::BrightBackground(c) => 100 + c.index(),
            Attribute::DefaultForeground => 39,
            Attribute::DefaultBackground => 49,
            Attribute::Unknown(code) => code,
        }
    }
}

/// A recognized escape sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnsiCommand {
    CursorUp(u16),
    CursorDown(u16),
    CursorForward(u16),
    CursorBack(u16),
    /// Down n lines, to column 1
    CursorNextLine(u16),
    /// Up n lines, to column 1
    CursorPrevLine(u16),
    /// 1-based column
    CursorToColumn(u16),
    /// 1-based row and column
    CursorPosition { row: u16, col: u16 },
    EraseScreen(Erase),
    EraseLine(Erase),
    ScrollUp(u16),
    ScrollDown(u16),
    SaveCursor,
    RestoreCursor,
    SetAttributes(Vec<Attribute>),
    /// Well-formed CSI with an alphabetic final byte we don't act on
    Unknown {
        private: Option<u8>,
        params: Vec<Option<u16>>,
        final_byte: u8,
    },
    /// OSC: ESC ] n ; text (BEL | ESC \)
    OperatingSystem { command: u16, text: String },
}

/// Result of feeding one byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Plain byte, not part of any sequence
    Text(u8),
    /// Byte buffered as part of a sequence in progress
    Pending,
    /// A sequence completed
    Command(AnsiCommand),
    /// Bytes that turned out not to be a valid sequence, to be written as-is
    Rejected(Vec<u8>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    Csi,
    OscCommand,
    OscText,
    OscEscape,
}

/// Escape sequence parser state machine
#[derive(Debug, Default)]
pub struct EscapeParser {
    state: ParserState,
    buffer: Vec<u8>,
    params: Vec<Option<u16>>,
    current_param: Option<u16>,
    private: Option<u8>,
    osc_command: u16,
    osc_text: Vec<u8>,
}

impl EscapeParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_ESCAPE_SEQUENCE_LENGTH),
            params: Vec::with_capacity(16),
            ..Self::default()
        }
    }

    /// True while a sequence is partially buffered
    pub fn is_pending(&self) -> bool {
        self.state != ParserState::Ground
    }

    /// Abandon any partial sequence, returning its bytes
    pub fn take_pending(&mut self) -> Vec<u8> {
        let bytes = std::mem::take(&mut self.buffer);
        self.reset();
        bytes
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8) -> Feed {
        match self.state {
            ParserState::Ground => {
                if byte == ESC {
                    self.enter_escape();
                    Feed::Pending
                } else {
                    Feed::Text(byte)
                }
            }
            ParserState::Escape => self.escape(byte),
            ParserState::Csi => self.csi(byte),
            ParserState::OscCommand => self.osc_command(byte),
            ParserState::OscText => self.osc_text(byte),
            ParserState::OscEscape => self.osc_escape(byte),
        }
    }

    fn enter_escape(&mut self) {
        self.reset();
        self.buffer.push(ESC);
        self.state = ParserState::Escape;
    }

    fn reset(&mut self) {
        self.state = ParserState::Ground;
        self.buffer.clear();
        self.params.clear();
        self.current_param = None;
        self.private = None;
        self.osc_command = 0;
        self.osc_text.clear();
    }

    /// Give up on the buffered sequence, including `byte`
    fn reject(&mut self, byte: u8) -> Feed {
        self.buffer.push(byte);
        let raw = std::mem::take(&mut self.buffer);
        self.reset();
        Feed::Rejected(raw)
    }

    /// Give up on the buffered sequence and start a new one at this ESC
    fn restart(&mut self) -> Feed {
        let raw = std::mem::take(&mut self.buffer);
        self.enter_escape();
        Feed::Rejected(raw)
    }

    fn push(&mut self, byte: u8) -> Option<Feed> {
        self.buffer.push(byte);
        if self.buffer.len() >= MAX_ESCAPE_SEQUENCE_LENGTH {
            let raw = std::mem::take(&mut self.buffer);
            self.reset();
            return Some(Feed::Rejected(raw));
        }
        None
    }

    fn escape(&mut self, byte: u8) -> Feed {
        match byte {
            b'[' => {
                self.buffer.push(byte);
                self.state = ParserState::Csi;
                Feed::Pending
            }
            b']' => {
                self.buffer.push(byte);
                self.state = ParserState::OscCommand;
                Feed::Pending
            }
            ESC => self.restart(),
            _ => self.reject(byte),
        }
    }

    fn csi(&mut self, byte: u8) -> Feed {
        match byte {
            ESC => self.restart(),
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param.unwrap_or(0).saturating_mul(10).saturating_add(digit),
                );
                self.push(byte).unwrap_or(Feed::Pending)
            }
            b';' => {
                self.params.push(self.current_param.take());
                self.push(byte).unwrap_or(Feed::Pending)
            }
            b'?' | b'=' | b'>' if self.private.is_none() && self.params.is_empty() && self.current_param.is_none() => {
                self.private = Some(byte);
                self.push(byte).unwrap_or(Feed::Pending)
            }
            0x40..=0x7E => {
                if self.current_param.is_some() || !self.params.is_empty() {
                    self.params.push(self.current_param.take());
                }
                self.buffer.push(byte);
                match self.dispatch_csi(byte) {
                    Some(command) => {
                        self.reset();
                        Feed::Command(command)
                    }
                    None => {
                        let raw = std::mem::take(&mut self.buffer);
                        self.reset();
                        Feed::Rejected(raw)
                    }
                }
            }
            _ => self.reject(byte),
        }
    }

    fn osc_command(&mut self, byte: u8) -> Feed {
        match byte {
            ESC => self.restart(),
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.osc_command = self.osc_command.saturating_mul(10).saturating_add(digit);
                self.push(byte).unwrap_or(Feed::Pending)
            }
            // at least one digit must precede the separator
            b';' if self.buffer.len() > 2 => {
                self.state = ParserState::OscText;
                self.push(byte).unwrap_or(Feed::Pending)
            }
            _ => self.reject(byte),
        }
    }

    fn osc_text(&mut self, byte: u8) -> Feed {
        match byte {
            BEL => {
                self.buffer.push(byte);
                self.finish_osc()
            }
            ESC => {
                self.state = ParserState::OscEscape;
                self.push(byte).unwrap_or(Feed::Pending)
            }
            _ => {
                self.osc_text.push(byte);
                self.push(byte).unwrap_or(Feed::Pending)
            }
        }
    }

    fn osc_escape(&mut self, byte: u8) -> Feed {
        if byte == b'\\' {
            self.buffer.push(byte);
            return self.finish_osc();
        }
        // not a string terminator, both bytes belong to the text
        self.osc_text.push(ESC);
        self.osc_text.push(byte);
        self.state = ParserState::OscText;
        self.push(byte).unwrap_or(Feed::Pending)
    }

    fn finish_osc(&mut self) -> Feed {
        let command = AnsiCommand::OperatingSystem {
            command: self.osc_command,
            text: String::from_utf8_lossy(&self.osc_text).into_owned(),
        };
        self.reset();
        Feed::Command(command)
    }

    fn dispatch_csi(&self, final_byte: u8) -> Option<AnsiCommand> {
        let params = &self.params;
        let count = |index: usize| params.get(index).copied().flatten().unwrap_or(1).max(1);
        let value = |index: usize, default: u16| params.get(index).copied().flatten().unwrap_or(default);

        if self.private.is_some() {
            return final_byte.is_ascii_alphabetic().then(|| self.unknown(final_byte));
        }

        let command = match final_byte {
            b'A' => AnsiCommand::CursorUp(count(0)),
            b'B' => AnsiCommand::CursorDown(count(0)),
            b'C' => AnsiCommand::CursorForward(count(0)),
            b'D' => AnsiCommand::CursorBack(count(0)),
            b'E' => AnsiCommand::CursorNextLine(count(0)),
            b'F' => AnsiCommand::CursorPrevLine(count(0)),
            b'G' => AnsiCommand::CursorToColumn(count(0)),
            b'H' | b'f' => AnsiCommand::CursorPosition {
                row: count(0),
                col: count(1),
            },
            b'J' => match Erase::from_param(value(0, 0)) {
                Some(mode) => AnsiCommand::EraseScreen(mode),
                None => self.unknown(final_byte),
            },
            b'K' => match Erase::from_param(value(0, 0)) {
                Some(mode) => AnsiCommand::EraseLine(mode),
                None => self.unknown(final_byte),
            },
            b'S' => AnsiCommand::ScrollUp(count(0)),
            b'T' => AnsiCommand::ScrollDown(count(0)),
            b's' => AnsiCommand::SaveCursor,
            b'u' => AnsiCommand::RestoreCursor,
            b'm' => {
                let mut attributes: Vec<Attribute> =
                    params.iter().flatten().map(|&code| Attribute::from_code(code)).collect();
                if attributes.is_empty() {
                    attributes.push(Attribute::Reset);
                }
                AnsiCommand::SetAttributes(attributes)
            }
            b if b.is_ascii_alphabetic() => self.unknown(final_byte),
            _ => return None,
        };
        Some(command)
    }

    fn unknown(&self, final_byte: u8) -> AnsiCommand {
        AnsiCommand::Unknown {
            private: self.private,
            params: self.params.clone(),
            final_byte,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> (Vec<u8>, Vec<AnsiCommand>) {
        let mut parser = EscapeParser::new();
        let mut text = Vec::new();
        let mut commands = Vec::new();
        for &byte in bytes {
            match parser.feed(byte) {
                Feed::Text(b) => text.push(b),
                Feed::Pending => {}
                Feed::Command(c) => commands.push(c),
                Feed::Rejected(raw) => text.extend(raw),
            }
        }
        text.extend(parser.take_pending());
        (text, commands)
    }

    #[test]
    fn test_cursor_movement() {
        let (text, commands) = parse(b"\x1b[5;10H\x1b[3A\x1b[B");
        assert!(text.is_empty());
        assert_eq!(
            commands,
            vec![
                AnsiCommand::CursorPosition { row: 5, col: 10 },
                AnsiCommand::CursorUp(3),
                AnsiCommand::CursorDown(1),
            ]
        );
    }

    #[test]
    fn test_missing_params_default() {
        let (_, commands) = parse(b"\x1b[H\x1b[;7H\x1b[0C\x1b[G");
        assert_eq!(
            commands,
            vec![
                AnsiCommand::CursorPosition { row: 1, col: 1 },
                AnsiCommand::CursorPosition { row: 1, col: 7 },
                AnsiCommand::CursorForward(1),
                AnsiCommand::CursorToColumn(1),
            ]
        );
    }

    #[test]
    fn test_erase_modes() {
        let (_, commands) = parse(b"\x1b[J\x1b[1J\x1b[2K\x1b[3J");
        assert_eq!(commands[0], AnsiCommand::EraseScreen(Erase::ToEnd));
        assert_eq!(commands[1], AnsiCommand::EraseScreen(Erase::ToBeginning));
        assert_eq!(commands[2], AnsiCommand::EraseLine(Erase::All));
        assert!(matches!(commands[3], AnsiCommand::Unknown { final_byte: b'J', .. }));
    }

    #[test]
    fn test_sgr_colors() {
        let (_, commands) = parse(b"\x1b[1;31;44m\x1b[m\x1b[93;105;39m");
        assert_eq!(
            commands,
            vec![
                AnsiCommand::SetAttributes(vec![
                    Attribute::Bold,
                    Attribute::Foreground(Color::Red),
                    Attribute::Background(Color::Blue),
                ]),
                AnsiCommand::SetAttributes(vec![Attribute::Reset]),
                AnsiCommand::SetAttributes(vec![
                    Attribute::BrightForeground(Color::Yellow),
                    Attribute::BrightBackground(Color::Magenta),
                    Attribute::DefaultForeground,
                ]),
            ]
        );
    }

    #[test]
    fn test_attribute_codes_are_stable() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 21, 22, 23, 24, 25, 27, 28, 29, 31, 39, 46, 49, 92, 107] {
            assert_eq!(Attribute::from_code(code).code(), code);
        }
        assert_eq!(Attribute::from_code(58), Attribute::Unknown(58));
    }

    #[test]
    fn test_text_passes_through() {
        let (text, commands) = parse(b"plain [text] \xc3\xa9");
        assert_eq!(text, b"plain [text] \xc3\xa9");
        assert!(commands.is_empty());
    }

    #[test]
    fn test_private_mode_is_unknown() {
        let (text, commands) = parse(b"\x1b[?25l");
        assert!(text.is_empty());
        assert_eq!(
            commands,
            vec![AnsiCommand::Unknown {
                private: Some(b'?'),
                params: vec![Some(25)],
                final_byte: b'l',
            }]
        );
    }

    #[test]
    fn test_malformed_passes_through() {
        // non-CSI escape
        assert_eq!(parse(b"\x1b(B").0, b"\x1b(B");
        // intermediate byte
        assert_eq!(parse(b"\x1b[1 q").0, b"\x1b[1 q");
        // non-alphabetic final
        assert_eq!(parse(b"\x1b[2~").0, b"\x1b[2~");
        // truncated at end of input
        assert_eq!(parse(b"ab\x1b[12").0, b"ab\x1b[12");
    }

    #[test]
    fn test_escape_restarts_sequence() {
        let (text, commands) = parse(b"\x1b[3\x1b[31m");
        assert_eq!(text, b"\x1b[3");
        assert_eq!(commands, vec![AnsiCommand::SetAttributes(vec![Attribute::Foreground(Color::Red)])]);
    }

    #[test]
    fn test_overlong_sequence_is_rejected() {
        let mut input = b"\x1b[".to_vec();
        input.extend(std::iter::repeat(b'1').take(MAX_ESCAPE_SEQUENCE_LENGTH + 10));
        input.push(b'm');
        let (text, commands) = parse(&input);
        assert_eq!(text, input);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_osc_title() {
        let (text, commands) = parse(b"\x1b]0;hello\x07after\x1b]2;x\x1b\\");
        assert_eq!(text, b"after");
        assert_eq!(
            commands,
            vec![
                AnsiCommand::OperatingSystem { command: 0, text: "hello".into() },
                AnsiCommand::OperatingSystem { command: 2, text: "x".into() },
            ]
        );
    }
}
