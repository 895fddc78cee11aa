//! Platform terminal drivers
//!
//! A [`Terminal`] puts the console into raw (per-keystroke) mode, toggles
//! echo and interrupt handling, reports the window size and reads one
//! character at a time. Drivers:
//!
//! - **posix**: termios via rustix
//! - **windows**: console API
//! - **unsupported**: line-buffered stdin, used whenever neither applies

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

#[cfg(unix)]
pub mod posix;
pub mod unsupported;
#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use posix::PosixTerminal;
pub use unsupported::UnsupportedTerminal;
#[cfg(windows)]
pub use self::windows::WindowsTerminal;

/// Width reported when the driver can't tell
pub const DEFAULT_WIDTH: u16 = 80;
/// Height reported when the driver can't tell
pub const DEFAULT_HEIGHT: u16 = 24;

/// Requested driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalType {
    /// Pick by platform
    #[default]
    Auto,
    Unix,
    Windows,
    /// Never touch the terminal
    None,
}

impl TerminalType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "unix" | "posix" => Some(Self::Unix),
            "windows" | "win" => Some(Self::Windows),
            "none" | "unsupported" => Some(Self::None),
            _ => None,
        }
    }

    /// What `Auto` means on this platform
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(windows) => Self::Windows,
            Self::Auto => Self::Unix,
            other => other,
        }
    }
}

impl fmt::Display for TerminalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Unix => "unix",
            Self::Windows => "windows",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("Standard input is not a terminal")]
    NotATerminal,

    #[error("Failed to initialize terminal: {0}")]
    Initialization(#[source] io::Error),

    #[error("Terminal type '{0}' is not available on this platform")]
    UnsupportedPlatform(TerminalType),

    #[error("{call} failed: {source}")]
    NativeCall {
        call: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TerminalError>;

/// Operations every driver provides
pub trait TerminalDriver: Send + Sync {
    /// Switch to per-keystroke input
    fn enable_raw(&self) -> Result<()>;
    /// Put the terminal back the way it was found
    fn restore(&self) -> Result<()>;
    fn set_echo(&self, enabled: bool) -> Result<()>;
    /// Whether Ctrl+C raises a signal instead of arriving as input
    fn set_interrupt(&self, enabled: bool) -> Result<()>;
    fn width(&self) -> u16;
    fn height(&self) -> u16;
    /// Block for the next character. `None` means input has ended.
    fn read_raw(&self) -> Option<char>;
}

/// The driver in use
pub enum Terminal {
    #[cfg(unix)]
    Posix(PosixTerminal),
    #[cfg(windows)]
    Windows(WindowsTerminal),
    Unsupported(UnsupportedTerminal),
}

impl Terminal {
    /// Open the requested driver in raw mode. Never fails: anything that
    /// goes wrong lands on the unsupported driver.
    pub fn open(requested: TerminalType) -> Self {
        match Self::try_open(requested) {
            Ok(terminal) => {
                info!("Terminal driver: {}", terminal.kind());
                terminal
            }
            Err(TerminalError::NotATerminal) => {
                debug!("Input is not a terminal, using line input");
                Self::unsupported()
            }
            Err(e) => {
                error!("Terminal '{}' unavailable, using line input: {}", requested, e);
                Self::unsupported()
            }
        }
    }

    fn try_open(requested: TerminalType) -> Result<Self> {
        let terminal = match requested.resolve() {
            TerminalType::Unix => Self::open_unix()?,
            TerminalType::Windows => Self::open_windows()?,
            _ => {
                debug!("Terminal disabled by configuration");
                return Ok(Self::unsupported());
            }
        };
        terminal.enable_raw()?;
        Ok(terminal)
    }

    #[cfg(unix)]
    fn open_unix() -> Result<Self> {
        PosixTerminal::new().map(Self::Posix)
    }

    #[cfg(not(unix))]
    fn open_unix() -> Result<Self> {
        Err(TerminalError::UnsupportedPlatform(TerminalType::Unix))
    }

    #[cfg(windows)]
    fn open_windows() -> Result<Self> {
        WindowsTerminal::new().map(Self::Windows)
    }

    #[cfg(not(windows))]
    fn open_windows() -> Result<Self> {
        Err(TerminalError::UnsupportedPlatform(TerminalType::Windows))
    }

    /// Line-buffered driver over process stdin
    pub fn unsupported() -> Self {
        Self::Unsupported(UnsupportedTerminal::stdin())
    }

    pub fn kind(&self) -> TerminalType {
        match self {
            #[cfg(unix)]
            Self::Posix(_) => TerminalType::Unix,
            #[cfg(windows)]
            Self::Windows(_) => TerminalType::Windows,
            Self::Unsupported(_) => TerminalType::None,
        }
    }

    fn driver(&self) -> &dyn TerminalDriver {
        match self {
            #[cfg(unix)]
            Self::Posix(t) => t,
            #[cfg(windows)]
            Self::Windows(t) => t,
            Self::Unsupported(t) => t,
        }
    }
}

impl TerminalDriver for Terminal {
    fn enable_raw(&self) -> Result<()> {
        self.driver().enable_raw()
    }

    fn restore(&self) -> Result<()> {
        self.driver().restore()
    }

    fn set_echo(&self, enabled: bool) -> Result<()> {
        self.driver().set_echo(enabled)
    }

    fn set_interrupt(&self, enabled: bool) -> Result<()> {
        self.driver().set_interrupt(enabled)
    }

    fn width(&self) -> u16 {
        self.driver().width()
    }

    fn height(&self) -> u16 {
        self.driver().height()
    }

    fn read_raw(&self) -> Option<char> {
        self.driver().read_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terminal_type() {
        assert_eq!(TerminalType::parse("Unix"), Some(TerminalType::Unix));
        assert_eq!(TerminalType::parse("none"), Some(TerminalType::None));
        assert_eq!(TerminalType::parse("win"), Some(TerminalType::Windows));
        assert_eq!(TerminalType::parse("vt52"), None);
    }

    #[test]
    fn test_auto_resolves_by_platform() {
        let expected = if cfg!(windows) { TerminalType::Windows } else { TerminalType::Unix };
        assert_eq!(TerminalType::Auto.resolve(), expected);
        assert_eq!(TerminalType::None.resolve(), TerminalType::None);
    }

    #[test]
    fn test_none_selects_unsupported() {
        let terminal = Terminal::open(TerminalType::None);
        assert_eq!(terminal.kind(), TerminalType::None);
        assert_eq!(terminal.width(), DEFAULT_WIDTH);
        assert_eq!(terminal.height(), DEFAULT_HEIGHT);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_foreign_platform_falls_back() {
        let terminal = Terminal::open(TerminalType::Windows);
        assert_eq!(terminal.kind(), TerminalType::None);
    }

    #[test]
    fn test_error_messages() {
        let e = TerminalError::UnsupportedPlatform(TerminalType::Windows);
        assert_eq!(e.to_string(), "Terminal type 'windows' is not available on this platform");
        let e = TerminalError::NativeCall {
            call: "tcsetattr",
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(e.to_string().starts_with("tcsetattr failed"));
    }
}
