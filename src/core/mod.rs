//! Core console components.
//!
//! - **terminal**: per-platform raw mode, echo, interrupt and size
//! - **ansi**: escape sequence parsing, stripping and Windows translation
//! - **input**: reader thread fanning keystrokes out to blocked readers
//! - **session**: ties a terminal and the input demux together
//!
//! # Architecture
//!
//! ```text
//! ConsoleSession
//! ├── Terminal (Posix | Windows | Unsupported)
//! ├── InputDemux
//! │   ├── reader thread ── Terminal::read_raw
//! │   ├── char waiters / line buffers
//! │   └── echo output (backspace erase via Ansi)
//! └── AnsiOutput (Strip | PassThrough | Windows)
//!     └── EscapeParser → AnsiHandler
//! ```

pub mod ansi;
pub mod input;
pub mod session;
pub mod terminal;
