//! rawcon - raw console input and portable ANSI output
//!
//! ```no_run
//! use rawcon::{Config, ConsoleSession};
//!
//! let session = ConsoleSession::open(Config::load());
//! if let Some(line) = session.read_line_string() {
//!     println!("got {line}");
//! }
//! ```

pub mod config;
pub mod core;

pub use config::Config;
pub use self::core::ansi::{Ansi, AnsiOutput, AnsiString, OutputMode};
pub use self::core::input::InputStream;
pub use self::core::session::ConsoleSession;
pub use self::core::terminal::{Terminal, TerminalDriver, TerminalError, TerminalType};
