//! ANSI escape sequence processing
//!
//! - **parser**: byte-at-a-time escape sequence recognizer
//! - **builder**: composes the sequences this crate emits
//! - **writer**: stripping and pass-through writers
//! - **html**: renders colors as HTML tags
//! - **string**: text measured without its escapes
//! - **translate**: maps commands onto a Windows console
//! - **output**: picks a mode per stream

pub mod builder;
pub mod html;
pub mod output;
pub mod parser;
pub mod string;
pub mod translate;
#[cfg(windows)]
pub mod win32;
pub mod writer;

pub use builder::Ansi;
pub use html::{HtmlHandler, HtmlWriter};
pub use output::{choose_output_mode, AnsiOutput, OutputMode, OutputProbe, StdStream};
pub use parser::{AnsiCommand, Attribute, Color, Erase, EscapeParser};
pub use string::{strip_str, AnsiString};
pub use writer::{AnsiHandler, AnsiWriter, PassThroughWriter, StripHandler};
