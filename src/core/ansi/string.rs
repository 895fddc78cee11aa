//! Text that may carry escape sequences, measured by what it renders

use std::fmt;
use std::io::Write;

use super::writer::AnsiWriter;

/// `text` with every escape sequence removed
pub fn strip_str(text: &str) -> String {
    let mut writer = AnsiWriter::strip(Vec::new());
    // writing into a Vec cannot fail
    let _ = writer.write_all(text.as_bytes()).and_then(|_| writer.close());
    // only whole ASCII sequences are removed, so the rest is still UTF-8
    String::from_utf8_lossy(writer.get_ref()).into_owned()
}

/// A string paired with its rendered (escape-free) form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsiString {
    encoded: String,
    plain: String,
}

impl AnsiString {
    pub fn new(text: impl Into<String>) -> Self {
        let encoded = text.into();
        let plain = strip_str(&encoded);
        Self { encoded, plain }
    }

    /// The text as given, escapes included
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The text as it appears on screen
    pub fn plain(&self) -> &str {
        &self.plain
    }

    /// Visible characters
    pub fn len(&self) -> usize {
        self.plain.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_empty()
    }
}

impl From<&str> for AnsiString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for AnsiString {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for AnsiString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
