//! Output stream selection
//!
//! Decides once per stream whether escape sequences are stripped, passed
//! through, or translated into console calls, and wraps the stream
//! accordingly.

use std::io::{self, Write};

use crossterm::tty::IsTty;
use tracing::debug;

use super::writer::{AnsiWriter, PassThroughWriter, StripHandler};
#[cfg(windows)]
use super::{translate::WindowsTranslator, win32::Win32Console};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Remove all escape sequences
    Strip,
    /// Forward bytes unchanged
    PassThrough,
    /// Turn escape sequences into console API calls
    WindowsTranslate,
}

/// Which standard stream is being wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdout,
    Stderr,
}

/// Everything the mode decision depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputProbe {
    pub enable_ansi: bool,
    pub force_ansi: bool,
    pub is_tty: bool,
    /// Value of `TERM`
    pub term: Option<String>,
    pub windows: bool,
    /// Console accepted virtual terminal processing
    pub vt_supported: bool,
    /// A console screen buffer is attached to the stream
    pub console_available: bool,
}

impl OutputProbe {
    /// Inspect the process environment for `stream`
    pub fn detect(config: &Config, stream: StdStream) -> Self {
        let is_tty = match stream {
            StdStream::Stdout => io::stdout().is_tty(),
            StdStream::Stderr => io::stderr().is_tty(),
        };

        #[cfg(windows)]
        let (vt_supported, console_available) = {
            let console = match stream {
                StdStream::Stdout => Win32Console::stdout(),
                StdStream::Stderr => Win32Console::stderr(),
            };
            let console_available = console
                .map(|c| super::translate::ConsoleApi::screen_info(&c).is_ok())
                .unwrap_or(false);
            (is_tty && crossterm::ansi_support::supports_ansi(), console_available)
        };
        #[cfg(not(windows))]
        let (vt_supported, console_available) = (false, false);

        Self {
            enable_ansi: config.enable_ansi,
            force_ansi: config.force_ansi,
            is_tty,
            term: std::env::var("TERM").ok(),
            windows: cfg!(windows),
            vt_supported,
            console_available,
        }
    }
}

/// Pick the output mode. Disabling ANSI always wins, even over `force_ansi`.
pub fn choose_output_mode(probe: &OutputProbe) -> OutputMode {
    if !probe.enable_ansi {
        return OutputMode::Strip;
    }
    if probe.force_ansi {
        return OutputMode::PassThrough;
    }
    if probe.term.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("xterm")) {
        return OutputMode::PassThrough;
    }
    if probe.windows {
        if probe.vt_supported {
            OutputMode::PassThrough
        } else if probe.console_available {
            OutputMode::WindowsTranslate
        } else {
            OutputMode::Strip
        }
    } else if probe.is_tty {
        OutputMode::PassThrough
    } else {
        OutputMode::Strip
    }
}

/// An output stream wrapped for the chosen mode
pub enum AnsiOutput<W: Write> {
    Strip(AnsiWriter<W, StripHandler>),
    PassThrough(PassThroughWriter<W>),
    #[cfg(windows)]
    Windows(AnsiWriter<W, WindowsTranslator<Win32Console>>),
}

impl<W: Write> AnsiOutput<W> {
    /// Wrap `out`. Translation falls back to stripping when no console
    /// can be reached (and always off Windows).
    pub fn new(out: W, mode: OutputMode, stream: StdStream) -> Self {
        match mode {
            OutputMode::Strip => Self::Strip(AnsiWriter::strip(out)),
            OutputMode::PassThrough => Self::PassThrough(PassThroughWriter::new(out)),
            OutputMode::WindowsTranslate => Self::translated(out, stream),
        }
    }

    #[cfg(windows)]
    fn translated(out: W, stream: StdStream) -> Self {
        let console = match stream {
            StdStream::Stdout => Win32Console::stdout(),
            StdStream::Stderr => Win32Console::stderr(),
        };
        match console.and_then(WindowsTranslator::new) {
            Ok(translator) => Self::Windows(AnsiWriter::new(out, translator)),
            Err(e) => {
                debug!("Console translation unavailable, stripping: {}", e);
                Self::Strip(AnsiWriter::strip(out))
            }
        }
    }

    #[cfg(not(windows))]
    fn translated(out: W, stream: StdStream) -> Self {
        debug!("No console to translate {:?} into, stripping", stream);
        Self::Strip(AnsiWriter::strip(out))
    }

    pub fn mode(&self) -> OutputMode {
        match self {
            Self::Strip(_) => OutputMode::Strip,
            Self::PassThrough(_) => OutputMode::PassThrough,
            #[cfg(windows)]
            Self::Windows(_) => OutputMode::WindowsTranslate,
        }
    }

    pub fn get_ref(&self) -> &W {
        match self {
            Self::Strip(w) => w.get_ref(),
            Self::PassThrough(w) => w.get_ref(),
            #[cfg(windows)]
            Self::Windows(w) => w.get_ref(),
        }
    }

    /// Flush pending bytes; pass-through also resets attributes
    pub fn close(&mut self) -> io::Result<()> {
        match self {
            Self::Strip(w) => w.close(),
            Self::PassThrough(w) => w.close(),
            #[cfg(windows)]
            Self::Windows(w) => w.close(),
        }
    }
}

impl<W: Write> Write for AnsiOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Strip(w) => w.write(buf),
            Self::PassThrough(w) => w.write(buf),
            #[cfg(windows)]
            Self::Windows(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Strip(w) => w.flush(),
            Self::PassThrough(w) => w.flush(),
            #[cfg(windows)]
            Self::Windows(w) => w.flush(),
        }
    }
}

fn wrap<W: Write>(out: W, config: &Config, stream: StdStream) -> AnsiOutput<W> {
    let probe = OutputProbe::detect(config, stream);
    let mode = choose_output_mode(&probe);
    debug!("{:?} output mode: {:?} ({:?})", stream, mode, probe);
    AnsiOutput::new(out, mode, stream)
}

/// Standard output, wrapped per `config`
pub fn stdout(config: &Config) -> AnsiOutput<io::Stdout> {
    wrap(io::stdout(), config, StdStream::Stdout)
}

/// Standard error, wrapped per `config`
pub fn stderr(config: &Config) -> AnsiOutput<io::Stderr> {
    wrap(io::stderr(), config, StdStream::Stderr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> OutputProbe {
        OutputProbe {
            enable_ansi: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_disable_wins_over_force() {
        let p = OutputProbe {
            enable_ansi: false,
            force_ansi: true,
            is_tty: true,
            term: Some("xterm".into()),
            ..Default::default()
        };
        assert_eq!(choose_output_mode(&p), OutputMode::Strip);
    }

    #[test]
    fn test_force_passes_through() {
        let p = OutputProbe { force_ansi: true, ..probe() };
        assert_eq!(choose_output_mode(&p), OutputMode::PassThrough);
    }

    #[test]
    fn test_xterm_passes_through_when_redirected() {
        let p = OutputProbe { term: Some("xterm".into()), ..probe() };
        assert_eq!(choose_output_mode(&p), OutputMode::PassThrough);

        let p = OutputProbe { term: Some("XTerm".into()), ..probe() };
        assert_eq!(choose_output_mode(&p), OutputMode::PassThrough);

        let p = OutputProbe { term: Some("xterm-256color".into()), ..probe() };
        assert_eq!(choose_output_mode(&p), OutputMode::Strip);
    }

    #[test]
    fn test_unix_follows_tty() {
        assert_eq!(choose_output_mode(&OutputProbe { is_tty: true, ..probe() }), OutputMode::PassThrough);
        assert_eq!(choose_output_mode(&probe()), OutputMode::Strip);
    }

    #[test]
    fn test_windows_modes() {
        let base = OutputProbe { windows: true, is_tty: true, ..probe() };
        assert_eq!(
            choose_output_mode(&OutputProbe { vt_supported: true, ..base.clone() }),
            OutputMode::PassThrough
        );
        assert_eq!(
            choose_output_mode(&OutputProbe { console_available: true, ..base.clone() }),
            OutputMode::WindowsTranslate
        );
        assert_eq!(choose_output_mode(&base), OutputMode::Strip);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_translate_falls_back_to_strip() {
        let mut out = AnsiOutput::new(Vec::new(), OutputMode::WindowsTranslate, StdStream::Stdout);
        assert_eq!(out.mode(), OutputMode::Strip);
        out.write_all(b"\x1b[1mbold\x1b[m").unwrap();
        assert_eq!(out.get_ref(), b"bold");
    }

    #[test]
    fn test_pass_through_output_resets_on_close() {
        let mut out = AnsiOutput::new(Vec::new(), OutputMode::PassThrough, StdStream::Stdout);
        out.write_all(b"\x1b[32mok").unwrap();
        out.close().unwrap();
        assert_eq!(out.get_ref(), b"\x1b[32mok\x1b[m");
    }
}
