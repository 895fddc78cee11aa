//! Console session
//!
//! Owns the terminal driver and the input demux for the life of the
//! program. Opening never fails (a terminal that can't be set up falls
//! back to line input); closing restores the terminal and releases every
//! blocked reader.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::ansi::output::{self, AnsiOutput};
use super::input::{DemuxOptions, InputDemux, InputStream};
use super::terminal::{Terminal, TerminalDriver, TerminalType};
use crate::config::Config;

pub struct ConsoleSession {
    terminal: Arc<Terminal>,
    demux: InputDemux,
    config: Config,
    echo: AtomicBool,
    interrupt: AtomicBool,
    closed: AtomicBool,
}

/// Turns echo off for its lifetime
struct EchoGuard<'a> {
    session: &'a ConsoleSession,
    previous: bool,
}

impl<'a> EchoGuard<'a> {
    fn new(session: &'a ConsoleSession) -> Self {
        let previous = session.echo_enabled();
        session.set_echo(false);
        Self { session, previous }
    }
}

impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        self.session.set_echo(self.previous);
    }
}

impl ConsoleSession {
    /// Open the configured terminal and start reading input
    pub fn open(config: Config) -> Self {
        let terminal = Terminal::open(config.terminal);
        let echo_out = Box::new(output::stdout(&config));
        Self::with_terminal(terminal, config, echo_out)
    }

    /// Start a session over an already opened terminal. `echo_out`
    /// receives backspace erasures.
    pub fn with_terminal(terminal: Terminal, config: Config, echo_out: Box<dyn Write + Send>) -> Self {
        let terminal = Arc::new(terminal);
        let demux = InputDemux::new(DemuxOptions::from(&config), echo_out);

        let session = Self {
            terminal: Arc::clone(&terminal),
            demux,
            echo: AtomicBool::new(config.enable_echo),
            interrupt: AtomicBool::new(config.enable_interrupt),
            closed: AtomicBool::new(false),
            config,
        };
        session.set_echo(session.config.enable_echo);
        session.set_interrupt(session.config.enable_interrupt);

        // Detached: it may sit in a blocking native read until the process exits
        session.demux.spawn(move || terminal.read_raw());

        info!(
            "Console session open: {} terminal, {}x{}",
            session.kind(),
            session.width(),
            session.height()
        );
        session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn kind(&self) -> TerminalType {
        self.terminal.kind()
    }

    pub fn demux(&self) -> &InputDemux {
        &self.demux
    }

    /// Next character, `None` once input has ended
    pub fn read_char(&self) -> Option<char> {
        self.demux.read_char()
    }

    /// Next line without its newline; empty once input has ended
    pub fn read_line(&self) -> Vec<char> {
        self.demux.read_line().unwrap_or_default()
    }

    /// Next line as a string, `None` once input has ended
    pub fn read_line_string(&self) -> Option<String> {
        self.demux.read_line().map(|line| line.into_iter().collect())
    }

    /// Read a line with echo off. Echo is restored even if the read ends early.
    pub fn read_password(&self) -> Vec<char> {
        let _guard = EchoGuard::new(self);
        self.read_line()
    }

    pub fn input_stream(&self) -> InputStream {
        InputStream::new(self.demux.clone())
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo.load(Ordering::SeqCst)
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn set_echo(&self, enabled: bool) {
        self.echo.store(enabled, Ordering::SeqCst);
        if let Err(e) = self.terminal.set_echo(enabled) {
            warn!("Failed to set echo {}: {}", enabled, e);
        }
    }

    pub fn set_interrupt(&self, enabled: bool) {
        self.interrupt.store(enabled, Ordering::SeqCst);
        if let Err(e) = self.terminal.set_interrupt(enabled) {
            warn!("Failed to set interrupt {}: {}", enabled, e);
        }
    }

    pub fn width(&self) -> u16 {
        self.terminal.width()
    }

    pub fn height(&self) -> u16 {
        self.terminal.height()
    }

    /// Standard output wrapped for this session's ANSI settings
    pub fn stdout(&self) -> AnsiOutput<io::Stdout> {
        output::stdout(&self.config)
    }

    /// Standard error wrapped for this session's ANSI settings
    pub fn stderr(&self) -> AnsiOutput<io::Stderr> {
        output::stderr(&self.config)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release readers, restore the terminal and reset output attributes.
    /// Only the first call does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.demux.shutdown();
        if let Err(e) = self.terminal.restore() {
            error!("Failed to restore terminal: {}", e);
        }
        if let Err(e) = self.stdout().close() {
            debug!("Failed to reset output attributes: {}", e);
        }
        info!("Console session closed");
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        self.close();
    }
}
