//! Input demultiplexer
//!
//! One reader thread pulls characters from the terminal and fans each one
//! out to every consumer registered at that moment. Single-character
//! readers each receive a copy of the next unit. Line readers accumulate
//! into their own buffer and are woken together on newline.
//!
//! Backspace edits every open line buffer. With ANSI output enabled the
//! echoed control and the removed character, if any, are erased on screen
//! at the column of the oldest open line.

use std::io::Write;
use std::ptr;
use std::sync::atomic::{compiler_fence, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, error, trace};

use crate::config::Config;
use crate::core::ansi::Ansi;

pub const READER_THREAD_NAME: &str = "console-input-reader";

/// Initial line storage; grows by doubling
const LINE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxOptions {
    /// Treat BS and DEL as line editing
    pub backspace: bool,
    /// Erase backspaced characters on screen
    pub ansi: bool,
    /// Finished line buffers kept for reuse
    pub max_line_buffers: usize,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        Self {
            backspace: true,
            ansi: true,
            max_line_buffers: 8,
        }
    }
}

impl From<&Config> for DemuxOptions {
    fn from(config: &Config) -> Self {
        Self {
            backspace: config.enable_backspace,
            ansi: config.enable_ansi,
            max_line_buffers: config.max_line_buffers,
        }
    }
}

pub fn is_backspace(ch: char) -> bool {
    ch == '\x08' || ch == '\x7f'
}

/// Columns a character occupies when echoed by a classic terminal:
/// controls as `^X`, C1 and Latin-1 in their escaped forms.
/// Wide and combining characters are not accounted for.
pub fn display_width(ch: char) -> usize {
    match ch as u32 {
        0..=31 => 2,
        32..=126 => 1,
        127 => 2,
        128..=159 => 4,
        160..=254 => 3,
        _ => 4,
    }
}

/// Characters of a line in progress. Storage is overwritten with zeros
/// whenever content leaves it.
#[derive(Debug)]
pub struct LineBuffer {
    chars: Vec<char>,
    /// Longest length reached since the last wipe
    high_water: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            chars: Vec::with_capacity(LINE_CAPACITY),
            high_water: 0,
        }
    }

    pub fn push(&mut self, ch: char) {
        if self.chars.len() == self.chars.capacity() {
            self.grow();
        }
        self.chars.push(ch);
        self.high_water = self.high_water.max(self.chars.len());
    }

    pub fn pop(&mut self) -> Option<char> {
        let ch = self.chars.pop()?;
        // SAFETY: the slot just vacated is within capacity
        unsafe { ptr::write_volatile(self.chars.as_mut_ptr().add(self.chars.len()), '\0') };
        Some(ch)
    }

    pub fn as_slice(&self) -> &[char] {
        &self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// 1-based column just past the content
    pub fn column(&self) -> usize {
        self.chars.iter().map(|&c| display_width(c)).sum::<usize>() + 1
    }

    /// Copy the content out and wipe the buffer
    pub fn take_line(&mut self) -> Vec<char> {
        let line = self.chars.clone();
        self.wipe();
        line
    }

    pub fn wipe(&mut self) {
        wipe_storage(&mut self.chars, self.high_water);
        self.high_water = 0;
    }

    /// Move into storage twice the size. The old allocation is wiped
    /// before it is freed, which `Vec`'s own growth would not do.
    fn grow(&mut self) {
        let capacity = (self.chars.capacity() * 2).max(LINE_CAPACITY);
        let mut larger = Vec::with_capacity(capacity);
        larger.extend_from_slice(&self.chars);
        let mut old = std::mem::replace(&mut self.chars, larger);
        wipe_storage(&mut old, self.high_water);
        self.high_water = self.chars.len();
    }

    /// The first `n` storage slots, including ones past the current length
    #[cfg(test)]
    fn storage(&self, n: usize) -> Vec<char> {
        assert!(n <= self.chars.capacity());
        // SAFETY: within capacity, and every slot read was written before
        unsafe { std::slice::from_raw_parts(self.chars.as_ptr(), n).to_vec() }
    }
}

impl Drop for LineBuffer {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// Zero the first `used` slots of `chars` and clear it
fn wipe_storage(chars: &mut Vec<char>, used: usize) {
    let base = chars.as_mut_ptr();
    for i in 0..used.min(chars.capacity()) {
        // SAFETY: within capacity
        unsafe { ptr::write_volatile(base.add(i), '\0') };
    }
    compiler_fence(Ordering::SeqCst);
    chars.clear();
}

struct LineWaiter {
    buffer: LineBuffer,
    tx: Sender<Option<Vec<char>>>,
}

#[derive(Default)]
struct Registry {
    chars: Vec<Sender<Option<char>>>,
    lines: Vec<LineWaiter>,
    pool: Vec<LineBuffer>,
    closed: bool,
}

impl Registry {
    fn deliver(&mut self, unit: char) {
        for tx in self.chars.drain(..) {
            let _ = tx.send(Some(unit));
        }
    }

    /// Returns (column, cells) to erase for the oldest line, if any line is open
    fn backspace(&mut self) -> Option<(usize, usize)> {
        let mut erase = None;
        for (i, waiter) in self.lines.iter_mut().enumerate() {
            let removed = waiter.buffer.pop();
            if i == 0 {
                // the echoed `^?` plus whatever character it removed
                let cells = 2 + removed.map_or(0, display_width);
                erase = Some((waiter.buffer.column(), cells));
            }
        }
        erase
    }

    fn complete_lines(&mut self, max_pooled: usize) {
        for LineWaiter { mut buffer, tx } in self.lines.drain(..) {
            let line = buffer.take_line();
            let _ = tx.send(Some(line));
            if self.pool.len() < max_pooled {
                self.pool.push(buffer);
            }
        }
    }

    fn append(&mut self, unit: char) {
        for waiter in &mut self.lines {
            waiter.buffer.push(unit);
        }
    }
}

struct Shared {
    registry: Mutex<Registry>,
    options: DemuxOptions,
    echo_out: Mutex<Box<dyn Write + Send>>,
}

/// Handle to the demultiplexer; clones share state
#[derive(Clone)]
pub struct InputDemux {
    shared: Arc<Shared>,
}

impl InputDemux {
    /// `echo_out` receives the on-screen backspace erasures
    pub fn new(options: DemuxOptions, echo_out: Box<dyn Write + Send>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                options,
                echo_out: Mutex::new(echo_out),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.shared.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the reader thread. `source` blocks for the next unit and
    /// returns `None` at end of input, which closes the demux.
    pub fn spawn<F>(&self, mut source: F)
    where
        F: FnMut() -> Option<char> + Send + 'static,
    {
        let demux = self.clone();
        let spawned = thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || {
                debug!("Input reader started");
                while !demux.is_closed() {
                    match source() {
                        Some(unit) => demux.dispatch(unit),
                        None => {
                            debug!("Input stream ended");
                            break;
                        }
                    }
                }
                demux.shutdown();
            });

        if let Err(e) = spawned {
            error!("Failed to start input reader: {}", e);
            self.shutdown();
        }
    }

    /// Distribute one unit to everyone currently waiting
    pub fn dispatch(&self, unit: char) {
        trace!(unit = ?unit, "input");
        let erase = {
            let mut registry = self.lock();
            if registry.closed {
                return;
            }
            registry.deliver(unit);

            if self.shared.options.backspace && is_backspace(unit) {
                registry.backspace()
            } else if unit == '\n' {
                registry.complete_lines(self.shared.options.max_line_buffers);
                None
            } else {
                registry.append(unit);
                None
            }
        };

        match erase {
            Some((column, cells)) if self.shared.options.ansi => self.erase(column, cells),
            _ => {}
        }
    }

    fn erase(&self, column: usize, cells: usize) {
        let column = u16::try_from(column).unwrap_or(u16::MAX);
        let seq = Ansi::new()
            .cursor_to_column(column)
            .repeat(' ', cells)
            .cursor_to_column(column);
        let mut out = self.shared.echo_out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(seq.as_str().as_bytes()).and_then(|_| out.flush()) {
            debug!("Failed to erase backspaced character: {}", e);
        }
    }

    /// Block for the next unit. `None` once input has ended.
    pub fn read_char(&self) -> Option<char> {
        let (tx, rx) = mpsc::channel();
        {
            let mut registry = self.lock();
            if registry.closed {
                return None;
            }
            registry.chars.push(tx);
        }
        rx.recv().ok().flatten()
    }

    /// Block for the next line, newline excluded. `None` once input has ended.
    pub fn read_line(&self) -> Option<Vec<char>> {
        let (tx, rx) = mpsc::channel();
        {
            let mut registry = self.lock();
            if registry.closed {
                return None;
            }
            let buffer = registry.pool.pop().unwrap_or_default();
            registry.lines.push(LineWaiter { buffer, tx });
        }
        rx.recv().ok().flatten()
    }

    /// (character readers, line readers) currently blocked
    pub fn pending_readers(&self) -> (usize, usize) {
        let registry = self.lock();
        (registry.chars.len(), registry.lines.len())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Release every blocked reader with the end-of-input result.
    /// Later reads return immediately.
    pub fn shutdown(&self) {
        let mut registry = self.lock();
        if registry.closed {
            return;
        }
        registry.closed = true;
        for tx in registry.chars.drain(..) {
            let _ = tx.send(None);
        }
        for waiter in registry.lines.drain(..) {
            let _ = waiter.tx.send(None);
        }
        registry.pool.clear();
        debug!("Input demux closed");
    }
}
