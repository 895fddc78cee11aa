//! `io::Read` over the demultiplexer
//!
//! Each read takes characters one at a time from the demux and encodes
//! them as UTF-8. A character that doesn't fit the caller's buffer is kept
//! for the next call.

use std::io::{self, Read};

use super::demux::InputDemux;

pub struct InputStream {
    demux: InputDemux,
    pending: Vec<u8>,
    ended: bool,
}

impl InputStream {
    pub fn new(demux: InputDemux) -> Self {
        Self {
            demux,
            pending: Vec::new(),
            ended: false,
        }
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }
}

impl Read for InputStream {
    /// Blocks for at least one character, then returns whatever was
    /// encoded. `Ok(0)` once input has ended.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.pending.is_empty() {
            return Ok(self.drain_pending(buf));
        }
        if self.ended {
            return Ok(0);
        }

        match self.demux.read_char() {
            Some(ch) => {
                let mut utf8 = [0u8; 4];
                self.pending.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
                Ok(self.drain_pending(buf))
            }
            None => {
                self.ended = true;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::DemuxOptions;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Feeds `text` one unit per registered reader, then ends the input
    fn stream_over(text: &'static str) -> InputStream {
        let demux = InputDemux::new(DemuxOptions::default(), Box::new(io::sink()));
        let feeder = demux.clone();
        thread::spawn(move || {
            let reader_waiting = || {
                let deadline = Instant::now() + Duration::from_secs(5);
                while feeder.pending_readers().0 != 1 {
                    assert!(Instant::now() < deadline, "reader never registered");
                    thread::sleep(Duration::from_millis(1));
                }
            };
            for ch in text.chars() {
                reader_waiting();
                feeder.dispatch(ch);
            }
            reader_waiting();
            feeder.shutdown();
        });
        InputStream::new(demux)
    }

    #[test]
    fn test_read_to_string() {
        let mut stream = stream_over("héllo\n");
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "héllo\n");
    }

    #[test]
    fn test_small_buffer_splits_character() {
        let mut stream = stream_over("€");
        let mut byte = [0u8; 1];
        let mut collected = Vec::new();
        while stream.read(&mut byte).unwrap() == 1 {
            collected.push(byte[0]);
        }
        assert_eq!(collected, "€".as_bytes());
    }
}
