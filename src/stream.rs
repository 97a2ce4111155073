//! A bounded, double-ended byte queue used to let a producer (the writer's
//! compression pipeline) and a consumer (whatever drains the finished
//! bytes) run at different paces without the producer racing ahead of a
//! slow consumer.
//!
//! This is the Rust shape of the "double-ended buffer" spec.md describes:
//! `write(chunk)` blocks once the queue's tracked byte count exceeds a
//! high-water mark, and resumes once the consumer has drained enough to
//! fall back under it. `end()` signals no more input; a consumer sees EOF
//! only once the queue has also drained. `abort(message)` surfaces an error
//! at both ends, mirroring `CompressedBuffer`'s shutdown path in the async
//! variant of this engine.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};

struct Shared {
    chunks: VecDeque<u8>,
    ended: bool,
    aborted: Option<String>,
}

struct Inner {
    state: Mutex<Shared>,
    not_full: Condvar,
    not_empty: Condvar,
    high_water_mark: usize,
}

/// The producer half: implements [`Write`], blocking once
/// `high_water_mark` bytes are queued and not yet drained.
pub struct BufferWriter {
    inner: Arc<Inner>,
}

/// The consumer half: implements [`Read`], yielding queued bytes in FIFO
/// order and blocking until more arrive or the writer calls
/// [`BufferWriter::end`].
pub struct BufferReader {
    inner: Arc<Inner>,
}

fn aborted_error(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("stream aborted: {message}"))
}

/// Creates a connected producer/consumer pair sharing a queue bounded at
/// `high_water_mark` bytes in flight.
pub fn channel(high_water_mark: usize) -> (BufferWriter, BufferReader) {
    let inner = Arc::new(Inner {
        state: Mutex::new(Shared { chunks: VecDeque::new(), ended: false, aborted: None }),
        not_full: Condvar::new(),
        not_empty: Condvar::new(),
        high_water_mark,
    });
    (BufferWriter { inner: inner.clone() }, BufferReader { inner })
}

impl BufferWriter {
    /// Signals that no further bytes will be written. A consumer drains
    /// whatever remains queued and then sees EOF.
    pub fn end(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.ended = true;
        self.inner.not_empty.notify_all();
    }

    /// Surfaces `message` as an error at both ends and unblocks anyone
    /// waiting.
    pub fn abort(&self, message: impl Into<String>) {
        let mut state = self.inner.state.lock().unwrap();
        state.aborted = Some(message.into());
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(message) = &state.aborted {
                return Err(aborted_error(message));
            }
            if state.chunks.len() < self.inner.high_water_mark {
                break;
            }
            state = self.inner.not_full.wait(state).unwrap();
        }
        state.chunks.extend(buf.iter().copied());
        self.inner.not_empty.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for BufferReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(message) = &state.aborted {
                return Err(aborted_error(message));
            }
            if !state.chunks.is_empty() {
                break;
            }
            if state.ended {
                return Ok(0);
            }
            state = self.inner.not_empty.wait(state).unwrap();
        }
        let n = buf.len().min(state.chunks.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.chunks.pop_front().unwrap();
        }
        self.inner.not_full.notify_all();
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drains_everything_written_before_end() {
        let (mut writer, mut reader) = channel(1024);
        writer.write_all(b"hello world").unwrap();
        writer.end();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn blocks_the_producer_past_the_high_water_mark() {
        let (mut writer, mut reader) = channel(4);
        let handle = thread::spawn(move || {
            writer.write_all(b"0123456789").unwrap();
            writer.end();
        });

        // Give the writer a chance to block on the first chunk if it were
        // going to write everything at once; then drain slowly.
        thread::sleep(std::time::Duration::from_millis(20));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        handle.join().unwrap();
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn abort_surfaces_at_both_ends() {
        let (writer, mut reader) = channel(16);
        writer.abort("compressor failed");

        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("compressor failed"));
    }
}
