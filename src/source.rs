//! Byte sources feeding the frame reader.
//!
//! Both source types support pushing consumed bytes back so that a reader
//! can undo a partially read frame. The original order of the bytes is
//! preserved when pushing back.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::{Error, Result};

/// A positioned source of frame bytes.
///
/// File-backed sources support seeking forward, which the frame reader
/// uses to skip frames without allocating their payloads. Live sources
/// are all-or-nothing: a read for more bytes than are currently buffered
/// fails with [`Error::BufferExhausted`] and consumes nothing.
pub trait ByteSource: Send {
    /// Fill `buf`, returning the number of bytes actually read. The count
    /// is less than `buf.len()` only at the natural end of the source.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Push bytes back onto the front of the source. The next `fill` will
    /// return them before any new data.
    fn push(&mut self, dat: &[u8]);

    /// Advance the position by up to `n` bytes without copying out data.
    /// Returns the number of bytes actually skipped.
    fn skip(&mut self, n: u64) -> Result<u64>;

    /// True once the source has delivered its final byte.
    fn at_end(&self) -> bool;
}

/// Seekable source over a file opened in binary mode.
pub struct FileSource {
    reader: BufReader<File>,
    cache: VecDeque<u8>,
    eof: bool,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(FileSource {
            reader: BufReader::new(file),
            cache: VecDeque::new(),
            eof: false,
        })
    }

    fn read_from_file(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.reader.read(&mut buf[total..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            total += n;
        }
        Ok(total)
    }
}

impl ByteSource for FileSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let from_cache = self.cache.len().min(buf.len());
        for b in buf.iter_mut().take(from_cache) {
            *b = self.cache.pop_front().unwrap_or(0);
        }
        if from_cache == buf.len() {
            return Ok(from_cache);
        }
        let n = self.read_from_file(&mut buf[from_cache..])?;
        Ok(from_cache + n)
    }

    fn push(&mut self, dat: &[u8]) {
        for &b in dat.iter().rev() {
            self.cache.push_front(b);
        }
        self.eof = false;
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        let from_cache = (self.cache.len() as u64).min(n);
        self.cache.drain(..from_cache as usize);
        let rest = n - from_cache;
        if rest == 0 {
            return Ok(n);
        }
        // Seek past the remainder rather than reading it. Seeking beyond
        // the end of a file is allowed, so probe the real position against
        // the file length to keep `at_end` truthful.
        let pos = self.reader.seek_relative(rest as i64);
        match pos {
            Ok(()) => {
                let here = self.reader.stream_position()?;
                let len = self.reader.get_ref().metadata()?.len();
                if here >= len {
                    self.eof = true;
                    let overshoot = here - len;
                    return Ok(n - overshoot.min(rest));
                }
                Ok(n)
            }
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn at_end(&self) -> bool {
        self.cache.is_empty() && self.eof
    }
}

/// Live-feed source. Data arrives via [`SinkSource::feed`]; the format of
/// the stream cannot be known until the first bytes do.
#[derive(Default)]
pub struct SinkSource {
    buffer: VecDeque<u8>,
    closed: bool,
}

impl SinkSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from the live feed.
    pub fn feed(&mut self, dat: &[u8]) {
        self.buffer.extend(dat.iter().copied());
    }

    /// Mark the feed finished. Subsequent reads behave like a file at EOF:
    /// remaining bytes drain, then the source reports its end.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn available(&self) -> usize {
        self.buffer.len()
    }
}

impl ByteSource for SinkSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.buffer.len() < buf.len() && !self.closed {
            return Err(Error::BufferExhausted);
        }
        let n = self.buffer.len().min(buf.len());
        for b in buf.iter_mut().take(n) {
            *b = self.buffer.pop_front().unwrap_or(0);
        }
        Ok(n)
    }

    fn push(&mut self, dat: &[u8]) {
        for &b in dat.iter().rev() {
            self.buffer.push_front(b);
        }
    }

    fn skip(&mut self, n: u64) -> Result<u64> {
        if (self.buffer.len() as u64) < n && !self.closed {
            return Err(Error::BufferExhausted);
        }
        let n = (self.buffer.len() as u64).min(n);
        self.buffer.drain(..n as usize);
        Ok(n)
    }

    fn at_end(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }
}
