// src/framer.rs

//! Splitting a byte stream into groups of complete lines.
//!
//! [`LineFramer`] is the pure state machine (carry-over buffer + split);
//! [`LineStream`] drives it from an `AsyncRead`, one group per read.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Lines recovered from one read of the stream. May be empty.
///
/// Lines are kept as the raw bytes the command wrote, without the `\n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineGroup {
    pub lines: Vec<Vec<u8>>,
}

impl LineGroup {
    pub fn new(lines: Vec<Vec<u8>>) -> Self {
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The lines as text, invalid UTF-8 replaced.
    pub fn to_text(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }
}

/// Carry-over state between reads.
#[derive(Debug, Default)]
pub struct LineFramer {
    carry: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read's worth of bytes and return every line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> LineGroup {
        self.carry.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(self.carry[start..end].to_vec());
            start = end + 1;
        }
        self.carry.drain(..start);

        LineGroup { lines }
    }

    /// Flush the unterminated tail, if any, as a final single-line group.
    pub fn finish(&mut self) -> Option<LineGroup> {
        if self.carry.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.carry);
        Some(LineGroup { lines: vec![tail] })
    }
}

/// Lazy sequence of [`LineGroup`]s read from `reader`.
///
/// Yields `None` once the stream is exhausted. A read error is yielded once
/// as `Some(Err(_))` and ends the sequence.
#[derive(Debug)]
pub struct LineStream<R> {
    reader: R,
    framer: LineFramer,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> LineStream<R> {
    pub fn new(reader: R, buffer_size: usize) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            buf: vec![0; buffer_size.max(1)],
            finished: false,
        }
    }

    pub async fn next_group(&mut self) -> Option<io::Result<LineGroup>> {
        if self.finished {
            return None;
        }
        match self.reader.read(&mut self.buf).await {
            Ok(0) => {
                self.finished = true;
                self.framer.finish().map(Ok)
            }
            Ok(n) => Some(Ok(self.framer.push(&self.buf[..n]))),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
