//! `\r\n`-delimited framing over byte streams

use crate::error::{BlockchainError, Result};
use std::io::{Read, Write};

pub const DELIMITER: &str = "\r\n";

const READ_CHUNK_SIZE: usize = 1024;

/// Largest frame we buffer before giving up on a connection
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

/// Accumulates bytes and splits them into complete frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Bytes already searched for a delimiter since the last frame
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete frame without its delimiter
    pub fn next_frame(&mut self) -> Result<Option<String>> {
        let delimiter = DELIMITER.as_bytes();
        // A delimiter may straddle the old and new bytes
        let start = self.scanned.saturating_sub(delimiter.len() - 1);
        let position = self.buffer[start..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)
            .map(|offset| start + offset);

        match position {
            Some(end) => {
                let frame: Vec<u8> = self.buffer.drain(..end + delimiter.len()).collect();
                self.scanned = 0;
                let text = String::from_utf8(frame[..end].to_vec()).map_err(|e| {
                    BlockchainError::Serialization(format!("Frame is not UTF-8: {e}"))
                })?;
                Ok(Some(text))
            }
            None => {
                self.scanned = self.buffer.len();
                if self.buffer.len() > MAX_FRAME_LEN {
                    return Err(BlockchainError::Protocol(format!(
                        "Frame exceeds {MAX_FRAME_LEN} bytes"
                    )));
                }
                Ok(None)
            }
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Reads frames from a stream in arrival order
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
        }
    }

    /// Next frame, or `None` once the peer closes the stream
    pub fn next_frame(&mut self) -> Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            let read = self.reader.read(&mut chunk)?;
            if read == 0 {
                return Ok(None);
            }
            self.decoder.extend(&chunk[..read]);
        }
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Write `text` followed by the delimiter
pub fn write_frame<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    writer.write_all(text.as_bytes())?;
    writer.write_all(DELIMITER.as_bytes())?;
    writer.flush()?;
    Ok(())
}
