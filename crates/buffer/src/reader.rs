use std::sync::Arc;

use bytes::Bytes;

use crate::error::BufferError;
use crate::Buffer;

/// Bytes requested from the buffer per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Sequential, chunked access to a buffer through a private cursor.
pub trait ChunkReader: Send {
    /// Next chunk in reading order, or `None` when the reader is exhausted.
    fn next_chunk(&mut self) -> Result<Option<Bytes>, BufferError>;
}

/// Reads from the beginning of the stream towards the end.
pub struct ForwardReader {
    buf: Arc<dyn Buffer>,
    pos: u64,
    limit: Option<u64>,
    chunk_size: usize,
}

impl ForwardReader {
    /// Reader over the whole stream.
    pub fn new(buf: Arc<dyn Buffer>) -> Self {
        Self {
            buf,
            pos: 0,
            limit: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Reader over the first `limit` bytes.
    pub fn limited(buf: Arc<dyn Buffer>, limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(buf)
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Bytes handed out so far.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl ChunkReader for ForwardReader {
    fn next_chunk(&mut self) -> Result<Option<Bytes>, BufferError> {
        let mut want = self.chunk_size as u64;
        if let Some(limit) = self.limit {
            if self.pos >= limit {
                return Ok(None);
            }
            want = want.min(limit - self.pos);
        }
        let chunk = self.buf.bof_window(self.pos, want as usize)?;
        if chunk.is_empty() {
            return Ok(None);
        }
        self.pos += chunk.len() as u64;
        Ok(Some(chunk))
    }
}

/// Reads from the end of the stream towards the beginning.
///
/// Each chunk is returned with its bytes reversed, so concatenating chunks
/// yields the stream read backwards.
pub struct ReverseReader {
    buf: Arc<dyn Buffer>,
    pos: u64,
    end: u64,
    chunk_size: usize,
}

impl ReverseReader {
    /// Reader over the whole stream. Fails when the stream cannot be sized or
    /// is empty.
    pub fn new(buf: Arc<dyn Buffer>) -> Result<Self, BufferError> {
        let size = buf.size()?;
        if size == 0 {
            return Err(BufferError::Empty);
        }
        Ok(Self {
            buf,
            pos: 0,
            end: size,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Reader over the last `limit` bytes.
    pub fn limited(buf: Arc<dyn Buffer>, limit: u64) -> Result<Self, BufferError> {
        let mut reader = Self::new(buf)?;
        reader.end = reader.end.min(limit);
        Ok(reader)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Bytes handed out so far, counted from the end.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl ChunkReader for ReverseReader {
    fn next_chunk(&mut self) -> Result<Option<Bytes>, BufferError> {
        if self.pos >= self.end {
            return Ok(None);
        }
        let want = (self.chunk_size as u64).min(self.end - self.pos);
        let window = self.buf.eof_window(self.pos, want as usize)?;
        if window.is_empty() {
            return Ok(None);
        }
        self.pos += window.len() as u64;
        let mut reversed = window.to_vec();
        reversed.reverse();
        Ok(Some(Bytes::from(reversed)))
    }
}
