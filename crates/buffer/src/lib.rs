//! # bytesig buffer (`buffer`)
//!
//! Byte access for a single input under identification. A [`Buffer`] is
//! shared read-only by every producer scanning the input; it owns whatever
//! caching its source needs.
//!
//! Three implementations ship with the crate:
//!
//! - [`MemoryBuffer`] wraps bytes that are already resident.
//! - [`FileBuffer`] reads windows of a seekable file in place; its size comes
//!   from metadata, so EOF scans never read the whole file.
//! - [`StreamBuffer`] wraps any [`std::io::Read`] source and fills itself
//!   lazily, one chunk at a time, as readers ask for more.
//!
//! Producers never touch the buffer's storage directly. They walk it through
//! independent cursors:
//!
//! - [`ForwardReader`] yields chunks from the start of the stream, optionally
//!   stopping after a byte limit.
//! - [`ReverseReader`] yields chunks from the end of the stream with each
//!   chunk's bytes already reversed, optionally stopping after a byte limit.
//!
//! Cancellation is cooperative: every buffer holds the [`Quit`] token of the
//! identification it serves and refuses further reads once it fires.
//!
//! ```
//! use std::sync::Arc;
//! use buffer::{Buffer, ChunkReader, ForwardReader, MemoryBuffer, ReverseReader};
//!
//! let buf: Arc<dyn Buffer> = Arc::new(MemoryBuffer::new(&b"PK\x03\x04tail"[..]));
//!
//! let mut fwd = ForwardReader::limited(Arc::clone(&buf), 4);
//! assert_eq!(&fwd.next_chunk().unwrap().unwrap()[..], b"PK\x03\x04");
//! assert!(fwd.next_chunk().unwrap().is_none());
//!
//! let mut rev = ReverseReader::limited(buf, 4).unwrap();
//! assert_eq!(&rev.next_chunk().unwrap().unwrap()[..], b"liat");
//! ```

mod error;
mod file;
mod memory;
mod quit;
mod reader;
mod stream;

use bytes::Bytes;

pub use crate::error::BufferError;
pub use crate::file::FileBuffer;
pub use crate::memory::MemoryBuffer;
pub use crate::quit::Quit;
pub use crate::reader::{ChunkReader, ForwardReader, ReverseReader, DEFAULT_CHUNK_SIZE};
pub use crate::stream::StreamBuffer;

/// Random access to the bytes of one input.
///
/// Windows may come back shorter than requested when they run past either
/// end of the stream; an empty window means the offset is out of range.
pub trait Buffer: Send + Sync {
    /// Total length of the stream. Sequential stream buffers read to the end
    /// to answer this.
    fn size(&self) -> Result<u64, BufferError>;

    /// Up to `len` bytes starting `offset` bytes after the beginning.
    fn bof_window(&self, offset: u64, len: usize) -> Result<Bytes, BufferError>;

    /// Up to `len` bytes ending `offset` bytes before the end, in stream order.
    fn eof_window(&self, offset: u64, len: usize) -> Result<Bytes, BufferError> {
        let size = self.size()?;
        if offset >= size {
            return Ok(Bytes::new());
        }
        let end = size - offset;
        let start = end.saturating_sub(len as u64);
        self.bof_window(start, (end - start) as usize)
    }

    /// Attach the cancellation token of the identification using this buffer.
    /// Replaces any previously attached token.
    fn set_quit(&self, quit: Quit);
}
