use bytes::Bytes;

use crate::error::BufferError;
use crate::quit::{Quit, QuitSlot};
use crate::Buffer;

/// Buffer over bytes that are already resident.
#[derive(Default)]
pub struct MemoryBuffer {
    data: Bytes,
    quit: QuitSlot,
}

impl MemoryBuffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            quit: QuitSlot::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Buffer for MemoryBuffer {
    fn size(&self) -> Result<u64, BufferError> {
        Ok(self.data.len() as u64)
    }

    fn bof_window(&self, offset: u64, len: usize) -> Result<Bytes, BufferError> {
        self.quit.check()?;
        let size = self.data.len() as u64;
        if offset >= size {
            return Ok(Bytes::new());
        }
        let start = offset as usize;
        let end = start.saturating_add(len).min(self.data.len());
        Ok(self.data.slice(start..end))
    }

    fn set_quit(&self, quit: Quit) {
        self.quit.set(quit);
    }
}

impl std::fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_clip_at_both_ends() {
        let buf = MemoryBuffer::new(&b"0123456789"[..]);
        assert_eq!(&buf.bof_window(0, 4).unwrap()[..], b"0123");
        assert_eq!(&buf.bof_window(8, 4).unwrap()[..], b"89");
        assert!(buf.bof_window(10, 4).unwrap().is_empty());

        assert_eq!(&buf.eof_window(0, 3).unwrap()[..], b"789");
        assert_eq!(&buf.eof_window(8, 5).unwrap()[..], b"01");
        assert!(buf.eof_window(10, 1).unwrap().is_empty());
    }

    #[test]
    fn reads_stop_after_cancellation() {
        let buf = MemoryBuffer::new(vec![1u8; 32]);
        let quit = Quit::new();
        buf.set_quit(quit.clone());
        assert!(buf.bof_window(0, 8).is_ok());
        quit.cancel();
        assert_eq!(buf.bof_window(0, 8), Err(BufferError::Cancelled));
        assert_eq!(buf.size(), Ok(32));
    }
}
