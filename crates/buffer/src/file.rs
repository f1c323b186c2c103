use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tracing::debug;

use crate::error::BufferError;
use crate::quit::{Quit, QuitSlot};
use crate::Buffer;

/// Buffer over a seekable file.
///
/// The length comes from the file's metadata and every window is a positional
/// read, so an EOF scan touches only the tail it asks for. Nothing is cached
/// here; repeated windows lean on the OS page cache.
pub struct FileBuffer {
    file: Mutex<File>,
    len: u64,
    read: AtomicU64,
    quit: QuitSlot,
}

impl FileBuffer {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::from_file(File::open(path)?)
    }

    /// Wrap an already open file. Its length is fixed at this point.
    pub fn from_file(file: File) -> std::io::Result<Self> {
        let len = file.metadata()?.len();
        debug!(len, "file_buffer_opened");
        Ok(Self {
            file: Mutex::new(file),
            len,
            read: AtomicU64::new(0),
            quit: QuitSlot::default(),
        })
    }

    /// Total bytes read from the file so far.
    pub fn bytes_read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Buffer for FileBuffer {
    fn size(&self) -> Result<u64, BufferError> {
        Ok(self.len)
    }

    fn bof_window(&self, offset: u64, len: usize) -> Result<Bytes, BufferError> {
        self.quit.check()?;
        if offset >= self.len {
            return Ok(Bytes::new());
        }
        let want = (len as u64).min(self.len - offset);
        let mut out = Vec::with_capacity(want as usize);
        {
            let mut file = self.lock();
            file.seek(SeekFrom::Start(offset))?;
            (&mut *file).take(want).read_to_end(&mut out)?;
        }
        self.read.fetch_add(out.len() as u64, Ordering::Relaxed);
        Ok(Bytes::from(out))
    }

    fn set_quit(&self, quit: Quit) {
        self.quit.set(quit);
    }
}

impl std::fmt::Debug for FileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBuffer")
            .field("len", &self.len)
            .field("read", &self.bytes_read())
            .finish()
    }
}
