use std::io::{ErrorKind, Read};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

use bytes::Bytes;
use tracing::debug;

use crate::error::BufferError;
use crate::quit::{Quit, QuitSlot};
use crate::reader::DEFAULT_CHUNK_SIZE;
use crate::Buffer;

/// Buffer over a sequential source, filled on demand.
///
/// Bytes are pulled from the source only when a window past the cached prefix
/// is requested, and every byte pulled stays cached for the lifetime of the
/// buffer. Anything anchored at the end (size, EOF windows) forces the whole
/// stream in; use [`FileBuffer`](crate::FileBuffer) for seekable files.
///
/// One caller at a time pulls from the source, a chunk per turn. The cache is
/// only locked to append a chunk, so windows inside the cached prefix never
/// wait on source I/O.
pub struct StreamBuffer {
    source: Mutex<Option<Box<dyn Read + Send>>>,
    cache: RwLock<Cache>,
    quit: QuitSlot,
    chunk_size: usize,
}

#[derive(Default)]
struct Cache {
    data: Vec<u8>,
    /// Source ended or failed; nothing more will be appended.
    done: bool,
    failure: Option<BufferError>,
}

impl StreamBuffer {
    pub fn new(source: impl Read + Send + 'static) -> Self {
        Self::with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    /// Like [`StreamBuffer::new`] but pulling `chunk_size` bytes per source read.
    pub fn with_chunk_size(source: impl Read + Send + 'static, chunk_size: usize) -> Self {
        Self {
            source: Mutex::new(Some(Box::new(source))),
            cache: RwLock::new(Cache::default()),
            quit: QuitSlot::default(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Number of bytes pulled from the source so far.
    pub fn cached_len(&self) -> usize {
        self.read_cache().data.len()
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_source(&self) -> MutexGuard<'_, Option<Box<dyn Read + Send>>> {
        self.source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pull from the source until `target` bytes are cached or the source ends.
    fn fill_to(&self, target: u64) -> Result<(), BufferError> {
        loop {
            {
                let cache = self.read_cache();
                if cache.data.len() as u64 >= target {
                    return Ok(());
                }
                if cache.done {
                    return match &cache.failure {
                        Some(err) => Err(err.clone()),
                        None => Ok(()),
                    };
                }
            }
            self.quit.check()?;
            self.pull(target)?;
        }
    }

    /// Read one chunk from the source into the cache.
    fn pull(&self, target: u64) -> Result<(), BufferError> {
        let mut source = self.lock_source();
        let Some(reader) = source.as_mut() else {
            return Ok(());
        };
        // Another caller may have filled far enough while we waited.
        if self.read_cache().data.len() as u64 >= target {
            return Ok(());
        }
        let mut chunk = vec![0u8; self.chunk_size];
        let read = match reader.read(&mut chunk) {
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(()),
            read => read,
        };

        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match read {
            Ok(0) => {
                *source = None;
                cache.done = true;
                debug!(len = cache.data.len(), "stream_buffer_eof");
            }
            Ok(n) => cache.data.extend_from_slice(&chunk[..n]),
            Err(err) => {
                let err = BufferError::from(err);
                debug!(error = %err, cached = cache.data.len(), "stream_buffer_failure");
                *source = None;
                cache.done = true;
                cache.failure = Some(err);
            }
        }
        Ok(())
    }
}

impl Buffer for StreamBuffer {
    fn size(&self) -> Result<u64, BufferError> {
        self.fill_to(u64::MAX)?;
        Ok(self.read_cache().data.len() as u64)
    }

    fn bof_window(&self, offset: u64, len: usize) -> Result<Bytes, BufferError> {
        self.quit.check()?;
        self.fill_to(offset.saturating_add(len as u64))?;
        let cache = self.read_cache();
        let size = cache.data.len() as u64;
        if offset >= size {
            return Ok(Bytes::new());
        }
        let start = offset as usize;
        let end = start.saturating_add(len).min(cache.data.len());
        Ok(Bytes::copy_from_slice(&cache.data[start..end]))
    }

    fn set_quit(&self, quit: Quit) {
        self.quit.set(quit);
    }
}

impl std::fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.read_cache();
        f.debug_struct("StreamBuffer")
            .field("cached", &cache.data.len())
            .field("exhausted", &cache.done)
            .field("failed", &cache.failure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Source that yields `good` bytes and then fails.
    struct Failing {
        good: Cursor<Vec<u8>>,
    }

    impl Read for Failing {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            match self.good.read(out)? {
                0 => Err(std::io::Error::new(ErrorKind::ConnectionReset, "source went away")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn fills_lazily_and_caches() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let buf = StreamBuffer::with_chunk_size(Cursor::new(data.clone()), 1024);
        assert_eq!(buf.cached_len(), 0);

        let head = buf.bof_window(0, 16).unwrap();
        assert_eq!(&head[..], &data[..16]);
        assert_eq!(buf.cached_len(), 1024);

        assert_eq!(buf.size().unwrap(), 10_000);
        assert_eq!(&buf.eof_window(0, 4).unwrap()[..], &data[9_996..]);
    }

    #[test]
    fn failure_only_affects_uncached_reads() {
        let buf = StreamBuffer::with_chunk_size(
            Failing {
                good: Cursor::new(vec![7u8; 64]),
            },
            16,
        );
        assert_eq!(buf.bof_window(0, 4).unwrap().len(), 4);
        let err = buf.size().unwrap_err();
        assert!(matches!(err, BufferError::Io(ref msg) if msg.contains("went away")));
        assert_eq!(buf.bof_window(32, 16).unwrap().len(), 16);
        assert!(buf.bof_window(60, 16).is_err());
        assert!(buf.eof_window(0, 1).is_err());
    }

    #[test]
    fn cancellation_stops_filling() {
        let buf = StreamBuffer::new(Cursor::new(vec![0u8; 100_000]));
        let quit = Quit::new();
        buf.set_quit(quit.clone());
        quit.cancel();
        assert_eq!(buf.bof_window(0, 1), Err(BufferError::Cancelled));
        assert_eq!(buf.size(), Err(BufferError::Cancelled));
        assert_eq!(buf.cached_len(), 0);
    }

    #[test]
    fn cached_windows_do_not_wait_on_a_stalled_source() {
        use std::sync::mpsc;
        use std::sync::Arc;

        /// Hands out `head`, then parks inside `read` until released.
        struct Stalling {
            head: Option<Vec<u8>>,
            entered: mpsc::Sender<()>,
            release: mpsc::Receiver<()>,
        }

        impl Read for Stalling {
            fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
                if let Some(head) = self.head.take() {
                    out[..head.len()].copy_from_slice(&head);
                    return Ok(head.len());
                }
                let _ = self.entered.send(());
                let _ = self.release.recv();
                Ok(0)
            }
        }

        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        let source = Stalling {
            head: Some(b"head".to_vec()),
            entered: entered_tx,
            release: release_rx,
        };
        let buf = Arc::new(StreamBuffer::with_chunk_size(source, 4));
        assert_eq!(&buf.bof_window(0, 4).unwrap()[..], b"head");

        let sizer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || buf.size())
        };
        entered.recv().unwrap();
        assert_eq!(&buf.bof_window(0, 4).unwrap()[..], b"head");
        assert_eq!(buf.cached_len(), 4);

        release.send(()).unwrap();
        assert_eq!(sizer.join().unwrap(), Ok(4));
    }
}
