use std::sync::Arc;

use buffer::{Buffer, BufferError, Quit};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::FrameError;
use crate::frame::{Frame, FrameHit};

/// Candidate offsets examined per buffer window.
const BLOCK: u64 = 4096;

/// Validated, shareable set of frames anchored at one end.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    frames: Arc<[Frame]>,
}

/// A running frame scan: hits in frame order, and the producer task.
///
/// The task resolves to the number of buffer bytes examined.
pub struct FrameScan {
    pub hits: mpsc::Receiver<FrameHit>,
    pub task: JoinHandle<Result<u64, BufferError>>,
}

impl FrameSet {
    pub fn new(frames: Vec<Frame>) -> Result<Self, FrameError> {
        for (idx, frame) in frames.iter().enumerate() {
            frame.validate(idx)?;
        }
        Ok(Self {
            frames: frames.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Evaluate every frame against `buf` on a blocking task.
    ///
    /// `reverse` selects EOF anchoring. The scan stops early when `quit`
    /// fires or the receiver is dropped.
    pub fn index(
        &self,
        buf: Arc<dyn Buffer>,
        reverse: bool,
        quit: Quit,
        progress: watch::Sender<u64>,
        capacity: usize,
    ) -> FrameScan {
        let (tx, hits) = mpsc::channel(capacity.max(1));
        let frames = Arc::clone(&self.frames);
        let task = tokio::task::spawn_blocking(move || {
            let result = run(&frames, buf.as_ref(), reverse, &tx, &progress, &quit);
            match &result {
                Ok(examined) => debug!(reverse, examined, "frame_scan_done"),
                Err(BufferError::Cancelled) => debug!(reverse, "frame_scan_cancelled"),
                Err(err) => warn!(reverse, error = %err, "frame_scan_failed"),
            }
            result
        });
        FrameScan { hits, task }
    }
}

fn run(
    frames: &[Frame],
    buf: &dyn Buffer,
    reverse: bool,
    tx: &mpsc::Sender<FrameHit>,
    progress: &watch::Sender<u64>,
    quit: &Quit,
) -> Result<u64, BufferError> {
    let mut examined = 0u64;
    for (idx, frame) in frames.iter().enumerate() {
        if let Some(offset) = first_match(frame, buf, reverse, quit, &mut examined)? {
            let hit = FrameHit {
                frame: idx,
                offset,
                length: frame.len() as u64,
            };
            if tx.blocking_send(hit).is_err() {
                break;
            }
        }
        progress.send_replace(examined);
    }
    Ok(examined)
}

/// Lowest offset in the frame's window where it matches.
fn first_match(
    frame: &Frame,
    buf: &dyn Buffer,
    reverse: bool,
    quit: &Quit,
    examined: &mut u64,
) -> Result<Option<u64>, BufferError> {
    let len = frame.len() as u64;
    let mut off = frame.min_offset;
    loop {
        quit.check()?;
        let last = frame.max_offset.min(off.saturating_add(BLOCK - 1));
        let span = (last - off).saturating_add(len);
        let span = usize::try_from(span).unwrap_or(usize::MAX);
        let window = if reverse {
            buf.eof_window(off, span)?
        } else {
            buf.bof_window(off, span)?
        };
        *examined += window.len() as u64;
        let width = frame.len();
        if window.len() < width {
            return Ok(None);
        }
        for i in 0..=(window.len() - width) {
            let candidate = if reverse {
                let end = window.len() - i;
                &window[end - width..end]
            } else {
                &window[i..i + width]
            };
            if frame.matches(candidate) {
                return Ok(Some(off + i as u64));
            }
        }
        if window.len() < span || last == frame.max_offset {
            return Ok(None);
        }
        off = last + 1;
    }
}
