//! # bytesig frames (`frames`)
//!
//! Frames are short patterns pinned to an offset window at one end of a
//! stream, with optional single-byte wildcards. Unlike sequences they are not
//! found by a linear scan: each frame reads only the handful of windows its
//! offsets allow, straight from the [`Buffer`](buffer::Buffer).
//!
//! A [`FrameSet`] is plain configuration, so it is cheap to clone and start
//! per stream. [`FrameSet::index`] evaluates every frame on a blocking task
//! and streams one [`FrameHit`] per matching frame. Frame hits are always
//! complete matches.

mod error;
mod frame;
mod matcher;

pub use crate::error::FrameError;
pub use crate::frame::{Frame, FrameHit};
pub use crate::matcher::{FrameScan, FrameSet};
