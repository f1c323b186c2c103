//! # bytesig sequence search (`sequence`)
//!
//! Multi-pattern search for byte sequences anchored at either end of a
//! stream. A set of [`Seq`] values is compiled once into a
//! [`SequenceEngine`]; the engine is then shared read-only and indexes any
//! number of [`ChunkReader`](buffer::ChunkReader)s, each on its own blocking
//! task.
//!
//! A [`Seq`] is an ordered list of subsequences. Each subsequence is a set of
//! alternative byte strings plus an offset bound:
//!
//! - for subsequence 0 the bound caps where the match may start, measured
//!   from the anchored end of the stream;
//! - for later subsequences it caps the gap after the previous subsequence.
//!
//! A bound of `-1` means "anywhere". Every satisfied intermediate subsequence
//! is reported as a provisional [`SeqHit`]; satisfying the last one reports a
//! final hit, after which the sequence goes quiet.
//!
//! Reverse engines are fed by reverse readers. Their sequences are written in
//! natural byte order with subsequence 0 closest to the end of the stream;
//! the engine reverses the bytes itself when compiling.

mod engine;
mod error;
mod seq;

pub use crate::engine::{SeqScan, SequenceEngine};
pub use crate::error::SequenceError;
pub use crate::seq::{Choice, Direction, Seq, SeqHit};
