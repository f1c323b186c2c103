//! # bytesig matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` runs the byte-signature producers for one input and merges their
//! hits into a single stream of [`Strike`]s. It sits on top of three lower
//! crates:
//!
//! - `buffer` gives shared, cancellable access to the input bytes.
//! - `sequence` compiles and scans multi-pattern sequences anchored at either
//!   end of the stream.
//! - `frames` checks short, offset-pinned patterns.
//!
//! A caller further up (a signature tree, a CLI) consumes strikes, decides
//! what they mean, and cancels the scan once it has seen enough.
//!
//! ## Scan shape
//!
//! Each identification runs in two phases:
//!
//! 1. Only the BOF sequence scan runs. Most formats are decided by their
//!    leading magic, so most scans never need more.
//! 2. Once that scan is exhausted, or the caller escalates through the
//!    [`Gate`], the EOF sequence scan and both frame scans start and all
//!    producers are merged fairly.
//!
//! Every channel is bounded, so a slow consumer stalls the producers instead
//! of letting them race ahead. Firing the caller's [`Quit`](buffer::Quit)
//! stops everything promptly; no strike is sent after the token fires.
//!
//! ## Core Types
//!
//! - [`SignatureSet`]: the four pattern tables and their test-tree tables.
//! - [`Matcher`]: validated signature set plus lazily built, shared engines.
//! - [`Identification`]: strike receiver, escalation gate, progress and the
//!   final [`ScanOutcome`] of one scan.
//! - [`MatchError`]: configuration and runtime failures.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use buffer::{MemoryBuffer, Quit};
//! use matcher::{Matcher, ScanOutcome, SignatureSet};
//! use sequence::Seq;
//!
//! # #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! # async fn main() -> Result<(), matcher::MatchError> {
//! let mut set = SignatureSet { max_bof: 4096, ..Default::default() };
//! set.bof_sequences.push(0, Seq::literal(0, b"PK\x03\x04".to_vec()));
//! let matcher = Arc::new(Matcher::new(set)?);
//!
//! let buf = Arc::new(MemoryBuffer::new(&b"PK\x03\x04 rest of archive"[..]));
//! let (strikes, outcome) = matcher.identify(buf, Quit::new()).collect().await;
//!
//! assert_eq!(outcome, ScanOutcome::Exhausted);
//! assert_eq!(strikes[0].node, 0);
//! # Ok(())
//! # }
//! ```

mod engine;
mod metrics;
mod types;

pub use crate::engine::{EngineBuilds, Gate, Identification, Matcher, Progress};
pub use crate::metrics::{set_match_metrics, MatchMetrics};
pub use crate::types::{
    Extent, FramePatterns, MatchError, ScanConfig, ScanOutcome, SequencePatterns, SignatureSet,
    Strike, Table,
};
