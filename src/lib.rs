//! Workspace umbrella crate for bytesig, a byte-signature matcher.
//!
//! This crate stitches the buffer, sequence, frame and matcher layers
//! together behind a single dependency and adds YAML signature files on top,
//! so callers can go from a file on disk to a stream of strikes with one API.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytesig::{FileBuffer, Quit, SignatureFile};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let matcher = Arc::new(SignatureFile::from_file("signatures.yaml")?.into_matcher()?);
//! let buf = Arc::new(FileBuffer::open("sample.bin")?);
//!
//! let mut ident = matcher.identify(buf, Quit::new());
//! while let Some(strike) = ident.next().await {
//!     println!("{}", serde_json::to_string(&strike)?);
//! }
//! println!("{}", ident.finish().await.label());
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use buffer::{
    Buffer, BufferError, ChunkReader, FileBuffer, ForwardReader, MemoryBuffer, Quit,
    ReverseReader, StreamBuffer,
};
pub use frames::{Frame, FrameError, FrameHit, FrameSet};
pub use matcher::{
    set_match_metrics, EngineBuilds, Extent, FramePatterns, Gate, Identification, MatchError,
    MatchMetrics, Matcher, Progress, ScanConfig, ScanOutcome, SequencePatterns, SignatureSet,
    Strike, Table,
};
pub use sequence::{Choice, Direction, Seq, SeqHit, SequenceEngine, SequenceError};

pub use crate::config::{ConfigLoadError, SignatureFile};
