use buffer::BufferError;
use frames::{Frame, FrameError};
use sequence::{Seq, SequenceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One reported pattern hit.
///
/// `node` has already been resolved through the test-tree table of the
/// producer that found the hit; `(reverse, frame)` names that table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Strike {
    /// Shared signature-fragment node.
    pub node: usize,
    /// Subsequence index; always 0 for frames.
    pub sub_key: usize,
    /// From the beginning when `reverse` is false, from the end otherwise.
    pub offset: u64,
    pub length: u64,
    pub reverse: bool,
    pub frame: bool,
    /// False for provisional sequence hits that a later hit may complete.
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl Strike {
    pub fn table(&self) -> Table {
        match (self.reverse, self.frame) {
            (false, false) => Table::BofSequence,
            (true, false) => Table::EofSequence,
            (false, true) => Table::BofFrame,
            (true, true) => Table::EofFrame,
        }
    }
}

/// The four independent producer/test-tree pairings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    BofSequence,
    EofSequence,
    BofFrame,
    EofFrame,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Table::BofSequence => "bof_sequences",
            Table::EofSequence => "eof_sequences",
            Table::BofFrame => "bof_frames",
            Table::EofFrame => "eof_frames",
        };
        f.write_str(name)
    }
}

/// Sequence patterns plus the test-tree node each one resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencePatterns {
    pub seqs: Vec<Seq>,
    /// `test_tree[i]` is the node for `seqs[i]`.
    pub test_tree: Vec<usize>,
}

impl SequencePatterns {
    pub fn push(&mut self, node: usize, seq: Seq) {
        self.seqs.push(seq);
        self.test_tree.push(node);
    }
}

/// Frame patterns plus the test-tree node each one resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePatterns {
    pub frames: Vec<Frame>,
    /// `test_tree[i]` is the node for `frames[i]`.
    pub test_tree: Vec<usize>,
}

impl FramePatterns {
    pub fn push(&mut self, node: usize, frame: Frame) {
        self.frames.push(frame);
        self.test_tree.push(node);
    }
}

/// Compiled signature set a [`Matcher`](crate::Matcher) is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    pub bof_sequences: SequencePatterns,
    pub eof_sequences: SequencePatterns,
    pub bof_frames: FramePatterns,
    pub eof_frames: FramePatterns,
    /// `>0` scan that many leading bytes for sequences, `0` skip, `<0` whole stream.
    pub max_bof: i64,
    /// Same as `max_bof`, measured from the end.
    pub max_eof: i64,
}

/// How much of one end of the stream a sequence scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Skip,
    Limited(u64),
    Whole,
}

impl From<i64> for Extent {
    fn from(value: i64) -> Self {
        match value {
            0 => Extent::Skip,
            n if n > 0 => Extent::Limited(n as u64),
            _ => Extent::Whole,
        }
    }
}

/// Per-matcher tuning shared by every identification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanConfig {
    /// Slots in each producer channel and in the strike channel. Small
    /// values keep producers in step with the consumer.
    #[serde(default = "ScanConfig::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ScanConfig {
    pub(crate) fn default_channel_capacity() -> usize {
        1
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.channel_capacity == 0 {
            return Err(MatchError::InvalidConfig(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

/// How an identification ended.
///
/// The strike channel closes the same way in every case; this is the only
/// place the reason is visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every producer ran to completion.
    Exhausted,
    /// The caller's quit token fired.
    Cancelled,
    /// The strike receiver was dropped before the scan finished.
    Abandoned,
    /// The reverse reader could not be built; EOF producers never started.
    Truncated(BufferError),
    /// A sequence engine could not be built.
    Failed(MatchError),
}

impl ScanOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ScanOutcome::Exhausted => "exhausted",
            ScanOutcome::Cancelled => "cancelled",
            ScanOutcome::Abandoned => "abandoned",
            ScanOutcome::Truncated(_) => "truncated",
            ScanOutcome::Failed(_) => "failed",
        }
    }
}

/// Errors produced by the matching layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MatchError {
    #[error("invalid match config: {0}")]
    InvalidConfig(String),

    #[error("invalid sequence: {0}")]
    Sequence(#[from] SequenceError),

    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("{table} has {entries} test-tree entries for {patterns} patterns")]
    TestTreeMismatch {
        table: Table,
        entries: usize,
        patterns: usize,
    },

    #[error("runtime error: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_follows_sign() {
        assert_eq!(Extent::from(0), Extent::Skip);
        assert_eq!(Extent::from(4096), Extent::Limited(4096));
        assert_eq!(Extent::from(-1), Extent::Whole);
    }

    #[test]
    fn strike_table_follows_flags() {
        let mut strike = Strike {
            node: 0,
            sub_key: 0,
            offset: 0,
            length: 1,
            reverse: false,
            frame: false,
            is_final: true,
        };
        assert_eq!(strike.table(), Table::BofSequence);
        strike.reverse = true;
        assert_eq!(strike.table(), Table::EofSequence);
        strike.frame = true;
        assert_eq!(strike.table(), Table::EofFrame);
        strike.reverse = false;
        assert_eq!(strike.table(), Table::BofFrame);
    }

    #[test]
    fn strike_serializes_final_flag_by_name() {
        let strike = Strike {
            node: 7,
            sub_key: 1,
            offset: 12,
            length: 4,
            reverse: true,
            frame: false,
            is_final: false,
        };
        let json = serde_json::to_value(strike).unwrap();
        assert_eq!(json["final"], serde_json::json!(false));
        assert_eq!(json["node"], serde_json::json!(7));
    }

    #[test]
    fn zero_capacity_rejected() {
        let cfg = ScanConfig {
            channel_capacity: 0,
        };
        let err = cfg.validate().expect_err("config should be invalid");
        match err {
            MatchError::InvalidConfig(msg) => assert!(msg.contains("channel_capacity")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
