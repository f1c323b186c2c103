use thiserror::Error;

/// Problems found while compiling a sequence set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SequenceError {
    #[error("sequence {seq} has no subsequences")]
    NoSubsequences { seq: usize },

    #[error("sequence {seq} subsequence {sub} has no alternatives")]
    EmptyChoice { seq: usize, sub: usize },

    #[error("sequence {seq} subsequence {sub} contains an empty alternative")]
    EmptyAlternative { seq: usize, sub: usize },

    #[error("sequence {seq} has {offsets} offset bounds for {subs} subsequences")]
    OffsetArity {
        seq: usize,
        offsets: usize,
        subs: usize,
    },

    #[error("automaton construction failed: {0}")]
    Build(String),
}
