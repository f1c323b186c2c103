use crate::error::SequenceError;

/// Alternative byte strings for one subsequence.
pub type Choice = Vec<Vec<u8>>;

/// Which end of the stream a set of sequences is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Anchored at the beginning, fed by a forward reader.
    Forward,
    /// Anchored at the end, fed by a reverse reader.
    Reverse,
}

/// An ordered chain of subsequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seq {
    /// One bound per subsequence; `-1` is unbounded.
    pub max_offsets: Vec<i64>,
    pub choices: Vec<Choice>,
}

impl Seq {
    /// A single literal that must start within `max_offset` bytes of the anchor.
    pub fn literal(max_offset: i64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            max_offsets: vec![max_offset],
            choices: vec![vec![bytes.into()]],
        }
    }

    /// Append a subsequence following the previous one within `max_gap` bytes.
    pub fn then(mut self, max_gap: i64, choice: Choice) -> Self {
        self.max_offsets.push(max_gap);
        self.choices.push(choice);
        self
    }

    /// Check the shape of sequence number `seq` within its set.
    pub fn validate(&self, seq: usize) -> Result<(), SequenceError> {
        if self.choices.is_empty() {
            return Err(SequenceError::NoSubsequences { seq });
        }
        if self.max_offsets.len() != self.choices.len() {
            return Err(SequenceError::OffsetArity {
                seq,
                offsets: self.max_offsets.len(),
                subs: self.choices.len(),
            });
        }
        for (sub, choice) in self.choices.iter().enumerate() {
            if choice.is_empty() {
                return Err(SequenceError::EmptyChoice { seq, sub });
            }
            if choice.iter().any(Vec::is_empty) {
                return Err(SequenceError::EmptyAlternative { seq, sub });
            }
        }
        Ok(())
    }
}

/// One reported subsequence match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqHit {
    /// Index of the sequence within the compiled set.
    pub seq: usize,
    /// Index of the subsequence within the sequence.
    pub sub: usize,
    /// Start of the match, counted from the anchored end of the stream.
    pub offset: u64,
    pub length: u64,
    /// Set when this hit completes the sequence.
    pub is_final: bool,
}
