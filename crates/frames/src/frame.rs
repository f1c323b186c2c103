use crate::error::FrameError;

/// A pattern allowed to sit anywhere in `min_offset..=max_offset`.
///
/// BOF frames measure the offset from the start of the stream to the first
/// pattern byte. EOF frames measure it from the end of the stream to the last
/// pattern byte. `None` in the pattern matches any byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub min_offset: u64,
    pub max_offset: u64,
    pub pattern: Vec<Option<u8>>,
}

impl Frame {
    /// A literal at exactly `offset`.
    pub fn fixed(offset: u64, bytes: &[u8]) -> Self {
        Self::window(offset, offset, bytes.iter().copied().map(Some).collect())
    }

    pub fn window(min_offset: u64, max_offset: u64, pattern: Vec<Option<u8>>) -> Self {
        Self {
            min_offset,
            max_offset,
            pattern,
        }
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub(crate) fn matches(&self, candidate: &[u8]) -> bool {
        candidate.len() == self.pattern.len()
            && self
                .pattern
                .iter()
                .zip(candidate)
                .all(|(want, got)| want.map_or(true, |b| b == *got))
    }

    pub fn validate(&self, frame: usize) -> Result<(), FrameError> {
        if self.pattern.is_empty() {
            return Err(FrameError::EmptyPattern { frame });
        }
        if self.pattern.iter().all(Option::is_none) {
            return Err(FrameError::AllWildcards { frame });
        }
        if self.min_offset > self.max_offset {
            return Err(FrameError::InvertedWindow {
                frame,
                min: self.min_offset,
                max: self.max_offset,
            });
        }
        Ok(())
    }
}

/// First match of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHit {
    /// Index of the frame within its set.
    pub frame: usize,
    /// Offset from the anchored end, per [`Frame`].
    pub offset: u64,
    pub length: u64,
}
