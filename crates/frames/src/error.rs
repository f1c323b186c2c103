use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    #[error("frame {frame} has an empty pattern")]
    EmptyPattern { frame: usize },

    #[error("frame {frame} window is inverted ({min} > {max})")]
    InvertedWindow { frame: usize, min: u64, max: u64 },

    #[error("frame {frame} is all wildcards")]
    AllWildcards { frame: usize },
}
