//! Error types produced by buffers and readers.

use thiserror::Error;

/// Failures while reading from a [`Buffer`](crate::Buffer).
///
/// I/O failures are captured as text so the error stays cloneable; a stream
/// that failed once keeps reporting the same failure for every read past the
/// bytes it had already cached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferError {
    /// The underlying source failed.
    #[error("i/o failure reading source: {0}")]
    Io(String),

    /// The identification owning this buffer was cancelled.
    #[error("read abandoned after cancellation")]
    Cancelled,

    /// A reverse reader was requested over a zero-length stream.
    #[error("stream is empty; no end to anchor to")]
    Empty,
}

impl From<std::io::Error> for BufferError {
    fn from(value: std::io::Error) -> Self {
        BufferError::Io(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_message() {
        let err: BufferError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read").into();
        assert_eq!(err, BufferError::Io("short read".into()));
        assert!(err.to_string().contains("short read"));
    }
}
