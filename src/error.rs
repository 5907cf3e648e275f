use thiserror::Error;

/// Errors surfaced by the ambient, recoverable failure paths of the index.
///
/// Programmer precondition violations (wrong vector dimension on `add`,
/// a zero layer count on construction) are not represented here: they are
/// fatal and surfaced as panics, matching the source this crate is ported
/// from and the literal message strings its tests assert against.
#[derive(Debug, Error)]
pub enum Error {
    /// A layer snapshot failed to read through the underlying byte
    /// source, or failed before anything had been written. Partial
    /// progress is not recoverable; callers should discard whatever was
    /// written or read so far.
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A layer snapshot failed to write partway through, having already
    /// written `written` bytes to the sink. Mirrors the source's
    /// `(bytesWritten, error)` return pair for `Serialize`.
    #[error("snapshot i/o failed after writing {written} bytes: {source}")]
    SerializeIo {
        written: usize,
        source: std::io::Error,
    },

    /// A layer snapshot was structurally invalid: a negative count field,
    /// or the stream ended before the declared number of bytes arrived.
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot { reason: String },
}
