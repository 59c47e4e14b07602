use thiserror::Error;

/// Per-item failure categories.
///
/// Every variant is caught at the item boundary inside the batch orchestrator
/// and converted to a `(name, message)` entry in the batch result. None of
/// these abort the remaining items of a batch.
#[derive(Debug, Error)]
pub enum OpError {
    /// The destination resolver exhausted every strategy and suffix.
    #[error("no legal destination found for \"{0}\"")]
    NoLegalTarget(String),

    /// The write sink could not be opened.
    #[error("cannot open destination for writing: {0}")]
    CannotOpen(String),

    /// The source's declared type does not match the expected source format.
    #[error("Not a PNG image")]
    WrongType,

    /// The source bytes are not a valid image of the expected format.
    #[error("failed to decode image: {0}")]
    DecodeFailure(String),

    /// Encoding or metadata writing failed mid-stream.
    #[error("failed to write destination: {0}")]
    WriteFailure(String),

    /// The destination was missing or empty after the writer closed the sink.
    #[error("destination missing or empty after write")]
    IntegrityCheckFailed,

    /// The destination was confirmed but the original could not be removed.
    /// Creation success outweighs cleanup failure, so the orchestrator counts
    /// the item as a success and records this as a caveat instead.
    #[error("converted, but the original file could not be removed")]
    SourceDeletionFailed,
}
