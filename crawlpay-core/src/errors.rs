/// Encoding errors raised while moving protocol values across the wire.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// JSON serialization/deserialization errors.
    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

/// A specialized `Result` type for core encoding operations.
pub type Result<T> = std::result::Result<T, Error>;
