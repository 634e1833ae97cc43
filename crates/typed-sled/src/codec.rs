use crate::schema::Schema;

/// Boxed source error carried by codec failures.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Unable to decode a key because it has a different length than expected.
    #[error("invalid key length in '{schema}' (expected {expected} bytes, got {actual})")]
    InvalidKeyLength {
        schema: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to serialize for '{schema}': {source}")]
    SerializationFailed {
        schema: &'static str,
        source: BoxedError,
    },

    #[error("failed to deserialize for '{schema}': {source}")]
    DeserializationFailed {
        schema: &'static str,
        source: BoxedError,
    },

    /// Stored value was written by a newer schema version than this build understands.
    #[error("unsupported value version {version} in '{schema}' (latest known {latest})")]
    UnsupportedVersion {
        schema: &'static str,
        version: u8,
        latest: u8,
    },

    #[error("{0}")]
    Other(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

pub trait KeyCodec<S: Schema>: Sized {
    fn encode_key(&self) -> CodecResult<Vec<u8>>;
    fn decode_key(buf: &[u8]) -> CodecResult<Self>;
}

pub trait ValueCodec<S: Schema>: Sized {
    fn encode_value(&self) -> CodecResult<Vec<u8>>;
    fn decode_value(buf: &[u8]) -> CodecResult<Self>;
}
