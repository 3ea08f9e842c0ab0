//! Errors raised while serializing property values.

use thiserror::Error;

/// Result of a serialize or unserialize call.
pub type CodecResult<T> = Result<T, CodecError>;

/// Failure to turn a property value into bytes or back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value has no byte form in this codec.
    #[error("cannot serialize property value: {message}")]
    EncodingFailed {
        /// Underlying codec message.
        message: String,
    },

    /// The stored bytes are not a value of this codec.
    #[error("cannot unserialize stored bytes: {message}")]
    DecodingFailed {
        /// Underlying codec message.
        message: String,
    },
}

impl CodecError {
    /// Wraps an encoder message.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Wraps a decoder message.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
