//! Error classification for the decoding core.
//!
//! Every failure aborts the current record. Nothing is retried or downgraded;
//! the variant tells the caller whether the data, the schema or the calling
//! code is at fault.

use std::fmt;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed text at the tokenizer boundary, passed through untouched.
    #[error(transparent)]
    Tokenize(#[from] csv::Error),
    /// A cell does not match the grammar of its declared type.
    #[error("invalid {expected} value {raw:?}: {reason}")]
    Format {
        expected: String,
        raw: String,
        reason: String,
    },
    /// The schema declares a type the decoder has no rule for.
    #[error("unsupported target type: {0}")]
    UnsupportedType(String),
    /// The input names a column with no matching field.
    #[error("unknown field {field:?} in {message}")]
    UnknownField { field: String, message: String },
    /// Post-assembly validation found an unset required field.
    #[error("required field {0:?} is not set")]
    RequiredFieldMissing(String),
    /// Decoding was pointed at a target that does not exist or has the wrong shape.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

impl Error {
    pub(crate) fn format(expected: impl Into<String>, raw: &str, reason: impl fmt::Display) -> Self {
        Error::Format {
            expected: expected.into(),
            raw: raw.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format { .. })
    }
}
