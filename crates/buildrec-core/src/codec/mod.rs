//! Record codec: the outer document and the payloads nested inside it.
//!
//! Two fields of a build record carry a whole JSON object serialized into a
//! string (`metadata.annotations.from` and the `USER_PARAMS` env value).
//! The outer codec never looks inside them; `decode_nested` / `encode_nested`
//! run the extra pass on demand.

mod nested;
mod python;
mod record;
pub mod timestamp;

pub use nested::{NestedStyle, decode_nested, encode_nested};
pub(crate) use python::to_python_string_in_order;
pub use record::{Layout, REQUIRED_KEYS, decode_record, encode_record};
pub use timestamp::Timestamp;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record root must be a JSON object")]
    NotAnObject,

    #[error("record is missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("nested payload in {field} is invalid: {source}")]
    Nested {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl CodecError {
    /// Attach the name of the field a nested payload came from.
    pub fn in_field(self, field: &'static str) -> Self {
        match self {
            CodecError::Json(source) => CodecError::Nested { field, source },
            other => other,
        }
    }
}
