//! Nested payloads: JSON objects carried as string values.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::CodecError;
use super::python::to_python_string;

/// How a nested payload is laid out when it is written back into its string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestedStyle {
    /// `{"kind":"DockerImage","name":"x"}`: no whitespace, field order kept.
    /// This is how the cluster writes the `from` annotation.
    #[default]
    Compact,

    /// `{"a": 1, "b": 2}`: sorted keys, Python separators, ASCII only.
    /// This is how the build client writes `USER_PARAMS`.
    Python,
}

/// Decode the string form of a nested payload.
pub fn decode_nested<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode a payload back into its string form.
pub fn encode_nested<T: Serialize + ?Sized>(payload: &T, style: NestedStyle) -> Result<String, CodecError> {
    match style {
        NestedStyle::Compact => Ok(serde_json::to_string(payload)?),
        NestedStyle::Python => {
            let value: Value = serde_json::to_value(payload)?;
            Ok(to_python_string(&value)?)
        }
    }
}
