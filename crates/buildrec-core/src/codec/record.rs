//! Outer record encode/decode.
//!
//! Most optional fields collapse `null` and absence into `None`. Keys that
//! arrive as `null` and vanish from the typed form are remembered by JSON
//! pointer and re-inserted on encode, so both stay distinguishable.

use std::collections::BTreeSet;

use serde_json::Value;

use super::CodecError;
use crate::domain::BuildRecord;

/// Top-level keys every record must carry.
pub const REQUIRED_KEYS: [&str; 5] = ["apiVersion", "kind", "metadata", "spec", "status"];

/// Output layout for the outer document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Compact,
    Pretty,
}

pub fn decode_record(text: &str) -> Result<BuildRecord, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let object = value.as_object().ok_or(CodecError::NotAnObject)?;
    if let Some(missing) = REQUIRED_KEYS.iter().copied().find(|key| !object.contains_key(*key)) {
        return Err(CodecError::MissingKey(missing));
    }
    let mut record: BuildRecord = serde_json::from_value(value.clone())?;

    let typed = serde_json::to_value(&record)?;
    let mut dropped = BTreeSet::new();
    collect_dropped_nulls(&value, Some(&typed), "", &mut dropped);
    if !dropped.is_empty() {
        tracing::debug!(count = dropped.len(), "keeping explicit nulls");
    }
    record.dropped_nulls = dropped;

    tracing::debug!(name = ?record.metadata.name, phase = %record.status.phase, "decoded build record");
    Ok(record)
}

pub fn encode_record(record: &BuildRecord, layout: Layout) -> Result<String, CodecError> {
    let mut value = serde_json::to_value(record)?;
    restore_nulls(&mut value, &record.dropped_nulls);
    let text = match layout {
        Layout::Compact => serde_json::to_string(&value)?,
        Layout::Pretty => serde_json::to_string_pretty(&value)?,
    };
    Ok(text)
}

fn collect_dropped_nulls(input: &Value, typed: Option<&Value>, pointer: &str, out: &mut BTreeSet<String>) {
    match input {
        Value::Object(map) => {
            for (key, child) in map {
                let path = format!("{pointer}/{}", escape_token(key));
                let typed_child = typed.and_then(|t| t.get(key));
                if child.is_null() && typed_child.is_none() {
                    out.insert(path);
                } else {
                    collect_dropped_nulls(child, typed_child, &path, out);
                }
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let path = format!("{pointer}/{index}");
                collect_dropped_nulls(child, typed.and_then(|t| t.get(index)), &path, out);
            }
        }
        _ => {}
    }
}

/// Insert `null` at every pointer whose parent object still exists and
/// whose key is still absent.
fn restore_nulls(value: &mut Value, pointers: &BTreeSet<String>) {
    for pointer in pointers {
        let Some((parent, token)) = pointer.rsplit_once('/') else {
            continue;
        };
        if let Some(Value::Object(map)) = value.pointer_mut(parent) {
            map.entry(unescape_token(token)).or_insert(Value::Null);
        }
    }
}

// RFC 6901
fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "apiVersion": "build.openshift.io/v1",
            "kind": "Build",
            "metadata": {"name": "b-1"},
            "spec": {"strategy": {"type": "Custom"}},
            "status": {"phase": "New"}
        })
    }

    #[rstest]
    #[case("apiVersion")]
    #[case("kind")]
    #[case("metadata")]
    #[case("spec")]
    #[case("status")]
    fn missing_required_key_is_named(#[case] key: &str) {
        let mut doc = minimal();
        doc.as_object_mut().unwrap().remove(key);
        let err = decode_record(&doc.to_string()).unwrap_err();
        assert!(matches!(err, CodecError::MissingKey(k) if k == key));
    }

    #[test]
    fn root_must_be_an_object() {
        assert!(matches!(decode_record("[]").unwrap_err(), CodecError::NotAnObject));
    }

    #[test]
    fn minimal_record_round_trips() {
        let doc = minimal();
        let record = decode_record(&doc.to_string()).unwrap();
        let back: Value = serde_json::from_str(&encode_record(&record, Layout::Compact).unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn explicit_nulls_survive() {
        let mut doc = minimal();
        doc["metadata"]["creationTimestamp"] = Value::Null;
        doc["metadata"]["labels"] = Value::Null;
        doc["metadata"]["annotations"] = json!({"a/b~c": "x"});
        doc["spec"]["output"] = Value::Null;
        doc["spec"]["strategy"]["customStrategy"] = json!({
            "from": {"kind": "DockerImage", "name": "buildroot:latest"},
            "env": [{"name": "A", "value": null}, {"name": "B", "value": "1"}]
        });
        doc["status"]["reason"] = Value::Null;
        doc["status"]["completionTimestamp"] = Value::Null;

        let record = decode_record(&doc.to_string()).unwrap();
        assert_eq!(record.metadata.creation_timestamp, None);
        assert_eq!(record.status.reason, None);

        let back: Value = serde_json::from_str(&encode_record(&record, Layout::Compact).unwrap()).unwrap();
        assert_eq!(back, doc);
        assert_eq!(decode_record(&back.to_string()).unwrap(), record);
    }

    #[test]
    fn values_set_after_decode_replace_the_null() {
        let mut doc = minimal();
        doc["status"]["reason"] = Value::Null;
        let mut record = decode_record(&doc.to_string()).unwrap();
        record.status.reason = Some("GenericBuildFailed".to_string());

        let back: Value = serde_json::from_str(&encode_record(&record, Layout::Compact).unwrap()).unwrap();
        assert_eq!(back["status"]["reason"], "GenericBuildFailed");
    }

    #[rstest]
    #[case("a/b~c", "a~1b~0c")]
    #[case("plain", "plain")]
    fn pointer_tokens_are_escaped(#[case] key: &str, #[case] token: &str) {
        assert_eq!(escape_token(key), token);
        assert_eq!(unescape_token(token), key);
    }

    #[test]
    fn pretty_layout_is_still_the_same_document() {
        let record = decode_record(&minimal().to_string()).unwrap();
        let pretty = encode_record(&record, Layout::Pretty).unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(decode_record(&pretty).unwrap(), record);
    }
}
