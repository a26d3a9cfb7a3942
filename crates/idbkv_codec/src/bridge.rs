//! Conversion between caller types and [`Value`].
//!
//! Caller values go through `ciborium`'s value model, which accepts any
//! serde type, and are then narrowed to [`Value`]: integers must fit in an
//! `i64` and CBOR tags are not representable in a host engine.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as CborValue};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts a caller value into a [`Value`].
///
/// # Errors
///
/// Fails if serialization fails, an integer does not fit in `i64`, or the
/// value carries a CBOR tag.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
    let cbor =
        CborValue::serialized(value).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Value::try_from(cbor)
}

/// Converts a stored [`Value`] back into a caller value.
///
/// # Errors
///
/// Fails if the value does not have the shape `T` expects.
pub fn from_value<T: DeserializeOwned>(value: Value) -> CodecResult<T> {
    CborValue::from(value)
        .deserialized()
        .map_err(|e| CodecError::decoding_failed(e.to_string()))
}

impl TryFrom<CborValue> for Value {
    type Error = CodecError;

    fn try_from(value: CborValue) -> CodecResult<Self> {
        Ok(match value {
            CborValue::Null => Value::Null,
            CborValue::Bool(b) => Value::Bool(b),
            CborValue::Integer(n) => Value::Integer(
                i64::try_from(i128::from(n)).map_err(|_| CodecError::IntegerOverflow)?,
            ),
            CborValue::Float(f) => Value::Float(f),
            CborValue::Bytes(b) => Value::Bytes(b),
            CborValue::Text(s) => Value::Text(s),
            CborValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<CodecResult<_>>()?,
            ),
            CborValue::Map(pairs) => Value::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| Ok((Value::try_from(k)?, Value::try_from(v)?)))
                    .collect::<CodecResult<_>>()?,
            ),
            CborValue::Tag(tag, _) => {
                return Err(CodecError::encoding_failed(format!(
                    "CBOR tag {tag} has no stored representation"
                )))
            }
            other => {
                return Err(CodecError::encoding_failed(format!(
                    "unsupported CBOR value {other:?}"
                )))
            }
        })
    }
}

impl From<Value> for CborValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CborValue::Null,
            Value::Bool(b) => CborValue::Bool(b),
            Value::Integer(n) => CborValue::Integer(Integer::from(n)),
            Value::Float(f) => CborValue::Float(f),
            Value::Bytes(b) => CborValue::Bytes(b),
            Value::Text(s) => CborValue::Text(s),
            Value::Array(items) => {
                CborValue::Array(items.into_iter().map(CborValue::from).collect())
            }
            Value::Map(pairs) => CborValue::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (CborValue::from(k), CborValue::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        pinned: bool,
        score: f64,
        tags: Vec<String>,
        parent: Option<u32>,
    }

    fn note() -> Note {
        Note {
            title: "groceries".into(),
            pinned: true,
            score: 0.5,
            tags: vec!["home".into()],
            parent: None,
        }
    }

    #[test]
    fn struct_becomes_text_keyed_map() {
        let value = to_value(&note()).unwrap();
        assert_eq!(value.get("title"), Some(&Value::from("groceries")));
        assert_eq!(value.get("pinned"), Some(&Value::Bool(true)));
        assert_eq!(value.get("parent"), Some(&Value::Null));
    }

    #[test]
    fn struct_survives_the_bridge() {
        let value = to_value(&note()).unwrap();
        let back: Note = from_value(value).unwrap();
        assert_eq!(back, note());
    }

    #[test]
    fn map_and_scalars() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), 1i32);
        let value = to_value(&map).unwrap();
        assert_eq!(value, Value::object([("x", Value::Integer(1))]));
        assert_eq!(to_value("s").unwrap(), Value::from("s"));
        assert_eq!(to_value(&()).unwrap(), Value::Null);
    }

    #[test]
    fn u64_beyond_i64_overflows() {
        assert_eq!(to_value(&u64::MAX), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn decoding_into_wrong_shape_fails() {
        let result: CodecResult<Note> = from_value(Value::Integer(1));
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
