//! Conversions between idbkv keys and values and JavaScript values.
//!
//! JavaScript has a single number type: integral numbers within the safe
//! integer range read back as [`Value::Integer`], others as
//! [`Value::Float`]. Keys must be integral.

use crate::error::dom_error;
use idbkv_codec::{Key, KeyRange, Value};
use idbkv_host::{HostError, HostResult};
use js_sys::{Array, ArrayBuffer, Number, Uint8Array};
use serde::Serialize;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::IdbKeyRange;

const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

pub(crate) fn value_to_js(value: &Value) -> HostResult<JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
    value
        .serialize(&serializer)
        .map_err(|e| HostError::data(e.to_string()))
}

pub(crate) fn js_to_value(value: JsValue) -> HostResult<Value> {
    let value: Value =
        serde_wasm_bindgen::from_value(value).map_err(|e| HostError::data(e.to_string()))?;
    Ok(integral(value))
}

fn integral(value: Value) -> Value {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64 => {
            Value::Integer(f as i64)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(integral).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (integral(k), integral(v)))
                .collect(),
        ),
        other => other,
    }
}

pub(crate) fn key_to_js(key: &Key) -> HostResult<JsValue> {
    Ok(match key {
        Key::Integer(n) => {
            if n.abs() > MAX_SAFE_INTEGER {
                return Err(HostError::data(format!(
                    "integer key {n} is outside the safe JavaScript range"
                )));
            }
            JsValue::from_f64(*n as f64)
        }
        Key::Text(s) => JsValue::from_str(s),
        Key::Bytes(b) => Uint8Array::from(b.as_slice()).into(),
        Key::Array(items) => {
            let array = Array::new();
            for item in items {
                array.push(&key_to_js(item)?);
            }
            array.into()
        }
    })
}

pub(crate) fn js_to_key(value: &JsValue) -> HostResult<Key> {
    if let Some(n) = value.as_f64() {
        if Number::is_safe_integer(value) {
            return Ok(Key::Integer(n as i64));
        }
        return Err(HostError::data(format!("unsupported number key {n}")));
    }
    if let Some(s) = value.as_string() {
        return Ok(Key::Text(s));
    }
    if let Some(buffer) = value.dyn_ref::<ArrayBuffer>() {
        return Ok(Key::Bytes(Uint8Array::new(buffer).to_vec()));
    }
    if let Some(bytes) = value.dyn_ref::<Uint8Array>() {
        return Ok(Key::Bytes(bytes.to_vec()));
    }
    if Array::is_array(value) {
        let array: &Array = value.unchecked_ref();
        return array
            .iter()
            .map(|item| js_to_key(&item))
            .collect::<HostResult<Vec<_>>>()
            .map(Key::Array);
    }
    Err(HostError::data(format!("unsupported key {value:?}")))
}

pub(crate) fn range_to_js(range: &KeyRange) -> HostResult<JsValue> {
    let lower = range.lower().map(key_to_js).transpose()?;
    let upper = range.upper().map(key_to_js).transpose()?;
    let range = match (lower, upper) {
        (Some(lower), Some(upper)) => IdbKeyRange::bound_with_lower_open_and_upper_open(
            &lower,
            &upper,
            range.lower_open(),
            range.upper_open(),
        ),
        (Some(lower), None) => IdbKeyRange::lower_bound_with_open(&lower, range.lower_open()),
        (None, Some(upper)) => IdbKeyRange::upper_bound_with_open(&upper, range.upper_open()),
        (None, None) => return Ok(JsValue::UNDEFINED),
    };
    range.map(Into::into).map_err(dom_error)
}
