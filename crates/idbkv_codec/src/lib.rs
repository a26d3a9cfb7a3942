//! # idbkv codec
//!
//! The key and value model shared by idbkv hosts and the idbkv handle.
//!
//! - [`Key`] is a record key with the total order host engines use.
//! - [`KeyRange`] and [`Query`] address one key or a contiguous run of keys.
//! - [`Value`] is the structured tree a host engine stores.
//! - [`to_value`] and [`from_value`] move caller serde types in and out of
//!   [`Value`].
//!
//! ## Usage
//!
//! ```
//! use idbkv_codec::{from_value, to_value, Key, KeyRange, Value};
//!
//! let value = to_value(&vec![1, 2, 3]).unwrap();
//! assert_eq!(value, Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]));
//! let back: Vec<i32> = from_value(value).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//!
//! let range = KeyRange::bound("a", "m", false, true).unwrap();
//! assert!(range.contains(&Key::from("b")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod error;
mod key;
mod value;

pub use bridge::{from_value, to_value};
pub use error::{CodecError, CodecResult};
pub use key::{Key, KeyRange, Query};
pub use value::Value;
