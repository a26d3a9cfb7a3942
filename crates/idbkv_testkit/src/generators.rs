//! Property-based test generators using proptest.

use crate::fixtures::Record;
use idbkv_codec::Key;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for scalar keys: integers, short text and short byte strings.
pub fn scalar_key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        any::<i64>().prop_map(Key::Integer),
        "[a-z0-9]{0,12}".prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Key::Bytes),
    ]
}

/// Strategy for keys, arrays included (one level deep).
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        4 => scalar_key_strategy(),
        1 => prop::collection::vec(scalar_key_strategy(), 0..3).prop_map(Key::Array),
    ]
}

/// Strategy for text keys, which every store accepts as out-of-line keys.
pub fn text_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,16}"
}

/// Strategy for [`Record`] values.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        ".{0,24}",
        any::<i64>(),
        prop::collection::vec("[a-z]{1,6}", 0..4),
        any::<bool>(),
    )
        .prop_map(|(title, count, tags, done)| Record {
            title,
            count,
            tags,
            done,
        })
}

/// Strategy for a set of records under distinct keys.
pub fn records_strategy(max: usize) -> impl Strategy<Value = BTreeMap<Key, Record>> {
    prop::collection::btree_map(key_strategy(), record_strategy(), 0..max)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn text_keys_are_non_empty(key in text_key_strategy()) {
            prop_assert!(!key.is_empty());
        }

        #[test]
        fn array_keys_hold_only_scalars(key in key_strategy()) {
            if let Key::Array(parts) = key {
                prop_assert!(parts.iter().all(|part| !matches!(part, Key::Array(_))));
            }
        }
    }
}
