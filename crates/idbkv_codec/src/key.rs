//! Record keys, key ranges and queries.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::fmt;
use std::ops::Bound;

/// A record key.
///
/// Keys are totally ordered the way the host engine orders them: every
/// integer sorts before every text, text before bytes, bytes before arrays.
/// Arrays compare element by element, a shorter prefix sorting first. The
/// variant order below is what makes the derived `Ord` follow these rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key. Key generators produce these.
    Integer(i64),
    /// Text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Compound key.
    Array(Vec<Key>),
}

impl Key {
    /// Returns the key as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Key::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the key as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Integer(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
            Key::Bytes(b) => {
                f.write_str("0x")?;
                b.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
            Key::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Integer(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Integer(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key::Bytes(b.to_vec())
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Integer(n) => Value::Integer(n),
            Key::Text(s) => Value::Text(s),
            Key::Bytes(b) => Value::Bytes(b),
            Key::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        }
    }
}

/// Floats at or beyond 2^53 are not exact integers.
const SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl TryFrom<&Value> for Key {
    type Error = CodecError;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Integer(n) => Ok(Key::Integer(*n)),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < SAFE_INTEGER => {
                Ok(Key::Integer(*f as i64))
            }
            Value::Text(s) => Ok(Key::Text(s.clone())),
            Value::Bytes(b) => Ok(Key::Bytes(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::try_from)
                .collect::<CodecResult<Vec<_>>>()
                .map(Key::Array),
            other => Err(CodecError::invalid_key(format!(
                "{other:?} is not a valid key"
            ))),
        }
    }
}

/// A contiguous range of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// A range containing exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// All keys above `lower` (excluding it when `open`).
    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// All keys below `upper` (excluding it when `open`).
    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(upper.into()),
            lower_open: false,
            upper_open: open,
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Fails if `lower > upper`, or if both bounds are equal and either
    /// side is open.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CodecResult<Self> {
        let lower = lower.into();
        let upper = upper.into();
        if lower > upper {
            return Err(CodecError::invalid_range(format!(
                "lower bound {lower} is greater than upper bound {upper}"
            )));
        }
        if lower == upper && (lower_open || upper_open) {
            return Err(CodecError::invalid_range(format!(
                "range over {lower} with an open bound is empty"
            )));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// Lower bound, if any.
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// Upper bound, if any.
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound is excluded.
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound is excluded.
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// The range as a pair of [`Bound`]s, suitable for `BTreeMap::range`.
    pub fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        fn bound(key: Option<&Key>, open: bool) -> Bound<&Key> {
            match (key, open) {
                (None, _) => Bound::Unbounded,
                (Some(k), true) => Bound::Excluded(k),
                (Some(k), false) => Bound::Included(k),
            }
        }
        (
            bound(self.lower.as_ref(), self.lower_open),
            bound(self.upper.as_ref(), self.upper_open),
        )
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            None => true,
            Some(lower) if self.lower_open => key > lower,
            Some(lower) => key >= lower,
        };
        let below = match &self.upper {
            None => true,
            Some(upper) if self.upper_open => key < upper,
            Some(upper) => key <= upper,
        };
        above && below
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.lower_open { "(" } else { "[" })?;
        match &self.lower {
            Some(k) => write!(f, "{k}")?,
            None => f.write_str("-inf")?,
        }
        f.write_str(", ")?;
        match &self.upper {
            Some(k) => write!(f, "{k}")?,
            None => f.write_str("+inf")?,
        }
        f.write_str(if self.upper_open { ")" } else { "]" })
    }
}

/// What a read or delete addresses: one key or a key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Exactly one key.
    Key(Key),
    /// Every key inside the range.
    Range(KeyRange),
}

impl Query {
    /// Whether `key` is addressed by this query.
    pub fn matches(&self, key: &Key) -> bool {
        match self {
            Query::Key(k) => k == key,
            Query::Range(range) => range.contains(key),
        }
    }

    /// The single key, if this query addresses exactly one.
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Query::Key(k) => Some(k),
            Query::Range(_) => None,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Key(k) => write!(f, "{k}"),
            Query::Range(r) => write!(f, "{r}"),
        }
    }
}

impl From<Key> for Query {
    fn from(key: Key) -> Self {
        Query::Key(key)
    }
}

impl From<&Key> for Query {
    fn from(key: &Key) -> Self {
        Query::Key(key.clone())
    }
}

impl From<KeyRange> for Query {
    fn from(range: KeyRange) -> Self {
        Query::Range(range)
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Query::Key(Key::from(s))
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Query::Key(Key::from(s))
    }
}

impl From<i64> for Query {
    fn from(n: i64) -> Self {
        Query::Key(Key::Integer(n))
    }
}

impl From<i32> for Query {
    fn from(n: i32) -> Self {
        Query::Key(Key::from(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn type_order_is_integer_text_bytes_array() {
        let mut keys = vec![
            Key::Array(vec![]),
            Key::Bytes(vec![0]),
            Key::Text("a".into()),
            Key::Integer(i64::MAX),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::Integer(i64::MAX),
                Key::Text("a".into()),
                Key::Bytes(vec![0]),
                Key::Array(vec![]),
            ]
        );
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let short = Key::Array(vec![Key::from(1)]);
        let long = Key::Array(vec![Key::from(1), Key::from(0)]);
        let bigger = Key::Array(vec![Key::from(2)]);
        assert!(short < long);
        assert!(long < bigger);
    }

    #[test]
    fn bound_rejects_inverted_and_empty_ranges() {
        assert!(KeyRange::bound(5, 1, false, false).is_err());
        assert!(KeyRange::bound(3, 3, true, false).is_err());
        assert!(KeyRange::bound(3, 3, false, false).is_ok());
    }

    #[test]
    fn range_membership() {
        let range = KeyRange::bound("b", "d", false, true).unwrap();
        assert!(!range.contains(&Key::from("a")));
        assert!(range.contains(&Key::from("b")));
        assert!(range.contains(&Key::from("c")));
        assert!(!range.contains(&Key::from("d")));

        let above = KeyRange::lower_bound(10, true);
        assert!(!above.contains(&Key::from(10)));
        assert!(above.contains(&Key::from(11)));
        assert!(above.contains(&Key::from("text")));
    }

    #[test]
    fn bounds_follow_open_flags() {
        let range = KeyRange::bound(1, 9, true, false).unwrap();
        let (one, nine) = (Key::from(1), Key::from(9));
        assert_eq!(range.bounds(), (Bound::Excluded(&one), Bound::Included(&nine)));

        let below = KeyRange::upper_bound(9, true);
        assert_eq!(below.bounds(), (Bound::Unbounded, Bound::Excluded(&nine)));
    }

    #[test]
    fn key_from_value() {
        assert_eq!(Key::try_from(&Value::Integer(4)).unwrap(), Key::Integer(4));
        assert_eq!(Key::try_from(&Value::Float(4.0)).unwrap(), Key::Integer(4));
        assert!(Key::try_from(&Value::Float(4.5)).is_err());
        assert!(Key::try_from(&Value::Null).is_err());
        assert!(Key::try_from(&Value::Array(vec![Value::Bool(true)])).is_err());
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Key::from("a").to_string(), "\"a\"");
        assert_eq!(Key::Bytes(vec![0xab, 1]).to_string(), "0xab01");
        assert_eq!(
            Key::Array(vec![Key::from(1), Key::from("x")]).to_string(),
            "[1, \"x\"]"
        );
        assert_eq!(KeyRange::upper_bound(3, true).to_string(), "[-inf, 3)");
    }

    proptest! {
        #[test]
        fn contains_agrees_with_btree_bounds(
            keys in prop::collection::btree_set(any::<i64>(), 0..32),
            lo in any::<i64>(),
            span in 0i64..1000,
            lo_open in any::<bool>(),
            hi_open in any::<bool>(),
        ) {
            let hi = lo.saturating_add(span);
            prop_assume!(lo != hi || (!lo_open && !hi_open));
            let range = KeyRange::bound(lo, hi, lo_open, hi_open).unwrap();
            let keys: std::collections::BTreeSet<Key> = keys.into_iter().map(Key::from).collect();
            let via_bounds: Vec<_> = keys.range(range.bounds()).cloned().collect();
            let via_contains: Vec<_> = keys.iter().filter(|k| range.contains(k)).cloned().collect();
            prop_assert_eq!(via_bounds, via_contains);
        }
    }
}
