use std::hash::Hasher;

use fnv::FnvHasher;

use crate::value::{Value, ValueView};

/// The type tag of a hash key. Only numbers, booleans and strings can be
/// used as hash keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashTag {
    Number,
    Boolean,
    String,
}

/// A hashable identity for a Value: a type tag plus a 64-bit value.
///
/// Two values produce the same key exactly when the language considers
/// them equal hash keys: equal numbers, equal booleans, strings with the
/// same byte content (regardless of which instance they are).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: HashTag,
    pub value: u64,
}

impl Value {
    /// The hash identity of this value, or `None` if the value is not
    /// hashable (arrays, hashes, functions, ...).
    pub fn hash_key(&self) -> Option<HashKey> {
        match self.view() {
            // Bit pattern with -0.0 normalized so that equal numbers
            // always agree and distinct numbers never collide.
            ValueView::Number(n) => Some(HashKey {
                tag: HashTag::Number,
                value: if n == 0.0 { 0u64 } else { n.to_bits() },
            }),
            ValueView::Bool(b) => Some(HashKey {
                tag: HashTag::Boolean,
                value: b as u64,
            }),
            ValueView::String(s) => {
                let mut hasher = FnvHasher::default();
                hasher.write(s.as_bytes());
                Some(HashKey {
                    tag: HashTag::String,
                    value: hasher.finish(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_numbers_share_a_key() {
        let a = Value::number(4.0).hash_key().unwrap();
        let b = Value::number(4.0).hash_key().unwrap();
        assert_eq!(a, b);
        let c = Value::number(5.0).hash_key().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_distinct_string_instances_share_a_key() {
        let a = Value::string("Hello World").hash_key().unwrap();
        let b = Value::string("Hello World").hash_key().unwrap();
        assert_eq!(a, b);
        let c = Value::string("Goodbye World").hash_key().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_boolean_keys() {
        let t = Value::TRUE.hash_key().unwrap();
        let f = Value::FALSE.hash_key().unwrap();
        assert_ne!(t, f);
        assert_eq!(t.value, 1);
        assert_eq!(f.value, 0);
    }

    #[test]
    fn test_tags_keep_types_apart() {
        // true and 1 must not collide even though both encode as 1.
        let t = Value::TRUE.hash_key().unwrap();
        let one = Value::number(1.0).hash_key().unwrap();
        assert_ne!(t, one);
    }

    #[test]
    fn test_unhashable_values() {
        assert!(Value::array(vec![]).hash_key().is_none());
        assert!(Value::hash(Default::default()).hash_key().is_none());
        assert!(Value::null().hash_key().is_none());
    }
}
