use std::fmt;
use std::sync::Arc;

/// One element of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Str(Arc::from(value.as_str()))
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Identifies a logical query result.
///
/// Keys compare and hash by value, so `cache_key!["booking", 7]` built in two
/// places refers to the same cache entry.
///
/// ```
/// use carrier::cache_key;
///
/// let a = cache_key!["booking", 7];
/// let b = cache_key!["booking", 7_i64];
/// assert_eq!(a, b);
/// assert!(a.starts_with(&cache_key!["booking"]));
/// assert_eq!(a.to_string(), r#"["booking",7]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CacheKey(Vec<KeyPart>);

impl CacheKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    #[must_use]
    pub fn push(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Whether `prefix` matches the leading parts of this key. The empty key is a
    /// prefix of every key.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for CacheKey {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(vec![value.into()])
    }
}

/// Builds a [`CacheKey`] from heterogeneous parts.
///
/// ```
/// use carrier::cache_key;
///
/// let id = 42;
/// let key = cache_key!["booking", id, "bids"];
/// assert_eq!(key.parts().len(), 3);
/// ```
#[macro_export]
macro_rules! cache_key {
    ($($part:expr),* $(,)?) => {
        $crate::query::CacheKey::new(vec![$($crate::query::KeyPart::from($part)),*])
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_structural_equality() {
        let id: u32 = 9;
        let a = cache_key!["booking", id];
        let b = cache_key![String::from("booking"), 9];
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_different_part_types_differ() {
        assert_ne!(cache_key!["1"], cache_key![1]);
        assert_ne!(cache_key![true], cache_key!["true"]);
    }

    #[test]
    fn test_option_maps_to_null() {
        let missing: Option<i64> = None;
        assert_eq!(cache_key!["wallet", missing], cache_key!["wallet", KeyPart::Null]);
        assert_eq!(cache_key!["wallet", Some(3)], cache_key!["wallet", 3]);
    }

    #[test]
    fn test_prefix_matching() {
        let key = cache_key!["booking", 1, "bids"];
        assert!(key.starts_with(&cache_key!["booking"]));
        assert!(key.starts_with(&cache_key!["booking", 1]));
        assert!(key.starts_with(&CacheKey::default()));
        assert!(!key.starts_with(&cache_key!["booking", 2]));
        assert!(!cache_key!["booking"].starts_with(&key));
    }

    #[test]
    fn test_display() {
        assert_eq!(cache_key!["notifications"].to_string(), r#"["notifications"]"#);
        assert_eq!(
            cache_key!["booking", 3, false, None::<i64>].to_string(),
            r#"["booking",3,false,null]"#
        );
    }

    #[test]
    fn test_from_iter_and_push() {
        let key: CacheKey = ["bids", "open"].into_iter().collect();
        assert_eq!(key, cache_key!["bids", "open"]);
        assert_eq!(CacheKey::from("bids").push("open"), key);
    }
}
