//! Structured cache keys.
//!
//! A [`CacheKey`] is a namespace `prefix`, a `version` bumped to drop a
//! whole generation of entries, and an ordered list of [`KeyPart`]s.
//!
//! Keys compare structurally, never by their rendered string.
//!
//! `Display` renders `prefix:v{version}:k1=v1&k2=v2`, leaving out an empty
//! prefix and a zero version:
//!
//! ```
//! use wardcache_core::{CacheKey, KeyPart};
//!
//! let key = CacheKey::new("residents", 1, vec![KeyPart::new("id", Some("42"))]);
//! assert_eq!(format!("{}", key), "residents:v1:id=42");
//!
//! let key = CacheKey::new("", 0, vec![KeyPart::new("all", None::<&str>)]);
//! assert_eq!(format!("{}", key), "all");
//! ```
//!
//! ## Batch keys
//!
//! [`CacheKey::for_ids`] builds a key from a set of entity ids. The ids are
//! sorted and deduplicated first, so the same set always produces the same
//! key regardless of input order:
//!
//! ```
//! use wardcache_core::CacheKey;
//!
//! let a = CacheKey::for_ids("assignment-status", ["r-2", "r-1", "r-2"]);
//! let b = CacheKey::for_ids("assignment-status", ["r-1", "r-2"]);
//! assert_eq!(a, b);
//! assert_eq!(format!("{}", a), "assignment-status:id=r-1&id=r-2");
//! ```

use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize)]
struct CacheKeyInner {
    prefix: SmolStr,
    version: u32,
    parts: Vec<KeyPart>,
}

/// A cache key identifying a cached entry.
///
/// `CacheKey` wraps its data in [`Arc`], so `clone()` only increments a
/// reference count.
///
/// # Example
///
/// ```
/// use wardcache_core::{CacheKey, KeyPart};
///
/// let key = CacheKey::new(
///     "care-plans",
///     2,
///     vec![
///         KeyPart::new("resident", Some("r-17")),
///         KeyPart::new("active", None::<&str>),
///     ],
/// );
///
/// assert_eq!(key.prefix(), "care-plans");
/// assert_eq!(key.version(), 2);
/// assert_eq!(format!("{}", key), "care-plans:v2:resident=r-17&active");
/// ```
#[derive(Clone, Debug, serde::Serialize)]
#[serde(into = "CacheKeyInner")]
pub struct CacheKey {
    inner: Arc<CacheKeyInner>,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl From<CacheKey> for CacheKeyInner {
    fn from(key: CacheKey) -> Self {
        Arc::try_unwrap(key.inner).unwrap_or_else(|arc| (*arc).clone())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.inner.prefix.is_empty() {
            write!(f, "{}:", self.inner.prefix)?;
        }
        if self.inner.version > 0 {
            write!(f, "v{}:", self.inner.version)?;
        }
        for (i, part) in self.inner.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "&")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl CacheKey {
    /// Creates a new cache key with the given components.
    pub fn new(prefix: impl Into<SmolStr>, version: u32, parts: Vec<KeyPart>) -> Self {
        CacheKey {
            inner: Arc::new(CacheKeyInner {
                prefix: prefix.into(),
                version,
                parts,
            }),
        }
    }

    /// Creates a key for a single entity: `{prefix}:id={id}`.
    pub fn entity(prefix: impl Into<SmolStr>, id: impl fmt::Display) -> Self {
        Self::new(prefix, 0, vec![KeyPart::new("id", Some(id.to_string()))])
    }

    /// Creates a key for a set of entity ids.
    ///
    /// Ids are rendered with `Display`, sorted and deduplicated, and each id
    /// becomes its own `id` part. The key is therefore a function of the id
    /// *set*: order and repetition in the input do not matter.
    pub fn for_ids<I, T>(prefix: impl Into<SmolStr>, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display,
    {
        let unique: BTreeSet<String> = ids.into_iter().map(|id| id.to_string()).collect();
        let parts = unique
            .into_iter()
            .map(|id| KeyPart::new("id", Some(id)))
            .collect();
        Self::new(prefix, 0, parts)
    }

    /// Returns a copy of this key with an extra part appended.
    pub fn with_part(&self, part: KeyPart) -> Self {
        let mut inner = (*self.inner).clone();
        inner.parts.push(part);
        CacheKey {
            inner: Arc::new(inner),
        }
    }

    /// Returns an iterator over the key parts.
    pub fn parts(&self) -> impl Iterator<Item = &KeyPart> {
        self.inner.parts.iter()
    }

    /// Returns the cache key version number.
    pub fn version(&self) -> u32 {
        self.inner.version
    }

    /// Returns the cache key prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }
}

/// A single component of a cache key.
///
/// The value is optional; key-only parts act as flags.
///
/// ```
/// use wardcache_core::KeyPart;
///
/// let id = KeyPart::new("id", Some("r-1"));
/// assert_eq!(id.key(), "id");
/// assert_eq!(id.value(), Some("r-1"));
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct KeyPart {
    key: SmolStr,
    value: Option<SmolStr>,
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(ref value) = self.value {
            write!(f, "={}", value)?;
        }
        Ok(())
    }
}

impl KeyPart {
    /// Creates a new key part.
    pub fn new<K: AsRef<str>, V: AsRef<str>>(key: K, value: Option<V>) -> Self {
        KeyPart {
            key: SmolStr::new(key),
            value: value.map(SmolStr::new),
        }
    }

    /// Returns the key name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the optional value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_structured_keys_do_not_collide() {
        // "a-b" + "c" and "a" + "b-c" collide when joined with '-'.
        let left = CacheKey::for_ids("batch", ["a-b", "c"]);
        let right = CacheKey::for_ids("batch", ["a", "b-c"]);
        assert_ne!(left, right);
    }

    #[test]
    fn test_for_ids_is_order_and_duplicate_insensitive() {
        let a = CacheKey::for_ids("batch", [3, 1, 2, 1]);
        let b = CacheKey::for_ids("batch", [1, 2, 3]);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_prefix_and_version_distinguish_keys() {
        let a = CacheKey::entity("residents", 1);
        let b = CacheKey::entity("staff", 1);
        let c = CacheKey::new("residents", 1, vec![KeyPart::new("id", Some("1"))]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "residents:id=1");
    }

    #[test]
    fn test_with_part_leaves_original_untouched() {
        let base = CacheKey::entity("residents", "r-1");
        let extended = base.with_part(KeyPart::new("view", Some("summary")));
        assert_eq!(base.parts().count(), 1);
        assert_eq!(extended.to_string(), "residents:id=r-1&view=summary");
    }
}
