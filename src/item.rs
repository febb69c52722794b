//! Cache Item Module
//!
//! Defines the in-memory representation of one cache entry: key, value,
//! hit flag, expiry, and the metadata attached by the store on fetch.
//!
//! Items are produced by a pool (`get_item` / `get_items`) and handed back
//! to it via `save` / `save_deferred`; callers never construct one directly.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::store::StoredValue;

// == Reserved Characters ==
/// Characters that may never appear in a key or tag.
///
/// `/` and `@` keep user keys from colliding with the reserved identifiers
/// a pool writes for itself (version records and version-pin markers);
/// `:` terminates namespaces and hashed key segments.
pub const RESERVED_CHARS: &str = "{}()/\\@:";

// == Key Validation ==
/// Validates a cache key: non-empty and free of reserved characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey(
            "cache key length must be greater than zero".to_string(),
        ));
    }
    if key.contains(|c: char| RESERVED_CHARS.contains(c)) {
        return Err(CacheError::InvalidKey(format!(
            "cache key {:?} contains reserved characters {}",
            key, RESERVED_CHARS
        )));
    }
    Ok(())
}

/// Validates a tag with the same syntax rules as keys.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(CacheError::InvalidTag(
            "cache tag length must be greater than zero".to_string(),
        ));
    }
    if tag.contains(|c: char| RESERVED_CHARS.contains(c)) {
        return Err(CacheError::InvalidTag(format!(
            "cache tag {:?} contains reserved characters {}",
            tag, RESERVED_CHARS
        )));
    }
    Ok(())
}

// == Metadata ==
/// Read-only record attached to an item when its value was fetched
/// from storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Absolute expiration instant, fractional seconds since the epoch
    pub expiry: Option<f64>,
    /// How long the value took to compute, in milliseconds
    pub ctime_ms: Option<u64>,
    /// Tags attached when the value was saved
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl Metadata {
    /// Returns true when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.expiry.is_none() && self.ctime_ms.is_none() && self.tags.is_empty()
    }
}

// == Cache Item ==
/// One cache entry as seen by callers.
///
/// `is_hit` is true iff the physical store returned an unexpired value for
/// the derived identifier. An item is immutable once committed; mutating a
/// cached entry again requires a fresh item from `get_item`.
#[derive(Debug, Clone)]
pub struct Item {
    key: String,
    value: Value,
    is_hit: bool,
    /// Absolute expiration, fractional seconds since epoch; `None` means
    /// "apply the pool default lifetime at save time"
    expiry: Option<f64>,
    default_lifetime: u64,
    metadata: Metadata,
    new_tags: BTreeSet<String>,
    new_ctime_ms: Option<u64>,
}

impl Item {
    // == Constructor ==
    /// Builds an item from what the store returned for its identifier.
    ///
    /// `None` produces a miss: `Value::Null`, `is_hit` false, empty
    /// metadata. `Some` unwraps the stored envelope into value + metadata.
    pub(crate) fn from_stored(
        key: &str,
        stored: Option<StoredValue>,
        default_lifetime: u64,
    ) -> Self {
        let (value, is_hit, metadata) = match stored {
            Some(stored) => (stored.value, true, stored.meta.unwrap_or_default()),
            None => (Value::Null, false, Metadata::default()),
        };
        Self {
            key: key.to_string(),
            value,
            is_hit,
            expiry: None,
            default_lifetime,
            metadata,
            new_tags: BTreeSet::new(),
            new_ctime_ms: None,
        }
    }

    // == Accessors ==
    /// Returns the logical (caller-visible) key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the stored value (`Value::Null` on a miss).
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the item, returning its value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Deserializes the value into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    /// True iff the value came from storage and had not expired.
    pub fn is_hit(&self) -> bool {
        self.is_hit
    }

    /// Metadata the store attached on fetch.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Absolute expiration, if one was explicitly set on this item.
    pub fn expiry(&self) -> Option<f64> {
        self.expiry
    }

    pub(crate) fn default_lifetime(&self) -> u64 {
        self.default_lifetime
    }

    // == Mutators ==
    /// Replaces the value with any serializable payload.
    pub fn set<T: Serialize>(&mut self, value: T) -> Result<&mut Self> {
        self.value = serde_json::to_value(value)?;
        Ok(self)
    }

    /// Replaces the value with an already-built JSON value.
    pub fn set_value(&mut self, value: Value) -> &mut Self {
        self.value = value;
        self
    }

    /// Sets an absolute expiration instant.
    ///
    /// `None` resolves the pool default lifetime immediately: the item
    /// expires `default_lifetime` seconds from now, or never when the
    /// default is 0.
    pub fn expires_at(&mut self, expiration: Option<DateTime<Utc>>) -> Result<&mut Self> {
        match expiration {
            None => self.apply_default_lifetime(),
            Some(when) => {
                let micros = when.timestamp_micros();
                if micros < 0 {
                    return Err(CacheError::InvalidExpiration(format!(
                        "expiration {} predates the Unix epoch",
                        when
                    )));
                }
                self.expiry = Some(micros as f64 / 1_000_000.0);
            }
        }
        Ok(self)
    }

    /// Sets a relative expiration.
    ///
    /// `None` resolves the pool default lifetime, like `expires_at(None)`.
    pub fn expires_after(&mut self, ttl: Option<Duration>) -> Result<&mut Self> {
        match ttl {
            None => self.apply_default_lifetime(),
            Some(ttl) => {
                if ttl < Duration::zero() {
                    return Err(CacheError::InvalidExpiration(format!(
                        "lifetime must not be negative, got {}s",
                        ttl.num_seconds()
                    )));
                }
                self.expiry = Some(now_secs_f64() + ttl.num_milliseconds() as f64 / 1000.0);
            }
        }
        Ok(self)
    }

    /// Attaches a tag, saved alongside the value on the next commit.
    pub fn tag(&mut self, tag: &str) -> Result<&mut Self> {
        validate_tag(tag)?;
        self.new_tags.insert(tag.to_string());
        Ok(self)
    }

    fn apply_default_lifetime(&mut self) {
        self.expiry = if self.default_lifetime > 0 {
            Some(now_secs_f64() + self.default_lifetime as f64)
        } else {
            None
        };
    }

    /// Records how long the value took to compute; set by the pool when a
    /// recompute callback produced this item's value.
    pub(crate) fn record_ctime(&mut self, ctime_ms: u64) {
        self.new_ctime_ms = Some(ctime_ms);
    }

    // == Envelope Packing ==
    /// Converts the item into the envelope handed to the store.
    ///
    /// Metadata is packed only when the item carries something worth
    /// reading back: tags, or a compute duration (which also records the
    /// effective expiry so early recomputation can be weighed on the next
    /// fetch). Plain saves stay lean.
    pub(crate) fn into_stored(self, now: f64) -> StoredValue {
        let meta = if self.new_tags.is_empty() && self.new_ctime_ms.is_none() {
            None
        } else {
            let expiry = self.expiry.or_else(|| {
                if self.default_lifetime > 0 {
                    Some(now + self.default_lifetime as f64)
                } else {
                    None
                }
            });
            Some(Metadata {
                expiry,
                ctime_ms: self.new_ctime_ms,
                tags: self.new_tags,
            })
        };
        StoredValue {
            value: self.value,
            meta,
        }
    }
}

// == Utility Functions ==
/// Returns the current Unix time as fractional seconds.
pub(crate) fn now_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs_f64()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_key_rejects_reserved_characters() {
        for bad in ["", "a{b", "a}b", "a(b", "a)b", "a/b", "a\\b", "a@b", "a:b"] {
            assert!(
                matches!(validate_key(bad), Err(CacheError::InvalidKey(_))),
                "key {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_validate_key_accepts_plain_keys() {
        for good in ["valid-key_123", "a", "UPPER.lower", "dotted.key"] {
            assert!(validate_key(good).is_ok(), "key {:?} should pass", good);
        }
    }

    #[test]
    fn test_validate_tag_mirrors_key_rules() {
        assert!(validate_tag("billing").is_ok());
        assert!(matches!(validate_tag(""), Err(CacheError::InvalidTag(_))));
        assert!(matches!(validate_tag("a:b"), Err(CacheError::InvalidTag(_))));
    }

    #[test]
    fn test_miss_item_shape() {
        let item = Item::from_stored("k", None, 60);
        assert_eq!(item.key(), "k");
        assert!(!item.is_hit());
        assert_eq!(item.value(), &Value::Null);
        assert!(item.metadata().is_empty());
        assert!(item.expiry().is_none());
    }

    #[test]
    fn test_hit_item_unwraps_envelope() {
        let stored = StoredValue {
            value: serde_json::json!({"a": 1}),
            meta: Some(Metadata {
                expiry: Some(12345.0),
                ctime_ms: Some(7),
                tags: BTreeSet::from(["t1".to_string()]),
            }),
        };
        let item = Item::from_stored("k", Some(stored), 60);
        assert!(item.is_hit());
        assert_eq!(item.value(), &serde_json::json!({"a": 1}));
        assert_eq!(item.metadata().expiry, Some(12345.0));
        assert_eq!(item.metadata().ctime_ms, Some(7));
        assert!(item.metadata().tags.contains("t1"));
        // fetch never sets a caller-visible expiry
        assert!(item.expiry().is_none());
    }

    #[test]
    fn test_set_serializes_and_decodes() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Payload {
            n: u32,
            s: String,
        }

        let mut item = Item::from_stored("k", None, 0);
        let payload = Payload {
            n: 3,
            s: "hi".to_string(),
        };
        item.set(&payload).unwrap();
        assert_eq!(item.decode::<Payload>().unwrap(), payload);
    }

    #[test]
    fn test_expires_after_positive() {
        let mut item = Item::from_stored("k", None, 0);
        item.expires_after(Some(Duration::seconds(10))).unwrap();
        let expiry = item.expiry().unwrap();
        let now = now_secs_f64();
        assert!(expiry > now + 9.0 && expiry < now + 11.0);
    }

    #[test]
    fn test_expires_after_negative_is_invalid() {
        let mut item = Item::from_stored("k", None, 0);
        let result = item.expires_after(Some(Duration::seconds(-5)));
        assert!(matches!(result, Err(CacheError::InvalidExpiration(_))));
    }

    #[test]
    fn test_expires_at_pre_epoch_is_invalid() {
        let mut item = Item::from_stored("k", None, 0);
        let before_epoch = Utc.timestamp_opt(-10, 0).unwrap();
        let result = item.expires_at(Some(before_epoch));
        assert!(matches!(result, Err(CacheError::InvalidExpiration(_))));
    }

    #[test]
    fn test_none_expiration_resolves_default_lifetime() {
        let mut item = Item::from_stored("k", None, 30);
        item.expires_at(None).unwrap();
        let expiry = item.expiry().unwrap();
        let now = now_secs_f64();
        assert!(expiry > now + 29.0 && expiry < now + 31.0);

        // default lifetime 0 means "never expires"
        let mut eternal = Item::from_stored("k", None, 0);
        eternal.expires_after(None).unwrap();
        assert!(eternal.expiry().is_none());
    }

    #[test]
    fn test_into_stored_packs_metadata_only_when_needed() {
        let now = now_secs_f64();

        let plain = Item::from_stored("k", None, 60);
        assert!(plain.into_stored(now).meta.is_none());

        let mut tagged = Item::from_stored("k", None, 60);
        tagged.tag("t1").unwrap().tag("t2").unwrap();
        let meta = tagged.into_stored(now).meta.unwrap();
        assert_eq!(meta.tags.len(), 2);
        // no explicit expiry: the effective default-lifetime expiry is recorded
        let expiry = meta.expiry.unwrap();
        assert!(expiry > now + 59.0 && expiry < now + 61.0);

        let mut timed = Item::from_stored("k", None, 0);
        timed.record_ctime(42);
        let meta = timed.into_stored(now).meta.unwrap();
        assert_eq!(meta.ctime_ms, Some(42));
        assert!(meta.expiry.is_none());
    }

    #[test]
    fn test_tag_rejects_reserved_characters() {
        let mut item = Item::from_stored("k", None, 0);
        assert!(matches!(item.tag("a@b"), Err(CacheError::InvalidTag(_))));
        assert!(item.tag("fine_tag-1").is_ok());
    }
}
