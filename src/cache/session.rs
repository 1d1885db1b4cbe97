//! Session cache store.
//!
//! Browser-tier cache over a bounded per-session key/value area. Entries are
//! JSON envelopes carrying their stored-at stamp and TTL; expiry is detected
//! lazily on read, and expired entries stay in place until a cleanup pass.
//! Caching is best-effort throughout: a write the area rejects for quota
//! triggers exactly one cleanup-and-retry, and a second rejection degrades
//! silently — the query result still flows to the caller.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::telemetry::{
    METRIC_SESSION_DROP, METRIC_SESSION_EVICT, METRIC_SESSION_HIT, METRIC_SESSION_MISS,
};

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::session";
const KEY_PREFIX: &str = "vetrina:";

/// Default entry TTL, overridable per `set`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Fixed retention window: cleanup removes everything older than this.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// The underlying area rejected a write due to capacity.
#[derive(Debug, Error)]
#[error("session area quota exceeded")]
pub struct QuotaExceeded;

/// Per-session key/value capability.
///
/// Models browser storage: writes can fail for quota, reads never fail.
/// A deployment without usable storage plugs in [`NullSessionArea`].
pub trait SessionArea: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str) -> Result<(), QuotaExceeded>;
    fn remove(&self, key: &str);
    fn keys(&self) -> Vec<String>;
}

/// No-op area for contexts where session storage is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSessionArea;

impl SessionArea for NullSessionArea {
    fn read(&self, _key: &str) -> Option<String> {
        None
    }

    fn write(&self, _key: &str, _value: &str) -> Result<(), QuotaExceeded> {
        Ok(())
    }

    fn remove(&self, _key: &str) {}

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory area with a byte budget, mirroring storage quota behavior.
pub struct MemorySessionArea {
    max_bytes: usize,
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionArea {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl SessionArea for MemorySessionArea {
    fn read(&self, key: &str) -> Option<String> {
        rw_read(&self.entries, SOURCE, "area_read").get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), QuotaExceeded> {
        let mut entries = rw_write(&self.entries, SOURCE, "area_write");
        let replaced = entries.get(key).map_or(0, |v| key.len() + v.len());
        let projected = Self::used_bytes(&entries) - replaced + key.len() + value.len();
        if projected > self.max_bytes {
            return Err(QuotaExceeded);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        rw_write(&self.entries, SOURCE, "area_remove").remove(key);
    }

    fn keys(&self) -> Vec<String> {
        rw_read(&self.entries, SOURCE, "area_keys")
            .keys()
            .cloned()
            .collect()
    }
}

/// Result of a session-store read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Value),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Envelope persisted into the area for every entry.
#[derive(Debug, Serialize, Deserialize)]
struct SessionEntry {
    stored_at: i64,
    ttl_secs: u64,
    payload: Value,
}

/// TTL cache store over a [`SessionArea`].
pub struct SessionStore {
    area: Arc<dyn SessionArea>,
    default_ttl: Duration,
}

impl SessionStore {
    pub fn new(area: Arc<dyn SessionArea>) -> Self {
        Self {
            area,
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_default_ttl(area: Arc<dyn SessionArea>, default_ttl: Duration) -> Self {
        Self { area, default_ttl }
    }

    /// Read an entry; entries past their TTL and malformed entries are
    /// misses. Malformed entries are removed on sight, expired entries are
    /// left for the next cleanup pass.
    pub fn get(&self, key: &str) -> Lookup {
        let area_key = area_key(key);
        let Some(raw) = self.area.read(&area_key) else {
            counter!(METRIC_SESSION_MISS).increment(1);
            return Lookup::Miss;
        };

        let entry: SessionEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(
                    target: "vetrina::cache",
                    cache = "session",
                    outcome = "malformed",
                    error = %err,
                    "removing undecodable session entry"
                );
                self.area.remove(&area_key);
                counter!(METRIC_SESSION_MISS).increment(1);
                return Lookup::Miss;
            }
        };

        let age = now_unix().saturating_sub(entry.stored_at);
        if age > entry.ttl_secs as i64 {
            debug!(
                target: "vetrina::cache",
                cache = "session",
                outcome = "expired",
                age_secs = age,
                "entry past its TTL"
            );
            counter!(METRIC_SESSION_MISS).increment(1);
            return Lookup::Miss;
        }

        counter!(METRIC_SESSION_HIT).increment(1);
        Lookup::Hit(entry.payload)
    }

    /// Write an entry, recovering once from quota pressure.
    ///
    /// Never surfaces a failure: on a second quota rejection the entry is
    /// simply not cached.
    pub fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) {
        let entry = SessionEntry {
            stored_at: now_unix(),
            ttl_secs: ttl.unwrap_or(self.default_ttl).as_secs(),
            payload: value.clone(),
        };
        let Ok(raw) = serde_json::to_string(&entry) else {
            counter!(METRIC_SESSION_DROP).increment(1);
            return;
        };

        let area_key = area_key(key);
        if self.area.write(&area_key, &raw).is_ok() {
            return;
        }

        self.cleanup();

        if self.area.write(&area_key, &raw).is_err() {
            debug!(
                target: "vetrina::cache",
                cache = "session",
                outcome = "dropped",
                "entry still does not fit after cleanup"
            );
            counter!(METRIC_SESSION_DROP).increment(1);
        }
    }

    /// Remove malformed entries and entries older than the retention window.
    pub fn cleanup(&self) {
        let threshold = now_unix() - RETENTION_WINDOW.as_secs() as i64;
        let mut removed = 0_u64;

        for area_key in self.area.keys() {
            if !area_key.starts_with(KEY_PREFIX) {
                continue;
            }
            let stale = match self.area.read(&area_key) {
                Some(raw) => match serde_json::from_str::<SessionEntry>(&raw) {
                    Ok(entry) => entry.stored_at < threshold,
                    Err(_) => true,
                },
                None => continue,
            };
            if stale {
                self.area.remove(&area_key);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(
                target: "vetrina::cache",
                cache = "session",
                outcome = "cleanup",
                removed,
                "retention pass removed entries"
            );
            counter!(METRIC_SESSION_EVICT).increment(removed);
        }
    }
}

fn area_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_with_budget(max_bytes: usize) -> (SessionStore, Arc<MemorySessionArea>) {
        let area = Arc::new(MemorySessionArea::new(max_bytes));
        (SessionStore::new(area.clone()), area)
    }

    fn write_raw_entry(area: &MemorySessionArea, key: &str, stored_at: i64, ttl_secs: u64) {
        let raw = serde_json::to_string(&SessionEntry {
            stored_at,
            ttl_secs,
            payload: json!({"kind": "aged"}),
        })
        .expect("envelope serializes");
        area.write(&area_key(key), &raw).expect("fits in budget");
    }

    #[test]
    fn round_trip_within_ttl() {
        let (store, _) = store_with_budget(4096);
        store.set("k1", &json!({"title": "Hat"}), None);

        match store.get("k1") {
            Lookup::Hit(value) => assert_eq!(value, json!({"title": "Hat"})),
            Lookup::Miss => panic!("expected a hit"),
        }
    }

    #[test]
    fn absent_key_is_a_miss() {
        let (store, _) = store_with_budget(4096);
        assert_eq!(store.get("nope"), Lookup::Miss);
    }

    #[test]
    fn expired_entry_is_a_miss_but_stays_in_place() {
        let (store, area) = store_with_budget(4096);
        write_raw_entry(&area, "old", now_unix() - 600, 300);

        assert_eq!(store.get("old"), Lookup::Miss);
        // Lazy eviction: still present until a cleanup pass.
        assert!(area.read(&area_key("old")).is_some());
    }

    #[test]
    fn malformed_entry_is_removed_and_reported_as_miss() {
        let (store, area) = store_with_budget(4096);
        area.write(&area_key("bad"), "not json").expect("fits");

        assert_eq!(store.get("bad"), Lookup::Miss);
        assert!(area.read(&area_key("bad")).is_none());
    }

    #[test]
    fn quota_pressure_triggers_one_cleanup_and_retry() {
        let (store, area) = store_with_budget(100);
        // An entry past the retention window hogging the budget.
        write_raw_entry(&area, "ancient", now_unix() - 2 * 60 * 60, 300);

        store.set("fresh", &json!({"title": "Hat"}), None);

        assert!(store.get("fresh").is_hit());
        assert!(area.read(&area_key("ancient")).is_none());
    }

    #[test]
    fn repeated_quota_failure_degrades_silently() {
        let (store, area) = store_with_budget(16);

        store.set("big", &json!({"title": "Far too large for the budget"}), None);

        assert_eq!(store.get("big"), Lookup::Miss);
        assert!(area.keys().is_empty());
    }

    #[test]
    fn cleanup_retains_recent_entries() {
        let (store, area) = store_with_budget(4096);
        store.set("recent", &json!(1), None);
        write_raw_entry(&area, "ancient", now_unix() - 2 * 60 * 60, 300);

        store.cleanup();

        assert!(store.get("recent").is_hit());
        assert!(area.read(&area_key("ancient")).is_none());
    }

    #[test]
    fn cleanup_ignores_foreign_keys() {
        let (store, area) = store_with_budget(4096);
        area.write("app:theme", "dark").expect("fits");

        store.cleanup();

        assert_eq!(area.read("app:theme").as_deref(), Some("dark"));
    }

    #[test]
    fn ttl_override_is_honored() {
        let (store, area) = store_with_budget(4096);

        // Two seconds old with a ten-minute TTL: still fresh.
        write_raw_entry(&area, "long", now_unix() - 2, 600);
        assert!(store.get("long").is_hit());

        // Two seconds old with a one-second TTL: already a miss.
        write_raw_entry(&area, "short", now_unix() - 2, 1);
        assert_eq!(store.get("short"), Lookup::Miss);
    }

    #[test]
    fn null_area_never_caches_and_never_errors() {
        let store = SessionStore::new(Arc::new(NullSessionArea));
        store.set("k", &json!(1), None);
        assert_eq!(store.get("k"), Lookup::Miss);
    }

    #[test]
    fn memory_area_recovers_from_poisoned_lock() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let area = MemorySessionArea::new(4096);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = area.entries.write().expect("lock acquired");
            panic!("poison entries lock");
        }));

        area.write("k", "v").expect("write succeeds after recovery");
        assert_eq!(area.read("k").as_deref(), Some("v"));
    }
}
