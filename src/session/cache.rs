//! TTL cache for session contexts

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

use super::context::SessionContext;

/// Default lifetime of a session entry
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Default bound on live conversations
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;

#[derive(Debug, Clone)]
struct Stored {
    value: SessionContext,
    /// `None` never expires
    ttl: Option<Duration>,
}

/// Per-entry lifetime taken from the stored TTL, restarted on every write
struct SessionExpiry;

impl Expiry<String, Stored> for SessionExpiry {
    fn expire_after_create(&self, _key: &String, value: &Stored, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

fn lifetime(ttl: Duration) -> Option<Duration> {
    if ttl.is_zero() { None } else { Some(ttl) }
}

/// Concurrent map of conversation id to [`SessionContext`] with expiry
#[derive(Clone)]
pub struct SessionCache {
    entries: Cache<String, Stored>,
    default_ttl: Duration,
}

impl SessionCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_capacity(default_ttl, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_capacity(default_ttl: Duration, max_sessions: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_sessions.max(1))
            .expire_after(SessionExpiry)
            .build();
        Self { entries, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live entry; expired entries are invisible
    pub fn get(&self, key: &str) -> Option<SessionContext> {
        self.entries.get(key).map(|stored| stored.value)
    }

    /// Store an entry; a zero `ttl` means it never expires
    pub fn set(&self, key: impl Into<String>, value: SessionContext, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Stored {
                value,
                ttl: lifetime(ttl),
            },
        );
    }

    /// Atomically modify an entry under the default TTL, returning the result.
    ///
    /// An absent or expired entry starts from an empty context.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut SessionContext)) -> SessionContext {
        let ttl = lifetime(self.default_ttl);
        let entry = self.entries.entry(key.to_string()).and_upsert_with(|existing| {
            let mut value = existing.map(|e| e.into_value().value).unwrap_or_default();
            f(&mut value);
            Stored { value, ttl }
        });
        entry.into_value().value
    }

    /// Remove an entry, returning whether it existed
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Run pending evictions now instead of on the next cache access
    pub fn purge_expired(&self) {
        self.entries.run_pending_tasks();
    }

    /// Approximate number of live entries
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("entries", &self.entries.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
