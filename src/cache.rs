//! Identity cache shielding the Directory Service
//!
//! One size- and time-bounded cache holds two kinds of entries:
//!
//! - identity-token subject -> resolved user plus the internal token minted for it
//! - API-key lookup hash -> resolved access token plus its internal token, or
//!   the rejection message of a failed lookup
//!
//! User entries carry an extra freshness rule: a hit is only served when the
//! presented `auth_time` is not later than the login the entry recorded. A
//! newer login forces a fresh lookup so login bookkeeping is not skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use serde::Serialize;

use crate::directory::{AccessTokenRecord, UserRecord};

/// Fixed per-entry overhead added to the weighed string payload
const ENTRY_OVERHEAD: usize = 128;

/// A resolved user and the internal token minted for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedUser {
    /// User record with the login window already advanced
    pub record: UserRecord,
    /// Internal token
    pub token: String,
}

impl CachedUser {
    /// Whether this entry may answer a request authenticated at `auth_time`.
    #[must_use]
    pub fn is_fresh_for(&self, auth_time: Option<i64>) -> bool {
        match auth_time {
            Some(auth_time) => !self.record.is_login_newer(auth_time),
            None => true,
        }
    }
}

/// Outcome of an API-key resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedAccessToken {
    /// Lookup succeeded
    Resolved {
        /// Access token record
        record: AccessTokenRecord,
        /// Internal token
        token: String,
    },
    /// Lookup failed; repeated lookups get the same answer locally
    Rejected {
        /// Message returned to the caller
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    User(String),
    AccessToken(String),
}

#[derive(Debug, Clone)]
enum CacheEntry {
    User(Arc<CachedUser>),
    AccessToken(Arc<CachedAccessToken>),
}

fn weigh(key: &CacheKey, entry: &CacheEntry) -> u32 {
    let key_len = match key {
        CacheKey::User(k) | CacheKey::AccessToken(k) => k.len(),
    };
    let value_len = match entry {
        CacheEntry::User(user) => {
            let r = &user.record;
            user.token.len()
                + r.id.len()
                + r.external_id.len()
                + r.organization_ids.iter().map(String::len).sum::<usize>()
                + r.email.as_ref().map_or(0, String::len)
        }
        CacheEntry::AccessToken(token) => match token.as_ref() {
            CachedAccessToken::Resolved { record, token } => {
                token.len()
                    + record.id.len()
                    + record.user_id.len()
                    + record.organization_id.as_ref().map_or(0, String::len)
                    + record.status.len()
            }
            CachedAccessToken::Rejected { message } => message.len(),
        },
    };
    u32::try_from(key_len + value_len + ENTRY_OVERHEAD).unwrap_or(u32::MAX)
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    negative_hits: AtomicU64,
}

impl CacheStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Thread-safe identity cache
pub struct IdentityCache {
    entries: Cache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

impl IdentityCache {
    /// Create a cache bounded by `ttl` and `size_mb` megabytes of payload.
    #[must_use]
    pub fn new(ttl: Duration, size_mb: u64) -> Self {
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(size_mb.saturating_mul(1024 * 1024))
                .weigher(weigh)
                .build(),
            stats: CacheStats::default(),
        }
    }

    /// Look up a user entry, honouring the `auth_time` freshness rule.
    ///
    /// Stale entries count as misses and are left for the caller to replace.
    pub fn user(&self, subject: &str, auth_time: Option<i64>) -> Option<Arc<CachedUser>> {
        let Some(CacheEntry::User(cached)) = self.entries.get(&CacheKey::User(subject.to_string()))
        else {
            CacheStats::bump(&self.stats.misses);
            return None;
        };

        if cached.is_fresh_for(auth_time) {
            CacheStats::bump(&self.stats.hits);
            Some(cached)
        } else {
            CacheStats::bump(&self.stats.stale);
            CacheStats::bump(&self.stats.misses);
            None
        }
    }

    /// Store (or replace) a user entry
    pub fn insert_user(&self, subject: &str, cached: CachedUser) {
        self.entries.insert(
            CacheKey::User(subject.to_string()),
            CacheEntry::User(Arc::new(cached)),
        );
    }

    /// Look up an API-key entry by lookup hash
    pub fn access_token(&self, hash: &str) -> Option<Arc<CachedAccessToken>> {
        let Some(CacheEntry::AccessToken(cached)) =
            self.entries.get(&CacheKey::AccessToken(hash.to_string()))
        else {
            CacheStats::bump(&self.stats.misses);
            return None;
        };

        CacheStats::bump(&self.stats.hits);
        if matches!(cached.as_ref(), CachedAccessToken::Rejected { .. }) {
            CacheStats::bump(&self.stats.negative_hits);
        }
        Some(cached)
    }

    /// Store (or replace) an API-key entry
    pub fn insert_access_token(&self, hash: &str, cached: CachedAccessToken) {
        self.entries.insert(
            CacheKey::AccessToken(hash.to_string()),
            CacheEntry::AccessToken(Arc::new(cached)),
        );
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.entries.run_pending_tasks();
        let hits = CacheStats::load(&self.stats.hits);
        let misses = CacheStats::load(&self.stats.misses);
        CacheStatsSnapshot {
            hits,
            misses,
            stale: CacheStats::load(&self.stats.stale),
            negative_hits: CacheStats::load(&self.stats.negative_hits),
            entries: self.entries.entry_count(),
            weighted_size: self.entries.weighted_size(),
            hit_rate: hit_rate(hits, misses),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    /// Entries served from cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// User entries skipped because of a newer login
    pub stale: u64,
    /// Hits that replayed a cached rejection
    pub negative_hits: u64,
    /// Current number of entries
    pub entries: u64,
    /// Current weighed size in bytes
    pub weighted_size: u64,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}
