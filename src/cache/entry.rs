//! Cache Entry Types
//!
//! Keys, namespaces and the resident entry record shared by the local store,
//! the distributed tier and the persistence snapshot.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::compression::CompressionAlgorithm;
use super::policy::{CachePolicy, MAX_POLICY_SECONDS};

/// Fixed category of cached data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Orders,
    Products,
    Profiles,
    Analytics,
    System,
}

impl Namespace {
    /// All namespaces, in declaration order
    pub const ALL: [Namespace; 5] = [
        Namespace::Orders,
        Namespace::Products,
        Namespace::Profiles,
        Namespace::Analytics,
        Namespace::System,
    ];

    /// Key prefix segment
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Orders => "orders",
            Namespace::Products => "products",
            Namespace::Profiles => "profiles",
            Namespace::Analytics => "analytics",
            Namespace::System => "system",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .iter()
            .copied()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| crate::error::Error::Config(format!("unknown namespace: {}", s)))
    }
}

/// Cache key of the form `{namespace}:{id}`
///
/// The id is usually an entity id (`detail:O1`) or a query fingerprint
/// (`list:R1:page=2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    namespace: Namespace,
    full: String,
}

impl CacheKey {
    /// Create a key inside a namespace
    pub fn new(namespace: Namespace, id: impl AsRef<str>) -> Self {
        Self {
            namespace,
            full: format!("{}:{}", namespace.as_str(), id.as_ref()),
        }
    }

    /// Parse a full key string; `None` if the namespace is unknown or the id empty
    pub fn parse(raw: &str) -> Option<Self> {
        let (ns, id) = raw.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        let namespace = ns.parse().ok()?;
        Some(Self {
            namespace,
            full: raw.to_string(),
        })
    }

    /// Get namespace
    #[inline]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Id part (everything after `{namespace}:`)
    #[inline]
    pub fn id(&self) -> &str {
        &self.full[self.namespace.as_str().len() + 1..]
    }

    /// Full key string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Whether the full key starts with `prefix`
    #[inline]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.full.starts_with(prefix)
    }

    /// Policy classes this key may belong to, most specific first.
    ///
    /// `orders:list:R1:page=1` yields `orders:list:R1:page=1`,
    /// `orders:list:R1`, `orders:list`, `orders`.
    pub fn class_candidates(&self) -> Vec<&str> {
        let mut out = vec![self.full.as_str()];
        let mut rest = self.full.as_str();
        while let Some(idx) = rest.rfind(':') {
            rest = &rest[..idx];
            out.push(rest);
        }
        out
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

/// Position of an entry inside its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `now <= stale_at`
    Fresh,
    /// `stale_at < now <= expires_at`
    Stale,
    /// `now > expires_at`
    Expired,
}

/// Resident cache entry.
///
/// Entries are replaced, never mutated in place, except for the access
/// bookkeeping (`hit_count`, `last_accessed_at`, `access_seq`) that drives LRU.
#[derive(Clone)]
pub struct CacheEntry {
    key: CacheKey,
    payload: Bytes,
    compression: CompressionAlgorithm,
    created_at: DateTime<Utc>,
    stale_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    size_bytes: u64,
    pub(crate) hit_count: u64,
    pub(crate) last_accessed_at: DateTime<Utc>,
    pub(crate) access_seq: u64,
}

/// `at + secs`, with `secs` clamped to [`MAX_POLICY_SECONDS`]
fn clamped_offset(at: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    let offset = ChronoDuration::seconds(secs.min(MAX_POLICY_SECONDS) as i64);
    at.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl CacheEntry {
    /// Create an entry whose lifetime is derived from `policy` starting at `now`
    pub fn new(
        key: CacheKey,
        payload: Bytes,
        compression: CompressionAlgorithm,
        policy: &CachePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = clamped_offset(now, policy.ttl_seconds);
        let stale_at = clamped_offset(now, policy.stale_window_seconds);
        Self::restore(key, payload, compression, now, stale_at, expires_at)
    }

    /// Rebuild an entry with existing timestamps (snapshot restore, tier transfer)
    pub fn restore(
        key: CacheKey,
        payload: Bytes,
        compression: CompressionAlgorithm,
        created_at: DateTime<Utc>,
        stale_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let size_bytes = payload.len() as u64;
        Self {
            key,
            payload,
            compression,
            created_at,
            stale_at: stale_at.min(expires_at),
            expires_at,
            size_bytes,
            hit_count: 0,
            last_accessed_at: created_at,
            access_seq: 0,
        }
    }

    #[inline]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Stored payload (serialized, compressed if the policy asked for it)
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn compression(&self) -> CompressionAlgorithm {
        self.compression
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn stale_at(&self) -> DateTime<Utc> {
        self.stale_at
    }

    #[inline]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Size computed at construction
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    #[inline]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    /// Hard-expired at `now`
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Classify the entry at `now`
    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        if now > self.expires_at {
            Freshness::Expired
        } else if now > self.stale_at {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    pub(crate) fn record_access(&mut self, now: DateTime<Utc>, seq: u64) {
        self.hit_count += 1;
        self.last_accessed_at = now;
        self.access_seq = seq;
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key.as_str())
            .field("size", &self.size_bytes)
            .field("compression", &self.compression)
            .field("hit_count", &self.hit_count)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
