//! Cache Policies
//!
//! TTL, stale-window and codec settings per entity class, plus the registry
//! that resolves a key to its policy.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::entry::CacheKey;

/// Upper bound accepted from configuration for `ttl_seconds` and
/// `stale_window_seconds` (one year)
pub const MAX_POLICY_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Caching rules for one entity class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Hard expiry, seconds after creation
    pub ttl_seconds: u64,
    /// Freshness period, seconds after creation; past it the entry is served
    /// stale and may be refreshed in the background
    pub stale_window_seconds: u64,
    /// Compress payloads before storing
    pub compress: bool,
    /// Refresh stale entries in the background
    pub background_refresh: bool,
    /// Reject single payloads above this size
    pub max_entry_size_bytes: Option<u64>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            stale_window_seconds: 240,
            compress: false,
            background_refresh: true,
            max_entry_size_bytes: None,
        }
    }
}

impl CachePolicy {
    /// Policy with the given TTL and stale window, other fields defaulted
    pub fn new(ttl_seconds: u64, stale_window_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            stale_window_seconds,
            ..Default::default()
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_background_refresh(mut self, enabled: bool) -> Self {
        self.background_refresh = enabled;
        self
    }

    pub fn with_max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size_bytes = Some(bytes);
        self
    }

    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Stale window clamped to the TTL
    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_window_seconds.min(self.ttl_seconds))
    }
}

/// Entity class → policy lookup table.
///
/// Registration replaces wholesale and never touches resident entries; only
/// writes made after the change see the new policy.
#[derive(Debug)]
pub struct PolicyRegistry {
    policies: RwLock<HashMap<String, CachePolicy>>,
    default_policy: CachePolicy,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl PolicyRegistry {
    /// Empty registry falling back to `default_policy`
    pub fn new(default_policy: CachePolicy) -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            default_policy,
        }
    }

    /// Registry preloaded with policies for the well-known entity classes
    pub fn with_defaults(default_policy: CachePolicy) -> Self {
        let registry = Self::new(default_policy);
        for (class, policy) in default_policies() {
            registry.register(class, policy);
        }
        registry
    }

    /// Store or overwrite the policy for `class`
    pub fn register(&self, class: impl Into<String>, policy: CachePolicy) {
        let class = class.into();
        tracing::debug!(class = %class, ttl = policy.ttl_seconds, stale = policy.stale_window_seconds, "Registered cache policy");
        self.policies.write().insert(class, policy);
    }

    /// Remove a registration, returning the old policy
    pub fn unregister(&self, class: &str) -> Option<CachePolicy> {
        self.policies.write().remove(class)
    }

    /// Policy for an exact class, or the default
    pub fn resolve(&self, class: &str) -> CachePolicy {
        self.policies
            .read()
            .get(class)
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Policy for a key, trying its most specific class first
    pub fn resolve_for_key(&self, key: &CacheKey) -> CachePolicy {
        let policies = self.policies.read();
        key.class_candidates()
            .into_iter()
            .find_map(|class| policies.get(class).cloned())
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Default policy
    pub fn default_policy(&self) -> &CachePolicy {
        &self.default_policy
    }

    /// Registered class names, sorted
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.policies.read().keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

/// Built-in policies for the well-known entity classes
pub fn default_policies() -> Vec<(&'static str, CachePolicy)> {
    vec![
        ("orders:list", CachePolicy::new(60, 30)),
        ("orders:detail", CachePolicy::new(120, 60)),
        (
            "products:catalog",
            CachePolicy::new(3600, 600).with_compression(true),
        ),
        ("products", CachePolicy::new(900, 300)),
        ("profiles", CachePolicy::new(900, 600)),
        (
            "analytics:dashboard",
            CachePolicy::new(300, 60).with_compression(true),
        ),
        ("system:health", CachePolicy::new(30, 10)),
    ]
}

// =============================================================================
// Tests
// =============================================================================
