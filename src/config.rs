//! Engine configuration
//!
//! Every field has a default, so an empty YAML document is a valid config.
//!
//! ```yaml
//! instance_name: api-eu-1
//! max_cache_size_bytes: 134217728
//! persistence_dir: /var/lib/tiercache
//! default_policy:
//!   ttl_seconds: 300
//!   stale_window_seconds: 240
//! policies:
//!   orders:list:
//!     ttl_seconds: 30
//!     stale_window_seconds: 15
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::compression::CompressionConfig;
use crate::cache::gc::DEFAULT_GC_INTERVAL_SECS;
use crate::cache::policy::{CachePolicy, MAX_POLICY_SECONDS};
use crate::cache::DEFAULT_MAX_CACHE_SIZE_BYTES;
use crate::error::{Error, Result};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Names the snapshot file and tags log lines
    pub instance_name: String,
    /// Local store byte ceiling
    pub max_cache_size_bytes: u64,
    pub gc_interval_secs: u64,
    /// Bound on every distributed tier call
    pub distributed_timeout_ms: u64,
    /// Snapshot directory; persistence is off when unset
    pub persistence_dir: Option<PathBuf>,
    /// Quiet period before a requested snapshot is written
    pub persist_debounce_ms: u64,
    /// Restored entries older than this are dropped
    pub max_restore_age_secs: u64,
    /// Policy for classes without an explicit entry
    pub default_policy: CachePolicy,
    /// Entity class to policy, layered over the built-in policies
    pub policies: BTreeMap<String, CachePolicy>,
    pub compression: CompressionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance_name: "default".to_string(),
            max_cache_size_bytes: DEFAULT_MAX_CACHE_SIZE_BYTES,
            gc_interval_secs: DEFAULT_GC_INTERVAL_SECS,
            distributed_timeout_ms: 250,
            persistence_dir: None,
            persist_debounce_ms: 500,
            max_restore_age_secs: 24 * 60 * 60,
            default_policy: CachePolicy::default(),
            policies: BTreeMap::new(),
            compression: CompressionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.instance_name.is_empty()
            || !self
                .instance_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Config(format!(
                "instance_name must be non-empty [A-Za-z0-9_-], got {:?}",
                self.instance_name
            )));
        }
        if self.max_cache_size_bytes == 0 {
            return Err(Error::Config("max_cache_size_bytes must be > 0".into()));
        }
        if self.gc_interval_secs == 0 {
            return Err(Error::Config("gc_interval_secs must be > 0".into()));
        }
        if self.distributed_timeout_ms == 0 {
            return Err(Error::Config("distributed_timeout_ms must be > 0".into()));
        }

        validate_policy("default_policy", &self.default_policy)?;
        for (class, policy) in &self.policies {
            validate_policy(class, policy)?;
        }
        Ok(())
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn distributed_timeout(&self) -> Duration {
        Duration::from_millis(self.distributed_timeout_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn max_restore_age(&self) -> Duration {
        Duration::from_secs(self.max_restore_age_secs)
    }
}

fn validate_policy(class: &str, policy: &CachePolicy) -> Result<()> {
    if policy.ttl_seconds == 0 {
        return Err(Error::Config(format!("{}: ttl_seconds must be > 0", class)));
    }
    if policy.ttl_seconds > MAX_POLICY_SECONDS || policy.stale_window_seconds > MAX_POLICY_SECONDS {
        return Err(Error::Config(format!(
            "{}: ttl_seconds and stale_window_seconds must be <= {}",
            class, MAX_POLICY_SECONDS
        )));
    }
    if policy.max_entry_size_bytes == Some(0) {
        return Err(Error::Config(format!(
            "{}: max_entry_size_bytes must be > 0 when set",
            class
        )));
    }
    Ok(())
}
