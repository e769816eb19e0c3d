//! Invalidation Router - mutation events to key deletions
//!
//! Every entity mutation is expanded by the rules registered for its
//! [`EntityKind`] into concrete keys and key prefixes. Deletes hit the local
//! store before [`InvalidationRouter::invalidate`] returns; the distributed
//! tier is cleaned up by a detached task and may lag.
//!
//! [`InvalidationLedger`] remembers recent invalidations so that reads and
//! refreshes racing with that lag cannot put a pre-mutation value back.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::distributed::DistributedStore;
use super::entry::{CacheKey, Namespace};
use super::local::LocalStore;

/// Create / update / delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Entity kinds that emit mutation events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Order,
    Product,
    Profile,
    Analytics,
    System,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Order => "order",
            EntityKind::Product => "product",
            EntityKind::Profile => "profile",
            EntityKind::Analytics => "analytics",
            EntityKind::System => "system",
        };
        f.write_str(s)
    }
}

/// A successful write in the application, reported after the fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum MutationEvent {
    Order {
        kind: MutationKind,
        order_id: String,
        restaurant_id: String,
        #[serde(default)]
        driver_id: Option<String>,
        #[serde(default)]
        customer_id: Option<String>,
    },
    Product {
        kind: MutationKind,
        product_id: String,
        restaurant_id: String,
    },
    Profile {
        kind: MutationKind,
        user_id: String,
    },
    Analytics {
        kind: MutationKind,
        #[serde(default)]
        restaurant_id: Option<String>,
    },
    System {
        kind: MutationKind,
        component: String,
    },
}

impl MutationEvent {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            MutationEvent::Order { .. } => EntityKind::Order,
            MutationEvent::Product { .. } => EntityKind::Product,
            MutationEvent::Profile { .. } => EntityKind::Profile,
            MutationEvent::Analytics { .. } => EntityKind::Analytics,
            MutationEvent::System { .. } => EntityKind::System,
        }
    }

    pub fn mutation_kind(&self) -> MutationKind {
        match self {
            MutationEvent::Order { kind, .. }
            | MutationEvent::Product { kind, .. }
            | MutationEvent::Profile { kind, .. }
            | MutationEvent::Analytics { kind, .. }
            | MutationEvent::System { kind, .. } => *kind,
        }
    }

    /// Order mutation with only the ids the default cascade needs
    pub fn order(kind: MutationKind, order_id: impl Into<String>, restaurant_id: impl Into<String>) -> Self {
        MutationEvent::Order {
            kind,
            order_id: order_id.into(),
            restaurant_id: restaurant_id.into(),
            driver_id: None,
            customer_id: None,
        }
    }
}

/// What a rule asks to delete
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationTarget {
    Key(CacheKey),
    /// Every key starting with this string
    Prefix(String),
}

impl InvalidationTarget {
    pub fn key(namespace: Namespace, id: impl AsRef<str>) -> Self {
        InvalidationTarget::Key(CacheKey::new(namespace, id))
    }

    pub fn prefix(namespace: Namespace, id_prefix: impl AsRef<str>) -> Self {
        InvalidationTarget::Prefix(format!("{}:{}", namespace.as_str(), id_prefix.as_ref()))
    }

    /// Whether deleting this target removes `key`
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            InvalidationTarget::Key(target) => target == key,
            InvalidationTarget::Prefix(prefix) => key.as_str().starts_with(prefix.as_str()),
        }
    }
}

type DeriveFn = dyn Fn(&MutationEvent) -> Vec<InvalidationTarget> + Send + Sync;

/// Key derivation for one entity kind
#[derive(Clone)]
pub struct InvalidationRule {
    name: String,
    kind: EntityKind,
    derive: Arc<DeriveFn>,
}

impl InvalidationRule {
    pub fn new<F>(name: impl Into<String>, kind: EntityKind, derive: F) -> Self
    where
        F: Fn(&MutationEvent) -> Vec<InvalidationTarget> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            derive: Arc::new(derive),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn derive(&self, event: &MutationEvent) -> Vec<InvalidationTarget> {
        (self.derive)(event)
    }
}

impl fmt::Debug for InvalidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationRule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Outcome of one invalidation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Exact keys targeted
    pub keys: Vec<String>,
    /// Prefixes targeted
    pub prefixes: Vec<String>,
    /// Local entries actually removed
    pub local_removed: usize,
}

/// Rule table plus delete fan-out
pub struct InvalidationRouter {
    rules: RwLock<HashMap<EntityKind, Vec<InvalidationRule>>>,
}

impl Default for InvalidationRouter {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl InvalidationRouter {
    /// Router without any rules
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Router with the cascades for the well-known key layout
    pub fn with_default_rules() -> Self {
        let router = Self::new();
        for rule in default_rules() {
            router.register_rule(rule);
        }
        router
    }

    /// Append a rule; earlier rules for the same kind keep firing
    pub fn register_rule(&self, rule: InvalidationRule) {
        self.rules.write().entry(rule.kind).or_default().push(rule);
    }

    pub fn rule_count(&self, kind: EntityKind) -> usize {
        self.rules.read().get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Evaluate every rule for the event's kind, deduplicated in rule order
    pub fn derive(&self, event: &MutationEvent) -> Vec<InvalidationTarget> {
        let rules = self.rules.read();
        let mut targets: Vec<InvalidationTarget> = Vec::new();
        for rule in rules.get(&event.entity_kind()).into_iter().flatten() {
            for target in rule.derive(event) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }

    /// Apply an event: local deletes now, distributed deletes in the background.
    ///
    /// The distributed cleanup needs a Tokio runtime; without one it is
    /// skipped with a warning.
    pub fn invalidate(
        &self,
        event: &MutationEvent,
        local: &LocalStore,
        distributed: Option<&DistributedStore>,
    ) -> InvalidationReport {
        let targets = self.derive(event);
        let report = apply_local(&targets, local);

        debug!(
            entity = %event.entity_kind(),
            keys = report.keys.len(),
            prefixes = report.prefixes.len(),
            local_removed = report.local_removed,
            "Invalidated local tier"
        );

        if let Some(distributed) = distributed {
            if !targets.is_empty() {
                spawn_distributed_cleanup(distributed.clone(), targets, || {});
            }
        }

        report
    }
}

/// Delete `targets` from the local store
pub fn apply_local(targets: &[InvalidationTarget], local: &LocalStore) -> InvalidationReport {
    let mut report = InvalidationReport::default();
    for target in targets {
        match target {
            InvalidationTarget::Key(key) => {
                if local.delete(key) {
                    report.local_removed += 1;
                }
                report.keys.push(key.as_str().to_string());
            }
            InvalidationTarget::Prefix(prefix) => {
                report.local_removed += local.delete_by_prefix(prefix);
                report.prefixes.push(prefix.clone());
            }
        }
    }
    report
}

/// Delete `targets` from the distributed tier; failures are absorbed by the store
pub async fn delete_distributed(distributed: &DistributedStore, targets: &[InvalidationTarget]) -> usize {
    let mut removed = 0usize;
    for target in targets {
        match target {
            InvalidationTarget::Key(key) => {
                if distributed.delete(key.as_str()).await {
                    removed += 1;
                }
            }
            InvalidationTarget::Prefix(prefix) => {
                removed += distributed.delete_by_prefix(prefix).await;
            }
        }
    }
    removed
}

/// Run [`delete_distributed`] on a detached task, then `on_done`.
///
/// Returns false, without calling `on_done`, when no runtime is available.
pub(crate) fn spawn_distributed_cleanup<F>(
    distributed: DistributedStore,
    targets: Vec<InvalidationTarget>,
    on_done: F,
) -> bool
where
    F: FnOnce() + Send + 'static,
{
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!(
                targets = targets.len(),
                "No async runtime, skipping distributed invalidation"
            );
            return false;
        }
    };

    handle.spawn(async move {
        let removed = delete_distributed(&distributed, &targets).await;
        on_done();
        debug!(removed, "Invalidated distributed tier");
    });
    true
}

// =============================================================================
// Ledger
// =============================================================================

/// Recent invalidations, ordered by a sequence number.
///
/// An entry stays while its distributed cleanup is pending or while a
/// [`LedgerWatch`] opened before it is alive.
#[derive(Debug, Default)]
pub struct InvalidationLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    seq: u64,
    entries: Vec<LedgerEntry>,
    /// Open watches by starting sequence, with counts
    watches: BTreeMap<u64, usize>,
}

#[derive(Debug)]
struct LedgerEntry {
    seq: u64,
    targets: Vec<InvalidationTarget>,
    pending: bool,
}

impl LedgerState {
    fn prune(&mut self) {
        let floor = self.watches.keys().next().copied().unwrap_or(self.seq);
        self.entries.retain(|e| e.pending || e.seq > floor);
    }
}

impl InvalidationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log an invalidation; `pending` marks a distributed cleanup still to run.
    ///
    /// Must be called before the local deletes.
    pub fn record(&self, targets: Vec<InvalidationTarget>, pending: bool) -> u64 {
        let mut state = self.state.lock();
        state.seq += 1;
        let seq = state.seq;
        state.entries.push(LedgerEntry {
            seq,
            targets,
            pending,
        });
        state.prune();
        seq
    }

    /// Mark the distributed cleanup of invalidation `seq` finished
    pub fn settle(&self, seq: u64) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.seq == seq) {
            entry.pending = false;
        }
        state.prune();
    }

    /// Whether a distributed cleanup covering `key` has not finished yet
    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.state
            .lock()
            .entries
            .iter()
            .any(|e| e.pending && e.targets.iter().any(|t| t.matches(key)))
    }

    /// Start observing invalidations made from now on
    pub fn watch(self: &Arc<Self>) -> LedgerWatch {
        let mut state = self.state.lock();
        let since = state.seq;
        *state.watches.entry(since).or_default() += 1;
        LedgerWatch {
            ledger: self.clone(),
            since,
        }
    }

    /// Entries currently retained
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn invalidated_since(&self, key: &CacheKey, since: u64) -> bool {
        self.state
            .lock()
            .entries
            .iter()
            .any(|e| e.seq > since && e.targets.iter().any(|t| t.matches(key)))
    }
}

/// Guard reporting whether a key was invalidated after it was opened
#[derive(Debug)]
pub struct LedgerWatch {
    ledger: Arc<InvalidationLedger>,
    since: u64,
}

impl LedgerWatch {
    pub fn invalidated(&self, key: &CacheKey) -> bool {
        self.ledger.invalidated_since(key, self.since)
    }
}

impl Drop for LedgerWatch {
    fn drop(&mut self) {
        let mut state = self.ledger.state.lock();
        if let Some(count) = state.watches.get_mut(&self.since) {
            *count -= 1;
            if *count == 0 {
                state.watches.remove(&self.since);
            }
        }
        state.prune();
    }
}

/// Cascades for the well-known key layout:
///
/// | Event | Targets |
/// |-------|---------|
/// | order | `orders:detail:{order}`, `orders:list:{restaurant}:*`, `orders:driver:{driver}:*`, `orders:customer:{customer}:*`, `analytics:dashboard` |
/// | product | `products:detail:{product}`, `products:catalog:{restaurant}`, `products:catalog:{restaurant}:*` |
/// | profile | `profiles:{user}`, `profiles:{user}:*` |
/// | analytics | `analytics:dashboard`, `analytics:restaurant:{restaurant}:*` |
/// | system | `system:health`, `system:{component}:*` |
pub fn default_rules() -> Vec<InvalidationRule> {
    vec![
        InvalidationRule::new("order-cascade", EntityKind::Order, |event| {
            let MutationEvent::Order {
                order_id,
                restaurant_id,
                driver_id,
                customer_id,
                ..
            } = event
            else {
                return Vec::new();
            };
            let mut targets = vec![
                InvalidationTarget::key(Namespace::Orders, format!("detail:{}", order_id)),
                InvalidationTarget::prefix(Namespace::Orders, format!("list:{}:", restaurant_id)),
            ];
            if let Some(driver) = driver_id {
                targets.push(InvalidationTarget::prefix(
                    Namespace::Orders,
                    format!("driver:{}:", driver),
                ));
            }
            if let Some(customer) = customer_id {
                targets.push(InvalidationTarget::prefix(
                    Namespace::Orders,
                    format!("customer:{}:", customer),
                ));
            }
            targets.push(InvalidationTarget::key(Namespace::Analytics, "dashboard"));
            targets
        }),
        InvalidationRule::new("product-cascade", EntityKind::Product, |event| {
            let MutationEvent::Product {
                product_id,
                restaurant_id,
                ..
            } = event
            else {
                return Vec::new();
            };
            vec![
                InvalidationTarget::key(Namespace::Products, format!("detail:{}", product_id)),
                InvalidationTarget::key(Namespace::Products, format!("catalog:{}", restaurant_id)),
                InvalidationTarget::prefix(Namespace::Products, format!("catalog:{}:", restaurant_id)),
            ]
        }),
        InvalidationRule::new("profile-cascade", EntityKind::Profile, |event| {
            let MutationEvent::Profile { user_id, .. } = event else {
                return Vec::new();
            };
            vec![
                InvalidationTarget::key(Namespace::Profiles, user_id),
                InvalidationTarget::prefix(Namespace::Profiles, format!("{}:", user_id)),
            ]
        }),
        InvalidationRule::new("analytics-cascade", EntityKind::Analytics, |event| {
            let MutationEvent::Analytics { restaurant_id, .. } = event else {
                return Vec::new();
            };
            let mut targets = vec![InvalidationTarget::key(Namespace::Analytics, "dashboard")];
            if let Some(restaurant) = restaurant_id {
                targets.push(InvalidationTarget::prefix(
                    Namespace::Analytics,
                    format!("restaurant:{}:", restaurant),
                ));
            }
            targets
        }),
        InvalidationRule::new("system-cascade", EntityKind::System, |event| {
            let MutationEvent::System { component, .. } = event else {
                return Vec::new();
            };
            vec![
                InvalidationTarget::key(Namespace::System, "health"),
                InvalidationTarget::prefix(Namespace::System, format!("{}:", component)),
            ]
        }),
    ]
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::SystemClock;
    use crate::cache::compression::CompressionAlgorithm;
    use crate::cache::distributed::{DistributedBackend, InMemoryDistributedBackend};
    use crate::cache::entry::CacheEntry;
    use crate::cache::local::LocalStoreConfig;
    use crate::cache::metrics::CacheMetrics;
    use crate::cache::policy::CachePolicy;
    use bytes::Bytes;
    use std::time::Duration;

    fn local_with(keys: &[(Namespace, &str)]) -> LocalStore {
        let local = LocalStore::new(
            LocalStoreConfig::default(),
            Arc::new(SystemClock),
            Arc::new(CacheMetrics::new()),
        );
        for (ns, id) in keys {
            local
                .set(
                    CacheKey::new(*ns, id),
                    Bytes::from_static(b"1"),
                    CompressionAlgorithm::None,
                    &CachePolicy::new(60, 30),
                )
                .unwrap();
        }
        local
    }

    fn full_order(order: &str, restaurant: &str) -> MutationEvent {
        MutationEvent::Order {
            kind: MutationKind::Update,
            order_id: order.into(),
            restaurant_id: restaurant.into(),
            driver_id: Some("D4".into()),
            customer_id: Some("C9".into()),
        }
    }

    #[test]
    fn test_order_cascade_targets() {
        let router = InvalidationRouter::with_default_rules();
        let targets = router.derive(&full_order("O1", "R1"));

        assert_eq!(
            targets,
            vec![
                InvalidationTarget::key(Namespace::Orders, "detail:O1"),
                InvalidationTarget::prefix(Namespace::Orders, "list:R1:"),
                InvalidationTarget::prefix(Namespace::Orders, "driver:D4:"),
                InvalidationTarget::prefix(Namespace::Orders, "customer:C9:"),
                InvalidationTarget::key(Namespace::Analytics, "dashboard"),
            ]
        );
    }

    #[test]
    fn test_cascade_leaves_other_restaurant_untouched() {
        let router = InvalidationRouter::with_default_rules();
        let local = local_with(&[
            (Namespace::Orders, "detail:O1"),
            (Namespace::Orders, "list:R1:page=1"),
            (Namespace::Orders, "list:R1:page=2"),
            (Namespace::Orders, "list:R2:page=1"),
            (Namespace::Analytics, "dashboard"),
        ]);

        let report = router.invalidate(
            &MutationEvent::order(MutationKind::Update, "O1", "R1"),
            &local,
            None,
        );

        assert_eq!(report.local_removed, 4);
        assert_eq!(local.keys(), vec!["orders:list:R2:page=1".to_string()]);
    }

    #[test]
    fn test_multiple_rules_fire_and_dedup() {
        let router = InvalidationRouter::with_default_rules();
        router.register_rule(InvalidationRule::new("extra", EntityKind::Order, |event| {
            match event {
                MutationEvent::Order { order_id, .. } => vec![
                    InvalidationTarget::key(Namespace::Orders, format!("detail:{}", order_id)),
                    InvalidationTarget::key(Namespace::Orders, format!("timeline:{}", order_id)),
                ],
                _ => Vec::new(),
            }
        }));
        assert_eq!(router.rule_count(EntityKind::Order), 2);

        let targets = router.derive(&MutationEvent::order(MutationKind::Delete, "O1", "R1"));
        assert_eq!(targets.len(), 4);
        assert!(targets.contains(&InvalidationTarget::key(Namespace::Orders, "timeline:O1")));
    }

    #[test]
    fn test_no_rules_no_targets() {
        let router = InvalidationRouter::new();
        let local = local_with(&[(Namespace::Profiles, "U1")]);
        let report = router.invalidate(
            &MutationEvent::Profile {
                kind: MutationKind::Update,
                user_id: "U1".into(),
            },
            &local,
            None,
        );
        assert_eq!(report, InvalidationReport::default());
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_invalidate_without_runtime_still_clears_local() {
        let router = InvalidationRouter::with_default_rules();
        let local = local_with(&[(Namespace::Profiles, "U1"), (Namespace::Profiles, "U1:settings")]);
        let distributed = DistributedStore::new(
            Arc::new(InMemoryDistributedBackend::new()),
            Duration::from_millis(50),
            Arc::new(SystemClock),
            Arc::new(CacheMetrics::new()),
        );

        let report = router.invalidate(
            &MutationEvent::Profile {
                kind: MutationKind::Delete,
                user_id: "U1".into(),
            },
            &local,
            Some(&distributed),
        );
        assert_eq!(report.local_removed, 2);
        assert!(local.is_empty());
    }

    #[test]
    fn test_target_matches() {
        let key = CacheKey::new(Namespace::Orders, "list:R1:page=1");
        assert!(InvalidationTarget::prefix(Namespace::Orders, "list:R1:").matches(&key));
        assert!(!InvalidationTarget::prefix(Namespace::Orders, "list:R2:").matches(&key));
        assert!(InvalidationTarget::Key(key.clone()).matches(&key));
        assert!(!InvalidationTarget::key(Namespace::Orders, "list:R1").matches(&key));
    }

    #[test]
    fn test_ledger_pending_until_settled() {
        let ledger = InvalidationLedger::new();
        let key = CacheKey::new(Namespace::Profiles, "U1");

        let seq = ledger.record(vec![InvalidationTarget::key(Namespace::Profiles, "U1")], true);
        assert!(ledger.is_pending(&key));
        assert!(!ledger.is_pending(&CacheKey::new(Namespace::Profiles, "U2")));

        ledger.settle(seq);
        assert!(!ledger.is_pending(&key));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_watch_sees_only_later_invalidations() {
        let ledger = Arc::new(InvalidationLedger::new());
        let key = CacheKey::new(Namespace::Orders, "detail:O1");

        ledger.record(vec![InvalidationTarget::Key(key.clone())], false);
        let watch = ledger.watch();
        assert!(!watch.invalidated(&key));

        ledger.record(vec![InvalidationTarget::prefix(Namespace::Orders, "detail:")], false);
        assert!(watch.invalidated(&key));
        assert!(!watch.invalidated(&CacheKey::new(Namespace::Products, "p1")));
        assert_eq!(ledger.len(), 1);

        drop(watch);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_keeps_entries_for_oldest_watch() {
        let ledger = Arc::new(InvalidationLedger::new());
        let key = CacheKey::new(Namespace::Orders, "detail:O1");
        let target = || vec![InvalidationTarget::Key(key.clone())];

        let oldest = ledger.watch();
        ledger.record(target(), false);
        let newer = ledger.watch();
        ledger.record(target(), false);
        assert_eq!(ledger.len(), 2);

        drop(newer);
        assert_eq!(ledger.len(), 2);
        assert!(oldest.invalidated(&key));

        drop(oldest);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_distributed_cleanup_runs_in_background() {
        let router = InvalidationRouter::with_default_rules();
        let local = local_with(&[]);
        let backend = Arc::new(InMemoryDistributedBackend::new());
        let distributed = DistributedStore::new(
            backend.clone(),
            Duration::from_millis(50),
            Arc::new(SystemClock),
            Arc::new(CacheMetrics::new()),
        );
        for id in ["detail:P1", "catalog:R1", "catalog:R1:page=1", "catalog:R2"] {
            let entry = CacheEntry::new(
                CacheKey::new(Namespace::Products, id),
                Bytes::from_static(b"1"),
                CompressionAlgorithm::None,
                &CachePolicy::new(60, 30),
                chrono::Utc::now(),
            );
            assert!(distributed.set(&entry).await);
        }

        router.invalidate(
            &MutationEvent::Product {
                kind: MutationKind::Update,
                product_id: "P1".into(),
                restaurant_id: "R1".into(),
            },
            &local,
            Some(&distributed),
        );

        for _ in 0..50 {
            if backend.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.scan_prefix("products:").await.unwrap(), vec!["products:catalog:R2".to_string()]);
    }

    #[test]
    fn test_mutation_event_serde() {
        let json = r#"{"entity":"order","kind":"update","order_id":"O1","restaurant_id":"R1"}"#;
        let event: MutationEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, MutationEvent::order(MutationKind::Update, "O1", "R1"));
        assert_eq!(event.entity_kind(), EntityKind::Order);
        assert_eq!(event.mutation_kind(), MutationKind::Update);
    }
}
