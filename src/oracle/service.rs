//! Oracle service boundary.
//!
//! [`OracleAggregator`] owns one oracle instance: the source registry, the
//! latest aggregate, the deviation threshold and the role table. It is the
//! only place where state changes.
//!
//! - Every mutation and every recompute runs under a single writer lock, so
//!   count/validate/apply happens as one step.
//! - State is an immutable [`OracleSnapshot`] behind an `Arc`. Writers clone
//!   it, apply the change, persist it and swap it in; readers clone the `Arc`
//!   and never wait on a fetch.
//! - A rejected call changes nothing: the gate runs first, then argument
//!   validation, then state checks, and the new snapshot is only published
//!   after it has been persisted.
//! - Raw samples from the last fetch round are kept per source, stale ones
//!   included. They are diagnostics only and are not persisted.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use price_oracle::prelude::*;
//!
//! let fetcher = Arc::new(StaticPriceFetcher::new());
//! let oracle = OracleAggregator::new("admin", fetcher);
//! let admin = AuthorizationContext::new("admin");
//!
//! oracle.add_source(&admin, "chainlink".into(), 6_000, 60).await?;
//! oracle.add_source(&admin, "pyth".into(), 4_000, 60).await?;
//! let result = oracle.recompute_aggregate(&admin).await?;
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, Mutex};

use crate::access::{AccessControl, AuthorizationContext, Principal, Role};
use crate::error::{Error, Result};
use crate::oracle::aggregator::{AggregateResult, FetchOutcome, PriceAggregator};
use crate::oracle::config::OracleConfig;
use crate::oracle::deviation::{DeviationConfig, DeviationReport};
use crate::oracle::events::{EventBus, OracleEvent, OracleEventKind};
use crate::oracle::fetchers::{PriceFetcher, Sample, SourceSample};
use crate::oracle::registry::{Source, SourceId, SourceRegistry};
use crate::storage::{get_json, put_json, StorageBackend};
use crate::utils::constants::{DEFAULT_EVENT_CAPACITY, SNAPSHOT_KEY};
use crate::utils::fingerprint::Fingerprint;
use crate::utils::time::{Clock, SystemClock};

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete state of one oracle instance.
///
/// This is also the persisted form; it is written as JSON under
/// [`SNAPSHOT_KEY`] after every successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSnapshot {
    /// Registered sources
    pub registry: SourceRegistry,
    /// Last published aggregate
    pub latest: Option<AggregateResult>,
    /// Deviation monitor settings
    pub deviation: DeviationConfig,
    /// Role table
    pub access: AccessControl,
}

impl OracleSnapshot {
    /// Empty state administered by `admin`
    pub fn new(admin: impl Into<Principal>) -> Self {
        Self {
            registry: SourceRegistry::new(),
            latest: None,
            deviation: DeviationConfig::default(),
            access: AccessControl::new(admin),
        }
    }

    /// Build the initial state described by a configuration
    pub fn bootstrap(config: &OracleConfig, now: u64) -> Result<Self> {
        config.validate()?;

        let mut snapshot = Self::new(config.admin.as_str());
        snapshot.deviation = DeviationConfig::new(config.deviation_threshold_bps);

        let admin = AuthorizationContext::new(config.admin.as_str());
        for manager in &config.managers {
            snapshot
                .access
                .grant(&admin, Role::Manager, Principal::new(manager.as_str()))?;
        }

        for spec in &config.sources {
            snapshot.registry.add(
                SourceId::new(spec.id.as_str()),
                spec.weight,
                spec.max_staleness_secs,
                now,
            )?;
        }

        Ok(snapshot)
    }

    /// Content fingerprint; equal snapshots give equal fingerprints
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Fingerprint::of(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Oracle service statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleStatistics {
    /// Registered sources
    pub source_count: usize,
    /// Active sources
    pub active_sources: usize,
    /// Latest aggregate price, if any
    pub latest_price: Option<Decimal>,
    /// Timestamp of the latest aggregate
    pub last_computed_at: Option<u64>,
    /// Deviation threshold in force
    pub deviation_threshold_bps: u64,
    /// Successful recomputes since start
    pub total_recomputes: u64,
    /// Failed recomputes since start
    pub failed_recomputes: u64,
    /// Sequence number of the last emitted event
    pub last_event_sequence: u64,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Fingerprint of the current snapshot
    pub state_fingerprint: Option<Fingerprint>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE AGGREGATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// A price oracle instance
pub struct OracleAggregator {
    /// Serializes writers
    writer: Mutex<()>,
    /// Current published state
    state: RwLock<Arc<OracleSnapshot>>,
    /// Sample reader
    fetcher: Arc<dyn PriceFetcher>,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Fetch fan-out and averaging
    aggregator: PriceAggregator,
    /// Event publisher
    events: EventBus,
    /// Snapshot persistence
    store: Option<Arc<dyn StorageBackend>>,
    /// Most recent raw sample per source
    samples: RwLock<HashMap<SourceId, Sample>>,
    total_recomputes: AtomicU64,
    failed_recomputes: AtomicU64,
    started_at: u64,
}

impl std::fmt::Debug for OracleAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleAggregator")
            .field("state", &self.snapshot())
            .field("aggregator", &self.aggregator)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl OracleAggregator {
    /// Create an empty, in-memory oracle administered by `admin`
    pub fn new(admin: impl Into<Principal>, fetcher: Arc<dyn PriceFetcher>) -> Self {
        Self::from_snapshot(OracleSnapshot::new(admin), fetcher, Arc::new(SystemClock))
    }

    fn from_snapshot(
        snapshot: OracleSnapshot,
        fetcher: Arc<dyn PriceFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            writer: Mutex::new(()),
            state: RwLock::new(Arc::new(snapshot)),
            fetcher,
            clock,
            aggregator: PriceAggregator::default(),
            events: EventBus::new(DEFAULT_EVENT_CAPACITY),
            store: None,
            samples: RwLock::new(HashMap::new()),
            total_recomputes: AtomicU64::new(0),
            failed_recomputes: AtomicU64::new(0),
            started_at,
        }
    }

    /// Build an oracle from a configuration.
    ///
    /// When `store` already holds a snapshot, that state wins over the
    /// configured bootstrap sources and roles.
    pub fn from_config(
        config: &OracleConfig,
        fetcher: Arc<dyn PriceFetcher>,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn StorageBackend>>,
    ) -> Result<Self> {
        config.validate()?;

        let stored = match &store {
            Some(store) => Self::load_snapshot(store.as_ref())?,
            None => None,
        };
        let restored = stored.is_some();
        let snapshot = match stored {
            Some(snapshot) => snapshot,
            None => OracleSnapshot::bootstrap(config, clock.now())?,
        };

        let mut oracle = Self::from_snapshot(snapshot, fetcher, clock);
        oracle.aggregator =
            PriceAggregator::new(config.min_fetch_timeout(), config.max_fetch_timeout());
        oracle.events = EventBus::new(config.event_capacity);
        oracle.store = store;

        if !restored {
            oracle.persist(&oracle.snapshot())?;
        }

        let state = oracle.snapshot();
        let fingerprint = state.fingerprint()?;
        tracing::info!(
            restored,
            fingerprint = %fingerprint.short(),
            sources = state.registry.len(),
            active = state.registry.active_count(),
            threshold_bps = state.deviation.threshold_bps,
            "oracle initialized"
        );

        Ok(oracle)
    }

    /// Use `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.started_at = clock.now();
        self.clock = clock;
        self
    }

    /// Persist every snapshot to `store`
    pub fn with_store(mut self, store: Arc<dyn StorageBackend>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `aggregator` for fetch timeouts
    pub fn with_aggregator(mut self, aggregator: PriceAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Buffer up to `capacity` events per subscriber
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events = EventBus::new(capacity);
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SOURCE REGISTRY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a new active source
    pub async fn add_source(
        &self,
        ctx: &AuthorizationContext,
        id: SourceId,
        weight: u64,
        max_staleness_secs: u64,
    ) -> Result<Source> {
        self.mutate(ctx, Role::Manager, |state, now| {
            let source = state
                .registry
                .add(id, weight, max_staleness_secs, now)?
                .clone();
            let event = OracleEventKind::SourceAdded {
                source: source.id.clone(),
                weight,
            };
            Ok((source, Some(event)))
        })
        .await
    }

    /// Remove a source
    pub async fn remove_source(&self, ctx: &AuthorizationContext, id: &SourceId) -> Result<Source> {
        let removed = self.mutate(ctx, Role::Manager, |state, _| {
            let removed = state.registry.remove(id)?;
            let event = OracleEventKind::SourceRemoved {
                source: removed.id.clone(),
            };
            Ok((removed, Some(event)))
        })
        .await?;

        self.samples
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&removed.id);
        Ok(removed)
    }

    /// Change a source's weight
    pub async fn update_weight(
        &self,
        ctx: &AuthorizationContext,
        id: &SourceId,
        weight: u64,
    ) -> Result<()> {
        self.mutate(ctx, Role::Manager, |state, _| {
            let previous_weight = state.registry.update_weight(id, weight)?;
            let event = OracleEventKind::SourceWeightUpdated {
                source: id.clone(),
                weight,
                previous_weight,
            };
            Ok(((), Some(event)))
        })
        .await
    }

    /// Activate or deactivate a source.
    ///
    /// Returns `false` when the source was already in the requested state.
    pub async fn set_source_active(
        &self,
        ctx: &AuthorizationContext,
        id: &SourceId,
        active: bool,
    ) -> Result<bool> {
        self.mutate(ctx, Role::Manager, |state, _| {
            let changed = state.registry.set_active(id, active)?;
            let event = changed.then(|| OracleEventKind::SourceStatusChanged {
                source: id.clone(),
                active,
            });
            Ok((changed, event))
        })
        .await
    }

    /// Configuration of one source
    pub fn get_config(&self, id: &SourceId) -> Option<Source> {
        self.snapshot().registry.get(id).cloned()
    }

    /// All registered sources in registration order
    pub fn sources(&self) -> Vec<Source> {
        self.snapshot().registry.sources().to_vec()
    }

    /// Number of active sources
    pub fn active_count(&self) -> usize {
        self.snapshot().registry.active_count()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AGGREGATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch all active sources and publish a new weighted price.
    ///
    /// On `NoFreshSources` (or any other failure) the previous aggregate
    /// stays in place.
    pub async fn recompute_aggregate(&self, ctx: &AuthorizationContext) -> Result<AggregateResult> {
        let _guard = self.writer.lock().await;

        let current = self.snapshot();
        current.access.require(ctx, Role::Manager)?;

        let sources: Vec<Source> = current.registry.active().into_iter().cloned().collect();
        let outcomes = self
            .aggregator
            .collect(Arc::clone(&self.fetcher), sources)
            .await;
        self.record_samples(&outcomes);

        let now = self.clock.now();
        let result = match self.aggregator.aggregate(outcomes, now) {
            Ok(result) => result,
            Err(e) => {
                self.failed_recomputes.fetch_add(1, Ordering::Relaxed);
                if e.is_critical() {
                    tracing::error!(error = %e, code = e.code(), "aggregation failed");
                } else {
                    tracing::warn!(
                        error = %e,
                        retry = e.is_recoverable(),
                        "aggregation failed; keeping previous price"
                    );
                }
                return Err(e);
            }
        };

        let mut next = (*current).clone();
        next.latest = Some(result.clone());
        self.commit(next)?;

        self.total_recomputes.fetch_add(1, Ordering::Relaxed);
        self.events.emit(
            OracleEventKind::PriceAggregated {
                price: result.price,
                timestamp: result.computed_at,
                source_count: result.contributing_sources.len(),
            },
            now,
        );

        Ok(result)
    }

    /// Latest aggregate price and its timestamp
    pub fn get_latest_price(&self) -> Option<(Decimal, u64)> {
        self.snapshot()
            .latest
            .as_ref()
            .map(|result| (result.price, result.computed_at))
    }

    /// Full record of the latest aggregate
    pub fn latest_result(&self) -> Option<AggregateResult> {
        self.snapshot().latest.clone()
    }

    /// Most recent raw sample of every active source, in registry order.
    ///
    /// Samples come from the last fetch round, stale or not, so repeated
    /// calls agree until the next recompute. Sources that never answered are
    /// left out. When no active source has a sample yet, one round is
    /// fetched to fill the cache; published state is never touched.
    pub async fn get_all_prices(&self) -> Vec<SourceSample> {
        if self.cached_samples().is_empty() {
            let _guard = self.writer.lock().await;

            let sources: Vec<Source> = self
                .snapshot()
                .registry
                .active()
                .into_iter()
                .cloned()
                .collect();
            if self.cached_samples().is_empty() && !sources.is_empty() {
                let outcomes = self
                    .aggregator
                    .collect(Arc::clone(&self.fetcher), sources)
                    .await;
                self.record_samples(&outcomes);
            }
        }

        self.cached_samples()
    }

    fn record_samples(&self, outcomes: &[FetchOutcome]) {
        let fetched = PriceAggregator::fetched_samples(outcomes);
        let mut cache = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        for SourceSample { source, sample } in fetched {
            cache.insert(source, sample);
        }
    }

    fn cached_samples(&self) -> Vec<SourceSample> {
        let state = self.snapshot();
        let cache = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        state
            .registry
            .active()
            .into_iter()
            .filter_map(|source| {
                cache.get(&source.id).map(|sample| SourceSample {
                    source: source.id.clone(),
                    sample: sample.clone(),
                })
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEVIATION MONITOR
    // ═══════════════════════════════════════════════════════════════════════════

    /// Compare `candidate` with the latest aggregate
    pub fn check_deviation(&self, candidate: Decimal) -> Result<DeviationReport> {
        let state = self.snapshot();
        let baseline = state.latest.as_ref().ok_or(Error::NoAggregatePrice)?;
        state.deviation.check(candidate, baseline.price)
    }

    /// Threshold currently in force
    pub fn deviation_threshold(&self) -> u64 {
        self.snapshot().deviation.threshold_bps
    }

    /// Change the deviation threshold
    pub async fn update_deviation_threshold(
        &self,
        ctx: &AuthorizationContext,
        threshold_bps: u64,
    ) -> Result<()> {
        self.mutate(ctx, Role::Manager, |state, _| {
            let previous_bps = state.deviation.threshold_bps;
            state.deviation = DeviationConfig::new(threshold_bps);
            let event = OracleEventKind::DeviationThresholdUpdated {
                threshold_bps,
                previous_bps,
            };
            Ok(((), Some(event)))
        })
        .await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESS CONTROL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Grant `role` to `principal`
    pub async fn grant_role(
        &self,
        ctx: &AuthorizationContext,
        role: Role,
        principal: Principal,
    ) -> Result<bool> {
        self.mutate(ctx, Role::Admin, |state, _| {
            let granted = state.access.grant(ctx, role, principal.clone())?;
            let event = granted.then(|| OracleEventKind::RoleGranted {
                role,
                principal,
                by: ctx.caller().clone(),
            });
            Ok((granted, event))
        })
        .await
    }

    /// Revoke `role` from `principal`
    pub async fn revoke_role(
        &self,
        ctx: &AuthorizationContext,
        role: Role,
        principal: &Principal,
    ) -> Result<bool> {
        self.mutate(ctx, Role::Admin, |state, _| {
            let revoked = state.access.revoke(ctx, role, principal)?;
            let event = revoked.then(|| OracleEventKind::RoleRevoked {
                role,
                principal: principal.clone(),
                by: ctx.caller().clone(),
            });
            Ok((revoked, event))
        })
        .await
    }

    /// Whether `principal` holds `role`
    pub fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.snapshot().access.has_role(principal, role)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OBSERVATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Subscribe to oracle events
    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.events.subscribe()
    }

    /// Current state
    pub fn snapshot(&self) -> Arc<OracleSnapshot> {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Get statistics
    pub fn statistics(&self) -> OracleStatistics {
        let state = self.snapshot();
        OracleStatistics {
            source_count: state.registry.len(),
            active_sources: state.registry.active_count(),
            latest_price: state.latest.as_ref().map(|r| r.price),
            last_computed_at: state.latest.as_ref().map(|r| r.computed_at),
            deviation_threshold_bps: state.deviation.threshold_bps,
            total_recomputes: self.total_recomputes.load(Ordering::Relaxed),
            failed_recomputes: self.failed_recomputes.load(Ordering::Relaxed),
            last_event_sequence: self.events.last_sequence(),
            uptime_secs: self.clock.now().saturating_sub(self.started_at),
            state_fingerprint: state.fingerprint().ok(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reload state from the attached store.
    ///
    /// Returns `false` when there is no store or it holds no snapshot.
    pub async fn restore(&self) -> Result<bool> {
        let _guard = self.writer.lock().await;

        let Some(store) = &self.store else {
            return Ok(false);
        };
        let Some(snapshot) = Self::load_snapshot(store.as_ref())? else {
            return Ok(false);
        };

        tracing::info!(sources = snapshot.registry.len(), "oracle state restored");
        self.publish(snapshot);
        Ok(true)
    }

    fn load_snapshot(store: &dyn StorageBackend) -> Result<Option<OracleSnapshot>> {
        get_json(store, SNAPSHOT_KEY)
    }

    fn persist(&self, snapshot: &OracleSnapshot) -> Result<()> {
        match &self.store {
            Some(store) => put_json(store.as_ref(), SNAPSHOT_KEY, snapshot),
            None => Ok(()),
        }
    }

    fn publish(&self, snapshot: OracleSnapshot) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }

    /// Persist then publish; a storage failure leaves the published state as is
    fn commit(&self, snapshot: OracleSnapshot) -> Result<()> {
        if let Err(e) = self.persist(&snapshot) {
            tracing::error!(error = %e, "failed to persist oracle snapshot");
            return Err(e);
        }
        self.publish(snapshot);
        Ok(())
    }

    /// Run one gated mutation against a private copy of the state.
    ///
    /// `apply` returns the call's output and the event to emit; no event
    /// means nothing changed and the copy is dropped.
    async fn mutate<T, F>(&self, ctx: &AuthorizationContext, role: Role, apply: F) -> Result<T>
    where
        F: FnOnce(&mut OracleSnapshot, u64) -> Result<(T, Option<OracleEventKind>)>,
    {
        let _guard = self.writer.lock().await;

        let current = self.snapshot();
        current.access.require(ctx, role)?;

        let now = self.clock.now();
        let mut next = (*current).clone();
        let (output, event) = apply(&mut next, now)?;

        if let Some(kind) = event {
            self.commit(next)?;
            self.events.emit(kind, now);
        }

        Ok(output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
