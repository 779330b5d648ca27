//! Oracle events for state change notifications.
//!
//! Events are emitted after every successful mutation and published on a
//! broadcast channel. Delivery is best effort: a lagging or absent subscriber
//! never affects the oracle's state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::access::{Principal, Role};
use crate::error::Result;
use crate::oracle::registry::SourceId;
use crate::utils::fingerprint::Fingerprint;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All oracle event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleEventKind {
    /// A source was registered
    SourceAdded {
        /// Source identifier
        source: SourceId,
        /// Initial weight (basis points)
        weight: u64,
    },
    /// A source was removed
    SourceRemoved {
        /// Source identifier
        source: SourceId,
    },
    /// A source's weight changed
    SourceWeightUpdated {
        /// Source identifier
        source: SourceId,
        /// New weight (basis points)
        weight: u64,
        /// Weight before the change
        previous_weight: u64,
    },
    /// A source was activated or deactivated
    SourceStatusChanged {
        /// Source identifier
        source: SourceId,
        /// New state
        active: bool,
    },
    /// A new aggregate price was published
    PriceAggregated {
        /// Weighted price
        price: Decimal,
        /// Computation timestamp
        timestamp: u64,
        /// Number of contributing sources
        source_count: usize,
    },
    /// The deviation threshold changed
    DeviationThresholdUpdated {
        /// New threshold (basis points)
        threshold_bps: u64,
        /// Threshold before the change
        previous_bps: u64,
    },
    /// A role was granted
    RoleGranted {
        /// Role granted
        role: Role,
        /// Recipient
        principal: Principal,
        /// Granting admin
        by: Principal,
    },
    /// A role was revoked
    RoleRevoked {
        /// Role revoked
        role: Role,
        /// Former holder
        principal: Principal,
        /// Revoking admin
        by: Principal,
    },
}

/// An emitted event with its envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleEvent {
    /// Monotonic sequence number per oracle instance
    pub sequence: u64,
    /// Unix timestamp of emission
    pub timestamp: u64,
    /// Payload
    pub kind: OracleEventKind,
}

impl OracleEventKind {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SourceAdded { .. } => "SourceAdded",
            Self::SourceRemoved { .. } => "SourceRemoved",
            Self::SourceWeightUpdated { .. } => "SourceWeightUpdated",
            Self::SourceStatusChanged { .. } => "SourceStatusChanged",
            Self::PriceAggregated { .. } => "PriceAggregated",
            Self::DeviationThresholdUpdated { .. } => "DeviationThresholdUpdated",
            Self::RoleGranted { .. } => "RoleGranted",
            Self::RoleRevoked { .. } => "RoleRevoked",
        }
    }
}

impl OracleEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Content fingerprint of the envelope
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Fingerprint::of(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT BUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Sequenced broadcast publisher
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<OracleEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, returning the envelope
    pub fn emit(&self, kind: OracleEventKind, timestamp: u64) -> OracleEvent {
        let event = OracleEvent {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp,
            kind,
        };

        tracing::info!(
            event = event.event_type(),
            sequence = event.sequence,
            payload = ?event.kind,
            "oracle event"
        );

        // No subscribers is not an error
        let _ = self.tx.send(event.clone());
        event
    }

    /// Sequence number of the last emitted event
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
