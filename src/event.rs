//! Structured transition events persisted by the engine.
//!
//! Consumers tail the event stream to build dashboards, alerting, or audit
//! trails. Events narrate the engine's decisions; the collection log is the
//! authoritative ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{WorkerId, ZoneId};

/// A structured event recorded by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: TransitionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionKind {
    ZoneRegistered {
        zone_id: ZoneId,
        name: String,
    },
    ZoneEntered {
        worker_id: WorkerId,
        zone_id: ZoneId,
    },
    ZoneExited {
        worker_id: WorkerId,
        zone_id: ZoneId,
        dwell_secs: i64,
    },
    /// The departure above qualified and the ledger insert landed. The
    /// worker id here is narration only; the ledger row stays unattributed.
    ZoneServiced {
        zone_id: ZoneId,
        worker_id: WorkerId,
    },
    /// Payload written by a newer or corrupted writer that this version
    /// cannot interpret.
    Unknown {
        raw: String,
    },
}
