//! Geofence transition engine. The public API for registering zones and
//! processing pings.
//!
//! The engine owns the zone index and the storage; all state transitions go
//! through here. Every ping is evaluated inside a single SQLite transaction,
//! so the worker-state update, the ledger insert, and the recorded events
//! commit or roll back together, and a failed ping never leaves a partial
//! update behind.

use chrono::{NaiveDate, TimeDelta};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::event::{TransitionEvent, TransitionKind};
use crate::index::ZoneIndex;
use crate::model::*;
use crate::storage::Storage;

/// Tunables for the transition engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Minimum continuous time inside a zone for a departure to count as
    /// service.
    pub min_dwell: TimeDelta,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_dwell: TimeDelta::seconds(10),
        }
    }
}

/// The transition engine. Owns all state and enforces all invariants.
///
/// Two pings for the same worker must never be processed concurrently;
/// the `&mut self` API serializes them. Separate handles over one database
/// file still keep the once-per-day ledger invariant, because recording is
/// a single conditional insert guarded by a unique index.
pub struct Engine {
    storage: Storage,
    index: ZoneIndex,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with in-memory storage (for testing).
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::hydrate(Storage::in_memory()?, config)
    }

    /// Create an engine backed by a database file, rebuilding the zone
    /// index from previously registered zones.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        Self::hydrate(Storage::open(path)?, config)
    }

    fn hydrate(storage: Storage, config: EngineConfig) -> Result<Self> {
        let mut index = ZoneIndex::new();
        for zone in storage.zones()? {
            index.insert(&zone);
        }
        debug!(zones = index.len(), "zone index hydrated");
        Ok(Self {
            storage,
            index,
            config,
        })
    }

    /// Register a zone from externally-ordered `[latitude, longitude]`
    /// vertices. Fails with `InvalidBoundary` on a degenerate ring and with
    /// `DuplicateZoneName` if the name is taken. Zones are immutable once
    /// registered.
    pub fn register_zone(&mut self, name: &str, boundary_latlon: &[[f64; 2]]) -> Result<Zone> {
        let boundary = boundary_from_latlon(boundary_latlon);
        ZoneIndex::validate(&boundary)?;

        let zone = self.storage.with_transaction(|ctx| {
            let zone = ctx.insert_zone(name, &boundary)?;
            ctx.record_event(TransitionKind::ZoneRegistered {
                zone_id: zone.id,
                name: zone.name.clone(),
            })?;
            Ok(zone)
        })?;

        self.index.insert(&zone);
        info!(zone = %zone.id, name = %zone.name, "zone registered");
        Ok(zone)
    }

    /// Process one ping. Returns the collection events it produced.
    ///
    /// The dwell check fires on exit, not on a timer: the engine is purely
    /// reactive to the ping stream and needs no background scheduler, at the
    /// cost of not detecting service until the next ping after the worker
    /// moved on. A final dwell at process end is lost.
    pub fn process_ping(&mut self, ping: &Ping) -> Result<Vec<CollectionEvent>> {
        let now = ping.recorded_at;
        let worker_id = ping.worker_id;
        let zone_now = self.index.locate(ping.location);
        let index = &self.index;
        let min_dwell = self.config.min_dwell;

        self.storage.with_transaction(|ctx| {
            let prev = ctx.worker_state(worker_id)?;
            let prev_zone = prev.occupancy.map(|o| o.zone_id);

            if zone_now == prev_zone {
                // No transition; the lazy state creation above is the only
                // side effect for a new worker.
                debug!(worker = %worker_id, zone = ?zone_now, "no zone change");
                return Ok(Vec::new());
            }

            let mut emitted = Vec::new();

            if let Some(occ) = prev.occupancy {
                // The stored zone reference is weak; an id the index no
                // longer knows means the worker was effectively outside.
                if index.contains_zone(occ.zone_id) {
                    let dwell = now - occ.entered_at;
                    ctx.record_event(TransitionKind::ZoneExited {
                        worker_id,
                        zone_id: occ.zone_id,
                        dwell_secs: dwell.num_seconds(),
                    })?;

                    if dwell >= min_dwell {
                        // A dwell spanning UTC midnight is dated by the
                        // departure instant, matching the evaluation time.
                        match ctx.try_record_collection(occ.zone_id, now)? {
                            Some(event) => {
                                ctx.record_event(TransitionKind::ZoneServiced {
                                    zone_id: occ.zone_id,
                                    worker_id,
                                })?;
                                info!(
                                    zone = %occ.zone_id,
                                    worker = %worker_id,
                                    dwell_secs = dwell.num_seconds(),
                                    "collection logged"
                                );
                                emitted.push(event);
                            }
                            None => {
                                debug!(
                                    zone = %occ.zone_id,
                                    "already logged today, departure discarded"
                                );
                            }
                        }
                    } else {
                        debug!(
                            zone = %occ.zone_id,
                            dwell_secs = dwell.num_seconds(),
                            "dwell below threshold, departure discarded"
                        );
                    }
                }
            }

            if let Some(zone_id) = zone_now {
                ctx.record_event(TransitionKind::ZoneEntered { worker_id, zone_id })?;
            }

            // Zone and entry time always move as a pair.
            ctx.set_worker_state(
                worker_id,
                zone_now.map(|zone_id| Occupancy {
                    zone_id,
                    entered_at: now,
                }),
            )?;

            Ok(emitted)
        })
    }

    // -----------------------------------------------------------------------
    // Read-only queries (for reporting/dashboard collaborators)
    // -----------------------------------------------------------------------

    /// All registered zones, in registration order.
    pub fn zones(&self) -> Result<Vec<Zone>> {
        self.storage.zones()
    }

    /// Get a zone by id.
    pub fn zone(&self, id: ZoneId) -> Result<Zone> {
        self.storage.zone(id)
    }

    /// Collection events logged on a UTC calendar day.
    pub fn collections_on(&self, day: NaiveDate) -> Result<Vec<CollectionEvent>> {
        self.storage.collections_on(day)
    }

    /// Zone ids marked serviced on a UTC calendar day.
    pub fn serviced_zone_ids(&self, day: NaiveDate) -> Result<BTreeSet<ZoneId>> {
        self.storage.serviced_zone_ids(day)
    }

    /// Transition events after a sequence number.
    pub fn events_since(&self, since_seq: u64) -> Result<Vec<TransitionEvent>> {
        self.storage.events_since(since_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn dangling_zone_id_in_worker_state_is_treated_as_outside() {
        let mut engine = Engine::in_memory(EngineConfig::default()).unwrap();
        engine
            .register_zone("Zone-A1", &[[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0]])
            .unwrap();

        // Plant a state referencing a zone the index has never seen, as a
        // future deletion path might leave behind.
        engine.storage.worker_state(WorkerId(1)).unwrap();
        engine
            .storage
            .set_worker_state(
                WorkerId(1),
                Some(Occupancy {
                    zone_id: ZoneId(999),
                    entered_at: at("2024-06-01T08:00:00Z"),
                }),
            )
            .unwrap();

        // A long "dwell" against the dangling id must not produce an event.
        let ping = Ping::at_latlon(WorkerId(1), 50.0, 50.0, at("2024-06-01T09:00:00Z"));
        let events = engine.process_ping(&ping).unwrap();
        assert!(events.is_empty());

        // State moved on to "outside" cleanly.
        let state = engine.storage.worker_state(WorkerId(1)).unwrap();
        assert_eq!(state.occupancy, None);
    }
}
