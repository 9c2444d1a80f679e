//! SQLite storage layer.
//!
//! Single source of truth for zones, worker state, the collection ledger,
//! and the transition event stream. WAL mode for concurrent read access.
//! All writes go through the engine.

use chrono::{DateTime, NaiveDate, Utc};
use geo::Coord;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::{TransitionEvent, TransitionKind};
use crate::model::*;

/// Storage backend. Owns the SQLite connection.
pub struct Storage {
    conn: Connection,
}

/// Handle for performing storage operations within a transaction.
///
/// All methods delegate to the same SQL logic as `Storage`, but execute
/// against the transaction's connection. This ensures atomicity — either
/// all operations commit together or none do.
pub(crate) struct TxContext<'a> {
    tx: &'a Connection,
}

impl TxContext<'_> {
    pub fn insert_zone(&self, name: &str, boundary: &[Coord<f64>]) -> Result<Zone> {
        insert_zone_on(self.tx, name, boundary)
    }

    pub fn worker_state(&self, worker_id: WorkerId) -> Result<WorkerState> {
        worker_state_on(self.tx, worker_id)
    }

    pub fn set_worker_state(
        &self,
        worker_id: WorkerId,
        occupancy: Option<Occupancy>,
    ) -> Result<()> {
        set_worker_state_on(self.tx, worker_id, occupancy)
    }

    pub fn try_record_collection(
        &self,
        zone_id: ZoneId,
        at: DateTime<Utc>,
    ) -> Result<Option<CollectionEvent>> {
        try_record_collection_on(self.tx, zone_id, at)
    }

    pub fn record_event(&mut self, kind: TransitionKind) -> Result<TransitionEvent> {
        record_event_on(self.tx, kind)
    }
}

impl Storage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    fn init(&mut self) -> Result<()> {
        // WAL mode for concurrent readers
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS zones (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                boundary    TEXT NOT NULL
            );

            -- current_zone_id is a weak reference on purpose: it must
            -- tolerate a zone id that no longer resolves.
            CREATE TABLE IF NOT EXISTS worker_status (
                worker_id       INTEGER PRIMARY KEY,
                current_zone_id INTEGER,
                entry_timestamp TEXT
            );

            CREATE TABLE IF NOT EXISTS collection_log (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                zone_id      INTEGER NOT NULL REFERENCES zones(id),
                serviced_at  TEXT NOT NULL,
                serviced_day TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'auto-logged'
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_collection_zone_day
                ON collection_log(zone_id, serviced_day);

            CREATE TABLE IF NOT EXISTS events (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                kind        TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Execute a closure within a SQLite transaction.
    ///
    /// The transaction commits if the closure returns Ok, rolls back on Err.
    pub(crate) fn with_transaction<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let mut ctx = TxContext { tx: &tx };
        let result = f(&mut ctx)?;
        tx.commit()?;
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Zones
    // -----------------------------------------------------------------------

    /// Insert a new zone. The id is assigned by SQLite.
    pub fn insert_zone(&mut self, name: &str, boundary: &[Coord<f64>]) -> Result<Zone> {
        insert_zone_on(&self.conn, name, boundary)
    }

    /// All zones, in registration order.
    pub fn zones(&self) -> Result<Vec<Zone>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, boundary FROM zones ORDER BY id ASC")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, boundary)| zone_from_row(id, name, &boundary))
            .collect()
    }

    /// Get a zone by id.
    pub fn zone(&self, id: ZoneId) -> Result<Zone> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, boundary FROM zones WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or(Error::ZoneNotFound(id))?;

        zone_from_row(row.0, row.1, &row.2)
    }

    // -----------------------------------------------------------------------
    // Worker state
    // -----------------------------------------------------------------------

    /// Load a worker's state, creating an "outside all zones" row on first
    /// sight. The creation is observable exactly once per new worker id.
    pub fn worker_state(&self, worker_id: WorkerId) -> Result<WorkerState> {
        worker_state_on(&self.conn, worker_id)
    }

    /// Replace a worker's occupancy. Zone and entry time are written as a
    /// pair, never independently.
    pub fn set_worker_state(
        &mut self,
        worker_id: WorkerId,
        occupancy: Option<Occupancy>,
    ) -> Result<()> {
        set_worker_state_on(&self.conn, worker_id, occupancy)
    }

    // -----------------------------------------------------------------------
    // Collection ledger
    // -----------------------------------------------------------------------

    /// Whether the ledger already holds an entry for this zone on the given
    /// UTC calendar day.
    pub fn has_collection_on(&self, zone_id: ZoneId, day: NaiveDate) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM collection_log WHERE zone_id = ?1 AND serviced_day = ?2",
                params![zone_id.0, day.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Conditionally append a ledger entry: a single insert guarded by the
    /// (zone, day) unique index. Returns the new entry only when the insert
    /// landed, `None` when the zone was already logged that day. This is the
    /// atomic check-then-record; there is no separate query step to race.
    pub fn try_record_collection(
        &mut self,
        zone_id: ZoneId,
        at: DateTime<Utc>,
    ) -> Result<Option<CollectionEvent>> {
        try_record_collection_on(&self.conn, zone_id, at)
    }

    /// Ledger entries for a UTC calendar day, oldest first.
    pub fn collections_on(&self, day: NaiveDate) -> Result<Vec<CollectionEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT zone_id, serviced_at, status FROM collection_log
             WHERE serviced_day = ?1 ORDER BY serviced_at ASC",
        )?;

        let rows = stmt
            .query_map(params![day.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(zone_id, serviced_at, status)| {
                Ok(CollectionEvent {
                    zone_id: ZoneId(zone_id),
                    serviced_at: parse_instant(&serviced_at)?,
                    status,
                })
            })
            .collect()
    }

    /// Zone ids with a ledger entry on the given UTC calendar day.
    pub fn serviced_zone_ids(&self, day: NaiveDate) -> Result<BTreeSet<ZoneId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT zone_id FROM collection_log WHERE serviced_day = ?1")?;

        let ids = stmt
            .query_map(params![day.to_string()], |row| {
                Ok(ZoneId(row.get::<_, i64>(0)?))
            })?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;

        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Record a transition event and return it with its sequence number.
    pub fn record_event(&mut self, kind: TransitionKind) -> Result<TransitionEvent> {
        record_event_on(&self.conn, kind)
    }

    /// Get transition events after a sequence number.
    pub fn events_since(&self, since_seq: u64) -> Result<Vec<TransitionEvent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, timestamp, kind FROM events WHERE seq > ?1 ORDER BY seq ASC")?;

        let rows = stmt
            .query_map(params![since_seq as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, timestamp, kind_str)| {
                Ok(TransitionEvent {
                    seq: seq as u64,
                    timestamp: parse_instant(&timestamp)?,
                    kind: serde_json::from_str(&kind_str)
                        .unwrap_or(TransitionKind::Unknown { raw: kind_str }),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Inner functions — accept &Connection so they work with both
// Connection (auto-commit) and Transaction (deref to Connection).
// ---------------------------------------------------------------------------

/// Parse a stored instant. The storage boundary is the single place naive
/// values can enter the system; anything without an explicit offset is
/// rejected here rather than silently coerced mid-computation.
fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::NaiveTimestamp(raw.to_string()))
}

fn zone_from_row(id: i64, name: String, boundary_json: &str) -> Result<Zone> {
    let pairs: Vec<[f64; 2]> = serde_json::from_str(boundary_json)
        .map_err(|e| Error::Other(format!("corrupt boundary for zone {id}: {e}")))?;
    let boundary = pairs.iter().map(|&[x, y]| Coord { x, y }).collect();
    Ok(Zone::new(ZoneId(id), name, boundary))
}

fn insert_zone_on(conn: &Connection, name: &str, boundary: &[Coord<f64>]) -> Result<Zone> {
    let pairs: Vec<[f64; 2]> = boundary.iter().map(|c| [c.x, c.y]).collect();
    let json = serde_json::to_string(&pairs)
        .map_err(|e| Error::Other(format!("failed to encode boundary: {e}")))?;

    match conn.execute(
        "INSERT INTO zones (name, boundary) VALUES (?1, ?2)",
        params![name, json],
    ) {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(Error::DuplicateZoneName(name.to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    let id = ZoneId(conn.last_insert_rowid());
    Ok(Zone::new(id, name.to_string(), boundary.to_vec()))
}

fn worker_state_on(conn: &Connection, worker_id: WorkerId) -> Result<WorkerState> {
    let row = conn
        .query_row(
            "SELECT current_zone_id, entry_timestamp FROM worker_status WHERE worker_id = ?1",
            params![worker_id.0],
            |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                ))
            },
        )
        .optional()?;

    let Some((zone, entry)) = row else {
        conn.execute(
            "INSERT INTO worker_status (worker_id) VALUES (?1)",
            params![worker_id.0],
        )?;
        debug!(worker = %worker_id, "created state for new worker");
        return Ok(WorkerState {
            worker_id,
            occupancy: None,
        });
    };

    let occupancy = match (zone, entry) {
        (Some(zone_id), Some(raw)) => Some(Occupancy {
            zone_id: ZoneId(zone_id),
            entered_at: parse_instant(&raw)?,
        }),
        (None, None) => None,
        _ => {
            // Never written by this crate; tolerate by treating as outside.
            warn!(worker = %worker_id, "half-set occupancy row, treating as outside");
            None
        }
    };

    Ok(WorkerState {
        worker_id,
        occupancy,
    })
}

fn set_worker_state_on(
    conn: &Connection,
    worker_id: WorkerId,
    occupancy: Option<Occupancy>,
) -> Result<()> {
    let (zone_id, entered_at) = match occupancy {
        Some(occ) => (Some(occ.zone_id.0), Some(occ.entered_at.to_rfc3339())),
        None => (None, None),
    };

    conn.execute(
        "INSERT INTO worker_status (worker_id, current_zone_id, entry_timestamp)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(worker_id) DO UPDATE SET
             current_zone_id = excluded.current_zone_id,
             entry_timestamp = excluded.entry_timestamp",
        params![worker_id.0, zone_id, entered_at],
    )?;
    Ok(())
}

fn try_record_collection_on(
    conn: &Connection,
    zone_id: ZoneId,
    at: DateTime<Utc>,
) -> Result<Option<CollectionEvent>> {
    // Calendar day in UTC, regardless of process or database timezone.
    let day = at.date_naive().to_string();

    let inserted = conn.execute(
        "INSERT INTO collection_log (zone_id, serviced_at, serviced_day, status)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(zone_id, serviced_day) DO NOTHING",
        params![zone_id.0, at.to_rfc3339(), day, STATUS_AUTO_LOGGED],
    )?;

    if inserted == 0 {
        return Ok(None);
    }

    Ok(Some(CollectionEvent {
        zone_id,
        serviced_at: at,
        status: STATUS_AUTO_LOGGED.to_string(),
    }))
}

fn record_event_on(conn: &Connection, kind: TransitionKind) -> Result<TransitionEvent> {
    let now = Utc::now();

    conn.execute(
        "INSERT INTO events (timestamp, kind) VALUES (?1, ?2)",
        params![
            now.to_rfc3339(),
            serde_json::to_string(&kind).unwrap_or_default(),
        ],
    )?;

    let seq = conn.last_insert_rowid();

    Ok(TransitionEvent {
        seq: seq as u64,
        timestamp: now,
        kind,
    })
}
