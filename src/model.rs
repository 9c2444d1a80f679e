//! Core data model.
//!
//! A zone is a registered polygonal collection area. Worker state is the
//! engine's memory of where a worker last was; a collection event is the
//! inferred completion of service for a zone on a given day.

use chrono::{DateTime, Utc};
use geo::{Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

/// Status tag written on every auto-inferred collection log entry.
pub const STATUS_AUTO_LOGGED: &str = "auto-logged";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Newtype for zone ids (SQLite rowids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub i64);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for worker ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub i64);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Zone
// ---------------------------------------------------------------------------

/// A registered collection area. Immutable after registration.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: ZoneId,
    /// Unique human-readable name (e.g. "Zone-A1").
    pub name: String,
    /// Ring vertices in the canonical internal (longitude, latitude) order.
    boundary: Vec<Coord<f64>>,
}

impl Zone {
    pub(crate) fn new(id: ZoneId, name: String, boundary: Vec<Coord<f64>>) -> Self {
        Self { id, name, boundary }
    }

    /// Ring vertices in the canonical internal (longitude, latitude) order.
    pub fn boundary(&self) -> &[Coord<f64>] {
        &self.boundary
    }

    /// Ring vertices converted back to the external (latitude, longitude)
    /// convention, for rendering.
    pub fn boundary_latlon(&self) -> Vec<[f64; 2]> {
        self.boundary.iter().map(|c| [c.y, c.x]).collect()
    }

    /// The closed polygon used for containment tests.
    pub(crate) fn polygon(&self) -> Polygon<f64> {
        Polygon::new(LineString::from(self.boundary.clone()), vec![])
    }
}

/// Convert a boundary from the external `[latitude, longitude]` vertex
/// convention to the internal (longitude, latitude) coordinate order.
///
/// The swap is a correctness requirement: mixing orderings produces silently
/// wrong containment results.
pub(crate) fn boundary_from_latlon(vertices: &[[f64; 2]]) -> Vec<Coord<f64>> {
    vertices
        .iter()
        .map(|&[lat, lon]| Coord { x: lon, y: lat })
        .collect()
}

// ---------------------------------------------------------------------------
// Ping
// ---------------------------------------------------------------------------

/// A single worker location observation.
#[derive(Debug, Clone)]
pub struct Ping {
    pub worker_id: WorkerId,
    /// Position in the internal (longitude, latitude) coordinate order.
    pub location: Point<f64>,
    /// When the observation was made. The transport fills receipt time
    /// when the device supplies none.
    pub recorded_at: DateTime<Utc>,
}

impl Ping {
    /// Build a ping from externally-ordered (latitude, longitude) input.
    pub fn at_latlon(worker_id: WorkerId, lat: f64, lon: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            location: Point::new(lon, lat),
            recorded_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker state
// ---------------------------------------------------------------------------

/// The engine's memory of a single worker. Created lazily on first ping,
/// mutated only by the engine, never destroyed.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerState {
    pub worker_id: WorkerId,
    /// `None` means "outside all zones". The zone reference is weak: a
    /// dangling id is tolerated and treated as outside.
    pub occupancy: Option<Occupancy>,
}

/// "Inside zone Z since time T". Both halves travel together; a worker is
/// never inside a zone without an entry time or vice versa.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupancy {
    pub zone_id: ZoneId,
    pub entered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Collection event
// ---------------------------------------------------------------------------

/// A ledger entry: service of a zone inferred from qualifying dwell.
/// At most one exists per (zone, UTC calendar day). References the zone
/// only; the system records zone service, not worker attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEvent {
    pub zone_id: ZoneId,
    pub serviced_at: DateTime<Utc>,
    pub status: String,
}
