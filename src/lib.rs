//! # zonetrack
//!
//! Geofence dwell tracking for mobile collection workers.
//!
//! Infers from a stream of GPS pings when a worker has spent enough
//! continuous time inside a registered zone to count the zone as serviced,
//! and logs that at most once per zone per UTC calendar day. The engine is
//! purely reactive: the dwell check fires when a ping shows the worker has
//! left a zone, so no background scheduler is needed.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod index;
pub mod model;
pub mod storage;
pub mod telemetry;
