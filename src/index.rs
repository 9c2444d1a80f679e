//! In-memory zone index: which registered zone contains a point.
//!
//! A linear scan in registration order. Zones are assumed non-overlapping by
//! convention; overlap is tolerated, not rejected, and the first registered
//! zone wins deterministically. Containment is boundary-inclusive: a point
//! exactly on the ring counts as inside.

use geo::{Coord, Intersects, Point, Polygon};

use crate::error::{Error, Result};
use crate::model::{Zone, ZoneId};

/// Read-mostly set of registered zone polygons, in registration order.
#[derive(Debug, Default)]
pub struct ZoneIndex {
    zones: Vec<IndexedZone>,
}

#[derive(Debug)]
struct IndexedZone {
    id: ZoneId,
    polygon: Polygon<f64>,
}

impl ZoneIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a boundary before registration: at least 3 distinct vertices,
    /// all coordinates finite. A closed ring repeating its first vertex at
    /// the end still counts 3 distinct ones.
    pub fn validate(boundary: &[Coord<f64>]) -> Result<()> {
        if boundary.len() < 3 {
            return Err(Error::InvalidBoundary(format!(
                "need at least 3 vertices, got {}",
                boundary.len()
            )));
        }
        if boundary
            .iter()
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(Error::InvalidBoundary(
                "vertex coordinates must be finite numbers".to_string(),
            ));
        }
        let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(boundary.len());
        for &c in boundary {
            if !distinct.contains(&c) {
                distinct.push(c);
            }
        }
        if distinct.len() < 3 {
            return Err(Error::InvalidBoundary(format!(
                "need at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }
        Ok(())
    }

    /// Add a zone. The boundary must already have passed [`Self::validate`].
    pub fn insert(&mut self, zone: &Zone) {
        self.zones.push(IndexedZone {
            id: zone.id,
            polygon: zone.polygon(),
        });
    }

    /// Resolve the containing zone for a point, if any. First registered
    /// zone wins when more than one contains the point.
    ///
    /// `Intersects` rather than `Contains`: the former includes the ring
    /// itself, giving boundary-touching points a home.
    pub fn locate(&self, point: Point<f64>) -> Option<ZoneId> {
        self.zones
            .iter()
            .find(|z| z.polygon.intersects(&point))
            .map(|z| z.id)
    }

    /// Whether a zone id is (still) registered. Worker state may carry a
    /// dangling id; callers treat an unknown id as "outside".
    pub fn contains_zone(&self, id: ZoneId) -> bool {
        self.zones.iter().any(|z| z.id == id)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Zone;

    fn square(id: i64, x0: f64, y0: f64, x1: f64, y1: f64) -> Zone {
        Zone::new(
            ZoneId(id),
            format!("zone-{id}"),
            vec![
                Coord { x: x0, y: y0 },
                Coord { x: x1, y: y0 },
                Coord { x: x1, y: y1 },
                Coord { x: x0, y: y1 },
            ],
        )
    }

    #[test]
    fn locates_interior_points_and_rejects_exterior() {
        let mut index = ZoneIndex::new();
        index.insert(&square(1, 0.0, 0.0, 4.0, 4.0));

        assert_eq!(index.locate(Point::new(2.0, 2.0)), Some(ZoneId(1)));
        assert_eq!(index.locate(Point::new(5.0, 5.0)), None);
        assert_eq!(index.locate(Point::new(-0.1, 2.0)), None);
    }

    #[test]
    fn boundary_touching_points_are_contained() {
        let mut index = ZoneIndex::new();
        index.insert(&square(1, 0.0, 0.0, 4.0, 4.0));

        // On an edge and on a vertex.
        assert_eq!(index.locate(Point::new(2.0, 0.0)), Some(ZoneId(1)));
        assert_eq!(index.locate(Point::new(4.0, 4.0)), Some(ZoneId(1)));
    }

    #[test]
    fn overlap_resolves_to_first_registered() {
        let mut index = ZoneIndex::new();
        index.insert(&square(1, 0.0, 0.0, 4.0, 4.0));
        index.insert(&square(2, 2.0, 0.0, 6.0, 4.0));

        // Inside both; earlier registration wins, repeatably.
        for _ in 0..3 {
            assert_eq!(index.locate(Point::new(3.0, 2.0)), Some(ZoneId(1)));
        }
        // Inside only the second.
        assert_eq!(index.locate(Point::new(5.0, 2.0)), Some(ZoneId(2)));
    }

    #[test]
    fn validate_rejects_degenerate_boundaries() {
        let too_few = [Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }];
        assert!(matches!(
            ZoneIndex::validate(&too_few),
            Err(Error::InvalidBoundary(_))
        ));

        let not_finite = [
            Coord { x: 0.0, y: 0.0 },
            Coord {
                x: f64::NAN,
                y: 0.0,
            },
            Coord { x: 1.0, y: 1.0 },
        ];
        assert!(matches!(
            ZoneIndex::validate(&not_finite),
            Err(Error::InvalidBoundary(_))
        ));

        // Four vertices, only two distinct.
        let collapsed = [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ];
        assert!(matches!(
            ZoneIndex::validate(&collapsed),
            Err(Error::InvalidBoundary(_))
        ));
    }

    #[test]
    fn validate_accepts_closed_ring() {
        // Explicitly closed ring: first vertex repeated at the end.
        let ring = [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 4.0, y: 0.0 },
            Coord { x: 4.0, y: 4.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        assert!(ZoneIndex::validate(&ring).is_ok());
    }

    #[test]
    fn dangling_zone_id_is_not_contained() {
        let mut index = ZoneIndex::new();
        index.insert(&square(1, 0.0, 0.0, 4.0, 4.0));

        assert!(index.contains_zone(ZoneId(1)));
        assert!(!index.contains_zone(ZoneId(999)));
    }
}
