pub mod coords;
pub mod sanitize;
pub mod utm;

pub use coords::{BBox, LonLat, METRES_PER_DEGREE};
pub use sanitize::{polygon_from_rings, sanitize, ProviderGeometry};
pub use utm::{planar_area_m2, UtmZone};

use geo::{BooleanOps, Geometry, LineString, MultiPolygon, Polygon};

use crate::error::Result;

/// Region perimeter derived from parcels alone: the union of all parcels with
/// interior holes dropped, then sanitized.
pub fn region_from_parcels<'a>(
    parcels: impl IntoIterator<Item = &'a Geometry<f64>>,
) -> Result<ProviderGeometry> {
    let mut union = MultiPolygon::new(vec![]);
    for g in parcels {
        // Each parcel is repaired on its own before joining the union.
        let Ok(clean) = sanitize(g) else { continue };
        union = union.union(clean.polygons());
    }
    let outlines: Vec<Polygon<f64>> = union
        .0
        .into_iter()
        .map(|p| Polygon::new(LineString::new(p.exterior().0.clone()), vec![]))
        .collect();
    sanitize(&Geometry::MultiPolygon(MultiPolygon::new(outlines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    #[test]
    fn region_from_adjacent_parcels_is_one_outline() {
        let a = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0),
        ]);
        let b = Geometry::Polygon(polygon![
            (x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0), (x: 1.0, y: 0.0),
        ]);
        let region = region_from_parcels([&a, &b]).unwrap();
        assert_eq!(region.polygons().0.len(), 1);
        assert!((region.polygons().unsigned_area() - 2.0).abs() < 1e-9);
        assert!(region.polygons().0[0].interiors().is_empty());
    }
}
