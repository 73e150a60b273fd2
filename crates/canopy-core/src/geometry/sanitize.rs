//! Normalises arbitrary input polygons into the form the provider accepts.
//!
//!   1. invalid input is repaired by boolean self-union (zero-buffer equivalent)
//!   2. mixed collections keep only their areal members, re-unioned
//!   3. exterior rings CCW, interior rings CW
//!   4. coordinates rounded to 7 decimal places (~1 cm)
//!
//! `sanitize(sanitize(g)) == sanitize(g)` for every input that survives.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{
    Area, BooleanOps, BoundingRect, Centroid, Coord, Geometry, Line, LineString, MapCoords,
    MultiPolygon, Polygon,
};
use serde_json::{json, Value};

use super::coords::{BBox, LonLat};
use crate::error::{CanopyError, Result};

const ROUND_SCALE: f64 = 1e7;

/// A polygonal geometry that has passed [`sanitize`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderGeometry {
    polygons: MultiPolygon<f64>,
}

impl ProviderGeometry {
    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    pub fn into_inner(self) -> MultiPolygon<f64> {
        self.polygons
    }

    pub fn bounds(&self) -> BBox {
        // Non-empty by construction.
        self.polygons
            .bounding_rect()
            .map(BBox::from_rect)
            .unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }

    pub fn centroid(&self) -> Option<LonLat> {
        self.polygons.centroid().map(|p| LonLat::new(p.x(), p.y()))
    }

    /// GeoJSON geometry object: `Polygon` for a single member, else `MultiPolygon`.
    pub fn to_geojson(&self) -> Value {
        let polygon_coords = |p: &Polygon<f64>| -> Vec<Vec<[f64; 2]>> {
            std::iter::once(p.exterior())
                .chain(p.interiors())
                .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
                .collect()
        };
        if self.polygons.0.len() == 1 {
            json!({ "type": "Polygon", "coordinates": polygon_coords(&self.polygons.0[0]) })
        } else {
            let coords: Vec<_> = self.polygons.0.iter().map(polygon_coords).collect();
            json!({ "type": "MultiPolygon", "coordinates": coords })
        }
    }
}

/// Build a polygon from ring coordinate lists; the first ring is the exterior.
pub fn polygon_from_rings(rings: &[Vec<[f64; 2]>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|r| {
        LineString::new(r.iter().map(|&[x, y]| Coord { x, y }).collect())
    });
    let exterior = rings
        .next()
        .ok_or_else(|| CanopyError::InvalidGeometry("polygon has no rings".into()))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

/// Sanitize `geometry` for the provider. Fails only if nothing areal survives.
pub fn sanitize(geometry: &Geometry<f64>) -> Result<ProviderGeometry> {
    let mut polygons = Vec::new();
    let mixed = collect_polygons(geometry, &mut polygons);
    let mut mp = MultiPolygon::new(polygons);

    if !is_valid(&mp) {
        mp = self_union(&mp);
    }
    if mixed {
        mp = self_union(&mp);
    }
    mp.0.retain(|p| p.unsigned_area() > 0.0);
    if mp.0.is_empty() {
        return Err(CanopyError::InvalidGeometry(
            "no polygonal geometry survived repair".into(),
        ));
    }

    let mp = mp.orient(Direction::Default);
    let mp = round_coords(&mp);
    Ok(ProviderGeometry { polygons: mp })
}

/// Collect areal members into `out`. Returns true when `geometry` was a
/// collection (mixed or not) whose members must be re-unioned.
fn collect_polygons(geometry: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) -> bool {
    match geometry {
        Geometry::Polygon(p) => {
            out.push(p.clone());
            false
        }
        Geometry::MultiPolygon(mp) => {
            out.extend(mp.0.iter().cloned());
            false
        }
        Geometry::Rect(r) => {
            out.push(r.to_polygon());
            false
        }
        Geometry::Triangle(t) => {
            out.push(t.to_polygon());
            false
        }
        Geometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                collect_polygons(g, out);
            }
            true
        }
        _ => false,
    }
}

fn self_union(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    mp.0.iter().fold(MultiPolygon::new(vec![]), |acc, p| {
        acc.union(&MultiPolygon::new(vec![p.clone()]))
    })
}

fn round7(v: f64) -> f64 {
    (v * ROUND_SCALE).round() / ROUND_SCALE
}

/// Round every coordinate, then drop consecutive duplicates the rounding created.
fn round_coords(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let rounded = mp.map_coords(|c| Coord { x: round7(c.x), y: round7(c.y) });
    let dedup = |ring: &LineString<f64>| {
        let mut coords: Vec<Coord<f64>> = ring.0.clone();
        coords.dedup();
        LineString::new(coords)
    };
    MultiPolygon::new(
        rounded
            .0
            .iter()
            .map(|p| Polygon::new(dedup(p.exterior()), p.interiors().iter().map(dedup).collect()))
            .collect(),
    )
}

/// Structural validity: closed rings of ≥ 4 coordinates with non-zero area,
/// no proper crossing and no collinear overlap between segments of a ring.
/// Rings touching themselves at a vertex are accepted.
pub fn is_valid(mp: &MultiPolygon<f64>) -> bool {
    mp.0.iter().all(|p| {
        std::iter::once(p.exterior())
            .chain(p.interiors())
            .all(ring_is_valid)
    })
}

fn ring_is_valid(ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    if coords.len() < 4 || coords.first() != coords.last() {
        return false;
    }
    if Polygon::new(ring.clone(), vec![]).unsigned_area() <= 0.0 {
        return false;
    }
    let segments: Vec<Line<f64>> = ring.lines().collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            match line_intersection(segments[i], segments[j]) {
                Some(LineIntersection::Collinear { .. }) => return false,
                Some(LineIntersection::SinglePoint { is_proper: true, .. }) => return false,
                _ => {}
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, GeometryCollection, Point, Winding};

    fn square_cw() -> Polygon<f64> {
        polygon![
            (x: -62.0, y: -9.0),
            (x: -62.0, y: -8.9),
            (x: -61.9, y: -8.9),
            (x: -61.9, y: -9.0),
            (x: -62.0, y: -9.0),
        ]
    }

    /// Self-intersecting "bow tie".
    fn bow_tie() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]
    }

    #[test]
    fn exterior_rings_become_ccw() {
        let g = sanitize(&Geometry::Polygon(square_cw())).unwrap();
        for p in g.polygons().iter() {
            assert!(p.exterior().is_ccw(), "exterior ring must be counter-clockwise");
        }
    }

    #[test]
    fn interior_rings_become_cw() {
        let outer = polygon![
            exterior: [
                (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0),
            ],
            interiors: [
                [(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0), (x: 2.0, y: 2.0)],
            ],
        ];
        let g = sanitize(&Geometry::Polygon(outer)).unwrap();
        let p = &g.polygons().0[0];
        assert!(p.exterior().is_ccw());
        assert!(p.interiors()[0].is_cw(), "interior ring must be clockwise");
    }

    #[test]
    fn coordinates_rounded_to_seven_places() {
        let p = polygon![
            (x: -62.123456789, y: -9.0),
            (x: -61.9, y: -9.0),
            (x: -61.9, y: -8.987654321),
            (x: -62.123456789, y: -9.0),
        ];
        let g = sanitize(&Geometry::Polygon(p)).unwrap();
        for c in g.polygons().0[0].exterior().coords() {
            assert_eq!(c.x, round7(c.x));
            assert_eq!(c.y, round7(c.y));
        }
        assert!(g.polygons().0[0]
            .exterior()
            .coords()
            .any(|c| (c.x - -62.1234568).abs() < 1e-12));
    }

    #[test]
    fn bow_tie_is_repaired_not_rejected() {
        assert!(!is_valid(&MultiPolygon::new(vec![bow_tie()])));
        let g = sanitize(&Geometry::Polygon(bow_tie())).unwrap();
        assert!(is_valid(g.polygons()));
        assert!(g.polygons().unsigned_area() > 0.0);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = vec![
            Geometry::Polygon(square_cw()),
            Geometry::Polygon(bow_tie()),
            Geometry::GeometryCollection(GeometryCollection(vec![
                Geometry::Polygon(square_cw()),
                Geometry::Point(Point::new(-61.95, -8.95)),
            ])),
        ];
        for g in inputs {
            let once = sanitize(&g).unwrap();
            let twice = sanitize(&Geometry::MultiPolygon(once.polygons().clone())).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn collection_keeps_only_polygons() {
        let gc = Geometry::GeometryCollection(GeometryCollection(vec![
            Geometry::Point(Point::new(0.5, 0.5)),
            Geometry::Polygon(square_cw()),
        ]));
        let g = sanitize(&gc).unwrap();
        assert_eq!(g.polygons().0.len(), 1);
    }

    #[test]
    fn nothing_polygonal_fails() {
        let g = Geometry::Point(Point::new(0.0, 0.0));
        assert!(matches!(sanitize(&g), Err(CanopyError::InvalidGeometry(_))));
    }

    #[test]
    fn geojson_uses_polygon_for_single_member() {
        let g = sanitize(&Geometry::Polygon(square_cw())).unwrap();
        let v = g.to_geojson();
        assert_eq!(v["type"], "Polygon");
        assert_eq!(v["coordinates"][0].as_array().unwrap().len(), 5);
    }
}
