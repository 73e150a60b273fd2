//! Automatic UTM zone selection and planar area on the WGS84 ellipsoid.
//!
//! Zone = floor((lon + 180) / 6) + 1; EPSG 326zz north of the equator
//! (lat ≥ 0), 327zz south of it. Forward projection is the Snyder (1987)
//! transverse Mercator series, accurate to well under a metre inside a zone.

use geo::{Area, Coord, MapCoords, MultiPolygon};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone plus hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    /// 1–60.
    pub zone: u8,
    pub south: bool,
}

impl UtmZone {
    /// Zone containing (lon, lat).
    pub fn for_lon_lat(lon: f64, lat: f64) -> Self {
        let zone = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u8;
        Self { zone, south: lat < 0.0 }
    }

    pub fn epsg(&self) -> u32 {
        let base = if self.south { 32_700 } else { 32_600 };
        base + self.zone as u32
    }

    /// Central meridian in degrees.
    pub fn central_meridian(&self) -> f64 {
        (self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// Project (lon, lat) degrees to (easting, northing) metres.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let e2 = WGS84_F * (2.0 - WGS84_F);
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let ep2 = e2 / (1.0 - e2);

        let phi = lat.to_radians();
        let dlambda = (lon - self.central_meridian()).to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = cos_phi * dlambda;

        // Meridional arc length.
        let m = WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = K0
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
            + FALSE_EASTING;
        let mut y = K0
            * (m + n
                * tan_phi
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));
        if self.south {
            y += FALSE_NORTHING_SOUTH;
        }
        (x, y)
    }
}

/// Planar area in m² of a WGS84 multipolygon, projected into `zone`.
pub fn planar_area_m2(mp: &MultiPolygon<f64>, zone: UtmZone) -> f64 {
    mp.map_coords(|c| {
        let (x, y) = zone.project(c.x, c.y);
        Coord { x, y }
    })
    .unsigned_area()
}
