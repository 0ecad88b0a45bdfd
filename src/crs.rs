//! # Coordinate Reference Frames
//!
//! Describes how the `(x, y)` axis pair of a [`GriddedField`](crate::field::GriddedField)
//! maps onto the Earth. Three CF grid mappings are supported:
//!
//! - `latitude_longitude`: plain geographic grid, x = longitude, y = latitude
//! - `rotated_latitude_longitude`: rotated-pole grid in degrees
//! - `lambert_azimuthal_equal_area`: projected grid in metres (UKV)
//!
//! All conversions go through geographic coordinates (degrees). Projected
//! frames use spherical formulas with the frame's Earth radius.

use crate::error::{RegridError, Result};
use std::fmt;

/// Earth radius used by the Met Office UKV model (metres)
pub const DEFAULT_EARTH_RADIUS: f64 = 6_371_229.0;

/// A CF attribute value attached to a grid mapping variable
#[derive(Debug, Clone, PartialEq)]
pub enum CfValue {
    Text(String),
    Number(f64),
}

/// Coordinate reference frame of a field's axis pair.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateReferenceFrame {
    /// Plain latitude/longitude grid
    Geographic { earth_radius: f64 },
    /// Rotated-pole latitude/longitude grid
    RotatedPole {
        grid_north_pole_latitude: f64,
        grid_north_pole_longitude: f64,
        north_pole_grid_longitude: f64,
        earth_radius: f64,
    },
    /// Lambert azimuthal equal-area projection, x/y in metres
    LambertAzimuthalEqualArea {
        latitude_of_projection_origin: f64,
        longitude_of_projection_origin: f64,
        false_easting: f64,
        false_northing: f64,
        earth_radius: f64,
    },
}

impl Default for CoordinateReferenceFrame {
    fn default() -> Self {
        CoordinateReferenceFrame::geographic()
    }
}

impl fmt::Display for CoordinateReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateReferenceFrame::Geographic { earth_radius } => {
                write!(f, "geographic (R={} m)", earth_radius)
            }
            CoordinateReferenceFrame::RotatedPole {
                grid_north_pole_latitude,
                grid_north_pole_longitude,
                ..
            } => write!(
                f,
                "rotated pole (pole at {}°N, {}°E)",
                grid_north_pole_latitude, grid_north_pole_longitude
            ),
            CoordinateReferenceFrame::LambertAzimuthalEqualArea {
                latitude_of_projection_origin,
                longitude_of_projection_origin,
                ..
            } => write!(
                f,
                "lambert azimuthal equal-area (origin {}°N, {}°E)",
                latitude_of_projection_origin, longitude_of_projection_origin
            ),
        }
    }
}

impl CoordinateReferenceFrame {
    /// Geographic frame on the default sphere.
    pub fn geographic() -> Self {
        CoordinateReferenceFrame::Geographic {
            earth_radius: DEFAULT_EARTH_RADIUS,
        }
    }

    /// The projection used by the UKV 2 km standard grid.
    pub fn ukv_laea() -> Self {
        CoordinateReferenceFrame::LambertAzimuthalEqualArea {
            latitude_of_projection_origin: 54.9,
            longitude_of_projection_origin: -2.5,
            false_easting: 0.0,
            false_northing: 0.0,
            earth_radius: DEFAULT_EARTH_RADIUS,
        }
    }

    /// Builds a frame from the attributes of a CF grid mapping variable.
    ///
    /// `attr` looks up numeric attributes by name. Missing optional
    /// parameters fall back to their CF defaults; a missing required one is
    /// a format error.
    pub fn from_cf<F>(grid_mapping_name: &str, attr: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let earth_radius = attr("earth_radius")
            .or_else(|| attr("semi_major_axis"))
            .unwrap_or(DEFAULT_EARTH_RADIUS);
        let required = |name: &str| {
            attr(name).ok_or_else(|| {
                RegridError::format(format!(
                    "grid mapping '{}' is missing attribute '{}'",
                    grid_mapping_name, name
                ))
            })
        };

        match grid_mapping_name {
            "latitude_longitude" => Ok(CoordinateReferenceFrame::Geographic { earth_radius }),
            "rotated_latitude_longitude" => Ok(CoordinateReferenceFrame::RotatedPole {
                grid_north_pole_latitude: required("grid_north_pole_latitude")?,
                grid_north_pole_longitude: required("grid_north_pole_longitude")?,
                north_pole_grid_longitude: attr("north_pole_grid_longitude").unwrap_or(0.0),
                earth_radius,
            }),
            "lambert_azimuthal_equal_area" => {
                Ok(CoordinateReferenceFrame::LambertAzimuthalEqualArea {
                    latitude_of_projection_origin: required("latitude_of_projection_origin")?,
                    longitude_of_projection_origin: required("longitude_of_projection_origin")?,
                    false_easting: attr("false_easting").unwrap_or(0.0),
                    false_northing: attr("false_northing").unwrap_or(0.0),
                    earth_radius,
                })
            }
            other => Err(RegridError::format(format!(
                "unsupported grid mapping '{}'",
                other
            ))),
        }
    }

    /// CF grid mapping name of this frame.
    pub fn grid_mapping_name(&self) -> &'static str {
        match self {
            CoordinateReferenceFrame::Geographic { .. } => "latitude_longitude",
            CoordinateReferenceFrame::RotatedPole { .. } => "rotated_latitude_longitude",
            CoordinateReferenceFrame::LambertAzimuthalEqualArea { .. } => {
                "lambert_azimuthal_equal_area"
            }
        }
    }

    /// Attributes describing this frame on a CF grid mapping variable.
    pub fn cf_attributes(&self) -> Vec<(&'static str, CfValue)> {
        let mut attrs = vec![(
            "grid_mapping_name",
            CfValue::Text(self.grid_mapping_name().to_string()),
        )];
        match self {
            CoordinateReferenceFrame::Geographic { earth_radius } => {
                attrs.push(("earth_radius", CfValue::Number(*earth_radius)));
            }
            CoordinateReferenceFrame::RotatedPole {
                grid_north_pole_latitude,
                grid_north_pole_longitude,
                north_pole_grid_longitude,
                earth_radius,
            } => {
                attrs.push((
                    "grid_north_pole_latitude",
                    CfValue::Number(*grid_north_pole_latitude),
                ));
                attrs.push((
                    "grid_north_pole_longitude",
                    CfValue::Number(*grid_north_pole_longitude),
                ));
                attrs.push((
                    "north_pole_grid_longitude",
                    CfValue::Number(*north_pole_grid_longitude),
                ));
                attrs.push(("earth_radius", CfValue::Number(*earth_radius)));
            }
            CoordinateReferenceFrame::LambertAzimuthalEqualArea {
                latitude_of_projection_origin,
                longitude_of_projection_origin,
                false_easting,
                false_northing,
                earth_radius,
            } => {
                attrs.push((
                    "latitude_of_projection_origin",
                    CfValue::Number(*latitude_of_projection_origin),
                ));
                attrs.push((
                    "longitude_of_projection_origin",
                    CfValue::Number(*longitude_of_projection_origin),
                ));
                attrs.push(("false_easting", CfValue::Number(*false_easting)));
                attrs.push(("false_northing", CfValue::Number(*false_northing)));
                attrs.push(("earth_radius", CfValue::Number(*earth_radius)));
            }
        }
        attrs
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, CoordinateReferenceFrame::Geographic { .. })
    }

    pub fn earth_radius(&self) -> f64 {
        match self {
            CoordinateReferenceFrame::Geographic { earth_radius }
            | CoordinateReferenceFrame::RotatedPole { earth_radius, .. }
            | CoordinateReferenceFrame::LambertAzimuthalEqualArea { earth_radius, .. } => {
                *earth_radius
            }
        }
    }

    /// Converts native `(x, y)` coordinates to geographic `(lon, lat)` degrees.
    ///
    /// The geographic frame is the identity. Projected frames return
    /// longitudes in [-180, 180). `None` when the point has no geographic
    /// position (outside the projection's disc).
    pub fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        match self {
            CoordinateReferenceFrame::Geographic { .. } => Some((x, y)),
            CoordinateReferenceFrame::RotatedPole {
                grid_north_pole_latitude,
                grid_north_pole_longitude,
                north_pole_grid_longitude,
                ..
            } => {
                let (lon, lat) = unrotate(
                    x - north_pole_grid_longitude,
                    y,
                    *grid_north_pole_latitude,
                    *grid_north_pole_longitude,
                );
                Some((normalize_longitude(lon), lat))
            }
            CoordinateReferenceFrame::LambertAzimuthalEqualArea {
                latitude_of_projection_origin,
                longitude_of_projection_origin,
                false_easting,
                false_northing,
                earth_radius,
            } => laea_inverse(
                x - false_easting,
                y - false_northing,
                *latitude_of_projection_origin,
                *longitude_of_projection_origin,
                *earth_radius,
            )
            .map(|(lon, lat)| (normalize_longitude(lon), lat)),
        }
    }

    /// Converts geographic `(lon, lat)` degrees to native `(x, y)` coordinates.
    ///
    /// `None` when the point cannot be represented (e.g. the antipode of a
    /// Lambert azimuthal projection origin).
    pub fn from_geographic(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > 90.0 {
            return None;
        }
        match self {
            CoordinateReferenceFrame::Geographic { .. } => Some((lon, lat)),
            CoordinateReferenceFrame::RotatedPole {
                grid_north_pole_latitude,
                grid_north_pole_longitude,
                north_pole_grid_longitude,
                ..
            } => {
                let (rlon, rlat) =
                    rotate(lon, lat, *grid_north_pole_latitude, *grid_north_pole_longitude);
                Some((normalize_longitude(rlon + north_pole_grid_longitude), rlat))
            }
            CoordinateReferenceFrame::LambertAzimuthalEqualArea {
                latitude_of_projection_origin,
                longitude_of_projection_origin,
                false_easting,
                false_northing,
                earth_radius,
            } => laea_forward(
                lon,
                lat,
                *latitude_of_projection_origin,
                *longitude_of_projection_origin,
                *earth_radius,
            )
            .map(|(x, y)| (x + false_easting, y + false_northing)),
        }
    }

    /// Converts native coordinates of `self` into native coordinates of `other`.
    pub fn transform_to(&self, other: &CoordinateReferenceFrame, x: f64, y: f64) -> Option<(f64, f64)> {
        if self == other {
            return Some((x, y));
        }
        let (lon, lat) = self.to_geographic(x, y)?;
        other.from_geographic(lon, lat)
    }
}

/// Wraps a longitude into [-180, 180).
pub fn normalize_longitude(lon: f64) -> f64 {
    wrap_longitude(lon, -180.0)
}

/// Wraps a longitude into the 360° window `[base, base + 360)`.
pub fn wrap_longitude(lon: f64, base: f64) -> f64 {
    let wrapped = (lon - base).rem_euclid(360.0) + base;
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= base + 360.0 { wrapped - 360.0 } else { wrapped }
}

/// Geographic -> rotated-pole, all in degrees.
fn rotate(lon: f64, lat: f64, pole_lat: f64, pole_lon: f64) -> (f64, f64) {
    let theta = (90.0 - pole_lat).to_radians();
    let lon0 = pole_lon + 180.0;
    let (lat_r, dlon_r) = (lat.to_radians(), (lon - lon0).to_radians());

    let x = lat_r.cos() * dlon_r.cos();
    let y = lat_r.cos() * dlon_r.sin();
    let z = lat_r.sin();

    let xr = theta.cos() * x + theta.sin() * z;
    let zr = -theta.sin() * x + theta.cos() * z;

    let rlat = zr.clamp(-1.0, 1.0).asin().to_degrees();
    let rlon = y.atan2(xr).to_degrees();
    (rlon, rlat)
}

/// Rotated-pole -> geographic, all in degrees.
fn unrotate(rlon: f64, rlat: f64, pole_lat: f64, pole_lon: f64) -> (f64, f64) {
    let theta = (90.0 - pole_lat).to_radians();
    let lon0 = pole_lon + 180.0;
    let (rlat_r, rlon_r) = (rlat.to_radians(), rlon.to_radians());

    let xr = rlat_r.cos() * rlon_r.cos();
    let y = rlat_r.cos() * rlon_r.sin();
    let zr = rlat_r.sin();

    let x = theta.cos() * xr - theta.sin() * zr;
    let z = theta.sin() * xr + theta.cos() * zr;

    let lat = z.clamp(-1.0, 1.0).asin().to_degrees();
    let lon = y.atan2(x).to_degrees() + lon0;
    (lon, lat)
}

/// Spherical Lambert azimuthal equal-area, forward (Snyder 24-2..24-4).
fn laea_forward(lon: f64, lat: f64, lat0: f64, lon0: f64, radius: f64) -> Option<(f64, f64)> {
    let (phi, phi0) = (lat.to_radians(), lat0.to_radians());
    let dlambda = (lon - lon0).to_radians();

    let denom = 1.0 + phi0.sin() * phi.sin() + phi0.cos() * phi.cos() * dlambda.cos();
    if denom <= 1e-12 {
        return None;
    }
    let k = (2.0 / denom).sqrt();
    let x = radius * k * phi.cos() * dlambda.sin();
    let y = radius * k * (phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * dlambda.cos());
    Some((x, y))
}

/// Spherical Lambert azimuthal equal-area, inverse (Snyder 24-16..24-18).
fn laea_inverse(x: f64, y: f64, lat0: f64, lon0: f64, radius: f64) -> Option<(f64, f64)> {
    let rho = x.hypot(y);
    if rho < 1e-9 {
        return Some((lon0, lat0));
    }
    let ratio = rho / (2.0 * radius);
    if ratio > 1.0 {
        return None;
    }
    let c = 2.0 * ratio.asin();
    let phi0 = lat0.to_radians();

    let lat = (c.cos() * phi0.sin() + y * c.sin() * phi0.cos() / rho)
        .clamp(-1.0, 1.0)
        .asin();
    let lon = lon0.to_radians()
        + (x * c.sin()).atan2(rho * phi0.cos() * c.cos() - y * phi0.sin() * c.sin());
    Some((lon.to_degrees(), lat.to_degrees()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{} != {} (tol {})", a, b, tol);
    }

    #[test]
    fn test_geographic_is_identity() {
        let crs = CoordinateReferenceFrame::geographic();
        assert_eq!(crs.to_geographic(350.0, 10.0), Some((350.0, 10.0)));
        assert_eq!(crs.from_geographic(-0.1, 51.5), Some((-0.1, 51.5)));
        assert!(crs.from_geographic(0.0, 91.0).is_none());
    }

    #[test]
    fn test_laea_origin_maps_to_false_origin() {
        let crs = CoordinateReferenceFrame::LambertAzimuthalEqualArea {
            latitude_of_projection_origin: 54.9,
            longitude_of_projection_origin: -2.5,
            false_easting: 1000.0,
            false_northing: -500.0,
            earth_radius: DEFAULT_EARTH_RADIUS,
        };
        let (x, y) = crs.from_geographic(-2.5, 54.9).unwrap();
        assert_close(x, 1000.0, 1e-6);
        assert_close(y, -500.0, 1e-6);

        let (lon, lat) = crs.to_geographic(1000.0, -500.0).unwrap();
        assert_close(lon, -2.5, 1e-9);
        assert_close(lat, 54.9, 1e-9);
    }

    #[test]
    fn test_laea_matches_published_sphere_example() {
        // Snyder, Map Projections: A Working Manual, p. 333
        let crs = CoordinateReferenceFrame::LambertAzimuthalEqualArea {
            latitude_of_projection_origin: 40.0,
            longitude_of_projection_origin: -100.0,
            false_easting: 0.0,
            false_northing: 0.0,
            earth_radius: 3.0,
        };
        let (x, y) = crs.from_geographic(100.0, -20.0).unwrap();
        assert_close(x, -4.2339303, 1e-7);
        assert_close(y, 4.0257775, 1e-7);

        let (lon, lat) = crs.to_geographic(x, y).unwrap();
        assert_close(lon, 100.0, 1e-9);
        assert_close(lat, -20.0, 1e-9);
    }

    #[test]
    fn test_laea_round_trip_over_uk() {
        let crs = CoordinateReferenceFrame::ukv_laea();
        for &(lon, lat) in &[(-0.1278, 51.5074), (-6.26, 53.35), (-3.19, 55.95), (1.3, 52.6)] {
            let (x, y) = crs.from_geographic(lon, lat).unwrap();
            let (lon2, lat2) = crs.to_geographic(x, y).unwrap();
            assert_close(lon2, lon, 1e-9);
            assert_close(lat2, lat, 1e-9);
        }
    }

    #[test]
    fn test_laea_london_is_south_east_of_origin() {
        let crs = CoordinateReferenceFrame::ukv_laea();
        let (x, y) = crs.from_geographic(-0.1278, 51.5074).unwrap();
        // ~165 km east, ~375 km south of the projection origin
        assert!(x > 100_000.0 && x < 250_000.0, "x = {}", x);
        assert!(y < -300_000.0 && y > -450_000.0, "y = {}", y);
    }

    #[test]
    fn test_laea_antipode_is_undefined() {
        let crs = CoordinateReferenceFrame::LambertAzimuthalEqualArea {
            latitude_of_projection_origin: 0.0,
            longitude_of_projection_origin: 0.0,
            false_easting: 0.0,
            false_northing: 0.0,
            earth_radius: DEFAULT_EARTH_RADIUS,
        };
        assert!(crs.from_geographic(180.0, 0.0).is_none());
        assert!(crs.to_geographic(3.0 * DEFAULT_EARTH_RADIUS, 0.0).is_none());
    }

    #[test]
    fn test_rotated_pole_round_trip() {
        let crs = CoordinateReferenceFrame::RotatedPole {
            grid_north_pole_latitude: 37.5,
            grid_north_pole_longitude: 177.5,
            north_pole_grid_longitude: 0.0,
            earth_radius: DEFAULT_EARTH_RADIUS,
        };
        for &(lon, lat) in &[(-0.1278, 51.5074), (-10.0, 49.0), (2.0, 60.0)] {
            let (rx, ry) = crs.from_geographic(lon, lat).unwrap();
            let (lon2, lat2) = crs.to_geographic(rx, ry).unwrap();
            assert_close(lon2, lon, 1e-9);
            assert_close(lat2, lat, 1e-9);
        }
    }

    #[test]
    fn test_rotated_pole_true_pole_and_grid_pole() {
        let crs = CoordinateReferenceFrame::RotatedPole {
            grid_north_pole_latitude: 37.5,
            grid_north_pole_longitude: 177.5,
            north_pole_grid_longitude: 0.0,
            earth_radius: DEFAULT_EARTH_RADIUS,
        };
        // The rotated north pole is the geographic point (177.5E, 37.5N)
        let (_, rlat) = crs.from_geographic(177.5, 37.5).unwrap();
        assert_close(rlat, 90.0, 1e-9);

        // The UK sits close to the rotated equator
        let (rlon, rlat) = crs.from_geographic(-0.1278, 51.5074).unwrap();
        assert!(rlat.abs() < 5.0, "rlat = {}", rlat);
        assert!(rlon.abs() < 5.0, "rlon = {}", rlon);
    }

    #[test]
    fn test_transform_between_frames() {
        let laea = CoordinateReferenceFrame::ukv_laea();
        let geo = CoordinateReferenceFrame::geographic();
        let (x, y) = geo.transform_to(&laea, -0.1278, 51.5074).unwrap();
        let (lon, lat) = laea.transform_to(&geo, x, y).unwrap();
        assert_close(lon, -0.1278, 1e-9);
        assert_close(lat, 51.5074, 1e-9);

        // Equal frames never touch the coordinates
        assert_eq!(laea.transform_to(&laea, 12.5, -7.25), Some((12.5, -7.25)));
    }

    #[test]
    fn test_wrap_longitude() {
        assert_close(normalize_longitude(190.0), -170.0, 1e-12);
        assert_close(normalize_longitude(-180.0), -180.0, 1e-12);
        assert_close(normalize_longitude(180.0), -180.0, 1e-12);
        assert_close(wrap_longitude(-10.0, 0.0), 350.0, 1e-12);
        assert_close(wrap_longitude(370.0, 0.0), 10.0, 1e-12);
    }

    #[test]
    fn test_from_cf_attributes() {
        let attrs = |name: &str| match name {
            "latitude_of_projection_origin" => Some(54.9),
            "longitude_of_projection_origin" => Some(-2.5),
            "earth_radius" => Some(6371229.0),
            _ => None,
        };
        let crs = CoordinateReferenceFrame::from_cf("lambert_azimuthal_equal_area", attrs).unwrap();
        assert_eq!(crs, CoordinateReferenceFrame::ukv_laea());

        let missing = CoordinateReferenceFrame::from_cf("rotated_latitude_longitude", |_| None);
        assert!(matches!(missing, Err(RegridError::Format(_))));

        let unknown = CoordinateReferenceFrame::from_cf("mercator", |_| None);
        assert!(matches!(unknown, Err(RegridError::Format(_))));
    }

    #[test]
    fn test_cf_attributes_round_trip() {
        let crs = CoordinateReferenceFrame::RotatedPole {
            grid_north_pole_latitude: 37.5,
            grid_north_pole_longitude: 177.5,
            north_pole_grid_longitude: 0.0,
            earth_radius: DEFAULT_EARTH_RADIUS,
        };
        let attrs = crs.cf_attributes();
        let lookup = |name: &str| {
            attrs.iter().find(|(n, _)| *n == name).and_then(|(_, v)| match v {
                CfValue::Number(x) => Some(*x),
                CfValue::Text(_) => None,
            })
        };
        let parsed = CoordinateReferenceFrame::from_cf(crs.grid_mapping_name(), lookup).unwrap();
        assert_eq!(parsed, crs);
    }
}
