use crate::{GisError, Result};

/// WGS 84 well-known ID.
pub const WGS84_WKID: u32 = 4326;

const KM_PER_DEGREE: f64 = 111.0;

/// Axis-aligned envelope in a caller-supplied spatial reference.
///
/// `min_x <= max_x` (longitude) and `min_y <= max_y` (latitude) hold for
/// every constructed value; misordered corners are rejected, never swapped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    wkid: u32,
}

impl BoundingBox {
    /// Creates a WGS 84 envelope.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        Self::with_wkid(min_x, min_y, max_x, max_y, WGS84_WKID)
    }

    /// Creates an envelope in the spatial reference `wkid`.
    ///
    /// Degree ranges are only enforced for WGS 84; coordinates are sent
    /// as given for both `inSR` and `outSR`.
    pub fn with_wkid(min_x: f64, min_y: f64, max_x: f64, max_y: f64, wkid: u32) -> Result<Self> {
        for (name, value, limit) in [
            ("min_x", min_x, 180.0),
            ("max_x", max_x, 180.0),
            ("min_y", min_y, 90.0),
            ("max_y", max_y, 90.0),
        ] {
            if !value.is_finite() {
                return Err(GisError::InvalidBoundingBox(format!(
                    "{name} must be finite, got {value}"
                )));
            }
            if wkid == WGS84_WKID && value.abs() > limit {
                return Err(GisError::InvalidBoundingBox(format!(
                    "{name} must be within [-{limit}, {limit}], got {value}"
                )));
            }
        }
        if min_x > max_x {
            return Err(GisError::InvalidBoundingBox(format!(
                "min_x ({min_x}) is greater than max_x ({max_x})"
            )));
        }
        if min_y > max_y {
            return Err(GisError::InvalidBoundingBox(format!(
                "min_y ({min_y}) is greater than max_y ({max_y})"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
            wkid,
        })
    }

    /// Approximates a square envelope around a point.
    ///
    /// Uses 111 km per degree of latitude, scaled by `cos(lat)` for
    /// longitude. Good enough for areas of a few kilometers.
    pub fn from_center_radius(center_lat: f64, center_lon: f64, radius_km: f64) -> Result<Self> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(GisError::InvalidBoundingBox(format!(
                "radius must be positive, got {radius_km}"
            )));
        }
        let lat_delta = radius_km / KM_PER_DEGREE;
        let lon_delta = radius_km / (KM_PER_DEGREE * center_lat.to_radians().cos());
        Self::new(
            center_lon - lon_delta,
            center_lat - lat_delta,
            center_lon + lon_delta,
            center_lat + lat_delta,
        )
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn wkid(&self) -> u32 {
        self.wkid
    }

    /// Esri envelope string: `minX,minY,maxX,maxY`.
    pub fn to_envelope(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }

    pub fn to_wkt(&self) -> String {
        format!(
            "POLYGON(({min_x} {min_y}, {max_x} {min_y}, {max_x} {max_y}, {min_x} {max_y}, {min_x} {min_y}))",
            min_x = self.min_x,
            min_y = self.min_y,
            max_x = self.max_x,
            max_y = self.max_y,
        )
    }
}
