//! 4-D airspace volumes
//!
//! A `Volume4D` pairs a polygonal footprint with an altitude band and a time
//! window. The spatial part is reduced to a cell covering for indexing; the
//! temporal part is compared directly in queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DssError, DssResult};
use crate::geo::{self, CellUnion, LatLng};

/// Polygon vertex in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Closed polygonal loop on the sphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    pub vertices: Vec<LatLngPoint>,
}

impl GeoPolygon {
    /// Deterministic cell covering of the loop interior.
    pub fn calculate_covering(&self) -> DssResult<CellUnion> {
        let vertices: Vec<LatLng> = self
            .vertices
            .iter()
            .map(|v| LatLng::from_degrees(v.lat, v.lng))
            .collect();
        geo::covering(&vertices)
    }
}

/// Footprint plus altitude band. Altitudes in meters WGS84; `None` leaves
/// the bound open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume3D {
    pub footprint: GeoPolygon,
    pub altitude_lo: Option<f32>,
    pub altitude_hi: Option<f32>,
}

/// Spatial volume plus time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume4D {
    pub spatial_volume: Volume3D,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Volume4D {
    /// Validates the §3 invariants: time ordering and altitude ordering.
    pub fn validate(&self) -> DssResult<()> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end < start {
                return Err(DssError::BadRequest(
                    "Volume time_end must not precede time_start".to_string(),
                ));
            }
        }
        if let (Some(lo), Some(hi)) = (self.spatial_volume.altitude_lo, self.spatial_volume.altitude_hi)
        {
            if lo > hi {
                return Err(DssError::BadRequest(
                    "Volume altitude_lo must not exceed altitude_hi".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Covering of the spatial footprint.
    pub fn calculate_spatial_covering(&self) -> DssResult<CellUnion> {
        self.spatial_volume.footprint.calculate_covering()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn volume(start_offset_min: i64, end_offset_min: i64) -> Volume4D {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        Volume4D {
            spatial_volume: Volume3D {
                footprint: GeoPolygon {
                    vertices: vec![
                        LatLngPoint { lat: 37.427636, lng: -122.170502 },
                        LatLngPoint { lat: 37.408799, lng: -122.064069 },
                        LatLngPoint { lat: 37.421265, lng: -122.086504 },
                    ],
                },
                altitude_lo: Some(0.0),
                altitude_hi: Some(120.0),
            },
            start_time: Some(base + chrono::Duration::minutes(start_offset_min)),
            end_time: Some(base + chrono::Duration::minutes(end_offset_min)),
        }
    }

    #[test]
    fn test_validate_accepts_ordered_volume() {
        assert!(volume(0, 60).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_reversed_times() {
        assert!(volume(60, 0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_altitudes() {
        let mut v = volume(0, 60);
        v.spatial_volume.altitude_lo = Some(500.0);
        v.spatial_volume.altitude_hi = Some(100.0);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_covering_matches_geo_module() {
        let v = volume(0, 60);
        let cells = v.calculate_spatial_covering().unwrap();
        assert_eq!(cells.len(), 20);
    }

    #[test]
    fn test_volume_json_roundtrip() {
        let v = volume(0, 60);
        let encoded = serde_json::to_string(&v).unwrap();
        let decoded: Volume4D = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, v);
    }
}
