//! Wire DTOs for the four API surfaces
//!
//! JSON field names keep their schema casing (snake_case, original names).
//! RID v1 serializes times as bare RFC 3339 strings; RID v2 and SCD wrap
//! them in `{value, format}` objects.

pub mod aux;
pub mod rid_v1;
pub mod rid_v2;
pub mod scd;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use dss_core::models::geometry::{GeoPolygon, LatLngPoint};
use dss_core::{DssError, DssResult};

/// Query parameters of the RID search endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub area: String,
    #[serde(default)]
    pub earliest_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_time: Option<DateTime<Utc>>,
}

/// Parses the `area` query parameter: a flat comma-separated list of
/// `lat,lng` pairs describing a closed loop.
pub fn parse_area(area: &str) -> DssResult<GeoPolygon> {
    if area.trim().is_empty() {
        return Err(DssError::BadRequest("Missing area".to_string()));
    }
    let coordinates: Vec<f64> = area
        .split(',')
        .map(|c| {
            c.trim()
                .parse::<f64>()
                .map_err(|_| DssError::BadRequest(format!("Invalid coordinate: `{c}`")))
        })
        .collect::<DssResult<_>>()?;
    if coordinates.len() % 2 != 0 {
        return Err(DssError::BadRequest(
            "Area contains an odd number of coordinates".to_string(),
        ));
    }
    let vertices = coordinates
        .chunks(2)
        .map(|pair| LatLngPoint {
            lat: pair[0],
            lng: pair[1],
        })
        .collect();
    Ok(GeoPolygon { vertices })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_area() {
        let polygon =
            parse_area("37.427636,-122.170502,37.408799,-122.064069,37.421265,-122.086504")
                .unwrap();
        assert_eq!(polygon.vertices.len(), 3);
        assert_eq!(polygon.vertices[0].lat, 37.427636);
        assert_eq!(polygon.vertices[2].lng, -122.086504);
    }

    #[test]
    fn test_parse_area_odd_coordinate_count() {
        assert!(parse_area("37.427636,-122.170502,37.408799").is_err());
    }

    #[test]
    fn test_parse_area_garbage() {
        assert!(parse_area("37.4,north").is_err());
        assert!(parse_area("").is_err());
    }
}
