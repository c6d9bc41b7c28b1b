//! Hierarchical sphere-cell geometry
//!
//! The DSS indexes airspace volumes with a covering of cells from a 6-face
//! quadtree over the unit sphere (levels 0-30, Hilbert-curve ordering). All
//! records are stored and searched at a single fixed cell level so that the
//! database overlap test (`cells && $1`) is exact.
//!
//! No repository in our reference corpus carries a spherical-geometry
//! dependency and the ecosystem port of the cell library does not implement
//! polygon coverings, so the required subset lives here. The covering is
//! pinned by a known test vector and must stay byte-stable: changing any of
//! the projection constants silently invalidates every stored cell.

mod cellid;
mod covering;

pub use cellid::{CellId, LatLng, Point, MAX_CELL_LEVEL};
pub use covering::covering;

use crate::error::{DssError, DssResult};

/// Minimum cell level stored in the index. ~1 km^2 cells.
pub const MIN_COVERING_LEVEL: u8 = 13;

/// Maximum cell level stored in the index.
pub const MAX_COVERING_LEVEL: u8 = 13;

/// Upper bound on covering size; larger requests are rejected rather than
/// degraded to a coarser covering.
pub const MAX_COVERING_CELLS: usize = 2048;

/// Ordered set of cell identifiers covering a region.
///
/// Coverings produced by [`covering`] are sorted and deduplicated; unions
/// built with [`CellUnion::from_i64s`] preserve the input order so that
/// database reads round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellUnion(pub Vec<CellId>);

impl CellUnion {
    /// Total, order-preserving adaptor from stored signed cell ids.
    pub fn from_i64s(ids: &[i64]) -> Self {
        CellUnion(ids.iter().map(|&id| CellId(id as u64)).collect())
    }

    /// Signed representation for array-column storage.
    pub fn to_i64s(&self) -> Vec<i64> {
        self.0.iter().map(|c| c.0 as i64).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Sorted union of two cell sets, used when notifying on the combined
    /// footprint of an update.
    pub fn merged_with(&self, other: &CellUnion) -> CellUnion {
        let mut cells = self.0.clone();
        cells.extend_from_slice(&other.0);
        cells.sort_unstable();
        cells.dedup();
        CellUnion(cells)
    }
}

/// Rejects cells outside the allowed storage level range.
pub fn validate_cell(cell: CellId) -> DssResult<()> {
    let level = cell.level();
    if level < MIN_COVERING_LEVEL || level > MAX_COVERING_LEVEL {
        return Err(DssError::BadRequest(format!(
            "Cell level {} outside allowed range [{}, {}]",
            level, MIN_COVERING_LEVEL, MAX_COVERING_LEVEL
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_union_i64_roundtrip() {
        // A cell on face 4 has the top bit set; the signed representation
        // must still round-trip exactly.
        let cells = vec![0x808fb0ac00000000u64, 0x2ef59bd352e40000u64];
        let union = CellUnion(cells.iter().map(|&c| CellId(c)).collect());
        let stored = union.to_i64s();
        assert!(stored[0] < 0);
        assert_eq!(CellUnion::from_i64s(&stored), union);
    }

    #[test]
    fn test_from_i64s_preserves_order() {
        let ids = vec![3i64, 1, 2];
        let union = CellUnion::from_i64s(&ids);
        assert_eq!(union.to_i64s(), ids);
    }

    #[test]
    fn test_validate_cell_rejects_wrong_level() {
        let leaf = CellId::from_lat_lng(LatLng::from_degrees(37.421265, -122.086504));
        assert!(validate_cell(leaf.parent(13)).is_ok());
        assert!(validate_cell(leaf.parent(12)).is_err());
        assert!(validate_cell(leaf.parent(14)).is_err());
        assert!(validate_cell(leaf).is_err());
    }

    #[test]
    fn test_merged_with_sorts_and_dedups() {
        let a = CellUnion(vec![CellId(8), CellId(4)]);
        let b = CellUnion(vec![CellId(4), CellId(2)]);
        let merged = a.merged_with(&b);
        assert_eq!(merged.0, vec![CellId(2), CellId(4), CellId(8)]);
    }
}
