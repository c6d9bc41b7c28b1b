//! Polygon covering search
//!
//! Computes the set of fixed-level cells intersecting a closed loop on the
//! sphere by descending the cell quadtree from the six face cells and
//! pruning subtrees that do not touch the loop. The result is sorted and
//! deterministic for a given vertex sequence.

use super::cellid::{CellId, LatLng, Point};
use super::{CellUnion, MAX_COVERING_CELLS, MAX_COVERING_LEVEL};
use crate::error::{DssError, DssResult};

/// Computes the covering of the polygon at the storage cell level.
///
/// The polygon is interpreted as a closed loop enclosing the smaller of the
/// two regions it bounds, regardless of vertex winding. Fails on fewer than
/// three vertices, out-of-range or non-finite coordinates, degenerate or
/// self-intersecting loops, and coverings larger than
/// [`MAX_COVERING_CELLS`].
pub fn covering(vertices: &[LatLng]) -> DssResult<CellUnion> {
    if vertices.len() < 3 {
        return Err(DssError::BadRequest(format!(
            "Polygon must have at least 3 vertices, got {}",
            vertices.len()
        )));
    }
    for v in vertices {
        if !v.lat.is_finite() || !v.lng.is_finite() {
            return Err(DssError::BadRequest(
                "Polygon vertex coordinates must be finite".to_string(),
            ));
        }
        if v.lat < -90.0 || v.lat > 90.0 {
            return Err(DssError::BadRequest(format!(
                "Latitude {} outside [-90, 90]",
                v.lat
            )));
        }
        if v.lng < -180.0 || v.lng > 180.0 {
            return Err(DssError::BadRequest(format!(
                "Longitude {} outside [-180, 180]",
                v.lng
            )));
        }
    }

    let points: Vec<Point> = vertices.iter().map(LatLng::to_point).collect();
    let lp = Loop::new(points)?;

    let mut cells = Vec::new();
    for face in 0..6 {
        descend(CellId::from_face(face), &lp, &mut cells)?;
    }
    cells.sort_unstable();
    cells.dedup();
    Ok(CellUnion(cells))
}

fn descend(cell: CellId, lp: &Loop, out: &mut Vec<CellId>) -> DssResult<()> {
    if !cell_intersects_loop(cell, lp) {
        return Ok(());
    }
    if cell.level() == MAX_COVERING_LEVEL {
        out.push(cell);
        if out.len() > MAX_COVERING_CELLS {
            return Err(DssError::AreaTooLarge(format!(
                "Area requires more than {MAX_COVERING_CELLS} cells"
            )));
        }
        return Ok(());
    }
    for child in cell.children() {
        descend(child, lp, out)?;
    }
    Ok(())
}

/// Closed loop on the sphere, normalized to enclose the smaller region.
struct Loop {
    vertices: Vec<Point>,
    /// A point 90 degrees from the loop centroid, guaranteed outside any
    /// loop whose vertices stay within a quarter sphere of their centroid.
    reference: Point,
}

impl Loop {
    fn new(mut vertices: Vec<Point>) -> DssResult<Self> {
        let n = vertices.len();

        // Newell-style loop normal; vanishes for collinear vertex sets.
        let mut normal = Point(0.0, 0.0, 0.0);
        for k in 0..n {
            let c = vertices[k].cross(&vertices[(k + 1) % n]);
            normal = Point(normal.0 + c.0, normal.1 + c.1, normal.2 + c.2);
        }
        let mut centroid = Point(0.0, 0.0, 0.0);
        for v in &vertices {
            centroid = Point(centroid.0 + v.0, centroid.1 + v.1, centroid.2 + v.2);
        }
        if centroid.norm() < 1e-9 || normal.norm() < 1e-12 {
            return Err(DssError::BadRequest(
                "Polygon vertices are degenerate".to_string(),
            ));
        }
        let centroid = centroid.normalized();

        // All vertices on one great circle bound no area at all.
        let mut far = 1;
        let mut min_dot = f64::MAX;
        for (k, v) in vertices.iter().enumerate().skip(1) {
            let d = vertices[0].dot(v);
            if d < min_dot {
                min_dot = d;
                far = k;
            }
        }
        let great_circle = vertices[0].cross(&vertices[far]);
        if great_circle.norm() > 1e-12 {
            let great_circle = great_circle.normalized();
            if vertices.iter().all(|v| v.dot(&great_circle).abs() < 1e-9) {
                return Err(DssError::BadRequest(
                    "Polygon vertices are collinear".to_string(),
                ));
            }
        }

        // Orient CCW around the smaller enclosed region.
        if normal.dot(&centroid) < 0.0 {
            vertices.reverse();
        }

        // The parity test below assumes the loop fits in the quarter sphere
        // around its centroid.
        for v in &vertices {
            if v.dot(&centroid) <= 0.0 {
                return Err(DssError::AreaTooLarge(
                    "Polygon spans more than a quarter sphere".to_string(),
                ));
            }
        }

        for a in 0..n {
            for b in a + 1..n {
                // Adjacent edges share a vertex and cannot properly cross.
                if b == a + 1 || (a == 0 && b == n - 1) {
                    continue;
                }
                if simple_crossing(
                    &vertices[a],
                    &vertices[(a + 1) % n],
                    &vertices[b],
                    &vertices[(b + 1) % n],
                ) {
                    return Err(DssError::BadRequest(
                        "Polygon loop is self-intersecting".to_string(),
                    ));
                }
            }
        }

        let axis = smallest_component_axis(&centroid);
        let reference = centroid.cross(&axis).normalized();

        Ok(Loop {
            vertices,
            reference,
        })
    }

    /// Point-in-loop via crossing parity from the outside reference point.
    fn contains(&self, p: &Point) -> bool {
        let n = self.vertices.len();
        let mut crossings = 0u32;
        for k in 0..n {
            if simple_crossing(&self.reference, p, &self.vertices[k], &self.vertices[(k + 1) % n])
            {
                crossings += 1;
            }
        }
        crossings % 2 == 1
    }
}

fn smallest_component_axis(p: &Point) -> Point {
    let (ax, ay, az) = (p.0.abs(), p.1.abs(), p.2.abs());
    if ax <= ay && ax <= az {
        Point(1.0, 0.0, 0.0)
    } else if ay <= az {
        Point(0.0, 1.0, 0.0)
    } else {
        Point(0.0, 0.0, 1.0)
    }
}

/// Whether geodesic edges AB and CD cross at an interior point.
///
/// All four triple-product signs must agree, which also rejects the
/// antipodal-intersection false positive of the naive two-sign test.
fn simple_crossing(a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
    let ab = a.cross(b);
    let acb = -ab.dot(c);
    let bda = ab.dot(d);
    if acb * bda <= 0.0 {
        return false;
    }
    let cd = c.cross(d);
    let cbd = -cd.dot(b);
    let dac = cd.dot(a);
    acb * cbd > 0.0 && acb * dac > 0.0
}

/// Exact cell/loop intersection: a corner inside the loop, a loop vertex
/// inside the cell, or a boundary crossing.
fn cell_intersects_loop(cell: CellId, lp: &Loop) -> bool {
    let corners = cell.corners();
    for corner in &corners {
        if lp.contains(corner) {
            return true;
        }
    }
    for v in &lp.vertices {
        if cell.contains_point(v) {
            return true;
        }
    }
    let n = lp.vertices.len();
    for k in 0..4 {
        let a = &corners[k];
        let b = &corners[(k + 1) % 4];
        for e in 0..n {
            if simple_crossing(a, b, &lp.vertices[e], &lp.vertices[(e + 1) % n]) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<LatLng> {
        vec![
            // Stanford
            LatLng::from_degrees(37.427636, -122.170502),
            // NASA Ames
            LatLng::from_degrees(37.408799, -122.064069),
            // Googleplex
            LatLng::from_degrees(37.421265, -122.086504),
        ]
    }

    #[test]
    fn test_polygon_covering() {
        let got = covering(&triangle()).unwrap();
        let want: Vec<CellId> = [
            "808fb0ac", "808fb744", "808fb754", "808fb75c", "808fb9fc", "808fba04", "808fba0c",
            "808fba14", "808fba1c", "808fba5c", "808fba64", "808fba6c", "808fba74", "808fba8c",
            "808fbad4", "808fbadc", "808fbae4", "808fbaec", "808fbaf4", "808fbb2c",
        ]
        .iter()
        .map(|t| CellId::from_token(t).unwrap())
        .collect();
        assert_eq!(got.0, want);
    }

    #[test]
    fn test_covering_is_deterministic() {
        let first = covering(&triangle()).unwrap();
        let second = covering(&triangle()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_covering_level() {
        let union = covering(&triangle()).unwrap();
        assert!(union.0.iter().all(|c| c.level() == MAX_COVERING_LEVEL));
    }

    #[test]
    fn test_winding_does_not_matter() {
        let mut reversed = triangle();
        reversed.reverse();
        assert_eq!(covering(&triangle()).unwrap(), covering(&reversed).unwrap());
    }

    #[test]
    fn test_too_few_vertices() {
        let two = vec![
            LatLng::from_degrees(37.427636, -122.170502),
            LatLng::from_degrees(37.408799, -122.064069),
        ];
        assert!(matches!(covering(&two), Err(DssError::BadRequest(_))));
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let bad = vec![
            LatLng::from_degrees(91.0, 0.0),
            LatLng::from_degrees(0.0, 1.0),
            LatLng::from_degrees(1.0, 0.0),
        ];
        assert!(matches!(covering(&bad), Err(DssError::BadRequest(_))));
    }

    #[test]
    fn test_self_intersecting_loop() {
        // A bow tie: edges (0,1) and (2,3) cross.
        let bowtie = vec![
            LatLng::from_degrees(0.0, 0.0),
            LatLng::from_degrees(1.0, 1.0),
            LatLng::from_degrees(0.0, 1.0),
            LatLng::from_degrees(1.0, 0.0),
        ];
        assert!(matches!(covering(&bowtie), Err(DssError::BadRequest(_))));
    }

    #[test]
    fn test_collinear_vertices_rejected() {
        let line = vec![
            LatLng::from_degrees(0.0, 0.0),
            LatLng::from_degrees(0.0, 1.0),
            LatLng::from_degrees(0.0, 2.0),
        ];
        assert!(matches!(covering(&line), Err(DssError::BadRequest(_))));
    }

    #[test]
    fn test_area_too_large() {
        // Roughly a 10x10 degree patch, far beyond the covering cell cap.
        let huge = vec![
            LatLng::from_degrees(30.0, -120.0),
            LatLng::from_degrees(30.0, -110.0),
            LatLng::from_degrees(40.0, -110.0),
            LatLng::from_degrees(40.0, -120.0),
        ];
        assert!(matches!(covering(&huge), Err(DssError::AreaTooLarge(_))));
    }

    #[test]
    fn test_vertex_cells_are_covered() {
        let union = covering(&triangle()).unwrap();
        for v in triangle() {
            let cell = CellId::from_lat_lng(v).parent(MAX_COVERING_LEVEL);
            assert!(union.0.contains(&cell));
        }
    }
}
