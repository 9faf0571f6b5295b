// 📐 Interior point of polygonal geometry
//
// A horizontal scan line is placed near the vertical middle of each polygon,
// nudged to sit halfway between the nearest vertices above and below the
// bounding-box centre so it never runs through a vertex. The widest interval
// the line spends inside the polygon (even-odd rule, holes included) gives
// the point: its midpoint is always inside, unlike a bounding-box centre or
// an area centroid on a concave shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// One polygon: an exterior ring plus zero or more holes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        Polygon { exterior, holes }
    }

    fn rings(&self) -> impl Iterator<Item = &Vec<Point>> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    /// Widest inside interval on the scan line, as (midpoint, width)
    fn scan_interior(&self) -> Option<(Point, f64)> {
        let y = self.scan_y()?;

        let mut crossings: Vec<f64> = Vec::new();
        for ring in self.rings() {
            for edge in ring.windows(2) {
                push_crossing(&mut crossings, edge[0], edge[1], y);
            }
            // Close the ring when the source left it open
            if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
                if first != last {
                    push_crossing(&mut crossings, *last, *first, y);
                }
            }
        }

        crossings.sort_by(|a, b| a.total_cmp(b));

        crossings
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1] - pair[0]))
            .filter(|(_, width)| *width > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(x0, width)| (Point::new(x0 + width / 2.0, y), width))
    }

    fn scan_y(&self) -> Option<f64> {
        let first = self.exterior.first()?;
        let (mut min_y, mut max_y) = (first.y, first.y);
        for p in &self.exterior {
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }

        let centre = (min_y + max_y) / 2.0;
        let (mut lo, mut hi) = (min_y, max_y);
        for p in self.rings().flatten() {
            if p.y <= centre {
                if p.y > lo {
                    lo = p.y;
                }
            } else if p.y < hi {
                hi = p.y;
            }
        }

        Some((lo + hi) / 2.0)
    }
}

fn push_crossing(crossings: &mut Vec<f64>, a: Point, b: Point, y: f64) {
    // Half-open rule: horizontal edges and shared vertices count once
    if (a.y > y) != (b.y > y) {
        crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
    }
}

/// Interior point of a set of polygons (one district may span several).
///
/// Picks the widest scan interval across all members. Degenerate input with
/// no interior falls back to the first exterior vertex; no vertices at all
/// gives None.
pub fn interior_point(polygons: &[Polygon]) -> Option<Point> {
    let best = polygons
        .iter()
        .filter_map(|p| p.scan_interior())
        .max_by(|a, b| a.1.total_cmp(&b.1));

    match best {
        Some((point, _)) => Some(point),
        None => polygons.iter().find_map(|p| p.exterior.first().copied()),
    }
}

/// Even-odd containment test (boundary points may go either way)
pub fn contains(polygon: &Polygon, point: Point) -> bool {
    let mut inside = false;
    for ring in polygon.rings() {
        let n = ring.len();
        if n < 3 {
            continue;
        }
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (ring[i], ring[j]);
            if (a.y > point.y) != (b.y > point.y)
                && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
            {
                inside = !inside;
            }
            j = i;
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        Polygon::new(
            ring(&[
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
                (x0, y0),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_square_interior_point_is_inside() {
        let poly = square(0.0, 0.0, 2.0);
        let p = interior_point(std::slice::from_ref(&poly)).unwrap();

        assert!(contains(&poly, p));
        assert!((p.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_u_shape_avoids_bbox_centre() {
        // Bounding-box centre (1.5, 1.5) lies in the notch, outside the shape
        let poly = Polygon::new(
            ring(&[
                (0.0, 0.0),
                (3.0, 0.0),
                (3.0, 3.0),
                (2.0, 3.0),
                (2.0, 1.0),
                (1.0, 1.0),
                (1.0, 3.0),
                (0.0, 3.0),
                (0.0, 0.0),
            ]),
            vec![],
        );
        assert!(!contains(&poly, Point::new(1.5, 1.5)));

        let p = interior_point(std::slice::from_ref(&poly)).unwrap();
        assert!(contains(&poly, p), "interior point {:?} must be inside", p);
    }

    #[test]
    fn test_hole_is_avoided() {
        let outer = ring(&[(0.0, 0.0), (6.0, 0.0), (6.0, 6.0), (0.0, 6.0), (0.0, 0.0)]);
        let hole = ring(&[(1.0, 1.0), (5.0, 1.0), (5.0, 5.0), (1.0, 5.0), (1.0, 1.0)]);
        let poly = Polygon::new(outer, vec![hole]);

        let p = interior_point(std::slice::from_ref(&poly)).unwrap();
        assert!(contains(&poly, p));
        assert!(p.x < 1.0 || p.x > 5.0);
    }

    #[test]
    fn test_open_ring_is_closed_implicitly() {
        let poly = Polygon::new(ring(&[(0.0, 0.0), (4.0, 0.0), (4.0, 2.0), (0.0, 2.0)]), vec![]);
        let p = interior_point(std::slice::from_ref(&poly)).unwrap();

        assert!(contains(&poly, p));
    }

    #[test]
    fn test_widest_member_wins() {
        let small = square(10.0, 10.0, 1.0);
        let large = square(0.0, 0.0, 5.0);

        let p = interior_point(&[small, large.clone()]).unwrap();
        assert!(contains(&large, p));
    }

    #[test]
    fn test_degenerate_input() {
        let line = Polygon::new(ring(&[(1.0, 1.0), (2.0, 1.0)]), vec![]);
        assert_eq!(interior_point(&[line]), Some(Point::new(1.0, 1.0)));

        let empty = Polygon::new(vec![], vec![]);
        assert_eq!(interior_point(&[empty]), None);
        assert_eq!(interior_point(&[]), None);
    }
}
