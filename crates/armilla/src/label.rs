//! Edge label placement with bounded overlap avoidance.
//!
//! A label starts at its edge's 50% parametric point. When the candidate
//! box overlaps any previously placed label, the placement interval is
//! recursively bisected (left half first, then right half) using the
//! edge's own point function, to a bounded depth. If no collision-free
//! candidate exists within the budget the last tried position is accepted;
//! deeper collisions remaining is a documented limitation, not a defect.

use armilla_core::geometry::{Bounds, Point, Size};

use crate::link::EdgePath;

/// Default bisection depth.
pub const DEFAULT_SEARCH_DEPTH: usize = 2;

/// Places labels one by one, remembering every placed box for the
/// avoidance search. One placer serves one generation.
#[derive(Debug)]
pub struct LabelPlacer {
    placed: Vec<Bounds>,
    max_depth: usize,
}

impl Default for LabelPlacer {
    fn default() -> Self {
        Self {
            placed: Vec::new(),
            max_depth: DEFAULT_SEARCH_DEPTH,
        }
    }
}

impl LabelPlacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A placer with a non-default search depth.
    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            placed: Vec::new(),
            max_depth,
        }
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    /// Finds a position for a label of `size` along `path` and records it.
    /// Returns the label center and the parametric position used.
    pub fn place(&mut self, path: &EdgePath, size: Size) -> (Point, f32) {
        let (point, t) = self.search(path, size, 0.0, 1.0, 0);
        self.placed.push(point.to_bounds(size));
        (point, t)
    }

    fn search(&self, path: &EdgePath, size: Size, lo: f32, hi: f32, depth: usize) -> (Point, f32) {
        let t = (lo + hi) / 2.0;
        let point = path.point_at(t);

        if !self.collides(point.to_bounds(size)) {
            return (point, t);
        }
        if depth >= self.max_depth {
            // Budget exhausted: accept the last tried position
            return (point, t);
        }

        let (left_point, left_t) = self.search(path, size, lo, t, depth + 1);
        if !self.collides(left_point.to_bounds(size)) {
            return (left_point, left_t);
        }

        let (right_point, right_t) = self.search(path, size, t, hi, depth + 1);
        (right_point, right_t)
    }

    fn collides(&self, candidate: Bounds) -> bool {
        self.placed.iter().any(|placed| placed.intersects(&candidate))
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn horizontal_path() -> EdgePath {
        EdgePath::from_endpoints(Point::new(0.0, 0.0), Point::new(100.0, 0.0), 0.0)
    }

    #[test]
    fn test_first_label_sits_at_midpoint() {
        let mut placer = LabelPlacer::new();
        let (point, t) = placer.place(&horizontal_path(), Size::new(20.0, 10.0));

        assert_approx_eq!(f32, t, 0.5);
        assert_eq!(point, Point::new(50.0, 0.0));
        assert_eq!(placer.placed_count(), 1);
    }

    #[test]
    fn test_second_label_avoids_first() {
        let mut placer = LabelPlacer::new();
        let size = Size::new(20.0, 10.0);
        let path = horizontal_path();

        let (first, _) = placer.place(&path, size);
        let (second, t) = placer.place(&path, size);

        assert_ne!(first, second);
        // Left half tried first
        assert!(t < 0.5);
        assert!(!first.to_bounds(size).intersects(&second.to_bounds(size)));
    }

    #[test]
    fn test_collision_free_candidates_do_not_overlap() {
        let mut placer = LabelPlacer::new();
        let size = Size::new(12.0, 8.0);
        let path = horizontal_path();

        let mut boxes = Vec::new();
        for _ in 0..4 {
            let (point, _) = placer.place(&path, size);
            boxes.push(point.to_bounds(size));
        }

        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                assert!(
                    !boxes[i].intersects(&boxes[j]),
                    "labels {i} and {j} overlap"
                );
            }
        }
    }

    #[test]
    fn test_exhausted_budget_accepts_last_tried() {
        // Labels wider than the whole edge can never stop overlapping;
        // the search must still terminate and hand back a position.
        let mut placer = LabelPlacer::new();
        let size = Size::new(300.0, 20.0);
        let path = horizontal_path();

        placer.place(&path, size);
        let (point, t) = placer.place(&path, size);

        assert!((0.0..=1.0).contains(&t));
        assert!(point.x().is_finite());
        assert_eq!(placer.placed_count(), 2);
    }

    #[test]
    fn test_quadratic_path_candidates_follow_curve() {
        let mut placer = LabelPlacer::new();
        let path = EdgePath::from_endpoints(Point::new(0.0, 0.0), Point::new(100.0, 0.0), 20.0);

        let (point, t) = placer.place(&path, Size::new(10.0, 10.0));
        assert_approx_eq!(f32, t, 0.5);
        // The curve bows away from the straight chord
        assert!(point.y() > 0.0);
    }
}
