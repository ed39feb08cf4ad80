//! Anchor slots: the named attachment points edges connect to.
//!
//! Every shape exposes five canonical slots (top, right, bottom, left,
//! center); a view template may override the table per kind. When a link
//! declares no contact at all, the endpoints fall back to
//! [`dynamic_anchor`], which intersects the inter-center line with a
//! circumscribed circle. This is imprecise for non-circular shapes, but it
//! guarantees two defined points for any shape pair.

use armilla_core::geometry::{Point, Size};

/// Canonical anchor offsets in unit shape coordinates:
/// top, right, bottom, left, center.
pub const CANONICAL_ANCHORS: [(f32, f32); 5] = [
    (0.0, -0.5),
    (0.5, 0.0),
    (0.0, 0.5),
    (-0.5, 0.0),
    (0.0, 0.0),
];

/// The anchor slots of one shape kind.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTable {
    offsets: Vec<(f32, f32)>,
}

impl Default for AnchorTable {
    fn default() -> Self {
        Self {
            offsets: CANONICAL_ANCHORS.to_vec(),
        }
    }
}

impl AnchorTable {
    /// Builds a table from unit offsets relative to the shape center
    /// (`(0.5, 0.0)` is the middle of the right edge).
    pub fn new(offsets: Vec<(f32, f32)>) -> Self {
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Resolves slot `index` to a world-space point for a shape with the
    /// given center, size and rotation. An index outside the table
    /// resolves to `None` and the caller skips the edge.
    pub fn resolve(&self, index: usize, center: Point, size: Size, rotation: f32) -> Option<Point> {
        let (fx, fy) = *self.offsets.get(index)?;
        let point = Point::new(
            fx.mul_add(size.width(), center.x()),
            fy.mul_add(size.height(), center.y()),
        );
        Some(point.rotate_around(center, rotation))
    }
}

/// The dynamic anchor fallback: the intersection of the line toward
/// `toward` with a circle of radius `max(width, height) / 2` around
/// `center`. Returns `None` when the two centers coincide, in which case
/// no direction is defined and the edge is skipped.
pub fn dynamic_anchor(center: Point, size: Size, toward: Point) -> Option<Point> {
    let direction = toward.sub_point(center).normalize()?;
    let radius = size.max_side() / 2.0;
    Some(center.add_point(direction.scale(radius)))
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_canonical_slots() {
        let table = AnchorTable::default();
        let center = Point::new(100.0, 100.0);
        let size = Size::new(40.0, 20.0);

        let top = table.resolve(0, center, size, 0.0).unwrap();
        assert_eq!(top, Point::new(100.0, 90.0));

        let right = table.resolve(1, center, size, 0.0).unwrap();
        assert_eq!(right, Point::new(120.0, 100.0));

        let center_slot = table.resolve(4, center, size, 0.0).unwrap();
        assert_eq!(center_slot, center);
    }

    #[test]
    fn test_index_out_of_table_resolves_none() {
        let table = AnchorTable::default();
        assert!(
            table
                .resolve(5, Point::new(0.0, 0.0), Size::new(10.0, 10.0), 0.0)
                .is_none()
        );
    }

    #[test]
    fn test_rotation_moves_slots() {
        let table = AnchorTable::default();
        let center = Point::new(0.0, 0.0);
        let size = Size::new(20.0, 20.0);

        // Right slot rotated a quarter turn lands at the bottom
        let rotated = table
            .resolve(1, center, size, std::f32::consts::FRAC_PI_2)
            .unwrap();
        assert_approx_eq!(f32, rotated.x(), 0.0, epsilon = 1e-4);
        assert_approx_eq!(f32, rotated.y(), 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_dynamic_anchor_on_circle() {
        let center = Point::new(0.0, 0.0);
        let size = Size::new(30.0, 10.0);

        let anchor = dynamic_anchor(center, size, Point::new(100.0, 0.0)).unwrap();
        assert_eq!(anchor, Point::new(15.0, 0.0));
    }

    #[test]
    fn test_dynamic_anchor_coincident_centers() {
        let center = Point::new(5.0, 5.0);
        assert!(dynamic_anchor(center, Size::new(10.0, 10.0), center).is_none());
    }
}

#[cfg(test)]
mod proptest_tests {
    use float_cmp::approx_eq;
    use proptest::prelude::*;

    use super::*;

    /// A resolved dynamic anchor always lies on the circumscribed circle.
    fn check_dynamic_anchor_radius(
        center: Point,
        size: Size,
        toward: Point,
    ) -> Result<(), TestCaseError> {
        if let Some(anchor) = dynamic_anchor(center, size, toward) {
            let radius = size.max_side() / 2.0;
            let distance = anchor.distance_to(center);
            prop_assert!(
                approx_eq!(f32, distance, radius, epsilon = 0.01),
                "anchor at distance {distance}, circle radius {radius}"
            );
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn dynamic_anchor_on_circumscribed_circle(
            cx in -500.0f32..500.0,
            cy in -500.0f32..500.0,
            w in 1.0f32..200.0,
            h in 1.0f32..200.0,
            tx in -500.0f32..500.0,
            ty in -500.0f32..500.0,
        ) {
            check_dynamic_anchor_radius(
                Point::new(cx, cy),
                Size::new(w, h),
                Point::new(tx, ty),
            )?;
        }
    }
}
