//! Link resolution: anchor pairs, edge paths and collision avoidance.
//!
//! Link pairs are rebuilt from scratch every generation from the resolved
//! link fields on the elements; only the shapes they drive persist. An
//! edge is drawn only when both anchors resolve: an out-of-range anchor
//! index, coincident centers, or a degenerate zero-length edge silently
//! skips that edge and leaves the rest of the generation untouched.

use log::trace;
use serde_json::Value;

use armilla_core::{
    geometry::{Point, Size},
    identifier::Id,
    style::Style,
};

use crate::{
    anchor::{AnchorTable, dynamic_anchor},
    config::{LinkConfig, StructureConfig, ViewConfig},
    element::ElementStore,
    label::LabelPlacer,
    shape::Key,
    template,
};

/// Sideways distance applied to each of two mutually reversed edges.
const COLLISION_OFFSET: f32 = 5.0;

/// Two anchor points closer than this are considered the same point when
/// detecting reversed-pair collisions.
const ANCHOR_EPSILON: f32 = 0.1;

/// Edges shorter than this are degenerate and skipped.
const MIN_EDGE_LENGTH: f32 = 1e-3;

/// The drawable path of an edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgePath {
    Line {
        start: Point,
        end: Point,
    },
    Quadratic {
        start: Point,
        control: Point,
        end: Point,
    },
}

impl EdgePath {
    /// Builds the path between two anchors; a non-zero `bend` bows the
    /// edge sideways through a quadratic control point.
    pub fn from_endpoints(start: Point, end: Point, bend: f32) -> Self {
        if bend == 0.0 {
            return EdgePath::Line { start, end };
        }
        let tangent = end
            .sub_point(start)
            .normalize()
            .map(Point::perpendicular)
            .unwrap_or_default();
        EdgePath::Quadratic {
            start,
            control: start.midpoint(end).add_point(tangent.scale(bend)),
            end,
        }
    }

    /// Evaluates the path at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f32) -> Point {
        match *self {
            EdgePath::Line { start, end } => start.lerp(end, t),
            EdgePath::Quadratic {
                start,
                control,
                end,
            } => {
                let a = start.lerp(control, t);
                let b = control.lerp(end, t);
                a.lerp(b, t)
            }
        }
    }

    pub fn start(&self) -> Point {
        match *self {
            EdgePath::Line { start, .. } | EdgePath::Quadratic { start, .. } => start,
        }
    }

    pub fn end(&self) -> Point {
        match *self {
            EdgePath::Line { end, .. } | EdgePath::Quadratic { end, .. } => end,
        }
    }
}

/// One resolved edge for one declared link field between two elements.
#[derive(Debug, Clone)]
pub struct LinkPair {
    field: String,
    from: usize,
    to: usize,
    from_key: Key,
    to_key: Key,
    ordering: usize,
    contact: Option<(usize, usize)>,
    bend: f32,
    style: Style,
    raw_target: Value,
    shape_key: Key,
    /// Resolved world-space anchors, kept for collision detection.
    start: Point,
    end: Point,
    /// Both anchors resolved this generation; unresolved pairs draw nothing.
    resolved: bool,
    /// Anchors recomputed this generation; the guard that keeps an edge
    /// from being re-anchored twice when both endpoints moved.
    synced: bool,
    label: Option<String>,
    label_key: Option<Key>,
    label_position: Point,
    label_size: Size,
}

impl LinkPair {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn from_index(&self) -> usize {
        self.from
    }

    pub fn to_index(&self) -> usize {
        self.to
    }

    pub fn from_key(&self) -> Key {
        self.from_key
    }

    pub fn to_key(&self) -> Key {
        self.to_key
    }

    /// Ordering index within a one-to-many field, aligned to the raw
    /// array position (holes from unresolved entries keep their slot).
    pub fn ordering(&self) -> usize {
        self.ordering
    }

    pub fn shape_key(&self) -> Key {
        self.shape_key
    }

    /// The raw target descriptor from the source record, as written.
    pub fn raw_target(&self) -> &Value {
        &self.raw_target
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn bend(&self) -> f32 {
        self.bend
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn path(&self) -> EdgePath {
        EdgePath::from_endpoints(self.start, self.end, self.bend)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn label_key(&self) -> Option<Key> {
        self.label_key
    }

    pub fn label_position(&self) -> Point {
        self.label_position
    }

    pub fn label_size(&self) -> Size {
        self.label_size
    }

    pub(crate) fn set_label_placement(&mut self, position: Point, size: Size) {
        self.label_position = position;
        self.label_size = size;
    }

    /// True if either endpoint is one of the given elements.
    fn touches(&self, element: usize) -> bool {
        self.from == element || self.to == element
    }
}

/// Builds and re-anchors the generation's link pairs.
#[derive(Debug, Default)]
pub struct LinkModel {
    pairs: Vec<LinkPair>,
}

impl LinkModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> &[LinkPair] {
        &self.pairs
    }

    pub fn pair(&self, idx: usize) -> &LinkPair {
        &self.pairs[idx]
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Drops the previous generation's pairs.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Creates one pair per resolved link target across all elements.
    ///
    /// Unresolved targets are skipped without shifting the ordering index
    /// of surviving entries, so index-based contact configuration stays
    /// aligned to the raw array position.
    pub fn build(&mut self, store: &ElementStore, structure: &StructureConfig) {
        self.clear();
        for (from_idx, element) in store.iter().enumerate() {
            for (field, targets) in element.link_fields() {
                let config = structure.links().iter().find(|l| l.field() == *field);
                for (ordering, target) in targets.iter().enumerate() {
                    let Some(to_idx) = target.resolved else {
                        continue;
                    };
                    let to_element = store.get(to_idx);
                    let from_key = element.key();
                    let to_key = to_element.key();

                    let edge_id = format!("{from_key}->{to_key}#{ordering}");
                    let shape_key = Key::new(Id::scoped("link", field), Id::new(&edge_id));

                    let label = config.and_then(LinkConfig::label).map(|tpl| {
                        template::resolve(tpl, |name| {
                            lookup_label_field(name, to_element.fields(), &target.raw)
                        })
                    });
                    let label_key = label
                        .as_ref()
                        .map(|_| Key::new(Id::scoped("label", field), Id::new(&edge_id)));

                    self.pairs.push(LinkPair {
                        field: field.clone(),
                        from: from_idx,
                        to: to_idx,
                        from_key,
                        to_key,
                        ordering,
                        contact: config.and_then(|c| c.contact().resolve(ordering)),
                        bend: config.map(LinkConfig::bend).unwrap_or(0.0),
                        style: config.map(|c| c.style().clone()).unwrap_or_default(),
                        raw_target: target.raw.clone(),
                        shape_key,
                        start: Point::default(),
                        end: Point::default(),
                        resolved: false,
                        synced: false,
                        label,
                        label_key,
                        label_position: Point::default(),
                        label_size: Size::default(),
                    });
                }
            }
        }
    }

    /// Resolves anchors for every pair not yet synced this generation,
    /// applying reversed-pair collision avoidance as each pair lands.
    pub fn resolve_geometry(&mut self, store: &ElementStore, view: &ViewConfig) {
        for idx in 0..self.pairs.len() {
            if self.pairs[idx].synced {
                continue;
            }
            self.resolve_one(idx, store, view);
        }
    }

    /// Clears the sync guard on every pair touching one of the given
    /// elements, returning how many pairs will re-anchor.
    pub fn mark_unsynced_for(&mut self, elements: &[usize]) -> usize {
        let mut count = 0;
        for pair in &mut self.pairs {
            if pair.synced && elements.iter().any(|&e| pair.touches(e)) {
                pair.synced = false;
                count += 1;
            }
        }
        count
    }

    fn resolve_one(&mut self, idx: usize, store: &ElementStore, view: &ViewConfig) {
        let (start, end) = {
            let pair = &self.pairs[idx];
            let from = store.get(pair.from);
            let to = store.get(pair.to);
            if from.is_obsolete() || to.is_obsolete() {
                self.pairs[idx].synced = true;
                return;
            }

            let anchors = match pair.contact {
                Some((from_slot, to_slot)) => {
                    let from_table = anchor_table(view, &from.kind().resolve());
                    let to_table = anchor_table(view, &to.kind().resolve());
                    let start = from_table.resolve(
                        from_slot,
                        from.position(),
                        from.size(),
                        from.rotation(),
                    );
                    let end =
                        to_table.resolve(to_slot, to.position(), to.size(), to.rotation());
                    start.zip(end)
                }
                None => {
                    let start = dynamic_anchor(from.position(), from.size(), to.position());
                    let end = dynamic_anchor(to.position(), to.size(), from.position());
                    start.zip(end)
                }
            };

            match anchors {
                Some(points) => points,
                None => {
                    // Anchor slot out of range or coincident centers: this
                    // edge stays undrawn, others proceed.
                    trace!(edge:% = pair.shape_key; "Skipping edge with unresolvable anchors");
                    self.pairs[idx].synced = true;
                    self.pairs[idx].resolved = false;
                    return;
                }
            }
        };

        if start.distance_to(end) < MIN_EDGE_LENGTH {
            trace!(edge:% = self.pairs[idx].shape_key; "Skipping zero-length edge");
            self.pairs[idx].synced = true;
            self.pairs[idx].resolved = false;
            return;
        }

        self.pairs[idx].start = start;
        self.pairs[idx].end = end;
        self.pairs[idx].resolved = true;
        self.pairs[idx].synced = true;

        self.avoid_reversed_collision(idx);
    }

    /// Looks for an already-resolved pair whose (start, end) is the exact
    /// reverse of pair `idx` and separates the two symmetrically, each
    /// offset sideways by the same magnitude in opposite directions.
    ///
    /// This is a pairwise fix for the two-edge degenerate case only; three
    /// or more edges sharing both endpoints are not bundled.
    fn avoid_reversed_collision(&mut self, idx: usize) {
        let (start, end) = (self.pairs[idx].start, self.pairs[idx].end);
        let own_key = self.pairs[idx].shape_key;
        let Some(direction) = end.sub_point(start).normalize() else {
            return;
        };

        let reversed = self.pairs.iter().position(|other| {
            other.resolved
                && other.shape_key != own_key
                && same_point(other.start, end)
                && same_point(other.end, start)
        });
        let Some(other_idx) = reversed else {
            return;
        };

        let offset = direction.perpendicular().scale(COLLISION_OFFSET);
        {
            let pair = &mut self.pairs[idx];
            pair.start = pair.start.add_point(offset);
            pair.end = pair.end.add_point(offset);
        }
        {
            let other = &mut self.pairs[other_idx];
            other.start = other.start.sub_point(offset);
            other.end = other.end.sub_point(offset);
        }
    }

    /// Places the label of every resolved pair, avoiding already placed
    /// labels through the placer's bounded bisection search.
    pub fn place_labels<M>(&mut self, placer: &mut LabelPlacer, measure: M)
    where
        M: Fn(&str) -> Size,
    {
        for pair in &mut self.pairs {
            if !pair.resolved {
                continue;
            }
            let Some(text) = pair.label.clone() else {
                continue;
            };
            let size = measure(&text);
            let path = EdgePath::from_endpoints(pair.start, pair.end, pair.bend);
            let (position, _t) = placer.place(&path, size);
            pair.set_label_placement(position, size);
        }
    }
}

fn anchor_table<'a>(view: &'a ViewConfig, kind: &str) -> &'a AnchorTable {
    static DEFAULT: std::sync::OnceLock<AnchorTable> = std::sync::OnceLock::new();
    view.template(kind)
        .map(|t| t.anchors())
        .unwrap_or_else(|| DEFAULT.get_or_init(AnchorTable::default))
}

fn same_point(a: Point, b: Point) -> bool {
    a.distance_to(b) < ANCHOR_EPSILON
}

/// Label lookup order: plain `[field]` reads the resolved target element
/// and falls back to the raw target descriptor; `[target.field]` reads the
/// raw descriptor only.
fn lookup_label_field(
    name: &str,
    target_fields: &indexmap::IndexMap<String, Value>,
    raw: &Value,
) -> Option<String> {
    if let Some(raw_field) = name.strip_prefix("target.") {
        return raw.get(raw_field).and_then(template::value_to_text);
    }
    target_fields
        .get(name)
        .and_then(template::value_to_text)
        .or_else(|| raw.get(name).and_then(template::value_to_text))
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use crate::{
        config::{ContactConfig, LinkConfig, StructureConfig},
        element::{BaseBehavior, Element, Target},
    };

    use super::*;

    fn store_with_pair() -> ElementStore {
        let mut store = ElementStore::new();
        let mut a = Element::from_record(Key::parse("node", "1"), &json!({"id": 1, "next": 2}));
        a.set_position(Point::new(0.0, 0.0));
        a.set_size(Size::new(20.0, 20.0));
        let mut b = Element::from_record(Key::parse("node", "2"), &json!({"id": 2}));
        b.set_position(Point::new(100.0, 0.0));
        b.set_size(Size::new(20.0, 20.0));
        store.insert(a, Box::new(BaseBehavior));
        store.insert(b, Box::new(BaseBehavior));
        store
    }

    fn link(store: &mut ElementStore, from: usize, to: usize, field: &str, raw: Value) {
        store.get_mut(from).push_link_target(
            field,
            Target {
                raw,
                resolved: Some(to),
            },
        );
    }

    fn structure(field: &str) -> StructureConfig {
        StructureConfig::new()
            .with_kind("node")
            .with_link(LinkConfig::new(field))
    }

    #[test]
    fn test_edge_path_line_point_at() {
        let path = EdgePath::from_endpoints(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 0.0);
        assert_eq!(path.point_at(0.5), Point::new(5.0, 0.0));
        assert_eq!(path.point_at(0.0), path.start());
        assert_eq!(path.point_at(1.0), path.end());
    }

    #[test]
    fn test_edge_path_quadratic_bows_sideways() {
        let path = EdgePath::from_endpoints(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 8.0);
        let mid = path.point_at(0.5);
        assert_approx_eq!(f32, mid.x(), 5.0);
        // Quadratic midpoint sits halfway to the control point
        assert_approx_eq!(f32, mid.y(), 4.0);
        assert_eq!(path.point_at(0.0), Point::new(0.0, 0.0));
        assert_eq!(path.point_at(1.0), Point::new(10.0, 0.0));
    }

    #[test]
    fn test_build_creates_one_pair_per_resolved_target() {
        let mut store = store_with_pair();
        link(&mut store, 0, 1, "next", json!(2));

        let mut model = LinkModel::new();
        model.build(&store, &structure("next"));

        assert_eq!(model.len(), 1);
        let pair = model.pair(0);
        assert_eq!(pair.from_key(), Key::parse("node", "1"));
        assert_eq!(pair.to_key(), Key::parse("node", "2"));
        assert_eq!(pair.ordering(), 0);
    }

    #[test]
    fn test_build_keeps_ordering_across_null_holes() {
        let mut store = store_with_pair();
        // Raw array [null, 2]: the hole keeps its slot
        store.get_mut(0).set_link_targets(
            "next",
            vec![
                Target {
                    raw: json!(null),
                    resolved: None,
                },
                Target {
                    raw: json!(2),
                    resolved: Some(1),
                },
            ],
        );

        let mut model = LinkModel::new();
        model.build(&store, &structure("next"));

        assert_eq!(model.len(), 1);
        assert_eq!(model.pair(0).ordering(), 1);
    }

    #[test]
    fn test_dynamic_anchors_on_circumscribed_circles() {
        let mut store = store_with_pair();
        link(&mut store, 0, 1, "next", json!(2));

        let mut model = LinkModel::new();
        model.build(&store, &structure("next"));
        model.resolve_geometry(&store, &ViewConfig::new());

        let pair = model.pair(0);
        assert!(pair.is_resolved());
        // max(20, 20) / 2 = 10 along the inter-center line
        assert_eq!(pair.start(), Point::new(10.0, 0.0));
        assert_eq!(pair.end(), Point::new(90.0, 0.0));
    }

    #[test]
    fn test_reversed_pair_collision_separates_symmetrically() {
        let mut store = store_with_pair();
        link(&mut store, 0, 1, "next", json!(2));
        link(&mut store, 1, 0, "next", json!(1));

        let mut model = LinkModel::new();
        model.build(&store, &structure("next"));
        model.resolve_geometry(&store, &ViewConfig::new());

        let first = model.pair(0);
        let second = model.pair(1);
        assert!(first.is_resolved() && second.is_resolved());

        // Both final anchor pairs are distinct
        assert_ne!(first.start(), second.end());
        assert_ne!(first.end(), second.start());

        // Offsets have equal magnitude in opposite directions
        assert_approx_eq!(f32, first.start().y(), -second.end().y(), epsilon = 1e-4);
        assert_approx_eq!(f32, first.start().y().abs(), COLLISION_OFFSET, epsilon = 1e-4);
    }

    #[test]
    fn test_explicit_contact_out_of_range_skips_edge() {
        let mut store = store_with_pair();
        link(&mut store, 0, 1, "next", json!(2));

        let structure = StructureConfig::new().with_kind("node").with_link(
            LinkConfig::new("next").with_contact(ContactConfig::Fixed { from: 9, to: 0 }),
        );

        let mut model = LinkModel::new();
        model.build(&store, &structure);
        model.resolve_geometry(&store, &ViewConfig::new());

        assert!(!model.pair(0).is_resolved());
    }

    #[test]
    fn test_zero_length_edge_skipped() {
        let mut store = store_with_pair();
        // Move both elements to the same spot: dynamic anchors have no
        // direction and the edge is degenerate
        store.get_mut(1).set_position(Point::new(0.0, 0.0));
        link(&mut store, 0, 1, "next", json!(2));

        let mut model = LinkModel::new();
        model.build(&store, &structure("next"));
        model.resolve_geometry(&store, &ViewConfig::new());

        assert!(!model.pair(0).is_resolved());
    }

    #[test]
    fn test_sync_guard_prevents_double_resolution() {
        let mut store = store_with_pair();
        link(&mut store, 0, 1, "next", json!(2));

        let mut model = LinkModel::new();
        model.build(&store, &structure("next"));
        model.resolve_geometry(&store, &ViewConfig::new());

        // Both endpoints moved: the pair is marked once, not twice
        let marked = model.mark_unsynced_for(&[0, 1]);
        assert_eq!(marked, 1);
        let marked_again = model.mark_unsynced_for(&[0, 1]);
        assert_eq!(marked_again, 0);
    }

    #[test]
    fn test_label_resolution_prefers_element_then_raw_descriptor() {
        let mut store = store_with_pair();
        link(&mut store, 0, 1, "next", json!({"id": 2, "weight": 7}));

        let structure = StructureConfig::new()
            .with_kind("node")
            .with_link(LinkConfig::new("next").with_label("[weight]"));

        let mut model = LinkModel::new();
        model.build(&store, &structure);

        // The target element has no `weight` field; the raw descriptor does
        assert_eq!(model.pair(0).label(), Some("7"));
    }

    #[test]
    fn test_label_target_prefix_reads_raw_descriptor_only() {
        let mut store = store_with_pair();
        link(&mut store, 0, 1, "next", json!({"id": 2, "weight": 7}));

        let structure = StructureConfig::new()
            .with_kind("node")
            .with_link(LinkConfig::new("next").with_label("[target.weight]/[target.missing]"));

        let mut model = LinkModel::new();
        model.build(&store, &structure);

        assert_eq!(model.pair(0).label(), Some("7/[target.missing]"));
    }
}
