//! Elements: the engine-owned, data-bound nodes driving rendering.
//!
//! An element wraps exactly one source record for one generation. Core
//! geometry fields are strongly typed; every source field is additionally
//! copied into a string-keyed extension map so user hooks and the template
//! language can reach caller-defined data the engine knows nothing about.
//! Elements are marked obsolete and discarded at the start of the next
//! generation; identity continuity lives in the `(kind, id)` key, not in
//! the element instance.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use armilla_core::{
    geometry::{Bounds, Point, Size},
    identifier::Id,
    style::Style,
};

use crate::{
    shape::{Key, Shape},
    view::PatchKind,
};

/// One declared link or pointer entry on an element: the raw descriptor
/// from the source record plus the element it resolved to, if any.
///
/// Unresolved targets stay in place as `resolved: None` holes so the
/// ordering index of surviving entries is preserved.
#[derive(Debug, Clone)]
pub struct Target {
    pub raw: Value,
    pub resolved: Option<usize>,
}

/// A data-bound node carrying the geometry and style its shape renders.
#[derive(Debug, Clone)]
pub struct Element {
    key: Key,
    position: Point,
    last_position: Point,
    rotation: f32,
    size: Size,
    style: Style,
    obsolete: bool,
    shape: Option<Key>,
    fields: IndexMap<String, Value>,
    links: IndexMap<String, Vec<Target>>,
    pointers: IndexMap<String, Vec<Target>>,
}

impl Element {
    /// Builds an element from a source record, copying every field into
    /// the extension map.
    pub(crate) fn from_record(key: Key, record: &Value) -> Self {
        let mut fields = IndexMap::new();
        if let Value::Object(map) = record {
            for (name, value) in map {
                fields.insert(name.clone(), value.clone());
            }
        }
        Self {
            key,
            position: Point::default(),
            last_position: Point::default(),
            rotation: 0.0,
            size: Size::default(),
            style: Style::new(),
            obsolete: false,
            shape: None,
            fields,
            links: IndexMap::new(),
            pointers: IndexMap::new(),
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn kind(&self) -> Id {
        self.key.kind()
    }

    pub fn id(&self) -> Id {
        self.key.id()
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Moves the element by the given offset.
    pub fn translate(&mut self, offset: Point) {
        self.position = self.position.add_point(offset);
    }

    /// The element's position at the end of the previous generation, used
    /// to detect movement when deciding which edges need re-anchoring.
    pub fn last_position(&self) -> Point {
        self.last_position
    }

    pub(crate) fn set_last_position(&mut self, position: Point) {
        self.last_position = position;
    }

    /// True if the element moved since the previous generation.
    pub fn moved(&self) -> bool {
        self.position != self.last_position
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        self.rotation = rotation;
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn style_mut(&mut self) -> &mut Style {
        &mut self.style
    }

    pub fn bounds(&self) -> Bounds {
        self.position.to_bounds(self.size)
    }

    /// True once the next generation has superseded this element.
    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    pub(crate) fn mark_obsolete(&mut self) {
        self.obsolete = true;
    }

    /// The key of the shape bound to this element, once drawn.
    pub fn shape_key(&self) -> Option<Key> {
        self.shape
    }

    pub(crate) fn bind_shape(&mut self, key: Key) {
        self.shape = Some(key);
    }

    /// Reads a source field, declared or not.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    /// The resolved targets of a declared link field.
    pub fn link_targets(&self, field: &str) -> &[Target] {
        self.links.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn link_fields(&self) -> impl Iterator<Item = (&String, &Vec<Target>)> {
        self.links.iter()
    }

    pub(crate) fn set_link_targets(&mut self, field: &str, targets: Vec<Target>) {
        self.links.insert(field.to_string(), targets);
    }

    /// Appends a link target, coalescing a scalar field into an array when
    /// a second target arrives.
    pub(crate) fn push_link_target(&mut self, field: &str, target: Target) -> usize {
        let targets = self.links.entry(field.to_string()).or_default();
        targets.push(target);
        targets.len() - 1
    }

    /// The resolved targets of a declared pointer field.
    pub fn pointer_targets(&self, field: &str) -> &[Target] {
        self.pointers.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn set_pointer_targets(&mut self, field: &str, targets: Vec<Target>) {
        self.pointers.insert(field.to_string(), targets);
    }

    pub(crate) fn push_pointer_target(&mut self, field: &str, target: Target) {
        self.pointers.entry(field.to_string()).or_default().push(target);
    }
}

/// Overridable lifecycle hooks for elements of one kind.
///
/// All hooks default to no-ops; callers register a constructor per kind to
/// install custom behavior. Hooks run synchronously during drawing and
/// reconciliation.
pub trait ElementBehavior {
    /// A declared link field on `element` resolved to `target`.
    fn on_link(&mut self, _element: &mut Element, _field: &str, _target: Key) {}

    /// A pointer began referring to `element`.
    fn on_refer(&mut self, _element: &mut Element, _field: &str) {}

    /// A pointer that referred to `element` in the previous generation no
    /// longer does.
    fn on_unrefer(&mut self, _element: &mut Element, _field: &str) {}

    /// A patch of the given kind was applied to the element's shape.
    fn on_change(&mut self, _element: &mut Element, _change: PatchKind) {}

    /// Last-chance customization of the bound shape after the engine has
    /// pushed the element state into it.
    fn update_shape(&mut self, _element: &Element, _shape: &mut Shape) {}
}

/// The default, no-op behavior.
#[derive(Debug, Default)]
pub struct BaseBehavior;

impl ElementBehavior for BaseBehavior {}

/// Owns one generation's elements and their behaviors, indexed by key.
#[derive(Default)]
pub struct ElementStore {
    elements: Vec<Element>,
    behaviors: Vec<Box<dyn ElementBehavior>>,
    index: IndexMap<Key, usize>,
}

impl fmt::Debug for ElementStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementStore")
            .field("keys", &self.index.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, element: Element, behavior: Box<dyn ElementBehavior>) -> usize {
        let idx = self.elements.len();
        self.index.insert(element.key(), idx);
        self.elements.push(element);
        self.behaviors.push(behavior);
        idx
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn index_of(&self, key: &Key) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn by_key(&self, key: &Key) -> Option<&Element> {
        self.index_of(key).map(|idx| &self.elements[idx])
    }

    pub fn by_key_mut(&mut self, key: &Key) -> Option<&mut Element> {
        let idx = self.index_of(key)?;
        Some(&mut self.elements[idx])
    }

    pub fn get(&self, idx: usize) -> &Element {
        &self.elements[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Element {
        &mut self.elements[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.elements.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.index.keys()
    }

    /// Runs `f` with an element and its behavior borrowed together.
    ///
    /// Behaviors live in a parallel list precisely so a hook can receive
    /// `&mut Element` without aliasing the behavior itself.
    pub(crate) fn with_behavior<R>(
        &mut self,
        idx: usize,
        f: impl FnOnce(&mut dyn ElementBehavior, &mut Element) -> R,
    ) -> R {
        let behavior = &mut self.behaviors[idx];
        let element = &mut self.elements[idx];
        f(behavior.as_mut(), element)
    }

    pub(crate) fn mark_all_obsolete(&mut self) {
        for element in &mut self.elements {
            element.mark_obsolete();
        }
    }
}

/// A transient aggregate of elements (and nested groups) that layout code
/// moves or rotates together. Never persisted across generations.
#[derive(Debug, Default)]
pub struct Group {
    members: Vec<GroupMember>,
}

#[derive(Debug)]
enum GroupMember {
    Element(usize),
    Group(Group),
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&mut self, idx: usize) {
        self.members.push(GroupMember::Element(idx));
    }

    pub fn add_group(&mut self, group: Group) {
        self.members.push(GroupMember::Group(group));
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The merged bounds of every member, or `None` for an empty group.
    pub fn bounds(&self, store: &ElementStore) -> Option<Bounds> {
        let mut merged: Option<Bounds> = None;
        for member in &self.members {
            let bounds = match member {
                GroupMember::Element(idx) => Some(store.get(*idx).bounds()),
                GroupMember::Group(group) => group.bounds(store),
            };
            merged = match (merged, bounds) {
                (Some(a), Some(b)) => Some(a.merge(&b)),
                (a, b) => a.or(b),
            };
        }
        merged
    }

    /// Translates every member element by `offset`.
    pub fn translate(&self, store: &mut ElementStore, offset: Point) {
        for member in &self.members {
            match member {
                GroupMember::Element(idx) => store.get_mut(*idx).translate(offset),
                GroupMember::Group(group) => group.translate(store, offset),
            }
        }
    }

    /// Rotates every member element by `angle` radians around the group's
    /// bounds center.
    pub fn rotate(&self, store: &mut ElementStore, angle: f32) {
        let Some(center) = self.bounds(store).map(|b| b.center()) else {
            return;
        };
        self.rotate_around(store, center, angle);
    }

    fn rotate_around(&self, store: &mut ElementStore, center: Point, angle: f32) {
        for member in &self.members {
            match member {
                GroupMember::Element(idx) => {
                    let element = store.get_mut(*idx);
                    let position = element.position().rotate_around(center, angle);
                    element.set_position(position);
                    element.set_rotation(element.rotation() + angle);
                }
                GroupMember::Group(group) => group.rotate_around(store, center, angle),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn element(kind: &str, id: &str, record: Value) -> Element {
        Element::from_record(Key::parse(kind, id), &record)
    }

    #[test]
    fn test_from_record_copies_every_field() {
        let el = element("node", "1", json!({"id": 1, "label": "a", "extra": [1, 2]}));

        assert_eq!(el.field("id"), Some(&json!(1)));
        assert_eq!(el.field("label"), Some(&json!("a")));
        assert_eq!(el.field("extra"), Some(&json!([1, 2])));
        assert_eq!(el.field("missing"), None);
    }

    #[test]
    fn test_moved_tracks_last_position() {
        let mut el = element("node", "1", json!({"id": 1}));
        el.set_last_position(Point::new(5.0, 5.0));
        el.set_position(Point::new(5.0, 5.0));
        assert!(!el.moved());

        el.set_position(Point::new(6.0, 5.0));
        assert!(el.moved());
    }

    #[test]
    fn test_push_link_target_coalesces_into_array() {
        let mut el = element("node", "1", json!({"id": 1}));

        let first = el.push_link_target(
            "next",
            Target {
                raw: json!(2),
                resolved: Some(1),
            },
        );
        let second = el.push_link_target(
            "next",
            Target {
                raw: json!(3),
                resolved: None,
            },
        );

        assert_eq!((first, second), (0, 1));
        assert_eq!(el.link_targets("next").len(), 2);
        assert_eq!(el.link_targets("other").len(), 0);
    }

    #[test]
    fn test_store_indexes_by_key() {
        let mut store = ElementStore::new();
        let idx = store.insert(
            element("node", "1", json!({"id": 1})),
            Box::new(BaseBehavior),
        );

        assert_eq!(store.index_of(&Key::parse("node", "1")), Some(idx));
        assert!(store.by_key(&Key::parse("node", "2")).is_none());
    }

    #[test]
    fn test_group_translate_moves_members() {
        let mut store = ElementStore::new();
        let a = store.insert(
            element("node", "1", json!({"id": 1})),
            Box::new(BaseBehavior),
        );
        let b = store.insert(
            element("node", "2", json!({"id": 2})),
            Box::new(BaseBehavior),
        );
        store.get_mut(a).set_position(Point::new(0.0, 0.0));
        store.get_mut(b).set_position(Point::new(10.0, 0.0));

        let mut group = Group::new();
        group.add_element(a);
        group.add_element(b);
        group.translate(&mut store, Point::new(5.0, 5.0));

        assert_eq!(store.get(a).position(), Point::new(5.0, 5.0));
        assert_eq!(store.get(b).position(), Point::new(15.0, 5.0));
    }

    #[test]
    fn test_group_rotate_spins_around_shared_center() {
        let mut store = ElementStore::new();
        let a = store.insert(
            element("node", "1", json!({"id": 1})),
            Box::new(BaseBehavior),
        );
        let b = store.insert(
            element("node", "2", json!({"id": 2})),
            Box::new(BaseBehavior),
        );
        store.get_mut(a).set_position(Point::new(0.0, 0.0));
        store.get_mut(a).set_size(Size::new(2.0, 2.0));
        store.get_mut(b).set_position(Point::new(10.0, 0.0));
        store.get_mut(b).set_size(Size::new(2.0, 2.0));

        let mut group = Group::new();
        group.add_element(a);
        group.add_element(b);
        // Half turn around the center (5, 0) swaps the two elements
        group.rotate(&mut store, std::f32::consts::PI);

        let pa = store.get(a).position();
        let pb = store.get(b).position();
        assert!((pa.x() - 10.0).abs() < 1e-3 && pa.y().abs() < 1e-3);
        assert!(pb.x().abs() < 1e-3 && pb.y().abs() < 1e-3);
        assert!((store.get(a).rotation() - std::f32::consts::PI).abs() < 1e-6);
    }
}
