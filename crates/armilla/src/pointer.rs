//! Pointer resolution: one-way external annotations.
//!
//! A pointer field marks its target with an annotation arrow approaching
//! from a configured direction, the one-way sibling of a link. All
//! pointers aimed at the same target through the same field merge into a
//! single shape carrying one text line per pointing element, so a cloud of
//! identical arrows collapses into one annotated arrow.
//!
//! The model also keeps the cross-generation referred set backing the
//! `on_refer`/`on_unrefer` element hooks.

use indexmap::IndexSet;
use log::trace;
use serde_json::Value;

use armilla_core::{geometry::Point, identifier::Id, style::Style};

use crate::{
    config::{PointerConfig, StructureConfig},
    element::ElementStore,
    shape::Key,
    template,
};

/// One annotation source: the pointing element and its raw descriptor.
#[derive(Debug, Clone)]
pub struct PointerSource {
    pub owner: usize,
    pub raw: Value,
}

/// One merged annotation aimed at a single target element.
#[derive(Debug, Clone)]
pub struct PointerPair {
    field: String,
    target: usize,
    target_key: Key,
    sources: Vec<PointerSource>,
    labels: Vec<String>,
    style: Style,
    shape_key: Key,
    /// Arrow tip (near the target) and tail, in world space.
    tip: Point,
    tail: Point,
    resolved: bool,
    synced: bool,
}

impl PointerPair {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn target_index(&self) -> usize {
        self.target
    }

    pub fn target_key(&self) -> Key {
        self.target_key
    }

    pub fn sources(&self) -> &[PointerSource] {
        &self.sources
    }

    /// One text line per pointing element, in element order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The merged display text: all labels joined into one multi-line body.
    pub fn content(&self) -> Option<String> {
        if self.labels.is_empty() {
            None
        } else {
            Some(self.labels.join("\n"))
        }
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn shape_key(&self) -> Key {
        self.shape_key
    }

    pub fn tip(&self) -> Point {
        self.tip
    }

    pub fn tail(&self) -> Point {
        self.tail
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    fn touches(&self, element: usize) -> bool {
        self.target == element
    }
}

/// Builds and re-anchors the generation's pointer pairs.
#[derive(Debug, Default)]
pub struct PointerModel {
    pairs: Vec<PointerPair>,
    referred: IndexSet<(Key, String)>,
}

impl PointerModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> &[PointerPair] {
        &self.pairs
    }

    pub fn pair(&self, idx: usize) -> &PointerPair {
        &self.pairs[idx]
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Creates one merged pair per (field, target) across all elements and
    /// fires the refer hooks for targets gained or lost since the previous
    /// generation.
    pub fn build(&mut self, store: &mut ElementStore, structure: &StructureConfig) {
        self.clear();

        for config in structure.pointers() {
            let field = config.field();
            for owner_idx in 0..store.len() {
                let targets: Vec<_> = store.get(owner_idx).pointer_targets(field).to_vec();
                for target in targets {
                    let Some(target_idx) = target.resolved else {
                        continue;
                    };
                    self.merge_source(config, target_idx, store, owner_idx, target.raw);
                }
            }
        }

        self.fire_refer_hooks(store);
    }

    fn merge_source(
        &mut self,
        config: &PointerConfig,
        target_idx: usize,
        store: &ElementStore,
        owner_idx: usize,
        raw: Value,
    ) {
        let owner = store.get(owner_idx);
        let label = config.label().map(|tpl| {
            template::resolve(tpl, |name| {
                lookup_pointer_field(name, owner.fields(), &raw)
            })
        });

        let field = config.field();
        let existing = self
            .pairs
            .iter_mut()
            .find(|pair| pair.field == field && pair.target == target_idx);

        match existing {
            Some(pair) => {
                pair.sources.push(PointerSource { owner: owner_idx, raw });
                if let Some(label) = label {
                    pair.labels.push(label);
                }
            }
            None => {
                let target_key = store.get(target_idx).key();
                let shape_key = Key::new(
                    Id::scoped("pointer", field),
                    Id::new(&target_key.to_string()),
                );
                self.pairs.push(PointerPair {
                    field: field.to_string(),
                    target: target_idx,
                    target_key,
                    sources: vec![PointerSource { owner: owner_idx, raw }],
                    labels: label.into_iter().collect(),
                    style: config.style().clone(),
                    shape_key,
                    tip: Point::default(),
                    tail: Point::default(),
                    resolved: false,
                    synced: false,
                });
            }
        }
    }

    fn fire_refer_hooks(&mut self, store: &mut ElementStore) {
        let now: IndexSet<(Key, String)> = self
            .pairs
            .iter()
            .map(|pair| (pair.target_key, pair.field.clone()))
            .collect();

        for (key, field) in &now {
            if !self.referred.contains(&(*key, field.clone())) {
                if let Some(idx) = store.index_of(key) {
                    store.with_behavior(idx, |behavior, element| {
                        behavior.on_refer(element, field);
                    });
                }
            }
        }

        let previous = std::mem::take(&mut self.referred);
        for (key, field) in previous {
            if !now.contains(&(key, field.clone())) {
                // Fires only while the formerly referred element still exists
                if let Some(idx) = store.index_of(&key) {
                    store.with_behavior(idx, |behavior, element| {
                        behavior.on_unrefer(element, &field);
                    });
                }
            }
        }

        self.referred = now;
    }

    /// Resolves the arrow geometry for every pair not yet synced this
    /// generation.
    pub fn resolve_geometry(&mut self, store: &ElementStore, structure: &StructureConfig) {
        for pair in &mut self.pairs {
            if pair.synced {
                continue;
            }
            pair.synced = true;

            let target = store.get(pair.target);
            if target.is_obsolete() {
                continue;
            }
            let Some(config) = structure.pointers().iter().find(|p| p.field() == pair.field)
            else {
                continue;
            };

            let direction = Point::new(config.angle().cos(), config.angle().sin());
            let radius = target.size().max_side() / 2.0;
            let boundary = target
                .position()
                .add_point(direction.scale(radius + config.offset()));

            pair.tip = boundary;
            pair.tail = boundary.add_point(direction.scale(config.length()));
            pair.resolved = true;
            trace!(pointer:% = pair.shape_key; "Pointer geometry resolved");
        }
    }

    /// Clears the sync guard on pairs aimed at one of the given elements.
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
}

/// Pointer label lookup: plain `[field]` reads the pointing element and
/// falls back to the raw descriptor; `[target.field]` reads the raw
/// descriptor only.
fn lookup_pointer_field(
    name: &str,
    owner_fields: &indexmap::IndexMap<String, Value>,
    raw: &Value,
) -> Option<String> {
    if let Some(raw_field) = name.strip_prefix("target.") {
        return raw.get(raw_field).and_then(template::value_to_text);
    }
    owner_fields
        .get(name)
        .and_then(template::value_to_text)
        .or_else(|| raw.get(name).and_then(template::value_to_text))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use armilla_core::geometry::Size;

    use crate::element::{BaseBehavior, Element, ElementBehavior, Target};

    use super::*;

    fn fixture_store() -> ElementStore {
        let mut store = ElementStore::new();
        let mut target = Element::from_record(Key::parse("node", "1"), &json!({"id": 1}));
        target.set_position(Point::new(50.0, 50.0));
        target.set_size(Size::new(20.0, 20.0));
        store.insert(target, Box::new(BaseBehavior));

        let head = Element::from_record(
            Key::parse("var", "head"),
            &json!({"id": "head", "name": "head"}),
        );
        store.insert(head, Box::new(BaseBehavior));
        let tail = Element::from_record(
            Key::parse("var", "tail"),
            &json!({"id": "tail", "name": "tail"}),
        );
        store.insert(tail, Box::new(BaseBehavior));
        store
    }

    fn point_at(store: &mut ElementStore, owner: usize, field: &str, target_idx: usize) {
        store.get_mut(owner).push_pointer_target(
            field,
            Target {
                raw: json!(1),
                resolved: Some(target_idx),
            },
        );
    }

    fn structure() -> StructureConfig {
        StructureConfig::new()
            .with_kind("node")
            .with_kind("var")
            .with_pointer(PointerConfig::new("ref").with_label("[name]").with_angle(0.0))
    }

    #[test]
    fn test_pointers_at_same_target_merge() {
        let mut store = fixture_store();
        point_at(&mut store, 1, "ref", 0);
        point_at(&mut store, 2, "ref", 0);

        let mut model = PointerModel::new();
        model.build(&mut store, &structure());

        assert_eq!(model.len(), 1);
        let pair = model.pair(0);
        assert_eq!(pair.sources().len(), 2);
        assert_eq!(pair.labels(), &["head".to_string(), "tail".to_string()]);
        assert_eq!(pair.content(), Some("head\ntail".to_string()));
    }

    #[test]
    fn test_geometry_extends_along_configured_angle() {
        let mut store = fixture_store();
        point_at(&mut store, 1, "ref", 0);

        let structure = structure();
        let mut model = PointerModel::new();
        model.build(&mut store, &structure);
        model.resolve_geometry(&store, &structure);

        let pair = model.pair(0);
        assert!(pair.is_resolved());
        // Angle 0: arrow approaches from the right; radius 10 + offset 4
        assert_eq!(pair.tip(), Point::new(64.0, 50.0));
        assert_eq!(pair.tail(), Point::new(94.0, 50.0));
    }

    #[derive(Default)]
    struct ReferProbe {
        refers: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    impl ElementBehavior for ReferProbe {
        fn on_refer(&mut self, _element: &mut Element, _field: &str) {
            self.refers.borrow_mut().push("refer");
        }

        fn on_unrefer(&mut self, _element: &mut Element, _field: &str) {
            self.refers.borrow_mut().push("unrefer");
        }
    }

    #[test]
    fn test_refer_hooks_fire_on_gain_and_loss() {
        let events = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));

        let mut store = ElementStore::new();
        let mut target = Element::from_record(Key::parse("node", "1"), &json!({"id": 1}));
        target.set_size(Size::new(20.0, 20.0));
        store.insert(
            target,
            Box::new(ReferProbe {
                refers: events.clone(),
            }),
        );
        let pointer = Element::from_record(Key::parse("var", "p"), &json!({"id": "p"}));
        store.insert(pointer, Box::new(BaseBehavior));
        point_at(&mut store, 1, "ref", 0);

        let structure = structure();
        let mut model = PointerModel::new();
        model.build(&mut store, &structure);
        assert_eq!(*events.borrow(), vec!["refer"]);

        // Next generation: the pointer is gone, the target remains.
        // The same behavior box stays bound through the new store.
        let mut next = ElementStore::new();
        let mut target = Element::from_record(Key::parse("node", "1"), &json!({"id": 1}));
        target.set_size(Size::new(20.0, 20.0));
        next.insert(
            target,
            Box::new(ReferProbe {
                refers: events.clone(),
            }),
        );
        model.build(&mut next, &structure);

        assert_eq!(*events.borrow(), vec!["refer", "unrefer"]);
    }
}
