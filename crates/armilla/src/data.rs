//! The data model: element construction, reference resolution and the
//! binding mechanism that keeps shapes synchronized with elements.
//!
//! Construction is two-phase: first every record becomes an element, then
//! every declared link/pointer field is rewritten from raw ids and
//! descriptors into element references. An id that resolves to nothing is
//! not an error: the field entry stays as a `None` hole and no edge is
//! drawn for it, so partially inconsistent snapshots degrade gracefully.
//! Configuration problems (a record kind without a view template, a record
//! without an id) are fatal and surface immediately.

use std::fmt;

use indexmap::IndexMap;
use log::{debug, info, trace};
use serde_json::{Value, json};

use armilla_core::geometry::Size;

use crate::{
    config::EngineConfig,
    element::{BaseBehavior, Element, ElementBehavior, ElementStore, Target},
    error::ArmillaError,
    label::LabelPlacer,
    link::{LinkModel, LinkPair},
    pointer::{PointerModel, PointerPair},
    render::Renderer,
    shape::{Key, ShapeRole},
    source::{Snapshot, record_id, value_id},
    template,
    view::ViewModel,
};

/// Creates the behavior for a newly constructed element of one kind.
pub type BehaviorCtor = Box<dyn Fn() -> Box<dyn ElementBehavior>>;

/// Per-kind element constructors, owned by one engine instance.
#[derive(Default)]
pub struct BehaviorRegistry {
    ctors: IndexMap<String, BehaviorCtor>,
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("kinds", &self.ctors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for elements of `kind`.
    pub fn register(&mut self, kind: impl Into<String>, ctor: BehaviorCtor) {
        self.ctors.insert(kind.into(), ctor);
    }

    /// Creates the behavior for `kind`, defaulting to the no-op base.
    pub fn create(&self, kind: &str) -> Box<dyn ElementBehavior> {
        match self.ctors.get(kind) {
            Some(ctor) => ctor(),
            None => Box::new(BaseBehavior),
        }
    }
}

/// One per-generation binding: an update action attached to shapes,
/// invoked every generation to keep them synchronized without coupling
/// elements to rendering.
pub enum Binding {
    /// Synchronizes the edge (and label) shapes of one link pair.
    LinkEdge(usize),
    /// Synchronizes the arrow shape of one pointer pair.
    PointerEdge(usize),
    /// A caller-supplied update function.
    Custom(Box<dyn Fn(&ElementStore, &mut ViewModel)>),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::LinkEdge(idx) => write!(f, "LinkEdge({idx})"),
            Binding::PointerEdge(idx) => write!(f, "PointerEdge({idx})"),
            Binding::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Builds elements from snapshots and drives the per-generation shape
/// synchronization.
#[derive(Debug, Default)]
pub struct DataModel {
    store: ElementStore,
    links: LinkModel,
    pointers: PointerModel,
    bindings: Vec<Binding>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ElementStore {
        &mut self.store
    }

    pub fn links(&self) -> &LinkModel {
        &self.links
    }

    pub fn pointers(&self) -> &PointerModel {
        &self.pointers
    }

    /// Builds the generation's elements from a snapshot and resolves every
    /// declared link and pointer field.
    pub fn construct_elements(
        &mut self,
        snapshot: &Snapshot,
        config: &EngineConfig,
        registry: &BehaviorRegistry,
    ) -> Result<(), ArmillaError> {
        let per_kind = snapshot.per_kind(config.structure().kinds())?;

        // The superseded generation is obsolete from here on; lookups into
        // it only serve position carry-over.
        let mut old = std::mem::take(&mut self.store);
        old.mark_all_obsolete();

        for (kind, records) in &per_kind {
            if config.view().template(kind).is_none() {
                return Err(ArmillaError::UnknownKind(kind.clone()));
            }
            let template = config.view().template(kind).expect("checked above");

            for record in records {
                if record.is_null() {
                    continue;
                }
                let Some(id) = record_id(record) else {
                    return Err(ArmillaError::MissingId(kind.clone()));
                };
                let key = Key::parse(kind, &id);

                let mut element = Element::from_record(key, record);
                element.set_size(template.size());
                element.set_rotation(template.rotation());
                *element.style_mut() = template.style().clone();

                // Carry the previous position across so layout can start
                // from it and movement stays detectable.
                if let Some(previous) = old.by_key(&key) {
                    element.set_position(previous.position());
                    element.set_last_position(previous.position());
                }

                self.store.insert(element, registry.create(kind));
            }
        }

        info!(elements = self.store.len(); "Elements constructed");
        self.resolve_references(config);
        Ok(())
    }

    /// Rewrites every declared link/pointer field from raw ids and
    /// descriptors into element references, firing `on_link` per resolved
    /// link target. Unresolved references become `None` holes.
    fn resolve_references(&mut self, config: &EngineConfig) {
        let mut link_hooks = Vec::new();

        for idx in 0..self.store.len() {
            for link in config.structure().links() {
                let field = link.field();
                let Some(raw) = self.store.get(idx).field(field).cloned() else {
                    continue;
                };
                let targets = self.resolve_field(&raw);
                for target in targets.iter() {
                    if let Some(to) = target.resolved {
                        link_hooks.push((idx, field.to_string(), self.store.get(to).key()));
                    }
                }
                self.store.get_mut(idx).set_link_targets(field, targets);
            }

            for pointer in config.structure().pointers() {
                let field = pointer.field();
                let Some(raw) = self.store.get(idx).field(field).cloned() else {
                    continue;
                };
                let targets = self.resolve_field(&raw);
                self.store.get_mut(idx).set_pointer_targets(field, targets);
            }
        }

        for (idx, field, target) in link_hooks {
            self.store.with_behavior(idx, |behavior, element| {
                behavior.on_link(element, &field, target);
            });
        }
    }

    /// Resolves one raw field value into a target list. A scalar becomes a
    /// single-entry list; an array resolves entry by entry, keeping `None`
    /// holes so surviving indices stay aligned.
    fn resolve_field(&self, raw: &Value) -> Vec<Target> {
        let entries: Vec<&Value> = match raw {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        };

        entries
            .into_iter()
            .map(|entry| Target {
                raw: entry.clone(),
                resolved: self.find_target(entry),
            })
            .collect()
    }

    /// Finds the element a raw target denotes: a descriptor carrying a
    /// `kind` looks up directly, anything else matches by id across kinds.
    fn find_target(&self, raw: &Value) -> Option<usize> {
        let id = value_id(raw)?;
        if let Some(Value::String(kind)) = raw.get("kind") {
            return self.store.index_of(&Key::parse(kind, &id));
        }
        self.store.iter().position(|el| {
            !el.is_obsolete() && el.id() == id.as_str()
        })
    }

    /// Declares an edge absent from the raw source, the layout-time
    /// extension point. A second target on the same field coalesces the
    /// scalar into an array.
    pub fn add_link(&mut self, from: Key, field: &str, to: Key) -> bool {
        let (Some(from_idx), Some(to_idx)) =
            (self.store.index_of(&from), self.store.index_of(&to))
        else {
            return false;
        };
        let raw = json!({ "id": to.id().resolve() });
        self.store.get_mut(from_idx).push_link_target(
            field,
            Target {
                raw,
                resolved: Some(to_idx),
            },
        );
        self.store.with_behavior(from_idx, |behavior, element| {
            behavior.on_link(element, field, to);
        });
        true
    }

    /// Declares a pointer absent from the raw source.
    pub fn add_pointer(&mut self, from: Key, field: &str, to: Key) -> bool {
        let (Some(from_idx), Some(to_idx)) =
            (self.store.index_of(&from), self.store.index_of(&to))
        else {
            return false;
        };
        let raw = json!({ "id": to.id().resolve() });
        self.store.get_mut(from_idx).push_pointer_target(
            field,
            Target {
                raw,
                resolved: Some(to_idx),
            },
        );
        true
    }

    /// Attaches a caller-supplied binding for this generation.
    pub fn bind(&mut self, update: Box<dyn Fn(&ElementStore, &mut ViewModel)>) {
        self.bindings.push(Binding::Custom(update));
    }

    /// The drawing stage: resolves display content, sizes
    /// content-measured shapes, creates/reuses the shape for every
    /// element, and delegates edge construction to the link and pointer
    /// models.
    pub fn draw_components(
        &mut self,
        config: &EngineConfig,
        view: &mut ViewModel,
        renderer: &Renderer,
    ) {
        for idx in 0..self.store.len() {
            let element = self.store.get(idx);
            let kind = element.kind().resolve();
            let template = config
                .view()
                .template(&kind)
                .expect("kind validated at construction");

            if template.size_to_content() {
                if let Some(content) = resolve_content(element, template.content()) {
                    let measured = renderer
                        .measure_text(&content, template.style())
                        .add_padding(template.padding())
                        .max(Size::new(10.0, 10.0));
                    self.store.get_mut(idx).set_size(measured);
                }
            }

            let element = self.store.get(idx);
            let key = element.key();
            view.obtain(key, ShapeRole::Node, template.catalog(), Some(key));
            self.store.get_mut(idx).bind_shape(key);
        }

        // Edge construction: pairs are recreated from scratch every
        // generation; their shapes are obtained when the bindings run.
        self.links.build(&self.store, config.structure());
        self.pointers.build(&mut self.store, config.structure());

        self.bindings.retain(|b| matches!(b, Binding::Custom(_)));
        let mut generated = Vec::new();
        for idx in 0..self.links.len() {
            generated.push(Binding::LinkEdge(idx));
        }
        for idx in 0..self.pointers.len() {
            generated.push(Binding::PointerEdge(idx));
        }
        self.bindings.splice(0..0, generated);

        debug!(
            links = self.links.len(),
            pointers = self.pointers.len(),
            bindings = self.bindings.len();
            "Components drawn",
        );
    }

    /// Pushes live element geometry and style into bound shapes, re-anchors
    /// every edge with a moved endpoint exactly once, places labels, and
    /// runs the bindings.
    pub fn update_shapes(
        &mut self,
        config: &EngineConfig,
        view: &mut ViewModel,
        renderer: &Renderer,
        subset: Option<&[usize]>,
    ) {
        let indices: Vec<usize> = match subset {
            Some(indices) => indices.to_vec(),
            None => (0..self.store.len()).collect(),
        };

        // Movement must be read before the push resets the last-position
        // bookkeeping.
        let moved: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&idx| !self.store.get(idx).is_obsolete() && self.store.get(idx).moved())
            .collect();

        for &idx in &indices {
            if self.store.get(idx).is_obsolete() {
                continue;
            }
            self.push_element_state(idx, config, view);
            let position = self.store.get(idx).position();
            self.store.get_mut(idx).set_last_position(position);
        }

        // The sync guard makes each touched pair re-anchor once even when
        // both of its endpoints moved.
        let relinked = self.links.mark_unsynced_for(&moved);
        self.pointers.mark_unsynced_for(&moved);
        if relinked > 0 {
            trace!(edges = relinked; "Re-anchoring edges with moved endpoints");
        }
        self.links.resolve_geometry(&self.store, config.view());
        self.pointers.resolve_geometry(&self.store, config.structure());

        let mut placer = LabelPlacer::new();
        self.links
            .place_labels(&mut placer, |text| renderer.measure_text(text, &Default::default()));

        for binding in &self.bindings {
            match binding {
                Binding::LinkEdge(idx) => sync_link_shapes(self.links.pair(*idx), view),
                Binding::PointerEdge(idx) => sync_pointer_shape(self.pointers.pair(*idx), view),
                Binding::Custom(update) => update(&self.store, view),
            }
        }
    }

    fn push_element_state(&mut self, idx: usize, config: &EngineConfig, view: &mut ViewModel) {
        let element = self.store.get(idx);
        let Some(shape_key) = element.shape_key() else {
            return;
        };
        let Some(shape_idx) = view.arena().index_of(&shape_key) else {
            return;
        };

        let kind = element.kind().resolve();
        let content = config
            .view()
            .template(&kind)
            .and_then(|template| resolve_content(element, template.content()));

        {
            let shape = view.arena_mut().get_mut(shape_idx);
            shape.state.position = element.position();
            shape.state.rotation = element.rotation();
            shape.state.size = element.size();
            shape.state.style = element.style().clone();
            shape.state.content = content;
            shape.dirty = true;
        }

        // Subclass hook gets the last word on the bound shape
        self.store.with_behavior(idx, |behavior, element| {
            behavior.update_shape(element, view.arena_mut().get_mut(shape_idx));
        });
    }
}

/// Resolves a content template against an element's fields.
fn resolve_content(element: &Element, tpl: Option<&str>) -> Option<String> {
    tpl.map(|tpl| {
        template::resolve(tpl, |name| {
            element.field(name).and_then(template::value_to_text)
        })
    })
}

fn sync_link_shapes(pair: &LinkPair, view: &mut ViewModel) {
    if !pair.is_resolved() {
        // Drawn only if both anchors resolve
        return;
    }

    let idx = view.obtain(pair.shape_key(), ShapeRole::Edge, "link", None);
    {
        let shape = view.arena_mut().get_mut(idx);
        let (start, end) = (pair.start(), pair.end());
        shape.state.endpoints = Some((start, end));
        shape.state.position = start.midpoint(end);
        shape.state.size = start.to_bounds(Size::default()).merge(&end.to_bounds(Size::default())).to_size();
        shape.state.style = pair.style().clone();
        shape.dirty = true;
    }

    if let (Some(label_key), Some(text)) = (pair.label_key(), pair.label()) {
        let text = text.to_string();
        let label_idx = view.obtain(label_key, ShapeRole::Label, "label", None);
        let shape = view.arena_mut().get_mut(label_idx);
        shape.state.position = pair.label_position();
        shape.state.size = pair.label_size();
        shape.state.content = Some(text);
        shape.dirty = true;
    }
}

fn sync_pointer_shape(pair: &PointerPair, view: &mut ViewModel) {
    if !pair.is_resolved() {
        return;
    }

    let idx = view.obtain(pair.shape_key(), ShapeRole::Pointer, "pointer", None);
    let shape = view.arena_mut().get_mut(idx);
    let (tail, tip) = (pair.tail(), pair.tip());
    shape.state.endpoints = Some((tail, tip));
    shape.state.position = tail.midpoint(tip);
    shape.state.content = pair.content();
    shape.state.style = pair.style().clone();
    shape.dirty = true;
}
