//! Shapes: the renderable units the reconciler diffs and the backend draws.
//!
//! Every shape is registered in a [`ShapeArena`] under a [`Key`], the
//! `(kind, id)` pair that denotes the same logical item across generations.
//! All diffing, reuse and animation correctness depends on a key never being
//! reused for a semantically different item. Composite shapes link to their
//! children by arena index, never by reference, so shape trees stay cycle
//! free.

use std::fmt;

use indexmap::IndexMap;

use armilla_core::{
    geometry::{Point, Size},
    identifier::Id,
    style::Style,
};

/// The `(kind, id)` identity of an element or shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    kind: Id,
    id: Id,
}

impl Key {
    pub fn new(kind: Id, id: Id) -> Self {
        Self { kind, id }
    }

    /// Convenience constructor interning both parts.
    pub fn parse(kind: &str, id: &str) -> Self {
        Self {
            kind: Id::new(kind),
            id: Id::new(id),
        }
    }

    pub fn kind(&self) -> Id {
        self.kind
    }

    pub fn id(&self) -> Id {
        self.id
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Lifecycle of a shape's backend resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Registered in the live tree, resource not yet created.
    NeedMount,
    /// Backend resource exists and is attached.
    Mounted,
    /// Scheduled for removal; resource torn down once the hide
    /// transition completes.
    NeedUnmount,
    /// Resource torn down.
    Unmounted,
}

/// What a shape draws; a hint the backend may use to pick a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRole {
    /// An element's main shape.
    Node,
    /// A link edge between two elements.
    Edge,
    /// A one-way external annotation arrow.
    Pointer,
    /// A text label riding an edge or pointer.
    Label,
    /// A child part of a composite node shape.
    Part,
}

/// The mutable visual state of a shape, kept in current and pre-mutation
/// copies for diffing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeState {
    pub position: Point,
    pub rotation: f32,
    pub size: Size,
    pub style: Style,
    /// World-space endpoints for edge and pointer shapes.
    pub endpoints: Option<(Point, Point)>,
    /// Resolved display text for nodes and labels.
    pub content: Option<String>,
}

/// One renderable unit.
#[derive(Debug)]
pub struct Shape {
    key: Key,
    pub(crate) role: ShapeRole,
    pub(crate) catalog: String,
    pub(crate) element: Option<Key>,
    pub(crate) state: ShapeState,
    pub(crate) prev: ShapeState,
    pub(crate) mount: MountState,
    pub(crate) dirty: bool,
    pub(crate) visited: bool,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
}

impl Shape {
    fn new(key: Key, role: ShapeRole, catalog: &str, element: Option<Key>) -> Self {
        Self {
            key,
            role,
            catalog: catalog.to_string(),
            element,
            state: ShapeState::default(),
            prev: ShapeState::default(),
            mount: MountState::NeedMount,
            dirty: true,
            visited: true,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Prepares a live shape for reuse by a new generation: the current
    /// state is reset to defaults before the new options are reapplied,
    /// while the pre-mutation copy is kept so the diff (and any animation
    /// start state) still sees the previous generation.
    fn reset_for_reuse(&mut self, role: ShapeRole, catalog: &str, element: Option<Key>) {
        self.role = role;
        self.catalog = catalog.to_string();
        self.element = element;
        self.state = ShapeState::default();
        self.dirty = true;
        self.visited = true;
        self.mount = match self.mount {
            // A torn-down resource must be recreated
            MountState::Unmounted => MountState::NeedMount,
            // A shape revived mid-disappearance stays alive
            MountState::NeedUnmount => MountState::Mounted,
            other => other,
        };
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn role(&self) -> ShapeRole {
        self.role
    }

    /// Backend catalog name of the primitive this shape renders as.
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// The owning element, for shapes bound to one.
    pub fn element(&self) -> Option<Key> {
        self.element
    }

    pub fn state(&self) -> &ShapeState {
        &self.state
    }

    pub fn mount(&self) -> MountState {
        self.mount
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.mount, MountState::Unmounted)
    }
}

/// The shape registry: exclusive owner of every shape, keyed by [`Key`].
///
/// Slots are never removed, so arena indices stay stable; an unmounted
/// shape's slot is revived when its key reappears.
#[derive(Debug, Default)]
pub struct ShapeArena {
    shapes: Vec<Shape>,
    index: IndexMap<Key, usize>,
}

impl ShapeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the shape for `key`, or reuses the live one registered under
    /// the same key. Returns the arena index and whether the shape was
    /// newly created.
    pub fn obtain(
        &mut self,
        key: Key,
        role: ShapeRole,
        catalog: &str,
        element: Option<Key>,
    ) -> (usize, bool) {
        if let Some(&idx) = self.index.get(&key) {
            self.shapes[idx].reset_for_reuse(role, catalog, element);
            return (idx, false);
        }
        let idx = self.shapes.len();
        self.shapes.push(Shape::new(key, role, catalog, element));
        self.index.insert(key, idx);
        (idx, true)
    }

    /// Clears the visited flag on every live shape; the new generation's
    /// walk re-marks the shapes it still uses, and unvisited survivors are
    /// scheduled for removal by the reconciler.
    pub fn begin_generation(&mut self) {
        for shape in &mut self.shapes {
            shape.visited = false;
            shape.dirty = false;
        }
    }

    pub fn index_of(&self, key: &Key) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn by_key(&self, key: &Key) -> Option<&Shape> {
        self.index_of(key).map(|idx| &self.shapes[idx])
    }

    pub fn get(&self, idx: usize) -> &Shape {
        &self.shapes[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Shape {
        &mut self.shapes[idx]
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter()
    }

    /// Records `child` as a composite child of `parent`.
    pub fn attach_child(&mut self, parent: usize, child: usize) {
        if !self.shapes[parent].children.contains(&child) {
            self.shapes[parent].children.push(child);
        }
        self.shapes[child].parent = Some(parent);
    }
}
