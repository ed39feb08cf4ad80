//! The view model: shape-tree ownership, diffing and patch application.
//!
//! The view model owns the shape arena and compares each live shape
//! field-by-field against its previous-generation snapshot, producing typed
//! patches. Patch application copies the new value into the previous slot
//! and requests a kind-tagged attribute update from the renderer, so a
//! second reconciliation with no intervening mutation produces an empty
//! patch list.

use log::debug;

use armilla_core::style::Style;

use crate::{
    config::ViewConfig,
    element::ElementStore,
    render::{Completion, Renderer},
    shape::{Key, MountState, Shape, ShapeRole, ShapeState},
    template,
};

use armilla_core::identifier::Id;

/// The type of one shape patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Add,
    Remove,
    Position,
    Rotation,
    Size,
    Style,
}

/// One scheduled change to one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub shape: Key,
    pub kind: PatchKind,
}

/// Owns the current and previous shape generations.
#[derive(Debug, Default)]
pub struct ViewModel {
    arena: crate::shape::ShapeArena,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &crate::shape::ShapeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut crate::shape::ShapeArena {
        &mut self.arena
    }

    /// Opens a new generation: every live shape becomes unvisited until the
    /// generation's walk claims it again.
    pub fn begin_generation(&mut self) {
        self.arena.begin_generation();
    }

    /// Creates or reuses the shape for `key` and returns its arena index.
    pub fn obtain(
        &mut self,
        key: Key,
        role: ShapeRole,
        catalog: &str,
        element: Option<Key>,
    ) -> usize {
        self.arena.obtain(key, role, catalog, element).0
    }

    /// Re-expands the children of every dirty composite shape.
    ///
    /// Each child is laid out relative to its parent's current state and
    /// then corrected into world space, including rotation about the parent
    /// bounding-box center.
    pub fn expand_composites(&mut self, view: &ViewConfig, store: &ElementStore) {
        for parent_idx in 0..self.arena.len() {
            let parent = self.arena.get(parent_idx);
            if !parent.dirty || parent.role() != ShapeRole::Node || !parent.visited {
                continue;
            }
            let Some(element_key) = parent.element() else {
                continue;
            };
            let kind = element_key.kind().resolve();
            let Some(template) = view.template(&kind) else {
                continue;
            };
            if template.parts().is_empty() {
                continue;
            }

            let parent_key = parent.key();
            let parent_state = parent.state().clone();
            let element = store.by_key(&element_key);

            for part in template.parts().to_vec() {
                let child_key = Key::new(
                    Id::new("part"),
                    Id::new(&format!("{parent_key}:{}", part.name())),
                );
                let child_idx =
                    self.obtain(child_key, ShapeRole::Part, part.catalog(), Some(element_key));

                // Local placement relative to the parent, then world
                // correction: rotate the offset about the parent center.
                let local = parent_state.position.add_point(part.offset());
                let world = local.rotate_around(parent_state.position, parent_state.rotation);

                let content = part.content().map(|tpl| {
                    template::resolve(tpl, |name| {
                        element
                            .and_then(|el| el.field(name))
                            .and_then(template::value_to_text)
                    })
                });

                let child = self.arena.get_mut(child_idx);
                child.state = ShapeState {
                    position: world,
                    rotation: parent_state.rotation,
                    size: part.size(),
                    style: part.style().clone(),
                    endpoints: None,
                    content,
                };
                child.dirty = true;
                self.arena.attach_child(parent_idx, child_idx);
            }
        }
    }

    /// Diffs the shape tree against its previous generation.
    ///
    /// With `shape_only` set this is a pure attribute refresh: only dirty
    /// shapes are scanned and no structural add/remove patches are
    /// produced. Otherwise every live shape is compared field-by-field and
    /// shapes unvisited by the new generation's walk are scheduled for
    /// removal.
    pub fn reconcile(&mut self, shape_only: bool) -> Vec<Patch> {
        let mut patches = Vec::new();

        for idx in 0..self.arena.len() {
            let shape = self.arena.get(idx);
            if !shape.is_live() {
                continue;
            }

            if !shape.visited {
                if shape_only {
                    continue;
                }
                match shape.mount() {
                    MountState::Mounted => patches.push(Patch {
                        shape: shape.key(),
                        kind: PatchKind::Remove,
                    }),
                    MountState::NeedMount => {
                        // Never materialized; drop it without ceremony
                        self.arena.get_mut(idx).mount = MountState::Unmounted;
                    }
                    _ => {}
                }
                continue;
            }

            if shape.mount() == MountState::NeedMount {
                if !shape_only {
                    patches.push(Patch {
                        shape: shape.key(),
                        kind: PatchKind::Add,
                    });
                }
                continue;
            }

            if shape_only && !shape.dirty {
                continue;
            }

            let key = shape.key();
            let state = &shape.state;
            let prev = &shape.prev;

            if state.position != prev.position || state.endpoints != prev.endpoints {
                patches.push(Patch {
                    shape: key,
                    kind: PatchKind::Position,
                });
            }
            if state.rotation != prev.rotation {
                patches.push(Patch {
                    shape: key,
                    kind: PatchKind::Rotation,
                });
            }
            if state.size != prev.size {
                patches.push(Patch {
                    shape: key,
                    kind: PatchKind::Size,
                });
            }
            if state.style.differs_from(&prev.style) || state.content != prev.content {
                patches.push(Patch {
                    shape: key,
                    kind: PatchKind::Style,
                });
            }
        }

        debug!(patches = patches.len(), shape_only = shape_only; "Reconciliation complete");
        patches
    }

    /// Applies a patch list: copies new values into the previous slots,
    /// requests kind-tagged attribute updates, and fires the owning
    /// element's `on_change` hook after each patch.
    pub fn apply_patches(
        &mut self,
        patches: &[Patch],
        renderer: &mut Renderer,
        store: &mut ElementStore,
    ) {
        let timing = renderer.patch_timing();

        for patch in patches {
            let Some(idx) = self.arena.index_of(&patch.shape) else {
                continue;
            };

            match patch.kind {
                PatchKind::Add => {
                    // Registration already happened; resource creation is
                    // deferred to the renderer's mount pass.
                }
                PatchKind::Remove => {
                    let shape = self.arena.get_mut(idx);
                    shape.mount = MountState::NeedUnmount;
                    renderer.request(
                        patch.shape,
                        Style::new().with("visible", false),
                        timing,
                        Completion::Detach(patch.shape),
                    );
                }
                PatchKind::Position => {
                    let shape = self.arena.get_mut(idx);
                    shape.prev.position = shape.state.position;
                    shape.prev.endpoints = shape.state.endpoints;
                    let attrs = position_attrs(shape);
                    renderer.request(patch.shape, attrs, timing, Completion::None);
                }
                PatchKind::Rotation => {
                    let shape = self.arena.get_mut(idx);
                    shape.prev.rotation = shape.state.rotation;
                    let attrs = Style::new().with("rotation", shape.state.rotation);
                    renderer.request(patch.shape, attrs, timing, Completion::None);
                }
                PatchKind::Size => {
                    let shape = self.arena.get_mut(idx);
                    shape.prev.size = shape.state.size;
                    let attrs = Style::new()
                        .with("width", shape.state.size.width())
                        .with("height", shape.state.size.height());
                    renderer.request(patch.shape, attrs, timing, Completion::None);
                }
                PatchKind::Style => {
                    let shape = self.arena.get_mut(idx);
                    let mut attrs = shape.state.style.changed_from(&shape.prev.style);
                    if shape.state.content != shape.prev.content {
                        attrs.set(
                            "content",
                            shape.state.content.clone().unwrap_or_default().as_str(),
                        );
                    }
                    shape.prev.style = shape.state.style.clone();
                    shape.prev.content = shape.state.content.clone();
                    if !attrs.is_empty() {
                        renderer.request(patch.shape, attrs, timing, Completion::None);
                    }
                }
            }

            let element_key = self.arena.get(idx).element();
            if let Some(element_key) = element_key {
                if let Some(element_idx) = store.index_of(&element_key) {
                    store.with_behavior(element_idx, |behavior, element| {
                        behavior.on_change(element, patch.kind);
                    });
                }
            }
        }
    }

    /// Mounts every shape waiting for a backend resource: the drawable
    /// attaches hidden, then immediately receives its full state plus a
    /// show mutation, so entrance animations have a defined start state.
    pub fn mount_pass(&mut self, renderer: &mut Renderer) {
        let timing = renderer.patch_timing();
        for idx in 0..self.arena.len() {
            if self.arena.get(idx).mount() != MountState::NeedMount
                || !self.arena.get(idx).visited
            {
                continue;
            }

            {
                let shape = self.arena.get(idx);
                renderer.mount(shape);
            }

            let shape = self.arena.get_mut(idx);
            shape.mount = MountState::Mounted;
            shape.prev = shape.state.clone();
            let mut attrs = full_attrs(shape);
            attrs.set("visible", true);
            let key = shape.key();
            renderer.request(key, attrs, timing, Completion::None);
        }
    }

    /// Marks a shape's backend resource as torn down. Called once a hide
    /// transition's detach completion runs.
    pub fn mark_unmounted(&mut self, key: &Key) {
        if let Some(idx) = self.arena.index_of(key) {
            self.arena.get_mut(idx).mount = MountState::Unmounted;
        }
    }
}

fn position_attrs(shape: &Shape) -> Style {
    let mut attrs = Style::new()
        .with("x", shape.state.position.x())
        .with("y", shape.state.position.y());
    if let Some((start, end)) = shape.state.endpoints {
        attrs.set("x1", start.x());
        attrs.set("y1", start.y());
        attrs.set("x2", end.x());
        attrs.set("y2", end.y());
    }
    attrs
}

/// The complete attribute snapshot of a shape, used at mount time.
pub(crate) fn full_attrs(shape: &Shape) -> Style {
    let mut attrs = position_attrs(shape);
    attrs.set("rotation", shape.state.rotation);
    attrs.set("width", shape.state.size.width());
    attrs.set("height", shape.state.size.height());
    if let Some(content) = &shape.state.content {
        attrs.set("content", content.as_str());
    }
    for (key, value) in shape.state.style.iter() {
        attrs.set(key.clone(), value.clone());
    }
    attrs
}
