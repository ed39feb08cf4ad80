//! Armilla - a data-bound diagram engine with incremental reconciliation.
//!
//! Armilla turns abstract data snapshots (records with link and pointer
//! fields) into a continuously maintained diagram: elements are built from
//! records, a caller-supplied layout function positions them, links and
//! pointers resolve to anchor points, and the shape tree is diffed against
//! the previous generation so only what changed reaches the rendering
//! backend, optionally animated.
//!
//! # Examples
//!
//! ```
//! use armilla::{Diagram, Snapshot};
//! use armilla::backend::NullBackend;
//! use armilla::config::{
//!     AnimationConfig, EngineConfig, LinkConfig, ShapeTemplate, StructureConfig, ViewConfig,
//! };
//! use armilla::geometry::{Point, Size};
//! use serde_json::json;
//!
//! let config = EngineConfig::new(
//!     StructureConfig::new()
//!         .with_kind("node")
//!         .with_link(LinkConfig::new("next")),
//!     ViewConfig::new().with_template("node", ShapeTemplate::new("rectangle")),
//!     AnimationConfig::default(),
//! );
//!
//! let mut diagram = Diagram::new(config, Box::new(NullBackend::default()))
//!     .with_container(Size::new(800.0, 600.0));
//!
//! diagram.set_layout(|pass| {
//!     let width = pass.container().width();
//!     for (i, element) in pass.elements_mut().enumerate() {
//!         element.set_position(Point::new(i as f32 * width / 4.0 + 50.0, 100.0));
//!     }
//! });
//!
//! diagram
//!     .update(Snapshot::from_records(vec![
//!         json!({"id": 1, "next": 2}),
//!         json!({"id": 2}),
//!     ]))
//!     .unwrap();
//! ```

pub mod anchor;
pub mod backend;
pub mod config;
pub mod data;
pub mod element;
pub mod label;
pub mod link;
pub mod observer;
pub mod pointer;
pub mod render;
pub mod shape;
pub mod source;
pub mod template;
pub mod view;

mod error;

pub use armilla_core::{color, geometry, identifier, style};

pub use error::ArmillaError;
pub use observer::SourceObserver;
pub use shape::Key;
pub use source::Snapshot;

use indexmap::IndexMap;
use log::{debug, info};

use armilla_core::geometry::Size;

use crate::{
    backend::{RenderBackend, TweenHandle},
    config::EngineConfig,
    data::{BehaviorCtor, BehaviorRegistry, DataModel},
    element::{Element, ElementStore},
    render::{Completion, Renderer},
    shape::Shape,
    view::ViewModel,
};

/// The user layout extension point: positions elements within the
/// container each generation.
pub type LayoutFn = Box<dyn FnMut(&mut LayoutPass<'_>)>;

/// What an update call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new generation ran.
    Applied,
    /// The snapshot was deep-equal to the previous one; nothing ran.
    Unchanged,
}

/// The layout function's window into one generation.
///
/// Layout code is free to mutate element geometry, declare extra edges and
/// pointers, and move grouped subtrees together.
pub struct LayoutPass<'a> {
    model: &'a mut DataModel,
    container: Size,
}

impl LayoutPass<'_> {
    /// The container dimensions available for placement.
    pub fn container(&self) -> Size {
        self.container
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.model.store().iter()
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.model.store_mut().iter_mut()
    }

    pub fn element(&self, key: &Key) -> Option<&Element> {
        self.model.store().by_key(key)
    }

    pub fn element_mut(&mut self, key: &Key) -> Option<&mut Element> {
        self.model.store_mut().by_key_mut(key)
    }

    pub fn index_of(&self, key: &Key) -> Option<usize> {
        self.model.store().index_of(key)
    }

    /// Direct store access for [`element::Group`] operations.
    pub fn store_mut(&mut self) -> &mut ElementStore {
        self.model.store_mut()
    }

    /// Declares a link edge absent from the raw source.
    pub fn add_link(&mut self, from: Key, field: &str, to: Key) -> bool {
        self.model.add_link(from, field, to)
    }

    /// Declares a pointer absent from the raw source.
    pub fn add_pointer(&mut self, from: Key, field: &str, to: Key) -> bool {
        self.model.add_pointer(from, field, to)
    }
}

/// A data-bound diagram: owns the whole update pipeline from snapshot to
/// backend mutations.
pub struct Diagram {
    config: EngineConfig,
    registry: BehaviorRegistry,
    model: DataModel,
    view: ViewModel,
    renderer: Renderer,
    layout: Option<LayoutFn>,
    container: Option<Size>,
    prev_snapshot: Option<Snapshot>,
    observer: Option<SourceObserver>,
    on_settled: Option<Box<dyn FnMut()>>,
    generation: u64,
}

impl Diagram {
    /// Creates a diagram rendering through the given backend.
    pub fn new(config: EngineConfig, backend: Box<dyn RenderBackend>) -> Self {
        let renderer = Renderer::new(backend, config.animation().clone());
        Self {
            config,
            registry: BehaviorRegistry::new(),
            model: DataModel::new(),
            view: ViewModel::new(),
            renderer,
            layout: None,
            container: None,
            prev_snapshot: None,
            observer: None,
            on_settled: None,
            generation: 0,
        }
    }

    /// Sets the container dimensions (builder style). Updates fail until a
    /// container is configured.
    pub fn with_container(mut self, size: Size) -> Self {
        self.container = Some(size);
        self
    }

    pub fn set_container(&mut self, size: Size) {
        self.container = Some(size);
    }

    /// Installs the layout function invoked each generation.
    pub fn set_layout(&mut self, layout: impl FnMut(&mut LayoutPass<'_>) + 'static) {
        self.layout = Some(Box::new(layout));
    }

    /// Registers an element constructor for one kind.
    pub fn register_behavior(&mut self, kind: impl Into<String>, ctor: BehaviorCtor) {
        self.registry.register(kind, ctor);
    }

    /// Installs the callback fired once a generation's render queue drains.
    pub fn on_settled(&mut self, callback: impl FnMut() + 'static) {
        self.on_settled = Some(Box::new(callback));
    }

    /// Runs one full update generation from a snapshot.
    ///
    /// A snapshot deep-equal to the previous one is a no-op. While a
    /// previous generation's animation is in flight the update is rejected
    /// with [`ArmillaError::Busy`], unless skip-on-busy is enabled, in
    /// which case the in-flight queue is force-completed first; two
    /// pipelines never run concurrently.
    pub fn update(&mut self, snapshot: Snapshot) -> Result<UpdateOutcome, ArmillaError> {
        if self.container.is_none() {
            return Err(ArmillaError::MissingContainer);
        }

        if self.prev_snapshot.as_ref() == Some(&snapshot) {
            debug!("Snapshot unchanged; skipping generation");
            return Ok(UpdateOutcome::Unchanged);
        }

        if !self.renderer.is_idle() {
            if self.renderer.animation().skip_on_busy() {
                let completions = self.renderer.force_complete_all();
                self.apply_completions(completions);
            } else {
                return Err(ArmillaError::Busy);
            }
        }

        self.run_generation(&snapshot)?;

        if let Some(observer) = &self.observer {
            observer.shared().borrow_mut().snapshot = snapshot.clone();
        }
        self.prev_snapshot = Some(snapshot);
        Ok(UpdateOutcome::Applied)
    }

    fn run_generation(&mut self, snapshot: &Snapshot) -> Result<(), ArmillaError> {
        self.generation += 1;
        info!(generation = self.generation; "Starting update generation");

        self.model
            .construct_elements(snapshot, &self.config, &self.registry)?;

        if let Some(mut layout) = self.layout.take() {
            let container = self.container.expect("checked by update");
            let mut pass = LayoutPass {
                model: &mut self.model,
                container,
            };
            layout(&mut pass);
            self.layout = Some(layout);
        }

        self.view.begin_generation();
        self.model
            .draw_components(&self.config, &mut self.view, &self.renderer);
        self.model
            .update_shapes(&self.config, &mut self.view, &self.renderer, None);
        self.view
            .expand_composites(self.config.view(), self.model.store());

        let patches = self.view.reconcile(false);
        self.view
            .apply_patches(&patches, &mut self.renderer, self.model.store_mut());
        self.view.mount_pass(&mut self.renderer);

        let outcome = self.renderer.flush();
        self.apply_completions(outcome.completions);
        self.maybe_settle();

        info!(
            generation = self.generation,
            patches = patches.len(),
            animated = outcome.animated;
            "Generation complete",
        );
        Ok(())
    }

    /// Triggers a partial, non-structural re-render for a subset of
    /// elements: the interaction layer's entry point after it moved
    /// elements directly.
    pub fn refresh(&mut self, keys: &[Key]) {
        let indices: Vec<usize> = keys
            .iter()
            .filter_map(|key| self.model.store().index_of(key))
            .collect();
        if indices.is_empty() {
            return;
        }

        self.model
            .update_shapes(&self.config, &mut self.view, &self.renderer, Some(&indices));
        self.view
            .expand_composites(self.config.view(), self.model.store());

        let patches = self.view.reconcile(true);
        self.view
            .apply_patches(&patches, &mut self.renderer, self.model.store_mut());

        let outcome = self.renderer.flush();
        self.apply_completions(outcome.completions);
    }

    /// Creates the observer handle for reactive snapshot mutation, seeded
    /// from the current snapshot. Mutations apply on the next [`tick`].
    ///
    /// [`tick`]: Diagram::tick
    pub fn observe(&mut self) -> SourceObserver {
        let seed = self
            .prev_snapshot
            .clone()
            .unwrap_or_else(|| Snapshot::from_kinds(IndexMap::new()));
        let observer = SourceObserver::new(seed);
        self.observer = Some(observer.clone());
        observer
    }

    /// The frame tick: re-enters the pipeline once if observer mutations
    /// are pending, however many there were. Returns whether a generation
    /// ran.
    pub fn tick(&mut self) -> Result<bool, ArmillaError> {
        let Some(observer) = self.observer.clone() else {
            return Ok(false);
        };
        let state = observer.shared();
        let (requested, snapshot) = {
            let state = state.borrow();
            if state.requested == state.handled {
                return Ok(false);
            }
            (state.requested, state.snapshot.clone())
        };

        // Marked handled only after a successful run so a rejected update
        // is retried on the next tick.
        self.update(snapshot)?;
        state.borrow_mut().handled = requested;
        Ok(true)
    }

    /// Reports one finished tween, forwarded from the backend's tween
    /// facility. Once the generation's queue drains, the settled callback
    /// fires, unless the queue was force-completed by a newer generation.
    pub fn complete_animation(&mut self, handle: TweenHandle) {
        if let Some(completion) = self.renderer.complete(handle) {
            self.apply_completions(vec![completion]);
            self.maybe_settle();
        }
    }

    fn apply_completions(&mut self, completions: Vec<Completion>) {
        for completion in completions {
            if let Completion::Detach(key) = completion {
                self.renderer.unmount(&key);
                self.view.mark_unmounted(&key);
            }
        }
    }

    fn maybe_settle(&mut self) {
        if self.renderer.queue_settled() {
            if let Some(callback) = self.on_settled.as_mut() {
                callback();
            }
        }
    }

    /// True while animated mutations from the last generation are still in
    /// flight.
    pub fn is_animating(&self) -> bool {
        !self.renderer.is_idle()
    }

    /// The number of generations run so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.model.store().iter()
    }

    pub fn element(&self, key: &Key) -> Option<&Element> {
        self.model.store().by_key(key)
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.view.arena().iter()
    }

    pub fn shape(&self, key: &Key) -> Option<&Shape> {
        self.view.arena().by_key(key)
    }

    /// Attaches a caller-supplied binding invoked every generation.
    pub fn bind(&mut self, update: Box<dyn Fn(&ElementStore, &mut ViewModel)>) {
        self.model.bind(update);
    }
}
