//! Configuration types for the Armilla engine.
//!
//! Configuration splits into three sections combined by [`EngineConfig`]:
//!
//! - [`StructureConfig`]: which element kinds exist and which fields are
//!   links or pointers.
//! - [`ViewConfig`]: per-kind shape templates, per-link and per-pointer
//!   view settings.
//! - [`AnimationConfig`]: global animation settings; implements
//!   [`serde::Deserialize`] for loading from external sources.
//!
//! The parts that carry code (contact index functions) are installed
//! through builder methods and cannot be deserialized.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use serde::Deserialize;

use armilla_core::{
    geometry::{Insets, Point, Size},
    style::Style,
};

use crate::{anchor::AnchorTable, render::Easing};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    structure: StructureConfig,
    view: ViewConfig,
    animation: AnimationConfig,
}

impl EngineConfig {
    pub fn new(structure: StructureConfig, view: ViewConfig, animation: AnimationConfig) -> Self {
        Self {
            structure,
            view,
            animation,
        }
    }

    pub fn structure(&self) -> &StructureConfig {
        &self.structure
    }

    pub fn view(&self) -> &ViewConfig {
        &self.view
    }

    pub fn animation(&self) -> &AnimationConfig {
        &self.animation
    }
}

/// Declares the element kinds and the link/pointer fields on their records.
#[derive(Debug, Clone, Default)]
pub struct StructureConfig {
    kinds: Vec<String>,
    links: Vec<LinkConfig>,
    pointers: Vec<PointerConfig>,
}

impl StructureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an element kind (builder style).
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    /// Declares a link field (builder style).
    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.links.push(link);
        self
    }

    /// Declares a pointer field (builder style).
    pub fn with_pointer(mut self, pointer: PointerConfig) -> Self {
        self.pointers.push(pointer);
        self
    }

    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    pub fn links(&self) -> &[LinkConfig] {
        &self.links
    }

    pub fn pointers(&self) -> &[PointerConfig] {
        &self.pointers
    }
}

/// How a link field picks its anchor slots.
#[derive(Clone, Default)]
pub enum ContactConfig {
    /// No configured anchors: fall back to dynamic circle-intersection
    /// anchors per endpoint.
    #[default]
    Dynamic,
    /// Fixed slot indices for every edge of this field.
    Fixed { from: usize, to: usize },
    /// Per-edge slot indices, indexed by the edge's ordering index within
    /// a one-to-many field. Orderings beyond the table fall back to
    /// dynamic anchors.
    Table(Vec<(usize, usize)>),
    /// Slot indices computed from the edge's ordering index.
    ByIndex(Rc<dyn Fn(usize) -> (usize, usize)>),
}

impl fmt::Debug for ContactConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactConfig::Dynamic => write!(f, "Dynamic"),
            ContactConfig::Fixed { from, to } => write!(f, "Fixed({from}, {to})"),
            ContactConfig::Table(table) => write!(f, "Table({table:?})"),
            ContactConfig::ByIndex(_) => write!(f, "ByIndex(..)"),
        }
    }
}

impl ContactConfig {
    /// Resolves the anchor slot pair for the edge with the given ordering
    /// index, or `None` for dynamic anchors.
    pub fn resolve(&self, ordering: usize) -> Option<(usize, usize)> {
        match self {
            ContactConfig::Dynamic => None,
            ContactConfig::Fixed { from, to } => Some((*from, *to)),
            ContactConfig::Table(table) => table.get(ordering).copied(),
            ContactConfig::ByIndex(f) => Some(f(ordering)),
        }
    }
}

/// View settings for one declared link field.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    field: String,
    contact: ContactConfig,
    label: Option<String>,
    style: Style,
    bend: f32,
}

impl LinkConfig {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            contact: ContactConfig::Dynamic,
            label: None,
            style: Style::new(),
            bend: 0.0,
        }
    }

    pub fn with_contact(mut self, contact: ContactConfig) -> Self {
        self.contact = contact;
        self
    }

    /// Label template; supports `[field]` and `[target.field]` lookups.
    pub fn with_label(mut self, template: impl Into<String>) -> Self {
        self.label = Some(template.into());
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Sideways offset of the curve control point; zero keeps the edge
    /// straight.
    pub fn with_bend(mut self, bend: f32) -> Self {
        self.bend = bend;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn contact(&self) -> &ContactConfig {
        &self.contact
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn bend(&self) -> f32 {
        self.bend
    }
}

/// View settings for one declared pointer field.
#[derive(Debug, Clone)]
pub struct PointerConfig {
    field: String,
    angle: f32,
    offset: f32,
    length: f32,
    label: Option<String>,
    style: Style,
}

impl PointerConfig {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            angle: -std::f32::consts::FRAC_PI_4,
            offset: 4.0,
            length: 30.0,
            label: None,
            style: Style::new(),
        }
    }

    /// Approach direction in radians; the pointer tail extends away from
    /// the target along this direction.
    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    /// Gap between the target boundary and the arrow tip.
    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_length(mut self, length: f32) -> Self {
        self.length = length;
        self
    }

    pub fn with_label(mut self, template: impl Into<String>) -> Self {
        self.label = Some(template.into());
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn style(&self) -> &Style {
        &self.style
    }
}

/// Per-kind shape templates.
#[derive(Debug, Clone, Default)]
pub struct ViewConfig {
    templates: IndexMap<String, ShapeTemplate>,
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, kind: impl Into<String>, template: ShapeTemplate) -> Self {
        self.templates.insert(kind.into(), template);
        self
    }

    pub fn template(&self, kind: &str) -> Option<&ShapeTemplate> {
        self.templates.get(kind)
    }
}

/// The view template for one element kind.
#[derive(Debug, Clone)]
pub struct ShapeTemplate {
    catalog: String,
    size: Size,
    rotation: f32,
    content: Option<String>,
    size_to_content: bool,
    padding: Insets,
    style: Style,
    anchors: AnchorTable,
    parts: Vec<PartTemplate>,
}

impl ShapeTemplate {
    /// Creates a template rendering as the named backend primitive.
    pub fn new(catalog: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            size: Size::new(40.0, 40.0),
            rotation: 0.0,
            content: None,
            size_to_content: false,
            padding: Insets::uniform(6.0),
            style: Style::new(),
            anchors: AnchorTable::default(),
            parts: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    /// Content template; supports `[field]` lookups against the element.
    pub fn with_content(mut self, template: impl Into<String>) -> Self {
        self.content = Some(template.into());
        self
    }

    /// Sizes the shape to its measured content plus padding instead of the
    /// fixed default size.
    pub fn sized_to_content(mut self) -> Self {
        self.size_to_content = true;
        self
    }

    pub fn with_padding(mut self, padding: Insets) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Overrides the canonical anchor table for this kind.
    pub fn with_anchors(mut self, anchors: AnchorTable) -> Self {
        self.anchors = anchors;
        self
    }

    /// Adds a composite child part.
    pub fn with_part(mut self, part: PartTemplate) -> Self {
        self.parts.push(part);
        self
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn size_to_content(&self) -> bool {
        self.size_to_content
    }

    pub fn padding(&self) -> Insets {
        self.padding
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn anchors(&self) -> &AnchorTable {
        &self.anchors
    }

    pub fn parts(&self) -> &[PartTemplate] {
        &self.parts
    }
}

/// A composite child of a node shape, positioned relative to its parent.
#[derive(Debug, Clone)]
pub struct PartTemplate {
    name: String,
    catalog: String,
    offset: Point,
    size: Size,
    style: Style,
    content: Option<String>,
}

impl PartTemplate {
    pub fn new(name: impl Into<String>, catalog: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalog: catalog.into(),
            offset: Point::default(),
            size: Size::new(10.0, 10.0),
            style: Style::new(),
            content: None,
        }
    }

    /// Offset from the parent center, before parent rotation is applied.
    pub fn with_offset(mut self, offset: Point) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_content(mut self, template: impl Into<String>) -> Self {
        self.content = Some(template.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

/// Global animation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    enabled: bool,
    duration_ms: u32,
    easing: Easing,
    skip_on_busy: bool,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_ms: 300,
            easing: Easing::EaseInOut,
            skip_on_busy: false,
        }
    }
}

impl AnimationConfig {
    pub fn new(enabled: bool, duration_ms: u32, easing: Easing, skip_on_busy: bool) -> Self {
        Self {
            enabled,
            duration_ms,
            easing,
            skip_on_busy,
        }
    }

    /// Animation enabled with the default duration and easing.
    pub fn animated() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    /// When true, an update arriving mid-animation force-completes the
    /// in-flight queue instead of being rejected.
    pub fn skip_on_busy(&self) -> bool {
        self.skip_on_busy
    }

    pub fn with_skip_on_busy(mut self, skip: bool) -> Self {
        self.skip_on_busy = skip;
        self
    }
}
