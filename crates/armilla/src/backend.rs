//! The rendering backend port.
//!
//! The engine never draws; it hands shapes and attribute bundles to a
//! [`RenderBackend`] implementation. A concrete backend (canvas, SVG DOM,
//! GPU scene graph) lives outside this crate; [`NullBackend`] discards
//! everything and [`RecordingBackend`] captures the call stream for tests
//! and host glue that wants to inspect what the engine asked for.

use std::{cell::RefCell, rc::Rc};

use armilla_core::{geometry::Size, style::Style};

use crate::{
    render::Tween,
    shape::{Key, Shape},
};

/// Identifies one in-flight animated mutation.
pub type TweenHandle = u64;

/// The drawing-side collaborator of the engine.
pub trait RenderBackend {
    /// Creates and attaches the drawable for a shape. The drawable attaches
    /// hidden; the renderer immediately queues a show mutation so entrance
    /// animations have a defined start state.
    fn mount(&mut self, shape: &Shape);

    /// Tears down the drawable for a key.
    fn unmount(&mut self, key: &Key);

    /// Applies an attribute bundle synchronously.
    fn apply(&mut self, key: &Key, attrs: &Style);

    /// Starts tweening an attribute bundle; the returned handle is reported
    /// back through the engine once the tween completes.
    fn animate(&mut self, key: &Key, attrs: &Style, tween: Tween) -> TweenHandle;

    /// Jumps an in-flight tween to its end state.
    fn finish(&mut self, handle: TweenHandle);

    /// Synchronous off-screen content measurement.
    ///
    /// The default is a coarse monospace estimate; a real backend measures
    /// with its own text machinery.
    fn measure_text(&self, content: &str, style: &Style) -> Size {
        let _ = style;
        let lines = content.lines().count().max(1);
        let widest = content.lines().map(str::len).max().unwrap_or(0);
        Size::new(widest as f32 * 7.0, lines as f32 * 14.0)
    }
}

/// A backend that draws nothing.
#[derive(Debug, Default)]
pub struct NullBackend {
    next_handle: TweenHandle,
}

impl RenderBackend for NullBackend {
    fn mount(&mut self, _shape: &Shape) {}

    fn unmount(&mut self, _key: &Key) {}

    fn apply(&mut self, _key: &Key, _attrs: &Style) {}

    fn animate(&mut self, _key: &Key, _attrs: &Style, _tween: Tween) -> TweenHandle {
        self.next_handle += 1;
        self.next_handle
    }

    fn finish(&mut self, _handle: TweenHandle) {}
}

/// One captured backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Mount(Key),
    Unmount(Key),
    Apply(Key, Style),
    Animate(Key, Style, TweenHandle),
    Finish(TweenHandle),
}

#[derive(Debug, Default)]
struct RecordingState {
    events: Vec<BackendEvent>,
    next_handle: TweenHandle,
}

/// A backend that records every call.
///
/// Clones share the same recording, so a test can keep one handle while the
/// engine owns the other.
#[derive(Debug, Default, Clone)]
pub struct RecordingBackend {
    inner: Rc<RefCell<RecordingState>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of all captured events, in call order.
    pub fn events(&self) -> Vec<BackendEvent> {
        self.inner.borrow().events.clone()
    }

    pub fn clear(&mut self) {
        self.inner.borrow_mut().events.clear();
    }

    /// How many times the drawable for `key` was created.
    pub fn mount_count(&self, key: &Key) -> usize {
        self.inner
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, BackendEvent::Mount(k) if k == key))
            .count()
    }

    /// How many times the drawable for `key` was torn down.
    pub fn unmount_count(&self, key: &Key) -> usize {
        self.inner
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, BackendEvent::Unmount(k) if k == key))
            .count()
    }

    /// Handles of tweens started but not yet finished.
    pub fn open_tweens(&self) -> Vec<TweenHandle> {
        let state = self.inner.borrow();
        let mut open = Vec::new();
        for event in &state.events {
            match event {
                BackendEvent::Animate(_, _, handle) => open.push(*handle),
                BackendEvent::Finish(handle) => open.retain(|h| h != handle),
                _ => {}
            }
        }
        open
    }

    /// The coalesced attribute value most recently applied or animated for
    /// `key` under `attr`.
    pub fn last_attr(&self, key: &Key, attr: &str) -> Option<armilla_core::style::StyleValue> {
        let state = self.inner.borrow();
        state.events.iter().rev().find_map(|event| match event {
            BackendEvent::Apply(k, attrs) | BackendEvent::Animate(k, attrs, _) if k == key => {
                attrs.get(attr).cloned()
            }
            _ => None,
        })
    }
}

impl RenderBackend for RecordingBackend {
    fn mount(&mut self, shape: &Shape) {
        self.inner
            .borrow_mut()
            .events
            .push(BackendEvent::Mount(shape.key()));
    }

    fn unmount(&mut self, key: &Key) {
        self.inner.borrow_mut().events.push(BackendEvent::Unmount(*key));
    }

    fn apply(&mut self, key: &Key, attrs: &Style) {
        self.inner
            .borrow_mut()
            .events
            .push(BackendEvent::Apply(*key, attrs.clone()));
    }

    fn animate(&mut self, key: &Key, attrs: &Style, _tween: Tween) -> TweenHandle {
        let mut state = self.inner.borrow_mut();
        state.next_handle += 1;
        let handle = state.next_handle;
        state
            .events
            .push(BackendEvent::Animate(*key, attrs.clone(), handle));
        handle
    }

    fn finish(&mut self, handle: TweenHandle) {
        self.inner.borrow_mut().events.push(BackendEvent::Finish(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_measure_text() {
        let backend = NullBackend::default();
        let size = backend.measure_text("abc", &Style::new());
        assert_eq!(size, Size::new(21.0, 14.0));

        let two_lines = backend.measure_text("abcd\nab", &Style::new());
        assert_eq!(two_lines, Size::new(28.0, 28.0));
    }

    #[test]
    fn test_recording_backend_tracks_tweens() {
        let recording = RecordingBackend::new();
        let mut backend = recording.clone();

        let key = Key::parse("node", "1");
        let h1 = backend.animate(&key, &Style::new(), Tween::default());
        let h2 = backend.animate(&key, &Style::new(), Tween::default());
        backend.finish(h1);

        assert_eq!(recording.open_tweens(), vec![h2]);
    }

    #[test]
    fn test_recording_backend_last_attr() {
        let recording = RecordingBackend::new();
        let mut backend = recording.clone();

        let key = Key::parse("node", "1");
        backend.apply(&key, &Style::new().with("x", 1.0));
        backend.apply(&key, &Style::new().with("x", 2.0));

        assert_eq!(
            recording.last_attr(&key, "x").and_then(|v| v.as_number()),
            Some(2.0)
        );
    }
}
