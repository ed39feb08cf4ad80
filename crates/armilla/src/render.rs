//! The renderer: attribute queueing, coalescing and animation batching.
//!
//! Every mutation the reconciler produces is tagged with a [`Timing`]:
//! `Immediate` mutations hit the backend synchronously (structural
//! bookkeeping, off-screen measurement), `Batched` mutations coalesce and
//! apply synchronously at the next flush, `Animated` mutations coalesce
//! and apply through the backend's tween facility. Coalescing merges
//! bundles per shape key by shallow field-extend, so the backend sees at
//! most one call per key per timing class per generation.

use indexmap::IndexMap;
use log::{debug, trace};
use serde::Deserialize;

use armilla_core::{geometry::Size, style::Style};

use crate::{
    backend::{RenderBackend, TweenHandle},
    config::AnimationConfig,
    shape::{Key, Shape},
};

/// Easing curve for animated mutations, evaluated by the backend's tween
/// facility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    /// Evaluates the curve at `t` in `[0, 1]`.
    pub fn value_at(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => t * (2.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    (4.0 - 2.0 * t).mul_add(t, -1.0)
                }
            }
        }
    }
}

/// Duration and easing for one animated mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    pub duration_ms: u32,
    pub easing: Easing,
}

impl Default for Tween {
    fn default() -> Self {
        Self {
            duration_ms: 300,
            easing: Easing::Linear,
        }
    }
}

/// When a mutation reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Synchronously, at request time.
    Immediate,
    /// Coalesced; applied synchronously at the next flush.
    Batched,
    /// Coalesced; applied via the backend tween facility.
    Animated,
}

/// Action to run once a mutation has fully applied (for animated
/// mutations, once the tween completes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    None,
    /// Tear down the shape's backend resource, the tail end of a hide
    /// transition. A shape is never removed mid-disappearance.
    Detach(Key),
}

#[derive(Debug)]
struct Pending {
    attrs: Style,
    completion: Completion,
}

/// What a flush handed to the backend.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Number of tweens now in flight.
    pub animated: usize,
    /// Completions due immediately (batched mutations carrying one).
    pub completions: Vec<Completion>,
}

/// Owns the backend and the per-generation mutation queues.
pub struct Renderer {
    backend: Box<dyn RenderBackend>,
    animation: AnimationConfig,
    batched: IndexMap<Key, Pending>,
    animated: IndexMap<Key, Pending>,
    in_flight: IndexMap<TweenHandle, Completion>,
    interrupted: bool,
}

impl Renderer {
    pub fn new(backend: Box<dyn RenderBackend>, animation: AnimationConfig) -> Self {
        Self {
            backend,
            animation,
            batched: IndexMap::new(),
            animated: IndexMap::new(),
            in_flight: IndexMap::new(),
            interrupted: false,
        }
    }

    pub fn animation(&self) -> &AnimationConfig {
        &self.animation
    }

    /// The timing class value patches should use under the current
    /// animation settings.
    pub fn patch_timing(&self) -> Timing {
        if self.animation.enabled() {
            Timing::Animated
        } else {
            Timing::Batched
        }
    }

    /// Synchronous content measurement, forwarded to the backend.
    pub fn measure_text(&self, content: &str, style: &Style) -> Size {
        self.backend.measure_text(content, style)
    }

    /// Creates the backend resource for a shape (attached hidden).
    pub fn mount(&mut self, shape: &Shape) {
        self.backend.mount(shape);
    }

    /// Tears down the backend resource for a key.
    pub fn unmount(&mut self, key: &Key) {
        self.backend.unmount(key);
    }

    /// Queues (or immediately applies) an attribute mutation.
    pub fn request(&mut self, key: Key, attrs: Style, timing: Timing, completion: Completion) {
        trace!(key:% = key, timing:? = timing; "Attribute request");
        match timing {
            Timing::Immediate => {
                debug_assert!(completion == Completion::None);
                self.backend.apply(&key, &attrs);
            }
            Timing::Batched => coalesce(&mut self.batched, key, attrs, completion),
            Timing::Animated => coalesce(&mut self.animated, key, attrs, completion),
        }
    }

    /// Applies every batched mutation synchronously and dispatches every
    /// animated mutation to the backend's tween facility.
    pub fn flush(&mut self) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();
        // A flush opens a fresh queue; the interruption flag only ever
        // refers to the queue it interrupted.
        self.interrupted = false;

        for (key, pending) in std::mem::take(&mut self.batched) {
            self.backend.apply(&key, &pending.attrs);
            if pending.completion != Completion::None {
                outcome.completions.push(pending.completion);
            }
        }

        let tween = Tween {
            duration_ms: self.animation.duration_ms(),
            easing: self.animation.easing(),
        };
        for (key, pending) in std::mem::take(&mut self.animated) {
            let handle = self.backend.animate(&key, &pending.attrs, tween);
            self.in_flight.insert(handle, pending.completion);
        }

        outcome.animated = self.in_flight.len();
        debug!(
            animated = outcome.animated,
            immediate_completions = outcome.completions.len();
            "Render queue flushed",
        );
        outcome
    }

    /// Marks one tween as finished, returning its completion action.
    ///
    /// Returns `None` for unknown (already force-completed) handles.
    pub fn complete(&mut self, handle: TweenHandle) -> Option<Completion> {
        self.in_flight.shift_remove(&handle)
    }

    /// Force-completes the whole in-flight queue: every pending tween is
    /// stopped at its end state and its completion action returned for the
    /// caller to run. Sets the interruption flag so the stale queue's own
    /// all-done signal is suppressed.
    pub fn force_complete_all(&mut self) -> Vec<Completion> {
        if self.in_flight.is_empty() {
            return Vec::new();
        }
        debug!(pending = self.in_flight.len(); "Force-completing in-flight animations");
        self.interrupted = true;
        let drained = std::mem::take(&mut self.in_flight);
        let mut completions = Vec::with_capacity(drained.len());
        for (handle, completion) in drained {
            self.backend.finish(handle);
            completions.push(completion);
        }
        completions
    }

    /// Number of tweens still in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// True when the current queue drained normally, i.e. the generation's
    /// all-done signal should fire. A force-completed queue never settles.
    pub fn queue_settled(&self) -> bool {
        self.in_flight.is_empty() && !self.interrupted
    }
}

fn coalesce(queue: &mut IndexMap<Key, Pending>, key: Key, attrs: Style, completion: Completion) {
    match queue.get_mut(&key) {
        Some(pending) => {
            pending.attrs.merge_from(&attrs);
            if completion != Completion::None {
                pending.completion = completion;
            }
        }
        None => {
            queue.insert(key, Pending { attrs, completion });
        }
    }
}
