//! Named attribute bundles for shapes.
//!
//! A [`Style`] is an ordered string-keyed map of [`StyleValue`]s. The same
//! type serves two purposes in the engine: the visual style attached to
//! elements and shapes, and the attribute bundles handed to the rendering
//! backend (where geometry keys like `x` or `width` ride alongside visual
//! keys like `fill`).

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

use crate::color::Color;

/// A single style attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleValue {
    Color(Color),
    Number(f32),
    Text(String),
    Flag(bool),
}

impl StyleValue {
    /// Returns the numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f32> {
        match self {
            StyleValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a flag.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            StyleValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the color, if this is a color.
    pub fn as_color(&self) -> Option<&Color> {
        match self {
            StyleValue::Color(color) => Some(color),
            _ => None,
        }
    }

    /// Returns the text, if this is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StyleValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<f32> for StyleValue {
    fn from(value: f32) -> Self {
        StyleValue::Number(value)
    }
}

impl From<bool> for StyleValue {
    fn from(value: bool) -> Self {
        StyleValue::Flag(value)
    }
}

impl From<Color> for StyleValue {
    fn from(value: Color) -> Self {
        StyleValue::Color(value)
    }
}

impl From<&str> for StyleValue {
    /// Strings that parse as CSS colors become colors; anything else is text.
    fn from(value: &str) -> Self {
        match Color::new(value) {
            Ok(color) => StyleValue::Color(color),
            Err(_) => StyleValue::Text(value.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for StyleValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f32),
            Flag(bool),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(value) => StyleValue::Number(value),
            Raw::Flag(value) => StyleValue::Flag(value),
            Raw::Text(value) => StyleValue::from(value.as_str()),
        })
    }
}

/// An ordered, string-keyed bundle of style attributes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Style {
    entries: IndexMap<String, StyleValue>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&StyleValue> {
        self.entries.get(key)
    }

    /// Sets a key to a value, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StyleValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`Style::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StyleValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Removes a key, returning its previous value.
    ///
    /// Uses a shift-remove so iteration order stays deterministic.
    pub fn remove(&mut self, key: &str) -> Option<StyleValue> {
        self.entries.shift_remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StyleValue)> {
        self.entries.iter()
    }

    /// Shallow field-extend: every entry of `other` overwrites the entry of
    /// the same key here; unrelated keys survive.
    pub fn merge_from(&mut self, other: &Style) {
        for (key, value) in other.iter() {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Returns the entries that are new or changed relative to `prev`.
    pub fn changed_from(&self, prev: &Style) -> Style {
        let mut changed = Style::new();
        for (key, value) in self.iter() {
            if prev.get(key) != Some(value) {
                changed.entries.insert(key.clone(), value.clone());
            }
        }
        changed
    }

    /// Returns the keys present in `prev` but absent here.
    pub fn removed_from(&self, prev: &Style) -> Vec<String> {
        prev.iter()
            .filter(|(key, _)| self.get(key).is_none())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns true if any key was added, changed or removed relative to `prev`.
    pub fn differs_from(&self, prev: &Style) -> bool {
        self.entries != prev.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut style = Style::new();
        style.set("width", 2.0);
        style.set("visible", true);
        style.set("label", "plain text");

        assert_eq!(style.get("width").and_then(StyleValue::as_number), Some(2.0));
        assert_eq!(style.get("visible").and_then(StyleValue::as_flag), Some(true));
        assert_eq!(
            style.get("label").and_then(StyleValue::as_text),
            Some("plain text")
        );
        assert!(style.get("missing").is_none());
    }

    #[test]
    fn test_color_strings_become_colors() {
        let style = Style::new().with("fill", "red").with("note", "hello world");

        assert!(style.get("fill").unwrap().as_color().is_some());
        assert!(style.get("note").unwrap().as_text().is_some());
    }

    #[test]
    fn test_merge_last_write_wins_per_field() {
        let mut base = Style::new().with("fill", "red").with("width", 1.0);
        let update = Style::new().with("width", 3.0).with("visible", false);

        base.merge_from(&update);

        assert_eq!(base.get("width").and_then(StyleValue::as_number), Some(3.0));
        assert_eq!(base.get("visible").and_then(StyleValue::as_flag), Some(false));
        // Unrelated field from the first bundle survives
        assert!(base.get("fill").is_some());
    }

    #[test]
    fn test_changed_from_reports_only_changed_keys() {
        let prev = Style::new().with("fill", "red").with("width", 1.0);
        let next = Style::new().with("fill", "red").with("width", 2.0).with("z", 5.0);

        let changed = next.changed_from(&prev);

        assert_eq!(changed.len(), 2);
        assert!(changed.get("width").is_some());
        assert!(changed.get("z").is_some());
        assert!(changed.get("fill").is_none());
    }

    #[test]
    fn test_removed_from() {
        let prev = Style::new().with("fill", "red").with("width", 1.0);
        let next = Style::new().with("fill", "red");

        assert_eq!(next.removed_from(&prev), vec!["width".to_string()]);
        assert!(next.differs_from(&prev));
    }

    #[test]
    fn test_identical_styles_do_not_differ() {
        let a = Style::new().with("fill", "red").with("width", 1.0);
        let b = Style::new().with("fill", "red").with("width", 1.0);

        assert!(!a.differs_from(&b));
        assert!(a.changed_from(&b).is_empty());
    }
}
