//! Color handling with CSS color string support.

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use color::DynamicColor;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Error returned when a color string cannot be parsed.
#[derive(Debug, Error)]
#[error("invalid color `{value}`: {reason}")]
pub struct ColorParseError {
    value: String,
    reason: String,
}

/// Wrapper around the `DynamicColor` type from the color crate.
///
/// Parses CSS color strings such as `"#ff0000"`, `"rgb(255, 0, 0)"` or
/// `"red"` and keeps them comparable and hashable for style diffing.
#[derive(Clone, PartialEq, Debug)]
pub struct Color {
    color: DynamicColor,
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl Color {
    /// Create a new `Color` from a CSS color string.
    pub fn new(color_str: &str) -> Result<Self, ColorParseError> {
        match DynamicColor::from_str(color_str) {
            Ok(color) => Ok(Color { color }),
            Err(err) => Err(ColorParseError {
                value: color_str.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new("black").expect("default color must parse")
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.color)
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Color::new(&value).map_err(serde::de::Error::custom)
    }
}
