//! Armilla Core Types and Definitions
//!
//! This crate provides the foundational types for the Armilla diagram engine.
//! It includes:
//!
//! - **Identifiers**: Efficient string-interned identifiers ([`identifier::Id`])
//! - **Colors**: Color handling with CSS color support ([`color::Color`])
//! - **Geometry**: Basic geometric types ([`geometry`] module)
//! - **Styles**: Named attribute bundles for shapes ([`style`] module)

pub mod color;
pub mod geometry;
pub mod identifier;
pub mod style;
