//! Error types for Armilla operations.
//!
//! Only configuration and scheduling hazards surface as errors. Per-entity
//! resolution misses (a link target absent from the snapshot) are not
//! errors: the affected edge is simply not drawn and the rest of the
//! generation proceeds.

use thiserror::Error;

/// The main error type for Armilla operations.
#[derive(Debug, Error)]
pub enum ArmillaError {
    /// A snapshot record uses a kind with no registered view template.
    #[error("unregistered shape kind `{0}`")]
    UnknownKind(String),

    /// A snapshot record has no usable `id` field.
    #[error("record without id in kind `{0}`")]
    MissingId(String),

    /// A flat snapshot was supplied but more than one kind is declared, so
    /// the records cannot be attributed to a kind.
    #[error("flat snapshot is ambiguous: {0} kinds are declared")]
    AmbiguousSnapshot(usize),

    /// No container size was configured before the first update.
    #[error("no container size configured")]
    MissingContainer,

    /// A new update arrived while a previous generation's animation is
    /// still in flight and skip-on-busy is disabled.
    #[error("update rejected: previous animation still in flight")]
    Busy,
}
