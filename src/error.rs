//! Error types for decode runs and the query bridge.
//!
//! One decode attempt by one format produces a [`FormatError`]; a length-scoped
//! dispatch that exhausts its candidate list aggregates them into a
//! [`FormatsError`]. Everything else (scope overruns, name collisions,
//! cancellation, registry misuse, bridge misuse) is a variant of [`Error`].

use std::fmt;
use thiserror::Error;

/// Result type alias for decoder and bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single decode failure produced by one format attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatError {
    /// Name of the format that was being decoded.
    pub format: String,
    /// Bit position at the point of failure.
    pub pos: u64,
    pub message: String,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (at bit {})", self.format, self.message, self.pos)
    }
}

/// One [`FormatError`] per candidate after a dispatch exhausts its list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatsError {
    pub errs: Vec<FormatError>,
}

impl fmt::Display for FormatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errs.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

/// All failure modes of the engine.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A format's decode function aborted (see [`crate::decoder::Decoder::fatal`]).
    #[error("{0}")]
    Format(FormatError),

    /// Every candidate format failed in a dispatch.
    #[error("no format matched: {0}")]
    Formats(FormatsError),

    /// Read past the end of the innermost length scope.
    #[error("read past end of scope at bit {pos}: wanted {wanted} bits, {left} left")]
    Range { pos: u64, wanted: u64, left: u64 },

    /// Bit range outside the underlying buffer.
    #[error("bit range [{start}, {stop}) outside buffer of {len} bits")]
    OutOfBounds { start: u64, stop: u64, len: u64 },

    /// Duplicate struct child name. This is a bug in a format plugin.
    #[error("duplicate field name '{0}' in struct")]
    NameCollision(String),

    /// Field declared as UTF-8 holds invalid bytes.
    #[error("invalid utf-8 in string field at bit {pos}")]
    InvalidUtf8 { pos: u64 },

    /// Cooperative cancellation was observed.
    #[error("decode canceled")]
    Canceled,

    /// Lookup of a format or group name that was never registered.
    #[error("unknown format or group: {0}")]
    UnknownFormat(String),

    /// A format declared a dependency that no registration satisfies.
    #[error("format '{format}' depends on unregistered '{dependency}'")]
    UnresolvedDependency { format: String, dependency: String },

    /// Two formats registered under the same name.
    #[error("duplicate format name: {0}")]
    DuplicateFormat(String),

    /// Registration attempted after the registry was sealed.
    #[error("registry is sealed")]
    Sealed,

    /// Query used a `_`-prefixed key outside the reserved set.
    #[error("expected an extkey but got: {0}")]
    ExpectedExtkey(String),

    /// Write attempted through the value bridge.
    #[error("cannot update key {key} for {typ}")]
    NotUpdateable { typ: &'static str, key: String },
}

impl Error {
    /// True for errors a query can observe and recover from; everything else
    /// aborts the current decode attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ExpectedExtkey(_) | Self::NotUpdateable { .. }
        )
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
