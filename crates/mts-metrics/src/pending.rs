//! First-class pending results
//!
//! A metric computed asynchronously is neither an error nor a null: it is a
//! set of opaque operation ids the caller surfaces to its own caller for
//! polling. The matching test result stays undefined until the operation
//! completes.

use serde::{Deserialize, Serialize};

/// A value that may still be computing remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pending<T> {
    /// The value is available
    Ready(T),
    /// The computation is in flight; carries its operation ids
    InFlight(Vec<String>),
}

impl<T> Pending<T> {
    /// Whether the value is still computing
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::InFlight(_))
    }

    /// The ready value, if available
    #[must_use]
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::InFlight(_) => None,
        }
    }

    /// Consume into the ready value, if available
    #[must_use]
    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::InFlight(_) => None,
        }
    }

    /// Operation ids of an in-flight computation
    #[must_use]
    pub fn operation_ids(&self) -> &[String] {
        match self {
            Self::Ready(_) => &[],
            Self::InFlight(ids) => ids,
        }
    }

    /// Map the ready value, keeping operation ids intact
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Pending<U> {
        match self {
            Self::Ready(value) => Pending::Ready(f(value)),
            Self::InFlight(ids) => Pending::InFlight(ids),
        }
    }
}
