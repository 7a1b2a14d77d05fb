//! Campaign processing outcomes, tagged for the ingest endpoint's retry
//! contract. The endpoint maps these to HTTP statuses; keeping the mapping a
//! total function over this enum is the point of returning a sum type
//! instead of bubbling arbitrary errors.

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The event can never be processed; redelivery would not help.
    #[error("malformed notification event: {0}")]
    Malformed(String),
    /// A safely-redoable step failed before any push went out; the
    /// transport should redeliver.
    #[error("transient failure: {0}")]
    Retryable(#[from] StoreError),
}

impl ProcessError {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}
