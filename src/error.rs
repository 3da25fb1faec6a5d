//! Service-level error type shared by services and storage backends.

use thiserror::Error;

use crate::domain::DomainError;

#[derive(Debug, Error)]
pub enum Error {
    /// A domain invariant violation; terminal for the request.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// The named entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Infrastructure failure. Never retried inside the request; surfaced
    /// as a 500 so the client can retry with the same idempotency key.
    #[error("{op} failed: {message}")]
    Storage { op: &'static str, message: String },
}

impl Error {
    pub fn storage(op: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            op,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
