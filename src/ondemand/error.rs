//! Scheduler error types.

use thiserror::Error;

use crate::core::PageId;
use crate::page::ResolveError;

/// Errors surfaced to `ensure_page` callers.
///
/// Cloned once per waiter when a build outcome is broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OnDemandError {
    #[error("page not found: {0}")]
    PageNotFound(PageId),

    #[error("requested and resolved page mismatch: {0}")]
    InvalidPage(String),

    #[error("build of {0} hit an unrecoverable engine state, reloading")]
    HardFailure(PageId),

    #[error("timed out waiting for {0} to build")]
    Timeout(PageId),

    #[error("scheduler stopped")]
    Stopped,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("entry for {0} already exists")]
    AlreadyExists(PageId),
}

impl From<ResolveError> for OnDemandError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(page) => Self::PageNotFound(page),
            ResolveError::Invalid(msg) => Self::InvalidPage(msg),
        }
    }
}
