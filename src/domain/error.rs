use thiserror::Error;

use crate::domain::demand::DemandStatus;

/// Recoverable failures surfaced by the domain core. The HTTP layer maps
/// each variant to a client-facing status; none of these should ever reach
/// the caller as an unhandled fault.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: DemandStatus, to: DemandStatus },

    #[error("no pending edit to review")]
    NoPendingEdit,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not found")]
    NotFound,
}
