use thiserror::Error;

use crate::gateway::{DenialReason, GatewayError};
use crate::session::Rejection;
use crate::transfer::TransferError;

/// Top-level error for session operations. Everything here is non-fatal:
/// the slot lands in a defined phase and the caller messages the user.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("selection rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("request denied: {0}")]
    Denied(DenialReason),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
