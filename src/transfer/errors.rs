use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transfer rejected: status code {status_code}, message: {message}")]
    Status { status_code: u16, message: String },

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("internal transfer error: {0}")]
    Internal(String),
}

impl TransferError {
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status_code,
            message: message.into(),
        }
    }
}

/// Error alias
pub type Result<T, E = TransferError> = std::result::Result<T, E>;
