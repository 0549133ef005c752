use rdv_common::ErrorCode;
use thiserror::Error;

/// Errors that can occur during directory server operation.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A registration was refused with the given wire error code.
    #[error("registration refused: {0}")]
    Rejected(ErrorCode),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
