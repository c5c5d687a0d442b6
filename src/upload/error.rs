//! Error types for upload operations

use aws_sdk_s3::{error::SdkError, operation::put_object::PutObjectError};
use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while uploading an image
#[derive(Error, Debug)]
pub enum UploadError {
    /// The local file could not be read
    #[error("failed to read local file: {0}")]
    Io(#[from] std::io::Error),

    /// Storage is not configured or could not be initialized
    #[error("configuration error: {0}")]
    Config(String),

    /// The upload request could not be presigned
    #[error("S3 service error: {0}")]
    S3(String),

    /// The transfer itself failed
    #[error("transfer failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("store rejected upload with status {0}")]
    Status(u16),
}

impl From<SdkError<PutObjectError>> for UploadError {
    fn from(error: SdkError<PutObjectError>) -> Self {
        UploadError::S3(error.to_string())
    }
}
