use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Stream already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error("Resource error: {0}")]
    Resource(String),
}

pub type StreamResult<T> = Result<T, StreamError>;
