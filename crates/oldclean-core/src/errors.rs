use crate::cleaner::apply::ApplyError;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the runner can
/// tell channel failures apart from filesystem failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
