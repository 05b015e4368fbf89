use thiserror::Error;

/// Loader-boundary error type.
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Snapshot load failure from the authentication collaborator.
    #[error("snapshot load failed: {0}")]
    Load(#[source] LoadError),
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Invalid permission input.
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    /// Invalid hierarchy path input.
    #[error("invalid hierarchy path: {0}")]
    InvalidPath(String),
    /// Operation requires an authenticated session.
    #[error("session is not authenticated")]
    NotAuthenticated,
}

impl From<LoadError> for Error {
    fn from(error: LoadError) -> Self {
        Self::Load(error)
    }
}
