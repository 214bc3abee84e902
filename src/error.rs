use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// No active session while an owner-scoped operation was attempted.
    #[error("Not authenticated. Run 'applytrack login <email>' first.")]
    Auth,

    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    #[error("Remote read failed: {0}")]
    RemoteRead(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

impl TrackerError {
    pub fn write(err: impl std::fmt::Display) -> Self {
        Self::RemoteWrite(err.to_string())
    }

    pub fn read(err: impl std::fmt::Display) -> Self {
        Self::RemoteRead(err.to_string())
    }
}
