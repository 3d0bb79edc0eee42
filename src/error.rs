use thiserror::Error;

/// Failures raised by a [`crate::gateway::Gateway`] call.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum AttendanceError {
    /// Rejected before any gateway call; shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl AttendanceError {
    pub fn validation(message: impl Into<String>) -> Self {
        AttendanceError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
