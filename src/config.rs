use std::time::Duration;

use clap::Args;

/// Connection and workflow settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Postgres connection string of the attendance backend
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "ROLL_CALL_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Upper bound for any single backend request
    #[arg(long, env = "ROLL_CALL_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Reconcile summaries with a server-side increment instead of read-then-write
    #[arg(long, env = "ROLL_CALL_ATOMIC_SUMMARIES", default_value_t = false)]
    pub atomic_summaries: bool,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        if self.atomic_summaries {
            ReconcileStrategy::AtomicIncrement
        } else {
            ReconcileStrategy::ReadModifyWrite
        }
    }
}

/// How a student's summary row is brought up to date after a roll-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileStrategy {
    /// Look the row up, then update or insert it. Two concurrent submissions
    /// for the same student and subject can lose an increment.
    #[default]
    ReadModifyWrite,
    /// Single upsert that increments on the server.
    AtomicIncrement,
}
