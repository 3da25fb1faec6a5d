//! Application services.
//!
//! Each service orchestrates one use-case family: it opens a transaction,
//! runs domain logic against it and commits, or rolls back on any error so
//! a failed request leaves no partial writes.

mod pull_request;
mod stats;
mod team;
mod user;

pub use pull_request::PullRequestService;
pub use stats::{AssignmentsStats, StatsService};
pub use team::TeamService;
pub use user::UserService;

use tracing::warn;

use crate::error::Error;
use crate::storage::StoreTx;

/// Commit on success, roll back on failure. A rollback failure is logged
/// but the original error is the one returned.
pub(crate) async fn finish_tx<T>(
    tx: Box<dyn StoreTx>,
    result: Result<T, Error>,
) -> Result<T, Error> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}
