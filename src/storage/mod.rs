//! Storage abstraction.
//!
//! Services depend on the [`Store`] and [`StoreTx`] traits, not on any
//! concrete database. A transaction is an owned handle threaded explicitly
//! through every repository call; dropping an unfinished handle rolls the
//! transaction back, so a cancelled request never leaves partial writes.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryIdempotencyStore, MemoryStore};
pub use sqlite::SqliteStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{PullRequest, PullRequestId, Team, TeamName, User, UserId};
use crate::error::Error;

/// Lock semantics requested when loading a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Plain snapshot read.
    Read,
    /// Exclusive read-for-update: concurrent merge/reassign calls on the
    /// same pull request serialize behind this lock for the remainder of
    /// the transaction. Team and user reads stay snapshot reads.
    ForUpdate,
}

/// A single open transaction.
#[async_trait]
pub trait StoreTx: Send {
    /// Persist a new team and upsert its members. A team with the same
    /// name already present fails with `TeamExists`.
    async fn save_team(&mut self, team: &Team) -> Result<(), Error>;
    async fn get_team(&mut self, name: &TeamName) -> Result<Team, Error>;

    async fn get_user(&mut self, id: &UserId) -> Result<User, Error>;
    async fn set_user_activity(&mut self, id: &UserId, active: bool) -> Result<User, Error>;

    /// Insert a new pull request; a duplicate id (detected from the
    /// backend's uniqueness violation) fails with `PullRequestExists`.
    async fn insert_pull_request(&mut self, pr: &PullRequest) -> Result<(), Error>;
    async fn get_pull_request(
        &mut self,
        id: &PullRequestId,
        lock: LockMode,
    ) -> Result<PullRequest, Error>;
    async fn update_pull_request(&mut self, pr: &PullRequest) -> Result<(), Error>;
    /// Pull requests where the user is an assigned reviewer, most recent
    /// first.
    async fn pull_requests_by_reviewer(
        &mut self,
        reviewer: &UserId,
    ) -> Result<Vec<PullRequest>, Error>;

    async fn assignments_per_user(&mut self) -> Result<HashMap<UserId, u64>, Error>;
    async fn assignments_per_pull_request(
        &mut self,
    ) -> Result<HashMap<PullRequestId, u64>, Error>;

    async fn commit(self: Box<Self>) -> Result<(), Error>;
    async fn rollback(self: Box<Self>) -> Result<(), Error>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, Error>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), Error>;
}
