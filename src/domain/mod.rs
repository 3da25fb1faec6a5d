//! Domain model for reviewer assignment.
//!
//! Aggregates ([`PullRequest`], [`Team`]) enforce their own invariants and
//! report violations through the closed [`DomainError`] enumeration, so
//! callers match exhaustively instead of comparing error identities.

mod pull_request;
mod requester;
mod team;
mod user;

pub use pull_request::{PullRequest, PullRequestStatus, MAX_REVIEWERS_PER_PULL_REQUEST};
pub use requester::Requester;
pub use team::Team;
pub use user::User;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier of a user. Opaque, non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique identifier of a team. The team name doubles as its identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamName(String);

impl TeamName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TeamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Unique identifier of a pull request. Opaque, non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestId(String);

impl PullRequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PullRequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Domain invariant violations. Conflict variants map to 4xx conflict
/// responses at the HTTP boundary; validation variants to 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("team already exists")]
    TeamExists,
    #[error("user {user} belongs to team {actual}, expected {expected}")]
    TeamMismatch {
        user: UserId,
        expected: TeamName,
        actual: TeamName,
    },
    #[error("caller is not a member of this team")]
    TeamAccessDenied,
    #[error("pull request already exists")]
    PullRequestExists,
    #[error("pull request already merged")]
    PullRequestAlreadyMerged,
    #[error("maximum number of reviewers reached")]
    ReviewerLimitExceeded,
    #[error("author cannot be assigned as reviewer")]
    AuthorIsReviewer,
    #[error("reviewer already assigned")]
    ReviewerAlreadyAssigned,
    #[error("reviewer is not assigned to this pull request")]
    ReviewerNotAssigned,
    #[error("no active replacement candidate in team")]
    NoActiveCandidate,
    #[error("{0} must not be empty")]
    InvalidIdentifier(&'static str),
    #[error("{0} must not be empty")]
    InvalidName(&'static str),
}

pub(crate) fn validate_user_id(id: &UserId) -> Result<(), DomainError> {
    if id.is_blank() {
        return Err(DomainError::InvalidIdentifier("user id"));
    }
    Ok(())
}

pub(crate) fn validate_team_name(name: &TeamName) -> Result<(), DomainError> {
    if name.is_blank() {
        return Err(DomainError::InvalidName("team name"));
    }
    Ok(())
}

pub(crate) fn validate_pull_request_id(id: &PullRequestId) -> Result<(), DomainError> {
    if id.is_blank() {
        return Err(DomainError::InvalidIdentifier("pull request id"));
    }
    Ok(())
}

pub(crate) fn validate_username(username: &str) -> Result<(), DomainError> {
    if username.trim().is_empty() {
        return Err(DomainError::InvalidName("username"));
    }
    Ok(())
}

pub(crate) fn validate_pull_request_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::InvalidName("pull request name"));
    }
    Ok(())
}
