//! Pull request aggregate.
//!
//! The aggregate owns the reviewer list and the merge state machine.
//! Every mutation validates its invariants and returns a [`DomainError`]
//! instead of silently adjusting the request: in particular, asking for
//! more than [`MAX_REVIEWERS_PER_PULL_REQUEST`] valid unique reviewers is
//! an error, not a truncation. Only the orchestration layer's own selection
//! limits itself to the maximum.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    validate_pull_request_id, validate_pull_request_name, validate_user_id, DomainError,
    PullRequestId, UserId,
};

/// Upper bound on assigned reviewers per pull request.
pub const MAX_REVIEWERS_PER_PULL_REQUEST: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullRequestStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "MERGED")]
    Merged,
}

impl PullRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OPEN" => Some(Self::Open),
            "MERGED" => Some(Self::Merged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    id: PullRequestId,
    name: String,
    author_id: UserId,
    status: PullRequestStatus,
    assigned: Vec<UserId>,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    last_update: DateTime<Utc>,
}

impl PullRequest {
    /// Create a new open pull request with no reviewers.
    ///
    /// `created_at` defaults to now (UTC) when unset.
    pub fn new(
        id: PullRequestId,
        name: &str,
        author_id: UserId,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        validate_pull_request_id(&id)?;
        validate_pull_request_name(name)?;
        validate_user_id(&author_id)?;
        let ts = created_at.unwrap_or_else(Utc::now);
        Ok(Self {
            id,
            name: name.trim().to_string(),
            author_id,
            status: PullRequestStatus::Open,
            assigned: Vec::with_capacity(MAX_REVIEWERS_PER_PULL_REQUEST),
            created_at: ts,
            merged_at: None,
            last_update: ts,
        })
    }

    /// Rehydrate a persisted pull request without touching `last_update`.
    ///
    /// Storage backends use this to rebuild the aggregate from rows; the
    /// reviewer-list invariants are re-checked so a corrupt row cannot
    /// produce an invalid aggregate.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: PullRequestId,
        name: &str,
        author_id: UserId,
        status: PullRequestStatus,
        assigned: Vec<UserId>,
        created_at: DateTime<Utc>,
        merged_at: Option<DateTime<Utc>>,
        last_update: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_pull_request_id(&id)?;
        validate_pull_request_name(name)?;
        validate_user_id(&author_id)?;
        if assigned.len() > MAX_REVIEWERS_PER_PULL_REQUEST {
            return Err(DomainError::ReviewerLimitExceeded);
        }
        let mut seen = HashSet::with_capacity(assigned.len());
        for reviewer in &assigned {
            validate_user_id(reviewer)?;
            if *reviewer == author_id {
                return Err(DomainError::AuthorIsReviewer);
            }
            if !seen.insert(reviewer.clone()) {
                return Err(DomainError::ReviewerAlreadyAssigned);
            }
        }
        Ok(Self {
            id,
            name: name.trim().to_string(),
            author_id,
            status,
            assigned,
            created_at,
            merged_at,
            last_update,
        })
    }

    pub fn id(&self) -> &PullRequestId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn author_id(&self) -> &UserId {
        &self.author_id
    }

    pub fn status(&self) -> PullRequestStatus {
        self.status
    }

    pub fn is_merged(&self) -> bool {
        self.status == PullRequestStatus::Merged
    }

    pub fn assigned_reviewers(&self) -> &[UserId] {
        &self.assigned
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        self.merged_at
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    /// Replace the reviewer list.
    ///
    /// Input is normalized first: blank ids are dropped and duplicates are
    /// removed preserving first-seen order. More than the maximum of valid
    /// unique reviewers fails with `ReviewerLimitExceeded`.
    pub fn assign_reviewers(&mut self, reviewers: Vec<UserId>) -> Result<(), DomainError> {
        if self.is_merged() {
            return Err(DomainError::PullRequestAlreadyMerged);
        }

        let clean = normalize_reviewers(reviewers);
        if clean.len() > MAX_REVIEWERS_PER_PULL_REQUEST {
            return Err(DomainError::ReviewerLimitExceeded);
        }
        if clean.iter().any(|r| *r == self.author_id) {
            return Err(DomainError::AuthorIsReviewer);
        }

        self.assigned = clean;
        self.touch();
        Ok(())
    }

    pub fn append_reviewer(&mut self, candidate: UserId) -> Result<(), DomainError> {
        if self.is_merged() {
            return Err(DomainError::PullRequestAlreadyMerged);
        }
        validate_user_id(&candidate)?;
        if candidate == self.author_id {
            return Err(DomainError::AuthorIsReviewer);
        }
        if self.assigned.contains(&candidate) {
            return Err(DomainError::ReviewerAlreadyAssigned);
        }
        if self.assigned.len() >= MAX_REVIEWERS_PER_PULL_REQUEST {
            return Err(DomainError::ReviewerLimitExceeded);
        }

        self.assigned.push(candidate);
        self.touch();
        Ok(())
    }

    /// Swap `old_reviewer` for `new_reviewer`, preserving the slot index.
    pub fn replace_reviewer(
        &mut self,
        old_reviewer: &UserId,
        new_reviewer: UserId,
    ) -> Result<(), DomainError> {
        if self.is_merged() {
            return Err(DomainError::PullRequestAlreadyMerged);
        }
        let Some(slot) = self.assigned.iter().position(|r| r == old_reviewer) else {
            return Err(DomainError::ReviewerNotAssigned);
        };
        if new_reviewer == self.author_id {
            return Err(DomainError::AuthorIsReviewer);
        }
        if self.assigned.contains(&new_reviewer) {
            return Err(DomainError::ReviewerAlreadyAssigned);
        }
        validate_user_id(&new_reviewer)?;

        self.assigned[slot] = new_reviewer;
        self.touch();
        Ok(())
    }

    /// Merge the pull request. Idempotent: returns `true` only when the
    /// status actually changed; a repeat merge is a no-op that leaves the
    /// original merge timestamp intact.
    pub fn merge(&mut self, merged_at: Option<DateTime<Utc>>) -> bool {
        if self.is_merged() {
            return false;
        }
        self.status = PullRequestStatus::Merged;
        self.merged_at = Some(merged_at.unwrap_or_else(Utc::now));
        self.touch();
        true
    }
}

/// Drop blank ids and duplicates, keeping first-seen order. Does not
/// truncate; callers stay within the limit or fail.
fn normalize_reviewers(reviewers: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::with_capacity(reviewers.len());
    let mut clean = Vec::with_capacity(reviewers.len());
    for reviewer in reviewers {
        if validate_user_id(&reviewer).is_err() {
            continue;
        }
        if seen.insert(reviewer.clone()) {
            clean.push(reviewer);
        }
    }
    clean
}
