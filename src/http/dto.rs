//! Wire representations of the domain model.
//!
//! Field names follow the external contract (snake_case identifiers,
//! camelCase timestamps) and conversions to and from the domain live next
//! to each DTO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    DomainError, PullRequest, PullRequestId, PullRequestStatus, Team, TeamName, User, UserId,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct PullRequestDto {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
    pub status: PullRequestStatus,
    pub assigned_reviewers: Vec<UserId>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestDto {
    pub fn from_domain(pr: &PullRequest) -> Self {
        Self {
            pull_request_id: pr.id().clone(),
            pull_request_name: pr.name().to_string(),
            author_id: pr.author_id().clone(),
            status: pr.status(),
            assigned_reviewers: pr.assigned_reviewers().to_vec(),
            created_at: pr.created_at(),
            merged_at: pr.merged_at(),
        }
    }
}

/// Compact listing entry for assignment views.
#[derive(Debug, Serialize, Deserialize)]
pub struct PullRequestShortDto {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
    pub status: PullRequestStatus,
}

impl PullRequestShortDto {
    pub fn from_domain(pr: &PullRequest) -> Self {
        Self {
            pull_request_id: pr.id().clone(),
            pull_request_name: pr.name().to_string(),
            author_id: pr.author_id().clone(),
            status: pr.status(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
}

impl CreatePullRequestRequest {
    pub fn to_domain(&self, created_at: DateTime<Utc>) -> Result<PullRequest, DomainError> {
        PullRequest::new(
            self.pull_request_id.clone(),
            &self.pull_request_name,
            self.author_id.clone(),
            Some(created_at),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct MergePullRequestRequest {
    pub pull_request_id: PullRequestId,
}

#[derive(Debug, Deserialize)]
pub struct ReassignReviewerRequest {
    pub pull_request_id: PullRequestId,
    pub old_user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeamMemberDto {
    pub user_id: UserId,
    pub username: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeamDto {
    pub team_name: TeamName,
    pub members: Vec<TeamMemberDto>,
}

impl TeamDto {
    pub fn from_domain(team: &Team) -> Self {
        Self {
            team_name: team.name().clone(),
            members: team
                .members()
                .iter()
                .map(|m| TeamMemberDto {
                    user_id: m.id().clone(),
                    username: m.username().to_string(),
                    is_active: m.is_active(),
                })
                .collect(),
        }
    }

    pub fn to_domain(&self) -> Result<Team, DomainError> {
        let members = self
            .members
            .iter()
            .map(|m| {
                User::new(
                    m.user_id.clone(),
                    &m.username,
                    self.team_name.clone(),
                    m.is_active,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Team::new(self.team_name.clone(), members)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserDto {
    pub user_id: UserId,
    pub username: String,
    pub team_name: TeamName,
    pub is_active: bool,
}

impl UserDto {
    pub fn from_domain(user: &User) -> Self {
        Self {
            user_id: user.id().clone(),
            username: user.username().to_string(),
            team_name: user.team_name().clone(),
            is_active: user.is_active(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetUserActiveRequest {
    pub user_id: UserId,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeamResponse {
    pub team: TeamDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PullRequestResponse {
    pub pr: PullRequestDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReassignResponse {
    pub pr: PullRequestDto,
    pub replaced_by: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: UserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewAssignmentsResponse {
    pub user_id: UserId,
    pub pull_requests: Vec<PullRequestShortDto>,
}

/// Rolled-up view of [`crate::service::AssignmentsStats`].
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub reviewers_count: u64,
    pub pull_requests_count: u64,
    pub assignments_total: u64,
}
