use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    DomainError, PullRequest, PullRequestId, Team, User, UserId,
    MAX_REVIEWERS_PER_PULL_REQUEST,
};
use crate::error::Error;
use crate::selection::ReviewerSelection;
use crate::storage::{LockMode, Store, StoreTx};

use super::finish_tx;

/// Orchestrates pull request creation, merging and reviewer reassignment.
pub struct PullRequestService {
    store: Arc<dyn Store>,
    selection: Arc<dyn ReviewerSelection>,
}

impl PullRequestService {
    pub fn new(store: Arc<dyn Store>, selection: Arc<dyn ReviewerSelection>) -> Self {
        Self { store, selection }
    }

    /// Create a pull request and auto-assign up to the maximum number of
    /// reviewers from the author's team. Fewer eligible teammates than the
    /// maximum is not an error; the pull request simply gets fewer (or no)
    /// reviewers.
    pub async fn create(&self, pr: PullRequest) -> Result<PullRequest, Error> {
        let mut tx = self.store.begin().await?;
        let result = self.create_in_tx(&mut tx, pr).await;
        finish_tx(tx, result).await
    }

    async fn create_in_tx(
        &self,
        tx: &mut Box<dyn StoreTx>,
        mut pr: PullRequest,
    ) -> Result<PullRequest, Error> {
        let author = tx.get_user(pr.author_id()).await?;
        let team = tx.get_team(author.team_name()).await?;

        let candidates = team.active_members(pr.author_id());
        let picked = self
            .selection
            .pick(&candidates, MAX_REVIEWERS_PER_PULL_REQUEST);
        // The candidate list already excludes the author; guard against a
        // selection implementation that does not honor its input.
        let reviewers = picked
            .into_iter()
            .map(|u| u.id().clone())
            .filter(|id| id != pr.author_id())
            .collect();
        pr.assign_reviewers(reviewers)?;

        tx.insert_pull_request(&pr).await?;
        Ok(pr)
    }

    /// Merge a pull request. Merging an already merged pull request is a
    /// no-op returning the stored state unchanged.
    pub async fn merge(
        &self,
        id: &PullRequestId,
        merged_at: DateTime<Utc>,
    ) -> Result<PullRequest, Error> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut pr = tx.get_pull_request(id, LockMode::ForUpdate).await?;
            if pr.merge(Some(merged_at)) {
                tx.update_pull_request(&pr).await?;
            }
            Ok(pr)
        }
        .await;
        finish_tx(tx, result).await
    }

    /// Replace `old_reviewer` with a randomly chosen active teammate,
    /// preserving the reviewer's slot.
    pub async fn reassign(
        &self,
        id: &PullRequestId,
        old_reviewer: &UserId,
    ) -> Result<(PullRequest, UserId), Error> {
        let mut tx = self.store.begin().await?;
        let result = self.reassign_in_tx(&mut tx, id, old_reviewer).await;
        finish_tx(tx, result).await
    }

    async fn reassign_in_tx(
        &self,
        tx: &mut Box<dyn StoreTx>,
        id: &PullRequestId,
        old_reviewer: &UserId,
    ) -> Result<(PullRequest, UserId), Error> {
        let mut pr = tx.get_pull_request(id, LockMode::ForUpdate).await?;
        if pr.is_merged() {
            return Err(DomainError::PullRequestAlreadyMerged.into());
        }
        if !pr.assigned_reviewers().contains(old_reviewer) {
            return Err(DomainError::ReviewerNotAssigned.into());
        }

        let departing = tx.get_user(old_reviewer).await?;
        let team = tx.get_team(departing.team_name()).await?;
        let candidates = eligible_replacements(&team, &pr, old_reviewer);

        let picked = self.selection.pick(&candidates, 1);
        let Some(replacement) = picked.into_iter().next() else {
            return Err(DomainError::NoActiveCandidate.into());
        };
        let replacement_id = replacement.id().clone();

        pr.replace_reviewer(old_reviewer, replacement_id.clone())?;
        tx.update_pull_request(&pr).await?;
        Ok((pr, replacement_id))
    }
}

/// Active teammates of the departing reviewer who are neither the author
/// nor already assigned.
fn eligible_replacements(team: &Team, pr: &PullRequest, departing: &UserId) -> Vec<User> {
    team.active_members(departing)
        .into_iter()
        .filter(|m| m.id() != pr.author_id() && !pr.assigned_reviewers().contains(m.id()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Team;
    use crate::selection::RandomSelection;
    use crate::storage::MemoryStore;

    fn member(id: &str, active: bool) -> User {
        User::new(id.into(), id, "backend".into(), active).unwrap()
    }

    async fn seeded(members: Vec<User>) -> (Arc<MemoryStore>, PullRequestService) {
        let store = Arc::new(MemoryStore::new());
        let team = Team::new("backend".into(), members).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.save_team(&team).await.unwrap();
        tx.commit().await.unwrap();

        let service = PullRequestService::new(
            store.clone(),
            Arc::new(RandomSelection::with_seed(7)),
        );
        (store, service)
    }

    fn open_pr(id: &str) -> PullRequest {
        PullRequest::new(id.into(), "Feature", "author".into(), None).unwrap()
    }

    #[tokio::test]
    async fn create_assigns_up_to_two_active_teammates() {
        let (_, service) = seeded(vec![
            member("author", true),
            member("rev1", true),
            member("rev2", true),
            member("rev3", false),
        ])
        .await;

        let pr = service.create(open_pr("pr-1")).await.unwrap();
        assert_eq!(pr.assigned_reviewers().len(), 2);
        for reviewer in pr.assigned_reviewers() {
            assert_ne!(reviewer.as_str(), "author");
            assert_ne!(reviewer.as_str(), "rev3", "inactive members are ineligible");
        }
    }

    #[tokio::test]
    async fn create_with_no_eligible_teammates_assigns_none() {
        let (_, service) = seeded(vec![member("author", true), member("rev1", false)]).await;
        let pr = service.create(open_pr("pr-1")).await.unwrap();
        assert!(pr.assigned_reviewers().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_unknown_author_without_writes() {
        let (store, service) = seeded(vec![member("author", true)]).await;
        let pr = PullRequest::new("pr-1".into(), "Feature", "ghost".into(), None).unwrap();
        let err = service.create(pr).await.unwrap_err();
        assert!(err.is_not_found());

        let mut tx = store.begin().await.unwrap();
        assert!(tx
            .get_pull_request(&"pr-1".into(), LockMode::Read)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let (_, service) = seeded(vec![member("author", true), member("rev1", true)]).await;
        service.create(open_pr("pr-1")).await.unwrap();
        let err = service.create(open_pr("pr-1")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Domain(DomainError::PullRequestExists)
        ));
    }

    #[tokio::test]
    async fn merge_is_idempotent_and_keeps_first_timestamp() {
        let (_, service) = seeded(vec![member("author", true), member("rev1", true)]).await;
        service.create(open_pr("pr-1")).await.unwrap();

        let first = Utc::now() - chrono::Duration::minutes(5);
        let merged = service.merge(&"pr-1".into(), first).await.unwrap();
        assert!(merged.is_merged());
        assert_eq!(merged.merged_at(), Some(first));

        let again = service.merge(&"pr-1".into(), Utc::now()).await.unwrap();
        assert_eq!(again.merged_at(), Some(first));
    }

    #[tokio::test]
    async fn reassign_replaces_in_place_with_fresh_candidate() {
        let (_, service) = seeded(vec![
            member("author", true),
            member("rev1", true),
            member("rev2", true),
            member("rev3", true),
        ])
        .await;

        let pr = service.create(open_pr("pr-1")).await.unwrap();
        let old = pr.assigned_reviewers()[0].clone();
        let keep = pr.assigned_reviewers()[1].clone();

        let (updated, replacement) = service.reassign(&"pr-1".into(), &old).await.unwrap();
        assert_eq!(updated.assigned_reviewers().len(), 2);
        assert_eq!(updated.assigned_reviewers()[1], keep, "untouched slot stays put");
        assert_eq!(updated.assigned_reviewers()[0], replacement);
        assert_ne!(replacement, old);
        assert_ne!(replacement, keep);
        assert_ne!(replacement.as_str(), "author");
    }

    #[tokio::test]
    async fn reassign_without_candidate_fails_and_writes_nothing() {
        let (store, service) = seeded(vec![
            member("author", true),
            member("rev1", true),
            member("rev2", true),
        ])
        .await;

        let pr = service.create(open_pr("pr-1")).await.unwrap();
        assert_eq!(pr.assigned_reviewers().len(), 2);
        let old = pr.assigned_reviewers()[0].clone();

        // Both teammates are already assigned, so no replacement exists.
        let err = service.reassign(&"pr-1".into(), &old).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Domain(DomainError::NoActiveCandidate)
        ));

        let mut tx = store.begin().await.unwrap();
        let stored = tx
            .get_pull_request(&"pr-1".into(), LockMode::Read)
            .await
            .unwrap();
        assert_eq!(stored.assigned_reviewers(), pr.assigned_reviewers());
    }

    #[tokio::test]
    async fn reassign_on_merged_pull_request_fails() {
        let (_, service) = seeded(vec![
            member("author", true),
            member("rev1", true),
            member("rev2", true),
            member("rev3", true),
        ])
        .await;

        let pr = service.create(open_pr("pr-1")).await.unwrap();
        let old = pr.assigned_reviewers()[0].clone();
        service.merge(&"pr-1".into(), Utc::now()).await.unwrap();

        let err = service.reassign(&"pr-1".into(), &old).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Domain(DomainError::PullRequestAlreadyMerged)
        ));
    }

    #[tokio::test]
    async fn reassign_of_unassigned_reviewer_fails() {
        let (_, service) = seeded(vec![
            member("author", true),
            member("rev1", true),
            member("rev2", true),
            member("rev3", true),
        ])
        .await;

        service.create(open_pr("pr-1")).await.unwrap();
        let err = service
            .reassign(&"pr-1".into(), &"ghost".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Domain(DomainError::ReviewerNotAssigned)
        ));
    }
}
