//! In-memory store.
//!
//! Backs unit and router tests with the same transactional semantics as the
//! SQLite store: a transaction holds the whole-store lock and keeps a
//! snapshot, so rollback (explicit or via drop) restores the pre-tx state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LockMode, Store, StoreTx};
use crate::domain::{PullRequest, PullRequestId, Team, TeamName, User, UserId};
use crate::error::Error;
use crate::idempotency::{hash_key, IdempotencyRecord, IdempotencyStore};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    teams: HashSet<TeamName>,
    users: HashMap<UserId, User>,
    pull_requests: HashMap<PullRequestId, PullRequest>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, Error> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot,
            finished: false,
        }))
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: MemoryState,
    finished: bool,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn save_team(&mut self, team: &Team) -> Result<(), Error> {
        if self.guard.teams.contains(team.name()) {
            return Err(crate::domain::DomainError::TeamExists.into());
        }
        self.guard.teams.insert(team.name().clone());
        for member in team.members() {
            self.guard.users.insert(member.id().clone(), member);
        }
        Ok(())
    }

    async fn get_team(&mut self, name: &TeamName) -> Result<Team, Error> {
        if !self.guard.teams.contains(name) {
            return Err(Error::NotFound("team"));
        }
        let members: Vec<User> = self
            .guard
            .users
            .values()
            .filter(|u| u.team_name() == name)
            .cloned()
            .collect();
        Ok(Team::new(name.clone(), members)?)
    }

    async fn get_user(&mut self, id: &UserId) -> Result<User, Error> {
        self.guard
            .users
            .get(id)
            .cloned()
            .ok_or(Error::NotFound("user"))
    }

    async fn set_user_activity(&mut self, id: &UserId, active: bool) -> Result<User, Error> {
        let user = self
            .guard
            .users
            .get(id)
            .cloned()
            .ok_or(Error::NotFound("user"))?
            .with_activity(active);
        self.guard.users.insert(id.clone(), user.clone());
        Ok(user)
    }

    async fn insert_pull_request(&mut self, pr: &PullRequest) -> Result<(), Error> {
        if self.guard.pull_requests.contains_key(pr.id()) {
            return Err(crate::domain::DomainError::PullRequestExists.into());
        }
        self.guard.pull_requests.insert(pr.id().clone(), pr.clone());
        Ok(())
    }

    async fn get_pull_request(
        &mut self,
        id: &PullRequestId,
        _lock: LockMode,
    ) -> Result<PullRequest, Error> {
        // The whole-store lock held by this tx already serializes access,
        // which subsumes the per-row lock request.
        self.guard
            .pull_requests
            .get(id)
            .cloned()
            .ok_or(Error::NotFound("pull request"))
    }

    async fn update_pull_request(&mut self, pr: &PullRequest) -> Result<(), Error> {
        if !self.guard.pull_requests.contains_key(pr.id()) {
            return Err(Error::NotFound("pull request"));
        }
        self.guard.pull_requests.insert(pr.id().clone(), pr.clone());
        Ok(())
    }

    async fn pull_requests_by_reviewer(
        &mut self,
        reviewer: &UserId,
    ) -> Result<Vec<PullRequest>, Error> {
        let mut assigned: Vec<PullRequest> = self
            .guard
            .pull_requests
            .values()
            .filter(|pr| pr.assigned_reviewers().contains(reviewer))
            .cloned()
            .collect();
        assigned.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(assigned)
    }

    async fn assignments_per_user(&mut self) -> Result<HashMap<UserId, u64>, Error> {
        let mut counts: HashMap<UserId, u64> = HashMap::new();
        for pr in self.guard.pull_requests.values() {
            for reviewer in pr.assigned_reviewers() {
                *counts.entry(reviewer.clone()).or_default() += 1;
            }
        }
        Ok(counts)
    }

    async fn assignments_per_pull_request(
        &mut self,
    ) -> Result<HashMap<PullRequestId, u64>, Error> {
        let mut counts: HashMap<PullRequestId, u64> = HashMap::new();
        for pr in self.guard.pull_requests.values() {
            if !pr.assigned_reviewers().is_empty() {
                counts.insert(pr.id().clone(), pr.assigned_reviewers().len() as u64);
            }
        }
        Ok(counts)
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let mut this = self;
        this.finished = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        let mut this = self;
        *this.guard = this.snapshot.clone();
        this.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            *self.guard = self.snapshot.clone();
        }
    }
}

/// In-memory idempotency record store with TTL expiry.
#[derive(Clone, Default)]
pub struct MemoryIdempotencyStore {
    records: Arc<Mutex<HashMap<Vec<u8>, (IdempotencyRecord, Instant)>>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, Error> {
        let records = self.records.lock().await;
        Ok(records
            .get(&hash_key(key))
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(record, _)| record.clone()))
    }

    async fn save(
        &self,
        key: &str,
        record: IdempotencyRecord,
        ttl: Duration,
    ) -> Result<(), Error> {
        let mut records = self.records.lock().await;
        records.insert(hash_key(key), (record, Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    fn user(id: &str, team: &str, active: bool) -> User {
        User::new(id.into(), id, team.into(), active).unwrap()
    }

    #[tokio::test]
    async fn save_team_rejects_duplicate() {
        let store = MemoryStore::new();
        let team = Team::new("backend".into(), vec![user("u1", "backend", true)]).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.save_team(&team).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.save_team(&team).await.unwrap_err();
        assert!(matches!(err, Error::Domain(DomainError::TeamExists)));
    }

    #[tokio::test]
    async fn dropped_tx_rolls_back() {
        let store = MemoryStore::new();
        let team = Team::new("backend".into(), vec![user("u1", "backend", true)]).unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.save_team(&team).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin().await.unwrap();
        let err = tx.get_team(&"backend".into()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn explicit_rollback_restores_snapshot() {
        let store = MemoryStore::new();
        let team = Team::new("backend".into(), vec![user("u1", "backend", true)]).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.save_team(&team).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_team(&"backend".into()).await.is_err());
    }

    #[tokio::test]
    async fn idempotency_record_expires() {
        let store = MemoryIdempotencyStore::new();
        let record = IdempotencyRecord {
            request: crate::idempotency::StoredRequest {
                method: "POST".into(),
                path: "/x".into(),
                body: b"{}".to_vec(),
            },
            response: crate::idempotency::StoredResponse {
                status: 200,
                body: b"ok".to_vec(),
                headers: HashMap::new(),
            },
        };
        store
            .save("key", record, Duration::from_secs(0))
            .await
            .unwrap();
        assert!(store.get("key").await.unwrap().is_none());
    }
}
