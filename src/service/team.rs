use std::sync::Arc;

use crate::domain::{DomainError, Requester, Team, TeamName};
use crate::error::Error;
use crate::storage::Store;

use super::finish_tx;

pub struct TeamService {
    store: Arc<dyn Store>,
}

impl TeamService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register a new team with its initial roster.
    pub async fn add_team(&self, team: Team) -> Result<Team, Error> {
        let mut tx = self.store.begin().await?;
        let result = tx.save_team(&team).await;
        finish_tx(tx, result.map(|()| team)).await
    }

    /// Fetch a team, enforcing the caller's visibility.
    pub async fn get_team(&self, requester: &Requester, name: &TeamName) -> Result<Team, Error> {
        let mut tx = self.store.begin().await?;
        let result = tx.get_team(name).await;
        let team = finish_tx(tx, result).await?;

        if !requester.can_view_team(&team) {
            return Err(DomainError::TeamAccessDenied.into());
        }
        Ok(team)
    }
}
