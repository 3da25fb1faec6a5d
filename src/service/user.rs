use std::sync::Arc;

use crate::domain::{PullRequest, User, UserId};
use crate::error::Error;
use crate::storage::Store;

use super::finish_tx;

pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Flip a user's availability for reviewer selection. Existing
    /// assignments are untouched.
    pub async fn set_is_active(&self, user_id: &UserId, active: bool) -> Result<User, Error> {
        let mut tx = self.store.begin().await?;
        let result = tx.set_user_activity(user_id, active).await;
        finish_tx(tx, result).await
    }

    /// Pull requests the user is assigned to review, most recent first.
    /// The user must exist; an empty assignment list is a normal result.
    pub async fn review_assignments(&self, user_id: &UserId) -> Result<Vec<PullRequest>, Error> {
        let mut tx = self.store.begin().await?;
        let result = async {
            tx.get_user(user_id).await?;
            tx.pull_requests_by_reviewer(user_id).await
        }
        .await;
        finish_tx(tx, result).await
    }
}
