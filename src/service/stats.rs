use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Error;
use crate::storage::Store;

use super::finish_tx;

/// Assignment counts over the whole store, keyed by plain identifiers so
/// the result serializes directly.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentsStats {
    pub by_user: HashMap<String, u64>,
    pub by_pull_request: HashMap<String, u64>,
}

impl AssignmentsStats {
    pub fn total(&self) -> u64 {
        self.by_user.values().sum()
    }
}

pub struct StatsService {
    store: Arc<dyn Store>,
}

impl StatsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Both aggregates come from the same transaction, so the two maps are
    /// a consistent snapshot.
    pub async fn assignments(&self) -> Result<AssignmentsStats, Error> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let by_user = tx.assignments_per_user().await?;
            let by_pull_request = tx.assignments_per_pull_request().await?;
            Ok(AssignmentsStats {
                by_user: by_user
                    .into_iter()
                    .map(|(id, count)| (id.to_string(), count))
                    .collect(),
                by_pull_request: by_pull_request
                    .into_iter()
                    .map(|(id, count)| (id.to_string(), count))
                    .collect(),
            })
        }
        .await;
        finish_tx(tx, result).await
    }
}
