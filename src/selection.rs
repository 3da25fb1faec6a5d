//! Randomized reviewer selection.
//!
//! The strategy is a pure function over a candidate list: shuffle the
//! candidate indices, then walk the permutation taking the first `limit`
//! entries distinct by user id. This yields an unbiased subset in a single
//! O(n) pass after the shuffle, and never returns duplicates even when the
//! caller supplies duplicate entries.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::User;

pub trait ReviewerSelection: Send + Sync {
    /// Pick up to `limit` distinct users uniformly at random from
    /// `candidates`. Empty candidates or a zero limit yield an empty
    /// result, not an error.
    fn pick(&self, candidates: &[User], limit: usize) -> Vec<User>;
}

/// Default [`ReviewerSelection`] implementation.
///
/// The entropy-seeded path builds a fresh generator per call, so concurrent
/// selections share no mutable state. A seeded generator (tests) is shared
/// across calls and therefore mutex-guarded.
pub struct RandomSelection {
    seeded: Option<Mutex<StdRng>>,
}

impl RandomSelection {
    pub fn new() -> Self {
        Self { seeded: None }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl Default for RandomSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewerSelection for RandomSelection {
    fn pick(&self, candidates: &[User], limit: usize) -> Vec<User> {
        if limit == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        match &self.seeded {
            Some(shared) => {
                let mut rng = shared.lock().unwrap_or_else(PoisonError::into_inner);
                order.shuffle(&mut *rng);
            }
            None => order.shuffle(&mut StdRng::from_entropy()),
        }

        let mut seen = HashSet::with_capacity(candidates.len());
        let mut picked = Vec::with_capacity(limit.min(candidates.len()));
        for idx in order {
            let candidate = &candidates[idx];
            if !seen.insert(candidate.id().clone()) {
                continue;
            }
            picked.push(candidate.clone());
            if picked.len() == limit {
                break;
            }
        }
        picked
    }
}
