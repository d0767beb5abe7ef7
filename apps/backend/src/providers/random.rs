//! Random provider - chooses uniformly among legal actions.
//!
//! Reference implementation of the [`ActionProvider`](super::ActionProvider)
//! trait: thread-safe interior mutability via `Mutex<StdRng>`, optional
//! seeding for deterministic replays, and no panics.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::prelude::*;

use super::trait_def::{ActionProvider, ProviderContext, ProviderError};
use crate::domain::state::GameAction;

pub struct RandomProvider {
    /// `Mutex` for interior mutability: trait methods take `&self` but the
    /// RNG needs mutable access.
    rng: Mutex<StdRng>,
}

impl RandomProvider {
    pub const NAME: &'static str = "random";
    pub const VERSION: &'static str = "1.0.0";

    /// `Some(seed)` gives reproducible behavior for tests and replays;
    /// `None` uses system entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl ActionProvider for RandomProvider {
    async fn request_action(&self, ctx: &ProviderContext) -> Result<GameAction, ProviderError> {
        let legal = ctx.legal_actions();
        if legal.is_empty() {
            return Err(ProviderError::InvalidAction(
                "no legal actions available".into(),
            ));
        }

        let mut rng = self
            .rng
            .lock()
            .map_err(|e| ProviderError::Internal(format!("RNG lock poisoned: {e}")))?;

        legal
            .choose(&mut *rng)
            .copied()
            .ok_or_else(|| ProviderError::Internal("failed to choose random action".into()))
    }
}
