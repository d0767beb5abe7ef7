//! Tit-for-tat provider.
//!
//! Cooperates on the first round, then mirrors the group's revealed
//! signal: defects when the preceding round's cooperation rate fell below
//! one half, cooperates otherwise. Never opts out.

use async_trait::async_trait;

use super::trait_def::{ActionProvider, ProviderContext, ProviderError};
use crate::domain::state::GameAction;

pub struct TitForTatProvider;

impl TitForTatProvider {
    pub const NAME: &'static str = "tit_for_tat";
    pub const VERSION: &'static str = "1.0.0";

    pub fn new() -> Self {
        Self
    }
}

impl Default for TitForTatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionProvider for TitForTatProvider {
    async fn request_action(&self, ctx: &ProviderContext) -> Result<GameAction, ProviderError> {
        let action = match ctx.history.last() {
            None => GameAction::Cooperate,
            Some(previous) if previous.cooperation_rate >= 0.5 => GameAction::Cooperate,
            Some(_) => GameAction::Defect,
        };
        Ok(action)
    }
}
