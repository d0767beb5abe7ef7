//! Scripted provider - replays a fixed action sequence.
//!
//! Used for deterministic experiment arms. The script is indexed by round;
//! a script shorter than the session repeats its last entry. A scripted
//! opt-out with no budget remaining degrades to defect rather than
//! submitting an invalid action.

use async_trait::async_trait;

use super::trait_def::{ActionProvider, OutgoingChat, ProviderContext, ProviderError};
use crate::domain::chat::ChatRecipient;
use crate::domain::state::GameAction;

pub struct ScriptedProvider {
    script: Vec<GameAction>,
    chat_script: Vec<String>,
}

impl ScriptedProvider {
    pub const NAME: &'static str = "scripted";
    pub const VERSION: &'static str = "1.0.0";

    pub fn new(script: Vec<GameAction>, chat_script: Vec<String>) -> Self {
        Self {
            script,
            chat_script,
        }
    }
}

#[async_trait]
impl ActionProvider for ScriptedProvider {
    async fn request_action(&self, ctx: &ProviderContext) -> Result<GameAction, ProviderError> {
        if self.script.is_empty() {
            return Err(ProviderError::InvalidAction("empty action script".into()));
        }
        let index = (ctx.round.saturating_sub(1) as usize).min(self.script.len() - 1);
        let mut action = self.script[index];
        if action == GameAction::OptOut && ctx.refusal_budget == 0 {
            action = GameAction::Defect;
        }
        Ok(action)
    }

    async fn request_messages(
        &self,
        ctx: &ProviderContext,
    ) -> Result<Vec<OutgoingChat>, ProviderError> {
        let index = ctx.round.saturating_sub(1) as usize;
        Ok(self
            .chat_script
            .get(index)
            .map(|content| OutgoingChat {
                to: ChatRecipient::All,
                content: content.clone(),
            })
            .into_iter()
            .collect())
    }
}
