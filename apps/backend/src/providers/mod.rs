//! Action-provider collaborator for automated and scripted participants.

pub mod random;
pub mod registry;
pub mod scripted;
pub mod tit_for_tat;
pub mod trait_def;

pub use random::RandomProvider;
pub use registry::{create_provider, registered_providers};
pub use scripted::ScriptedProvider;
pub use tit_for_tat::TitForTatProvider;
pub use trait_def::{ActionProvider, OutgoingChat, ProviderContext, ProviderError};
