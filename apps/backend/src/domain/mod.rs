//! Domain layer: pure session/game logic, no I/O.

pub mod chat;
pub mod errors;
pub mod payoff;
pub mod rounds;
pub mod snapshot;
pub mod state;

#[cfg(test)]
mod tests_chat;
#[cfg(test)]
mod tests_payoff;
#[cfg(test)]
mod tests_rounds;
#[cfg(test)]
mod tests_snapshot;

// Re-exports for ergonomics
pub use payoff::{PayoffBounds, PayoffParams, PayoffSchedule, PayoffStrategy};
pub use rounds::{RoundOutcome, RoundRecord};
pub use state::{GameAction, Participant, ParticipantId, ParticipantKind, Phase, Seat};
