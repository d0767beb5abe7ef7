//! Services layer: actors and orchestration over the pure domain.

pub mod connections;
pub mod session;
pub mod waiting_room;

#[cfg(test)]
mod tests_session;
#[cfg(test)]
mod tests_waiting_room;
