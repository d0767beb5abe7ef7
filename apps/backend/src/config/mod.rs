pub mod session;

pub use session::{AutomatedSeatSpec, SessionConfig};
