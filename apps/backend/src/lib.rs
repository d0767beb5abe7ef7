#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod config;
pub mod domain;
pub mod error;
pub mod providers;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod ws;

#[cfg(test)]
pub mod test_bootstrap;

// Re-exports for public API
pub use config::SessionConfig;
pub use error::AppError;
pub use state::AppState;
pub use storage::{ArchiveStore, MemoryStore, SessionStatus};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
