use std::sync::Arc;

use actix::Addr;
use dashmap::DashMap;
use uuid::Uuid;

use crate::services::connections::ConnectionManager;
use crate::services::session::SessionActor;
use crate::services::waiting_room::WaitingRoomActor;
use crate::storage::{ArchiveStore, MemoryStore};
use crate::ws::hub::SessionHub;

/// Application state containing shared resources. Collaborator handles are
/// passed explicitly so sessions and tests can substitute fakes.
pub struct AppState {
    pub hub: Arc<SessionHub>,
    pub connections: Arc<ConnectionManager>,
    pub store: Arc<dyn ArchiveStore>,
    pub rooms: DashMap<Uuid, Addr<WaitingRoomActor>>,
    pub sessions: DashMap<Uuid, Addr<SessionActor>>,
}

impl AppState {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self {
            hub: Arc::new(SessionHub::new()),
            connections: Arc::new(ConnectionManager::default()),
            store,
            rooms: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// State backed by an in-memory store, for tests.
    pub fn for_tests() -> (Arc<Self>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Arc::new(Self::new(store.clone())), store)
    }
}
