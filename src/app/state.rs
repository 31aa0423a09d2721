//! Application state shared across routes

use crate::game::ArenaHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub arena: ArenaHandle,
}

impl AppState {
    pub fn new(arena: ArenaHandle) -> Self {
        Self { arena }
    }
}
