//! services/pulse_api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::connections::ConnectionHub;
use pulse_core::{ChatHub, MessageStore};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: ChatHub,
    pub connections: Arc<ConnectionHub>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn messages(&self) -> &MessageStore {
        self.hub.messages()
    }
}
