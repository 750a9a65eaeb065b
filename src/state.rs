use crate::{
    config::Config,
    services::MessageStore,
    websocket::{ConnectionRegistry, MessageRouter, PresenceTracker},
};
use std::sync::Arc;

/// Process-wide shared state, constructed once in `main` and handed to every
/// connection task. Registry, presence and router share one instance of the
/// underlying state; there is no global singleton to reach for.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub presence: PresenceTracker,
    pub router: MessageRouter,
    pub store: Arc<dyn MessageStore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn MessageStore>) -> Self {
        let registry = ConnectionRegistry::new();
        let presence = registry.presence();
        let router = MessageRouter::new(registry.clone());
        Self {
            config,
            registry,
            presence,
            router,
            store,
        }
    }
}
