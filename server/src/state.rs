use std::sync::Arc;
use std::time::Duration;

use crate::chat::router::ChannelRouter;
use crate::chat::typing::TypingCoordinator;
use crate::config::Config;
use crate::gateway::Gateway;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;
use crate::ws::{new_connection_registry, ConnectionRegistry};

/// Tunables the connection actors and router read at runtime.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub history_limit: usize,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for RuntimeSettings {
    fn from(config: &Config) -> Self {
        Self {
            history_limit: config.history_limit,
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Identity and message storage
    pub gateway: Arc<dyn Gateway>,
    /// Every live WebSocket connection, bound or anonymous
    pub connections: ConnectionRegistry,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub router: Arc<ChannelRouter>,
    pub typing: Arc<TypingCoordinator>,
    pub settings: RuntimeSettings,
}

impl AppState {
    pub fn new(gateway: Arc<dyn Gateway>, settings: RuntimeSettings) -> Self {
        let connections = new_connection_registry();
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());

        let router = Arc::new(ChannelRouter::new(
            gateway.clone(),
            presence.clone(),
            rooms.clone(),
            connections.clone(),
            settings.history_limit,
        ));
        let typing = Arc::new(TypingCoordinator::new(
            presence.clone(),
            rooms.clone(),
            connections.clone(),
        ));

        Self {
            gateway,
            connections,
            presence,
            rooms,
            router,
            typing,
            settings,
        }
    }
}
