//! Real-time message routing: fan-out helpers, the three-scope router and typing relay.

pub mod broadcast;
pub mod router;
pub mod typing;

use crate::ws::ConnectionId;

/// The authenticated connection an event came from.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub connection: ConnectionId,
    pub username: &'a str,
}

impl<'a> Origin<'a> {
    pub fn new(connection: ConnectionId, username: &'a str) -> Self {
        Self {
            connection,
            username,
        }
    }
}
