//! Game simulation modules

pub mod combat;
pub mod grid;
pub mod movement;
pub mod room;
pub mod snapshot;

pub use room::{GameRoom, Player, RoomHandle, RoomRegistry, RoomState};

use tokio::sync::{mpsc, oneshot};

use crate::ws::protocol::{InputState, ServerMsg};

/// Commands routed from connection sessions into a room's owning task.
///
/// All room-state mutation flows through this channel, so message handling
/// is serialized with the tick on one task.
#[derive(Debug)]
pub enum RoomCmd {
    /// Bind a transport to a client identity in this room
    Join {
        client_id: String,
        transport: mpsc::Sender<ServerMsg>,
        ack: oneshot::Sender<JoinOutcome>,
    },

    /// Replace a player's pending input wholesale
    Input {
        client_id: String,
        input: InputState,
    },

    /// Reset the simulation for a new round
    Rematch { client_id: String },

    /// A transport closed; `transport` identifies which binding is departing
    /// so a reconnect that already replaced it is left alone
    Disconnect {
        client_id: String,
        transport: mpsc::Sender<ServerMsg>,
    },
}

/// Result of a join attempt, reported back to the connection session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Transport bound; `joined` has been queued on it
    Joined,
    /// Room already holds two other live players; `full` has been queued
    Full,
}
