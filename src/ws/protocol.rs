//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Game modes a room can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Top-down arena duel with projectiles
    Shooter,
    /// Shared build grid with place/break edits
    Block,
}

impl Default for GameMode {
    fn default() -> Self {
        Self::Shooter
    }
}

/// One-shot cell edit targeting the build grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CellAction {
    Place { gx: i32, gy: i32 },
    Break { gx: i32, gy: i32 },
}

impl CellAction {
    pub fn target(&self) -> (i32, i32) {
        match *self {
            CellAction::Place { gx, gy } | CellAction::Break { gx, gy } => (gx, gy),
        }
    }
}

/// A player's input snapshot for one tick.
///
/// Clients resend the whole record at their own cadence; the server keeps
/// only the most recent one (last write wins, no queueing). The `action`
/// field is a one-shot edit consumed by the next tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputState {
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub shoot: bool,
    /// Aim point in arena coordinates (shooter mode)
    #[serde(default, rename = "aimX", skip_serializing_if = "Option::is_none")]
    pub aim_x: Option<f32>,
    #[serde(default, rename = "aimY", skip_serializing_if = "Option::is_none")]
    pub aim_y: Option<f32>,
    /// Pending cell edit (block mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<CellAction>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMsg {
    /// Bind this connection to a room, creating the room on first use
    #[serde(rename_all = "camelCase")]
    Join {
        /// Room identifier; a missing value means the shared default room
        #[serde(default)]
        room: Option<String>,
        /// Stable client identity for reconnection; generated when absent
        #[serde(default)]
        client_id: Option<String>,
        /// Requested mode; only honored when the room is created by this join
        #[serde(default)]
        mode: Option<GameMode>,
    },

    /// Latest input snapshot; replaces the previous one wholesale
    Input { input: InputState },

    /// Reset the room simulation for a new round
    Rematch,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMsg {
    /// Reply to a successful join, carrying the full current room state
    #[serde(rename_all = "camelCase")]
    Joined {
        client_id: String,
        room_id: String,
        mode: GameMode,
        state: RoomStateView,
    },

    /// Both players are present; the simulation is running
    Ready { message: String, mode: GameMode },

    /// Room already holds two other players; connection will be closed
    Full,

    /// Per-tick snapshot broadcast to all room members
    State {
        tick: u64,
        players: BTreeMap<String, PlayerView>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bullets: Option<Vec<BulletView>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        grid: Option<GridView>,
        running: bool,
    },

    /// Score limit reached; simulation halted until a rematch
    Gameover {
        winner: String,
        state: RoomStateView,
    },

    /// Simulation was reset; carries the fresh state
    Rematch { state: RoomStateView },
}

/// Full room state as sent in `joined`, `gameover`, and `rematch`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateView {
    pub tick: u64,
    pub players: BTreeMap<String, PlayerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bullets: Option<Vec<BulletView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridView>,
    pub running: bool,
    pub score_limit: u32,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub score: u32,
    pub connected: bool,
}

/// Projectile state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletView {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub owner: String,
    pub ttl: u32,
}

/// Build grid in a snapshot; `cells` is row-major, 0 = empty, 1 = occupied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridView {
    pub w: usize,
    pub h: usize,
    pub cells: Vec<Vec<u8>>,
}
