//! Duel Game Server - authoritative two-player game-room server
//!
//! Server-side systems:
//! - WebSocket gateway for real-time gameplay
//! - Room registry with lazy creation and grace-period garbage collection
//! - Fixed 20 Hz tick loop per room (shooter and block modes)
//! - Snapshot broadcasting to room members

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
