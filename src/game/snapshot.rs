//! Snapshot assembly for network transmission

use std::collections::BTreeMap;

use crate::ws::protocol::{BulletView, GridView, PlayerView, RoomStateView, ServerMsg};

use super::combat::Projectile;
use super::room::{ModeState, Player, RoomState};

fn player_view(player: &Player) -> PlayerView {
    PlayerView {
        id: player.id.clone(),
        x: player.x,
        y: player.y,
        hp: player.hp,
        score: player.score,
        connected: player.connected,
    }
}

fn bullet_view(bullet: &Projectile) -> BulletView {
    BulletView {
        id: bullet.id,
        x: bullet.x,
        y: bullet.y,
        vx: bullet.vx,
        vy: bullet.vy,
        owner: bullet.owner.clone(),
        ttl: bullet.ttl,
    }
}

fn players_view(state: &RoomState) -> BTreeMap<String, PlayerView> {
    state
        .players
        .iter()
        .map(|(id, p)| (id.clone(), player_view(p)))
        .collect()
}

fn entity_views(state: &RoomState) -> (Option<Vec<BulletView>>, Option<GridView>) {
    match &state.arena {
        ModeState::Shooter { bullets, .. } => {
            (Some(bullets.iter().map(bullet_view).collect()), None)
        }
        ModeState::Block { grid } => (None, Some(grid.view())),
    }
}

/// Full room state for `joined`, `gameover`, and `rematch` replies
pub fn room_view(state: &RoomState) -> RoomStateView {
    let (bullets, grid) = entity_views(state);
    RoomStateView {
        tick: state.tick,
        players: players_view(state),
        bullets,
        grid,
        running: state.running,
        score_limit: state.score_limit,
    }
}

/// Per-tick `state` snapshot
pub fn state_msg(state: &RoomState) -> ServerMsg {
    let (bullets, grid) = entity_views(state);
    ServerMsg::State {
        tick: state.tick,
        players: players_view(state),
        bullets,
        grid,
        running: state.running,
    }
}
