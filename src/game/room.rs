//! Room state, registry, and the authoritative per-room tick loop

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::{unix_millis, TICK_INTERVAL};
use crate::ws::protocol::{GameMode, InputState, ServerMsg};

use super::combat::{CombatSystem, Projectile};
use super::grid::BlockGrid;
use super::movement::{ArenaBounds, MovementSystem};
use super::snapshot;
use super::{JoinOutcome, RoomCmd};

/// Score at which a shooter round ends
pub const SCORE_LIMIT: u32 = 5;

/// Starting and respawn health
pub const PLAYER_MAX_HP: i32 = 3;

/// How long an empty room survives before it is retired
pub const ROOM_GRACE_PERIOD: Duration = Duration::from_secs(60);

const CMD_BUFFER: usize = 256;

/// Authoritative player record. Survives disconnects; only a room reset or
/// room destruction discards it.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub hp: i32,
    pub score: u32,
    pub last_shot_at: u64,
    pub connected: bool,
    pub input: InputState,
}

/// Mode-specific entity state
#[derive(Debug)]
pub enum ModeState {
    Shooter {
        bullets: Vec<Projectile>,
        next_bullet_id: u64,
    },
    Block {
        grid: BlockGrid,
    },
}

impl ModeState {
    fn initial(mode: GameMode) -> Self {
        match mode {
            GameMode::Shooter => ModeState::Shooter {
                bullets: Vec::new(),
                next_bullet_id: 1,
            },
            GameMode::Block => ModeState::Block {
                grid: BlockGrid::default(),
            },
        }
    }
}

/// Result of one tick invocation
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// False when the room was not running and the tick was skipped
    pub ran: bool,
    /// Set when the score limit was reached this tick
    pub winner: Option<String>,
}

/// Simulation state owned by one room task.
///
/// Players are keyed in a `BTreeMap` so collision and win-check scans walk
/// identifiers in ascending order rather than hash order.
pub struct RoomState {
    pub mode: GameMode,
    pub tick: u64,
    pub running: bool,
    pub score_limit: u32,
    pub players: BTreeMap<String, Player>,
    pub arena: ModeState,
    rng: ChaCha8Rng,
}

impl RoomState {
    pub fn new(mode: GameMode, seed: u64) -> Self {
        Self {
            mode,
            tick: 0,
            running: false,
            score_limit: SCORE_LIMIT,
            players: BTreeMap::new(),
            arena: ModeState::initial(mode),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Create a fresh player record at a randomized spawn position
    pub fn spawn_player(&mut self, id: &str) -> Player {
        let (x, y) = self.spawn_position();
        Player {
            id: id.to_string(),
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            hp: PLAYER_MAX_HP,
            score: 0,
            last_shot_at: 0,
            connected: true,
            input: InputState::default(),
        }
    }

    fn spawn_position(&mut self) -> (f32, f32) {
        match &self.arena {
            ModeState::Shooter { .. } => shooter_spawn(&mut self.rng),
            ModeState::Block { grid } => {
                let bounds = ArenaBounds::for_grid(grid);
                (
                    self.rng.gen_range(bounds.min_x..bounds.max_x),
                    self.rng.gen_range(bounds.min_y..bounds.max_y),
                )
            }
        }
    }

    /// Reset to initial conditions for a rematch: tick 0, fresh entities,
    /// fresh player records for every known identifier, mode preserved.
    /// Connected flags and the running flag follow the live transports.
    pub fn reset_round(&mut self, live_ids: &[String]) {
        self.tick = 0;
        self.arena = ModeState::initial(self.mode);
        let ids: Vec<String> = self.players.keys().cloned().collect();
        self.players.clear();
        for id in ids {
            let mut player = self.spawn_player(&id);
            player.connected = live_ids.contains(&id);
            self.players.insert(id, player);
        }
        self.running = live_ids.len() >= 2;
    }

    /// Advance the simulation by one tick. A room that is not running skips
    /// everything, including the tick counter.
    pub fn advance_tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::default();
        }
        self.tick += 1;

        self.step_players();
        self.step_bullets();
        let winner = self.check_win();

        TickOutcome { ran: true, winner }
    }

    /// Movement integration and mode-specific action resolution
    fn step_players(&mut self) {
        let bounds = match &self.arena {
            ModeState::Shooter { .. } => ArenaBounds::shooter(),
            ModeState::Block { grid } => ArenaBounds::for_grid(grid),
        };
        let now = unix_millis();

        let Self { players, arena, .. } = self;
        for player in players.values_mut() {
            let (vx, vy) = MovementSystem::velocity(&player.input);
            player.vx = vx;
            player.vy = vy;
            let (x, y) = MovementSystem::step(player.x, player.y, vx, vy, &bounds);
            player.x = x;
            player.y = y;

            match arena {
                ModeState::Shooter {
                    bullets,
                    next_bullet_id,
                } => {
                    if player.input.shoot && CombatSystem::can_fire(now, player.last_shot_at) {
                        player.last_shot_at = now;
                        let (dir_x, dir_y) = CombatSystem::aim_direction(
                            player.x,
                            player.y,
                            player.input.aim_x,
                            player.input.aim_y,
                        );
                        let id = *next_bullet_id;
                        *next_bullet_id += 1;
                        bullets.push(CombatSystem::spawn(
                            id, &player.id, player.x, player.y, dir_x, dir_y,
                        ));
                    }
                }
                ModeState::Block { grid } => {
                    // One-shot edit: consumed here so it cannot repeat next tick.
                    if let Some(action) = player.input.action.take() {
                        grid.apply(action);
                    }
                }
            }
        }
    }

    /// Projectile advancement, culling, and hit resolution
    fn step_bullets(&mut self) {
        let Self {
            players,
            arena,
            rng,
            ..
        } = self;
        let ModeState::Shooter { bullets, .. } = arena else {
            return;
        };

        let mut i = 0;
        while i < bullets.len() {
            if !bullets[i].update() {
                bullets.remove(i);
                continue;
            }

            let mut hit = false;
            let mut scorer: Option<String> = None;
            // Ascending identifier order; the first player hit absorbs the bullet.
            for (id, player) in players.iter_mut() {
                if *id == bullets[i].owner {
                    continue;
                }
                if bullets[i].check_hit(player.x, player.y) {
                    player.hp -= 1;
                    if player.hp <= 0 {
                        player.hp = PLAYER_MAX_HP;
                        let (x, y) = shooter_spawn(rng);
                        player.x = x;
                        player.y = y;
                        scorer = Some(bullets[i].owner.clone());
                    }
                    hit = true;
                    break;
                }
            }

            if let Some(owner_id) = scorer {
                if let Some(owner) = players.get_mut(&owner_id) {
                    owner.score += 1;
                }
            }

            if hit {
                bullets.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// First player (ascending id) at or past the score limit wins
    fn check_win(&mut self) -> Option<String> {
        let winner = self
            .players
            .iter()
            .find(|(_, p)| p.score >= self.score_limit)
            .map(|(id, _)| id.clone());
        if winner.is_some() {
            self.running = false;
        }
        winner
    }
}

/// Randomized spawn inside the shooter arena's interior
fn shooter_spawn(rng: &mut ChaCha8Rng) -> (f32, f32) {
    (rng.gen_range(100.0..700.0), rng.gen_range(100.0..400.0))
}

/// Handle to a running room task
#[derive(Clone)]
pub struct RoomHandle {
    pub id: String,
    pub mode: GameMode,
    pub cmd_tx: mpsc::Sender<RoomCmd>,
    transport_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn transport_count(&self) -> usize {
        self.transport_count.load(Ordering::Relaxed)
    }

    /// True once the room task has retired and its channel closed
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// The room actor: owns the simulation state and its connected transports,
/// and serializes command handling with the tick on one task.
pub struct GameRoom {
    id: String,
    state: RoomState,
    transports: HashMap<String, mpsc::Sender<ServerMsg>>,
    cmd_rx: mpsc::Receiver<RoomCmd>,
    transport_count: Arc<AtomicUsize>,
    grace_period: Duration,
    empty_since: Option<Instant>,
}

impl GameRoom {
    pub fn new(
        id: &str,
        mode: GameMode,
        seed: u64,
        grace_period: Duration,
    ) -> (Self, RoomHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_BUFFER);
        let transport_count = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            id: id.to_string(),
            mode,
            cmd_tx,
            transport_count: transport_count.clone(),
        };

        let room = Self {
            id: id.to_string(),
            state: RoomState::new(mode, seed),
            transports: HashMap::new(),
            cmd_rx,
            transport_count,
            grace_period,
            // A room nobody ever joins still retires after the grace period.
            empty_since: Some(Instant::now()),
        };

        (room, handle)
    }

    /// Run the room until it has been empty for the full grace period
    pub async fn run(mut self) {
        info!(room_id = %self.id, mode = ?self.state.mode, "Room started");

        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let outcome = self.state.advance_tick();
                    if let Some(winner) = &outcome.winner {
                        info!(
                            room_id = %self.id,
                            winner = %winner,
                            tick = self.state.tick,
                            "Score limit reached"
                        );
                        self.broadcast(ServerMsg::Gameover {
                            winner: winner.clone(),
                            state: snapshot::room_view(&self.state),
                        });
                    }
                    if outcome.ran {
                        self.broadcast(snapshot::state_msg(&self.state));
                    }
                    if self.should_retire() {
                        info!(room_id = %self.id, "Empty past grace period, retiring");
                        break;
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_cmd(cmd),
                        None => break,
                    }
                }
            }
        }
    }

    fn handle_cmd(&mut self, cmd: RoomCmd) {
        match cmd {
            RoomCmd::Join {
                client_id,
                transport,
                ack,
            } => self.handle_join(client_id, transport, ack),
            RoomCmd::Input { client_id, input } => self.handle_input(&client_id, input),
            RoomCmd::Rematch { client_id } => self.handle_rematch(&client_id),
            RoomCmd::Disconnect {
                client_id,
                transport,
            } => self.handle_disconnect(&client_id, &transport),
        }
    }

    fn handle_join(
        &mut self,
        client_id: String,
        transport: mpsc::Sender<ServerMsg>,
        ack: tokio::sync::oneshot::Sender<JoinOutcome>,
    ) {
        // Two distinct live identifiers max; a known identifier may rebind.
        if self.transports.len() >= 2 && !self.transports.contains_key(&client_id) {
            warn!(room_id = %self.id, client_id = %client_id, "Join rejected, room full");
            let _ = transport.try_send(ServerMsg::Full);
            let _ = ack.send(JoinOutcome::Full);
            return;
        }

        self.transports.insert(client_id.clone(), transport.clone());
        self.empty_since = None;
        self.sync_transport_count();

        if let Some(player) = self.state.players.get_mut(&client_id) {
            player.connected = true;
        } else {
            let player = self.state.spawn_player(&client_id);
            self.state.players.insert(client_id.clone(), player);
        }

        let _ = transport.try_send(ServerMsg::Joined {
            client_id: client_id.clone(),
            room_id: self.id.clone(),
            mode: self.state.mode,
            state: snapshot::room_view(&self.state),
        });
        let _ = ack.send(JoinOutcome::Joined);

        info!(
            room_id = %self.id,
            client_id = %client_id,
            transports = self.transports.len(),
            "Player joined room"
        );

        if self.transports.len() == 2 {
            self.state.running = true;
            self.broadcast(ServerMsg::Ready {
                message: "Both players connected. Game running.".to_string(),
                mode: self.state.mode,
            });
        }
    }

    fn handle_input(&mut self, client_id: &str, input: InputState) {
        if let Some(player) = self.state.players.get_mut(client_id) {
            player.input = input;
        }
    }

    fn handle_rematch(&mut self, client_id: &str) {
        info!(room_id = %self.id, client_id = %client_id, "Rematch requested");
        let live_ids: Vec<String> = self.transports.keys().cloned().collect();
        self.state.reset_round(&live_ids);
        self.broadcast(ServerMsg::Rematch {
            state: snapshot::room_view(&self.state),
        });
    }

    fn handle_disconnect(&mut self, client_id: &str, transport: &mpsc::Sender<ServerMsg>) {
        let departing = self
            .transports
            .get(client_id)
            .map(|bound| bound.same_channel(transport))
            .unwrap_or(false);
        if !departing {
            // A reconnect already replaced this binding.
            return;
        }

        self.transports.remove(client_id);
        self.sync_transport_count();
        if let Some(player) = self.state.players.get_mut(client_id) {
            player.connected = false;
        }

        info!(
            room_id = %self.id,
            client_id = %client_id,
            transports = self.transports.len(),
            "Player disconnected"
        );

        if self.transports.is_empty() {
            self.empty_since = Some(Instant::now());
        }
    }

    fn sync_transport_count(&self) {
        self.transport_count
            .store(self.transports.len(), Ordering::Relaxed);
    }

    fn should_retire(&self) -> bool {
        match self.empty_since {
            Some(since) => {
                self.transports.is_empty() && since.elapsed() >= self.grace_period
            }
            None => false,
        }
    }

    /// Fan a message out to every live transport. A full channel drops the
    /// message for that peer rather than stalling the tick.
    fn broadcast(&self, msg: ServerMsg) {
        for (client_id, tx) in &self.transports {
            if let Err(err) = tx.try_send(msg.clone()) {
                debug!(
                    room_id = %self.id,
                    client_id = %client_id,
                    error = %err,
                    "Dropping outbound message"
                );
            }
        }
    }
}

/// Registry of all active rooms
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    grace_period: Duration,
    /// Handed to room tasks so a retiring room can deregister itself
    self_ref: Weak<RoomRegistry>,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Self::with_grace_period(ROOM_GRACE_PERIOD)
    }

    /// Registry with a custom empty-room grace period
    pub fn with_grace_period(grace_period: Duration) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            rooms: DashMap::new(),
            grace_period,
            self_ref: self_ref.clone(),
        })
    }

    /// Return the room's handle, creating the room on first use. The mode is
    /// fixed by whoever creates the room; later callers get the existing room
    /// whatever mode they asked for. A handle whose task already retired is
    /// replaced with a fresh room.
    pub fn get_or_create(&self, room_id: &str, mode: GameMode) -> RoomHandle {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    let handle = self.spawn_room(room_id, mode);
                    entry.insert(handle.clone());
                    handle
                } else {
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn_room(room_id, mode);
                entry.insert(handle.clone());
                handle
            }
        }
    }

    fn spawn_room(&self, room_id: &str, mode: GameMode) -> RoomHandle {
        let seed = rand::random::<u64>();
        let (room, handle) = GameRoom::new(room_id, mode, seed, self.grace_period);

        let registry = self.self_ref.clone();
        let id = room_id.to_string();
        tokio::spawn(async move {
            room.run().await;
            if let Some(registry) = registry.upgrade() {
                registry.remove(&id);
                info!(room_id = %id, "Room removed from registry");
            }
        });

        handle
    }

    /// Delete a room, but only while it has zero live transports
    pub fn remove(&self, room_id: &str) -> bool {
        self.rooms
            .remove_if(room_id, |_, handle| handle.transport_count() == 0)
            .is_some()
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms
            .iter()
            .map(|entry| entry.value().transport_count())
            .sum()
    }
}
