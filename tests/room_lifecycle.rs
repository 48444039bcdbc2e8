//! Room actor and registry tests: join/reconnect flow, capacity limits,
//! snapshot fan-out, and grace-period garbage collection.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use duel_game_server::game::{GameRoom, JoinOutcome, RoomCmd, RoomHandle, RoomRegistry};
use duel_game_server::ws::protocol::{GameMode, InputState, ServerMsg};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Spawn a standalone room task with a short grace period.
fn spawn_room(mode: GameMode) -> RoomHandle {
    let (room, handle) = GameRoom::new("test-room", mode, 1234, Duration::from_millis(200));
    tokio::spawn(room.run());
    handle
}

/// Bind a fake transport to the room, returning its channel ends and the
/// join outcome.
async fn join(
    handle: &RoomHandle,
    client_id: &str,
) -> (
    mpsc::Sender<ServerMsg>,
    mpsc::Receiver<ServerMsg>,
    JoinOutcome,
) {
    let (tx, rx) = mpsc::channel(64);
    let (ack_tx, ack_rx) = oneshot::channel();
    handle
        .cmd_tx
        .send(RoomCmd::Join {
            client_id: client_id.to_string(),
            transport: tx.clone(),
            ack: ack_tx,
        })
        .await
        .expect("room task alive");
    let outcome = ack_rx.await.expect("ack");
    (tx, rx, outcome)
}

async fn recv(rx: &mut mpsc::Receiver<ServerMsg>) -> ServerMsg {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("transport channel closed")
}

/// Skip forward to the next `state` snapshot.
async fn next_state(rx: &mut mpsc::Receiver<ServerMsg>) -> ServerMsg {
    loop {
        let msg = recv(rx).await;
        if matches!(msg, ServerMsg::State { .. }) {
            return msg;
        }
    }
}

#[tokio::test]
async fn join_flow_starts_the_room_and_streams_snapshots() {
    let handle = spawn_room(GameMode::Shooter);

    let (_tx_a, mut rx_a, outcome) = join(&handle, "a").await;
    assert_eq!(outcome, JoinOutcome::Joined);

    let joined = recv(&mut rx_a).await;
    let spawn_x = match joined {
        ServerMsg::Joined {
            client_id,
            room_id,
            mode,
            state,
        } => {
            assert_eq!(client_id, "a");
            assert_eq!(room_id, "test-room");
            assert_eq!(mode, GameMode::Shooter);
            assert!(!state.running, "one player must not start the game");
            state.players["a"].x
        }
        other => panic!("expected joined, got {other:?}"),
    };

    let (_tx_b, mut rx_b, outcome) = join(&handle, "b").await;
    assert_eq!(outcome, JoinOutcome::Joined);

    // The second player gets its own `joined` before the shared `ready`.
    assert!(matches!(recv(&mut rx_b).await, ServerMsg::Joined { .. }));
    assert!(matches!(recv(&mut rx_b).await, ServerMsg::Ready { .. }));
    assert!(matches!(recv(&mut rx_a).await, ServerMsg::Ready { .. }));

    // Snapshots now flow with increasing ticks.
    let first = match next_state(&mut rx_a).await {
        ServerMsg::State { tick, running, .. } => {
            assert!(running);
            tick
        }
        _ => unreachable!(),
    };
    match next_state(&mut rx_a).await {
        ServerMsg::State { tick, .. } => assert!(tick > first),
        _ => unreachable!(),
    }

    // Held input moves the player on subsequent ticks.
    handle
        .cmd_tx
        .send(RoomCmd::Input {
            client_id: "a".to_string(),
            input: InputState {
                right: true,
                ..InputState::default()
            },
        })
        .await
        .unwrap();

    let mut moved = false;
    for _ in 0..10 {
        if let ServerMsg::State { players, .. } = next_state(&mut rx_a).await {
            if players["a"].x > spawn_x {
                moved = true;
                break;
            }
        }
    }
    assert!(moved, "player never moved right from {spawn_x}");
}

#[tokio::test]
async fn third_distinct_joiner_is_rejected_without_a_player_record() {
    let handle = spawn_room(GameMode::Shooter);

    let (_tx_a, mut rx_a, _) = join(&handle, "a").await;
    let (_tx_b, _rx_b, _) = join(&handle, "b").await;

    let (_tx_c, mut rx_c, outcome) = join(&handle, "c").await;
    assert_eq!(outcome, JoinOutcome::Full);
    assert!(matches!(recv(&mut rx_c).await, ServerMsg::Full));

    // No record was created for the rejected identifier.
    match next_state(&mut rx_a).await {
        ServerMsg::State { players, .. } => {
            assert_eq!(players.len(), 2);
            assert!(!players.contains_key("c"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn reconnect_with_same_identifier_reuses_the_player_record() {
    let handle = spawn_room(GameMode::Shooter);

    let (_tx_a, _rx_a, _) = join(&handle, "a").await;
    let (tx_b, _rx_b, _) = join(&handle, "b").await;

    handle
        .cmd_tx
        .send(RoomCmd::Disconnect {
            client_id: "b".to_string(),
            transport: tx_b,
        })
        .await
        .unwrap();

    // The identifier is still known, so the rejoin is not a capacity reject.
    let (_tx_b2, mut rx_b2, outcome) = join(&handle, "b").await;
    assert_eq!(outcome, JoinOutcome::Joined);
    match recv(&mut rx_b2).await {
        ServerMsg::Joined { state, .. } => {
            assert_eq!(state.players.len(), 2);
            assert!(state.players["b"].connected);
        }
        other => panic!("expected joined, got {other:?}"),
    }
}

#[tokio::test]
async fn rematch_resets_state_and_broadcasts() {
    let handle = spawn_room(GameMode::Block);

    let (_tx_a, mut rx_a, _) = join(&handle, "a").await;
    let (_tx_b, _rx_b, _) = join(&handle, "b").await;

    handle
        .cmd_tx
        .send(RoomCmd::Rematch {
            client_id: "a".to_string(),
        })
        .await
        .unwrap();

    loop {
        match recv(&mut rx_a).await {
            ServerMsg::Rematch { state } => {
                assert_eq!(state.tick, 0);
                assert!(state.running, "both transports live after rematch");
                assert!(state.grid.is_some());
                break;
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn registry_mode_is_first_writer_wins() {
    let registry = RoomRegistry::with_grace_period(Duration::from_millis(200));

    let first = registry.get_or_create("r1", GameMode::Block);
    let second = registry.get_or_create("r1", GameMode::Shooter);

    assert_eq!(first.mode, GameMode::Block);
    assert_eq!(second.mode, GameMode::Block);
    assert!(first.cmd_tx.same_channel(&second.cmd_tx));

    // The room itself reports the creating mode back on join.
    let (_tx, mut rx, outcome) = join(&second, "a").await;
    assert_eq!(outcome, JoinOutcome::Joined);
    match recv(&mut rx).await {
        ServerMsg::Joined { mode, .. } => assert_eq!(mode, GameMode::Block),
        other => panic!("expected joined, got {other:?}"),
    }
}

#[tokio::test]
async fn registry_remove_refuses_while_transports_are_live() {
    let registry = RoomRegistry::with_grace_period(Duration::from_secs(60));

    let handle = registry.get_or_create("r1", GameMode::Shooter);
    let (tx, _rx, _) = join(&handle, "a").await;
    assert!(!registry.remove("r1"));
    assert_eq!(registry.active_rooms(), 1);

    handle
        .cmd_tx
        .send(RoomCmd::Disconnect {
            client_id: "a".to_string(),
            transport: tx,
        })
        .await
        .unwrap();

    // Transport bookkeeping happens on the room task; give it a beat.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.remove("r1"));
    assert_eq!(registry.active_rooms(), 0);
}

#[tokio::test]
async fn empty_room_retires_after_the_grace_period() {
    let registry = RoomRegistry::with_grace_period(Duration::from_millis(200));

    let handle = registry.get_or_create("r1", GameMode::Shooter);
    assert_eq!(registry.active_rooms(), 1);

    // Nobody ever joins; the room should retire and deregister itself.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(registry.active_rooms(), 0);
    assert!(handle.is_closed());

    // A later join transparently gets a fresh room.
    let replacement = registry.get_or_create("r1", GameMode::Shooter);
    assert!(!replacement.is_closed());
    let (_tx, _rx, outcome) = join(&replacement, "a").await;
    assert_eq!(outcome, JoinOutcome::Joined);
}
