//! Properties 1-3 (spec.md §8): membership accounting, no duplicate peers per
//! user, and host uniqueness — exercised directly against `RoomRegistry` so
//! these invariants are checked without the HTTP/WS layer in the loop.
//! Grounded on `vidmesh_session::room::registry`'s own unit tests
//! (`start_then_join_accumulates_participants`, `join_respects_capacity`).

use std::sync::Arc;

use vidmesh_config::ReapSettings;
use vidmesh_session::call_store::{CallStore, InMemoryCallStore};
use vidmesh_session::clock::test_util::FixedClock;
use vidmesh_session::room::{
    ParticipantRole, RoomRegistry, RoomSettings, SocketId, UserSnapshot,
};

fn registry() -> RoomRegistry {
    let call_store: Arc<dyn CallStore> = Arc::new(InMemoryCallStore::new());
    let clock = FixedClock::new(chrono::Utc::now());
    RoomRegistry::new(call_store, clock, ReapSettings::default())
}

fn user(id: &str, name: &str) -> UserSnapshot {
    UserSnapshot {
        id: id.into(),
        display_name: name.to_string(),
        email: None,
        avatar_url: None,
    }
}

#[tokio::test]
async fn property1_membership_count_matches_joins_and_leaves() {
    let reg = registry();
    let room_id = "room-p1".into();

    let (host_peer, snap) = reg
        .start_call(
            &room_id,
            user("u-host", "Host"),
            SocketId::new("sock-host"),
            RoomSettings::default(),
        )
        .await
        .unwrap();
    assert_eq!(snap.participants.len(), 1);

    let (p2_peer, snap) = reg
        .join(
            &room_id,
            user("u-2", "Two"),
            SocketId::new("sock-2"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(snap.participants.len(), 2);

    let (_p3_peer, snap) = reg
        .join(
            &room_id,
            user("u-3", "Three"),
            SocketId::new("sock-3"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(snap.participants.len(), 3);

    reg.leave(&room_id, &p2_peer).await.unwrap();
    let snap = reg.room_of(&room_id).await.unwrap();
    assert_eq!(
        snap.participants.iter().filter(|p| p.is_connected).count(),
        2,
        "membership count must drop immediately on a voluntary leave"
    );

    let _ = host_peer;
}

#[tokio::test]
async fn property2_no_duplicate_peers_for_the_same_user_reconnecting() {
    let reg = registry();
    let room_id = "room-p2".into();

    let (_host_peer, _) = reg
        .start_call(
            &room_id,
            user("u-host", "Host"),
            SocketId::new("sock-host"),
            RoomSettings::default(),
        )
        .await
        .unwrap();

    let (first_peer, snap) = reg
        .join(&room_id, user("u-a", "A"), SocketId::new("sock-a1"), None)
        .await
        .unwrap();
    assert_eq!(snap.participants.len(), 2);

    // Same user id reconnecting from a new socket before ever leaving must
    // not create a second participant entry for "A".
    let (second_peer, snap) = reg
        .join(&room_id, user("u-a", "A"), SocketId::new("sock-a2"), None)
        .await
        .unwrap();
    assert_eq!(
        snap.participants.len(),
        2,
        "a second join for the same user_id must not add a duplicate participant"
    );
    assert_eq!(
        first_peer, second_peer,
        "rejoining the same user_id must resolve to the same peer identity"
    );
}

#[tokio::test]
async fn property3_exactly_one_host_and_it_never_changes_on_its_own() {
    let reg = registry();
    let room_id = "room-p3".into();

    let (host_peer, snap) = reg
        .start_call(
            &room_id,
            user("u-host", "Host"),
            SocketId::new("sock-host"),
            RoomSettings::default(),
        )
        .await
        .unwrap();
    let hosts: Vec<_> = snap
        .participants
        .iter()
        .filter(|p| p.role == ParticipantRole::Host)
        .collect();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].peer_id, host_peer);

    let (p2_peer, snap) = reg
        .join(&room_id, user("u-2", "Two"), SocketId::new("sock-2"), None)
        .await
        .unwrap();
    let hosts: Vec<_> = snap
        .participants
        .iter()
        .filter(|p| p.role == ParticipantRole::Host)
        .collect();
    assert_eq!(hosts.len(), 1, "a join must never mint a second host");
    assert_eq!(hosts[0].peer_id, host_peer);

    // The host disconnecting does not promote anyone else (no auto-promotion
    // invariant) — the room is simply left without a host until it is reaped
    // or the host reconnects within the grace period.
    reg.handle_disconnect(&room_id, &host_peer).await.unwrap();
    let snap = reg.room_of(&room_id).await.unwrap();
    let hosts: Vec<_> = snap
        .participants
        .iter()
        .filter(|p| p.role == ParticipantRole::Host && p.is_connected)
        .collect();
    assert!(
        hosts.is_empty(),
        "host disconnecting must not silently re-elect a participant as host"
    );

    let _ = p2_peer;
}
