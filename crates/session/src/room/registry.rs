use super::events::{LeaveReason, RoomEvent};
use super::types::{
    CallId, MediaState, MediaStateUpdate, Participant, ParticipantRole, ParticipantSnapshot,
    PeerId, RoomId, RoomSettings, RoomStatus, SocketId, UserId, UserSnapshot,
};
use crate::call_store::{CallStore, ParticipantStatus as StoreParticipantStatus};
use crate::clock::Clock;
use crate::error::{SessionError, SessionResult};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::{broadcast, Mutex};
use vidmesh_config::ReapSettings;

/// Public, wire-safe view of a room returned to whoever just joined it.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub settings: RoomSettings,
    pub self_peer_id: PeerId,
    pub is_host: bool,
    pub participants: Vec<ParticipantSnapshot>,
}

struct RoomInner {
    settings: RoomSettings,
    status: RoomStatus,
    call_id: Option<CallId>,
    /// Immutable for the room's lifetime (invariant R2); there is no
    /// host-reassignment path (SPEC_FULL.md §12, Open Question 2 — the
    /// source had two divergent behaviors here and this spec keeps the
    /// no-auto-promotion one). `None` only in the instant between room
    /// creation and the host's own `start_call` completing.
    host_user_id: Option<UserId>,
    participants: HashMap<PeerId, Participant>,
}

impl RoomInner {
    fn snapshot_participants(&self) -> Vec<ParticipantSnapshot> {
        self.participants.values().map(ParticipantSnapshot::from).collect()
    }

    fn connected_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_connected).count()
    }

    fn find_by_user(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.values().find(|p| &p.user_id == user_id)
    }
}

/// The RoomRegistry: holds room membership in memory, behind one
/// `tokio::sync::Mutex` per room so operations on different rooms never
/// contend, while operations on the same room are linearized (spec.md §5
/// concurrency model). The outer `DashMap` only ever holds the lock long
/// enough to look up or insert an `Arc<Mutex<..>>` — it is never held
/// across an `.await` into call-store I/O.
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, Arc<Mutex<RoomInner>>>>,
    call_store: Arc<dyn CallStore>,
    clock: Arc<dyn Clock>,
    reap: ReapSettings,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomRegistry {
    pub fn new(call_store: Arc<dyn CallStore>, clock: Arc<dyn Clock>, reap: ReapSettings) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            rooms: Arc::new(DashMap::new()),
            call_store,
            clock,
            reap,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RoomEvent) {
        // A lagging/absent subscriber must never fail a room operation.
        let _ = self.events.send(event);
    }

    fn get_or_insert_room(&self, room_id: &RoomId, settings: RoomSettings) -> Arc<Mutex<RoomInner>> {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RoomInner {
                    settings,
                    status: RoomStatus::Waiting,
                    call_id: None,
                    host_user_id: None,
                    participants: HashMap::new(),
                }))
            })
            .clone()
    }

    fn get_room(&self, room_id: &RoomId) -> Option<Arc<Mutex<RoomInner>>> {
        self.rooms.get(room_id).map(|entry| entry.clone())
    }

    /// Starts (or rejoins) a call as host. Idempotent: a host reconnecting
    /// to an already-live room rejoins it rather than erroring, mirroring
    /// `ConferenceDao::join_participant`'s active/rejoining/new-join split.
    pub async fn start_call(
        &self,
        room_id: &RoomId,
        host: UserSnapshot,
        socket_id: SocketId,
        settings: RoomSettings,
    ) -> SessionResult<(PeerId, RoomSnapshot)> {
        let room = self.get_or_insert_room(room_id, settings);
        let mut inner = room.lock().await;

        if inner.status == RoomStatus::Ended {
            return Err(SessionError::Ended);
        }

        let call_record = self
            .call_store
            .start(room_id, &host.id)
            .await
            .map_err(SessionError::internal)?;
        inner.call_id = Some(call_record.call_id.clone());
        inner.status = RoomStatus::Live;
        if inner.host_user_id.is_none() {
            inner.host_user_id = Some(host.id.clone());
        }

        let peer_id = self.upsert_participant(
            &mut inner,
            host.clone(),
            socket_id,
            ParticipantRole::Host,
        );

        self.call_store
            .add_participant(&call_record.call_id, &host.id, &host.display_name)
            .await
            .map_err(SessionError::internal)?;

        let snapshot = RoomSnapshot {
            room_id: room_id.clone(),
            status: inner.status.clone(),
            settings: inner.settings.clone(),
            self_peer_id: peer_id.clone(),
            is_host: inner.host_user_id.as_ref() == Some(&host.id),
            participants: inner.snapshot_participants(),
        };
        let joined = inner
            .participants
            .get(&peer_id)
            .map(ParticipantSnapshot::from)
            .expect("participant was just inserted");
        drop(inner);

        self.emit(RoomEvent::UserJoined {
            room_id: room_id.clone(),
            participant: joined,
        });

        Ok((peer_id, snapshot))
    }

    /// Backs `join` for a room this process doesn't currently hold in
    /// memory (spec.md §4.1: "fetches the call record via C2 ... RoomNotFound
    /// if absent"). A call can be in the store with no live room here either
    /// because it was never started in this process or because every
    /// participant disconnected long enough ago that the reap swept the
    /// empty room (invariant R3) without the host ever ending the call.
    /// `RoomSettings` (passcode/capacity/invite list) is a `room:create`-time
    /// in-memory-only concept this store never persists (SPEC_FULL.md §12,
    /// Open Question 4), so a room recreated this way opens with default
    /// settings rather than guessing at ones it can't recover.
    async fn room_from_call_record(&self, room_id: &RoomId) -> SessionResult<Arc<Mutex<RoomInner>>> {
        let record = self
            .call_store
            .get_by_room_id(room_id)
            .await
            .map_err(SessionError::internal)?
            .ok_or(SessionError::RoomNotFound)?;

        if record.ended_at.is_some() {
            return Err(SessionError::Ended);
        }

        let room = self.get_or_insert_room(room_id, RoomSettings::default());
        {
            let mut inner = room.lock().await;
            if inner.host_user_id.is_none() {
                inner.host_user_id = Some(record.host_user_id.clone());
            }
            if inner.call_id.is_none() {
                inner.call_id = Some(record.call_id.clone());
            }
            if inner.status == RoomStatus::Waiting {
                inner.status = RoomStatus::Live;
            }
        }
        Ok(room)
    }

    /// Joins an existing room. Errors with `RoomNotFound` if the room was
    /// never started, `Ended` if the call is over, `InvalidPasscode` or
    /// `NotInvited` per access-control settings, `RoomFull` past capacity.
    pub async fn join(
        &self,
        room_id: &RoomId,
        user: UserSnapshot,
        socket_id: SocketId,
        passcode: Option<&str>,
    ) -> SessionResult<(PeerId, RoomSnapshot)> {
        let room = match self.get_room(room_id) {
            Some(room) => room,
            None => self.room_from_call_record(room_id).await?,
        };
        let mut inner = room.lock().await;

        if inner.status == RoomStatus::Ended {
            return Err(SessionError::Ended);
        }

        if let Some(expected) = inner.settings.passcode.clone() {
            let supplied = passcode.unwrap_or("");
            if !constant_time_eq(&expected, supplied) {
                return Err(SessionError::InvalidPasscode);
            }
        }

        if inner.settings.invited_only
            && !user.id.is_guest()
            && !inner.settings.invited_user_ids.iter().any(|u| u == &user.id)
        {
            return Err(SessionError::NotInvited);
        }

        let is_reconnect = inner.find_by_user(&user.id).is_some();
        if !is_reconnect && inner.connected_count() >= inner.settings.max_participants as usize {
            return Err(SessionError::RoomFull);
        }

        let role = if user.id.is_guest() {
            ParticipantRole::Guest
        } else {
            ParticipantRole::Participant
        };
        let peer_id = self.upsert_participant(&mut inner, user.clone(), socket_id, role);

        // Invariant P3: guest transitions never call the CallStore.
        if !user.id.is_guest() {
            if let Some(call_id) = inner.call_id.clone() {
                self.call_store
                    .add_participant(&call_id, &user.id, &user.display_name)
                    .await
                    .map_err(SessionError::internal)?;
            }
        }

        let snapshot = RoomSnapshot {
            room_id: room_id.clone(),
            status: inner.status.clone(),
            settings: inner.settings.clone(),
            self_peer_id: peer_id.clone(),
            is_host: inner.host_user_id.as_ref() == Some(&user.id),
            participants: inner.snapshot_participants(),
        };
        let joined = inner
            .participants
            .get(&peer_id)
            .map(ParticipantSnapshot::from)
            .expect("participant was just inserted");
        drop(inner);

        self.emit(RoomEvent::UserJoined {
            room_id: room_id.clone(),
            participant: joined,
        });

        Ok((peer_id, snapshot))
    }

    /// Inserts a brand new participant, or reactivates one reconnecting
    /// under the same `user_id` while keeping its original `peer_id`
    /// (invariant P2).
    fn upsert_participant(
        &self,
        inner: &mut RoomInner,
        user: UserSnapshot,
        socket_id: SocketId,
        role: ParticipantRole,
    ) -> PeerId {
        if let Some(existing) = inner.find_by_user(&user.id) {
            let peer_id = existing.peer_id.clone();
            let epoch = existing.disconnect_epoch;
            let p = inner.participants.get_mut(&peer_id).unwrap();
            p.socket_id = socket_id;
            p.is_connected = true;
            p.disconnect_epoch = epoch;
            return peer_id;
        }

        let peer_id = PeerId::generate();
        inner.participants.insert(
            peer_id.clone(),
            Participant {
                peer_id: peer_id.clone(),
                user_id: user.id.clone(),
                socket_id,
                user,
                role,
                joined_at: self.clock.now(),
                left_at: None,
                is_connected: true,
                media_state: MediaState::default(),
                disconnect_epoch: 0,
            },
        );
        peer_id
    }

    pub async fn update_media_state(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        update: MediaStateUpdate,
    ) -> SessionResult<MediaState> {
        let room = self.get_room(room_id).ok_or(SessionError::RoomNotFound)?;
        let mut inner = room.lock().await;
        let participant = inner
            .participants
            .get_mut(peer_id)
            .ok_or(SessionError::PeerUnreachable)?;
        participant.media_state.apply(&update);
        let media_state = participant.media_state;
        let user_id = participant.user_id.clone();
        drop(inner);

        self.emit(RoomEvent::MediaStateChanged {
            room_id: room_id.clone(),
            peer_id: peer_id.clone(),
            user_id,
            media_state,
        });
        Ok(media_state)
    }

    /// Voluntary leave. Spec.md §4.1 declares `handleDisconnect` "equivalent
    /// to leave with a 'socket drop' reason" — both mark the participant
    /// disconnected, emit `UserLeft` immediately, and schedule the same
    /// grace-period reap rather than evicting on the spot, so a client that
    /// calls `room:leave` then reconnects within the grace period still
    /// keeps its `peerId` like any other reconnect. Idempotent: leaving an
    /// already-disconnected participant is a no-op (spec.md §4.1).
    pub async fn leave(&self, room_id: &RoomId, peer_id: &PeerId) -> SessionResult<()> {
        self.disconnect(room_id, peer_id, LeaveReason::Voluntary).await
    }

    /// Called by the relay on transport close; see `leave` above.
    pub async fn handle_disconnect(&self, room_id: &RoomId, peer_id: &PeerId) -> SessionResult<()> {
        self.disconnect(room_id, peer_id, LeaveReason::Disconnected).await
    }

    async fn disconnect(&self, room_id: &RoomId, peer_id: &PeerId, reason: LeaveReason) -> SessionResult<()> {
        let room = self.get_room(room_id).ok_or(SessionError::RoomNotFound)?;
        let (user_id, call_id, epoch) = {
            let mut inner = room.lock().await;
            let Some(p) = inner.participants.get_mut(peer_id) else {
                return Ok(());
            };
            if !p.is_connected {
                return Ok(());
            }
            p.is_connected = false;
            p.left_at = Some(self.clock.now());
            p.disconnect_epoch += 1;
            (p.user_id.clone(), inner.call_id.clone(), p.disconnect_epoch)
        };

        // Invariant P3: guest transitions never call the CallStore.
        if !user_id.is_guest() {
            if let Some(call_id) = call_id {
                let _ = self
                    .call_store
                    .update_participant_status(&call_id, &user_id, StoreParticipantStatus::Left, self.clock.now())
                    .await;
            }
        }

        self.emit(RoomEvent::UserLeft {
            room_id: room_id.clone(),
            peer_id: peer_id.clone(),
            user_id,
            reason,
        });

        self.schedule_reap(room, room_id.clone(), peer_id.clone(), epoch);
        Ok(())
    }

    /// Schedules a grace-period reap (spec.md §4.1, testable property 6).
    /// The timer captures the participant's `disconnect_epoch` at schedule
    /// time; if the participant reconnects before the timer fires, the
    /// epoch no longer matches and the fire becomes a no-op rather than
    /// wrongly evicting the reconnected session. If the room's membership
    /// becomes empty as a result, the room itself is removed (invariant
    /// R3) — the caller (`vidmesh-api`) is responsible for also tearing
    /// down any SFU state for the room via `MediaSession::leave_sfu`.
    fn schedule_reap(&self, room: Arc<Mutex<RoomInner>>, room_id: RoomId, peer_id: PeerId, epoch: u64) {
        let grace = std::time::Duration::from_secs(self.reap.grace_period_secs);
        let rooms = self.rooms.clone();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let now_empty = {
                let mut inner = room.lock().await;
                let Some(participant) = inner.participants.get(&peer_id) else {
                    return;
                };
                if participant.is_connected || participant.disconnect_epoch != epoch {
                    return;
                }
                inner.participants.remove(&peer_id);
                inner.participants.is_empty()
            };
            if now_empty {
                rooms.remove(&room_id);
            }
        });
    }

    /// Ends the call; only the host may do so (spec.md §4.1 `endCall`).
    /// Evicts every in-memory participant immediately rather than waiting on
    /// the TTL sweep — the room entry itself stays put a while longer
    /// (marked `Ended`) purely so a late `join` can report `Ended` instead of
    /// `RoomNotFound`, a choice spec.md's S5 scenario explicitly allows
    /// either way. The caller is responsible for tearing down the room's SFU
    /// state via `MediaSession::close_room`; this registry has no handle on
    /// that collaborator.
    pub async fn end_call(&self, room_id: &RoomId, by_peer_id: &PeerId) -> SessionResult<()> {
        let room = self.get_room(room_id).ok_or(SessionError::RoomNotFound)?;
        let mut inner = room.lock().await;
        let is_host = inner
            .participants
            .get(by_peer_id)
            .map(|p| Some(&p.user_id) == inner.host_user_id.as_ref())
            .unwrap_or(false);
        if !is_host {
            return Err(SessionError::HostRequired);
        }
        inner.status = RoomStatus::Ended;
        inner.participants.clear();
        let call_id = inner.call_id.clone();
        drop(inner);

        if let Some(call_id) = call_id {
            self.call_store
                .end(&call_id, self.clock.now())
                .await
                .map_err(SessionError::internal)?;
        }

        self.emit(RoomEvent::CallEnded {
            room_id: room_id.clone(),
            reason: "Host ended the call".to_string(),
        });

        let empty_ttl = std::time::Duration::from_secs(self.reap.empty_room_ttl_secs);
        let rooms = self.rooms.clone();
        let room_id_owned = room_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(empty_ttl).await;
            rooms.remove(&room_id_owned);
        });

        Ok(())
    }

    pub async fn room_of(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let room = self.get_room(room_id)?;
        let inner = room.lock().await;
        Some(RoomSnapshot {
            room_id: room_id.clone(),
            status: inner.status.clone(),
            settings: inner.settings.clone(),
            self_peer_id: PeerId::new(""),
            is_host: false,
            participants: inner.snapshot_participants(),
        })
    }

    pub async fn participant_of(&self, room_id: &RoomId, peer_id: &PeerId) -> Option<ParticipantSnapshot> {
        let room = self.get_room(room_id)?;
        let inner = room.lock().await;
        inner.participants.get(peer_id).map(ParticipantSnapshot::from)
    }

    /// Enumerates every live room for `admin:get-all-rooms` (spec.md §6.1).
    /// Reuses `room_of`'s snapshot so the passcode/invite list stay off the
    /// wire the same way they do for a regular join.
    pub async fn all_rooms(&self) -> Vec<RoomSnapshot> {
        let room_ids: Vec<RoomId> = self.rooms.iter().map(|e| e.key().clone()).collect();
        let mut out = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            if let Some(snapshot) = self.room_of(&room_id).await {
                out.push(snapshot);
            }
        }
        out
    }

    /// Periodic defense-in-depth sweep (spec.md §4.1): catches participants
    /// whose per-disconnect reap timer never got a chance to run (a spawned
    /// task that was dropped or never polled under load) and rooms left
    /// empty without being cleaned up. Driven by a ticking task in
    /// `vidmesh-api`'s bootstrap, not by this crate directly.
    pub async fn sweep(&self) {
        let grace = chrono::Duration::seconds(self.reap.grace_period_secs as i64);
        let now = self.clock.now();
        let room_ids: Vec<RoomId> = self.rooms.iter().map(|e| e.key().clone()).collect();
        for room_id in room_ids {
            let Some(room) = self.get_room(&room_id) else {
                continue;
            };
            let now_empty = {
                let mut inner = room.lock().await;
                let stale: Vec<PeerId> = inner
                    .participants
                    .values()
                    .filter(|p| !p.is_connected && p.left_at.is_some_and(|left| now - left > grace))
                    .map(|p| p.peer_id.clone())
                    .collect();
                for peer_id in stale {
                    inner.participants.remove(&peer_id);
                }
                inner.participants.is_empty()
            };
            if now_empty {
                self.rooms.remove(&room_id);
            }
        }
    }
}

fn constant_time_eq(expected: &str, supplied: &str) -> bool {
    let expected = expected.as_bytes();
    let supplied = supplied.as_bytes();
    if expected.len() != supplied.len() {
        // Still run a comparison of equal cost to avoid a length-based
        // timing oracle; the result is discarded.
        let _ = expected.ct_eq(expected);
        return false;
    }
    expected.ct_eq(supplied).into()
}
