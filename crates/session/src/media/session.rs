use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use mediasoup::prelude::*;
use mediasoup::webrtc_transport::{
    WebRtcTransportListenInfos, WebRtcTransportOptions, WebRtcTransportRemoteParameters,
};
use tokio::sync::Mutex;
use vidmesh_config::MediasoupSettings;

use super::codecs::media_codecs;
use super::signaling::ProducerSource;
use super::worker_pool::WorkerPool;
use crate::error::{SessionError, SessionResult};
use crate::room::{PeerId, RoomId};

/// `createTransport`'s `direction` parameter (spec.md §4.3, §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDirection {
    Send,
    Recv,
}

struct ProducerEntry {
    producer: Producer,
    source: ProducerSource,
}

/// Per-peer mediasoup state: at most one transport per direction (the
/// teacher's fixed send/recv split), plus whatever this peer is producing
/// and consuming. `last_created` backs `connectTransport`'s "most recently
/// created transport belonging to the caller in the implied direction"
/// contract (spec.md §4.3): the wire message carries only DTLS parameters,
/// no transport id, so the transport a peer most recently asked to create
/// is the one a subsequent connect applies to (SPEC_FULL.md §12 — resolved
/// the same way the spec itself resolves `connectTransport`'s ambiguity).
/// `connected_transports` makes a repeated connect idempotent rather than
/// relying on the worker's own tolerance (SPEC_FULL.md §11).
struct SfuPeer {
    send_transport: Option<WebRtcTransport>,
    recv_transport: Option<WebRtcTransport>,
    last_created: Option<TransportId>,
    connected_transports: std::collections::HashSet<TransportId>,
    producers: Vec<ProducerEntry>,
    consumers: HashMap<ConsumerId, Consumer>,
}

impl SfuPeer {
    fn new() -> Self {
        Self {
            send_transport: None,
            recv_transport: None,
            last_created: None,
            connected_transports: std::collections::HashSet::new(),
            producers: Vec::new(),
            consumers: HashMap::new(),
        }
    }

    fn transport_for(&self, direction: TransportDirection) -> Option<&WebRtcTransport> {
        match direction {
            TransportDirection::Send => self.send_transport.as_ref(),
            TransportDirection::Recv => self.recv_transport.as_ref(),
        }
    }

    fn transport_by_id(&self, id: TransportId) -> Option<&WebRtcTransport> {
        self.send_transport
            .as_ref()
            .filter(|t| t.id() == id)
            .or_else(|| self.recv_transport.as_ref().filter(|t| t.id() == id))
    }
}

struct MediaRoom {
    router: Router,
    peers: DashMap<PeerId, Mutex<SfuPeer>>,
}

/// C5 MediaSession: the mediasoup-facing half of the system. One router per
/// room, grounded on the teacher's `RoomManager`
/// (`services/src/media/room_manager.rs`), generalized from `ObjectId`-keyed
/// rooms/connections to the opaque `RoomId`/`PeerId` newtypes this crate
/// uses everywhere else.
pub struct MediaSession {
    rooms: DashMap<RoomId, MediaRoom>,
    worker_pool: Arc<WorkerPool>,
    listen_ip: IpAddr,
    announced_ip: Option<IpAddr>,
}

impl MediaSession {
    pub fn new(worker_pool: Arc<WorkerPool>, settings: &MediasoupSettings) -> Self {
        let listen_ip = IpAddr::from_str(&settings.listen_ip).unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let announced_ip = IpAddr::from_str(&settings.announced_ip).ok();
        Self {
            rooms: DashMap::new(),
            worker_pool,
            listen_ip,
            announced_ip,
        }
    }

    async fn get_or_create_room(&self, room_id: &RoomId) -> SessionResult<RtpCapabilities> {
        if let Some(entry) = self.rooms.get(room_id) {
            return Ok(entry.router.rtp_capabilities().clone());
        }
        let worker = self.worker_pool.get_worker();
        let router = worker
            .create_router(RouterOptions::new(media_codecs()))
            .await
            .map_err(SessionError::internal)?;
        let capabilities = router.rtp_capabilities().clone();
        self.rooms.entry(room_id.clone()).or_insert(MediaRoom {
            router,
            peers: DashMap::new(),
        });
        Ok(capabilities)
    }

    /// `joinSfu`: ensures the room's router exists and allocates an empty
    /// `SfuPeer` record. Transports are created lazily by `createTransport`
    /// per spec.md §4.3/§6.1's separate `sfu:create-transport` event.
    pub async fn join_sfu(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
    ) -> SessionResult<RtpCapabilities> {
        let router_caps = self.get_or_create_room(room_id).await?;
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        room.peers
            .entry(peer_id.clone())
            .or_insert_with(|| Mutex::new(SfuPeer::new()));
        Ok(router_caps)
    }

    /// `createTransport(socket, direction)`.
    pub async fn create_transport(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        direction: TransportDirection,
    ) -> SessionResult<TransportParams> {
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        let transport = self.create_webrtc_transport(&room.router).await?;
        let params = TransportParams::from(&transport);

        let peer_entry = room.peers.get(peer_id).ok_or(SessionError::PeerUnreachable)?;
        let mut peer = peer_entry.lock().await;
        match direction {
            TransportDirection::Send => peer.send_transport = Some(transport),
            TransportDirection::Recv => peer.recv_transport = Some(transport),
        }
        peer.last_created = Some(params.transport_id);

        Ok(params)
    }

    async fn create_webrtc_transport(&self, router: &Router) -> SessionResult<WebRtcTransport> {
        let announced_address = self.announced_ip.map(|ip| ip.to_string());

        let udp_info = ListenInfo {
            protocol: Protocol::Udp,
            ip: self.listen_ip,
            announced_address: announced_address.clone(),
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };
        let tcp_info = ListenInfo {
            protocol: Protocol::Tcp,
            ip: self.listen_ip,
            announced_address,
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };

        let listen_infos = WebRtcTransportListenInfos::new(udp_info).insert(tcp_info);
        let mut options = WebRtcTransportOptions::new(listen_infos);
        options.enable_udp = true;
        options.enable_tcp = true;
        options.prefer_udp = true;

        router
            .create_webrtc_transport(options)
            .await
            .map_err(SessionError::internal)
    }

    /// `connectTransport`, idempotent against a retried DTLS handshake.
    /// `transport_id` is `None` when the client follows the minimal wire
    /// contract of spec.md §6.1 (`{ dtlsParameters }` only), in which case
    /// the peer's most recently created transport is targeted.
    pub async fn connect_transport(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        transport_id: Option<TransportId>,
        dtls_parameters: DtlsParameters,
    ) -> SessionResult<TransportId> {
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        let peer_entry = room.peers.get(peer_id).ok_or(SessionError::PeerUnreachable)?;
        let mut peer = peer_entry.lock().await;

        let target_id = transport_id
            .or(peer.last_created)
            .ok_or(SessionError::PeerUnreachable)?;

        if peer.connected_transports.contains(&target_id) {
            return Ok(target_id);
        }

        let transport = peer.transport_by_id(target_id).ok_or(SessionError::PeerUnreachable)?;
        transport
            .connect(WebRtcTransportRemoteParameters { dtls_parameters })
            .await
            .map_err(SessionError::internal)?;

        peer.connected_transports.insert(target_id);
        Ok(target_id)
    }

    /// `produce`: always goes out the send transport.
    pub async fn produce(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        source: ProducerSource,
    ) -> SessionResult<ProducerId> {
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        let peer_entry = room.peers.get(peer_id).ok_or(SessionError::PeerUnreachable)?;
        let mut peer = peer_entry.lock().await;

        let send_transport = peer
            .transport_for(TransportDirection::Send)
            .ok_or(SessionError::PeerUnreachable)?;
        let producer = send_transport
            .produce(ProducerOptions::new(kind, rtp_parameters))
            .await
            .map_err(SessionError::internal)?;
        let producer_id = producer.id();
        peer.producers.push(ProducerEntry { producer, source });
        Ok(producer_id)
    }

    /// `consume`: always goes out the recv transport, after the router
    /// confirms the subscriber's capabilities can decode this producer.
    pub async fn consume(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> SessionResult<(ConsumerId, MediaKind, RtpParameters)> {
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        if !room.router.can_consume(&producer_id, &rtp_capabilities) {
            return Err(SessionError::Unconsumable);
        }

        let peer_entry = room.peers.get(peer_id).ok_or(SessionError::PeerUnreachable)?;
        let mut peer = peer_entry.lock().await;
        let recv_transport = peer
            .transport_for(TransportDirection::Recv)
            .ok_or(SessionError::PeerUnreachable)?;

        let mut options = ConsumerOptions::new(producer_id, rtp_capabilities);
        options.paused = true;
        let consumer = recv_transport.consume(options).await.map_err(SessionError::internal)?;

        let consumer_id = consumer.id();
        let kind = consumer.kind();
        let rtp_parameters = consumer.rtp_parameters().clone();
        peer.consumers.insert(consumer_id, consumer);

        Ok((consumer_id, kind, rtp_parameters))
    }

    pub async fn resume_consumer(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        consumer_id: ConsumerId,
    ) -> SessionResult<()> {
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        let peer_entry = room.peers.get(peer_id).ok_or(SessionError::PeerUnreachable)?;
        let peer = peer_entry.lock().await;
        let consumer = peer
            .consumers
            .get(&consumer_id)
            .ok_or(SessionError::PeerUnreachable)?;
        consumer.resume().await.map_err(SessionError::internal)
    }

    /// `pauseProducer`. The wire message (spec.md §6.1) carries only a bare
    /// `pause: bool`, no producer id; `producer_id` is `None` in that case
    /// and this targets the peer's most recently created producer, mirroring
    /// `connectTransport`'s "most recent" resolution above.
    pub async fn set_producer_paused(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        producer_id: Option<ProducerId>,
        pause: bool,
    ) -> SessionResult<ProducerId> {
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        let peer_entry = room.peers.get(peer_id).ok_or(SessionError::PeerUnreachable)?;
        let peer = peer_entry.lock().await;
        let entry = match producer_id {
            Some(id) => peer.producers.iter().find(|p| p.producer.id() == id),
            None => peer.producers.last(),
        }
        .ok_or(SessionError::PeerUnreachable)?;

        if pause {
            entry.producer.pause().await.map_err(SessionError::internal)?;
        } else {
            entry.producer.resume().await.map_err(SessionError::internal)?;
        }
        Ok(entry.producer.id())
    }

    pub async fn close_producer(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        producer_id: ProducerId,
    ) -> SessionResult<()> {
        let room = self.rooms.get(room_id).ok_or(SessionError::RoomNotFound)?;
        let peer_entry = room.peers.get(peer_id).ok_or(SessionError::PeerUnreachable)?;
        let mut peer = peer_entry.lock().await;
        peer.producers.retain(|p| p.producer.id() != producer_id);
        Ok(())
    }

    /// Returns every other peer's live producer ids, used to replay current
    /// room state to a peer who just joined the SFU (SPEC_FULL.md §11:
    /// router capability / existing-producer replay on join).
    pub async fn other_producer_ids(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
    ) -> Vec<(PeerId, ProducerId, MediaKind, ProducerSource)> {
        let Some(room) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in room.peers.iter() {
            if entry.key() == peer_id {
                continue;
            }
            let other = entry.value().lock().await;
            for p in &other.producers {
                out.push((entry.key().clone(), p.producer.id(), p.producer.kind(), p.source));
            }
        }
        out
    }

    /// `leaveSfu`: drops this peer's transports, which cascades to close
    /// its producers/consumers on the mediasoup side. Removes the room
    /// entirely once it has no peers left.
    pub async fn leave_sfu(&self, room_id: &RoomId, peer_id: &PeerId) {
        let should_remove_room = if let Some(room) = self.rooms.get(room_id) {
            room.peers.remove(peer_id);
            room.peers.is_empty()
        } else {
            false
        };
        if should_remove_room {
            self.rooms.remove(room_id);
        }
    }

    /// `endCall`'s "closes any associated SFU state" (spec.md §4.1): drops
    /// the whole room in one step, same as `leave_sfu`'s last-peer-out path,
    /// so the router and every remaining peer's transports/producers/
    /// consumers close together instead of waiting for each socket to
    /// disconnect on its own.
    pub async fn close_room(&self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }
}

/// DTLS/ICE handshake material a client needs to drive one transport.
#[derive(Debug, Clone)]
pub struct TransportParams {
    pub transport_id: TransportId,
    pub ice_parameters: mediasoup::data_structures::IceParameters,
    pub ice_candidates: Vec<mediasoup::data_structures::IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

impl From<&WebRtcTransport> for TransportParams {
    fn from(transport: &WebRtcTransport) -> Self {
        Self {
            transport_id: transport.id(),
            ice_parameters: transport.ice_parameters().clone(),
            ice_candidates: transport.ice_candidates().clone(),
            dtls_parameters: transport.dtls_parameters(),
        }
    }
}
