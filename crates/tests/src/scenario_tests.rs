//! End-to-end scenarios over the real wire protocol (spec.md §8, "S1"-"S6"),
//! driven through `tokio-tungstenite` against an `AppState` wired with
//! in-memory collaborators — grounded on the teacher's
//! `conference_message_tests.rs::conference_chat_message_ws_broadcast`.

use crate::fixtures::test_app::TestApp;
use std::time::Duration;

#[tokio::test]
async fn s1_host_creates_and_guest_joins_public_room() {
    let app = TestApp::spawn().await;
    let host_token = app.issue_token("user-host-s1", "Host");
    let mut host = app.connect(&host_token).await;

    host.send(
        "room:create",
        serde_json::json!({ "name": "Demo", "is_private": false }),
    )
    .await;
    let created = host.recv().await;
    assert_eq!(created["type"], "room:created");
    assert_eq!(created["data"]["name"], "Demo");
    assert_eq!(created["data"]["is_private"], false);
    let room_id = created["data"]["id"].as_str().unwrap().to_string();

    let guest_token = app.issue_guest_token("Alice");
    let mut guest = app.connect(&guest_token).await;
    guest
        .send("room:join", serde_json::json!({ "room_id": room_id }))
        .await;

    let joined = guest.recv().await;
    assert_eq!(joined["type"], "room:joined");
    assert_eq!(joined["data"]["room_id"], room_id);
    assert_eq!(joined["data"]["is_host"], false);
    let participants = joined["data"]["participants"].as_array().unwrap();
    assert!(participants.iter().any(|p| p["user"]["display_name"] == "Host"));
    assert!(participants.iter().any(|p| p["user"]["display_name"] == "Alice"));

    let user_joined = host.recv().await;
    assert_eq!(user_joined["type"], "room:user-joined");
    assert_eq!(user_joined["data"]["user"]["display_name"], "Alice");

    host.close().await;
    guest.close().await;
}

#[tokio::test]
async fn s2_passcode_required() {
    let app = TestApp::spawn().await;
    let host_token = app.issue_token("user-host-s2", "Host");
    let mut host = app.connect(&host_token).await;

    host.send(
        "room:create",
        serde_json::json!({ "name": "Secure Room", "is_private": true, "passcode": "1234" }),
    )
    .await;
    let created = host.recv().await;
    let room_id = created["data"]["id"].as_str().unwrap().to_string();

    let guest_token = app.issue_guest_token("Bob");
    let mut guest = app.connect(&guest_token).await;

    guest
        .send(
            "room:join",
            serde_json::json!({ "room_id": room_id, "passcode": "0000" }),
        )
        .await;
    let err = guest.recv().await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["data"]["code"], "InvalidPasscode");

    guest
        .send(
            "room:join",
            serde_json::json!({ "room_id": room_id, "passcode": "1234" }),
        )
        .await;
    let joined = guest.recv().await;
    assert_eq!(joined["type"], "room:joined");

    host.close().await;
    guest.close().await;
}

#[tokio::test]
async fn s3_webrtc_relay_reaches_only_the_named_target() {
    let app = TestApp::spawn().await;

    let p1_token = app.issue_token("user-p1-s3", "P1");
    let mut p1 = app.connect(&p1_token).await;
    p1.send(
        "room:create",
        serde_json::json!({ "name": "Relay Room", "is_private": false }),
    )
    .await;
    let created = p1.recv().await;
    let room_id = created["data"]["id"].as_str().unwrap().to_string();

    let p2_token = app.issue_token("user-p2-s3", "P2");
    let mut p2 = app.connect(&p2_token).await;
    p2.send("room:join", serde_json::json!({ "room_id": room_id }))
        .await;
    let joined = p2.recv().await;
    let p2_peer_id = joined["data"]["participants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["user"]["display_name"] == "P2")
        .expect("P2 is present in its own join snapshot")["peer_id"]
        .as_str()
        .unwrap()
        .to_string();
    let _ = p1.recv().await; // P1 sees P2's room:user-joined

    let p3_token = app.issue_token("user-p3-s3", "P3");
    let mut p3 = app.connect(&p3_token).await;
    p3.send("room:join", serde_json::json!({ "room_id": room_id }))
        .await;
    let _ = p3.recv().await; // P3's own room:joined
    let _ = p1.recv().await; // P1 sees P3 join
    let _ = p2.recv().await; // P2 sees P3 join

    p1.send(
        "webrtc:offer",
        serde_json::json!({
            "to": p2_peer_id,
            "offer": { "type": "offer", "sdp": "v=0..." },
        }),
    )
    .await;

    let relayed = p2.recv().await;
    assert_eq!(relayed["type"], "webrtc:offer");
    assert_eq!(relayed["data"]["to"], p2_peer_id);
    assert!(
        relayed["data"]["from"].as_str().unwrap().starts_with("peer_"),
        "the relay must stamp `from` with the server-resolved peer id"
    );

    let nothing = p3
        .try_recv_timeout(Duration::from_millis(300))
        .await;
    assert!(
        nothing.is_none(),
        "a peer not named as `to` must never receive someone else's relay"
    );

    p1.close().await;
    p2.close().await;
    p3.close().await;
}

#[tokio::test]
async fn s4_ice_candidate_to_missing_peer_is_silently_dropped() {
    let app = TestApp::spawn().await;
    let token = app.issue_token("user-p1-s4", "P1");
    let mut p1 = app.connect(&token).await;

    p1.send(
        "room:create",
        serde_json::json!({ "name": "Ice Room", "is_private": false }),
    )
    .await;
    let _created = p1.recv().await;

    p1.send(
        "webrtc:ice-candidate",
        serde_json::json!({
            "to": "peer_GHOST",
            "candidate": { "candidate": "candidate:1 1 UDP 2113937151 10.0.0.1 54321 typ host" },
        }),
    )
    .await;

    let nothing = p1.try_recv_timeout(Duration::from_millis(300)).await;
    assert!(
        nothing.is_none(),
        "ICE candidates addressed to a departed/unknown peer must not produce an error event"
    );

    p1.close().await;
}

#[tokio::test]
async fn s5_host_ends_call_notifies_every_peer() {
    let app = TestApp::spawn().await;
    let host_token = app.issue_token("user-host-s5", "Host");
    let mut host = app.connect(&host_token).await;

    host.send(
        "room:create",
        serde_json::json!({ "name": "End Call Room", "is_private": false }),
    )
    .await;
    let created = host.recv().await;
    let room_id = created["data"]["id"].as_str().unwrap().to_string();

    let guest_token = app.issue_guest_token("Guest");
    let mut guest = app.connect(&guest_token).await;
    guest
        .send("room:join", serde_json::json!({ "room_id": room_id }))
        .await;
    let _joined = guest.recv().await;
    let _ = host.recv().await; // host sees the guest's room:user-joined

    host.send(
        "room:end-call",
        serde_json::json!({ "room_id": room_id }),
    )
    .await;

    let host_ended = host.recv().await;
    assert_eq!(host_ended["type"], "room:call-ended");
    assert_eq!(host_ended["data"]["room_id"], room_id);
    assert_eq!(host_ended["data"]["reason"], "Host ended the call");

    let guest_ended = guest.recv().await;
    assert_eq!(guest_ended["type"], "room:call-ended");
    assert_eq!(guest_ended["data"]["room_id"], room_id);

    // An ended room rejects a later join with its ended status directly,
    // ahead of whatever the reap sweep later does to the room entry itself.
    let late_token = app.issue_token("user-late-s5", "Latecomer");
    let mut late = app.connect(&late_token).await;
    late.send("room:join", serde_json::json!({ "room_id": room_id }))
        .await;
    let err = late.recv().await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["data"]["code"], "Ended");

    host.close().await;
    guest.close().await;
    late.close().await;
}

#[tokio::test]
async fn s6_sfu_producer_fans_out_to_other_peers_only() {
    let app = TestApp::spawn().await;

    let a_token = app.issue_token("user-a-s6", "A");
    let mut a = app.connect(&a_token).await;
    a.send(
        "room:create",
        serde_json::json!({ "name": "SFU Room", "is_private": false }),
    )
    .await;
    let created = a.recv().await;
    let room_id = created["data"]["id"].as_str().unwrap().to_string();

    let b_token = app.issue_token("user-b-s6", "B");
    let mut b = app.connect(&b_token).await;
    b.send("room:join", serde_json::json!({ "room_id": room_id }))
        .await;
    let _ = b.recv().await; // B's own room:joined
    let _ = a.recv().await; // A sees B join

    let c_token = app.issue_token("user-c-s6", "C");
    let mut c = app.connect(&c_token).await;
    c.send("room:join", serde_json::json!({ "room_id": room_id }))
        .await;
    let _ = c.recv().await; // C's own room:joined
    let _ = a.recv().await; // A sees C join
    let _ = b.recv().await; // B sees C join

    for peer in [&mut a, &mut b, &mut c] {
        peer.send(
            "sfu:join-room",
            serde_json::json!({ "room_id": room_id }),
        )
        .await;
        let caps = peer.recv().await;
        assert_eq!(caps["type"], "sfu:router-rtp-capabilities");
    }

    a.send(
        "sfu:create-transport",
        serde_json::json!({ "direction": "send" }),
    )
    .await;
    let transport_created = a.recv().await;
    assert_eq!(transport_created["type"], "sfu:transport-created");

    a.send(
        "sfu:connect-transport",
        serde_json::json!({
            "dtls_parameters": {
                "role": "client",
                "fingerprints": [{
                    "algorithm": "sha-256",
                    "value": "82:5A:68:3D:36:C3:0A:DE:AF:E7:32:43:D2:88:83:57:AC:2D:65:E5:80:C4:B6:FB:AF:1A:A0:21:9F:6D:0C:AD",
                }],
            },
        }),
    )
    .await;
    let connected = a.recv().await;
    assert_eq!(connected["type"], "sfu:transport-connected");

    a.send(
        "sfu:produce",
        serde_json::json!({
            "kind": "video",
            "rtp_parameters": {
                "mid": null,
                "codecs": [{
                    "mimeType": "video/VP8",
                    "payloadType": 101,
                    "clockRate": 90000,
                    "parameters": {},
                    "rtcpFeedback": [
                        { "type": "nack" },
                        { "type": "nack", "parameter": "pli" },
                        { "type": "ccm", "parameter": "fir" },
                        { "type": "goog-remb" },
                        { "type": "transport-cc" },
                    ],
                }],
                "headerExtensions": [],
                "encodings": [{ "ssrc": 22222222 }],
                "rtcp": { "cname": "s6-test-cname", "reducedSize": true },
            },
            "source": "camera",
        }),
    )
    .await;

    let produced = a.recv().await;
    assert_eq!(produced["type"], "sfu:producer-created");
    let producer_id = produced["data"]["id"].as_str().unwrap().to_string();

    let b_notice = b.recv().await;
    assert_eq!(b_notice["type"], "sfu:new-producer");
    assert_eq!(b_notice["data"]["producer_id"], producer_id);
    assert_eq!(b_notice["data"]["kind"], "video");
    assert_eq!(b_notice["data"]["source"], "camera");

    let c_notice = c.recv().await;
    assert_eq!(c_notice["type"], "sfu:new-producer");
    assert_eq!(c_notice["data"]["producer_id"], producer_id);

    let nothing = a.try_recv_timeout(Duration::from_millis(300)).await;
    assert!(
        nothing.is_none(),
        "the producing peer must never receive its own sfu:new-producer notice"
    );

    a.close().await;
    b.close().await;
    c.close().await;
}
