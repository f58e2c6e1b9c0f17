//! End-to-end scenarios: full engines over loopback UDP.

use fscp_core::{EngineEvent, ForwardingMode, PresentationRejection};
use fscp_integration_tests::*;
use std::time::Duration;

const MAC_A: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01];
const MAC_B: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x02];
const MAC_C: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x03];

/// S1: two trusted nodes exchange hello, presentation and session messages,
/// then tunnel Ethernet frames in both directions.
#[tokio::test]
async fn test_handshake_and_bidirectional_data() {
    let mut a = spawn_node("s1-a", MAC_A, fast_config()).await;
    let mut b = spawn_node("s1-b", MAC_B, fast_config()).await;

    a.engine.introduce_to(b.endpoint).await.unwrap();

    wait_for_session(&mut a.events, b.endpoint).await;
    wait_for_session(&mut b.events, a.endpoint).await;

    // A -> B.
    let frame = ethernet_frame(MAC_B, MAC_A, b"from a to b");
    a.tap.inject(frame.clone()).await.unwrap();
    let received = expect_tap_frame(&mut b.tap, "frame on b").await;
    assert_eq!(received, frame);

    // B -> A; MAC_A is learned by now, so this is unicast.
    let frame = ethernet_frame(MAC_A, MAC_B, b"from b to a");
    b.tap.inject(frame.clone()).await.unwrap();
    let received = expect_tap_frame(&mut a.tap, "frame on a").await;
    assert_eq!(received, frame);

    a.engine.stop().await;
    b.engine.stop().await;
}

/// S3: a node whose certificate chains to a different CA is rejected at
/// presentation time; no peer record appears and no session forms.
#[tokio::test]
async fn test_untrusted_presentation_rejected() {
    let mut a = spawn_node("s3-a", MAC_A, fast_config()).await;

    // The outsider trusts everyone; nobody trusts the outsider.
    let outsider_ca = fscp_crypto::test_certificates::other_ca();
    let mut outsider_trust = default_trust();
    outsider_trust.add_anchor(outsider_ca.certificate.clone());
    let outsider = spawn_node_with(
        identity_signed_by("s3-outsider", outsider_ca),
        outsider_trust,
        MAC_C,
        fast_config(),
    )
    .await;

    let _ = outsider.engine.introduce_to(a.endpoint).await;

    let event = wait_for_event(&mut a.events, "presentation rejection", |event| {
        matches!(event, EngineEvent::PresentationRejected { .. })
    })
    .await;
    match event {
        EngineEvent::PresentationRejected { endpoint, reason } => {
            assert_eq!(endpoint, outsider.endpoint);
            assert_eq!(reason, PresentationRejection::Untrusted);
        }
        _ => unreachable!(),
    }

    // No peer record, no session.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(a.engine.connected_peers().is_empty());

    a.engine.stop().await;
    outsider.engine.stop().await;
}

/// S4: both sides initiate nearly simultaneously; exactly one session ends
/// up active on both sides and carries data.
#[tokio::test]
async fn test_simultaneous_introduction() {
    let mut a = spawn_node("s4-a", MAC_A, fast_config()).await;
    let mut b = spawn_node("s4-b", MAC_B, fast_config()).await;

    let (ra, rb) = tokio::join!(
        a.engine.introduce_to(b.endpoint),
        b.engine.introduce_to(a.endpoint)
    );
    ra.unwrap();
    rb.unwrap();

    let number_on_a = wait_for_session(&mut a.events, b.endpoint).await;
    let number_on_b = wait_for_session(&mut b.events, a.endpoint).await;
    assert_eq!(number_on_a, number_on_b);

    let frame = ethernet_frame(MAC_B, MAC_A, b"post tie-break");
    a.tap.inject(frame.clone()).await.unwrap();
    assert_eq!(expect_tap_frame(&mut b.tap, "frame on b").await, frame);

    a.engine.stop().await;
    b.engine.stop().await;
}

/// S5: switch learning. A's source MAC is learned at B from tunneled
/// traffic; a later frame to that MAC reaches A and nobody else.
#[tokio::test]
async fn test_switch_learning_unicast() {
    let mut a = spawn_node("s5-a", MAC_A, fast_config()).await;
    let mut b = spawn_node("s5-b", MAC_B, fast_config()).await;
    let mut c = spawn_node("s5-c", MAC_C, fast_config()).await;

    a.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut a.events, b.endpoint).await;
    c.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut c.events, b.endpoint).await;

    // A floods a frame; B learns MAC_A lives behind peer A.
    let hello = ethernet_frame([0xFF; 6], MAC_A, b"announce");
    a.tap.inject(hello).await.unwrap();
    let _ = expect_tap_frame(&mut b.tap, "broadcast on b").await;

    // The broadcast may also reach C (client routing is on); drain it.
    let _ = tokio::time::timeout(Duration::from_millis(500), c.tap.outbound()).await;

    // B sends to MAC_A: unicast to A only.
    let unicast = ethernet_frame(MAC_A, MAC_B, b"directed");
    b.tap.inject(unicast.clone()).await.unwrap();
    assert_eq!(expect_tap_frame(&mut a.tap, "unicast on a").await, unicast);
    expect_tap_silence(&mut c.tap, Duration::from_millis(500)).await;

    a.engine.stop().await;
    b.engine.stop().await;
    c.engine.stop().await;
}

/// S6 (rekey half): a forced renegotiation replaces the session without
/// interrupting the data stream. The exhaustion trigger itself is covered
/// by the peer state machine's unit tests.
#[tokio::test]
async fn test_rekey_without_data_loss() {
    let mut a = spawn_node("s6-a", MAC_A, fast_config()).await;
    let mut b = spawn_node("s6-b", MAC_B, fast_config()).await;

    a.engine.introduce_to(b.endpoint).await.unwrap();
    let first = wait_for_session(&mut a.events, b.endpoint).await;
    wait_for_session(&mut b.events, a.endpoint).await;

    let frame = ethernet_frame(MAC_B, MAC_A, b"before rekey");
    a.tap.inject(frame.clone()).await.unwrap();
    assert_eq!(expect_tap_frame(&mut b.tap, "pre-rekey frame").await, frame);

    a.engine.rekey(b.endpoint).await.unwrap();
    let second = wait_for_session(&mut a.events, b.endpoint).await;
    assert!(second > first);

    let frame = ethernet_frame(MAC_B, MAC_A, b"after rekey");
    a.tap.inject(frame.clone()).await.unwrap();
    assert_eq!(
        expect_tap_frame(&mut b.tap, "post-rekey frame").await,
        frame
    );

    a.engine.stop().await;
    b.engine.stop().await;
}

/// Client routing disabled: two remote peers of the same hub never see each
/// other's frames, broadcast included.
#[tokio::test]
async fn test_client_routing_isolation() {
    let mut hub_config = fast_config();
    hub_config.client_routing_enabled = false;

    let mut a = spawn_node("iso-a", MAC_A, fast_config()).await;
    let mut b = spawn_node("iso-hub", MAC_B, hub_config).await;
    let mut c = spawn_node("iso-c", MAC_C, fast_config()).await;

    a.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut a.events, b.endpoint).await;
    c.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut c.events, b.endpoint).await;

    // A broadcast from A reaches the hub's TAP but never C.
    let frame = ethernet_frame([0xFF; 6], MAC_A, b"isolated broadcast");
    a.tap.inject(frame.clone()).await.unwrap();
    assert_eq!(
        expect_tap_frame(&mut b.tap, "broadcast on hub").await,
        frame
    );
    expect_tap_silence(&mut c.tap, Duration::from_millis(700)).await;

    a.engine.stop().await;
    b.engine.stop().await;
    c.engine.stop().await;
}

/// Router mode: packets follow announced prefixes; unannounced
/// destinations are dropped silently.
#[tokio::test]
async fn test_router_mode_forwarding() {
    let mut config_a = fast_config();
    config_a.forwarding_mode = ForwardingMode::Router;
    let mut config_b = fast_config();
    config_b.forwarding_mode = ForwardingMode::Router;

    let mut a = spawn_node("rt-a", MAC_A, config_a).await;
    let mut b = spawn_node("rt-b", MAC_B, config_b).await;

    a.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut a.events, b.endpoint).await;
    wait_for_session(&mut b.events, a.endpoint).await;

    // A routes 10.2.0.0/16 through B; B serves it locally.
    a.engine
        .set_peer_routes(b.endpoint, vec!["10.2.0.0/16".parse().unwrap()]);
    b.engine
        .set_local_routes(vec!["10.2.0.0/16".parse().unwrap()]);

    let packet = ipv4_packet([10, 1, 0, 1], [10, 2, 0, 42], b"routed payload");
    a.tap.inject(packet.clone()).await.unwrap();
    assert_eq!(expect_tap_frame(&mut b.tap, "routed packet").await, packet);

    // A destination nobody announced is dropped silently.
    let stray = ipv4_packet([10, 1, 0, 1], [203, 0, 113, 9], b"stray");
    a.tap.inject(stray).await.unwrap();
    expect_tap_silence(&mut b.tap, Duration::from_millis(500)).await;

    a.engine.stop().await;
    b.engine.stop().await;
}

/// Dynamic contact exchange: a node discovers a wanted fingerprint through a
/// common peer and introduces itself automatically.
#[tokio::test]
async fn test_contact_exchange_discovery() {
    let mut b = spawn_node("ct-hub", MAC_B, fast_config()).await;
    let mut c = spawn_node("ct-c", MAC_C, fast_config()).await;

    // A wants to find C by fingerprint but only knows the hub.
    c.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut c.events, b.endpoint).await;

    let mut config_a = fast_config();
    config_a.contact_fingerprints = vec![c.fingerprint];
    let mut a = spawn_node("ct-a", MAC_A, config_a).await;

    a.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut a.events, b.endpoint).await;

    // The periodic contact round asks the hub, learns C's endpoint and
    // introduces A to C.
    let learned = wait_for_event(&mut a.events, "contact hint", |event| {
        matches!(event, EngineEvent::ContactLearned { fingerprint, .. } if *fingerprint == c.fingerprint)
    })
    .await;
    match learned {
        EngineEvent::ContactLearned { endpoint, .. } => assert_eq!(endpoint, c.endpoint),
        _ => unreachable!(),
    }

    wait_for_session(&mut a.events, c.endpoint).await;

    a.engine.stop().await;
    b.engine.stop().await;
    c.engine.stop().await;
}

/// Keep-alives keep an idle session alive past the idle timeout.
#[tokio::test]
async fn test_keepalive_sustains_idle_session() {
    let mut config = fast_config();
    config.session_timeout = Duration::from_secs(2);
    config.keepalive_period = Duration::from_millis(300);

    let mut a = spawn_node("ka-a", MAC_A, config.clone()).await;
    let mut b = spawn_node("ka-b", MAC_B, config).await;

    a.engine.introduce_to(b.endpoint).await.unwrap();
    wait_for_session(&mut a.events, b.endpoint).await;
    wait_for_session(&mut b.events, a.endpoint).await;

    // No user traffic for twice the idle timeout.
    tokio::time::sleep(Duration::from_secs(4)).await;

    // The session is still there and still carries data.
    let frame = ethernet_frame(MAC_B, MAC_A, b"still alive");
    a.tap.inject(frame.clone()).await.unwrap();
    assert_eq!(
        expect_tap_frame(&mut b.tap, "post-idle frame").await,
        frame
    );

    a.engine.stop().await;
    b.engine.stop().await;
}
