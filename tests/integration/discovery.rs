//! Address resolution against advertising loopback peers.

use std::time::Duration;

use gridlink_services::DiscoveredDevice;

use crate::*;

#[tokio::test]
async fn scan_picks_first_matching_name() {
    let speaker = LoopbackPeer::new("AA:00:00:00:00:01", Some("Speaker"), MAX_BYTES);
    let anonymous = LoopbackPeer::new("AA:00:00:00:00:02", None, MAX_BYTES);
    let robot = LoopbackPeer::new("AA:00:00:00:00:03", Some("TMbot-42"), MAX_BYTES);
    let adapter = LoopbackAdapter::new(vec![speaker, anonymous, robot.clone()]);

    let out = send(&adapter, grid_of_len(30), quick(180)).await.unwrap();
    out.result.unwrap();
    assert_eq!(out.session.address(), "AA:00:00:00:00:03");
    assert_eq!(robot.writes().await.len(), 1);
}

#[tokio::test]
async fn no_matching_device_is_device_not_found() {
    let adapter = LoopbackAdapter::new(vec![LoopbackPeer::new(
        "AA:00:00:00:00:01",
        Some("Speaker"),
        MAX_BYTES,
    )]);
    let resolver = DeviceResolver::new(&adapter, Duration::from_millis(100));

    let err = resolver.resolve("TMbot", None).await.unwrap_err();
    match err {
        TransferError::DeviceNotFound { prefix, timeout } => {
            assert_eq!(prefix, "TMbot");
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected DeviceNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn explicit_address_connects_without_matching_name() {
    let peer = LoopbackPeer::new("AA:00:00:00:00:09", Some("Speaker"), MAX_BYTES);
    let adapter = LoopbackAdapter::new(vec![peer.clone()]);
    let resolver = DeviceResolver::new(&adapter, Duration::from_millis(100));

    let address = resolver
        .resolve("TMbot", Some("AA:00:00:00:00:09"))
        .await
        .unwrap();
    let session = TransferSession::new(address, grid_of_len(30), quick(180));
    run(&adapter, session).await.result.unwrap();
    assert_eq!(peer.connects(), 1);
}

#[test]
fn prefix_match_needs_a_name() {
    assert!(!DiscoveredDevice::new("x", None).name_starts_with("TMbot"));
    assert!(DiscoveredDevice::new("x", Some("TMbot")).name_starts_with("TMbot"));
    assert!(!DiscoveredDevice::new("x", Some("tmbot")).name_starts_with("TMbot"));
}
