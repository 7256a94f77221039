//! Status notifications: ordering, grace period, raw values, closed links.

use std::sync::Arc;
use std::time::Duration;

use gridlink_core::wire::STATUS_CHAR_UUID;
use gridlink_core::PeerStatus;
use gridlink_services::{Adapter, StatusChannel};

use crate::*;

#[tokio::test]
async fn snapshots_arrive_in_write_order() {
    let (adapter, _peer) = loopback();
    let out = send(&adapter, grid_of_len(500), quick(180)).await.unwrap();
    out.result.unwrap();

    let snapshots: Vec<PeerStatus> = out
        .notifications
        .iter()
        .map(|n| n.as_peer_status().expect("peer pushes status JSON"))
        .collect();
    // One on subscribe, one per write.
    assert_eq!(snapshots.len(), 1 + 5);
    assert_eq!(snapshots[1].expected_bytes, Some(500));
    assert_eq!(snapshots[2].received_bytes, 180);
    assert_eq!(snapshots[3].received_bytes, 360);
    assert!(snapshots[4].ok);
    assert_eq!(snapshots[4].last_bytes, 500);
}

#[tokio::test]
async fn trailing_notification_within_grace_is_delivered() {
    let (adapter, peer) = loopback();
    peer.trailing_notification(Duration::from_millis(50), "grid applied")
        .await;

    let config = SessionConfig {
        max_chunk: 180,
        grace: Duration::from_millis(400),
    };
    let out = send(&adapter, grid_of_len(500), config).await.unwrap();
    out.result.unwrap();

    let last = out.notifications.last().expect("notifications delivered");
    assert_eq!(last, &StatusNotification::Text("grid applied".into()));
    assert_eq!(peer.unsubscribes(), 1);
}

#[tokio::test]
async fn raw_notification_is_not_an_error() {
    let (adapter, peer) = loopback();
    peer.trailing_notification(Duration::from_millis(10), vec![0xff, 0x00, 0xfe])
        .await;

    let config = SessionConfig {
        max_chunk: 180,
        grace: Duration::from_millis(200),
    };
    let out = send(&adapter, grid_of_len(20), config).await.unwrap();
    out.result.unwrap();

    let raw = out
        .notifications
        .iter()
        .find(|n| matches!(n, StatusNotification::Raw(_)))
        .expect("raw notification delivered");
    assert_eq!(raw.to_string(), "raw bytes: ff00fe");
}

#[tokio::test]
async fn subscribe_on_dropped_link_is_channel_closed() {
    let (adapter, peer) = loopback();
    let link: Arc<dyn gridlink_services::Link> = Arc::from(adapter.connect(PEER_ADDRESS).await.unwrap());
    peer.drop_link().await;

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let err = StatusChannel::subscribe(link, tx).await.err().unwrap();
    assert!(matches!(err, TransferError::ChannelClosed));
}

#[tokio::test]
async fn unsubscribe_after_drop_is_channel_closed() {
    let (adapter, peer) = loopback();
    let link: Arc<dyn gridlink_services::Link> = Arc::from(adapter.connect(PEER_ADDRESS).await.unwrap());
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let mut channel = StatusChannel::subscribe(link.clone(), tx).await.unwrap();
    assert!(channel.is_subscribed());

    peer.drop_link().await;
    assert!(matches!(
        channel.unsubscribe().await,
        Err(TransferError::ChannelClosed)
    ));
    assert!(link.unsubscribe(STATUS_CHAR_UUID).await.is_err());
}

#[tokio::test]
async fn second_unsubscribe_is_a_no_op() {
    let (adapter, peer) = loopback();
    let link: Arc<dyn gridlink_services::Link> = Arc::from(adapter.connect(PEER_ADDRESS).await.unwrap());
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let mut channel = StatusChannel::subscribe(link, tx).await.unwrap();

    channel.unsubscribe().await.unwrap();
    channel.unsubscribe().await.unwrap();
    assert!(!channel.is_subscribed());
    assert_eq!(peer.unsubscribes(), 1);
}
