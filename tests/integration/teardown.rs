//! Terminal states and the exactly-once teardown guarantee.

use gridlink_core::wire::Frame;
use gridlink_services::{LinkError, SessionState};

use crate::*;

fn assert_torn_down_once(peer: &LoopbackPeer) {
    assert_eq!(peer.subscribes(), 1);
    assert_eq!(peer.unsubscribes(), 1, "unsubscribe count");
    assert_eq!(peer.closes(), 1, "close count");
    assert!(!peer.is_connected());
}

#[tokio::test]
async fn completed_session_tears_down_once() {
    let (adapter, peer) = loopback();
    let out = send(&adapter, grid_of_len(500), quick(180)).await.unwrap();
    assert!(out.result.is_ok());
    assert_eq!(out.session.state(), SessionState::Completed);
    assert_torn_down_once(&peer);
}

#[tokio::test]
async fn failed_chunk_stops_the_transfer() {
    // 1000 bytes at 180 per chunk: writes are Start, 6 chunks, End.
    for k in 0..6 {
        let (adapter, peer) = loopback();
        let write_index = k + 1;
        peer.fail_on_write(write_index).await;

        let out = send(&adapter, grid_of_len(1000), quick(180)).await.unwrap();
        match out.result {
            Err(TransferError::WriteFailure { frame, source }) => {
                assert_eq!(frame, write_index);
                assert!(matches!(source, LinkError::Rejected(_)));
            }
            other => panic!("chunk {k}: expected write failure, got {other:?}"),
        }
        assert_eq!(out.session.state(), SessionState::Failed);
        assert_eq!(out.session.offset(), k * 180);

        let writes = peer.writes().await;
        assert_eq!(writes.len(), write_index + 1, "no write after the failed chunk");
        assert!(writes
            .iter()
            .all(|w| Frame::decode(w).map_or(true, |f| f != Frame::End)));
        assert_torn_down_once(&peer);
    }
}

#[tokio::test]
async fn failed_inline_write_fails_session() {
    let (adapter, peer) = loopback();
    peer.fail_on_write(0).await;

    let out = send(&adapter, grid_of_len(40), quick(180)).await.unwrap();
    assert!(matches!(
        out.result,
        Err(TransferError::WriteFailure { frame: 0, .. })
    ));
    assert_eq!(out.session.state(), SessionState::Failed);
    assert_torn_down_once(&peer);
}

#[tokio::test]
async fn cancelled_session_sends_cancel_and_tears_down_once() {
    let (adapter, peer) = loopback();
    let session = TransferSession::new(PEER_ADDRESS, grid_of_len(500), quick(180));
    session.cancel_handle().cancel();

    let out = run(&adapter, session).await;
    assert!(matches!(
        out.result,
        Err(TransferError::Cancelled { sent: 0, total: 500 })
    ));
    assert_eq!(out.session.state(), SessionState::Cancelled);

    let frames: Vec<Frame> = peer
        .writes()
        .await
        .iter()
        .map(|w| Frame::decode(w).unwrap())
        .collect();
    assert_eq!(frames, vec![Frame::Start { total_length: 500 }, Frame::Cancel]);
    assert_eq!(
        peer.status().await.last_error.as_deref(),
        Some("transfer cancelled by client")
    );
    assert_torn_down_once(&peer);
}

#[tokio::test]
async fn peer_rejection_fails_session() {
    // Over the peer's size limit: the Start frame itself is refused.
    let peer = LoopbackPeer::new(PEER_ADDRESS, Some(PEER_NAME), 100);
    let adapter = LoopbackAdapter::new(vec![peer.clone()]);

    let out = send(&adapter, grid_of_len(500), quick(180)).await.unwrap();
    assert!(matches!(
        out.result,
        Err(TransferError::WriteFailure { frame: 0, .. })
    ));
    assert_eq!(peer.writes().await.len(), 1);
    assert_torn_down_once(&peer);
}

#[tokio::test]
async fn unreachable_address_fails_without_teardown() {
    let (adapter, peer) = loopback();
    let session = TransferSession::new("DE:AD:00:00:00:00", grid_of_len(10), quick(180));

    let out = run(&adapter, session).await;
    assert!(matches!(out.result, Err(TransferError::Connection(_))));
    assert_eq!(out.session.state(), SessionState::Failed);
    assert_eq!(peer.connects(), 0);
    assert_eq!(peer.unsubscribes(), 0);
    assert_eq!(peer.closes(), 0);
}

#[tokio::test]
async fn link_lost_mid_transfer_fails_and_closes_once() {
    // Write k is confirmed, then the link goes away before write k + 1.
    for k in 1..6 {
        let (adapter, peer) = loopback();
        peer.drop_after_write(k).await;

        let out = send(&adapter, grid_of_len(1000), quick(180)).await.unwrap();
        match out.result {
            Err(TransferError::WriteFailure { frame, source }) => {
                assert_eq!(frame, k + 1);
                assert!(matches!(source, LinkError::NotConnected), "{source}");
            }
            other => panic!("drop after {k}: expected write failure, got {other:?}"),
        }
        assert_eq!(out.session.state(), SessionState::Failed);
        assert_eq!(peer.writes().await.len(), k + 1, "no write after the lost link");
        assert_eq!(peer.subscribes(), 1);
        // The status channel sees the dead link and skips the unsubscribe.
        assert_eq!(peer.unsubscribes(), 0);
        assert_eq!(peer.closes(), 1, "close count");
        assert!(!peer.is_connected());
    }
}

#[tokio::test]
async fn dropped_session_still_tears_down() {
    let (adapter, peer) = loopback();
    let config = SessionConfig {
        max_chunk: 180,
        grace: Duration::from_secs(5),
    };
    let mut session = TransferSession::new(PEER_ADDRESS, grid_of_len(500), config);
    let (tx, _rx) = mpsc::unbounded_channel();

    let run = session.run(&adapter, tx);
    let timed_out = tokio::time::timeout(Duration::from_millis(200), run).await;
    assert!(timed_out.is_err(), "run should still be in its grace period");
    assert_eq!(peer.closes(), 0);

    for _ in 0..100 {
        if peer.closes() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_torn_down_once(&peer);
}
