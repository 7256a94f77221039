//! Framing on the wire: inline vs chunked, chunk sizes, determinism.

use gridlink_core::wire::{chunk_count, Frame, Strategy};
use gridlink_services::SessionState;

use crate::*;

#[tokio::test]
async fn small_payload_is_one_raw_write() {
    for len in [2, 3, 50, 179, 180] {
        let (adapter, peer) = loopback();
        let payload = grid_of_len(len);
        let out = send(&adapter, payload.clone(), quick(180)).await.unwrap();

        let report = out.result.unwrap();
        assert_eq!(report.strategy, Strategy::Inline);
        assert_eq!(report.frames_written, 1);

        let writes = peer.writes().await;
        assert_eq!(writes.len(), 1, "len {len}");
        assert_eq!(&writes[0], payload.bytes(), "len {len}: no opcode prefix");
    }
}

#[tokio::test]
async fn large_payload_round_trips_through_chunks() {
    for (len, max_chunk) in [(181, 180), (500, 180), (1000, 64), (2000, 1), (360, 180)] {
        let (adapter, peer) = loopback();
        let payload = grid_of_len(len);
        let out = send(&adapter, payload.clone(), quick(max_chunk)).await.unwrap();
        assert_eq!(out.result.unwrap().bytes_sent, len);

        let writes = peer.writes().await;
        let bodies = chunk_bodies(&writes);
        assert_eq!(bodies.len(), chunk_count(len, max_chunk));
        assert_eq!(bodies.len(), len.div_ceil(max_chunk));
        assert!(bodies.iter().all(|b| b.len() <= max_chunk));

        let joined: Vec<u8> = bodies.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(joined.as_slice(), payload.bytes().as_ref());

        // The peer reassembled the same grid.
        let record = peer.last_record().await.expect("peer stored a record");
        assert_eq!(record.bytes, len as u64);
    }
}

#[tokio::test]
async fn start_frame_carries_total_length() {
    for len in [181, 500, 4096] {
        let (adapter, peer) = loopback();
        send(&adapter, grid_of_len(len), quick(180)).await.unwrap().result.unwrap();

        let writes = peer.writes().await;
        assert_eq!(
            Frame::decode(&writes[0]).unwrap(),
            Frame::Start {
                total_length: len as u32
            }
        );
        assert_eq!(Frame::decode(writes.last().unwrap()).unwrap(), Frame::End);
    }
}

#[tokio::test]
async fn same_payload_same_frames() {
    let payload = grid_of_len(777);

    let (adapter_a, peer_a) = loopback();
    send(&adapter_a, payload.clone(), quick(100)).await.unwrap().result.unwrap();
    let (adapter_b, peer_b) = loopback();
    send(&adapter_b, payload, quick(100)).await.unwrap().result.unwrap();

    assert_eq!(peer_a.writes().await, peer_b.writes().await);
}

#[tokio::test]
async fn three_bytes_go_inline() {
    let (adapter, peer) = loopback();
    let out = send(&adapter, grid_of_len(3), quick(180)).await.unwrap();

    assert_eq!(out.session.strategy(), Strategy::Inline);
    assert_eq!(out.session.state(), SessionState::Completed);
    let writes = peer.writes().await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 3);
}

#[tokio::test]
async fn five_hundred_bytes_in_three_chunks() {
    let (adapter, peer) = loopback();
    let out = send(&adapter, grid_of_len(500), quick(180)).await.unwrap();

    assert_eq!(out.session.strategy(), Strategy::Chunked);
    assert_eq!(out.session.state(), SessionState::Completed);
    let report = out.result.unwrap();
    assert_eq!(report.frames_written, 5);

    let frames: Vec<Frame> = peer
        .writes()
        .await
        .iter()
        .map(|w| Frame::decode(w).unwrap())
        .collect();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0], Frame::Start { total_length: 500 });
    let sizes: Vec<usize> = frames[1..4]
        .iter()
        .map(|f| match f {
            Frame::Chunk(body) => body.len(),
            other => panic!("expected chunk, got {other:?}"),
        })
        .collect();
    assert_eq!(sizes, vec![180, 180, 140]);
    assert_eq!(frames[4], Frame::End);
}

#[tokio::test]
async fn larger_chunk_size_is_accepted_end_to_end() {
    let (adapter, peer) = loopback();
    let payload = grid_of_len(1000);
    let out = send(&adapter, payload.clone(), quick(300)).await.unwrap();

    let report = out.result.unwrap();
    assert_eq!(report.strategy, Strategy::Chunked);
    assert_eq!(report.frames_written, 6);

    let sizes: Vec<usize> = chunk_bodies(&peer.writes().await)
        .iter()
        .map(|b| b.len())
        .collect();
    assert_eq!(sizes, vec![300, 300, 300, 100]);
    let record = peer.last_record().await.expect("peer saved the grid");
    assert_eq!(record.bytes, payload.len() as u64);
}

#[tokio::test]
async fn chunks_beyond_the_peer_limit_are_rejected() {
    let receiver = GridReceiver::new(MAX_BYTES).with_max_chunk(180);
    let peer = LoopbackPeer::with_receiver(PEER_ADDRESS, Some(PEER_NAME), receiver);
    let adapter = LoopbackAdapter::new(vec![peer.clone()]);

    let out = send(&adapter, grid_of_len(1000), quick(300)).await.unwrap();
    match out.result {
        Err(TransferError::WriteFailure { frame, source }) => {
            assert_eq!(frame, 1);
            assert!(source.to_string().contains("invalid write length 300"), "{source}");
        }
        other => panic!("expected write failure, got {other:?}"),
    }
    assert_eq!(out.session.state(), SessionState::Failed);
}

#[tokio::test]
async fn progress_reports_every_confirmed_chunk() {
    let (adapter, _peer) = loopback();
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();
    let session = TransferSession::new(PEER_ADDRESS, grid_of_len(500), quick(180))
        .with_progress(progress_tx);
    run(&adapter, session).await.result.unwrap();

    let mut sent = Vec::new();
    while let Ok(p) = progress_rx.try_recv() {
        assert_eq!(p.total, 500);
        sent.push(p.sent);
    }
    assert_eq!(sent, vec![180, 360, 500]);
}

#[tokio::test]
async fn session_cannot_be_reused() {
    let (adapter, _peer) = loopback();
    let mut out = send(&adapter, grid_of_len(10), quick(180)).await.unwrap();
    out.result.unwrap();

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let err = out.session.run(&adapter, tx).await.unwrap_err();
    assert!(matches!(err, TransferError::SessionReused));
}
