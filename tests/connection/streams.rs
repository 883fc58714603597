//! Stream lifecycle through the connection surface: admission against the
//! peer's concurrency limit, creation by frame reference, removal and
//! user-data failure handling.

use h2_mux::{
    encode_settings_entry, settings_id, ConnectionError, StreamError,
};

use crate::common::{established, frame};

fn settings_frame(id: u16, value: u32) -> Vec<u8> {
    frame(0x4, 0, 0, &encode_settings_entry(id, value))
}

#[test]
fn test_open_stream_respects_peer_concurrency_limit() {
    let (mut conn, mut sink, mut app) = established();
    conn.feed_all(
        &settings_frame(settings_id::MAX_CONCURRENT_STREAMS, 3),
        &mut sink,
        &mut app,
    )
    .unwrap();

    conn.open_stream(1, &mut app).unwrap();
    conn.open_stream(3, &mut app).unwrap();
    assert_eq!(
        conn.open_stream(5, &mut app),
        Err(StreamError::AdmissionRejected)
    );
    assert_eq!(conn.stream_count(), 2);
}

#[test]
fn test_open_stream_is_idempotent() {
    let (mut conn, _sink, mut app) = established();
    app.allocs_left = 1;

    conn.open_stream(1, &mut app).unwrap();
    conn.open_stream(1, &mut app).unwrap();
    assert_eq!(conn.stream_count(), 1);
}

#[test]
fn test_frame_reference_creates_stream() {
    let (mut conn, mut sink, mut app) = established();
    assert_eq!(conn.stream_count(), 0);

    // PRIORITY on an unseen stream id
    conn.feed_all(&frame(0x2, 0, 9, &[0, 0, 0, 0, 16]), &mut sink, &mut app)
        .unwrap();

    assert_eq!(conn.stream_count(), 1);
    let s = conn.stream(9).unwrap();
    assert_eq!(s.stream_id, 9);
    assert_eq!(s.tx_credit, 65535);
}

#[test]
fn test_admission_rejection_fails_connection() {
    let (mut conn, mut sink, mut app) = established();
    conn.feed_all(
        &settings_frame(settings_id::MAX_CONCURRENT_STREAMS, 2),
        &mut sink,
        &mut app,
    )
    .unwrap();
    conn.open_stream(1, &mut app).unwrap();

    let err = conn
        .feed_all(&frame(0x2, 0, 3, &[0, 0, 0, 0, 16]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Stream(StreamError::AdmissionRejected)
    ));
}

#[test]
fn test_user_data_failure_fails_connection_and_notifies() {
    let (mut conn, mut sink, mut app) = established();
    app.allocs_left = 0;

    let err = conn
        .feed_all(&frame(0x1, 0x5, 1, &[0x82]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Stream(StreamError::ResourceExhaustion)
    ));
    assert_eq!(app.destroyed, vec![1]);
    assert_eq!(conn.stream_count(), 0);
}

#[test]
fn test_remove_stream() {
    let (mut conn, _sink, mut app) = established();
    conn.open_stream(1, &mut app).unwrap();
    conn.open_stream(3, &mut app).unwrap();

    conn.remove_stream(1).unwrap();
    assert!(conn.stream(1).is_none());
    assert!(conn.stream(3).is_some());
    assert_eq!(conn.stream_count(), 1);

    assert_eq!(conn.remove_stream(1), Err(StreamError::NotFound));
}
