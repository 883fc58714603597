//! Per-frame-type parsing behavior after the handshake.

use h2_mux::{
    encode_settings_entry, settings_id, ConnectionError, PendingAction, SettingsError,
};

use crate::common::{established, frame};

#[test]
fn test_settings_entries_applied_to_peer_table() {
    let (mut conn, mut sink, mut app) = established();

    let mut payload = Vec::new();
    payload.extend_from_slice(&encode_settings_entry(settings_id::MAX_CONCURRENT_STREAMS, 8));
    payload.extend_from_slice(&encode_settings_entry(settings_id::MAX_FRAME_SIZE, 32768));

    conn.feed_all(&frame(0x4, 0, 0, &payload), &mut sink, &mut app)
        .unwrap();

    assert_eq!(conn.peer_settings().get(settings_id::MAX_CONCURRENT_STREAMS), 8);
    assert_eq!(conn.peer_settings().get(settings_id::MAX_FRAME_SIZE), 32768);
}

#[test]
fn test_settings_unknown_identifier_skipped() {
    let (mut conn, mut sink, mut app) = established();

    let before = conn.peer_settings().clone();
    let payload = encode_settings_entry(0x42, 7);
    conn.feed_all(&frame(0x4, 0, 0, &payload), &mut sink, &mut app)
        .unwrap();

    assert_eq!(conn.peer_settings(), &before);
}

#[test]
fn test_settings_ack_from_peer_schedules_nothing() {
    let (mut conn, mut sink, mut app) = established();

    conn.feed_all(&frame(0x4, 0x1, 0, &[]), &mut sink, &mut app)
        .unwrap();
    assert_eq!(conn.pending(), None);
}

#[test]
fn test_settings_length_not_multiple_of_six_fails() {
    let (mut conn, mut sink, mut app) = established();

    let err = conn
        .feed_all(&frame(0x4, 0, 0, &[0; 4])[..9], &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::MalformedSettings(SettingsError::BadLength(4))
    ));
}

#[test]
fn test_settings_on_nonzero_stream_fails() {
    let (mut conn, mut sink, mut app) = established();

    let err = conn
        .feed_all(&frame(0x4, 0, 1, &[]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Malformed(_)));
}

#[test]
fn test_ping_schedules_pong_with_payload() {
    let (mut conn, mut sink, mut app) = established();

    let payload = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE];
    conn.feed_all(&frame(0x6, 0, 0, &payload), &mut sink, &mut app)
        .unwrap();

    assert_eq!(conn.pending(), Some(&PendingAction::Pong(payload)));
}

#[test]
fn test_ping_ack_is_discarded() {
    let (mut conn, mut sink, mut app) = established();

    conn.feed_all(&frame(0x6, 0x1, 0, &[1, 2, 3, 4, 5, 6, 7, 8]), &mut sink, &mut app)
        .unwrap();
    assert_eq!(conn.pending(), None);
}

#[test]
fn test_ping_on_nonzero_stream_fails() {
    let (mut conn, mut sink, mut app) = established();

    let err = conn
        .feed_all(&frame(0x6, 0, 3, &[0; 8]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Malformed(_)));
}

#[test]
fn test_ping_wrong_length_fails() {
    let (mut conn, mut sink, mut app) = established();

    let err = conn
        .feed_all(&frame(0x6, 0, 0, &[0; 4]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Malformed(_)));
}

#[test]
fn test_goaway_marks_going_away_and_fails() {
    let (mut conn, mut sink, mut app) = established();

    let mut payload = vec![0, 0, 0, 5]; // last stream id
    payload.extend_from_slice(&[0, 0, 0, 0]); // NO_ERROR
    payload.extend_from_slice(b"bye");

    let err = conn
        .feed_all(&frame(0x7, 0, 0, &payload), &mut sink, &mut app)
        .unwrap_err();
    match err {
        ConnectionError::RemoteGoaway {
            last_stream_id,
            error_code,
        } => {
            assert_eq!(last_stream_id, 5);
            assert_eq!(error_code, 0);
        }
        other => panic!("expected RemoteGoaway, got {other:?}"),
    }
    assert!(conn.stream(0).unwrap().going_away);
}

#[test]
fn test_headers_feeds_sink_and_runs_request() {
    let (mut conn, mut sink, mut app) = established();

    // END_STREAM | END_HEADERS, indexed fields :method/:scheme/:path
    conn.feed_all(&frame(0x1, 0x5, 1, &[0x82, 0x86, 0x84]), &mut sink, &mut app)
        .unwrap();

    let s1 = conn.stream(1).expect("stream created by HEADERS");
    assert!(s1.headers_complete);
    assert_eq!(app.requests, vec![1]);

    let store = s1.header_store.expect("store attached on first block byte");
    let headers = sink.finish(store).unwrap();
    assert_eq!(headers.len(), 3);
    assert_eq!(headers[0].name, ":method");
    assert_eq!(headers[0].value, "GET");
}

#[test]
fn test_headers_on_stream_zero_fails() {
    let (mut conn, mut sink, mut app) = established();

    let err = conn
        .feed_all(&frame(0x1, 0x4, 0, &[]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Malformed(_)));
}

#[test]
fn test_continuation_appends_to_same_block() {
    let (mut conn, mut sink, mut app) = established();

    // HEADERS without END_HEADERS, then CONTINUATION with END_HEADERS
    conn.feed_all(&frame(0x1, 0, 1, &[0x82, 0x86]), &mut sink, &mut app)
        .unwrap();
    conn.feed_all(&frame(0x9, 0x4, 1, &[0x84]), &mut sink, &mut app)
        .unwrap();

    let store = conn.stream(1).unwrap().header_store.unwrap();
    assert_eq!(sink.block_bytes(store), &[0x82, 0x86, 0x84]);
}

#[test]
fn test_continuation_after_end_headers_fails() {
    let (mut conn, mut sink, mut app) = established();

    conn.feed_all(&frame(0x1, 0x4, 1, &[0x82]), &mut sink, &mut app)
        .unwrap();
    let err = conn
        .feed_all(&frame(0x9, 0x4, 1, &[0x86]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Malformed(_)));
}

#[test]
fn test_headers_priority_prefix_not_buffered() {
    let (mut conn, mut sink, mut app) = established();

    // PRIORITY flag: 4-byte dependency + weight precede the block
    let payload = [0, 0, 0, 0, 16, 0x82, 0x86];
    conn.feed_all(&frame(0x1, 0x24, 1, &payload), &mut sink, &mut app)
        .unwrap();

    let store = conn.stream(1).unwrap().header_store.unwrap();
    assert_eq!(sink.block_bytes(store), &[0x82, 0x86]);
}

#[test]
fn test_counted_frame_types_discard_content() {
    let (mut conn, mut sink, mut app) = established();

    // DATA, PRIORITY, RST_STREAM, PUSH_PROMISE: consumed without action
    conn.feed_all(&frame(0x0, 0, 5, b"hello"), &mut sink, &mut app)
        .unwrap();
    conn.feed_all(&frame(0x2, 0, 5, &[0, 0, 0, 0, 16]), &mut sink, &mut app)
        .unwrap();
    conn.feed_all(&frame(0x3, 0, 5, &[0, 0, 0, 8]), &mut sink, &mut app)
        .unwrap();
    conn.feed_all(&frame(0x5, 0, 5, &[0, 0, 0, 7, 0x82]), &mut sink, &mut app)
        .unwrap();

    // the first reference created the stream; nothing was dispatched
    assert!(conn.stream(5).is_some());
    assert!(app.requests.is_empty());
    assert_eq!(conn.pending(), None);
}

#[test]
fn test_unknown_frame_type_fails_connection() {
    let (mut conn, mut sink, mut app) = established();

    let err = conn
        .feed_all(&frame(0xAA, 0, 0, &[1, 2, 3]), &mut sink, &mut app)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Malformed(_)));
}
