use super::connection::{Connection, ConnectionState, SendFailure};
use crate::broker::message::Frame;

#[test]
fn test_connection_new() {
    let (conn, _rx) = Connection::new("1", Some("alice".to_string()), 4);
    assert!(conn.id.starts_with("client-"));
    assert_eq!(conn.topic, "1");
    assert_eq!(conn.name, "alice");
    assert_eq!(conn.state(), ConnectionState::Open);
}

#[test]
fn blank_name_becomes_guest() {
    let (conn, _rx) = Connection::new("1", Some("   ".to_string()), 4);
    assert!(conn.name.starts_with("guest-"));
    assert_eq!(conn.name.len(), "guest-".len() + 8);

    let (conn, _rx) = Connection::new("1", None, 4);
    assert!(conn.name.starts_with("guest-"));
}

#[test]
fn ids_are_unique() {
    let (a, _ra) = Connection::new("1", None, 1);
    let (b, _rb) = Connection::new("1", None, 1);
    assert_ne!(a.id, b.id);
}

#[test]
fn send_delivers_in_order() {
    let (conn, mut rx) = Connection::new("1", None, 4);
    conn.send(Frame::from("one")).unwrap();
    conn.send(Frame::from("two")).unwrap();
    assert_eq!(rx.try_recv().unwrap().as_str(), "one");
    assert_eq!(rx.try_recv().unwrap().as_str(), "two");
}

#[test]
fn send_reports_full_buffer() {
    let (conn, _rx) = Connection::new("1", None, 1);
    conn.send(Frame::from("one")).unwrap();
    assert_eq!(conn.send(Frame::from("two")), Err(SendFailure::Full));
}

#[test]
fn send_reports_dropped_receiver() {
    let (conn, rx) = Connection::new("1", None, 1);
    drop(rx);
    assert_eq!(conn.send(Frame::from("one")), Err(SendFailure::Closed));
}

#[test]
fn close_transitions_once() {
    let (conn, mut rx) = Connection::new("1", None, 1);
    assert!(conn.begin_close());
    assert!(!conn.begin_close());
    assert_eq!(conn.state(), ConnectionState::Closing);
    assert_eq!(conn.send(Frame::from("late")), Err(SendFailure::Closed));

    conn.release();
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(!conn.begin_close());
    // sender dropped, so the stream ends
    assert!(rx.try_recv().is_err());
    assert!(rx.blocking_recv().is_none());
}
