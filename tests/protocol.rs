//! Wire-protocol tests against a live daemon on a temporary socket.

use deskd::daemon::Daemon;
use deskd::ipc::client::Client;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

static TEST_ID: AtomicU32 = AtomicU32::new(0);

fn tmp_socket_path() -> PathBuf {
    let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("deskd-protocol-{}-{}.sock", std::process::id(), id))
}

fn started() -> (Daemon, Client) {
    let path = tmp_socket_path();
    let mut daemon = Daemon::new("test", &path).with_mode(0o600);
    daemon.start().unwrap();
    (daemon, Client::new(&path))
}

/// Open a `subscribe` connection and return a line reader over it.
fn subscribe(client: &Client, command: &str) -> BufReader<UnixStream> {
    let mut stream = UnixStream::connect(client.path()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream.write_all(command.as_bytes()).unwrap();
    BufReader::new(stream)
}

fn next_event(reader: &mut BufReader<UnixStream>) -> Value {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert!(line.ends_with('\n'), "unterminated frame: {:?}", line);
    serde_json::from_str(&line).unwrap()
}

fn settle() {
    std::thread::sleep(Duration::from_millis(50));
}

#[test]
fn ping_answers_pong() {
    let (mut daemon, client) = started();
    assert!(client.is_running());
    assert_eq!(client.send("ping").unwrap(), "pong");
    daemon.shutdown();
    assert!(!client.is_running());
}

#[test]
fn unknown_command() {
    let (mut daemon, client) = started();
    assert_eq!(client.send("fooble").unwrap(), "unknown command: fooble");
    daemon.shutdown();
}

#[test]
fn gpu_round_trip() {
    let (mut daemon, client) = started();
    daemon.hub().publish("gpu", json!({"gpu_busy": "42"}));

    assert_eq!(client.send("query gpu").unwrap(), r#"{"gpu_busy":"42"}"#);
    assert_eq!(client.send("query never-set").unwrap(), "null");

    let mut sub = subscribe(&client, "subscribe gpu");
    let mut first = String::new();
    sub.read_line(&mut first).unwrap();
    assert_eq!(first, "{\"event\":\"gpu\",\"data\":{\"gpu_busy\":\"42\"}}\n");

    daemon.shutdown();
}

#[test]
fn state_and_query_all_return_whole_map() {
    let (mut daemon, client) = started();
    daemon.hub().publish("a", json!(1));
    daemon.hub().publish("b", json!("two"));

    let expected = json!({"a": 1, "b": "two"});
    for cmd in ["state", "query", "query all"] {
        let resp: Value = serde_json::from_str(&client.send(cmd).unwrap()).unwrap();
        assert_eq!(resp, expected, "{}", cmd);
    }
    daemon.shutdown();
}

#[test]
fn snapshot_arrives_before_live_events() {
    let (mut daemon, client) = started();
    daemon.hub().publish("t", json!("old"));

    let mut sub = subscribe(&client, "subscribe t");
    assert_eq!(next_event(&mut sub), json!({"event": "t", "data": "old"}));

    daemon.hub().publish("t", json!("new"));
    assert_eq!(next_event(&mut sub), json!({"event": "t", "data": "new"}));
    daemon.shutdown();
}

#[test]
fn wildcard_sees_new_topics_and_filters_isolate() {
    let (mut daemon, client) = started();
    let mut all = subscribe(&client, "subscribe");
    let mut only_a = subscribe(&client, "subscribe A");
    settle();

    daemon.hub().publish("B", json!(2));
    daemon.hub().publish("A", json!(1));

    assert_eq!(next_event(&mut all), json!({"event": "B", "data": 2}));
    assert_eq!(next_event(&mut all), json!({"event": "A", "data": 1}));
    assert_eq!(next_event(&mut only_a), json!({"event": "A", "data": 1}));
    daemon.shutdown();
}

#[test]
fn action_errors_are_reported_as_strings() {
    let (mut daemon, client) = started();
    assert_eq!(client.send("action").unwrap(), "error: provider name required");
    assert_eq!(client.send("action nope x").unwrap(), "error: unknown provider: nope");
    daemon.shutdown();
}

#[test]
fn shutdown_removes_socket_and_closes_subscribers() {
    let (mut daemon, client) = started();
    let path = client.path().to_path_buf();
    let mut sub = subscribe(&client, "subscribe");
    settle();

    daemon.shutdown();
    assert!(!path.exists());

    let mut line = String::new();
    assert_eq!(sub.read_line(&mut line).unwrap(), 0);
}
