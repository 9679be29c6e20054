//! Scenario tests for the Watch engine, driven against an in-process mock
//! transport rather than a live apiserver.
mod support;

use kube_watch_client::{Client, Credentials, Event, WatchConfig};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use support::{data, watch_event_line, MockChunk, MockTransport};

fn client_with(transport: MockTransport) -> Rc<RefCell<Client>> {
    let credentials = Credentials::insecure_static("https://mock", "");
    Rc::new(RefCell::new(Client::new(credentials, None).with_transport(Box::new(transport))))
}

/// S1: an initial-load burst followed by a live update delivers every
/// distinct object exactly once, in order, with no duplicates.
#[test]
fn initial_load_then_live_update_has_no_duplicates() {
    let transport = MockTransport::new();
    transport.push_connection(vec![
        data(&watch_event_line("ADDED", "1", "a")),
        data(&watch_event_line("ADDED", "2", "b")),
        MockChunk::Timeout,
        data(&watch_event_line("MODIFIED", "3", "a")),
    ]);
    let client = client_with(transport);
    let mut watch = Client::create_watch(&client, WatchConfig::new("/api/v1/pods"));

    let events: Vec<Event> = watch.stream(4).collect::<Result<_, _>>().unwrap();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], Event::Added(obj) if obj["metadata"]["resourceVersion"] == "1"));
    assert!(matches!(&events[1], Event::Added(obj) if obj["metadata"]["resourceVersion"] == "2"));
    assert!(matches!(&events[2], Event::Modified(obj) if obj["metadata"]["resourceVersion"] == "3"));
}

/// A 410 Gone clears the remembered resourceVersion and reopens the stream
/// without it, restarting an initial load.
#[test]
fn gone_response_resets_resource_version_and_reconnects() {
    let transport = MockTransport::new();
    transport.push_connection(vec![
        data(&watch_event_line("ADDED", "5", "a")),
        data("{\"type\":\"ERROR\",\"object\":{\"code\":410,\"message\":\"too old\"}}\n"),
    ]);
    transport.push_connection(vec![data(&watch_event_line("ADDED", "9", "a"))]);

    let credentials = Credentials::insecure_static("https://mock", "");
    let client = Rc::new(RefCell::new(Client::new(credentials, None).with_transport(Box::new(transport))));
    let mut watch = Client::create_watch(&client, WatchConfig::new("/api/v1/pods"));

    let events: Vec<Event> = watch.stream(3).collect::<Result<_, _>>().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], Event::Added(obj) if obj["metadata"]["resourceVersion"] == "5"));
    assert!(matches!(&events[1], Event::Added(obj) if obj["metadata"]["resourceVersion"] == "9"));
}

/// A `Status: Failure` envelope is treated the same as a 410: reset and reconnect.
#[test]
fn status_failure_frame_triggers_reconnect_not_an_error() {
    let transport = MockTransport::new();
    transport.push_connection(vec![data(
        "{\"kind\":\"Status\",\"apiVersion\":\"v1\",\"status\":\"Failure\",\"message\":\"expired\"}\n",
    )]);
    transport.push_connection(vec![data(&watch_event_line("ADDED", "1", "a"))]);
    let client = client_with(transport);
    let mut watch = Client::create_watch(&client, WatchConfig::new("/api/v1/pods"));

    let events: Vec<Event> = watch.stream(2).collect::<Result<_, _>>().unwrap();
    assert_eq!(events.len(), 1);
}

/// A connection that stops producing bytes (but never EOFs) is torn down
/// and reopened once both the handle-age and idle-read deadlines elapse.
#[test]
fn dead_peer_is_detected_and_reconnected() {
    let transport = MockTransport::new();
    transport.push_connection(vec![data(&watch_event_line("ADDED", "1", "a"))]);
    transport.push_connection(vec![data(&watch_event_line("ADDED", "2", "a"))]);
    let open_count_handle = Rc::clone(&transport.open_count);

    let credentials = Credentials::insecure_static("https://mock", "");
    let client = Rc::new(RefCell::new(Client::new(credentials, None).with_transport(Box::new(transport))));
    let mut config = WatchConfig::new("/api/v1/pods");
    config.dead_peer_detection_timeout = Duration::from_millis(5);
    let mut watch = Client::create_watch(&client, config);

    // step 1: opens the first connection and delivers rv=1
    let first = watch.stream(1).collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(*open_count_handle.borrow(), 1);

    std::thread::sleep(Duration::from_millis(30));

    // step 2: the peer looks dead; this cycle reconnects and yields no event
    let second = watch.stream(1).collect::<Result<Vec<_>, _>>().unwrap();
    assert!(second.is_empty());
    assert_eq!(*open_count_handle.borrow(), 2);

    // step 3: reads from the fresh connection
    let third = watch.stream(1).collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(third.len(), 1);
}

/// The paged-list cap is checked after a page is fetched, not before: a
/// `max_pages` of 1 still returns the page that crossed the cap, i.e. two
/// pages' worth of items, not one.
#[test]
fn paged_list_cap_is_off_by_one_by_design() {
    let transport = MockTransport::new();
    transport.push_page(json!({"items": [{"name": "a"}], "metadata": {"continue": "tok1"}}));
    transport.push_page(json!({"items": [{"name": "b"}], "metadata": {"continue": "tok2"}}));
    transport.push_page(json!({"items": [{"name": "c"}], "metadata": {}}));
    let client = client_with(transport);

    let merged = Client::create_list(&client, "/api/v1/pods", vec![], 1).unwrap();
    let items = merged["items"].as_array().unwrap();
    assert_eq!(items.len(), 2, "max_pages=1 should still pull in the page that crosses the cap");
}

/// `max_pages = 0` means unlimited: every page is fetched until `continue` is exhausted.
#[test]
fn paged_list_unlimited_follows_every_continue_token() {
    let transport = MockTransport::new();
    transport.push_page(json!({"items": [{"name": "a"}], "metadata": {"continue": "tok1"}}));
    transport.push_page(json!({"items": [{"name": "b"}], "metadata": {"continue": "tok2"}}));
    transport.push_page(json!({"items": [{"name": "c"}], "metadata": {}}));
    let client = client_with(transport);

    let merged = Client::create_list(&client, "/api/v1/pods", vec![], 0).unwrap();
    let items = merged["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
}

/// A callback that calls `stop()` on its handle causes `start()` to return
/// promptly rather than continuing to run forever (`cycles == 0`).
#[test]
fn callback_stop_terminates_start_promptly() {
    let transport = MockTransport::new();
    transport.push_connection(vec![
        data(&watch_event_line("ADDED", "1", "a")),
        data(&watch_event_line("ADDED", "2", "b")),
        data(&watch_event_line("ADDED", "3", "c")),
    ]);
    let client = client_with(transport);
    let mut config = WatchConfig::new("/api/v1/pods");
    let seen = Rc::new(RefCell::new(0u32));
    let seen_in_callback = Rc::clone(&seen);
    config.callback = Some(Box::new(move |_event, handle| {
        *seen_in_callback.borrow_mut() += 1;
        handle.stop();
    }));
    let mut watch = Client::create_watch(&client, config);

    watch.start(0).unwrap();
    assert_eq!(*seen.borrow(), 1, "stop() in the callback should prevent further dispatch");
}
