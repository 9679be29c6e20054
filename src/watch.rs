//! The Watch engine: a single `step` trampoline driving both the callback
//! (`start`) and pull (`stream`) consumption models, per the teacher's
//! `step_trampolined`/`step` shape in `src/watcher.rs` and
//! `kube-runtime/src/watcher.rs`.
use crate::client::Client;
use crate::error::Result;
use crate::transport::{ReadOutcome, WatchRead};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Default bound on a single stream read, matching `streamReadLength` in
/// the external interface contract.
pub const DEFAULT_STREAM_READ_LENGTH: usize = 8192;
/// Default per-read timeout, in microseconds.
pub const DEFAULT_STREAM_READ_TIMEOUT_MICROS: u64 = 100_000;
/// Default dead-peer detection window, in seconds. `0` disables the check.
pub const DEFAULT_DEAD_PEER_DETECTION_TIMEOUT_SECS: u64 = 600;

/// A single decoded watch event. `Raw` is delivered instead of a parsed
/// variant whenever [`WatchConfig::decode_response`] is `false`: the
/// server's bookkeeping (resourceVersion tracking, duplicate suppression,
/// the initial-load tripwire) still runs against the parsed frame, only
/// the payload handed to the caller changes.
#[derive(Debug, Clone)]
pub enum Event {
    /// An `ADDED` frame's `object`.
    Added(Value),
    /// A `MODIFIED` frame's `object`.
    Modified(Value),
    /// A `DELETED` frame's `object`.
    Deleted(Value),
    /// A `BOOKMARK` frame's `object` (carries only an updated resourceVersion).
    Bookmark(Value),
    /// The raw, undecoded line bytes, used when decoding is disabled.
    Raw(Vec<u8>),
}

/// A handle passed to the user callback alongside each [`Event`], exposing
/// only what the callback contract allows: requesting a stop, and
/// (optionally) the owning client for follow-up calls.
pub struct WatchHandle {
    stop_flag: Rc<Cell<bool>>,
    client: Rc<RefCell<Client>>,
}

impl WatchHandle {
    /// Requests that the watch stop at the next cooperative check point.
    pub fn stop(&self) {
        self.stop_flag.set(true);
    }

    /// The client this watch was created from, for issuing follow-up calls
    /// (e.g. a one-shot GET) from inside the callback.
    pub fn client(&self) -> Rc<RefCell<Client>> {
        Rc::clone(&self.client)
    }
}

/// Immutable configuration for a [`Watch`].
pub struct WatchConfig {
    /// The resource collection endpoint to watch, e.g. `/api/v1/namespaces/default/pods`.
    pub endpoint: String,
    /// Extra query parameters (label/field selectors, `timeoutSeconds`, ...).
    pub query: Vec<(String, String)>,
    /// Starting `resourceVersion`. `None` starts an initial load from "now".
    pub initial_resource_version: Option<String>,
    /// Whether to parse frames into [`Event`] variants (`true`) or deliver
    /// [`Event::Raw`] (`false`).
    pub decode_response: bool,
    /// Bound on a single read, in bytes.
    pub stream_read_length: usize,
    /// Per-read timeout.
    pub stream_read_timeout: Duration,
    /// Dead-peer detection window. `Duration::ZERO` disables the check.
    pub dead_peer_detection_timeout: Duration,
    /// Invoked with each delivered event in callback mode; unused by `stream()`.
    pub callback: Option<Box<dyn FnMut(&Event, &WatchHandle)>>,
}

impl WatchConfig {
    /// A config with the documented defaults and no callback set.
    pub fn new(endpoint: impl Into<String>) -> Self {
        WatchConfig {
            endpoint: endpoint.into(),
            query: Vec::new(),
            initial_resource_version: None,
            decode_response: true,
            stream_read_length: DEFAULT_STREAM_READ_LENGTH,
            stream_read_timeout: Duration::from_micros(DEFAULT_STREAM_READ_TIMEOUT_MICROS),
            dead_peer_detection_timeout: Duration::from_secs(DEFAULT_DEAD_PEER_DETECTION_TIMEOUT_SECS),
            callback: None,
        }
    }

    fn has_positive_timeout_seconds(&self) -> bool {
        self.query
            .iter()
            .any(|(k, v)| k == "timeoutSeconds" && v.parse::<u64>().map(|n| n > 0).unwrap_or(false))
    }
}

struct State {
    stream: Option<Box<dyn WatchRead>>,
    buffer: Vec<u8>,
    stop_flag: Rc<Cell<bool>>,
    resource_version: Option<String>,
    resource_version_last_success: Option<String>,
    initial_load_finished: bool,
    handle_start: Option<Instant>,
    last_bytes_read: Option<Instant>,
}

/// What a single read-cycle ([`Watch::step`]) produced.
pub(crate) enum StepOutcome {
    /// Zero or more events decoded from this cycle's reads (commonly zero or one).
    Events(Vec<Event>),
    /// The watch has stopped (cooperative stop, or a bounded `timeoutSeconds` EOF) and closed its stream.
    Terminated,
}

/// A single watch over one resource collection.
///
/// Built on one primitive, [`Watch::step`], which performs exactly one
/// read-cycle (steps 1-13 of the read-cycle algorithm) and returns
/// whatever events that cycle produced. `start()` and `stream()` are both
/// thin drivers over the same `step()` — there is exactly one copy of the
/// state machine, per the teacher's `step_trampolined` pattern.
pub struct Watch {
    config: WatchConfig,
    client: Rc<RefCell<Client>>,
    state: State,
}

impl Watch {
    pub(crate) fn new(client: Rc<RefCell<Client>>, config: WatchConfig) -> Self {
        let resource_version = config.initial_resource_version.clone();
        Watch {
            config,
            client,
            state: State {
                stream: None,
                buffer: Vec::new(),
                stop_flag: Rc::new(Cell::new(false)),
                resource_version,
                resource_version_last_success: None,
                initial_load_finished: false,
                handle_start: None,
                last_bytes_read: None,
            },
        }
    }

    /// Requests a cooperative stop, honored at the next read-cycle boundary
    /// (or immediately after the in-flight callback returns, in callback mode).
    pub fn stop(&self) {
        self.state.stop_flag.set(true);
    }

    /// Always returns `Ok(false)`: forking the read loop into a background
    /// process/thread is explicitly not supported by this implementation —
    /// doing so for real would require `unsafe` process-forking primitives
    /// this crate forbids. Exposed as a fallible-looking call so callers
    /// written against an implementation that *can* fork still compile.
    pub fn fork(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn open(&mut self) -> Result<()> {
        let mut query = self.config.query.clone();
        if let Some(rv) = &self.state.resource_version {
            query.push(("resourceVersion".to_string(), rv.clone()));
        }
        let stream = {
            let mut client = self.client.borrow_mut();
            client.open_watch_stream(&self.config.endpoint, &query, self.config.stream_read_timeout)?
        };
        self.state.stream = Some(stream);
        self.state.handle_start = Some(Instant::now());
        self.state.last_bytes_read = None;
        Ok(())
    }

    fn close_stream(&mut self) {
        self.state.stream = None;
        self.state.handle_start = None;
        self.state.last_bytes_read = None;
    }

    fn reconnect(&mut self) -> Result<()> {
        self.close_stream();
        self.open()
    }

    /// `true` once both the handle-open and last-bytes-read deadlines have
    /// elapsed. A stream that has never produced a byte is treated as
    /// already overdue the moment the handle-open deadline passes — a
    /// brand-new connection cannot out-wait a silent peer by restarting
    /// its idle clock.
    fn dead_peer_tripped(&self) -> bool {
        if self.config.dead_peer_detection_timeout.is_zero() {
            return false;
        }
        let Some(start) = self.state.handle_start else { return false };
        let now = Instant::now();
        let timeout = self.config.dead_peer_detection_timeout;
        let start_elapsed = now >= start + timeout;
        let bytes_elapsed = match self.state.last_bytes_read {
            Some(last) => now >= last + timeout,
            None => true,
        };
        start_elapsed && bytes_elapsed
    }

    /// Performs exactly one read-cycle: checks for a stop/dead-peer
    /// condition, issues one bounded read, splits any newly-complete
    /// buffered lines, and decodes/delivers them. Never blocks longer than
    /// one `stream_read_timeout`.
    pub(crate) fn step(&mut self) -> Result<StepOutcome> {
        if self.state.stop_flag.get() {
            self.close_stream();
            self.state.stop_flag.set(false);
            return Ok(StepOutcome::Terminated);
        }

        if self.state.stream.is_some() && self.dead_peer_tripped() {
            tracing::debug!(endpoint = %self.config.endpoint, "dead peer detected, reconnecting");
            self.reconnect()?;
            return Ok(StepOutcome::Events(Vec::new()));
        }

        if self.state.stream.is_none() {
            self.open()?;
        }

        let read_len = self.config.stream_read_length;
        let outcome = self.state.stream.as_mut().expect("just opened").read_chunk(read_len)?;
        match outcome {
            ReadOutcome::Eof => {
                if self.config.has_positive_timeout_seconds() {
                    self.close_stream();
                    return Ok(StepOutcome::Terminated);
                }
                tracing::debug!(endpoint = %self.config.endpoint, "stream closed by peer, reconnecting");
                self.reconnect()?;
                Ok(StepOutcome::Events(Vec::new()))
            }
            ReadOutcome::TimedOut => {
                if !self.state.initial_load_finished {
                    self.state.initial_load_finished = true;
                }
                Ok(StepOutcome::Events(Vec::new()))
            }
            ReadOutcome::Data(bytes) => {
                self.state.last_bytes_read = Some(Instant::now());
                self.state.buffer.extend_from_slice(&bytes);
                self.drain_complete_lines()
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Result<StepOutcome> {
        let mut events = Vec::new();
        let Some(last_nl) = self.state.buffer.iter().rposition(|&b| b == b'\n') else {
            return Ok(StepOutcome::Events(events));
        };
        let complete: Vec<u8> = self.state.buffer[..last_nl].to_vec();
        self.state.buffer = self.state.buffer[last_nl + 1..].to_vec();
        for line in complete.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            if let Some(control) = self.process_line(line, &mut events)? {
                // a reset (410/Status:Failure/malformed envelope) happened mid-batch;
                // the remaining lines in this pass belonged to the now-closed stream.
                return Ok(control);
            }
        }
        Ok(StepOutcome::Events(events))
    }

    /// Decodes and processes one line. Returns `Some(StepOutcome::Events(vec![]))`
    /// if processing this line triggered a reconnect (the caller should
    /// stop draining the current buffer, since it belongs to a now-closed
    /// stream), `None` to keep draining.
    fn process_line(&mut self, line: &[u8], events: &mut Vec<Event>) -> Result<Option<StepOutcome>> {
        let text = String::from_utf8_lossy(line).into_owned();
        let decoded: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode watch frame, skipping");
                return Ok(None);
            }
        };

        if !decoded.is_object() {
            tracing::warn!("watch frame was not a JSON object, reconnecting");
            self.reconnect()?;
            return Ok(Some(StepOutcome::Events(Vec::new())));
        }

        if decoded.get("kind").and_then(Value::as_str) == Some("Status")
            && decoded.get("status").and_then(Value::as_str) == Some("Failure")
        {
            tracing::debug!("received Status: Failure, resetting watch");
            self.reconnect()?;
            return Ok(Some(StepOutcome::Events(Vec::new())));
        }

        let event_type = decoded.get("type").and_then(Value::as_str).unwrap_or_default().to_string();

        if event_type == "ERROR" {
            let code = decoded.pointer("/object/code").and_then(Value::as_i64);
            if code == Some(410) {
                tracing::debug!("received 410 Gone, clearing resourceVersion and resetting");
                self.state.resource_version = None;
                self.reconnect()?;
                return Ok(Some(StepOutcome::Events(Vec::new())));
            }
            tracing::warn!(?code, "received ERROR frame, ignoring");
            return Ok(None);
        }

        if !self.state.initial_load_finished && event_type != "ADDED" {
            self.state.initial_load_finished = true;
        }

        let resource_version = decoded.pointer("/object/metadata/resourceVersion").and_then(Value::as_str).map(str::to_owned);
        let is_newer = match &resource_version {
            Some(rv) => rv_greater(rv, self.state.resource_version_last_success.as_deref()),
            None => false,
        };
        if let Some(rv) = &resource_version {
            if is_newer {
                self.state.resource_version = Some(rv.clone());
                self.state.resource_version_last_success = Some(rv.clone());
            }
        }

        let deliver = !self.state.initial_load_finished || is_newer;
        if deliver {
            events.push(self.build_event(&event_type, &decoded, &text));
        }
        Ok(None)
    }

    fn build_event(&self, event_type: &str, decoded: &Value, raw_text: &str) -> Event {
        if !self.config.decode_response {
            return Event::Raw(raw_text.as_bytes().to_vec());
        }
        let object = decoded.get("object").cloned().unwrap_or(Value::Null);
        match event_type {
            "ADDED" => Event::Added(object),
            "DELETED" => Event::Deleted(object),
            "BOOKMARK" => Event::Bookmark(object),
            _ => Event::Modified(object),
        }
    }

    fn dispatch(&mut self, event: Event) {
        if let Some(mut callback) = self.config.callback.take() {
            let handle = WatchHandle { stop_flag: Rc::clone(&self.state.stop_flag), client: Rc::clone(&self.client) };
            callback(&event, &handle);
            self.config.callback = Some(callback);
        }
    }

    /// Drives the watch in callback mode. Runs forever when `cycles == 0`,
    /// otherwise performs at most `cycles` read-cycles and returns.
    pub fn start(&mut self, cycles: u64) -> Result<()> {
        let mut n = 0u64;
        loop {
            match self.step()? {
                StepOutcome::Terminated => return Ok(()),
                StepOutcome::Events(events) => {
                    for event in events {
                        self.dispatch(event);
                        if self.state.stop_flag.get() {
                            self.close_stream();
                            self.state.stop_flag.set(false);
                            return Ok(());
                        }
                    }
                }
            }
            n += 1;
            if cycles != 0 && n >= cycles {
                return Ok(());
            }
        }
    }

    /// Drives the watch as a lazy pull sequence. Runs forever when
    /// `cycles == 0`, otherwise performs at most `cycles` read-cycles
    /// (which may yield fewer items than cycles, or several per cycle).
    pub fn stream(&mut self, cycles: u64) -> WatchIter<'_> {
        WatchIter { watch: self, cycles, produced: 0, pending: VecDeque::new(), done: false }
    }
}

/// Lazy, pull-driven iterator over a [`Watch`]'s events.
pub struct WatchIter<'a> {
    watch: &'a mut Watch,
    cycles: u64,
    produced: u64,
    pending: VecDeque<Event>,
    done: bool,
}

impl Iterator for WatchIter<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            if self.cycles != 0 && self.produced >= self.cycles {
                self.done = true;
                return None;
            }
            match self.watch.step() {
                Ok(StepOutcome::Terminated) => {
                    self.done = true;
                    return None;
                }
                Ok(StepOutcome::Events(events)) => {
                    self.produced += 1;
                    self.pending.extend(events);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Resource versions are opaque strings in general, but the apiserver's own
/// are decimal and monotonic; parse-and-compare numerically when possible,
/// falling back to a lexicographic comparison (which still rejects exact
/// duplicates) for anything else.
fn rv_greater(candidate: &str, last_success: Option<&str>) -> bool {
    let Some(last) = last_success else { return true };
    match (candidate.parse::<u64>(), last.parse::<u64>()) {
        (Ok(c), Ok(l)) => c > l,
        _ => candidate > last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rv_greater_is_numeric_when_possible() {
        assert!(rv_greater("100", Some("99")));
        assert!(!rv_greater("99", Some("100")));
        assert!(!rv_greater("100", Some("100")));
        assert!(rv_greater("5", None));
    }

    #[test]
    fn has_positive_timeout_seconds_detects_the_query_param() {
        let mut cfg = WatchConfig::new("/api/v1/pods");
        assert!(!cfg.has_positive_timeout_seconds());
        cfg.query.push(("timeoutSeconds".into(), "0".into()));
        assert!(!cfg.has_positive_timeout_seconds());
        cfg.query.push(("timeoutSeconds".into(), "30".into()));
        assert!(cfg.has_positive_timeout_seconds());
    }
}
