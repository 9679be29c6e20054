//! An in-process [`Transport`] double, standing in for a live apiserver the
//! way the teacher's own tests stub a `tower::Service` instead of dialing
//! out. Each `open_stream` call pops the next pre-scripted connection's
//! chunk queue, so a test can script exactly what a reconnect should see.
use kube_watch_client::{ReadOutcome, ResponseBody, Transport, Verb, WatchRead};
use kube_watch_client::Credentials;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// One simulated read result.
pub enum MockChunk {
    /// Bytes arrive on this read.
    Data(Vec<u8>),
    /// The read deadline elapses with no bytes.
    Timeout,
    /// The peer closes the connection.
    Eof,
}

/// Convenience: a data chunk from a `&str` line (caller supplies the trailing `\n`).
pub fn data(line: &str) -> MockChunk {
    MockChunk::Data(line.as_bytes().to_vec())
}

#[derive(Default)]
pub struct MockTransport {
    /// One entry per expected `open_stream` call, each a queue of reads for that connection.
    pub connections: RefCell<VecDeque<VecDeque<MockChunk>>>,
    /// One entry per expected one-shot `request` call (used for paged lists).
    pub pages: RefCell<VecDeque<Value>>,
    /// Shared so a test can retain a handle after the transport is boxed and moved into a `Client`.
    pub open_count: Rc<RefCell<u32>>,
    /// The query params passed to each `open_stream` call, in order.
    pub open_queries: Rc<RefCell<Vec<Vec<(String, String)>>>>,
}

impl MockTransport {
    /// An empty transport with nothing scripted yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the reads for the next `open_stream` call.
    pub fn push_connection(&self, chunks: Vec<MockChunk>) {
        self.connections.borrow_mut().push_back(chunks.into_iter().collect());
    }

    /// Scripts the JSON body for the next one-shot `request` call.
    pub fn push_page(&self, page: Value) {
        self.pages.borrow_mut().push_back(page);
    }
}

impl Transport for MockTransport {
    fn request(
        &mut self,
        _endpoint: &str,
        _verb: Verb,
        _query: &[(String, String)],
        _body: Option<Vec<u8>>,
        _credentials: &Credentials,
    ) -> kube_watch_client::Result<ResponseBody> {
        let page = self.pages.borrow_mut().pop_front().expect("MockTransport: no more scripted pages");
        Ok(ResponseBody { status: 200, bytes: serde_json::to_vec(&page).unwrap() })
    }

    fn open_stream(
        &mut self,
        _endpoint: &str,
        query: &[(String, String)],
        _credentials: &Credentials,
        _read_timeout: Duration,
    ) -> kube_watch_client::Result<Box<dyn WatchRead>> {
        *self.open_count.borrow_mut() += 1;
        self.open_queries.borrow_mut().push(query.to_vec());
        let chunks = self.connections.borrow_mut().pop_front().unwrap_or_default();
        Ok(Box::new(MockWatchRead { chunks }))
    }
}

struct MockWatchRead {
    chunks: VecDeque<MockChunk>,
}

impl WatchRead for MockWatchRead {
    fn read_chunk(&mut self, _max_len: usize) -> kube_watch_client::Result<ReadOutcome> {
        match self.chunks.pop_front() {
            Some(MockChunk::Data(d)) => Ok(ReadOutcome::Data(d)),
            Some(MockChunk::Timeout) => Ok(ReadOutcome::TimedOut),
            Some(MockChunk::Eof) | None => Ok(ReadOutcome::Eof),
        }
    }
}

/// Builds a single-line JSON watch frame for `event_type`/`resource_version`/`name`, `\n`-terminated.
pub fn watch_event_line(event_type: &str, resource_version: &str, name: &str) -> String {
    format!(
        "{{\"type\":\"{event_type}\",\"object\":{{\"metadata\":{{\"name\":\"{name}\",\"resourceVersion\":\"{resource_version}\"}}}}}}\n"
    )
}
