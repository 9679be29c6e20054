//! Paged list iteration: drives the `continue` token to assemble either a
//! fully-materialized list or a lazy per-item sequence.
use crate::client::Client;
use crate::error::Result;
use crate::transport::Verb;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

fn fetch_page(client: &Rc<RefCell<Client>>, endpoint: &str, query: &[(String, String)]) -> Result<Value> {
    client.borrow_mut().request_json(endpoint, Verb::Get, query, None)
}

fn continue_token(page: &Value) -> Option<String> {
    page.get("metadata")
        .and_then(|m| m.get("continue"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn page_items(page: &Value) -> Vec<Value> {
    page.get("items").and_then(Value::as_array).cloned().unwrap_or_default()
}

/// Fetches pages until the `continue` token is exhausted (or `max_pages` is
/// hit) and merges their `items` into one document, keeping the last page's
/// `metadata`.
///
/// A positive `max_pages` is checked *after* a page is fetched, so the page
/// that crosses the cap is still included: `max_pages = 1` yields two
/// pages, not one. This is preserved as documented existing behavior
/// rather than tightened to fetch exactly `max_pages`.
pub fn get(client: &Rc<RefCell<Client>>, endpoint: &str, query: &[(String, String)], max_pages: u64) -> Result<Value> {
    let mut items = Vec::new();
    let mut metadata = json!({});
    let mut cont: Option<String> = None;
    let mut pages_fetched = 0u64;
    loop {
        let mut page_query = query.to_vec();
        if let Some(c) = &cont {
            page_query.push(("continue".into(), c.clone()));
        }
        let page = fetch_page(client, endpoint, &page_query)?;
        pages_fetched += 1;
        items.extend(page_items(&page));
        metadata = page.get("metadata").cloned().unwrap_or(json!({}));
        cont = continue_token(&page);
        if max_pages > 0 && pages_fetched > max_pages {
            break;
        }
        if cont.is_none() {
            break;
        }
    }
    Ok(json!({ "items": items, "metadata": metadata }))
}

/// A lazy, item-at-a-time view over a paged list: the next page is only
/// fetched once the current one is exhausted. Unlike [`get`], there is no
/// page cap — iteration runs until the `continue` token is exhausted.
pub struct ListIter {
    client: Rc<RefCell<Client>>,
    endpoint: String,
    query: Vec<(String, String)>,
    cont: Option<String>,
    pending: VecDeque<Value>,
    exhausted: bool,
    started: bool,
}

impl ListIter {
    pub(crate) fn new(client: Rc<RefCell<Client>>, endpoint: String, query: Vec<(String, String)>) -> Self {
        ListIter { client, endpoint, query, cont: None, pending: VecDeque::new(), exhausted: false, started: false }
    }

    fn fetch_next_page(&mut self) -> Result<()> {
        let mut page_query = self.query.clone();
        if let Some(c) = &self.cont {
            page_query.push(("continue".into(), c.clone()));
        }
        let page = fetch_page(&self.client, &self.endpoint, &page_query)?;
        self.pending.extend(page_items(&page));
        self.cont = continue_token(&page);
        self.started = true;
        if self.cont.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for ListIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            if self.exhausted && self.started {
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                return Some(Err(e));
            }
            if self.pending.is_empty() && self.exhausted {
                return None;
            }
        }
    }
}

/// Starts a lazy sequence of items, paging underneath as needed.
pub fn stream(client: Rc<RefCell<Client>>, endpoint: String, query: Vec<(String, String)>) -> ListIter {
    ListIter::new(client, endpoint, query)
}
