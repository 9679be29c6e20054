//! A blocking client for the Kubernetes HTTP API, centered on the Watch
//! subsystem: long-lived streaming connections that survive timeouts and
//! peer death, preserve event ordering across reconnects, and suppress
//! duplicates from the initial-load burst.
//!
//! Kubeconfig context selection and a generic typed-resource REST layer
//! are intentionally out of scope — this crate assembles [`Credentials`]
//! and drives requests against an opaque `endpoint` string, leaving
//! resource typing to the caller.
//!
//! ```no_run
//! use kube_watch_client::{Client, WatchConfig};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! # fn main() -> Result<(), kube_watch_client::Error> {
//! let client = Rc::new(RefCell::new(Client::infer()?));
//! let mut watch = Client::create_watch(&client, WatchConfig::new("/api/v1/pods"));
//! for event in watch.stream(1) {
//!     let _event = event?;
//! }
//! # Ok(())
//! # }
//! ```
pub mod auth;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod list;
pub mod path;
pub mod transport;
pub mod watch;

pub use client::{Client, RequestOptions};
pub use collection::WatchCollection;
pub use config::Credentials;
pub use error::{ConfigError, Error, PathError, Result};
pub use list::ListIter;
pub use transport::{ReadOutcome, ResponseBody, Transport, Verb, WatchRead};
pub use watch::{Event, Watch, WatchConfig, WatchHandle};
