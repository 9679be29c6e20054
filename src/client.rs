//! The client facade: binds the credential resolver, transport, and the
//! Watch/Paged-List primitives together, grounded in
//! `kube-client/src/client/mod.rs`'s `Client` and its
//! `Client::try_default`/`Client::try_from` inference order, collapsed to
//! one blocking, single-owner `Client`.
use crate::auth::Resolver;
use crate::config::{self, Credentials};
use crate::error::Result;
use crate::list::ListIter;
use crate::transport::{HttpTransport, ResponseBody, Transport, Verb, WatchRead};
use crate::watch::{Watch, WatchConfig};
use serde_json::Value;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// Per-call overrides for request decoding behavior, resolved against a
/// client-level default and finally a hardcoded system default — the same
/// three-layer `Option` merge the teacher uses for `ListParams`/`PatchParams`
/// builder defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Whether to JSON-decode the response body (`true`) or hand back raw bytes.
    pub decode_response: Option<bool>,
}

impl RequestOptions {
    fn resolve_decode_response(call_site: Option<bool>, client_default: Option<bool>) -> bool {
        call_site.or(client_default).unwrap_or(true)
    }
}

/// The client entry point: owns the one [`Credentials`] snapshot in the
/// process and the transport/resolver pair that keep it current.
///
/// Per the single-threaded cooperative model, `Client` is not `Send`/`Sync`
/// and is meant to be shared within one thread via `Rc<RefCell<Client>>` —
/// [`Watch`]es and paged-list iterators hold a non-owning `Rc` back to it
/// rather than a clone of its credentials.
pub struct Client {
    transport: Box<dyn Transport>,
    resolver: Option<Resolver>,
    credentials: Credentials,
    default_options: RequestOptions,
}

impl Client {
    /// Builds a client from an already-resolved [`Credentials`] snapshot
    /// and an optional resolver for refreshing it.
    pub fn new(credentials: Credentials, resolver: Option<Resolver>) -> Self {
        Client { transport: Box::new(HttpTransport::new()), resolver, credentials, default_options: RequestOptions::default() }
    }

    /// Swaps in a different [`Transport`] implementation (used by tests to
    /// drive the Watch/List state machines against a mock double).
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Overrides the client-level request option defaults.
    pub fn with_default_options(mut self, options: RequestOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Tries in-cluster discovery, then kubeconfig inference
    /// (`$KUBECONFIG`, then `$HOME/.kube/config`), mirroring the teacher's
    /// `Config::infer` preference order.
    pub fn infer() -> Result<Self> {
        Self::infer_from(None, None)
    }

    /// As [`Client::infer`], but with an explicit kubeconfig path and/or context name.
    pub fn infer_from(kubeconfig_path: Option<&Path>, context_name: Option<&str>) -> Result<Self> {
        let (credentials, auth) = config::infer(kubeconfig_path, context_name)?;
        let resolver = auth.map(|(auth_info, config_dir)| Resolver::new(auth_info, config_dir));
        Ok(Self::new(credentials, resolver))
    }

    fn snapshot_credentials(&mut self) -> Result<()> {
        if let Some(resolver) = &self.resolver {
            resolver.snapshot(&mut self.credentials)?;
        }
        Ok(())
    }

    /// Issues a one-shot request, refreshing credentials first if needed.
    pub fn request(
        &mut self,
        endpoint: &str,
        verb: Verb,
        query: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<ResponseBody> {
        self.snapshot_credentials()?;
        self.transport.request(endpoint, verb, query, body, &self.credentials)
    }

    /// As [`Client::request`], but JSON-decodes the body (or returns `null`
    /// when `options` resolves `decode_response` to `false`).
    pub fn request_json(
        &mut self,
        endpoint: &str,
        verb: Verb,
        query: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<Value> {
        self.request_json_with(endpoint, verb, query, body, RequestOptions::default())
    }

    /// As [`Client::request_json`], with a call-site [`RequestOptions`] override.
    pub fn request_json_with(
        &mut self,
        endpoint: &str,
        verb: Verb,
        query: &[(String, String)],
        body: Option<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<Value> {
        let decode = RequestOptions::resolve_decode_response(options.decode_response, self.default_options.decode_response);
        let resp = self.request(endpoint, verb, query, body)?;
        if !decode {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&resp.bytes)?)
    }

    pub(crate) fn open_watch_stream(
        &mut self,
        endpoint: &str,
        query: &[(String, String)],
        read_timeout: Duration,
    ) -> Result<Box<dyn WatchRead>> {
        self.snapshot_credentials()?;
        self.transport.open_stream(endpoint, query, &self.credentials, read_timeout)
    }

    /// Creates a [`Watch`] bound to `client`, which must be shared via
    /// `Rc<RefCell<Client>>` since a watch and its owning client are used
    /// across multiple calls in the same thread.
    pub fn create_watch(client: &Rc<RefCell<Client>>, config: WatchConfig) -> Watch {
        Watch::new(Rc::clone(client), config)
    }

    /// Materializes a paged list into one merged document, paging via
    /// `continue` until exhausted or `max_pages` is reached (see
    /// [`crate::list::get`] for the documented off-by-one in the cap).
    pub fn create_list(
        client: &Rc<RefCell<Client>>,
        endpoint: impl Into<String>,
        query: Vec<(String, String)>,
        max_pages: u64,
    ) -> Result<Value> {
        crate::list::get(client, &endpoint.into(), &query, max_pages)
    }

    /// A lazy, item-at-a-time view over a paged list; see [`crate::list::stream`].
    pub fn create_list_stream(
        client: &Rc<RefCell<Client>>,
        endpoint: impl Into<String>,
        query: Vec<(String, String)>,
    ) -> ListIter {
        crate::list::stream(Rc::clone(client), endpoint.into(), query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_response_resolution_prefers_call_site_then_client_default_then_true() {
        assert!(RequestOptions::resolve_decode_response(None, None));
        assert!(!RequestOptions::resolve_decode_response(None, Some(false)));
        assert!(RequestOptions::resolve_decode_response(Some(true), Some(false)));
    }
}
