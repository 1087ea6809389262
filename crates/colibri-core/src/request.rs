//! Outstanding data requests for one context.
//!
//! Every site that needs external data goes through [`RequestTable::require`]
//! with a deterministic fingerprint: a fulfilled entry returns synchronously,
//! a pending or newly registered one suspends the state machine. Re-entering
//! `execute` replays the same fingerprints, so completed work short-circuits
//! and the table never holds two wire requests for the same URL/body.

use std::sync::Arc;

use alloy_primitives::B256;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Exec, Interrupt};
use crate::primitives::hash::sha256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Json,
    Ssz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    BeaconApi,
    EthRpc,
    RestApi,
    Checkpointz,
    /// Resolved inside the process (signer hooks, chain store); never
    /// surfaced to the host as a wire request.
    Intern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// What to fetch, before it is registered in the table.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub transport: TransportType,
    pub encoding: Encoding,
    pub method: HttpMethod,
    pub url: String,
    pub payload: Option<Vec<u8>>,
    /// Seconds the response stays coherent; 0 = immutable data.
    pub ttl: u64,
    /// Bitmask of client implementations preferred to answer this.
    pub preferred_client: u16,
}

impl RequestSpec {
    /// JSON GET against the beacon REST API.
    pub fn beacon_json(url: impl Into<String>) -> Self {
        RequestSpec {
            transport: TransportType::BeaconApi,
            encoding: Encoding::Json,
            method: HttpMethod::Get,
            url: url.into(),
            payload: None,
            ttl: 0,
            preferred_client: 0,
        }
    }

    /// SSZ GET against the beacon REST API.
    pub fn beacon_ssz(url: impl Into<String>) -> Self {
        RequestSpec {
            encoding: Encoding::Ssz,
            ..RequestSpec::beacon_json(url)
        }
    }

    /// JSON-RPC POST against the execution layer. The envelope is built
    /// here so equal calls always fingerprint equally.
    pub fn eth_rpc(method: &str, params: &Value) -> Self {
        let envelope = format!(
            "{{\"jsonrpc\":\"2.0\",\"method\":\"{}\",\"params\":{},\"id\":1}}",
            method, params
        );
        RequestSpec {
            transport: TransportType::EthRpc,
            encoding: Encoding::Json,
            method: HttpMethod::Post,
            url: String::new(),
            payload: Some(envelope.into_bytes()),
            ttl: 0,
            preferred_client: 0,
        }
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Content fingerprint: the RPC envelope when there is a payload, the
    /// URL otherwise.
    pub fn fingerprint(&self) -> B256 {
        match &self.payload {
            Some(payload) => B256::from(sha256(payload)),
            None => B256::from(sha256(self.url.as_bytes())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestState {
    Pending,
    Fulfilled { body: Arc<Vec<u8>>, node_index: u16 },
    Failed { error: String, node_index: u16 },
}

/// A registered request, pinned in the table for the context's lifetime and
/// addressed by its fingerprint.
#[derive(Debug)]
pub struct DataRequest {
    pub id: B256,
    pub spec: RequestSpec,
    pub exclude_mask: u16,
    pub state: RequestState,
}

#[derive(Default)]
pub struct RequestTable {
    entries: Vec<DataRequest>,
}

impl RequestTable {
    pub fn new() -> Self {
        RequestTable::default()
    }

    /// Return the response for this spec, or suspend.
    ///
    /// A failed entry whose error is retryable is re-enqueued with the
    /// answering node excluded; once all 16 exclusion bits are set the
    /// failure surfaces as [`Error::FetchFailed`].
    pub fn require(&mut self, spec: RequestSpec) -> Exec<Arc<Vec<u8>>> {
        let id = spec.fingerprint();
        match self.entries.iter_mut().find(|e| e.id == id) {
            None => {
                self.entries.push(DataRequest {
                    id,
                    spec,
                    exclude_mask: 0,
                    state: RequestState::Pending,
                });
                Err(Interrupt::Pending)
            }
            Some(entry) => match &entry.state {
                RequestState::Pending => Err(Interrupt::Pending),
                RequestState::Fulfilled { body, .. } => Ok(body.clone()),
                RequestState::Failed { error, node_index } => {
                    let error = error.clone();
                    let node_index = *node_index;
                    if !is_retryable(&error) {
                        return Err(Error::FetchFailed(error).into());
                    }
                    // Exclude the node that just failed, then check whether
                    // anyone is left to ask.
                    entry.exclude_mask |= 1u16 << (node_index % 16);
                    if entry.exclude_mask == u16::MAX {
                        return Err(Error::FetchFailed(error).into());
                    }
                    log::warn!(
                        "retrying request {} without node {}",
                        entry.spec.url,
                        node_index
                    );
                    entry.state = RequestState::Pending;
                    Err(Interrupt::Pending)
                }
            },
        }
    }

    /// Like [`Self::require`] but parses the body as JSON and surfaces
    /// JSON-RPC error objects as retryable failures.
    pub fn require_json(&mut self, spec: RequestSpec) -> Exec<Value> {
        let id = spec.fingerprint();
        let body = self.require(spec)?;
        let parsed: Value = serde_json::from_slice(&body)
            .map_err(|e| Error::decode(format!("response JSON: {e}")))?;
        if let Some(error) = parsed.get("error") {
            // Feed the RPC-level error back through the retry machinery.
            let message = error.to_string();
            let node = self.node_index(&id);
            self.set_error(&id, &message, node);
            return match self.require(self.spec_of(&id)) {
                Err(i) => Err(i),
                Ok(_) => Err(Error::FetchFailed(message).into()),
            };
        }
        match parsed {
            Value::Object(mut map) => match map.remove("result").or_else(|| map.remove("data")) {
                Some(result) => Ok(result),
                None => Ok(Value::Object(map)),
            },
            other => Ok(other),
        }
    }

    fn node_index(&self, id: &B256) -> u16 {
        self.entries
            .iter()
            .find(|e| e.id == *id)
            .map(|e| match e.state {
                RequestState::Fulfilled { node_index, .. } => node_index,
                RequestState::Failed { node_index, .. } => node_index,
                RequestState::Pending => 0,
            })
            .unwrap_or(0)
    }

    fn spec_of(&self, id: &B256) -> RequestSpec {
        self.entries
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.spec.clone())
            .expect("spec_of called for a registered id")
    }

    /// Requests awaiting host fulfilment.
    pub fn pending(&self) -> impl Iterator<Item = &DataRequest> {
        self.entries
            .iter()
            .filter(|e| matches!(e.state, RequestState::Pending))
    }

    pub fn has_pending(&self) -> bool {
        self.pending().next().is_some()
    }

    /// Resolve the opaque pointer handed to the host back to a fingerprint.
    pub fn find_by_ptr(&self, req_ptr: u64) -> Option<B256> {
        self.entries
            .iter()
            .find(|e| req_ptr_of(&e.id) == req_ptr)
            .map(|e| e.id)
    }

    pub fn set_response(&mut self, id: &B256, body: Vec<u8>, node_index: u16) -> bool {
        match self.entries.iter_mut().find(|e| e.id == *id) {
            Some(entry) => {
                entry.state = RequestState::Fulfilled {
                    body: Arc::new(body),
                    node_index,
                };
                true
            }
            None => false,
        }
    }

    pub fn set_error(&mut self, id: &B256, error: &str, node_index: u16) -> bool {
        match self.entries.iter_mut().find(|e| e.id == *id) {
            Some(entry) => {
                entry.state = RequestState::Failed {
                    error: error.to_string(),
                    node_index,
                };
                true
            }
            None => false,
        }
    }
}

/// The stable opaque id surfaced to hosts as `req_ptr`: the fingerprint's
/// first eight bytes.
pub fn req_ptr_of(id: &B256) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&id[..8]);
    u64::from_le_bytes(buf)
}

/// JSON-RPC invalid-params and explicit retry markers are re-routed to a
/// different node before giving up.
fn is_retryable(error: &str) -> bool {
    error.contains("-32602") || error.starts_with("retry:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> RequestSpec {
        RequestSpec::beacon_json("eth/v1/beacon/headers/head")
    }

    #[test]
    fn duplicate_fingerprints_share_one_pending_slot() {
        let mut table = RequestTable::new();
        assert!(matches!(table.require(spec()), Err(Interrupt::Pending)));
        assert!(matches!(table.require(spec()), Err(Interrupt::Pending)));
        assert_eq!(table.pending().count(), 1);
    }

    #[test]
    fn fulfilment_short_circuits_re_entry() {
        let mut table = RequestTable::new();
        let id = spec().fingerprint();
        let _ = table.require(spec());
        assert!(table.set_response(&id, b"{}".to_vec(), 3));
        let body = table.require(spec()).unwrap();
        assert_eq!(&body[..], b"{}");
        assert_eq!(table.pending().count(), 0);
    }

    #[test]
    fn rpc_and_url_fingerprints_differ_by_content() {
        let a = RequestSpec::eth_rpc("eth_getBalance", &json!(["0xabc", "latest"]));
        let b = RequestSpec::eth_rpc("eth_getBalance", &json!(["0xdef", "latest"]));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn retryable_error_re_enqueues_with_exclusion() {
        let mut table = RequestTable::new();
        let id = spec().fingerprint();
        let _ = table.require(spec());
        table.set_error(&id, "retry: node behind", 2);

        // The failure converts back into a pending request excluding node 2.
        assert!(matches!(table.require(spec()), Err(Interrupt::Pending)));
        let entry = table.pending().next().unwrap();
        assert_eq!(entry.exclude_mask, 1 << 2);
    }

    #[test]
    fn non_retryable_error_is_terminal() {
        let mut table = RequestTable::new();
        let id = spec().fingerprint();
        let _ = table.require(spec());
        table.set_error(&id, "connection refused", 0);
        assert!(matches!(
            table.require(spec()),
            Err(Interrupt::Failure(Error::FetchFailed(_)))
        ));
    }

    #[test]
    fn exhausted_exclusion_mask_surfaces_fetch_failure() {
        let mut table = RequestTable::new();
        let id = spec().fingerprint();
        let _ = table.require(spec());
        for node in 0..16u16 {
            table.set_error(&id, "retry: still behind", node);
            let result = table.require(spec());
            if node < 15 {
                assert!(matches!(result, Err(Interrupt::Pending)), "node {node}");
            } else {
                assert!(matches!(
                    result,
                    Err(Interrupt::Failure(Error::FetchFailed(_)))
                ));
            }
        }
    }

    #[test]
    fn json_rpc_error_objects_are_failures() {
        let mut table = RequestTable::new();
        let spec = RequestSpec::eth_rpc("eth_getProof", &json!(["0xabc", [], "0x1"]));
        let id = spec.fingerprint();
        let _ = table.require(spec.clone());
        let body = json!({"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"pruned"}});
        table.set_response(&id, body.to_string().into_bytes(), 1);
        assert!(matches!(
            table.require_json(spec),
            Err(Interrupt::Failure(Error::FetchFailed(_)))
        ));
    }
}
