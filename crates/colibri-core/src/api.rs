//! The language-neutral context API: create, execute, fulfil, destroy —
//! plus the JSON status shapes hosts relay verbatim and the method support
//! classification.

use alloy_primitives::B256;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::prover::ProverCtx;
use crate::request::{req_ptr_of, Encoding, HttpMethod, RequestTable, TransportType};
use crate::verifier::{TrustedHint, VerifierCtx};

/// One pending request as surfaced to the host.
#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    pub req_ptr: u64,
    pub chain_id: u64,
    #[serde(rename = "type")]
    pub transport: TransportType,
    pub encoding: Encoding,
    pub method: HttpMethod,
    pub url: String,
    pub payload: Option<Value>,
    pub exclude_mask: u16,
    pub preferred_client_type: u16,
}

/// Outcome of one `execute` step, serializing to the wire JSON shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Status {
    Success { result: Value, result_len: u32 },
    Error { error: String },
    Pending { requests: Vec<PendingRequest> },
}

impl Status {
    /// Prover success: the proof travels as a hex pointer plus length.
    pub fn success_proof(proof: Vec<u8>) -> Status {
        Status::Success {
            result_len: proof.len() as u32,
            result: Value::String(format!("0x{}", hex::encode(&proof))),
        }
    }

    /// Verifier success: the result JSON inline.
    pub fn success_result(result: Value) -> Status {
        let result_len = serde_json::to_string(&result)
            .map(|s| s.len() as u32)
            .unwrap_or(0);
        Status::Success { result, result_len }
    }

    /// Snapshot the table's pending entries. Internal requests never reach
    /// the host.
    pub fn pending_from(requests: &RequestTable, chain_id: u64) -> Status {
        let pending = requests
            .pending()
            .filter(|entry| entry.spec.transport != TransportType::Intern)
            .map(|entry| PendingRequest {
                req_ptr: req_ptr_of(&entry.id),
                chain_id,
                transport: entry.spec.transport,
                encoding: entry.spec.encoding,
                method: entry.spec.method,
                url: entry.spec.url.clone(),
                payload: entry
                    .spec
                    .payload
                    .as_ref()
                    .and_then(|p| serde_json::from_slice(p).ok()),
                exclude_mask: entry.exclude_mask,
                preferred_client_type: entry.spec.preferred_client,
            })
            .collect();
        Status::Pending { requests: pending }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"status":"error","error":"serialization"}"#.to_string())
    }
}

// --- prover surface ---

pub fn create_prover(
    method: &str,
    params_json: &str,
    chain_id: u64,
    flags: u32,
) -> Result<ProverCtx, Error> {
    ProverCtx::new(method, params_json, chain_id, flags)
}

pub fn execute_prover(ctx: &mut ProverCtx) -> Status {
    ctx.execute()
}

pub fn prover_set_response(ctx: &mut ProverCtx, req_ptr: u64, body: Vec<u8>, node_index: u16) -> bool {
    set_response(ctx.requests_mut(), req_ptr, body, node_index)
}

pub fn prover_set_error(ctx: &mut ProverCtx, req_ptr: u64, error: &str, node_index: u16) -> bool {
    set_error(ctx.requests_mut(), req_ptr, error, node_index)
}

/// The serialized proof; valid only after a successful execute.
pub fn get_proof(ctx: &ProverCtx) -> Option<&[u8]> {
    ctx.proof()
}

pub fn destroy_prover(ctx: ProverCtx) {
    ctx.destroy()
}

// --- verifier surface ---

pub fn create_verifier(
    proof: &[u8],
    method: &str,
    args_json: &str,
    chain_id: u64,
    trusted: TrustedHint,
) -> Result<VerifierCtx, Error> {
    VerifierCtx::new(proof, method, args_json, chain_id, trusted)
}

pub fn execute_verifier(ctx: &mut VerifierCtx) -> Status {
    ctx.execute()
}

pub fn verifier_set_response(
    ctx: &mut VerifierCtx,
    req_ptr: u64,
    body: Vec<u8>,
    node_index: u16,
) -> bool {
    set_response(ctx.requests_mut(), req_ptr, body, node_index)
}

pub fn verifier_set_error(
    ctx: &mut VerifierCtx,
    req_ptr: u64,
    error: &str,
    node_index: u16,
) -> bool {
    set_error(ctx.requests_mut(), req_ptr, error, node_index)
}

pub fn destroy_verifier(ctx: VerifierCtx) {
    ctx.destroy()
}

fn set_response(table: &mut RequestTable, req_ptr: u64, body: Vec<u8>, node_index: u16) -> bool {
    match table.find_by_ptr(req_ptr) {
        Some(id) => table.set_response(&id, body, node_index),
        None => false,
    }
}

fn set_error(table: &mut RequestTable, req_ptr: u64, error: &str, node_index: u16) -> bool {
    match table.find_by_ptr(req_ptr) {
        Some(id) => table.set_error(&id, error, node_index),
        None => false,
    }
}

/// Fulfil by raw fingerprint, for hosts that track the full id.
pub fn set_response_by_id(table: &mut RequestTable, id: &B256, body: Vec<u8>, node_index: u16) -> bool {
    table.set_response(id, body, node_index)
}

// --- method classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodSupport {
    /// A cryptographic proof can cover the answer.
    Proofable,
    /// Mempool/mining state with nothing to prove against.
    Unproofable,
    /// Answered locally from the chain spec with an empty proof.
    Local,
    Unsupported,
}

pub fn method_support(chain_id: u64, method: &str) -> MethodSupport {
    if crate::chains::ChainSpec::get(chain_id).is_err() {
        return MethodSupport::Unsupported;
    }
    match method {
        "eth_getBalance"
        | "eth_getCode"
        | "eth_getStorageAt"
        | "eth_getProof"
        | "eth_getTransactionByHash"
        | "eth_getTransactionByBlockHashAndIndex"
        | "eth_getTransactionByBlockNumberAndIndex"
        | "eth_getTransactionReceipt"
        | "eth_getLogs"
        | "eth_getBlockByHash"
        | "eth_getBlockByNumber"
        | "eth_blockNumber"
        | "eth_call"
        | "eth_estimateGas"
        | "getSyncData"
        | "c4_witness" => MethodSupport::Proofable,
        "eth_chainId" | "net_version" => MethodSupport::Local,
        "eth_gasPrice"
        | "eth_maxPriorityFeePerGas"
        | "eth_blobBaseFee"
        | "eth_sendRawTransaction"
        | "eth_sendTransaction"
        | "eth_accounts"
        | "eth_coinbase"
        | "eth_mining"
        | "eth_hashrate"
        | "eth_syncing"
        | "txpool_content"
        | "txpool_status"
        | "txpool_inspect"
        | "eth_newFilter"
        | "eth_newBlockFilter"
        | "eth_newPendingTransactionFilter"
        | "eth_getFilterChanges"
        | "eth_getFilterLogs"
        | "eth_uninstallFilter" => MethodSupport::Unproofable,
        _ => MethodSupport::Unsupported,
    }
}
