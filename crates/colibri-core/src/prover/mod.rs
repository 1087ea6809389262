//! The prover engine.
//!
//! A [`ProverCtx`] is created per RPC request and driven to completion by
//! repeated `execute` calls: each pass re-enters the method's proof builder
//! from the top, short-circuits everything already fetched through the
//! request table's fingerprints, and either finishes with serialized proof
//! bytes or suspends with a fresh batch of data requests.

pub mod account;
pub mod beacon;
pub mod block;
pub mod call;
pub mod logs;
pub mod receipt;
pub mod sync;
pub mod tx;
pub mod witness;

use serde_json::Value;

use crate::api::Status;
use crate::cache::CtxCache;
use crate::chains::ChainSpec;
use crate::error::{Error, Exec, Interrupt};
use crate::request::RequestTable;

/// Prover flag bits. Unknown bits are reserved and ignored.
pub mod flags {
    /// Include contract code preimages in account proofs.
    pub const INCLUDE_CODE: u32 = 1;
    /// Include the untrusted RPC answer in the `data` union.
    pub const INCLUDE_DATA: u32 = 1 << 1;
    /// Attach bootstrap/updates so the verifier can extend its coverage.
    pub const INCLUDE_SYNC: u32 = 1 << 2;
    /// The verifier shares this process's chain store; sync data can start
    /// from its recorded periods instead of the trusted checkpoint.
    pub const CHAIN_STORE_AVAILABLE: u32 = 1 << 3;
}

pub struct ProverCtx {
    pub(crate) method: String,
    pub(crate) params: Value,
    pub(crate) chain_id: u64,
    pub(crate) flags: u32,
    pub(crate) requests: RequestTable,
    pub(crate) cache: CtxCache,
    proof: Option<Vec<u8>>,
    error: Option<String>,
}

impl ProverCtx {
    /// Validate inputs and build an idle context; nothing is fetched yet.
    pub fn new(method: &str, params_json: &str, chain_id: u64, flags: u32) -> Result<Self, Error> {
        let params: Value = serde_json::from_str(params_json)
            .map_err(|e| Error::input(format!("params JSON: {e}")))?;
        if !params.is_array() {
            return Err(Error::input("params must be a JSON array"));
        }
        ChainSpec::get(chain_id)?;
        Ok(ProverCtx {
            method: method.to_string(),
            params,
            chain_id,
            flags,
            requests: RequestTable::new(),
            cache: CtxCache::new(),
            proof: None,
            error: None,
        })
    }

    pub fn flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub(crate) fn param(&self, index: usize) -> Result<&Value, Error> {
        self.params
            .get(index)
            .ok_or_else(|| Error::input(format!("missing parameter {index} for {}", self.method)))
    }

    pub(crate) fn param_opt(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }

    /// Advance the state machine one step.
    pub fn execute(&mut self) -> Status {
        if let Some(proof) = &self.proof {
            return Status::success_proof(proof.clone());
        }
        if let Some(error) = &self.error {
            return Status::Error {
                error: error.clone(),
            };
        }

        let spec = match ChainSpec::get(self.chain_id) {
            Ok(spec) => spec,
            Err(e) => {
                self.error = Some(e.to_string());
                return Status::Error {
                    error: e.to_string(),
                };
            }
        };

        match dispatch(self, spec) {
            Ok(proof) => {
                log::debug!("{}: proof ready ({} bytes)", self.method, proof.len());
                self.proof = Some(proof.clone());
                Status::success_proof(proof)
            }
            Err(Interrupt::Pending) => Status::pending_from(&self.requests, self.chain_id),
            Err(Interrupt::Failure(e)) => {
                self.error = Some(e.to_string());
                Status::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    /// The serialized proof; only present after a successful `execute`.
    pub fn proof(&self) -> Option<&[u8]> {
        self.proof.as_deref()
    }

    pub fn requests_mut(&mut self) -> &mut RequestTable {
        &mut self.requests
    }

    /// Release everything owned by the context, promoting TTL-carrying
    /// cache entries to the process cache.
    pub fn destroy(self) {
        self.cache.promote_to_global();
    }
}

fn dispatch(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    match ctx.method.as_str() {
        "eth_getBalance" | "eth_getCode" | "eth_getStorageAt" | "eth_getProof" => {
            account::prove(ctx, spec)
        }
        "eth_getTransactionByHash"
        | "eth_getTransactionByBlockHashAndIndex"
        | "eth_getTransactionByBlockNumberAndIndex" => tx::prove(ctx, spec),
        "eth_getTransactionReceipt" => receipt::prove(ctx, spec),
        "eth_getLogs" => logs::prove(ctx, spec),
        "eth_getBlockByHash" | "eth_getBlockByNumber" => block::prove(ctx, spec),
        "eth_blockNumber" => block::prove_block_number(ctx, spec),
        "eth_call" | "eth_estimateGas" => call::prove(ctx, spec),
        "getSyncData" => sync::prove(ctx, spec),
        "c4_witness" => witness::prove(ctx, spec),
        other => Err(Error::input(format!("method {other} is not proofable")).into()),
    }
}
