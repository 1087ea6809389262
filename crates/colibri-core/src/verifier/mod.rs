//! The verifier engine.
//!
//! A [`VerifierCtx`] consumes a serialized proof request plus the claimed
//! method and args, and either returns the verified result or fails with
//! the first broken link. It never reads wall time and never touches the
//! network itself — missing sync coverage surfaces as data requests for
//! bootstrap/update objects, which the host fulfils like any other fetch.

pub mod account;
pub mod beacon;
pub mod block;
pub mod call;
pub mod logs;
pub mod receipt;
pub mod sync_data;
pub mod tx;
pub mod witness;

use std::sync::Arc;

use alloy_primitives::B256;
use serde_json::Value;

use crate::api::Status;
use crate::chains::ChainSpec;
use crate::error::{Error, Exec, Interrupt};
use crate::proof::{selector, ProofRequest, ENGINE_EXECUTION};
use crate::request::RequestTable;
use crate::sync::SyncStore;

/// What the host already trusts when it creates a verifier.
#[derive(Debug, Clone)]
pub enum TrustedHint {
    /// Fall back to the process checkpoint map / stored sync state.
    None,
    /// A single trusted beacon block root; activates a bootstrap fetch.
    Checkpoint(B256),
    /// Recent execution block hashes trusted outright: proofs for these
    /// blocks skip the signature path entirely.
    BlockHashes(Vec<B256>),
}

pub struct VerifierCtx {
    proof: Arc<Vec<u8>>,
    method: String,
    args: Value,
    chain_id: u64,
    trusted: TrustedHint,
    pub(crate) requests: RequestTable,
    pub(crate) store: SyncStore,
    result: Option<Value>,
    error: Option<String>,
}

impl VerifierCtx {
    pub fn new(
        proof: &[u8],
        method: &str,
        args_json: &str,
        chain_id: u64,
        trusted: TrustedHint,
    ) -> Result<Self, Error> {
        let args: Value = serde_json::from_str(args_json)
            .map_err(|e| Error::input(format!("args JSON: {e}")))?;
        if !args.is_array() {
            return Err(Error::input("args must be a JSON array"));
        }
        ChainSpec::get(chain_id)?;
        let mut store = SyncStore::load(chain_id);
        if let TrustedHint::Checkpoint(root) = &trusted {
            if store.state().max_period().is_none() {
                store.set_checkpoint(*root);
            }
        }
        Ok(VerifierCtx {
            proof: Arc::new(proof.to_vec()),
            method: method.to_string(),
            args,
            chain_id,
            trusted,
            requests: RequestTable::new(),
            store,
            result: None,
            error: None,
        })
    }

    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn arg(&self, index: usize) -> Result<&Value, Error> {
        self.args
            .get(index)
            .ok_or_else(|| Error::input(format!("missing argument {index} for {}", self.method)))
    }

    pub(crate) fn arg_opt(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Is this execution block hash trusted outright?
    pub(crate) fn hash_is_trusted(&self, block_hash: &B256) -> bool {
        matches!(&self.trusted, TrustedHint::BlockHashes(hashes) if hashes.contains(block_hash))
    }

    /// Advance the verification state machine one step.
    pub fn execute(&mut self) -> Status {
        if let Some(result) = &self.result {
            return Status::success_result(result.clone());
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

        match run(self, spec) {
            Ok(result) => {
                self.result = Some(result.clone());
                Status::success_result(result)
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

    /// The verified result; only present after a successful `execute`.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn requests_mut(&mut self) -> &mut RequestTable {
        &mut self.requests
    }

    pub fn destroy(self) {}
}

/// The §-ordered verification pipeline; short-circuits on the first broken
/// link.
fn run(ctx: &mut VerifierCtx, spec: &'static ChainSpec) -> Exec<Value> {
    // Methods the verifier answers from the chain spec alone.
    match ctx.method.as_str() {
        "eth_chainId" => {
            return Ok(Value::String(crate::primitives::json::format_quantity(
                spec.chain_id,
            )))
        }
        "net_version" => return Ok(Value::String(spec.chain_id.to_string())),
        _ => {}
    }

    let bytes = ctx.proof.clone();
    let request = ProofRequest::parse(&bytes)?;
    if request.chain_engine()? != ENGINE_EXECUTION {
        return Err(Error::input(format!(
            "chain engine {} does not serve chain {}",
            request.chain_engine()?,
            spec.chain_id
        ))
        .into());
    }

    // Extend local committee coverage with whatever the proof brought.
    if let Some(sync_view) = request.sync_data_value()? {
        sync_data::consume(ctx, spec, &sync_view)?;
    }

    let claimed = request.claimed_data()?;
    let proof_selector = request.proof_selector()?;
    let proof_view = request.proof_value()?;

    let result = match (proof_selector, proof_view) {
        (selector::ACCOUNT, Some(view)) => account::verify(ctx, spec, &view, claimed)?,
        (selector::TRANSACTION, Some(view)) => tx::verify(ctx, spec, &view, claimed)?,
        (selector::RECEIPT, Some(view)) => receipt::verify(ctx, spec, &view, claimed)?,
        (selector::LOGS, Some(view)) => logs::verify(ctx, spec, &view, claimed)?,
        (selector::BLOCK, Some(view)) => block::verify(ctx, spec, &view, claimed)?,
        (selector::BLOCK_NUMBER, Some(view)) => {
            block::verify_block_number(ctx, spec, &view, claimed)?
        }
        (selector::CALL, Some(view)) => call::verify(ctx, spec, &view, claimed)?,
        (selector::SYNC, Some(_)) => Value::Bool(true),
        (selector::WITNESS, Some(view)) => witness::verify(ctx, spec, &view, claimed)?,
        (selector::NONE, _) => {
            return Err(Error::input(format!(
                "method {} needs a proof, none was provided",
                ctx.method
            ))
            .into())
        }
        (other, _) => {
            return Err(Error::decode(format!("unknown proof variant {other}")).into())
        }
    };
    log::debug!("{}: verified", ctx.method);
    Ok(result)
}

/// Read an SSZ list of byte blobs (trie nodes, raw transactions) into owned
/// vectors.
pub(crate) fn node_list(view: &crate::ssz::SszView<'_>) -> Result<Vec<Vec<u8>>, Error> {
    let mut nodes = Vec::with_capacity(view.len()?);
    for i in 0..view.len()? {
        nodes.push(view.at(i)?.as_bytes().to_vec());
    }
    Ok(nodes)
}

/// Cross-check an untrusted claimed result against the derived one. Scalars
/// must match exactly; for objects, every key present on both sides must
/// agree (derived fields the node omitted, or vice versa, are not faulted —
/// formatting differences across client implementations stay out of the
/// trust decision).
pub(crate) fn claimed_matches(claimed: &Value, derived: &Value) -> bool {
    match (claimed, derived) {
        (Value::Object(c), Value::Object(d)) => c
            .iter()
            .all(|(key, cv)| d.get(key).map(|dv| claimed_matches(cv, dv)).unwrap_or(true)),
        (Value::Array(c), Value::Array(d)) => {
            c.len() == d.len() && c.iter().zip(d).all(|(cv, dv)| claimed_matches(cv, dv))
        }
        (Value::String(c), Value::String(d)) => c.eq_ignore_ascii_case(d),
        _ => claimed == derived,
    }
}

/// Enforce the claimed-data cross-check when a claim is present.
pub(crate) fn enforce_claim(claimed: Option<&Value>, derived: &Value) -> Result<(), Error> {
    match claimed {
        Some(claim) if !claimed_matches(claim, derived) => Err(Error::IntegrityMismatch(
            "claimed result disagrees with the proven one".into(),
        )),
        _ => Ok(()),
    }
}
