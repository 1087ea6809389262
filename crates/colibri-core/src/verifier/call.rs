//! Call verification: every account, storage slot, and code blob the call
//! touches is proven against the verified state root; the claimed output is
//! returned bound to that witness set. Re-executing the EVM is out of
//! scope, and the binding is documented as such.

use alloy_primitives::B256;
use serde_json::Value;

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::primitives::hash::keccak256;
use crate::primitives::json as json_util;
use crate::ssz::SszView;

use super::account::verify_account_leaf;
use super::beacon::{u64_leaf, verify_anchor, verify_exec_fields};
use super::VerifierCtx;

pub fn verify(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let state_root = view.field("state_root")?.as_b256()?;
    let block_number = view.field("block_number")?.as_u64()?;
    let block_hash = view.field("block_hash")?.as_b256()?;

    let skip_signature = ctx.hash_is_trusted(&block_hash);
    let data_header = verify_anchor(ctx, spec, &view.field("anchor")?, skip_signature)?;
    verify_exec_fields(
        spec,
        &data_header,
        &[
            ("state_root", state_root),
            ("block_number", u64_leaf(block_number)),
            ("block_hash", block_hash),
        ],
        &[],
        &view.field("exec_witnesses")?,
    )?;

    let call = ctx.arg(0)?.clone();
    let accounts = view.field("accounts")?;
    let mut proven = Vec::with_capacity(accounts.len()?);
    for i in 0..accounts.len()? {
        let witness = accounts.at(i)?;
        let address =
            alloy_primitives::Address::from_slice(witness.field("address")?.as_bytes());
        let account = verify_account_leaf(&state_root, &address, &witness)?;

        // Every storage slot the prover shipped must verify.
        let storage = witness.field("storage")?;
        for s in 0..storage.len()? {
            let slot = storage.at(s)?.field("key")?.as_b256()?;
            super::account::verify_storage_leaf(&witness, &account, &slot)?;
        }

        // Shipped code must be the preimage of the proven hash.
        if let Some(code) = witness.field("code")?.union_value()? {
            if B256::from(keccak256(code.as_bytes())) != account.code_hash {
                return Err(Error::IntegrityMismatch(
                    "code preimage does not hash to the proven code hash".into(),
                )
                .into());
            }
        }
        proven.push(address);
    }

    // The call's own parties must be inside the proven set.
    for key in ["from", "to"] {
        if let Some(value) = call.get(key) {
            if value.is_null() {
                continue;
            }
            let address = json_util::address(value)?;
            if !proven.contains(&address) {
                return Err(Error::proof(format!(
                    "touched account {address} is missing from the witness set"
                ))
                .into());
            }
        }
    }

    // Without an EVM the result cannot be recomputed; the claim is the
    // result, now bound to a fully verified witness set.
    let result = claimed.ok_or_else(|| {
        Error::input("call proofs carry their result in the data union".to_string())
    })?;
    if ctx.method() == "eth_estimateGas" && !result.is_string() {
        return Err(Error::IntegrityMismatch("gas estimate is not a quantity".into()).into());
    }
    Ok(result)
}
