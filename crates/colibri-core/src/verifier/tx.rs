//! Transaction verification: the raw bytes are multiproven as
//! `transactions[i]`, then decoded and re-shaped into the RPC object — the
//! sender comes out of signature recovery, not out of the proof.

use serde_json::Value;

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::ethtx;
use crate::primitives::json as json_util;
use crate::ssz::SszView;

use super::beacon::{tx_leaf, u256_leaf, u64_leaf, verify_anchor, verify_exec_fields};
use super::{enforce_claim, VerifierCtx};

pub fn verify(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    view: &SszView<'_>,
    claimed: Option<Value>,
) -> Exec<Value> {
    let block_number = view.field("block_number")?.as_u64()?;
    let block_hash = view.field("block_hash")?.as_b256()?;
    let base_fee = view.field("base_fee_per_gas")?.as_u256()?;
    let tx_index = view.field("tx_index")?.as_u64()?;
    let raw_tx = view.field("raw_tx")?.as_bytes().to_vec();

    let skip_signature = ctx.hash_is_trusted(&block_hash);
    let data_header = verify_anchor(ctx, spec, &view.field("anchor")?, skip_signature)?;
    verify_exec_fields(
        spec,
        &data_header,
        &[
            ("block_number", u64_leaf(block_number)),
            ("block_hash", block_hash),
            ("base_fee_per_gas", u256_leaf(&base_fee)),
        ],
        &[(tx_index, tx_leaf(&raw_tx)?)],
        &view.field("exec_witnesses")?,
    )?;

    let decoded = ethtx::decode_transaction(&raw_tx)?;

    // Bind the proof back to what the caller actually asked for.
    match ctx.method() {
        "eth_getTransactionByHash" => {
            let wanted = json_util::b256(ctx.arg(0)?)?;
            if decoded.hash != wanted {
                return Err(Error::IntegrityMismatch(format!(
                    "proof covers {}, request was for {wanted}",
                    decoded.hash
                ))
                .into());
            }
        }
        "eth_getTransactionByBlockHashAndIndex" => {
            let wanted = json_util::b256(ctx.arg(0)?)?;
            if block_hash != wanted {
                return Err(Error::IntegrityMismatch("wrong block hash proven".into()).into());
            }
            check_index(ctx, tx_index)?;
        }
        "eth_getTransactionByBlockNumberAndIndex" => {
            if let Ok(wanted) = json_util::quantity_u64(ctx.arg(0)?) {
                if block_number != wanted {
                    return Err(
                        Error::IntegrityMismatch("wrong block number proven".into()).into()
                    );
                }
            }
            check_index(ctx, tx_index)?;
        }
        other => return Err(Error::input(format!("unexpected method {other}")).into()),
    }

    let result = decoded.to_rpc_json(&block_hash, block_number, tx_index, &base_fee);
    enforce_claim(claimed.as_ref(), &result)?;
    Ok(result)
}

fn check_index(ctx: &VerifierCtx, proven: u64) -> Result<(), Error> {
    let wanted = json_util::quantity_u64(ctx.arg(1)?)?;
    if proven != wanted {
        return Err(Error::IntegrityMismatch(format!(
            "proof covers index {proven}, request was for {wanted}"
        )));
    }
    Ok(())
}
