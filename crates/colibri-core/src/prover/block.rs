//! Block proofs: `eth_getBlockByHash`/`eth_getBlockByNumber` ship the whole
//! execution payload pinned to the body root with a single-field branch;
//! `eth_blockNumber` pins just `{blockNumber, timestamp}`.

use crate::chains::ChainSpec;
use crate::error::{Error, Exec};
use crate::proof::{self, selector, sync_selector, BLOCK_NUMBER_PROOF, BLOCK_PROOF};
use crate::ssz::{self, create_proof, resolve_path, PathStep};

use super::beacon::{self, BlockSelector};
use super::{sync, ProverCtx};

/// Fields pinned by an `eth_blockNumber` proof.
pub const BLOCK_NUMBER_FIELDS: [&str; 2] = ["block_number", "timestamp"];

pub fn prove(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    let selector_value = BlockSelector::parse(ctx.param(0)?)?;
    // params[1] (hydrated transactions) changes the result shape only; the
    // proof is identical either way.
    if let Some(flag) = ctx.param_opt(1) {
        if !flag.is_boolean() {
            return Err(Error::input("second parameter must be a boolean").into());
        }
    }

    let anchor = beacon::resolve(ctx, spec, &selector_value)?;
    let data_bytes = anchor.data_block.clone();
    let (message, _) = beacon::message_view(spec, &data_bytes)?;
    let body = message.field("body")?;
    let payload = body.field("execution_payload")?;
    let payload_bytes = payload.as_bytes().to_vec();

    // One branch from the payload subtree to the body root.
    let (payload_g, _) = resolve_path(body.ty(), &[PathStep::Field("execution_payload")])?;
    let witnesses: Vec<alloy_primitives::B256> = create_proof(&body, payload_g)?
        .into_iter()
        .map(alloy_primitives::B256::from)
        .collect();

    let sync_data = sync::sync_data_for(ctx, spec, spec.period(anchor.signature_slot))?;

    let proof_bytes = ssz::encode_container(
        &BLOCK_PROOF,
        &[
            &anchor.encode()?,
            &payload_bytes,
            &proof::encode_b32_list(&witnesses),
        ],
    )?;
    Ok(proof::build_proof_request(
        None,
        selector::BLOCK,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        sync_data.as_deref(),
    )?)
}

pub fn prove_block_number(ctx: &mut ProverCtx, spec: &'static ChainSpec) -> Exec<Vec<u8>> {
    if !ctx.params.as_array().map(Vec::is_empty).unwrap_or(false) {
        return Err(Error::input("eth_blockNumber takes no parameters").into());
    }

    let anchor = beacon::resolve(ctx, spec, &BlockSelector::Latest)?;
    let data_bytes = anchor.data_block.clone();
    let payload = beacon::payload_view(spec, &data_bytes)?;
    let block_number = payload.field("block_number")?.as_u64()?;
    let timestamp = payload.field("timestamp")?.as_u64()?;

    let exec_witnesses =
        beacon::body_witnesses(spec, &data_bytes, &BLOCK_NUMBER_FIELDS, &[])?;
    let sync_data = sync::sync_data_for(ctx, spec, spec.period(anchor.signature_slot))?;

    let proof_bytes = ssz::encode_container(
        &BLOCK_NUMBER_PROOF,
        &[
            &anchor.encode()?,
            &block_number.to_le_bytes(),
            &timestamp.to_le_bytes(),
            &proof::encode_b32_list(&exec_witnesses),
        ],
    )?;
    Ok(proof::build_proof_request(
        None,
        selector::BLOCK_NUMBER,
        &proof_bytes,
        sync_selector::SYNC_DATA,
        sync_data.as_deref(),
    )?)
}
