//! Anchor verification: everything between a proof variant's fields and the
//! sync committee signature that makes them trustworthy.

use std::sync::Arc;

use alloy_primitives::{B256, U256};

use crate::beacon::{body_descriptor, signing_root, Header};
use crate::chains::{ChainSpec, DOMAIN_SYNC_COMMITTEE};
use crate::error::{Error, Exec};
use crate::prover::beacon::historic_gindex;
use crate::request::RequestSpec;
use crate::ssz::{verify_multi_proof, verify_single_proof, SszView};
use crate::sync::{apply_bootstrap, apply_update, verify_sync_aggregate, SyncCommittee, SyncState};

use super::VerifierCtx;

/// How many updates the verifier will fetch on its own to close a gap.
const MAX_FETCHED_UPDATES: u64 = 128;

/// Verify a `BEACON_ANCHOR`: header linkage (direct, chain, or historic
/// branch) plus the sync aggregate over the attested root. Returns the now
/// trusted data header.
///
/// `skip_signature` is the trusted-block-hash fast path: structural links
/// are still checked, only the committee work is elided.
pub fn verify_anchor(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    anchor: &SszView<'_>,
    skip_signature: bool,
) -> Exec<Header> {
    let data_header = Header::from_view(&anchor.field("data_header")?)?;
    let chain = anchor.field("header_chain")?;
    let historic = anchor.field("historic")?.union_value()?;

    let attested = match historic {
        Some(historic_view) => {
            if chain.len()? != 0 {
                return Err(Error::proof(
                    "anchor carries both a header chain and a historic branch",
                )
                .into());
            }
            let attested = Header::from_view(&historic_view.field("attested_header")?)?;
            let witnesses_view = historic_view.field("witnesses")?;
            let mut witnesses = Vec::with_capacity(witnesses_view.len()?);
            for i in 0..witnesses_view.len()? {
                witnesses.push(witnesses_view.at(i)?.as_b256()?.0);
            }
            let gindex = historic_gindex(spec, attested.slot, data_header.slot)?;
            if !verify_single_proof(
                &data_header.root().0,
                gindex,
                &witnesses,
                &attested.state_root.0,
            ) {
                return Err(Error::proof(format!(
                    "historic branch for slot {} does not reach the attested state root",
                    data_header.slot
                ))
                .into());
            }
            attested
        }
        None if chain.len()? > 0 => {
            let mut headers = Vec::with_capacity(chain.len()?);
            for i in 0..chain.len()? {
                headers.push(Header::from_view(&chain.at(i)?)?);
            }
            for pair in headers.windows(2) {
                if pair[0].parent_root != pair[1].root() {
                    return Err(Error::proof("header chain link broken").into());
                }
            }
            let last = headers.last().expect("chain checked non-empty");
            if last.parent_root != data_header.root() {
                return Err(Error::proof(
                    "header chain does not terminate at the data block",
                )
                .into());
            }
            headers[0].clone()
        }
        None => data_header.clone(),
    };

    if skip_signature {
        return Ok(data_header);
    }

    let signature_slot = anchor.field("signature_slot")?.as_u64()?;
    if signature_slot <= attested.slot {
        return Err(Error::proof(format!(
            "signature slot {signature_slot} not after attested slot {}",
            attested.slot
        ))
        .into());
    }

    let committee = ensure_committee(ctx, spec, spec.period(signature_slot))?;
    let aggregate = anchor.field("sync_aggregate")?;
    let bits = aggregate.field("sync_committee_bits")?;
    let mut signature = [0u8; 96];
    signature.copy_from_slice(aggregate.field("sync_committee_signature")?.as_bytes());
    let domain = spec.domain(DOMAIN_SYNC_COMMITTEE, spec.epoch(signature_slot));
    let root = signing_root(&attested.root(), &domain);
    verify_sync_aggregate(&committee, bits.as_bytes(), &signature, &root)?;

    Ok(data_header)
}

/// Committee for `period`, ratcheting forward with self-fetched updates
/// (and a bootstrap when the state is still a bare checkpoint). A period
/// behind the earliest retained committee is a hard gap.
pub fn ensure_committee(
    ctx: &mut VerifierCtx,
    spec: &'static ChainSpec,
    period: u64,
) -> Exec<Arc<SyncCommittee>> {
    if let Some(committee) = ctx.store.committee(period) {
        return Ok(committee);
    }

    if let SyncState::Checkpoint(root) = ctx.store.state().clone() {
        let bytes = ctx.requests.require(RequestSpec::beacon_ssz(format!(
            "eth/v1/beacon/light_client/bootstrap/{root}"
        )))?;
        let (descriptor, _) = super::sync_data::classify_bootstrap(&bytes)?;
        let view = SszView::new(descriptor, &bytes)?;
        apply_bootstrap(spec, &mut ctx.store, root, &view)?;
    }

    let Some(mut covered) = ctx.store.state().max_period() else {
        return Err(Error::SyncGap(format!(
            "no trust anchor available to reach period {period}"
        ))
        .into());
    };
    if period < covered && ctx.store.committee(period).is_none() {
        return Err(Error::SyncGap(format!(
            "period {period} is behind retained coverage ({covered})"
        ))
        .into());
    }
    if period.saturating_sub(covered) > MAX_FETCHED_UPDATES {
        return Err(Error::SyncGap(format!(
            "period {period} is {} periods past coverage",
            period - covered
        ))
        .into());
    }

    while covered < period {
        let bytes = ctx.requests.require(RequestSpec::beacon_ssz(format!(
            "eth/v1/beacon/light_client/updates?start_period={covered}&count=1"
        )))?;
        let (descriptor, _) = super::sync_data::classify_update(&bytes)?;
        let view = SszView::new(descriptor, &bytes)?;
        covered = apply_update(spec, &mut ctx.store, &view)?;
    }

    ctx.store
        .committee(period)
        .ok_or_else(|| Error::SyncGap(format!("period {period} still uncovered")).into())
}

/// Rebuild the body root from claimed payload-field values plus raw
/// transactions, and check it against the data header. The leaf set and
/// witness layout are derived from the same function the prover used, so
/// any disagreement fails closed.
pub fn verify_exec_fields(
    spec: &ChainSpec,
    data_header: &Header,
    payload_leaves: &[(&str, B256)],
    tx_leaves: &[(u64, B256)],
    witnesses_view: &SszView<'_>,
) -> Result<(), Error> {
    use crate::ssz::{gindex_add, resolve_path, PathStep};

    let (fork, _) = spec.fork_at_slot(data_header.slot);
    let body = body_descriptor(fork)?;
    let (payload_g, _) = resolve_path(body, &[PathStep::Field("execution_payload")])?;
    let mut leaves = Vec::with_capacity(payload_leaves.len() + tx_leaves.len());
    for (name, value) in payload_leaves {
        let (g, _) = resolve_path(
            &crate::beacon::EXECUTION_PAYLOAD,
            &[PathStep::Field(name)],
        )?;
        leaves.push((gindex_add(payload_g, g), *value));
    }
    for (index, root) in tx_leaves {
        let (g, _) = resolve_path(
            &crate::beacon::EXECUTION_PAYLOAD,
            &[
                PathStep::Field("transactions"),
                PathStep::Index(*index as usize),
            ],
        )?;
        leaves.push((gindex_add(payload_g, g), *root));
    }
    leaves.sort_unstable_by_key(|(g, _)| *g);
    leaves.dedup();

    let mut witnesses = Vec::with_capacity(witnesses_view.len()?);
    for i in 0..witnesses_view.len()? {
        witnesses.push(witnesses_view.at(i)?.as_b256()?);
    }

    if !verify_multi_proof(&leaves, &witnesses, &data_header.body_root) {
        return Err(Error::proof(
            "execution payload fields do not recompute the body root",
        ));
    }
    Ok(())
}

/// SSZ leaf chunk for a little-endian u64 value.
pub fn u64_leaf(value: u64) -> B256 {
    let mut chunk = [0u8; 32];
    chunk[..8].copy_from_slice(&value.to_le_bytes());
    B256::from(chunk)
}

/// SSZ leaf chunk for a uint256 value.
pub fn u256_leaf(value: &U256) -> B256 {
    B256::from(value.to_le_bytes::<32>())
}

/// Hash-tree-root of one raw transaction as a payload list element.
pub fn tx_leaf(raw_tx: &[u8]) -> Result<B256, Error> {
    Ok(crate::ssz::hash_tree_root(&crate::beacon::TRANSACTION, raw_tx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_encodings() {
        assert_eq!(u64_leaf(1).0[0], 1);
        assert_eq!(u64_leaf(1).0[8..], [0u8; 24]);
        let value = U256::from(0x0102u64);
        assert_eq!(u256_leaf(&value).0[0], 2);
        assert_eq!(u256_leaf(&value).0[1], 1);
    }
}
