use std::sync::Arc;

use alloy_primitives::B256;

use crate::beacon::{
    self, current_sync_committee_gindex, next_sync_committee_gindex, signing_root, Header,
};
use crate::chains::{ChainSpec, DOMAIN_SYNC_COMMITTEE};
use crate::error::Error;
use crate::ssz::{verify_single_proof, SszView};

use super::committee::{verify_sync_aggregate, SyncCommittee};
use super::state::SyncStore;

/// Install the committee of a trusted checkpoint block from a
/// `LightClientBootstrap`.
///
/// The bootstrap's header root must equal the trusted root, and its current
/// sync committee must hash into the header's state root at the fork's
/// committee gindex. This is the single moment of social trust; everything
/// after it is cryptographic.
pub fn apply_bootstrap(
    spec: &ChainSpec,
    store: &mut SyncStore,
    trusted_root: B256,
    bootstrap: &SszView<'_>,
) -> Result<u64, Error> {
    let header_view = bootstrap.field("header")?.field("beacon")?;
    let header = Header::from_view(&header_view)?;
    let header_root = header.root();
    if header_root != trusted_root {
        return Err(Error::proof(format!(
            "bootstrap header root {header_root} does not match trusted checkpoint {trusted_root}"
        )));
    }

    let committee = SyncCommittee::from_view(&bootstrap.field("current_sync_committee")?)?;
    let branch = read_branch(&bootstrap.field("current_sync_committee_branch")?)?;
    let (fork, _) = spec.fork_at_slot(header.slot);
    let leaf = committee.tree_root()?;
    if !verify_single_proof(
        &leaf.0,
        current_sync_committee_gindex(fork),
        &branch,
        &header.state_root.0,
    ) {
        return Err(Error::proof(
            "current sync committee branch does not reach the checkpoint state root",
        ));
    }

    let period = spec.period(header.slot);
    store.put_committee(period, Arc::new(committee));
    log::debug!(
        "chain {}: bootstrapped committee for period {period}",
        spec.chain_id
    );
    Ok(period)
}

/// Consume one `LightClientUpdate`, extending coverage by one period.
///
/// The update's sync aggregate must be signed by the committee already known
/// for the signature slot's period; the attested state then vouches for the
/// next committee via its Merkle branch. Returns the newly covered period.
pub fn apply_update(
    spec: &ChainSpec,
    store: &mut SyncStore,
    update: &SszView<'_>,
) -> Result<u64, Error> {
    let attested_view = update.field("attested_header")?.field("beacon")?;
    let attested = Header::from_view(&attested_view)?;
    let signature_slot = update.field("signature_slot")?.as_u64()?;
    if signature_slot <= attested.slot {
        return Err(Error::proof(format!(
            "signature slot {signature_slot} not after attested slot {}",
            attested.slot
        )));
    }

    let signature_period = spec.period(signature_slot);
    let Some(committee) = store.committee(signature_period) else {
        return Err(Error::SyncGap(format!(
            "no committee known for period {signature_period}"
        )));
    };

    // The attested state commits to the next committee.
    let next_committee = SyncCommittee::from_view(&update.field("next_sync_committee")?)?;
    let branch = read_branch(&update.field("next_sync_committee_branch")?)?;
    let (attested_fork, _) = spec.fork_at_slot(attested.slot);
    let leaf = next_committee.tree_root()?;
    if !verify_single_proof(
        &leaf.0,
        next_sync_committee_gindex(attested_fork),
        &branch,
        &attested.state_root.0,
    ) {
        return Err(Error::proof(
            "next sync committee branch does not reach the attested state root",
        ));
    }

    // The known committee signed the attested header.
    let aggregate = update.field("sync_aggregate")?;
    let bits = aggregate.field("sync_committee_bits")?;
    let mut signature = [0u8; 96];
    signature.copy_from_slice(aggregate.field("sync_committee_signature")?.as_bytes());
    let domain = spec.domain(DOMAIN_SYNC_COMMITTEE, spec.epoch(signature_slot));
    let root = signing_root(&attested.root(), &domain);
    verify_sync_aggregate(&committee, bits.as_bytes(), &signature, &root)?;

    let covered = signature_period + 1;
    store.put_committee(covered, Arc::new(next_committee));
    log::debug!(
        "chain {}: update extended coverage to period {covered}",
        spec.chain_id
    );
    Ok(covered)
}

fn read_branch(view: &SszView<'_>) -> Result<Vec<[u8; 32]>, Error> {
    let count = view.len()?;
    let mut branch = Vec::with_capacity(count);
    for i in 0..count {
        branch.push(view.at(i)?.as_b256()?.0);
    }
    Ok(branch)
}
