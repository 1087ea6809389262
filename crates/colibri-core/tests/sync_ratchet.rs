//! Ratchet completeness: from coverage of one period, a chain of valid
//! updates reaches any later period, and each link is rejected unless it is
//! signed by the committee it extends.

mod support;

use std::sync::Arc;

use alloy_primitives::B256;
use blst::min_pk::SecretKey;

use colibri_core::beacon::{
    signing_root, Header, EXECUTION_PAYLOAD_HEADER, LIGHT_CLIENT_HEADER,
    LIGHT_CLIENT_UPDATE_DENEB,
};
use colibri_core::chains::{ChainSpec, DOMAIN_SYNC_COMMITTEE, MAINNET};
use colibri_core::primitives::hash::sha256_pair;
use colibri_core::ssz::{encode_container, SszType, SszView};
use colibri_core::sync::{apply_update, SyncCommittee, SyncStore};
use support::{build_committee, secret_key, sign_with_committee};

/// First period of the scenario; mainnet Deneb era.
const BASE_PERIOD: u64 = 1060;

fn committee_for(generation: u64) -> (Vec<SecretKey>, SyncCommittee) {
    if generation == 0 {
        return build_committee();
    }
    let secrets: Vec<SecretKey> = (0..512)
        .map(|i| secret_key(i + generation as usize * 512))
        .collect();
    let pubkeys: Vec<[u8; 48]> = secrets.iter().map(|sk| sk.sk_to_pk().to_bytes()).collect();
    let committee = SyncCommittee {
        pubkeys,
        aggregate_pubkey: secrets[0].sk_to_pk().to_bytes(),
    };
    (secrets, committee)
}

/// Synthesize a state root whose tree holds `leaf` at the Deneb
/// next-sync-committee gindex, along with the matching branch.
fn branch_and_root(leaf: &B256, gindex: u64) -> (Vec<u8>, B256) {
    let depth = 63 - gindex.leading_zeros();
    let branch: Vec<[u8; 32]> = (0..depth).map(|i| [i as u8 + 1; 32]).collect();
    let mut node = leaf.0;
    let mut g = gindex;
    for sibling in &branch {
        node = if g & 1 == 1 {
            sha256_pair(sibling, &node)
        } else {
            sha256_pair(&node, sibling)
        };
        g >>= 1;
    }
    let bytes: Vec<u8> = branch.iter().flatten().copied().collect();
    (bytes, B256::from(node))
}

fn zeroed_execution_header() -> Vec<u8> {
    let SszType::Container(fields) = &EXECUTION_PAYLOAD_HEADER else {
        unreachable!()
    };
    let parts: Vec<Vec<u8>> = fields
        .iter()
        .map(|f| vec![0u8; f.ty.fixed_size().unwrap_or(0)])
        .collect();
    let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
    encode_container(&EXECUTION_PAYLOAD_HEADER, &refs).unwrap()
}

fn encode_lc_header(header: &Header) -> Vec<u8> {
    encode_container(
        &LIGHT_CLIENT_HEADER,
        &[&header.to_ssz(), &zeroed_execution_header(), &[0u8; 128]],
    )
    .unwrap()
}

/// One update: committee of `signature_period` signs an attested header
/// whose state vouches for `next_committee`.
fn build_update(
    spec: &ChainSpec,
    signers: &[SecretKey],
    signature_period: u64,
    next_committee: &SyncCommittee,
) -> Vec<u8> {
    let signature_slot = spec.first_slot_of_period(signature_period) + 200;
    let leaf = next_committee.tree_root().unwrap();
    let (branch, state_root) = branch_and_root(&leaf, 55);
    let attested = Header {
        slot: signature_slot - 1,
        proposer_index: 11,
        parent_root: B256::repeat_byte(0x21),
        state_root,
        body_root: B256::repeat_byte(0x22),
    };
    let finalized = Header {
        slot: attested.slot - 64,
        proposer_index: 11,
        parent_root: B256::ZERO,
        state_root: B256::ZERO,
        body_root: B256::ZERO,
    };

    let domain = spec.domain(DOMAIN_SYNC_COMMITTEE, spec.epoch(signature_slot));
    let root = signing_root(&attested.root(), &domain);
    let (bits, signature) = sign_with_committee(signers, 430, &root);
    let mut aggregate = Vec::with_capacity(160);
    aggregate.extend_from_slice(&bits);
    aggregate.extend_from_slice(&signature);

    encode_container(
        &LIGHT_CLIENT_UPDATE_DENEB,
        &[
            &encode_lc_header(&attested),
            &next_committee.to_ssz(),
            &branch,
            &encode_lc_header(&finalized),
            &[0u8; 192], // finality branch, unused by the ratchet
            &aggregate,
            &signature_slot.to_le_bytes(),
        ],
    )
    .unwrap()
}

#[test]
fn update_chain_reaches_any_later_period() {
    let spec = ChainSpec::get(MAINNET).unwrap();
    let mut store = SyncStore::load(MAINNET);

    // Coverage starts at BASE_PERIOD.
    let (mut signers, base_committee) = committee_for(0);
    store.put_committee(BASE_PERIOD, Arc::new(base_committee));

    // Three links: p -> p+1 -> p+2 -> p+3.
    for step in 0..3u64 {
        let (next_signers, next_committee) = committee_for(step + 1);
        let update = build_update(spec, &signers, BASE_PERIOD + step, &next_committee);
        let view = SszView::new(&LIGHT_CLIENT_UPDATE_DENEB, &update).unwrap();
        let covered = apply_update(spec, &mut store, &view).unwrap();
        assert_eq!(covered, BASE_PERIOD + step + 1);
        signers = next_signers;
    }

    for period in BASE_PERIOD..=BASE_PERIOD + 3 {
        assert!(
            store.state().knows_period(period),
            "period {period} missing from {:?}",
            store.state()
        );
    }
}

#[test]
fn update_signed_by_wrong_committee_is_rejected() {
    let spec = ChainSpec::get(MAINNET).unwrap();
    let mut store = SyncStore::load(MAINNET);

    let (_, base_committee) = committee_for(0);
    store.put_committee(BASE_PERIOD + 10, Arc::new(base_committee));

    // Signed by a committee the store has never checked.
    let (foreign_signers, _) = committee_for(7);
    let (_, next_committee) = committee_for(8);
    let update = build_update(spec, &foreign_signers, BASE_PERIOD + 10, &next_committee);
    let view = SszView::new(&LIGHT_CLIENT_UPDATE_DENEB, &update).unwrap();
    let error = apply_update(spec, &mut store, &view).unwrap_err();
    assert!(error.to_string().starts_with("signature invalid"));
}

#[test]
fn update_for_uncovered_period_is_a_gap() {
    let spec = ChainSpec::get(MAINNET).unwrap();
    let mut store = SyncStore::load(MAINNET);

    let (signers, _) = committee_for(0);
    let (_, next_committee) = committee_for(1);
    // Nothing was ever installed for this period.
    let update = build_update(spec, &signers, BASE_PERIOD + 20, &next_committee);
    let view = SszView::new(&LIGHT_CLIENT_UPDATE_DENEB, &update).unwrap();
    let error = apply_update(spec, &mut store, &view).unwrap_err();
    assert!(error.to_string().starts_with("sync gap"));
}

#[test]
fn tampered_committee_branch_is_rejected() {
    let spec = ChainSpec::get(MAINNET).unwrap();
    let mut store = SyncStore::load(MAINNET);

    let (signers, base_committee) = committee_for(0);
    store.put_committee(BASE_PERIOD + 30, Arc::new(base_committee));

    let (_, next_committee) = committee_for(2);
    let mut update = build_update(spec, &signers, BASE_PERIOD + 30, &next_committee);
    // Swap one committee key after the branch was computed.
    let tamper_offset = update.len() / 2;
    update[tamper_offset] ^= 0xFF;
    if let Ok(view) = SszView::new(&LIGHT_CLIENT_UPDATE_DENEB, &update) {
        assert!(apply_update(spec, &mut store, &view).is_err());
    }
}
