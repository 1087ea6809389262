//! Consensus-layer SSZ schema: static descriptors for the Deneb and Electra
//! block families, the light-client objects, and the handful of typed views
//! the engines need on top of them.
//!
//! Forks before Deneb carry no `parentBeaconBlockRoot` on the execution side
//! and are out of scope; descriptor lookups reject them.

use alloy_primitives::B256;
use serde_json::Value;

use crate::chains::ForkId;
use crate::error::Error;
use crate::primitives::json;
use crate::ssz::{self, Field, SszType, SszView};

// --- primitive descriptors ---

pub static U8: SszType = SszType::Uint(1);
pub static U64: SszType = SszType::Uint(8);
pub static U256: SszType = SszType::Uint(32);
pub static BYTES4: SszType = SszType::Bytes(4);
pub static BYTES20: SszType = SszType::Bytes(20);
pub static BYTES32: SszType = SszType::Bytes(32);
pub static BYTES48: SszType = SszType::Bytes(48);
pub static BYTES96: SszType = SszType::Bytes(96);
pub static BYTES256: SszType = SszType::Bytes(256);

/// Raw transaction: `List[uint8, MAX_BYTES_PER_TRANSACTION]`.
pub static TRANSACTION: SszType = SszType::List(&U8, 1_073_741_824);
pub static TRANSACTIONS: SszType = SszType::List(&TRANSACTION, 1_048_576);
pub static EXTRA_DATA: SszType = SszType::List(&U8, 32);

// --- phase0 / altair containers ---

pub static CHECKPOINT: SszType = SszType::Container(&[
    Field { name: "epoch", ty: &U64 },
    Field { name: "root", ty: &BYTES32 },
]);

pub static ETH1_DATA: SszType = SszType::Container(&[
    Field { name: "deposit_root", ty: &BYTES32 },
    Field { name: "deposit_count", ty: &U64 },
    Field { name: "block_hash", ty: &BYTES32 },
]);

pub static BEACON_BLOCK_HEADER: SszType = SszType::Container(&[
    Field { name: "slot", ty: &U64 },
    Field { name: "proposer_index", ty: &U64 },
    Field { name: "parent_root", ty: &BYTES32 },
    Field { name: "state_root", ty: &BYTES32 },
    Field { name: "body_root", ty: &BYTES32 },
]);

pub static SIGNED_BEACON_BLOCK_HEADER: SszType = SszType::Container(&[
    Field { name: "message", ty: &BEACON_BLOCK_HEADER },
    Field { name: "signature", ty: &BYTES96 },
]);

pub static ATTESTATION_DATA: SszType = SszType::Container(&[
    Field { name: "slot", ty: &U64 },
    Field { name: "index", ty: &U64 },
    Field { name: "beacon_block_root", ty: &BYTES32 },
    Field { name: "source", ty: &CHECKPOINT },
    Field { name: "target", ty: &CHECKPOINT },
]);

static ATTESTING_INDICES: SszType = SszType::List(&U64, 2048);
static ATTESTING_INDICES_ELECTRA: SszType = SszType::List(&U64, 131_072);

pub static INDEXED_ATTESTATION: SszType = SszType::Container(&[
    Field { name: "attesting_indices", ty: &ATTESTING_INDICES },
    Field { name: "data", ty: &ATTESTATION_DATA },
    Field { name: "signature", ty: &BYTES96 },
]);

pub static INDEXED_ATTESTATION_ELECTRA: SszType = SszType::Container(&[
    Field { name: "attesting_indices", ty: &ATTESTING_INDICES_ELECTRA },
    Field { name: "data", ty: &ATTESTATION_DATA },
    Field { name: "signature", ty: &BYTES96 },
]);

pub static PROPOSER_SLASHING: SszType = SszType::Container(&[
    Field { name: "signed_header_1", ty: &SIGNED_BEACON_BLOCK_HEADER },
    Field { name: "signed_header_2", ty: &SIGNED_BEACON_BLOCK_HEADER },
]);

pub static ATTESTER_SLASHING: SszType = SszType::Container(&[
    Field { name: "attestation_1", ty: &INDEXED_ATTESTATION },
    Field { name: "attestation_2", ty: &INDEXED_ATTESTATION },
]);

pub static ATTESTER_SLASHING_ELECTRA: SszType = SszType::Container(&[
    Field { name: "attestation_1", ty: &INDEXED_ATTESTATION_ELECTRA },
    Field { name: "attestation_2", ty: &INDEXED_ATTESTATION_ELECTRA },
]);

static AGGREGATION_BITS: SszType = SszType::Bitlist(2048);
static AGGREGATION_BITS_ELECTRA: SszType = SszType::Bitlist(131_072);
static COMMITTEE_BITS: SszType = SszType::Bitvector(64);

pub static ATTESTATION: SszType = SszType::Container(&[
    Field { name: "aggregation_bits", ty: &AGGREGATION_BITS },
    Field { name: "data", ty: &ATTESTATION_DATA },
    Field { name: "signature", ty: &BYTES96 },
]);

pub static ATTESTATION_ELECTRA: SszType = SszType::Container(&[
    Field { name: "aggregation_bits", ty: &AGGREGATION_BITS_ELECTRA },
    Field { name: "data", ty: &ATTESTATION_DATA },
    Field { name: "signature", ty: &BYTES96 },
    Field { name: "committee_bits", ty: &COMMITTEE_BITS },
]);

pub static DEPOSIT_DATA: SszType = SszType::Container(&[
    Field { name: "pubkey", ty: &BYTES48 },
    Field { name: "withdrawal_credentials", ty: &BYTES32 },
    Field { name: "amount", ty: &U64 },
    Field { name: "signature", ty: &BYTES96 },
]);

static DEPOSIT_PROOF: SszType = SszType::Vector(&BYTES32, 33);

pub static DEPOSIT: SszType = SszType::Container(&[
    Field { name: "proof", ty: &DEPOSIT_PROOF },
    Field { name: "data", ty: &DEPOSIT_DATA },
]);

pub static VOLUNTARY_EXIT: SszType = SszType::Container(&[
    Field { name: "epoch", ty: &U64 },
    Field { name: "validator_index", ty: &U64 },
]);

pub static SIGNED_VOLUNTARY_EXIT: SszType = SszType::Container(&[
    Field { name: "message", ty: &VOLUNTARY_EXIT },
    Field { name: "signature", ty: &BYTES96 },
]);

static SYNC_COMMITTEE_BITS: SszType = SszType::Bitvector(512);

pub static SYNC_AGGREGATE: SszType = SszType::Container(&[
    Field { name: "sync_committee_bits", ty: &SYNC_COMMITTEE_BITS },
    Field { name: "sync_committee_signature", ty: &BYTES96 },
]);

static SYNC_COMMITTEE_PUBKEYS: SszType = SszType::Vector(&BYTES48, 512);

pub static SYNC_COMMITTEE: SszType = SszType::Container(&[
    Field { name: "pubkeys", ty: &SYNC_COMMITTEE_PUBKEYS },
    Field { name: "aggregate_pubkey", ty: &BYTES48 },
]);

pub static BLS_TO_EXECUTION_CHANGE: SszType = SszType::Container(&[
    Field { name: "validator_index", ty: &U64 },
    Field { name: "from_bls_pubkey", ty: &BYTES48 },
    Field { name: "to_execution_address", ty: &BYTES20 },
]);

pub static SIGNED_BLS_TO_EXECUTION_CHANGE: SszType = SszType::Container(&[
    Field { name: "message", ty: &BLS_TO_EXECUTION_CHANGE },
    Field { name: "signature", ty: &BYTES96 },
]);

pub static WITHDRAWAL: SszType = SszType::Container(&[
    Field { name: "index", ty: &U64 },
    Field { name: "validator_index", ty: &U64 },
    Field { name: "address", ty: &BYTES20 },
    Field { name: "amount", ty: &U64 },
]);

static WITHDRAWALS: SszType = SszType::List(&WITHDRAWAL, 16);

// --- execution payload (layout unchanged Deneb -> Electra) ---

pub static EXECUTION_PAYLOAD: SszType = SszType::Container(&[
    Field { name: "parent_hash", ty: &BYTES32 },
    Field { name: "fee_recipient", ty: &BYTES20 },
    Field { name: "state_root", ty: &BYTES32 },
    Field { name: "receipts_root", ty: &BYTES32 },
    Field { name: "logs_bloom", ty: &BYTES256 },
    Field { name: "prev_randao", ty: &BYTES32 },
    Field { name: "block_number", ty: &U64 },
    Field { name: "gas_limit", ty: &U64 },
    Field { name: "gas_used", ty: &U64 },
    Field { name: "timestamp", ty: &U64 },
    Field { name: "extra_data", ty: &EXTRA_DATA },
    Field { name: "base_fee_per_gas", ty: &U256 },
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "transactions", ty: &TRANSACTIONS },
    Field { name: "withdrawals", ty: &WITHDRAWALS },
    Field { name: "blob_gas_used", ty: &U64 },
    Field { name: "excess_blob_gas", ty: &U64 },
]);

pub static EXECUTION_PAYLOAD_HEADER: SszType = SszType::Container(&[
    Field { name: "parent_hash", ty: &BYTES32 },
    Field { name: "fee_recipient", ty: &BYTES20 },
    Field { name: "state_root", ty: &BYTES32 },
    Field { name: "receipts_root", ty: &BYTES32 },
    Field { name: "logs_bloom", ty: &BYTES256 },
    Field { name: "prev_randao", ty: &BYTES32 },
    Field { name: "block_number", ty: &U64 },
    Field { name: "gas_limit", ty: &U64 },
    Field { name: "gas_used", ty: &U64 },
    Field { name: "timestamp", ty: &U64 },
    Field { name: "extra_data", ty: &EXTRA_DATA },
    Field { name: "base_fee_per_gas", ty: &U256 },
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "transactions_root", ty: &BYTES32 },
    Field { name: "withdrawals_root", ty: &BYTES32 },
    Field { name: "blob_gas_used", ty: &U64 },
    Field { name: "excess_blob_gas", ty: &U64 },
]);

// --- Electra execution requests ---

pub static DEPOSIT_REQUEST: SszType = SszType::Container(&[
    Field { name: "pubkey", ty: &BYTES48 },
    Field { name: "withdrawal_credentials", ty: &BYTES32 },
    Field { name: "amount", ty: &U64 },
    Field { name: "signature", ty: &BYTES96 },
    Field { name: "index", ty: &U64 },
]);

pub static WITHDRAWAL_REQUEST: SszType = SszType::Container(&[
    Field { name: "source_address", ty: &BYTES20 },
    Field { name: "validator_pubkey", ty: &BYTES48 },
    Field { name: "amount", ty: &U64 },
]);

pub static CONSOLIDATION_REQUEST: SszType = SszType::Container(&[
    Field { name: "source_address", ty: &BYTES20 },
    Field { name: "source_pubkey", ty: &BYTES48 },
    Field { name: "target_pubkey", ty: &BYTES48 },
]);

static DEPOSIT_REQUESTS: SszType = SszType::List(&DEPOSIT_REQUEST, 8192);
static WITHDRAWAL_REQUESTS: SszType = SszType::List(&WITHDRAWAL_REQUEST, 16);
static CONSOLIDATION_REQUESTS: SszType = SszType::List(&CONSOLIDATION_REQUEST, 2);

pub static EXECUTION_REQUESTS: SszType = SszType::Container(&[
    Field { name: "deposits", ty: &DEPOSIT_REQUESTS },
    Field { name: "withdrawals", ty: &WITHDRAWAL_REQUESTS },
    Field { name: "consolidations", ty: &CONSOLIDATION_REQUESTS },
]);

// --- block bodies ---

static PROPOSER_SLASHINGS: SszType = SszType::List(&PROPOSER_SLASHING, 16);
static ATTESTER_SLASHINGS: SszType = SszType::List(&ATTESTER_SLASHING, 2);
static ATTESTER_SLASHINGS_ELECTRA: SszType = SszType::List(&ATTESTER_SLASHING_ELECTRA, 1);
static ATTESTATIONS: SszType = SszType::List(&ATTESTATION, 128);
static ATTESTATIONS_ELECTRA: SszType = SszType::List(&ATTESTATION_ELECTRA, 8);
static DEPOSITS: SszType = SszType::List(&DEPOSIT, 16);
static VOLUNTARY_EXITS: SszType = SszType::List(&SIGNED_VOLUNTARY_EXIT, 16);
static BLS_CHANGES: SszType = SszType::List(&SIGNED_BLS_TO_EXECUTION_CHANGE, 16);
static BLOB_KZG_COMMITMENTS: SszType = SszType::List(&BYTES48, 4096);

pub static BEACON_BLOCK_BODY_DENEB: SszType = SszType::Container(&[
    Field { name: "randao_reveal", ty: &BYTES96 },
    Field { name: "eth1_data", ty: &ETH1_DATA },
    Field { name: "graffiti", ty: &BYTES32 },
    Field { name: "proposer_slashings", ty: &PROPOSER_SLASHINGS },
    Field { name: "attester_slashings", ty: &ATTESTER_SLASHINGS },
    Field { name: "attestations", ty: &ATTESTATIONS },
    Field { name: "deposits", ty: &DEPOSITS },
    Field { name: "voluntary_exits", ty: &VOLUNTARY_EXITS },
    Field { name: "sync_aggregate", ty: &SYNC_AGGREGATE },
    Field { name: "execution_payload", ty: &EXECUTION_PAYLOAD },
    Field { name: "bls_to_execution_changes", ty: &BLS_CHANGES },
    Field { name: "blob_kzg_commitments", ty: &BLOB_KZG_COMMITMENTS },
]);

pub static BEACON_BLOCK_BODY_ELECTRA: SszType = SszType::Container(&[
    Field { name: "randao_reveal", ty: &BYTES96 },
    Field { name: "eth1_data", ty: &ETH1_DATA },
    Field { name: "graffiti", ty: &BYTES32 },
    Field { name: "proposer_slashings", ty: &PROPOSER_SLASHINGS },
    Field { name: "attester_slashings", ty: &ATTESTER_SLASHINGS_ELECTRA },
    Field { name: "attestations", ty: &ATTESTATIONS_ELECTRA },
    Field { name: "deposits", ty: &DEPOSITS },
    Field { name: "voluntary_exits", ty: &VOLUNTARY_EXITS },
    Field { name: "sync_aggregate", ty: &SYNC_AGGREGATE },
    Field { name: "execution_payload", ty: &EXECUTION_PAYLOAD },
    Field { name: "bls_to_execution_changes", ty: &BLS_CHANGES },
    Field { name: "blob_kzg_commitments", ty: &BLOB_KZG_COMMITMENTS },
    Field { name: "execution_requests", ty: &EXECUTION_REQUESTS },
]);

pub static BEACON_BLOCK_DENEB: SszType = SszType::Container(&[
    Field { name: "slot", ty: &U64 },
    Field { name: "proposer_index", ty: &U64 },
    Field { name: "parent_root", ty: &BYTES32 },
    Field { name: "state_root", ty: &BYTES32 },
    Field { name: "body", ty: &BEACON_BLOCK_BODY_DENEB },
]);

pub static BEACON_BLOCK_ELECTRA: SszType = SszType::Container(&[
    Field { name: "slot", ty: &U64 },
    Field { name: "proposer_index", ty: &U64 },
    Field { name: "parent_root", ty: &BYTES32 },
    Field { name: "state_root", ty: &BYTES32 },
    Field { name: "body", ty: &BEACON_BLOCK_BODY_ELECTRA },
]);

pub static SIGNED_BEACON_BLOCK_DENEB: SszType = SszType::Container(&[
    Field { name: "message", ty: &BEACON_BLOCK_DENEB },
    Field { name: "signature", ty: &BYTES96 },
]);

pub static SIGNED_BEACON_BLOCK_ELECTRA: SszType = SszType::Container(&[
    Field { name: "message", ty: &BEACON_BLOCK_ELECTRA },
    Field { name: "signature", ty: &BYTES96 },
]);

// --- light client objects ---

static EXECUTION_BRANCH: SszType = SszType::Vector(&BYTES32, 4);

pub static LIGHT_CLIENT_HEADER: SszType = SszType::Container(&[
    Field { name: "beacon", ty: &BEACON_BLOCK_HEADER },
    Field { name: "execution", ty: &EXECUTION_PAYLOAD_HEADER },
    Field { name: "execution_branch", ty: &EXECUTION_BRANCH },
]);

static COMMITTEE_BRANCH_DENEB: SszType = SszType::Vector(&BYTES32, 5);
static COMMITTEE_BRANCH_ELECTRA: SszType = SszType::Vector(&BYTES32, 6);
static FINALITY_BRANCH_DENEB: SszType = SszType::Vector(&BYTES32, 6);
static FINALITY_BRANCH_ELECTRA: SszType = SszType::Vector(&BYTES32, 7);

pub static LIGHT_CLIENT_BOOTSTRAP_DENEB: SszType = SszType::Container(&[
    Field { name: "header", ty: &LIGHT_CLIENT_HEADER },
    Field { name: "current_sync_committee", ty: &SYNC_COMMITTEE },
    Field { name: "current_sync_committee_branch", ty: &COMMITTEE_BRANCH_DENEB },
]);

pub static LIGHT_CLIENT_BOOTSTRAP_ELECTRA: SszType = SszType::Container(&[
    Field { name: "header", ty: &LIGHT_CLIENT_HEADER },
    Field { name: "current_sync_committee", ty: &SYNC_COMMITTEE },
    Field { name: "current_sync_committee_branch", ty: &COMMITTEE_BRANCH_ELECTRA },
]);

pub static LIGHT_CLIENT_UPDATE_DENEB: SszType = SszType::Container(&[
    Field { name: "attested_header", ty: &LIGHT_CLIENT_HEADER },
    Field { name: "next_sync_committee", ty: &SYNC_COMMITTEE },
    Field { name: "next_sync_committee_branch", ty: &COMMITTEE_BRANCH_DENEB },
    Field { name: "finalized_header", ty: &LIGHT_CLIENT_HEADER },
    Field { name: "finality_branch", ty: &FINALITY_BRANCH_DENEB },
    Field { name: "sync_aggregate", ty: &SYNC_AGGREGATE },
    Field { name: "signature_slot", ty: &U64 },
]);

pub static LIGHT_CLIENT_UPDATE_ELECTRA: SszType = SszType::Container(&[
    Field { name: "attested_header", ty: &LIGHT_CLIENT_HEADER },
    Field { name: "next_sync_committee", ty: &SYNC_COMMITTEE },
    Field { name: "next_sync_committee_branch", ty: &COMMITTEE_BRANCH_ELECTRA },
    Field { name: "finalized_header", ty: &LIGHT_CLIENT_HEADER },
    Field { name: "finality_branch", ty: &FINALITY_BRANCH_ELECTRA },
    Field { name: "sync_aggregate", ty: &SYNC_AGGREGATE },
    Field { name: "signature_slot", ty: &U64 },
]);

pub static SIGNING_DATA: SszType = SszType::Container(&[
    Field { name: "object_root", ty: &BYTES32 },
    Field { name: "domain", ty: &BYTES32 },
]);

pub static HISTORICAL_SUMMARY: SszType = SszType::Container(&[
    Field { name: "block_summary_root", ty: &BYTES32 },
    Field { name: "state_summary_root", ty: &BYTES32 },
]);

/// `BeaconState.block_roots`: Vector[Root, SLOTS_PER_HISTORICAL_ROOT].
pub static BLOCK_ROOTS: SszType = SszType::Vector(&BYTES32, 8192);
pub static HISTORICAL_SUMMARIES: SszType = SszType::List(&HISTORICAL_SUMMARY, 16_777_216);

// --- fork-dependent descriptor and gindex selection ---

pub fn signed_block_descriptor(fork: ForkId) -> Result<&'static SszType, Error> {
    match fork {
        ForkId::Deneb => Ok(&SIGNED_BEACON_BLOCK_DENEB),
        ForkId::Electra => Ok(&SIGNED_BEACON_BLOCK_ELECTRA),
        other => Err(Error::input(format!(
            "fork {other:?} predates Deneb and is unsupported"
        ))),
    }
}

pub fn body_descriptor(fork: ForkId) -> Result<&'static SszType, Error> {
    match fork {
        ForkId::Deneb => Ok(&BEACON_BLOCK_BODY_DENEB),
        ForkId::Electra => Ok(&BEACON_BLOCK_BODY_ELECTRA),
        other => Err(Error::input(format!(
            "fork {other:?} predates Deneb and is unsupported"
        ))),
    }
}

pub fn update_descriptor(fork: ForkId) -> Result<&'static SszType, Error> {
    match fork {
        ForkId::Deneb => Ok(&LIGHT_CLIENT_UPDATE_DENEB),
        ForkId::Electra => Ok(&LIGHT_CLIENT_UPDATE_ELECTRA),
        other => Err(Error::input(format!(
            "fork {other:?} predates Deneb and is unsupported"
        ))),
    }
}

pub fn bootstrap_descriptor(fork: ForkId) -> Result<&'static SszType, Error> {
    match fork {
        ForkId::Deneb => Ok(&LIGHT_CLIENT_BOOTSTRAP_DENEB),
        ForkId::Electra => Ok(&LIGHT_CLIENT_BOOTSTRAP_ELECTRA),
        other => Err(Error::input(format!(
            "fork {other:?} predates Deneb and is unsupported"
        ))),
    }
}

/// State gindexes that moved when Electra grew the state container.
pub fn current_sync_committee_gindex(fork: ForkId) -> u64 {
    if fork >= ForkId::Electra { 86 } else { 54 }
}

pub fn next_sync_committee_gindex(fork: ForkId) -> u64 {
    if fork >= ForkId::Electra { 87 } else { 55 }
}

pub fn finalized_root_gindex(fork: ForkId) -> u64 {
    if fork >= ForkId::Electra { 169 } else { 105 }
}

pub fn historical_summaries_gindex(fork: ForkId) -> u64 {
    if fork >= ForkId::Electra { 91 } else { 59 }
}

pub fn block_roots_gindex(fork: ForkId) -> u64 {
    if fork >= ForkId::Electra { 69 } else { 37 }
}

// --- typed views and helpers ---

/// Owned beacon block header. Small enough to copy freely between the
/// request cache, proof containers, and results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: B256,
    pub state_root: B256,
    pub body_root: B256,
}

impl Header {
    pub fn from_view(view: &SszView<'_>) -> Result<Self, Error> {
        Ok(Header {
            slot: view.field("slot")?.as_u64()?,
            proposer_index: view.field("proposer_index")?.as_u64()?,
            parent_root: view.field("parent_root")?.as_b256()?,
            state_root: view.field("state_root")?.as_b256()?,
            body_root: view.field("body_root")?.as_b256()?,
        })
    }

    /// Parse the `header.message` object of the beacon headers API.
    pub fn from_json(message: &Value) -> Result<Self, Error> {
        let slot = message
            .get("slot")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::decode("header message without slot"))?;
        let proposer = message
            .get("proposer_index")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::decode("header message without proposer_index"))?;
        Ok(Header {
            slot: slot
                .parse()
                .map_err(|e| Error::decode(format!("slot: {e}")))?,
            proposer_index: proposer
                .parse()
                .map_err(|e| Error::decode(format!("proposer_index: {e}")))?,
            parent_root: json::b256(
                message
                    .get("parent_root")
                    .ok_or_else(|| Error::decode("header message without parent_root"))?,
            )?,
            state_root: json::b256(
                message
                    .get("state_root")
                    .ok_or_else(|| Error::decode("header message without state_root"))?,
            )?,
            body_root: json::b256(
                message
                    .get("body_root")
                    .ok_or_else(|| Error::decode("header message without body_root"))?,
            )?,
        })
    }

    pub fn to_ssz(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(112);
        bytes.extend_from_slice(&self.slot.to_le_bytes());
        bytes.extend_from_slice(&self.proposer_index.to_le_bytes());
        bytes.extend_from_slice(self.parent_root.as_slice());
        bytes.extend_from_slice(self.state_root.as_slice());
        bytes.extend_from_slice(self.body_root.as_slice());
        bytes
    }

    pub fn from_ssz(bytes: &[u8]) -> Result<Self, Error> {
        let view = SszView::new(&BEACON_BLOCK_HEADER, bytes)?;
        Header::from_view(&view)
    }

    pub fn root(&self) -> B256 {
        // A fixed container of five fields cannot fail to hash.
        ssz::hash_tree_root(&BEACON_BLOCK_HEADER, &self.to_ssz()).unwrap_or_default()
    }
}

/// Read the slot of a `SignedBeaconBlock` without committing to a fork
/// descriptor: the message offset sits first, the slot leads the message.
pub fn peek_signed_block_slot(bytes: &[u8]) -> Result<u64, Error> {
    if bytes.len() < 4 {
        return Err(Error::decode("signed block shorter than offset table"));
    }
    let mut off = [0u8; 4];
    off.copy_from_slice(&bytes[..4]);
    let message = u32::from_le_bytes(off) as usize;
    if bytes.len() < message + 8 {
        return Err(Error::decode("signed block truncated before slot"));
    }
    let mut slot = [0u8; 8];
    slot.copy_from_slice(&bytes[message..message + 8]);
    Ok(u64::from_le_bytes(slot))
}

/// `hash_tree_root(SigningData{object_root, domain})`.
pub fn signing_root(object_root: &B256, domain: &[u8; 32]) -> B256 {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(object_root.as_slice());
    bytes.extend_from_slice(domain);
    ssz::hash_tree_root(&SIGNING_DATA, &bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::hash::sha256_pair;
    use serde_json::json;

    #[test]
    fn header_root_matches_manual_merkleization() {
        let header = Header {
            slot: 123,
            proposer_index: 7,
            parent_root: B256::repeat_byte(0xAA),
            state_root: B256::repeat_byte(0xBB),
            body_root: B256::repeat_byte(0xCC),
        };
        // 5 leaves padded to 8.
        let mut slot_leaf = [0u8; 32];
        slot_leaf[..8].copy_from_slice(&123u64.to_le_bytes());
        let mut proposer_leaf = [0u8; 32];
        proposer_leaf[..8].copy_from_slice(&7u64.to_le_bytes());
        let zero = [0u8; 32];
        let h01 = sha256_pair(&slot_leaf, &proposer_leaf);
        let h23 = sha256_pair(&[0xAA; 32], &[0xBB; 32]);
        let h45 = sha256_pair(&[0xCC; 32], &zero);
        let h67 = sha256_pair(&zero, &zero);
        let root = sha256_pair(&sha256_pair(&h01, &h23), &sha256_pair(&h45, &h67));
        assert_eq!(header.root().0, root);
    }

    #[test]
    fn header_ssz_round_trip() {
        let header = Header {
            slot: 9_000_001,
            proposer_index: 42,
            parent_root: B256::repeat_byte(1),
            state_root: B256::repeat_byte(2),
            body_root: B256::repeat_byte(3),
        };
        assert_eq!(Header::from_ssz(&header.to_ssz()).unwrap(), header);
    }

    #[test]
    fn header_from_beacon_api_json() {
        let message = json!({
            "slot": "123",
            "proposer_index": "7",
            "parent_root": format!("0x{}", "aa".repeat(32)),
            "state_root": format!("0x{}", "bb".repeat(32)),
            "body_root": format!("0x{}", "cc".repeat(32)),
        });
        let header = Header::from_json(&message).unwrap();
        assert_eq!(header.slot, 123);
        assert_eq!(header.parent_root, B256::repeat_byte(0xAA));
    }

    #[test]
    fn execution_payload_field_gindexes() {
        use crate::ssz::{resolve_path, PathStep};
        // 17 fields pad to 32; state_root is field 2, transactions field 13.
        let (g, _) =
            resolve_path(&EXECUTION_PAYLOAD, &[PathStep::Field("state_root")]).unwrap();
        assert_eq!(g, 34);
        let (g, _) =
            resolve_path(&EXECUTION_PAYLOAD, &[PathStep::Field("transactions")]).unwrap();
        assert_eq!(g, 45);
    }

    #[test]
    fn body_payload_gindex_is_25_for_both_forks() {
        use crate::ssz::{resolve_path, PathStep};
        for body in [&BEACON_BLOCK_BODY_DENEB, &BEACON_BLOCK_BODY_ELECTRA] {
            let (g, _) = resolve_path(body, &[PathStep::Field("execution_payload")]).unwrap();
            assert_eq!(g, 25);
        }
    }

    #[test]
    fn peek_slot_reads_through_offset() {
        // Minimal fake: offset table says message at byte 100, slot 77.
        let mut bytes = vec![0u8; 108];
        bytes[..4].copy_from_slice(&100u32.to_le_bytes());
        bytes[100..108].copy_from_slice(&77u64.to_le_bytes());
        assert_eq!(peek_signed_block_slot(&bytes).unwrap(), 77);
        assert!(peek_signed_block_slot(&bytes[..50]).is_err());
    }

    #[test]
    fn electra_moves_state_gindexes() {
        assert_eq!(next_sync_committee_gindex(ForkId::Deneb), 55);
        assert_eq!(next_sync_committee_gindex(ForkId::Electra), 87);
        assert_eq!(historical_summaries_gindex(ForkId::Deneb), 59);
        assert_eq!(historical_summaries_gindex(ForkId::Electra), 91);
    }
}
