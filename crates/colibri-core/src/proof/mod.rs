//! The proof-request wire format.
//!
//! One SSZ container travels from prover to verifier:
//! `{version, chain_engine, data, proof, sync_data}` with three unions. The
//! `proof` union carries the method family's evidence, `data` optionally
//! carries the claimed JSON result, and `sync_data` carries whatever
//! bootstrap/updates the verifier may need to cover the block's period.
//!
//! Every variant is anchored the same way: a *data header* (the beacon block
//! whose execution payload holds the proven data), an optional header chain
//! or historic branch bridging it to the *attested* header, and the sync
//! aggregate that signed the attested root.

use alloy_primitives::B256;
use serde_json::Value;

use crate::beacon::{
    BEACON_BLOCK_HEADER, EXECUTION_PAYLOAD, LIGHT_CLIENT_BOOTSTRAP_DENEB,
    LIGHT_CLIENT_BOOTSTRAP_ELECTRA, LIGHT_CLIENT_UPDATE_DENEB, LIGHT_CLIENT_UPDATE_ELECTRA,
    SYNC_AGGREGATE, U64, U256, BYTES20, BYTES32, BYTES4, U8,
};
use crate::error::Error;
use crate::ssz::{self, Field, SszType, SszView, UnionVariant};

/// Wire protocol version; byte 0 is the major tag and incompatible majors
/// are rejected before any cryptographic work.
pub const PROTOCOL_VERSION: [u8; 4] = [1, 0, 0, 0];

/// Chain-engine selector values.
pub const ENGINE_EXECUTION: u8 = 1;
pub const ENGINE_ROLLUP: u8 = 2;

/// Proof union selectors.
pub mod selector {
    pub const NONE: u8 = 0;
    pub const ACCOUNT: u8 = 1;
    pub const TRANSACTION: u8 = 2;
    pub const RECEIPT: u8 = 3;
    pub const LOGS: u8 = 4;
    pub const BLOCK: u8 = 5;
    pub const BLOCK_NUMBER: u8 = 6;
    pub const CALL: u8 = 7;
    pub const SYNC: u8 = 8;
    pub const WITNESS: u8 = 9;
}

/// Sync-data union selector (present or not); each bootstrap/update inside
/// carries its own fork envelope, so one batch may cross a fork boundary.
pub mod sync_selector {
    pub const NONE: u8 = 0;
    pub const SYNC_DATA: u8 = 1;
}

/// Fork envelope selectors for light-client objects inside `sync_data`.
pub mod fork_selector {
    pub const DENEB: u8 = 1;
    pub const ELECTRA: u8 = 2;
}

// --- building blocks ---

static BYTES65: SszType = SszType::Bytes(65);

/// One Patricia trie node (RLP bytes).
pub static TRIE_NODE: SszType = SszType::List(&U8, 16_777_216);
pub static TRIE_NODES: SszType = SszType::List(&TRIE_NODE, 64);

/// Claimed-result payload and other free-form byte blobs.
pub static DATA_BYTES: SszType = SszType::List(&U8, 134_217_728);

static B32_LIST_SMALL: SszType = SszType::List(&BYTES32, 64);
static B32_LIST_LARGE: SszType = SszType::List(&BYTES32, 512);
static B32_LIST_HISTORIC: SszType = SszType::List(&BYTES32, 96);

static HEADER_CHAIN: SszType = SszType::List(&BEACON_BLOCK_HEADER, 10);

/// Bridges a signed recent state to a much older data block through
/// `historical_summaries`.
pub static HISTORIC_PROOF: SszType = SszType::Container(&[
    Field { name: "attested_header", ty: &BEACON_BLOCK_HEADER },
    Field { name: "witnesses", ty: &B32_LIST_HISTORIC },
]);

static HISTORIC_UNION: SszType = SszType::Union(&[
    UnionVariant { name: "none", ty: None },
    UnionVariant { name: "historic", ty: Some(&HISTORIC_PROOF) },
]);

/// The common trust anchor of every proof variant.
pub static BEACON_ANCHOR: SszType = SszType::Container(&[
    Field { name: "data_header", ty: &BEACON_BLOCK_HEADER },
    Field { name: "header_chain", ty: &HEADER_CHAIN },
    Field { name: "historic", ty: &HISTORIC_UNION },
    Field { name: "sync_aggregate", ty: &SYNC_AGGREGATE },
    Field { name: "signature_slot", ty: &U64 },
]);

pub static STORAGE_ENTRY: SszType = SszType::Container(&[
    Field { name: "key", ty: &BYTES32 },
    Field { name: "nodes", ty: &TRIE_NODES },
]);

static STORAGE_ENTRIES: SszType = SszType::List(&STORAGE_ENTRY, 256);

static CODE_UNION: SszType = SszType::Union(&[
    UnionVariant { name: "none", ty: None },
    UnionVariant { name: "code", ty: Some(&DATA_BYTES) },
]);

/// One account's Merkle-Patricia evidence: account proof, storage proofs,
/// optionally the contract code preimage.
pub static ACCOUNT_WITNESS: SszType = SszType::Container(&[
    Field { name: "address", ty: &BYTES20 },
    Field { name: "account_nodes", ty: &TRIE_NODES },
    Field { name: "storage", ty: &STORAGE_ENTRIES },
    Field { name: "code", ty: &CODE_UNION },
]);

static ACCOUNT_WITNESSES: SszType = SszType::List(&ACCOUNT_WITNESS, 256);

// --- proof variants ---

pub static ACCOUNT_PROOF: SszType = SszType::Container(&[
    Field { name: "anchor", ty: &BEACON_ANCHOR },
    Field { name: "state_root", ty: &BYTES32 },
    Field { name: "block_number", ty: &U64 },
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "exec_witnesses", ty: &B32_LIST_SMALL },
    Field { name: "account", ty: &ACCOUNT_WITNESS },
]);

pub static TRANSACTION_PROOF: SszType = SszType::Container(&[
    Field { name: "anchor", ty: &BEACON_ANCHOR },
    Field { name: "block_number", ty: &U64 },
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "base_fee_per_gas", ty: &U256 },
    Field { name: "tx_index", ty: &U64 },
    Field { name: "raw_tx", ty: &DATA_BYTES },
    Field { name: "exec_witnesses", ty: &B32_LIST_LARGE },
]);

pub static RECEIPT_PROOF: SszType = SszType::Container(&[
    Field { name: "anchor", ty: &BEACON_ANCHOR },
    Field { name: "block_number", ty: &U64 },
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "receipts_root", ty: &BYTES32 },
    Field { name: "base_fee_per_gas", ty: &U256 },
    Field { name: "tx_index", ty: &U64 },
    Field { name: "raw_tx", ty: &DATA_BYTES },
    Field { name: "exec_witnesses", ty: &B32_LIST_LARGE },
    Field { name: "receipt_nodes", ty: &TRIE_NODES },
    // Path to receipt index-1 (empty for index 0): its cumulative gas is
    // what turns this receipt's cumulative into a per-transaction gasUsed.
    Field { name: "prev_receipt_nodes", ty: &TRIE_NODES },
]);

pub static LOGS_RECEIPT: SszType = SszType::Container(&[
    Field { name: "tx_index", ty: &U64 },
    Field { name: "raw_tx", ty: &DATA_BYTES },
    Field { name: "receipt_nodes", ty: &TRIE_NODES },
]);

static LOGS_RECEIPTS: SszType = SszType::List(&LOGS_RECEIPT, 1024);

pub static LOGS_BLOCK: SszType = SszType::Container(&[
    Field { name: "anchor", ty: &BEACON_ANCHOR },
    Field { name: "block_number", ty: &U64 },
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "receipts_root", ty: &BYTES32 },
    Field { name: "exec_witnesses", ty: &B32_LIST_LARGE },
    Field { name: "receipts", ty: &LOGS_RECEIPTS },
]);

static LOGS_BLOCKS: SszType = SszType::List(&LOGS_BLOCK, 256);

pub static LOGS_PROOF: SszType = SszType::Container(&[
    Field { name: "blocks", ty: &LOGS_BLOCKS },
]);

pub static BLOCK_PROOF: SszType = SszType::Container(&[
    Field { name: "anchor", ty: &BEACON_ANCHOR },
    Field { name: "execution_payload", ty: &EXECUTION_PAYLOAD },
    Field { name: "payload_witnesses", ty: &B32_LIST_SMALL },
]);

pub static BLOCK_NUMBER_PROOF: SszType = SszType::Container(&[
    Field { name: "anchor", ty: &BEACON_ANCHOR },
    Field { name: "block_number", ty: &U64 },
    Field { name: "timestamp", ty: &U64 },
    Field { name: "exec_witnesses", ty: &B32_LIST_SMALL },
]);

pub static CALL_PROOF: SszType = SszType::Container(&[
    Field { name: "anchor", ty: &BEACON_ANCHOR },
    Field { name: "state_root", ty: &BYTES32 },
    Field { name: "block_number", ty: &U64 },
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "exec_witnesses", ty: &B32_LIST_SMALL },
    Field { name: "accounts", ty: &ACCOUNT_WITNESSES },
]);

/// Sync proofs carry everything in `sync_data`; the variant itself is empty.
pub static SYNC_PROOF: SszType = SszType::Container(&[]);

pub static WITNESS_SIGNATURE: SszType = SszType::Container(&[
    Field { name: "signer", ty: &BYTES20 },
    Field { name: "signature", ty: &BYTES65 },
]);

static WITNESS_SIGNATURES: SszType = SszType::List(&WITNESS_SIGNATURE, 16);

pub static WITNESS_PROOF: SszType = SszType::Container(&[
    Field { name: "block_hash", ty: &BYTES32 },
    Field { name: "block_number", ty: &U64 },
    Field { name: "timestamp", ty: &U64 },
    Field { name: "attestations", ty: &WITNESS_SIGNATURES },
]);

// --- unions and the outer container ---

static DATA_UNION: SszType = SszType::Union(&[
    UnionVariant { name: "none", ty: None },
    UnionVariant { name: "json", ty: Some(&DATA_BYTES) },
]);

static PROOF_UNION: SszType = SszType::Union(&[
    UnionVariant { name: "none", ty: None },
    UnionVariant { name: "account", ty: Some(&ACCOUNT_PROOF) },
    UnionVariant { name: "transaction", ty: Some(&TRANSACTION_PROOF) },
    UnionVariant { name: "receipt", ty: Some(&RECEIPT_PROOF) },
    UnionVariant { name: "logs", ty: Some(&LOGS_PROOF) },
    UnionVariant { name: "block", ty: Some(&BLOCK_PROOF) },
    UnionVariant { name: "block_number", ty: Some(&BLOCK_NUMBER_PROOF) },
    UnionVariant { name: "call", ty: Some(&CALL_PROOF) },
    UnionVariant { name: "sync", ty: Some(&SYNC_PROOF) },
    UnionVariant { name: "witness", ty: Some(&WITNESS_PROOF) },
]);

/// Each light-client object is wrapped in a fork envelope, so update chains
/// crossing the Electra boundary still fit one proof.
pub static BOOTSTRAP_ENVELOPE: SszType = SszType::Union(&[
    UnionVariant { name: "none", ty: None },
    UnionVariant { name: "deneb", ty: Some(&LIGHT_CLIENT_BOOTSTRAP_DENEB) },
    UnionVariant { name: "electra", ty: Some(&LIGHT_CLIENT_BOOTSTRAP_ELECTRA) },
]);

pub static UPDATE_ENVELOPE: SszType = SszType::Union(&[
    UnionVariant { name: "none", ty: None },
    UnionVariant { name: "deneb", ty: Some(&LIGHT_CLIENT_UPDATE_DENEB) },
    UnionVariant { name: "electra", ty: Some(&LIGHT_CLIENT_UPDATE_ELECTRA) },
]);

static UPDATE_ENVELOPES: SszType = SszType::List(&UPDATE_ENVELOPE, 64);

pub static SYNC_DATA: SszType = SszType::Container(&[
    Field { name: "bootstrap", ty: &BOOTSTRAP_ENVELOPE },
    Field { name: "updates", ty: &UPDATE_ENVELOPES },
]);

static SYNC_DATA_UNION: SszType = SszType::Union(&[
    UnionVariant { name: "none", ty: None },
    UnionVariant { name: "sync_data", ty: Some(&SYNC_DATA) },
]);

pub static PROOF_REQUEST: SszType = SszType::Container(&[
    Field { name: "version", ty: &BYTES4 },
    Field { name: "chain_engine", ty: &U8 },
    Field { name: "data", ty: &DATA_UNION },
    Field { name: "proof", ty: &PROOF_UNION },
    Field { name: "sync_data", ty: &SYNC_DATA_UNION },
]);

// --- assembly and parsing ---

/// Serialize a complete proof request.
pub fn build_proof_request(
    data_json: Option<&[u8]>,
    proof_selector: u8,
    proof_bytes: &[u8],
    sync_data_selector: u8,
    sync_data_bytes: Option<&[u8]>,
) -> Result<Vec<u8>, Error> {
    let data = match data_json {
        Some(json) => ssz::encode_union(1, Some(json)),
        None => ssz::encode_union(0, None),
    };
    let proof = ssz::encode_union(proof_selector, Some(proof_bytes));
    let sync_data = match sync_data_bytes {
        Some(bytes) => ssz::encode_union(sync_data_selector, Some(bytes)),
        None => ssz::encode_union(0, None),
    };
    Ok(ssz::encode_container(
        &PROOF_REQUEST,
        &[&PROTOCOL_VERSION, &[ENGINE_EXECUTION], &data, &proof, &sync_data],
    )?)
}

/// A parsed, structurally validated proof request.
pub struct ProofRequest<'a> {
    view: SszView<'a>,
}

impl<'a> ProofRequest<'a> {
    /// Parse and run the version/engine gate: major-version mismatches and
    /// non-execution engines are rejected before any hashing happens.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        let view = SszView::new(&PROOF_REQUEST, bytes)
            .map_err(|e| Error::decode(format!("proof request: {e}")))?;
        let request = ProofRequest { view };
        let version = request.version()?;
        if version[0] != PROTOCOL_VERSION[0] {
            return Err(Error::input(format!(
                "proof version major {} incompatible with {}",
                version[0], PROTOCOL_VERSION[0]
            )));
        }
        Ok(request)
    }

    pub fn version(&self) -> Result<[u8; 4], Error> {
        let bytes = self.view.field("version")?.as_bytes();
        let mut version = [0u8; 4];
        version.copy_from_slice(bytes);
        Ok(version)
    }

    pub fn chain_engine(&self) -> Result<u8, Error> {
        Ok(self.view.field("chain_engine")?.as_bytes()[0])
    }

    /// The claimed result, decoded from the `data` union's JSON bytes.
    pub fn claimed_data(&self) -> Result<Option<Value>, Error> {
        let data = self.view.field("data")?;
        match data.union_value()? {
            None => Ok(None),
            Some(inner) => {
                let value = serde_json::from_slice(inner.as_bytes())
                    .map_err(|e| Error::decode(format!("claimed data JSON: {e}")))?;
                Ok(Some(value))
            }
        }
    }

    pub fn proof_selector(&self) -> Result<u8, Error> {
        Ok(self.view.field("proof")?.union_selector()?)
    }

    pub fn proof_value(&self) -> Result<Option<SszView<'a>>, Error> {
        Ok(self.view.field("proof")?.union_value()?)
    }

    pub fn sync_data_selector(&self) -> Result<u8, Error> {
        Ok(self.view.field("sync_data")?.union_selector()?)
    }

    pub fn sync_data_value(&self) -> Result<Option<SszView<'a>>, Error> {
        Ok(self.view.field("sync_data")?.union_value()?)
    }
}

/// Body-relative gindexes for a set of execution-payload fields plus
/// transaction elements, ascending. Both engines derive the leaf set from
/// this one function, so the multiproof layout is never ambiguous.
pub fn body_field_gindexes(
    body: &'static SszType,
    payload_fields: &[&str],
    tx_indices: &[u64],
) -> Result<Vec<u64>, Error> {
    use crate::ssz::{gindex_add, resolve_path, PathStep};
    let (payload_g, _) = resolve_path(body, &[PathStep::Field("execution_payload")])?;
    let mut gindexes = Vec::with_capacity(payload_fields.len() + tx_indices.len());
    for field in payload_fields {
        let (g, _) = resolve_path(&EXECUTION_PAYLOAD, &[PathStep::Field(field)])?;
        gindexes.push(gindex_add(payload_g, g));
    }
    for &index in tx_indices {
        let (g, _) = resolve_path(
            &EXECUTION_PAYLOAD,
            &[PathStep::Field("transactions"), PathStep::Index(index as usize)],
        )?;
        gindexes.push(gindex_add(payload_g, g));
    }
    gindexes.sort_unstable();
    gindexes.dedup();
    Ok(gindexes)
}

/// Encode a list of 32-byte words (witness lists and the like).
pub fn encode_b32_list(words: &[B256]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 32);
    for w in words {
        out.extend_from_slice(w.as_slice());
    }
    out
}

/// Encode a list of byte blobs (trie nodes, raw transactions).
pub fn encode_bytes_list(items: &[Vec<u8>]) -> Vec<u8> {
    ssz::encode_list(&TRIE_NODE, items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::Header;
    use crate::ssz::encode_container;

    fn minimal_anchor_bytes() -> Vec<u8> {
        let header = Header {
            slot: 100,
            proposer_index: 1,
            parent_root: B256::repeat_byte(1),
            state_root: B256::repeat_byte(2),
            body_root: B256::repeat_byte(3),
        };
        let aggregate = [vec![0xFFu8; 64], vec![0u8; 96]].concat();
        encode_container(
            &BEACON_ANCHOR,
            &[
                &header.to_ssz(),
                &[],
                &[0u8],
                &aggregate,
                &101u64.to_le_bytes(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn proof_request_round_trip() {
        let anchor = minimal_anchor_bytes();
        let block_number_proof = encode_container(
            &BLOCK_NUMBER_PROOF,
            &[&anchor, &55u64.to_le_bytes(), &1234u64.to_le_bytes(), &[]],
        )
        .unwrap();
        let request = build_proof_request(
            Some(br#""0x37""#),
            selector::BLOCK_NUMBER,
            &block_number_proof,
            sync_selector::NONE,
            None,
        )
        .unwrap();

        let parsed = ProofRequest::parse(&request).unwrap();
        assert_eq!(parsed.version().unwrap(), PROTOCOL_VERSION);
        assert_eq!(parsed.chain_engine().unwrap(), ENGINE_EXECUTION);
        assert_eq!(parsed.proof_selector().unwrap(), selector::BLOCK_NUMBER);
        assert_eq!(parsed.claimed_data().unwrap().unwrap(), "0x37");
        assert!(parsed.sync_data_value().unwrap().is_none());

        let proof = parsed.proof_value().unwrap().unwrap();
        assert_eq!(proof.field("block_number").unwrap().as_u64().unwrap(), 55);
        let anchor_view = proof.field("anchor").unwrap();
        assert_eq!(
            anchor_view
                .field("data_header")
                .unwrap()
                .field("slot")
                .unwrap()
                .as_u64()
                .unwrap(),
            100
        );
    }

    #[test]
    fn wrong_major_version_is_rejected_early() {
        let anchor = minimal_anchor_bytes();
        let body = encode_container(
            &BLOCK_NUMBER_PROOF,
            &[&anchor, &1u64.to_le_bytes(), &2u64.to_le_bytes(), &[]],
        )
        .unwrap();
        let mut request =
            build_proof_request(None, selector::BLOCK_NUMBER, &body, 0, None).unwrap();
        request[0] = 2; // bump the major tag
        assert!(matches!(
            ProofRequest::parse(&request),
            Err(Error::InputInvalid(_))
        ));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(matches!(
            ProofRequest::parse(&[0xFF; 20]),
            Err(Error::DecodeFailed(_))
        ));
    }
}
