#![allow(dead_code)]

//! A miniature fabricated chain and a scripted host.
//!
//! Builds one Deneb data block (fabricated accounts, transactions, and
//! receipts), a signing child block whose sync aggregate covers it with
//! seeded BLS keys, and answers every data request a context can emit for
//! them — no network anywhere.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use blst::min_pk::{AggregateSignature, SecretKey};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};

use colibri_core::api::{
    execute_prover, execute_verifier, get_proof, prover_set_response, verifier_set_response,
    PendingRequest, Status,
};
use colibri_core::beacon::{
    signing_root, Header, BEACON_BLOCK_BODY_DENEB, BEACON_BLOCK_DENEB, EXECUTION_PAYLOAD,
    SIGNED_BEACON_BLOCK_DENEB, TRANSACTION,
};
use colibri_core::chains::{ChainSpec, DOMAIN_SYNC_COMMITTEE, MAINNET};
use colibri_core::ethtx;
use colibri_core::primitives::hash::keccak256;
use colibri_core::primitives::rlp;
use colibri_core::ssz::{encode_container, encode_list, hash_tree_root};
use colibri_core::sync::SyncCommittee;
use colibri_core::trie::PatriciaTrie;
use colibri_core::{ProverCtx, VerifierCtx};

pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Slot inside mainnet's Deneb window.
pub const DATA_SLOT: u64 = 8_640_000;
pub const SIGN_SLOT: u64 = DATA_SLOT + 1;

pub struct TestChain {
    pub committee: SyncCommittee,
    pub secrets: Vec<SecretKey>,

    pub account: Address,
    pub balance: U256,
    pub contract: Address,
    pub code: Vec<u8>,
    pub tx_key: SigningKey,
    pub raw_txs: Vec<Vec<u8>>,
    pub receipts: Vec<Value>,

    pub state_trie: PatriciaTrie,
    pub state_root: B256,
    pub receipts_root: B256,
    pub block_number: u64,
    pub block_hash: B256,
    pub timestamp: u64,

    pub data_block: Vec<u8>,
    pub data_header: Header,
    pub data_root: B256,
    pub sign_block: Vec<u8>,
    pub sign_header: Header,
    pub sign_root: B256,
}

pub fn secret_key(index: usize) -> SecretKey {
    let mut ikm = [0x42u8; 32];
    ikm[..8].copy_from_slice(&(index as u64).to_le_bytes());
    SecretKey::key_gen(&ikm, &[]).unwrap()
}

pub fn build_committee() -> (Vec<SecretKey>, SyncCommittee) {
    let secrets: Vec<SecretKey> = (0..512).map(secret_key).collect();
    let pubkeys: Vec<[u8; 48]> = secrets.iter().map(|sk| sk.sk_to_pk().to_bytes()).collect();
    let committee = SyncCommittee {
        pubkeys,
        aggregate_pubkey: secrets[0].sk_to_pk().to_bytes(),
    };
    (secrets, committee)
}

pub fn sign_with_committee(
    secrets: &[SecretKey],
    participants: usize,
    root: &B256,
) -> (Vec<u8>, [u8; 96]) {
    let mut bits = vec![0u8; 64];
    for i in 0..participants {
        bits[i / 8] |= 1 << (i % 8);
    }
    let signatures: Vec<_> = secrets[..participants]
        .iter()
        .map(|sk| sk.sign(root.as_slice(), BLS_DST, &[]))
        .collect();
    let refs: Vec<_> = signatures.iter().collect();
    let aggregate = AggregateSignature::aggregate(&refs, false)
        .unwrap()
        .to_signature();
    (bits, aggregate.to_bytes())
}

pub fn build_eip1559_tx(key: &SigningKey, nonce: u64, to: Address) -> Vec<u8> {
    let unsigned = vec![
        rlp::encode_uint(1),
        rlp::encode_uint(nonce),
        rlp::encode_uint(2_000_000_000),
        rlp::encode_uint(50_000_000_000),
        rlp::encode_uint(21_000),
        rlp::encode_bytes(to.as_slice()),
        rlp::encode_uint(1_000_000),
        rlp::encode_bytes(&[]),
        rlp::encode_list(&[]),
    ];
    let mut preimage = vec![0x02];
    preimage.extend_from_slice(&rlp::encode_list(&unsigned));
    let sighash = keccak256(&preimage);
    let (signature, recovery) = key.sign_prehash_recoverable(&sighash).unwrap();
    let r = U256::from_be_slice(&signature.r().to_bytes());
    let s = U256::from_be_slice(&signature.s().to_bytes());

    let mut signed = unsigned;
    signed.push(rlp::encode_uint(recovery.to_byte() as u64));
    signed.push(rlp::encode_bytes(&r.to_be_bytes_trimmed_vec()));
    signed.push(rlp::encode_bytes(&s.to_be_bytes_trimmed_vec()));
    let mut raw = vec![0x02];
    raw.extend_from_slice(&rlp::encode_list(&signed));
    raw
}

fn encode_payload(
    state_root: &B256,
    receipts_root: &B256,
    block_number: u64,
    timestamp: u64,
    block_hash: &B256,
    raw_txs: &[Vec<u8>],
) -> Vec<u8> {
    let transactions = encode_list(&TRANSACTION, raw_txs);
    let base_fee = U256::from(10_000_000_000u64).to_le_bytes::<32>();
    encode_container(
        &EXECUTION_PAYLOAD,
        &[
            &[0u8; 32],                       // parent_hash
            &[0u8; 20],                       // fee_recipient
            state_root.as_slice(),
            receipts_root.as_slice(),
            &[0u8; 256],                      // logs_bloom
            &[0u8; 32],                       // prev_randao
            &block_number.to_le_bytes(),
            &30_000_000u64.to_le_bytes(),     // gas_limit
            &42_000u64.to_le_bytes(),         // gas_used
            &timestamp.to_le_bytes(),
            &[],                              // extra_data
            &base_fee,
            block_hash.as_slice(),
            &transactions,
            &[],                              // withdrawals
            &0u64.to_le_bytes(),              // blob_gas_used
            &0u64.to_le_bytes(),              // excess_blob_gas
        ],
    )
    .unwrap()
}

fn encode_body(sync_bits: &[u8], sync_signature: &[u8; 96], payload: &[u8]) -> Vec<u8> {
    let mut aggregate = Vec::with_capacity(160);
    aggregate.extend_from_slice(sync_bits);
    aggregate.extend_from_slice(sync_signature);
    encode_container(
        &BEACON_BLOCK_BODY_DENEB,
        &[
            &[0u8; 96], // randao_reveal
            &[0u8; 72], // eth1_data
            &[0u8; 32], // graffiti
            &[],        // proposer_slashings
            &[],        // attester_slashings
            &[],        // attestations
            &[],        // deposits
            &[],        // voluntary_exits
            &aggregate,
            payload,
            &[], // bls_to_execution_changes
            &[], // blob_kzg_commitments
        ],
    )
    .unwrap()
}

fn encode_signed_block(slot: u64, parent_root: &B256, body: &[u8]) -> (Vec<u8>, Header) {
    let message = encode_container(
        &BEACON_BLOCK_DENEB,
        &[
            &slot.to_le_bytes(),
            &7u64.to_le_bytes(), // proposer_index
            parent_root.as_slice(),
            &[0x5Au8; 32], // beacon state root (unused by these flows)
            body,
        ],
    )
    .unwrap();
    let signed = encode_container(&SIGNED_BEACON_BLOCK_DENEB, &[&message, &[0u8; 96]]).unwrap();
    let header = Header {
        slot,
        proposer_index: 7,
        parent_root: *parent_root,
        state_root: B256::repeat_byte(0x5A),
        body_root: hash_tree_root(&BEACON_BLOCK_BODY_DENEB, body).unwrap(),
    };
    (signed, header)
}

pub fn build_chain() -> TestChain {
    let (secrets, committee) = build_committee();
    let spec = ChainSpec::get(MAINNET).unwrap();

    // Execution state: one funded account.
    let account = Address::repeat_byte(0xA1);
    let balance = U256::from(1_234_567_890_123_456_789u64);
    let mut state_trie = PatriciaTrie::new();
    let account_leaf = rlp::encode_list(&[
        rlp::encode_uint(3),
        rlp::encode_bytes(&balance.to_be_bytes_trimmed_vec()),
        rlp::encode_bytes(&colibri_core::trie::EMPTY_ROOT),
        rlp::encode_bytes(&keccak256(&[])),
    ]);
    state_trie.set(&keccak256(account.as_slice()), account_leaf);
    // A contract with real bytecode, for the code flows.
    let contract = Address::repeat_byte(0xC5);
    let code: Vec<u8> = (0..40u8).map(|i| 0x60 ^ i).collect();
    let contract_leaf = rlp::encode_list(&[
        rlp::encode_uint(1),
        rlp::encode_bytes(&[]),
        rlp::encode_bytes(&colibri_core::trie::EMPTY_ROOT),
        rlp::encode_bytes(&keccak256(&code)),
    ]);
    state_trie.set(&keccak256(contract.as_slice()), contract_leaf);
    // A few neighbours so the proof has real depth.
    for i in 0u8..8 {
        let other = Address::repeat_byte(0xB0 + i);
        let leaf = rlp::encode_list(&[
            rlp::encode_uint(1),
            rlp::encode_bytes(&[0x01, i]),
            rlp::encode_bytes(&colibri_core::trie::EMPTY_ROOT),
            rlp::encode_bytes(&keccak256(&[])),
        ]);
        state_trie.set(&keccak256(other.as_slice()), leaf);
    }
    let state_root = B256::from(state_trie.root_hash());

    // Two transactions and their receipts.
    let tx_key = SigningKey::from_slice(&[0x5A; 32]).unwrap();
    let raw_txs = vec![
        build_eip1559_tx(&tx_key, 3, Address::repeat_byte(0x77)),
        build_eip1559_tx(&tx_key, 4, Address::repeat_byte(0x88)),
    ];
    let receipts = vec![
        json!({
            "type": "0x2",
            "status": "0x1",
            "cumulativeGasUsed": "0x5208",
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "logs": [],
            "blockNumber": "0x14d7970",
            "transactionIndex": "0x0",
        }),
        json!({
            "type": "0x2",
            "status": "0x1",
            "cumulativeGasUsed": "0xa410",
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "logs": [{
                "address": format!("0x{}", "dac17f958d2ee523a2206206994597c13d831ec7"),
                "topics": [format!("0x{}", "11".repeat(32))],
                "data": "0xdeadbeef",
            }],
            "blockNumber": "0x14d7970",
            "transactionIndex": "0x1",
        }),
    ];
    let mut receipts_trie = PatriciaTrie::new();
    for (i, receipt) in receipts.iter().enumerate() {
        let encoded = ethtx::encode_receipt_from_json(receipt).unwrap();
        receipts_trie.set(&rlp::encode_uint(i as u64), encoded);
    }
    let receipts_root = B256::from(receipts_trie.root_hash());

    let block_number = 0x14d7970u64;
    let block_hash = B256::repeat_byte(0xE1);
    let timestamp = 1_700_000_000u64;

    // Data block: carries the payload, signed by nobody (its child signs).
    let payload = encode_payload(
        &state_root,
        &receipts_root,
        block_number,
        timestamp,
        &block_hash,
        &raw_txs,
    );
    let data_body = encode_body(&[0u8; 64], &[0u8; 96], &payload);
    let (data_block, data_header) =
        encode_signed_block(DATA_SLOT, &B256::repeat_byte(0x01), &data_body);
    let data_root = data_header.root();

    // Sign block: child of the data block, aggregate over the data root.
    let domain = spec.domain(DOMAIN_SYNC_COMMITTEE, spec.epoch(SIGN_SLOT));
    let root_to_sign = signing_root(&data_root, &domain);
    let (bits, signature) = sign_with_committee(&secrets, 420, &root_to_sign);
    let next_payload = encode_payload(
        &B256::repeat_byte(0x02),
        &B256::from(colibri_core::trie::EMPTY_ROOT),
        block_number + 1,
        timestamp + 12,
        &B256::repeat_byte(0xE2),
        &[],
    );
    let sign_body = encode_body(&bits, &signature, &next_payload);
    let (sign_block, sign_header) = encode_signed_block(SIGN_SLOT, &data_root, &sign_body);
    let sign_root = sign_header.root();

    TestChain {
        committee,
        secrets,
        account,
        balance,
        contract,
        code,
        tx_key,
        raw_txs,
        receipts,
        state_trie,
        state_root,
        receipts_root,
        block_number,
        block_hash,
        timestamp,
        data_block,
        data_header,
        data_root,
        sign_block,
        sign_header,
        sign_root,
    }
}

fn header_json(root: &B256, header: &Header) -> Value {
    json!({
        "root": format!("{root}"),
        "header": {
            "message": {
                "slot": header.slot.to_string(),
                "proposer_index": header.proposer_index.to_string(),
                "parent_root": format!("{}", header.parent_root),
                "state_root": format!("{}", header.state_root),
                "body_root": format!("{}", header.body_root),
            }
        }
    })
}

impl TestChain {
    /// Answer one data request the way the live APIs would.
    pub fn respond(&self, request: &PendingRequest) -> Vec<u8> {
        if let Some(payload) = &request.payload {
            return self.respond_rpc(payload);
        }
        let url = request.url.as_str();
        if url == "eth/v2/beacon/blocks/head"
            || url == format!("eth/v2/beacon/blocks/{}", self.sign_root)
        {
            return self.sign_block.clone();
        }
        if url == format!("eth/v2/beacon/blocks/{}", self.data_root) {
            return self.data_block.clone();
        }
        if url == "eth/v1/beacon/headers/head" {
            return json!({"data": header_json(&self.sign_root, &self.sign_header)})
                .to_string()
                .into_bytes();
        }
        if url == format!("eth/v1/beacon/headers?parent_root={}", self.data_root) {
            return json!({"data": [header_json(&self.sign_root, &self.sign_header)]})
                .to_string()
                .into_bytes();
        }
        panic!("unscripted request: {url}");
    }

    fn respond_rpc(&self, payload: &Value) -> Vec<u8> {
        let method = payload.get("method").and_then(Value::as_str).unwrap_or("");
        let params = payload.get("params").cloned().unwrap_or(Value::Null);
        let result = match method {
            "eth_getProof" => {
                let address = params[0].as_str().expect("eth_getProof address param");
                let bytes = hex::decode(
                    address.trim_start_matches("0x").to_ascii_lowercase(),
                )
                .expect("hex address");
                let nodes: Vec<String> = self
                    .state_trie
                    .prove(&keccak256(&bytes))
                    .iter()
                    .map(|n| format!("0x{}", hex::encode(n)))
                    .collect();
                json!({"accountProof": nodes, "storageProof": []})
            }
            "eth_getCode" => {
                // The contract is the only account with bytecode.
                json!(format!("0x{}", hex::encode(&self.code)))
            }
            "eth_getBlockByNumber" => {
                // Only the successor block is ever asked for by number.
                json!({
                    "number": format!("0x{:x}", self.block_number + 1),
                    "parentBeaconBlockRoot": format!("{}", self.data_root),
                })
            }
            "eth_getTransactionReceipt" => {
                let hash = params[0].as_str().unwrap().to_string();
                let index = self
                    .raw_txs
                    .iter()
                    .position(|raw| format!("0x{}", hex::encode(keccak256(raw))) == hash)
                    .expect("receipt for unknown tx requested");
                self.receipts[index].clone()
            }
            "eth_getBlockReceipts" => Value::Array(self.receipts.clone()),
            other => panic!("unscripted RPC method: {other}"),
        };
        json!({"jsonrpc": "2.0", "id": 1, "result": result})
            .to_string()
            .into_bytes()
    }

    pub fn tx_hash(&self, index: usize) -> B256 {
        B256::from(keccak256(&self.raw_txs[index]))
    }
}

/// Drive a prover to completion against the scripted chain.
pub fn drive_prover(ctx: &mut ProverCtx, chain: &TestChain) -> Result<Vec<u8>, String> {
    for _ in 0..40 {
        match execute_prover(ctx) {
            Status::Success { .. } => {
                return Ok(get_proof(ctx).expect("proof after success").to_vec())
            }
            Status::Error { error } => return Err(error),
            Status::Pending { requests } => {
                for request in requests {
                    let body = chain.respond(&request);
                    assert!(prover_set_response(ctx, request.req_ptr, body, 0));
                }
            }
        }
    }
    Err("prover did not converge".to_string())
}

/// Drive a verifier to completion; the scripted chain answers any
/// bootstrap/update fetches (none are expected when coverage is seeded).
pub fn drive_verifier(ctx: &mut VerifierCtx, chain: &TestChain) -> Result<Value, String> {
    for _ in 0..40 {
        match execute_verifier(ctx) {
            Status::Success { result, .. } => return Ok(result),
            Status::Error { error } => return Err(error),
            Status::Pending { requests } => {
                for request in requests {
                    let body = chain.respond(&request);
                    assert!(verifier_set_response(ctx, request.req_ptr, body, 0));
                }
            }
        }
    }
    Err("verifier did not converge".to_string())
}

/// Seed the verifier-side committee coverage for the signing period.
pub fn seed_verifier_store(chain: &TestChain) {
    let spec = ChainSpec::get(MAINNET).unwrap();
    let mut store = colibri_core::sync::SyncStore::load(MAINNET);
    store.put_committee(spec.period(SIGN_SLOT), Arc::new(chain.committee.clone()));
}
