//! End-to-end prover → verifier round trips over a fabricated chain, plus
//! the tamper sweep: no byte flip in a proof may change the accepted
//! result.

mod support;

use anyhow::anyhow;
use serde_json::{json, Value};

use colibri_core::api::{create_prover, create_verifier};
use colibri_core::chains::MAINNET;
use colibri_core::primitives::hash::keccak256;
use colibri_core::{MemoryStorage, TrustedHint};
use support::{build_chain, drive_prover, drive_verifier, seed_verifier_store, TestChain};

fn setup() -> TestChain {
    // One process-wide storage plugin; repeated installs are no-ops.
    let _ = colibri_core::install_storage(Box::new(MemoryStorage::new()));
    let chain = build_chain();
    seed_verifier_store(&chain);
    chain
}

fn prove(chain: &TestChain, method: &str, params: &Value) -> Vec<u8> {
    prove_with_flags(chain, method, params, 0)
}

fn prove_with_flags(chain: &TestChain, method: &str, params: &Value, flags: u32) -> Vec<u8> {
    let mut prover =
        create_prover(method, &params.to_string(), MAINNET, flags).expect("create prover");
    drive_prover(&mut prover, chain).expect("prover succeeds")
}

fn verify(chain: &TestChain, proof: &[u8], method: &str, params: &Value) -> anyhow::Result<Value> {
    let mut verifier = create_verifier(
        proof,
        method,
        &params.to_string(),
        MAINNET,
        TrustedHint::None,
    )
    .expect("create verifier");
    drive_verifier(&mut verifier, chain).map_err(|e| anyhow!(e))
}

#[test]
fn balance_round_trip() -> anyhow::Result<()> {
    let chain = setup();
    let params = json!([format!("{}", chain.account), "latest"]);
    let proof = prove(&chain, "eth_getBalance", &params);

    let result = verify(&chain, &proof, "eth_getBalance", &params)?;
    assert_eq!(result, json!(format!("0x{:x}", chain.balance)));
    Ok(())
}

#[test]
fn block_number_round_trip() -> anyhow::Result<()> {
    let chain = setup();
    let params = json!([]);
    let proof = prove(&chain, "eth_blockNumber", &params);

    let result = verify(&chain, &proof, "eth_blockNumber", &params)?;
    assert_eq!(result, json!(format!("0x{:x}", chain.block_number)));
    Ok(())
}

#[test]
fn receipt_round_trip() -> anyhow::Result<()> {
    let chain = setup();
    let tx_hash = chain.tx_hash(1);
    let params = json!([format!("{tx_hash}")]);
    let proof = prove(&chain, "eth_getTransactionReceipt", &params);

    let result = verify(&chain, &proof, "eth_getTransactionReceipt", &params)?;
    assert_eq!(result["transactionHash"], json!(format!("{tx_hash}")));
    assert_eq!(result["status"], json!("0x1"));
    assert_eq!(result["blockNumber"], json!("0x14d7970"));
    assert_eq!(result["transactionIndex"], json!("0x1"));
    // gasUsed = cumulative(1) - cumulative(0) = 0xa410 - 0x5208.
    assert_eq!(result["gasUsed"], json!("0x5208"));
    assert_eq!(result["logs"].as_array().unwrap().len(), 1);
    assert_eq!(
        result["logs"][0]["address"],
        json!("0xdac17f958d2ee523a2206206994597c13d831ec7")
    );
    Ok(())
}

#[test]
fn code_round_trip_honors_include_code_flag() -> anyhow::Result<()> {
    let chain = setup();
    let params = json!([format!("{}", chain.contract), "latest"]);

    // With INCLUDE_CODE the full bytecode comes back.
    let proof = prove_with_flags(
        &chain,
        "eth_getCode",
        &params,
        colibri_core::flags::INCLUDE_CODE,
    );
    let result = verify(&chain, &proof, "eth_getCode", &params)?;
    assert_eq!(result, json!(format!("0x{}", hex::encode(&chain.code))));

    // Without it no preimage is shipped, and the verifier answers with the
    // keccak of the code instead.
    let proof = prove_with_flags(&chain, "eth_getCode", &params, 0);
    assert!(
        !proof
            .windows(chain.code.len())
            .any(|window| window == chain.code),
        "proof without INCLUDE_CODE must not embed the bytecode"
    );
    let result = verify(&chain, &proof, "eth_getCode", &params)?;
    assert_eq!(
        result,
        json!(format!("0x{}", hex::encode(keccak256(&chain.code))))
    );
    Ok(())
}

#[test]
fn transaction_round_trip() {
    let chain = setup();
    let tx_hash = chain.tx_hash(0);
    let params = json!([format!("{tx_hash}")]);
    // The by-hash prover needs the locating RPC answered too.
    let mut prover = create_prover(
        "eth_getTransactionByHash",
        &params.to_string(),
        MAINNET,
        0,
    )
    .expect("create prover");
    let proof = drive_with_tx_lookup(&mut prover, &chain);

    let result =
        verify(&chain, &proof, "eth_getTransactionByHash", &params).expect("verifier succeeds");
    assert_eq!(result["hash"], json!(format!("{tx_hash}")));
    assert_eq!(result["nonce"], json!("0x3"));
    assert_eq!(result["blockNumber"], json!("0x14d7970"));
    // The sender was recovered, not copied.
    let from = result["from"].as_str().unwrap();
    assert!(from.starts_with("0x") && from.len() == 42);
}

/// Like `drive_prover` but also answers `eth_getTransactionByHash`.
fn drive_with_tx_lookup(prover: &mut colibri_core::ProverCtx, chain: &TestChain) -> Vec<u8> {
    use colibri_core::api::{execute_prover, get_proof, prover_set_response, Status};
    for _ in 0..40 {
        match execute_prover(prover) {
            Status::Success { .. } => return get_proof(prover).unwrap().to_vec(),
            Status::Error { error } => panic!("prover failed: {error}"),
            Status::Pending { requests } => {
                for request in requests {
                    let body = match &request.payload {
                        Some(p) if p["method"] == "eth_getTransactionByHash" => {
                            let wanted = p["params"][0].as_str().unwrap();
                            let index = (0..chain.raw_txs.len())
                                .find(|&i| format!("{}", chain.tx_hash(i)) == wanted)
                                .expect("unknown tx hash");
                            json!({"jsonrpc":"2.0","id":1,"result":{
                                "blockNumber": format!("0x{:x}", chain.block_number),
                                "transactionIndex": format!("0x{index:x}"),
                            }})
                            .to_string()
                            .into_bytes()
                        }
                        _ => chain.respond(&request),
                    };
                    assert!(prover_set_response(prover, request.req_ptr, body, 0));
                }
            }
        }
    }
    panic!("prover did not converge");
}

#[test]
fn tampering_never_changes_the_accepted_result() {
    let chain = setup();
    let params = json!([format!("{}", chain.account), "latest"]);
    let proof = prove(&chain, "eth_getBalance", &params);
    let honest = verify(&chain, &proof, "eth_getBalance", &params).expect("honest proof verifies");

    let known_kinds = [
        "decode failed",
        "proof invalid",
        "signature invalid",
        "integrity mismatch",
        "invalid input",
        "sync gap",
        "fetch failed",
    ];

    // Sample a flip in every 97-byte window of the proof.
    let mut flipped = 0;
    for offset in (0..proof.len()).step_by(97) {
        let mut tampered = proof.clone();
        tampered[offset] ^= 0x01;
        match verify(&chain, &tampered, "eth_getBalance", &params) {
            Err(error) => {
                let message = error.to_string();
                assert!(
                    known_kinds.iter().any(|kind| message.starts_with(kind)),
                    "unexpected error kind at offset {offset}: {message}"
                );
            }
            // Metadata bytes that do not influence the decision may
            // survive a flip — but the accepted result must not move.
            Ok(result) => assert_eq!(result, honest, "flip at {offset} changed the result"),
        }
        flipped += 1;
    }
    assert!(flipped > 10, "sweep covered too little of the proof");
}

#[test]
fn wrong_chain_is_rejected_before_crypto() {
    let chain = setup();
    let params = json!([format!("{}", chain.account), "latest"]);
    let proof = prove(&chain, "eth_getBalance", &params);

    let mut verifier = create_verifier(
        &proof,
        "eth_getBalance",
        &params.to_string(),
        11155111,
        TrustedHint::None,
    )
    .expect("create verifier");
    // No requests get fulfilled: rejection must not need any.
    match colibri_core::api::execute_verifier(&mut verifier) {
        colibri_core::api::Status::Error { error } => {
            assert!(error.starts_with("sync gap") || error.starts_with("invalid input"));
        }
        other => panic!("expected an immediate error, got {other:?}"),
    }
}

#[test]
fn local_methods_verify_with_empty_proof() {
    let _ = colibri_core::install_storage(Box::new(MemoryStorage::new()));
    let mut verifier =
        create_verifier(&[], "eth_chainId", "[]", MAINNET, TrustedHint::None).expect("create");
    match colibri_core::api::execute_verifier(&mut verifier) {
        colibri_core::api::Status::Success { result, .. } => assert_eq!(result, json!("0x1")),
        other => panic!("expected success, got {other:?}"),
    }
}
