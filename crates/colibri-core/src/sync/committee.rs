use std::sync::Mutex;

use alloy_primitives::B256;
use bitvec::prelude::*;
use blst::min_pk::{AggregatePublicKey, PublicKey, Signature};
use blst::BLST_ERROR;

use crate::beacon;
use crate::config;
use crate::error::Error;
use crate::ssz::{self, SszView};

/// Validators per sync committee.
pub const SYNC_COMMITTEE_SIZE: usize = 512;

/// 2/3 participation quorum. A sync aggregate below this carries too little
/// economic weight to extend trust.
pub const MIN_SYNC_COMMITTEE_PARTICIPANTS: usize = 342;

/// Committees at or above this participant count aggregate through the
/// host's worker hook when one is installed.
const PARALLEL_AGGREGATION_THRESHOLD: usize = 128;

/// DST for Ethereum sync committee signatures (hash-to-curve on G2).
const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// An owned sync committee: 512 compressed G1 public keys plus the
/// aggregate key, exactly as the SSZ container carries them.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncCommittee {
    pub pubkeys: Vec<[u8; 48]>,
    pub aggregate_pubkey: [u8; 48],
}

impl SyncCommittee {
    pub fn from_view(view: &SszView<'_>) -> Result<Self, Error> {
        let pubkeys_view = view.field("pubkeys")?;
        let mut pubkeys = Vec::with_capacity(SYNC_COMMITTEE_SIZE);
        for i in 0..SYNC_COMMITTEE_SIZE {
            let mut key = [0u8; 48];
            key.copy_from_slice(pubkeys_view.at(i)?.as_bytes());
            pubkeys.push(key);
        }
        let mut aggregate = [0u8; 48];
        aggregate.copy_from_slice(view.field("aggregate_pubkey")?.as_bytes());
        Ok(SyncCommittee {
            pubkeys,
            aggregate_pubkey: aggregate,
        })
    }

    pub fn to_ssz(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SYNC_COMMITTEE_SIZE * 48 + 48);
        for key in &self.pubkeys {
            bytes.extend_from_slice(key);
        }
        bytes.extend_from_slice(&self.aggregate_pubkey);
        bytes
    }

    pub fn from_ssz(bytes: &[u8]) -> Result<Self, Error> {
        let view = SszView::new(&beacon::SYNC_COMMITTEE, bytes)?;
        SyncCommittee::from_view(&view)
    }

    /// SSZ hash-tree-root of the committee container.
    pub fn tree_root(&self) -> Result<B256, Error> {
        Ok(ssz::hash_tree_root(&beacon::SYNC_COMMITTEE, &self.to_ssz())?)
    }
}

impl std::fmt::Debug for SyncCommittee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SyncCommittee(aggregate=0x{})",
            hex::encode(&self.aggregate_pubkey[..8])
        )
    }
}

/// Verify a 96-byte aggregate signature over `signing_root`, under the
/// subset of `committee` selected by the 512-bit participation mask.
///
/// One pairing check: `e(sum(pk_i), H(msg)) == e(G1, signature)`. Point
/// addition commutes, so partitioned aggregation through the worker hook
/// yields the identical sum.
pub fn verify_sync_aggregate(
    committee: &SyncCommittee,
    participation_bits: &[u8],
    signature: &[u8; 96],
    signing_root: &B256,
) -> Result<(), Error> {
    if participation_bits.len() != SYNC_COMMITTEE_SIZE / 8 {
        return Err(Error::SignatureInvalid(format!(
            "participation mask is {} bytes, expected 64",
            participation_bits.len()
        )));
    }
    if committee.pubkeys.len() != SYNC_COMMITTEE_SIZE {
        return Err(Error::SignatureInvalid(format!(
            "committee has {} keys, expected 512",
            committee.pubkeys.len()
        )));
    }

    let bits = BitSlice::<u8, Lsb0>::from_slice(participation_bits);
    let participants: Vec<usize> = bits.iter_ones().collect();
    if participants.is_empty() {
        return Err(Error::SignatureInvalid("empty participation mask".into()));
    }
    if participants.len() < MIN_SYNC_COMMITTEE_PARTICIPANTS {
        return Err(Error::SignatureInvalid(format!(
            "participation {}/512 below quorum {}",
            participants.len(),
            MIN_SYNC_COMMITTEE_PARTICIPANTS
        )));
    }

    let keys = deserialize_participants(committee, &participants)?;
    let key_refs: Vec<&PublicKey> = keys.iter().collect();
    let aggregate = AggregatePublicKey::aggregate(&key_refs, false)
        .map_err(|e| Error::SignatureInvalid(format!("key aggregation: {e:?}")))?
        .to_public_key();

    let sig = Signature::from_bytes(signature)
        .map_err(|e| Error::SignatureInvalid(format!("signature bytes: {e:?}")))?;

    match sig.verify(true, signing_root.as_slice(), BLS_DST, &[], &aggregate, true) {
        BLST_ERROR::BLST_SUCCESS => Ok(()),
        err => Err(Error::SignatureInvalid(format!(
            "aggregate check failed: {err:?}"
        ))),
    }
}

/// Decompress the participating keys, in mask order. Offloaded to the
/// worker hook for large committees — decompression dominates the cost.
fn deserialize_participants(
    committee: &SyncCommittee,
    participants: &[usize],
) -> Result<Vec<PublicKey>, Error> {
    if participants.len() < PARALLEL_AGGREGATION_THRESHOLD {
        return participants
            .iter()
            .map(|&i| {
                PublicKey::from_bytes(&committee.pubkeys[i])
                    .map_err(|e| Error::SignatureInvalid(format!("pubkey {i}: {e:?}")))
            })
            .collect();
    }

    let parsed: Mutex<Vec<(usize, Option<PublicKey>)>> =
        Mutex::new(Vec::with_capacity(participants.len()));
    config::parallel_for(0, participants.len(), &|i| {
        let index = participants[i];
        let key = PublicKey::from_bytes(&committee.pubkeys[index]).ok();
        parsed.lock().unwrap().push((i, key));
    });

    let mut collected = parsed.into_inner().unwrap();
    collected.sort_unstable_by_key(|(i, _)| *i);
    collected
        .into_iter()
        .map(|(i, key)| {
            key.ok_or_else(|| {
                Error::SignatureInvalid(format!("pubkey {} failed to decompress", participants[i]))
            })
        })
        .collect()
}

/// Seeded keys and committee signing helpers shared by the crate's tests.
#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use blst::min_pk::{AggregateSignature, SecretKey};

    pub(crate) fn test_secret_key(index: usize) -> SecretKey {
        let mut ikm = [0x42u8; 32];
        ikm[..8].copy_from_slice(&(index as u64).to_le_bytes());
        SecretKey::key_gen(&ikm, &[]).unwrap()
    }

    pub(crate) fn test_committee() -> (Vec<SecretKey>, SyncCommittee) {
        let secrets: Vec<SecretKey> = (0..SYNC_COMMITTEE_SIZE).map(test_secret_key).collect();
        let pubkeys: Vec<[u8; 48]> = secrets.iter().map(|sk| sk.sk_to_pk().to_bytes()).collect();
        let committee = SyncCommittee {
            pubkeys,
            aggregate_pubkey: secrets[0].sk_to_pk().to_bytes(),
        };
        (secrets, committee)
    }

    pub(crate) fn sign_root(
        secrets: &[SecretKey],
        participants: &[usize],
        root: &B256,
    ) -> ([u8; 64], [u8; 96]) {
        let mut bits = [0u8; 64];
        for &i in participants {
            bits[i / 8] |= 1 << (i % 8);
        }
        let sigs: Vec<_> = participants
            .iter()
            .map(|&i| secrets[i].sign(root.as_slice(), BLS_DST, &[]))
            .collect();
        let sig_refs: Vec<_> = sigs.iter().collect();
        let aggregate = AggregateSignature::aggregate(&sig_refs, false)
            .unwrap()
            .to_signature();
        (bits, aggregate.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::testkit::*;
    use super::*;

    #[test]
    fn aggregate_of_quorum_verifies() {
        let (secrets, committee) = test_committee();
        let root = B256::repeat_byte(0x11);
        let participants: Vec<usize> = (0..400).collect();
        let (bits, signature) = sign_root(&secrets, &participants, &root);
        verify_sync_aggregate(&committee, &bits, &signature, &root).unwrap();
    }

    #[test]
    fn wrong_root_fails() {
        let (secrets, committee) = test_committee();
        let root = B256::repeat_byte(0x11);
        let participants: Vec<usize> = (0..400).collect();
        let (bits, signature) = sign_root(&secrets, &participants, &root);
        let other = B256::repeat_byte(0x12);
        assert!(matches!(
            verify_sync_aggregate(&committee, &bits, &signature, &other),
            Err(Error::SignatureInvalid(_))
        ));
    }

    #[test]
    fn empty_mask_is_rejected() {
        let (_, committee) = test_committee();
        let root = B256::ZERO;
        assert!(matches!(
            verify_sync_aggregate(&committee, &[0u8; 64], &[0u8; 96], &root),
            Err(Error::SignatureInvalid(_))
        ));
    }

    #[test]
    fn below_quorum_is_rejected() {
        let (secrets, committee) = test_committee();
        let root = B256::repeat_byte(0x33);
        let participants: Vec<usize> = (0..100).collect();
        let (bits, signature) = sign_root(&secrets, &participants, &root);
        let err = verify_sync_aggregate(&committee, &bits, &signature, &root).unwrap_err();
        assert!(err.to_string().contains("quorum"));
    }

    #[test]
    fn mask_signature_mismatch_fails() {
        let (secrets, committee) = test_committee();
        let root = B256::repeat_byte(0x44);
        let participants: Vec<usize> = (0..400).collect();
        let (_, signature) = sign_root(&secrets, &participants, &root);
        // Mask claims one extra participant who never signed.
        let extra: Vec<usize> = (0..401).collect();
        let (bits, _) = sign_root(&secrets, &extra, &root);
        assert!(verify_sync_aggregate(&committee, &bits, &signature, &root).is_err());
    }

    #[test]
    fn committee_root_is_deterministic() {
        let (_, committee) = test_committee();
        assert_eq!(
            committee.tree_root().unwrap(),
            committee.tree_root().unwrap()
        );
        let decoded = SyncCommittee::from_ssz(&committee.to_ssz()).unwrap();
        assert_eq!(decoded, committee);
    }
}
