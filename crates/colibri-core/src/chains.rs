//! Chain registry: fork schedules, period math, and signing domains.
//!
//! Everything the engines need to interpret slots and verify signatures for
//! a chain is carried here, including the per-chain Capella base period used
//! by historic proofs — no bare constants in proof code.

use crate::error::Error;
use crate::primitives::hash::sha256;

/// Domain type for sync committee signatures.
pub const DOMAIN_SYNC_COMMITTEE: [u8; 4] = [0x07, 0x00, 0x00, 0x00];

/// Well-known chain ids.
pub const MAINNET: u64 = 1;
pub const SEPOLIA: u64 = 11155111;

/// Consensus fork names, in activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ForkId {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
}

/// Static description of one chain.
#[derive(Debug)]
pub struct ChainSpec {
    pub chain_id: u64,
    pub name: &'static str,
    pub genesis_validators_root: [u8; 32],
    /// log2 of slots per epoch (32 slots -> 5).
    pub slots_per_epoch_bits: u32,
    /// log2 of epochs per sync committee period (256 epochs -> 8).
    pub epochs_per_period_bits: u32,
    /// (fork, activation epoch, fork version), ascending by epoch.
    pub forks: &'static [(ForkId, u64, [u8; 4])],
    /// First period with a `historical_summaries` entry (Capella activation).
    pub capella_period: u64,
}

static MAINNET_SPEC: ChainSpec = ChainSpec {
    chain_id: MAINNET,
    name: "mainnet",
    genesis_validators_root: [
        0x4b, 0x36, 0x3d, 0xb9, 0x4e, 0x28, 0x61, 0x20, 0xd7, 0x6e, 0xb9, 0x05, 0x34, 0x0f,
        0xdd, 0x4e, 0x54, 0xbf, 0xe9, 0xf0, 0x6b, 0xf3, 0x3f, 0xf6, 0xcf, 0x5a, 0xd2, 0x7f,
        0x51, 0x1b, 0xfe, 0x95,
    ],
    slots_per_epoch_bits: 5,
    epochs_per_period_bits: 8,
    forks: &[
        (ForkId::Phase0, 0, [0x00, 0x00, 0x00, 0x00]),
        (ForkId::Altair, 74240, [0x01, 0x00, 0x00, 0x00]),
        (ForkId::Bellatrix, 144896, [0x02, 0x00, 0x00, 0x00]),
        (ForkId::Capella, 194048, [0x03, 0x00, 0x00, 0x00]),
        (ForkId::Deneb, 269568, [0x04, 0x00, 0x00, 0x00]),
        (ForkId::Electra, 364032, [0x05, 0x00, 0x00, 0x00]),
    ],
    capella_period: 758,
};

static SEPOLIA_SPEC: ChainSpec = ChainSpec {
    chain_id: SEPOLIA,
    name: "sepolia",
    genesis_validators_root: [
        0xd8, 0xea, 0x17, 0x1f, 0x3c, 0x94, 0xae, 0xa2, 0x1e, 0xbc, 0x42, 0xa1, 0xed, 0x61,
        0x05, 0x2a, 0xcf, 0x3f, 0x92, 0x09, 0xc0, 0x0e, 0x4e, 0xfb, 0xaa, 0xdd, 0xac, 0x09,
        0xed, 0x9b, 0x80, 0x78,
    ],
    slots_per_epoch_bits: 5,
    epochs_per_period_bits: 8,
    forks: &[
        (ForkId::Phase0, 0, [0x90, 0x00, 0x00, 0x69]),
        (ForkId::Altair, 50, [0x90, 0x00, 0x00, 0x70]),
        (ForkId::Bellatrix, 100, [0x90, 0x00, 0x00, 0x71]),
        (ForkId::Capella, 56832, [0x90, 0x00, 0x00, 0x72]),
        (ForkId::Deneb, 132608, [0x90, 0x00, 0x00, 0x73]),
        (ForkId::Electra, 222464, [0x90, 0x00, 0x00, 0x74]),
    ],
    capella_period: 222,
};

impl ChainSpec {
    /// Registry lookup; unsupported chain ids are an input error.
    pub fn get(chain_id: u64) -> Result<&'static ChainSpec, Error> {
        match chain_id {
            MAINNET => Ok(&MAINNET_SPEC),
            SEPOLIA => Ok(&SEPOLIA_SPEC),
            other => Err(Error::input(format!("unsupported chain id {other}"))),
        }
    }

    pub fn epoch(&self, slot: u64) -> u64 {
        slot >> self.slots_per_epoch_bits
    }

    pub fn period(&self, slot: u64) -> u64 {
        slot >> (self.slots_per_epoch_bits + self.epochs_per_period_bits)
    }

    pub fn slots_per_period(&self) -> u64 {
        1 << (self.slots_per_epoch_bits + self.epochs_per_period_bits)
    }

    pub fn first_slot_of_period(&self, period: u64) -> u64 {
        period << (self.slots_per_epoch_bits + self.epochs_per_period_bits)
    }

    /// Active fork at the given epoch.
    pub fn fork_at_epoch(&self, epoch: u64) -> (ForkId, [u8; 4]) {
        let mut current = (self.forks[0].0, self.forks[0].2);
        for (fork, activation, version) in self.forks {
            if *activation <= epoch {
                current = (*fork, *version);
            }
        }
        current
    }

    pub fn fork_at_slot(&self, slot: u64) -> (ForkId, [u8; 4]) {
        self.fork_at_epoch(self.epoch(slot))
    }

    /// Signing domain for the fork active at `epoch`:
    /// `domain_type ++ fork_data_root[..28]`.
    pub fn domain(&self, domain_type: [u8; 4], epoch: u64) -> [u8; 32] {
        let (_, fork_version) = self.fork_at_epoch(epoch);
        let fork_data_root = fork_data_root(fork_version, self.genesis_validators_root);
        let mut domain = [0u8; 32];
        domain[..4].copy_from_slice(&domain_type);
        domain[4..].copy_from_slice(&fork_data_root[..28]);
        domain
    }

    /// Index into `historical_summaries` for a block in `block_period`.
    pub fn summary_index(&self, block_period: u64) -> Result<u64, Error> {
        block_period.checked_sub(self.capella_period).ok_or_else(|| {
            Error::input(format!(
                "period {block_period} predates historical summaries on {}",
                self.name
            ))
        })
    }
}

/// `hash_tree_root(ForkData{current_version, genesis_validators_root})`.
fn fork_data_root(fork_version: [u8; 4], genesis_validators_root: [u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    data[..4].copy_from_slice(&fork_version);
    data[32..].copy_from_slice(&genesis_validators_root);
    sha256(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_math_uses_bit_shifts() {
        let spec = ChainSpec::get(MAINNET).unwrap();
        assert_eq!(spec.epoch(64), 2);
        assert_eq!(spec.period(8192), 1);
        assert_eq!(spec.slots_per_period(), 8192);
        assert_eq!(spec.first_slot_of_period(3), 24576);
    }

    #[test]
    fn fork_schedule_selects_latest_active() {
        let spec = ChainSpec::get(MAINNET).unwrap();
        assert_eq!(spec.fork_at_epoch(0).0, ForkId::Phase0);
        assert_eq!(spec.fork_at_epoch(269568).0, ForkId::Deneb);
        assert_eq!(spec.fork_at_epoch(364031).0, ForkId::Deneb);
        assert_eq!(spec.fork_at_epoch(364032).0, ForkId::Electra);
    }

    #[test]
    fn domain_starts_with_domain_type() {
        let spec = ChainSpec::get(MAINNET).unwrap();
        let domain = spec.domain(DOMAIN_SYNC_COMMITTEE, 300000);
        assert_eq!(&domain[..4], &DOMAIN_SYNC_COMMITTEE);
        // Deterministic.
        assert_eq!(domain, spec.domain(DOMAIN_SYNC_COMMITTEE, 300000));
        // Different forks give different domains.
        assert_ne!(domain, spec.domain(DOMAIN_SYNC_COMMITTEE, 400000));
    }

    #[test]
    fn unsupported_chain_is_input_invalid() {
        assert!(matches!(
            ChainSpec::get(424242),
            Err(Error::InputInvalid(_))
        ));
    }

    #[test]
    fn summary_index_is_relative_to_capella() {
        let spec = ChainSpec::get(MAINNET).unwrap();
        assert_eq!(spec.summary_index(760).unwrap(), 2);
        assert!(spec.summary_index(10).is_err());
    }
}
