//! Domain types exchanged with the report-producing protocol.

use std::collections::HashSet;
use std::time::Duration;

use alloy_primitives::aliases::U96;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Beacon output slot that needs randomness, keyed by `(height, confirmation_delay)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub confirmation_delay: u32,
    /// Canonical hash of the block at `height`
    pub hash: B256,
}

/// A client's request for randomness delivered through a contract callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub request_id: u64,
    pub beacon_height: u64,
    pub confirmation_delay: u32,
    pub subscription_id: u64,
    pub requester: Address,
    pub arguments: Bytes,
    pub gas_allowance: U96,
    /// Price tracking is not implemented, always zero
    pub price: U96,
    /// Block the request was emitted in
    pub request_height: u64,
    pub request_block_hash: B256,
    pub num_words: u16,
    pub gas_price: U256,
    pub wei_per_unit_link: U256,
}

/// Signers and transmitters of one OCR committee.
///
/// `signers[i]` and `transmitters[i]` belong to the same oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrCommittee {
    pub signers: Vec<Address>,
    pub transmitters: Vec<Address>,
}

/// Identifier of the DKG key backing the beacon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub B256);

/// One beacon output as carried by an accepted report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractVrfOutput {
    pub block_height: u64,
    pub confirmation_delay: u32,
    /// Empty when the output only serves callbacks for an already served block
    pub vrf_proof: Bytes,
    pub callbacks: Vec<CallbackRequest>,
}

/// Report contents handed back by the transmission layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractReport {
    pub outputs: Vec<AbstractVrfOutput>,
    /// Height and hash of the chain view the report was built against
    pub recent_block_height: u64,
    pub recent_block_hash: B256,
}

/// Inputs of [`crate::Coordinator::report_blocks`]
#[derive(Debug, Clone, Default)]
pub struct ReportBlocksParams {
    pub confirmation_delays: HashSet<u32>,
    // Accepted for interface compatibility, not consulted yet.
    pub slot_interval: u16,
    pub retransmission_delay: Duration,
    pub max_blocks: usize,
    pub max_callbacks: usize,
}

impl ReportBlocksParams {
    pub fn new(confirmation_delays: impl IntoIterator<Item = u32>) -> Self {
        Self {
            confirmation_delays: confirmation_delays.into_iter().collect(),
            ..Default::default()
        }
    }
}

/// Result of [`crate::Coordinator::report_blocks`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBlocksOutput {
    pub blocks: Vec<Block>,
    pub callbacks: Vec<CallbackRequest>,
    pub recent_block_hashes_start_height: u64,
    /// Canonical hashes from `recent_block_hashes_start_height` up to the
    /// current height, ascending
    pub recent_block_hashes: Vec<B256>,
}

/// Set key for a requested beacon output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockKey {
    pub height: u64,
    pub confirmation_delay: u32,
}

/// A block accepted for transmission, with the chain view of its report
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockInReport {
    pub block: BlockKey,
    pub recent_block_height: u64,
    pub recent_block_hash: B256,
}

/// A callback accepted for transmission, with the chain view of its report
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackInReport {
    pub beacon_height: u64,
    pub request_id: u64,
    pub recent_block_height: u64,
    pub recent_block_hash: B256,
}

/// Cache key of a requested block: big-endian height then big-endian delay,
/// left-padded to 32 bytes.
///
/// The block hash is not part of the key; the cached entry carries the hash
/// it was accepted against and is checked against the canonical chain.
pub fn block_cache_key(height: u64, confirmation_delay: u64) -> B256 {
    let mut key = [0u8; 32];
    key[16..24].copy_from_slice(&height.to_be_bytes());
    key[24..32].copy_from_slice(&confirmation_delay.to_be_bytes());
    B256::from(key)
}

/// Cache key of a callback: the request id as a big-endian 256-bit word
pub fn callback_cache_key(request_id: u64) -> B256 {
    B256::from(U256::from(request_id))
}

/// Packs an OCR epoch and round the way `NewTransmission` indexes them.
pub fn epoch_and_round(epoch: u32, round: u8) -> u64 {
    (u64::from(epoch) << 8) | u64::from(round)
}

/// Left-padded 32-byte topic for an `epochAndRound` value
pub fn epoch_and_round_topic(epoch: u32, round: u8) -> B256 {
    B256::left_padding_from(&epoch_and_round(epoch, round).to_be_bytes())
}

/// Whether the output at `beacon_height` has enough confirmations at `current_height`.
///
/// The request block must itself be at least `confirmation_delay` deep.
pub fn is_block_eligible(
    beacon_height: u64,
    confirmation_delay: u32,
    request_height: u64,
    current_height: u64,
) -> bool {
    let delay = u64::from(confirmation_delay);

    // Low simulated chains can have fewer blocks than the delay.
    if delay >= current_height {
        return false;
    }
    beacon_height < current_height - delay && current_height >= request_height.saturating_add(delay)
}

/// First height of the recent block hash window ending at `current_height`.
pub fn recent_block_hashes_start_height(current_height: u64, blockhash_lookback: u64) -> u64 {
    if current_height >= blockhash_lookback {
        current_height - blockhash_lookback + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn test_block_cache_key_encoding() {
        assert_eq!(
            block_cache_key(1, 11),
            b256!("000000000000000000000000000000000000000000000001000000000000000b")
        );
        assert_ne!(block_cache_key(1, 11), block_cache_key(11, 1));
    }

    #[test]
    fn test_callback_cache_key_is_big_endian_word() {
        let key = callback_cache_key(0x0102);
        assert_eq!(key[30], 0x01);
        assert_eq!(key[31], 0x02);
        assert!(key[..30].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_epoch_and_round_packing() {
        assert_eq!(epoch_and_round(1, 2), 0x0102);
        assert_eq!(epoch_and_round(u32::MAX, u8::MAX), 0xff_ffff_ffff);

        let topic = epoch_and_round_topic(1, 2);
        assert_eq!(U256::from_be_bytes(topic.0), U256::from(0x0102u64));
    }

    #[test]
    fn test_block_eligibility() {
        // Output 195, delay 3, requested at 191: eligible from 199 on
        assert!(!is_block_eligible(195, 3, 191, 198));
        assert!(is_block_eligible(195, 3, 191, 199));
        assert!(is_block_eligible(195, 3, 191, 200));

        // Delay not smaller than the chain height
        assert!(!is_block_eligible(0, 5, 0, 5));

        // Request block not deep enough yet
        assert!(!is_block_eligible(10, 3, 98, 100));
        assert!(is_block_eligible(10, 3, 97, 100));
    }

    #[test]
    fn test_recent_block_hashes_start_height() {
        assert_eq!(recent_block_hashes_start_height(200, 5), 196);
        assert_eq!(recent_block_hashes_start_height(1_000, 256), 745);
        assert_eq!(recent_block_hashes_start_height(3, 256), 0);
    }

    #[test]
    fn test_report_blocks_params_collects_delays() {
        let params = ReportBlocksParams::new([1, 3, 3, 10]);
        assert_eq!(params.confirmation_delays.len(), 3);
        assert!(params.confirmation_delays.contains(&10));
        assert_eq!(params.max_blocks, 0);
    }
}
