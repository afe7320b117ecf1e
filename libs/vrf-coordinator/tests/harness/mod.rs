#![allow(dead_code)]

use std::sync::Arc;

use alloy_primitives::aliases::{U24, U40};
use alloy_primitives::{Address, Bytes, B256, U256};
use common::interfaces::dkg::IDKG;
use common::interfaces::vrf_beacon::IVRFBeacon;
use common::interfaces::vrf_coordinator::IVRFCoordinator;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vrf_coordinator::memory::{MemoryChain, StaticBeacon, StaticCoordinator};
use vrf_coordinator::{
    epoch_and_round, AbstractReport, AbstractVrfOutput, ContractRouter, Coordinator,
    CoordinatorConfig, CoordinatorSettings,
};

pub const BEACON: Address = Address::new([0xbe; 20]);
pub const COORDINATOR: Address = Address::new([0xc0; 20]);
pub const DKG: Address = Address::new([0xd6; 20]);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub chain: Arc<MemoryChain>,
    pub coordinator: Coordinator,
    pub cancel: CancellationToken,
}

pub fn settings(offchain: CoordinatorConfig) -> CoordinatorSettings {
    CoordinatorSettings::new(BEACON, COORDINATOR, DKG).with_offchain(offchain)
}

pub async fn harness(latest: u64, offchain: CoordinatorConfig) -> Harness {
    harness_with(
        Arc::new(MemoryChain::new(latest)),
        StaticBeacon::new(BEACON),
        StaticCoordinator::new(COORDINATOR),
        settings(offchain),
    )
    .await
}

pub async fn harness_with(
    chain: Arc<MemoryChain>,
    beacon: StaticBeacon,
    coordinator: StaticCoordinator,
    settings: CoordinatorSettings,
) -> Harness {
    init_tracing();

    let cancel = CancellationToken::new();
    let router = ContractRouter::new(Arc::new(beacon), Arc::new(coordinator));
    let coordinator = Coordinator::new(settings, router, chain.clone(), chain.clone(), &cancel)
        .await
        .expect("coordinator");

    Harness {
        chain,
        coordinator,
        cancel,
    }
}

/// Lookback wide enough to see requests made ten blocks back
pub fn lookback(blocks: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        lookback_blocks: blocks,
        ..Default::default()
    }
}

pub fn randomness_requested(
    request_id: u64,
    height: u64,
    delay: u32,
) -> IVRFCoordinator::RandomnessRequested {
    IVRFCoordinator::RandomnessRequested {
        requestID: U256::from(request_id),
        requester: Address::repeat_byte(0xaa),
        nextBeaconOutputHeight: height,
        confDelay: U24::from(delay),
        subID: U256::from(1),
        numWords: 1,
        costJuels: U256::ZERO,
        newSubBalance: U256::ZERO,
    }
}

pub fn fulfillment_requested(
    request_id: u64,
    height: u64,
    delay: u32,
    gas_allowance: u32,
) -> IVRFCoordinator::RandomnessFulfillmentRequested {
    IVRFCoordinator::RandomnessFulfillmentRequested {
        requestID: U256::from(request_id),
        requester: Address::repeat_byte(0xaa),
        nextBeaconOutputHeight: height,
        confDelay: U24::from(delay),
        subID: U256::from(1),
        numWords: 2,
        gasAllowance: gas_allowance,
        gasPrice: U256::from(1_000),
        weiPerUnitLink: U256::from(10),
        arguments: Bytes::from_static(b"callback"),
        costJuels: U256::ZERO,
        newSubBalance: U256::ZERO,
    }
}

/// `fulfilled` pairs request ids with their success flag
pub fn words_fulfilled(fulfilled: &[(u64, bool)]) -> IVRFCoordinator::RandomWordsFulfilled {
    IVRFCoordinator::RandomWordsFulfilled {
        requestIDs: fulfilled.iter().map(|(id, _)| U256::from(*id)).collect(),
        successfulFulfillment: fulfilled.iter().map(|(_, ok)| u8::from(*ok)).collect(),
        truncatedErrorData: vec![Bytes::new(); fulfilled.len()],
        subBalances: vec![],
        subIDs: vec![],
    }
}

pub fn outputs_served(recent_height: u64, outputs: &[(u64, u32)]) -> IVRFCoordinator::OutputsServed {
    IVRFCoordinator::OutputsServed {
        recentBlockHeight: recent_height,
        juelsPerFeeCoin: Default::default(),
        reasonableGasPrice: 0,
        outputsServed: outputs
            .iter()
            .map(|(height, delay)| IVRFCoordinator::OutputServed {
                height: *height,
                confirmationDelay: U24::from(*delay),
                proofG1X: U256::from(1),
                proofG1Y: U256::from(2),
            })
            .collect(),
    }
}

pub fn new_transmission(epoch: u32, round: u8, config_digest: B256) -> IVRFBeacon::NewTransmission {
    IVRFBeacon::NewTransmission {
        epochAndRound: U40::from(epoch_and_round(epoch, round)),
        transmitter: Address::repeat_byte(0x77),
        juelsPerFeeCoin: Default::default(),
        reasonableGasPrice: 0,
        configDigest: config_digest,
    }
}

fn committee(tag: u8, signers: usize, transmitters: usize) -> (Vec<Address>, Vec<Address>) {
    (
        (0..signers).map(|i| Address::repeat_byte(tag + i as u8)).collect(),
        (0..transmitters)
            .map(|i| Address::repeat_byte(tag + 0x40 + i as u8))
            .collect(),
    )
}

pub fn vrf_config_set(tag: u8, signers: usize, transmitters: usize) -> IVRFBeacon::ConfigSet {
    let (signers, transmitters) = committee(tag, signers, transmitters);
    IVRFBeacon::ConfigSet {
        previousConfigBlockNumber: 0,
        configDigest: B256::repeat_byte(tag),
        configCount: 1,
        signers,
        transmitters,
        f: 1,
        onchainConfig: Bytes::new(),
        offchainConfigVersion: 1,
        offchainConfig: Bytes::new(),
    }
}

pub fn dkg_config_set(tag: u8, signers: usize, transmitters: usize) -> IDKG::ConfigSet {
    let (signers, transmitters) = committee(tag, signers, transmitters);
    IDKG::ConfigSet {
        previousConfigBlockNumber: 0,
        configDigest: B256::repeat_byte(tag),
        configCount: 1,
        signers,
        transmitters,
        f: 1,
        onchainConfig: Bytes::new(),
        offchainConfigVersion: 1,
        offchainConfig: Bytes::new(),
    }
}

/// Report carrying `blocks` with proofs, built against the canonical tip.
pub fn report(chain: &MemoryChain, blocks: &[(u64, u32)]) -> AbstractReport {
    let height = chain.latest();
    AbstractReport {
        outputs: blocks
            .iter()
            .map(|(block_height, confirmation_delay)| AbstractVrfOutput {
                block_height: *block_height,
                confirmation_delay: *confirmation_delay,
                vrf_proof: Bytes::from_static(&[1u8; 64]),
                callbacks: vec![],
            })
            .collect(),
        recent_block_height: height,
        recent_block_hash: chain.canonical_hash(height).unwrap_or_default(),
    }
}
