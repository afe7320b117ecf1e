//! Typed decoding of beacon, coordinator and DKG contract logs
//!
//! Each `decode_*` function turns one raw log into a domain record and copies
//! over the log's position on chain. A decode failure concerns a single log;
//! callers skip it and keep processing the batch.

use alloy::rpc::types::Log;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use common::interfaces::dkg::IDKG;
use common::interfaces::vrf_beacon::IVRFBeacon;
use common::interfaces::vrf_coordinator::IVRFCoordinator;

use crate::topics::Topics;

/// Errors that can occur while decoding a log
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    NoTopics,

    #[error("unknown event signature: {0}")]
    UnknownSignature(B256),

    /// Log emitted by an address that is not one of the routed contracts
    #[error("unknown log from {0}")]
    UnknownLog(Address),

    /// Known event, but not one the emitting contract produces
    #[error("{event} is not emitted by {address}")]
    UnexpectedEvent {
        event: &'static str,
        address: Address,
    },

    #[error("failed to decode {event}: {reason}")]
    Abi { event: &'static str, reason: String },

    #[error("{event}.{field} does not fit in 64 bits: {value}")]
    OutOfRange {
        event: &'static str,
        field: &'static str,
        value: U256,
    },
}

/// Position of a log on chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogMeta {
    pub address: Address,
    pub block_number: u64,
    pub block_hash: B256,
    pub tx_hash: B256,
    pub log_index: u64,
}

impl LogMeta {
    pub fn from_log(log: &Log) -> Self {
        Self {
            address: log.address(),
            block_number: log.block_number.unwrap_or_default(),
            block_hash: log.block_hash.unwrap_or_default(),
            tx_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomnessRequestedEvent {
    pub request_id: u64,
    pub requester: Address,
    pub next_beacon_output_height: u64,
    pub confirmation_delay: u32,
    pub subscription_id: u64,
    pub num_words: u16,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomnessFulfillmentRequestedEvent {
    pub request_id: u64,
    pub requester: Address,
    pub next_beacon_output_height: u64,
    pub confirmation_delay: u32,
    pub subscription_id: u64,
    pub num_words: u16,
    pub gas_allowance: u32,
    pub gas_price: U256,
    pub wei_per_unit_link: U256,
    pub arguments: Bytes,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomWordsFulfilledEvent {
    pub request_ids: Vec<u64>,
    /// One byte per entry of `request_ids`, non-zero on success
    pub successful_fulfillment: Bytes,
    pub meta: LogMeta,
}

impl RandomWordsFulfilledEvent {
    /// Request ids whose callback succeeded on chain
    pub fn successful_request_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.request_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| self.successful_fulfillment.get(*i).is_some_and(|b| *b != 0))
            .map(|(_, id)| *id)
    }
}

/// `(height, confirmation_delay)` pair reported as served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServedOutput {
    pub height: u64,
    pub confirmation_delay: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputsServedEvent {
    pub recent_block_height: u64,
    pub outputs: Vec<ServedOutput>,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransmissionEvent {
    pub epoch_and_round: u64,
    pub transmitter: Address,
    pub config_digest: B256,
    pub meta: LogMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSetEvent {
    pub config_digest: B256,
    pub config_count: u64,
    pub signers: Vec<Address>,
    pub transmitters: Vec<Address>,
    pub f: u8,
    pub meta: LogMeta,
}

/// Any event the coordinator understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VrfEvent {
    RandomnessRequested(RandomnessRequestedEvent),
    RandomnessFulfillmentRequested(RandomnessFulfillmentRequestedEvent),
    RandomWordsFulfilled(RandomWordsFulfilledEvent),
    OutputsServed(OutputsServedEvent),
    NewTransmission(NewTransmissionEvent),
    ConfigSet(ConfigSetEvent),
}

impl VrfEvent {
    pub fn name(&self) -> &'static str {
        match self {
            VrfEvent::RandomnessRequested(_) => "RandomnessRequested",
            VrfEvent::RandomnessFulfillmentRequested(_) => "RandomnessFulfillmentRequested",
            VrfEvent::RandomWordsFulfilled(_) => "RandomWordsFulfilled",
            VrfEvent::OutputsServed(_) => "OutputsServed",
            VrfEvent::NewTransmission(_) => "NewTransmission",
            VrfEvent::ConfigSet(_) => "ConfigSet",
        }
    }

    pub fn meta(&self) -> &LogMeta {
        match self {
            VrfEvent::RandomnessRequested(e) => &e.meta,
            VrfEvent::RandomnessFulfillmentRequested(e) => &e.meta,
            VrfEvent::RandomWordsFulfilled(e) => &e.meta,
            VrfEvent::OutputsServed(e) => &e.meta,
            VrfEvent::NewTransmission(e) => &e.meta,
            VrfEvent::ConfigSet(e) => &e.meta,
        }
    }
}

fn topic0(log: &Log) -> Result<B256, DecodeError> {
    log.topics().first().copied().ok_or(DecodeError::NoTopics)
}

// Checks topic0 before ABI decoding so a mismatched log reports its signature.
fn decode_raw<E: SolEvent>(log: &Log, event: &'static str) -> Result<E, DecodeError> {
    let sig = topic0(log)?;
    if sig != E::SIGNATURE_HASH {
        return Err(DecodeError::UnknownSignature(sig));
    }
    E::decode_log(&log.inner)
        .map(|decoded| decoded.data)
        .map_err(|e| DecodeError::Abi {
            event,
            reason: e.to_string(),
        })
}

fn narrow(event: &'static str, field: &'static str, value: U256) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::OutOfRange {
        event,
        field,
        value,
    })
}

pub fn decode_randomness_requested(log: &Log) -> Result<RandomnessRequestedEvent, DecodeError> {
    const EVENT: &str = "RandomnessRequested";
    let decoded: IVRFCoordinator::RandomnessRequested = decode_raw(log, EVENT)?;

    Ok(RandomnessRequestedEvent {
        request_id: narrow(EVENT, "requestID", decoded.requestID)?,
        requester: decoded.requester,
        next_beacon_output_height: decoded.nextBeaconOutputHeight,
        confirmation_delay: decoded.confDelay.to::<u32>(),
        subscription_id: narrow(EVENT, "subID", decoded.subID)?,
        num_words: decoded.numWords,
        meta: LogMeta::from_log(log),
    })
}

pub fn decode_randomness_fulfillment_requested(
    log: &Log,
) -> Result<RandomnessFulfillmentRequestedEvent, DecodeError> {
    const EVENT: &str = "RandomnessFulfillmentRequested";
    let decoded: IVRFCoordinator::RandomnessFulfillmentRequested = decode_raw(log, EVENT)?;

    Ok(RandomnessFulfillmentRequestedEvent {
        request_id: narrow(EVENT, "requestID", decoded.requestID)?,
        requester: decoded.requester,
        next_beacon_output_height: decoded.nextBeaconOutputHeight,
        confirmation_delay: decoded.confDelay.to::<u32>(),
        subscription_id: narrow(EVENT, "subID", decoded.subID)?,
        num_words: decoded.numWords,
        gas_allowance: decoded.gasAllowance,
        gas_price: decoded.gasPrice,
        wei_per_unit_link: decoded.weiPerUnitLink,
        arguments: decoded.arguments,
        meta: LogMeta::from_log(log),
    })
}

pub fn decode_random_words_fulfilled(log: &Log) -> Result<RandomWordsFulfilledEvent, DecodeError> {
    const EVENT: &str = "RandomWordsFulfilled";
    let decoded: IVRFCoordinator::RandomWordsFulfilled = decode_raw(log, EVENT)?;

    let request_ids = decoded
        .requestIDs
        .into_iter()
        .map(|id| narrow(EVENT, "requestIDs", id))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RandomWordsFulfilledEvent {
        request_ids,
        successful_fulfillment: decoded.successfulFulfillment,
        meta: LogMeta::from_log(log),
    })
}

pub fn decode_outputs_served(log: &Log) -> Result<OutputsServedEvent, DecodeError> {
    const EVENT: &str = "OutputsServed";
    let decoded: IVRFCoordinator::OutputsServed = decode_raw(log, EVENT)?;

    let outputs = decoded
        .outputsServed
        .iter()
        .map(|o| ServedOutput {
            height: o.height,
            confirmation_delay: o.confirmationDelay.to::<u32>(),
        })
        .collect();

    Ok(OutputsServedEvent {
        recent_block_height: decoded.recentBlockHeight,
        outputs,
        meta: LogMeta::from_log(log),
    })
}

pub fn decode_new_transmission(log: &Log) -> Result<NewTransmissionEvent, DecodeError> {
    let decoded: IVRFBeacon::NewTransmission = decode_raw(log, "NewTransmission")?;

    Ok(NewTransmissionEvent {
        epoch_and_round: decoded.epochAndRound.to::<u64>(),
        transmitter: decoded.transmitter,
        config_digest: decoded.configDigest,
        meta: LogMeta::from_log(log),
    })
}

/// Decodes a `ConfigSet` log of the beacon contract.
pub fn decode_config_set(log: &Log) -> Result<ConfigSetEvent, DecodeError> {
    let decoded: IVRFBeacon::ConfigSet = decode_raw(log, "ConfigSet")?;

    Ok(ConfigSetEvent {
        config_digest: decoded.configDigest,
        config_count: decoded.configCount,
        signers: decoded.signers,
        transmitters: decoded.transmitters,
        f: decoded.f,
        meta: LogMeta::from_log(log),
    })
}

/// Decodes a `ConfigSet` log of the DKG contract.
pub fn decode_dkg_config_set(log: &Log) -> Result<ConfigSetEvent, DecodeError> {
    let decoded: IDKG::ConfigSet = decode_raw(log, "DKG ConfigSet")?;

    Ok(ConfigSetEvent {
        config_digest: decoded.configDigest,
        config_count: decoded.configCount,
        signers: decoded.signers,
        transmitters: decoded.transmitters,
        f: decoded.f,
        meta: LogMeta::from_log(log),
    })
}

/// Decode any tracked event, dispatching on topic0.
pub fn decode_log(log: &Log) -> Result<VrfEvent, DecodeError> {
    let sig = topic0(log)?;

    if sig == Topics::randomness_requested() {
        decode_randomness_requested(log).map(VrfEvent::RandomnessRequested)
    } else if sig == Topics::randomness_fulfillment_requested() {
        decode_randomness_fulfillment_requested(log).map(VrfEvent::RandomnessFulfillmentRequested)
    } else if sig == Topics::random_words_fulfilled() {
        decode_random_words_fulfilled(log).map(VrfEvent::RandomWordsFulfilled)
    } else if sig == Topics::outputs_served() {
        decode_outputs_served(log).map(VrfEvent::OutputsServed)
    } else if sig == Topics::new_transmission() {
        decode_new_transmission(log).map(VrfEvent::NewTransmission)
    } else if sig == Topics::config_set() {
        decode_config_set(log).map(VrfEvent::ConfigSet)
    } else {
        Err(DecodeError::UnknownSignature(sig))
    }
}
