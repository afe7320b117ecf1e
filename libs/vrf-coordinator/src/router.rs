//! Dispatch over the beacon and coordinator contracts
//!
//! The router owns one client per contract and routes log parsing by the
//! emitting address. View calls are passed through untouched: no state, no
//! retries.

use std::sync::Arc;

use alloy::providers::Provider;
use alloy::rpc::types::Log;
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use common::interfaces::vrf_beacon::IVRFBeacon;
use common::interfaces::vrf_coordinator::IVRFCoordinator;
use eyre::Result;

use crate::events::{self, DecodeError, VrfEvent};

/// View calls served by the beacon contract
#[async_trait]
pub trait BeaconClient: Send + Sync {
    fn address(&self) -> Address;

    async fn s_proving_key_hash(&self) -> Result<B256>;

    async fn s_key_id(&self) -> Result<B256>;
}

/// View calls served by the coordinator contract
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    fn address(&self) -> Address;

    async fn i_beacon_period_blocks(&self) -> Result<U256>;

    async fn get_confirmation_delays(&self) -> Result<[u32; 8]>;
}

/// Which of the two contracts a log or call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Beacon,
    Coordinator,
}

impl ContractKind {
    /// Whether a contract of this kind emits `event`
    pub fn emits(&self, event: &VrfEvent) -> bool {
        match self {
            ContractKind::Beacon => matches!(
                event,
                VrfEvent::NewTransmission(_) | VrfEvent::ConfigSet(_)
            ),
            ContractKind::Coordinator => matches!(
                event,
                VrfEvent::RandomnessRequested(_)
                    | VrfEvent::RandomnessFulfillmentRequested(_)
                    | VrfEvent::RandomWordsFulfilled(_)
                    | VrfEvent::OutputsServed(_)
            ),
        }
    }
}

#[derive(Clone)]
pub struct ContractRouter {
    beacon: Arc<dyn BeaconClient>,
    coordinator: Arc<dyn CoordinatorClient>,
}

impl ContractRouter {
    pub fn new(beacon: Arc<dyn BeaconClient>, coordinator: Arc<dyn CoordinatorClient>) -> Self {
        Self {
            beacon,
            coordinator,
        }
    }

    pub fn beacon_address(&self) -> Address {
        self.beacon.address()
    }

    pub fn coordinator_address(&self) -> Address {
        self.coordinator.address()
    }

    /// Contract kinds deployed at `address`.
    ///
    /// Both kinds match when one contract serves as beacon and coordinator.
    pub fn route(&self, address: Address) -> Vec<ContractKind> {
        let mut kinds = Vec::with_capacity(2);
        if address == self.beacon.address() {
            kinds.push(ContractKind::Beacon);
        }
        if address == self.coordinator.address() {
            kinds.push(ContractKind::Coordinator);
        }
        kinds
    }

    /// Decode a log emitted by one of the routed contracts.
    pub fn parse_log(&self, log: &Log) -> Result<VrfEvent, DecodeError> {
        let address = log.address();
        let kinds = self.route(address);
        if kinds.is_empty() {
            return Err(DecodeError::UnknownLog(address));
        }

        let event = events::decode_log(log)?;
        if kinds.iter().any(|kind| kind.emits(&event)) {
            Ok(event)
        } else {
            Err(DecodeError::UnexpectedEvent {
                event: event.name(),
                address,
            })
        }
    }

    pub async fn s_proving_key_hash(&self) -> Result<B256> {
        self.beacon.s_proving_key_hash().await
    }

    pub async fn s_key_id(&self) -> Result<B256> {
        self.beacon.s_key_id().await
    }

    pub async fn i_beacon_period_blocks(&self) -> Result<U256> {
        self.coordinator.i_beacon_period_blocks().await
    }

    pub async fn get_confirmation_delays(&self) -> Result<[u32; 8]> {
        self.coordinator.get_confirmation_delays().await
    }
}

/// Beacon client backed by an alloy provider
pub struct RpcBeaconClient<P: Provider + Clone> {
    contract: IVRFBeacon::IVRFBeaconInstance<P>,
}

impl<P> RpcBeaconClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(address: Address, provider: P) -> Self {
        Self {
            contract: IVRFBeacon::new(address, provider),
        }
    }
}

#[async_trait]
impl<P> BeaconClient for RpcBeaconClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn s_proving_key_hash(&self) -> Result<B256> {
        self.contract
            .s_provingKeyHash()
            .call()
            .await
            .map_err(|e| eyre::eyre!("s_provingKeyHash failed: {}", e))
    }

    async fn s_key_id(&self) -> Result<B256> {
        self.contract
            .s_keyID()
            .call()
            .await
            .map_err(|e| eyre::eyre!("s_keyID failed: {}", e))
    }
}

/// Coordinator client backed by an alloy provider
pub struct RpcCoordinatorClient<P: Provider + Clone> {
    contract: IVRFCoordinator::IVRFCoordinatorInstance<P>,
}

impl<P> RpcCoordinatorClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(address: Address, provider: P) -> Self {
        Self {
            contract: IVRFCoordinator::new(address, provider),
        }
    }
}

#[async_trait]
impl<P> CoordinatorClient for RpcCoordinatorClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn i_beacon_period_blocks(&self) -> Result<U256> {
        self.contract
            .i_beaconPeriodBlocks()
            .call()
            .await
            .map_err(|e| eyre::eyre!("i_beaconPeriodBlocks failed: {}", e))
    }

    async fn get_confirmation_delays(&self) -> Result<[u32; 8]> {
        let delays = self
            .contract
            .getConfirmationDelays()
            .call()
            .await
            .map_err(|e| eyre::eyre!("getConfirmationDelays failed: {}", e))?;

        Ok(delays.map(|d| d.to::<u32>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{StaticBeacon, StaticCoordinator};
    use alloy_primitives::aliases::{U24, U40};
    use alloy_primitives::Log as PrimitiveLog;
    use alloy_sol_types::SolEvent;

    const BEACON: Address = Address::new([0xbe; 20]);
    const COORDINATOR: Address = Address::new([0xc0; 20]);

    fn router(beacon: Address, coordinator: Address) -> ContractRouter {
        ContractRouter::new(
            Arc::new(StaticBeacon::new(beacon)),
            Arc::new(StaticCoordinator::new(coordinator)),
        )
    }

    fn log_from<E: SolEvent>(address: Address, event: &E) -> Log {
        Log {
            inner: PrimitiveLog {
                address,
                data: event.encode_log_data(),
            },
            block_number: Some(1),
            ..Default::default()
        }
    }

    fn new_transmission() -> IVRFBeacon::NewTransmission {
        IVRFBeacon::NewTransmission {
            epochAndRound: U40::from(1u64),
            transmitter: Address::ZERO,
            juelsPerFeeCoin: Default::default(),
            reasonableGasPrice: 0,
            configDigest: B256::ZERO,
        }
    }

    fn randomness_requested() -> IVRFCoordinator::RandomnessRequested {
        IVRFCoordinator::RandomnessRequested {
            requestID: U256::from(1),
            requester: Address::ZERO,
            nextBeaconOutputHeight: 10,
            confDelay: U24::from(1),
            subID: U256::from(1),
            numWords: 1,
            costJuels: U256::ZERO,
            newSubBalance: U256::ZERO,
        }
    }

    #[test]
    fn test_route_by_address() {
        let router = router(BEACON, COORDINATOR);

        assert_eq!(router.route(BEACON), vec![ContractKind::Beacon]);
        assert_eq!(router.route(COORDINATOR), vec![ContractKind::Coordinator]);
        assert!(router.route(Address::ZERO).is_empty());
    }

    #[test]
    fn test_parse_log_dispatches_by_address() {
        let router = router(BEACON, COORDINATOR);

        let event = router
            .parse_log(&log_from(BEACON, &new_transmission()))
            .unwrap();
        assert!(matches!(event, VrfEvent::NewTransmission(_)));

        let event = router
            .parse_log(&log_from(COORDINATOR, &randomness_requested()))
            .unwrap();
        assert!(matches!(event, VrfEvent::RandomnessRequested(_)));
    }

    #[test]
    fn test_parse_log_unknown_address() {
        let router = router(BEACON, COORDINATOR);
        let stranger = Address::repeat_byte(0x11);

        let err = router
            .parse_log(&log_from(stranger, &new_transmission()))
            .unwrap_err();
        assert_eq!(err, DecodeError::UnknownLog(stranger));
    }

    #[test]
    fn test_parse_log_rejects_event_from_wrong_contract() {
        let router = router(BEACON, COORDINATOR);

        let err = router
            .parse_log(&log_from(COORDINATOR, &new_transmission()))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedEvent {
                event: "NewTransmission",
                address: COORDINATOR,
            }
        );
    }

    #[test]
    fn test_parse_log_single_contract_deployment() {
        let router = router(BEACON, BEACON);

        assert_eq!(
            router.route(BEACON),
            vec![ContractKind::Beacon, ContractKind::Coordinator]
        );
        assert!(router
            .parse_log(&log_from(BEACON, &randomness_requested()))
            .is_ok());
        assert!(router
            .parse_log(&log_from(BEACON, &new_transmission()))
            .is_ok());
    }

    #[tokio::test]
    async fn test_view_calls_pass_through() {
        let beacon = StaticBeacon::new(BEACON).with_proving_key_hash(B256::repeat_byte(5));
        let coordinator = StaticCoordinator::new(COORDINATOR)
            .with_beacon_period_blocks(U256::from(3))
            .with_confirmation_delays([1, 2, 3, 4, 5, 6, 7, 8]);
        let router = ContractRouter::new(Arc::new(beacon), Arc::new(coordinator));

        assert_eq!(router.s_proving_key_hash().await.unwrap(), B256::repeat_byte(5));
        assert_eq!(router.i_beacon_period_blocks().await.unwrap(), U256::from(3));
        assert_eq!(router.get_confirmation_delays().await.unwrap()[7], 8);
    }
}
