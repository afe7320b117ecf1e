//! Event signature hashes tracked by the coordinator

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolEvent;
use common::interfaces::vrf_beacon::IVRFBeacon;
use common::interfaces::vrf_coordinator::IVRFCoordinator;

/// Event signature constants (topic0)
pub struct Topics;

impl Topics {
    pub fn randomness_requested() -> B256 {
        IVRFCoordinator::RandomnessRequested::SIGNATURE_HASH
    }

    pub fn randomness_fulfillment_requested() -> B256 {
        IVRFCoordinator::RandomnessFulfillmentRequested::SIGNATURE_HASH
    }

    pub fn random_words_fulfilled() -> B256 {
        IVRFCoordinator::RandomWordsFulfilled::SIGNATURE_HASH
    }

    pub fn outputs_served() -> B256 {
        IVRFCoordinator::OutputsServed::SIGNATURE_HASH
    }

    pub fn new_transmission() -> B256 {
        IVRFBeacon::NewTransmission::SIGNATURE_HASH
    }

    /// Emitted by both the beacon and the DKG contract
    pub fn config_set() -> B256 {
        IVRFBeacon::ConfigSet::SIGNATURE_HASH
    }

    /// Topics scanned on the coordinator contract when building a report
    pub fn report_blocks() -> Vec<B256> {
        vec![
            Self::randomness_requested(),
            Self::randomness_fulfillment_requested(),
            Self::random_words_fulfilled(),
            Self::outputs_served(),
        ]
    }

    /// Every topic the log store has to index for the coordinator
    pub fn all() -> Vec<B256> {
        vec![
            Self::randomness_requested(),
            Self::randomness_fulfillment_requested(),
            Self::random_words_fulfilled(),
            Self::config_set(),
            Self::outputs_served(),
            Self::new_transmission(),
        ]
    }

    /// Human readable name for a tracked topic
    pub fn name(topic: &B256) -> Option<&'static str> {
        let name = if *topic == Self::randomness_requested() {
            "RandomnessRequested"
        } else if *topic == Self::randomness_fulfillment_requested() {
            "RandomnessFulfillmentRequested"
        } else if *topic == Self::random_words_fulfilled() {
            "RandomWordsFulfilled"
        } else if *topic == Self::outputs_served() {
            "OutputsServed"
        } else if *topic == Self::new_transmission() {
            "NewTransmission"
        } else if *topic == Self::config_set() {
            "ConfigSet"
        } else {
            return None;
        };
        Some(name)
    }
}

/// Name of the log store filter registered for one deployment
pub fn filter_name(beacon: Address, coordinator: Address, dkg: Address) -> String {
    format!("VRF Coordinator - {}:{}:{}", beacon, coordinator, dkg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use std::collections::HashSet;

    #[test]
    fn test_all_signatures() {
        let sigs = Topics::all();
        assert_eq!(sigs.len(), 6);

        let unique: HashSet<_> = sigs.iter().collect();
        assert_eq!(unique.len(), 6);
        assert!(sigs.iter().all(|s| *s != B256::ZERO));

        for topic in Topics::report_blocks() {
            assert!(sigs.contains(&topic));
        }
    }

    #[test]
    fn test_signatures_match_canonical_encoding() {
        assert_eq!(
            Topics::new_transmission(),
            keccak256("NewTransmission(uint40,address,uint192,uint64,bytes32)")
        );
        assert_eq!(
            Topics::outputs_served(),
            keccak256("OutputsServed(uint64,uint192,uint64,(uint64,uint24,uint256,uint256)[])")
        );
        assert_eq!(
            Topics::config_set(),
            keccak256(
                "ConfigSet(uint32,bytes32,uint64,address[],address[],uint8,bytes,uint64,bytes)"
            )
        );
    }

    #[test]
    fn test_config_set_shared_with_dkg() {
        use common::interfaces::dkg::IDKG;
        assert_eq!(IDKG::ConfigSet::SIGNATURE_HASH, Topics::config_set());
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topics::name(&Topics::outputs_served()), Some("OutputsServed"));
        assert_eq!(Topics::name(&B256::ZERO), None);
    }

    #[test]
    fn test_filter_name_includes_all_addresses() {
        let name = filter_name(
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        );
        assert!(name.starts_with("VRF Coordinator - "));
        assert!(name.contains(&Address::repeat_byte(3).to_string()));
    }
}
