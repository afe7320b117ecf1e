//! Shared building blocks for the VRF beacon off-chain services.
//!
//! - `interfaces`: Solidity bindings for the beacon, coordinator and DKG contracts
//! - `windowed_cache`: time-windowed in-flight tracking with ordered eviction

pub mod interfaces {
    pub mod dkg;
    pub mod vrf_beacon;
    pub mod vrf_coordinator;
}

pub mod windowed_cache;
