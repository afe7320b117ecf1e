//! Off-chain coordination for an OCR-driven VRF beacon.
//!
//! Turns the re-org prone stream of beacon and coordinator contract events
//! into the contents of the next report:
//! - which beacon output heights still need randomness
//! - which callback requests are pending delivery, bounded by a gas budget
//!
//! Items accepted for transmission are tracked in windowed caches so they are
//! not proposed again while the report carrying them is still in flight.
//!
//! # Usage
//!
//! ```ignore
//! use vrf_coordinator::{Coordinator, CoordinatorSettings, ReportBlocksParams};
//!
//! let settings = CoordinatorSettings::from_env()?;
//! let coordinator = Coordinator::connect(provider, settings, &cancel).await?;
//! let report = coordinator
//!     .report_blocks(&cancel, &ReportBlocksParams::new([1, 3, 10]))
//!     .await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod events;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod metrics;
pub mod router;
pub mod stores;
pub mod topics;
pub mod types;

pub use config::{CoordinatorConfig, CoordinatorSettings};
pub use coordinator::Coordinator;
pub use errors::CoordinatorError;
pub use events::{DecodeError, LogMeta, VrfEvent};
pub use router::{BeaconClient, ContractKind, ContractRouter, CoordinatorClient};
pub use stores::{BlockHead, HeadStore, LogFilter, LogStore, ProviderLogStore};
pub use topics::Topics;
pub use types::*;
