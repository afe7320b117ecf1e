//! Report construction, in-flight tracking and committee lookups
//!
//! [`Coordinator::report_blocks`] scans recent coordinator logs and returns the
//! beacon outputs and callbacks that belong in the next report.
//! [`Coordinator::report_will_be_transmitted`] records what the local node
//! accepted for transmission so later calls skip it while it is in flight.
//! Each in-flight entry remembers the chain view (recent height and hash) of
//! its report; when the canonical hash at that height changes the entry is
//! ignored and the item is proposed again.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::providers::Provider;
use alloy::rpc::types::Log;
use alloy_primitives::aliases::U96;
use alloy_primitives::{B256, U256};
use common::windowed_cache::WindowedCache;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::{CoordinatorConfig, CoordinatorSettings};
use crate::errors::CoordinatorError;
use crate::events::{
    self, ConfigSetEvent, OutputsServedEvent, RandomWordsFulfilledEvent, RandomnessFulfillmentRequestedEvent,
    RandomnessRequestedEvent, VrfEvent,
};
use crate::metrics::{self, MethodTimer, MetricLabels};
use crate::router::{ContractRouter, RpcBeaconClient, RpcCoordinatorClient};
use crate::stores::{BlockHead, HeadStore, LogFilter, LogStore, ProviderLogStore};
use crate::topics::{filter_name, Topics};
use crate::types::{
    block_cache_key, callback_cache_key, epoch_and_round_topic, is_block_eligible,
    recent_block_hashes_start_height, AbstractReport, Block, BlockInReport, BlockKey,
    CallbackInReport, CallbackRequest, KeyId, OcrCommittee, ReportBlocksOutput,
    ReportBlocksParams,
};

/// Decoded coordinator logs of one `report_blocks` scan
#[derive(Debug, Default)]
struct LogBatch {
    randomness_requested: Vec<RandomnessRequestedEvent>,
    fulfillment_requested: Vec<RandomnessFulfillmentRequestedEvent>,
    words_fulfilled: Vec<RandomWordsFulfilledEvent>,
    outputs_served: Vec<OutputsServedEvent>,
}

struct CoordinatorState {
    config: CoordinatorConfig,
    labels: MetricLabels,
}

pub struct Coordinator {
    router: ContractRouter,
    log_store: Arc<dyn LogStore>,
    head_store: Arc<dyn HeadStore>,
    settings: CoordinatorSettings,
    state: RwLock<CoordinatorState>,
    // Blocks and callbacks accepted for transmission
    blocks_in_flight: WindowedCache<BlockInReport>,
    callbacks_in_flight: WindowedCache<CallbackInReport>,
    // Recent block hash claimed by accepted reports, keyed by height
    report_heads: WindowedCache<B256>,
}

impl Coordinator {
    /// Create a coordinator and register its log filter with the store.
    pub async fn new(
        settings: CoordinatorSettings,
        router: ContractRouter,
        log_store: Arc<dyn LogStore>,
        head_store: Arc<dyn HeadStore>,
        cancel: &CancellationToken,
    ) -> Result<Self, CoordinatorError> {
        if router.beacon_address() != settings.beacon_address
            || router.coordinator_address() != settings.coordinator_address
        {
            return Err(CoordinatorError::Config(format!(
                "router serves beacon {} and coordinator {}, settings expect {} and {}",
                router.beacon_address(),
                router.coordinator_address(),
                settings.beacon_address,
                settings.coordinator_address
            )));
        }
        settings.offchain.validate()?;
        metrics::describe_metrics();

        let filter = LogFilter {
            name: filter_name(
                settings.beacon_address,
                settings.coordinator_address,
                settings.dkg_address,
            ),
            event_sigs: Topics::all(),
            addresses: vec![
                settings.beacon_address,
                settings.coordinator_address,
                settings.dkg_address,
            ],
        };

        let window = settings.offchain.cache_eviction_window();
        let coordinator = Self {
            router,
            log_store,
            head_store,
            state: RwLock::new(CoordinatorState {
                config: settings.offchain.clone(),
                labels: MetricLabels::default(),
            }),
            blocks_in_flight: WindowedCache::new(window),
            callbacks_in_flight: WindowedCache::new(window),
            report_heads: WindowedCache::new(window),
            settings,
        };

        coordinator
            .call(cancel, "register log filter", coordinator.log_store.register_filter(filter))
            .await?;

        tracing::info!(
            beacon = %coordinator.settings.beacon_address,
            coordinator = %coordinator.settings.coordinator_address,
            dkg = %coordinator.settings.dkg_address,
            finality_depth = coordinator.settings.finality_depth,
            "VRF coordinator initialized"
        );
        Ok(coordinator)
    }

    /// Create a coordinator that reads the chain through an alloy provider.
    pub async fn connect<P>(
        provider: P,
        settings: CoordinatorSettings,
        cancel: &CancellationToken,
    ) -> Result<Self, CoordinatorError>
    where
        P: Provider + Clone + Send + Sync + 'static,
    {
        let router = ContractRouter::new(
            Arc::new(RpcBeaconClient::new(settings.beacon_address, provider.clone())),
            Arc::new(RpcCoordinatorClient::new(
                settings.coordinator_address,
                provider.clone(),
            )),
        );
        let store =
            Arc::new(ProviderLogStore::new(provider).with_scan_blocks(settings.log_scan_blocks));

        Self::new(settings, router, store.clone(), store, cancel).await
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.state.read().config.clone()
    }

    /// Stop the background eviction of the in-flight caches.
    pub fn close(&self) {
        self.blocks_in_flight.close();
        self.callbacks_in_flight.close();
        self.report_heads.close();
    }

    fn labels(&self) -> MetricLabels {
        self.state.read().labels.clone()
    }

    fn timer(&self, method: &'static str) -> MethodTimer {
        MethodTimer::start(method, self.labels())
    }

    fn evict_expired(&self, now: Instant) {
        let blocks = self.blocks_in_flight.evict_expired(now);
        let callbacks = self.callbacks_in_flight.evict_expired(now);
        self.report_heads.evict_expired(now);
        if blocks + callbacks > 0 {
            tracing::debug!(blocks, callbacks, "Evicted expired in-flight entries");
        }
    }

    /// Run a store or contract call under the caller's cancellation token and
    /// the configured RPC deadline.
    async fn call<T, F>(
        &self,
        cancel: &CancellationToken,
        context: &'static str,
        fut: F,
    ) -> Result<T, CoordinatorError>
    where
        F: Future<Output = eyre::Result<T>>,
    {
        let timeout = self.settings.rpc_timeout();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoordinatorError::Cancelled),
            res = tokio::time::timeout(timeout, fut) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(CoordinatorError::transport(context, e)),
                Err(_) => Err(CoordinatorError::Timeout { context, after: timeout }),
            },
        }
    }

    pub async fn current_chain_height(
        &self,
        cancel: &CancellationToken,
    ) -> Result<u64, CoordinatorError> {
        self.call(cancel, "latest block", self.log_store.latest_block())
            .await
    }

    /// Beacon outputs and callbacks that belong in the next report.
    ///
    /// Blocks are ordered by `(height, confirmation_delay)`; callbacks by the
    /// height at which they become eligible, then gas allowance, then request
    /// id. Both lists are cut off once the report's gas budget is exhausted.
    pub async fn report_blocks(
        &self,
        cancel: &CancellationToken,
        params: &ReportBlocksParams,
    ) -> Result<ReportBlocksOutput, CoordinatorError> {
        let _timer = self.timer("ReportBlocks");
        let config = self.config();

        self.evict_expired(Instant::now());

        let current_height = self.current_chain_height(cancel).await?;
        tracing::info!(current_height, "Current chain height");

        let from_block = current_height.saturating_sub(config.lookback_blocks);
        let to_block = current_height.saturating_sub(1);
        let logs = self
            .call(
                cancel,
                "logs with sigs",
                self.log_store.logs_with_sigs(
                    from_block,
                    to_block,
                    &Topics::report_blocks(),
                    self.settings.coordinator_address,
                ),
            )
            .await?;
        tracing::trace!(count = logs.len(), from_block, to_block, "Fetched coordinator logs");

        let batch = self.classify_logs(&logs);
        tracing::trace!(
            randomness_requested = batch.randomness_requested.len(),
            fulfillment_requested = batch.fulfillment_requested.len(),
            words_fulfilled = batch.words_fulfilled.len(),
            outputs_served = batch.outputs_served.len(),
            "Classified coordinator logs"
        );

        let delays = &params.confirmation_delays;
        let eligible_requests: Vec<&RandomnessRequestedEvent> = batch
            .randomness_requested
            .iter()
            .filter(|r| {
                self.is_eligible(
                    r.request_id,
                    r.next_beacon_output_height,
                    r.confirmation_delay,
                    r.meta.block_number,
                    current_height,
                    delays,
                )
            })
            .collect();
        let eligible_callbacks: Vec<&RandomnessFulfillmentRequestedEvent> = batch
            .fulfillment_requested
            .iter()
            .filter(|r| {
                self.is_eligible(
                    r.request_id,
                    r.next_beacon_output_height,
                    r.confirmation_delay,
                    r.meta.block_number,
                    current_height,
                    delays,
                )
            })
            .collect();

        let start_height =
            recent_block_hashes_start_height(current_height, config.blockhash_lookback());

        // Heights whose canonical hash is needed: requested outputs, the recent
        // heights of in-flight reports touching them, and the recent hash window.
        let mut heights: BTreeSet<u64> = (start_height..=current_height).collect();
        for r in &eligible_requests {
            heights.insert(r.next_beacon_output_height);
            let key = block_cache_key(r.next_beacon_output_height, u64::from(r.confirmation_delay));
            if let Some(cached) = self.blocks_in_flight.get(&key) {
                heights.insert(cached.recent_block_height);
            }
        }
        for r in &eligible_callbacks {
            heights.insert(r.next_beacon_output_height);
            let key = block_cache_key(r.next_beacon_output_height, u64::from(r.confirmation_delay));
            if let Some(cached) = self.blocks_in_flight.get(&key) {
                heights.insert(cached.recent_block_height);
            }
            if let Some(cached) = self.callbacks_in_flight.get(&callback_cache_key(r.request_id)) {
                heights.insert(cached.recent_block_height);
            }
        }

        let heights: Vec<u64> = heights.into_iter().collect();
        let hashes = self.block_hashes(cancel, &heights).await?;

        let mut blocks_requested: BTreeSet<BlockKey> = BTreeSet::new();
        for r in &eligible_requests {
            let key = BlockKey {
                height: r.next_beacon_output_height,
                confirmation_delay: r.confirmation_delay,
            };
            if self.block_in_flight(&key, &hashes) {
                tracing::debug!(
                    height = key.height,
                    confirmation_delay = key.confirmation_delay,
                    "Block is in flight"
                );
                continue;
            }
            tracing::debug!(
                height = key.height,
                confirmation_delay = key.confirmation_delay,
                "Block is eligible"
            );
            blocks_requested.insert(key);
        }

        let mut callbacks_requested: Vec<&RandomnessFulfillmentRequestedEvent> = Vec::new();
        for r in eligible_callbacks.iter().copied() {
            if self.callback_in_flight(r.request_id, &hashes) {
                tracing::debug!(request_id = r.request_id, "Request is in flight");
            } else {
                tracing::debug!(request_id = r.request_id, "Request is eligible");
                callbacks_requested.push(r);
            }

            // A callback request can reference an output nobody else asked for.
            let key = BlockKey {
                height: r.next_beacon_output_height,
                confirmation_delay: r.confirmation_delay,
            };
            if !self.block_in_flight(&key, &hashes) {
                blocks_requested.insert(key);
            }
        }

        for served in batch.outputs_served.iter().flat_map(|e| e.outputs.iter()) {
            let removed = blocks_requested.remove(&BlockKey {
                height: served.height,
                confirmation_delay: served.confirmation_delay,
            });
            if removed {
                tracing::trace!(
                    height = served.height,
                    confirmation_delay = served.confirmation_delay,
                    "Output already served"
                );
            }
        }

        let fulfilled: HashSet<u64> = batch
            .words_fulfilled
            .iter()
            .flat_map(|e| e.successful_request_ids())
            .collect();

        let mut gas_used = config.coordinator_overhead;
        let mut blocks = Vec::with_capacity(blocks_requested.len());
        for key in &blocks_requested {
            if config.batch_gas_limit.saturating_sub(gas_used) < config.block_gas_overhead {
                tracing::debug!(
                    remaining = blocks_requested.len() - blocks.len(),
                    "Block gas budget exhausted"
                );
                break;
            }
            let hash = hashes
                .get(&key.height)
                .copied()
                .ok_or(CoordinatorError::MissingHeads {
                    want: heights.len(),
                    got: hashes.len(),
                })?;
            blocks.push(Block {
                height: key.height,
                confirmation_delay: key.confirmation_delay,
                hash,
            });
            gas_used = gas_used.saturating_add(config.block_gas_overhead);
        }

        let callbacks = select_callbacks(callbacks_requested, &fulfilled, &config, gas_used);

        let recent_block_hashes = (start_height..=current_height)
            .filter_map(|h| hashes.get(&h).copied())
            .collect();

        metrics::record_report_blocks(&self.labels(), blocks.len(), callbacks.len());
        tracing::debug!(
            blocks = ?blocks.iter().map(|b| (b.height, b.confirmation_delay)).collect::<Vec<_>>(),
            callbacks = ?callbacks.iter().map(|c| c.request_id).collect::<Vec<_>>(),
            fulfilled = fulfilled.len(),
            "Reporting blocks and callbacks"
        );

        Ok(ReportBlocksOutput {
            blocks,
            callbacks,
            recent_block_hashes_start_height: start_height,
            recent_block_hashes,
        })
    }

    fn is_eligible(
        &self,
        request_id: u64,
        beacon_height: u64,
        confirmation_delay: u32,
        request_height: u64,
        current_height: u64,
        delays: &HashSet<u32>,
    ) -> bool {
        if !delays.contains(&confirmation_delay) {
            tracing::info!(
                request_id,
                confirmation_delay,
                supported = ?delays,
                "Ignoring request with unsupported confirmation delay"
            );
            return false;
        }
        is_block_eligible(beacon_height, confirmation_delay, request_height, current_height)
    }

    fn block_in_flight(&self, key: &BlockKey, hashes: &HashMap<u64, B256>) -> bool {
        let cache_key = block_cache_key(key.height, u64::from(key.confirmation_delay));
        self.blocks_in_flight
            .get(&cache_key)
            .is_some_and(|c| hashes.get(&c.recent_block_height) == Some(&c.recent_block_hash))
    }

    fn callback_in_flight(&self, request_id: u64, hashes: &HashMap<u64, B256>) -> bool {
        self.callbacks_in_flight
            .get(&callback_cache_key(request_id))
            .is_some_and(|c| hashes.get(&c.recent_block_height) == Some(&c.recent_block_hash))
    }

    fn classify_logs(&self, logs: &[Log]) -> LogBatch {
        let mut batch = LogBatch::default();
        let tracked = Topics::report_blocks();

        for log in logs {
            let Some(sig) = log.topics().first() else {
                tracing::warn!(tx_hash = ?log.transaction_hash, "Skipping log without topics");
                continue;
            };
            if !tracked.contains(sig) {
                tracing::error!(
                    event_sig = %sig,
                    expected = ?tracked,
                    "Unexpected event signature"
                );
                continue;
            }

            match self.router.parse_log(log) {
                Ok(VrfEvent::RandomnessRequested(e)) => batch.randomness_requested.push(e),
                Ok(VrfEvent::RandomnessFulfillmentRequested(e)) => {
                    batch.fulfillment_requested.push(e)
                }
                Ok(VrfEvent::RandomWordsFulfilled(e)) => batch.words_fulfilled.push(e),
                Ok(VrfEvent::OutputsServed(e)) => batch.outputs_served.push(e),
                Ok(other) => {
                    tracing::error!(event = other.name(), "Unexpected event in coordinator logs");
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        block_number = ?log.block_number,
                        tx_hash = ?log.transaction_hash,
                        "Skipping undecodable log"
                    );
                }
            }
        }

        batch
    }

    /// Canonical hashes for `heights`, failing if any height is unknown.
    async fn block_hashes(
        &self,
        cancel: &CancellationToken,
        heights: &[u64],
    ) -> Result<HashMap<u64, B256>, CoordinatorError> {
        let heads = self
            .call(cancel, "heads by numbers", self.head_store.heads_by_numbers(heights))
            .await?;
        hashes_by_height(heights, &heads)
    }

    /// Record that the local node accepted `report` for transmission.
    ///
    /// Fails if the report's recent block is no longer canonical, or if an
    /// earlier report claimed a different hash at the same height.
    pub async fn report_will_be_transmitted(
        &self,
        cancel: &CancellationToken,
        report: &AbstractReport,
    ) -> Result<(), CoordinatorError> {
        let _timer = self.timer("ReportWillBeTransmitted");
        self.evict_expired(Instant::now());

        // The log store's own view of the head, the same one its logs were indexed against.
        let height = report.recent_block_height;
        let heads = self
            .call(cancel, "get blocks", self.log_store.get_blocks(&[height]))
            .await?;
        let canonical = hashes_by_height(&[height], &heads)?
            .get(&height)
            .copied()
            .ok_or(CoordinatorError::MissingHeads { want: 1, got: 0 })?;

        if canonical != report.recent_block_hash {
            tracing::warn!(
                height,
                %canonical,
                reported = %report.recent_block_hash,
                "Report built on a stale chain view"
            );
            return Err(CoordinatorError::Reorg {
                height,
                canonical,
                reported: report.recent_block_hash,
            });
        }

        let head_key = B256::from(U256::from(height));
        if let Some(previous) = self.report_heads.get(&head_key) {
            if previous != report.recent_block_hash {
                tracing::warn!(height, %previous, current = %canonical, "Re-org between reports");
                self.report_heads.insert(canonical, head_key);
                return Err(CoordinatorError::Reorg {
                    height,
                    canonical,
                    reported: previous,
                });
            }
        }
        self.report_heads.insert(report.recent_block_hash, head_key);

        let mut blocks = 0;
        let mut callbacks = 0;
        for output in &report.outputs {
            // An empty proof means the block was already served; only its callbacks are new.
            if !output.vrf_proof.is_empty() {
                let block = BlockKey {
                    height: output.block_height,
                    confirmation_delay: output.confirmation_delay,
                };
                self.blocks_in_flight.insert(
                    BlockInReport {
                        block,
                        recent_block_height: height,
                        recent_block_hash: report.recent_block_hash,
                    },
                    block_cache_key(block.height, u64::from(block.confirmation_delay)),
                );
                blocks += 1;
                tracing::debug!(
                    height = block.height,
                    confirmation_delay = block.confirmation_delay,
                    "Block is being transmitted"
                );
            }

            for cb in &output.callbacks {
                self.callbacks_in_flight.insert(
                    CallbackInReport {
                        beacon_height: cb.beacon_height,
                        request_id: cb.request_id,
                        recent_block_height: height,
                        recent_block_hash: report.recent_block_hash,
                    },
                    callback_cache_key(cb.request_id),
                );
                callbacks += 1;
                tracing::debug!(request_id = cb.request_id, "Request is being transmitted");
            }
        }

        metrics::record_report_will_be_transmitted(&self.labels(), blocks, callbacks);
        Ok(())
    }

    /// Signers and transmitters of the DKG and VRF committees, from the
    /// latest finalized `ConfigSet` of each contract.
    pub async fn dkg_vrf_committees(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(OcrCommittee, OcrCommittee), CoordinatorError> {
        let _timer = self.timer("DKGVRFCommittees");
        let confs = self.settings.finality_depth;

        let latest_vrf = self
            .call(
                cancel,
                "latest vrf ConfigSet",
                self.log_store.latest_log_by_event_sig_with_confs(
                    Topics::config_set(),
                    self.settings.beacon_address,
                    confs,
                ),
            )
            .await?;
        let latest_dkg = self
            .call(
                cancel,
                "latest dkg ConfigSet",
                self.log_store.latest_log_by_event_sig_with_confs(
                    Topics::config_set(),
                    self.settings.dkg_address,
                    confs,
                ),
            )
            .await?;

        let vrf_committee = committee("vrf ConfigSet", events::decode_config_set(&latest_vrf)?)?;
        let dkg_committee =
            committee("dkg ConfigSet", events::decode_dkg_config_set(&latest_dkg)?)?;

        tracing::debug!(
            dkg_signers = dkg_committee.signers.len(),
            vrf_signers = vrf_committee.signers.len(),
            "Fetched committees"
        );
        Ok((dkg_committee, vrf_committee))
    }

    pub async fn proving_key_hash(
        &self,
        cancel: &CancellationToken,
    ) -> Result<B256, CoordinatorError> {
        self.call(cancel, "get proving key hash", self.router.s_proving_key_hash())
            .await
    }

    /// Beacon period of the coordinator contract, in blocks
    pub async fn beacon_period(&self, cancel: &CancellationToken) -> Result<u16, CoordinatorError> {
        let period = self
            .call(cancel, "get beacon period blocks", self.router.i_beacon_period_blocks())
            .await?;

        u16::try_from(period).map_err(|_| CoordinatorError::ValueOutOfRange {
            field: "i_beaconPeriodBlocks",
            value: period.to_string(),
        })
    }

    pub async fn confirmation_delays(
        &self,
        cancel: &CancellationToken,
    ) -> Result<[u32; 8], CoordinatorError> {
        self.call(cancel, "get confirmation delays", self.router.get_confirmation_delays())
            .await
    }

    pub async fn key_id(&self, cancel: &CancellationToken) -> Result<KeyId, CoordinatorError> {
        self.call(cancel, "get key id", self.router.s_key_id())
            .await
            .map(KeyId)
    }

    /// Whether a report for `epoch`/`round` under `config_digest` was transmitted on chain.
    pub async fn report_is_onchain(
        &self,
        cancel: &CancellationToken,
        epoch: u32,
        round: u8,
        config_digest: B256,
    ) -> Result<bool, CoordinatorError> {
        let _timer = self.timer("ReportIsOnchain");
        let topic = epoch_and_round_topic(epoch, round);
        tracing::info!(epoch, round, %topic, "Checking for transmitted report");

        let logs = self
            .call(
                cancel,
                "indexed NewTransmission logs",
                self.log_store.indexed_logs(
                    Topics::new_transmission(),
                    self.settings.beacon_address,
                    1,
                    &[topic],
                    1,
                ),
            )
            .await?;

        let matching = logs
            .iter()
            .filter(|log| match self.router.parse_log(log) {
                Ok(VrfEvent::NewTransmission(nt)) => nt.config_digest == config_digest,
                Ok(other) => {
                    tracing::warn!(event = other.name(), "Unexpected log among NewTransmission logs");
                    false
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Incorrect log among NewTransmission logs");
                    false
                }
            })
            .count();

        tracing::info!(epoch, round, found = logs.len(), matching, "NewTransmission logs");
        Ok(matching > 0)
    }

    /// Apply a new off-chain configuration.
    ///
    /// `offchain_config` is the JSON encoded [`CoordinatorConfig`]. The new
    /// eviction window applies to all in-flight caches immediately.
    pub fn update_configuration(
        &self,
        offchain_config: &[u8],
        config_digest: B256,
        oracle_id: u8,
    ) -> Result<(), CoordinatorError> {
        let config = CoordinatorConfig::from_offchain_bytes(offchain_config)?;

        let window = config.cache_eviction_window();
        self.blocks_in_flight.set_window(window);
        self.callbacks_in_flight.set_window(window);
        self.report_heads.set_window(window);

        tracing::info!(
            cache_eviction_window_seconds = config.cache_eviction_window_seconds,
            batch_gas_limit = config.batch_gas_limit,
            coordinator_overhead = config.coordinator_overhead,
            block_gas_overhead = config.block_gas_overhead,
            callback_overhead = config.callback_overhead,
            lookback_blocks = config.lookback_blocks,
            blockhash_lookback = config.blockhash_lookback(),
            %config_digest,
            oracle_id,
            "Set offchain config"
        );

        let mut state = self.state.write();
        state.config = config;
        state.labels = MetricLabels {
            oracle_id,
            config_digest,
        };
        Ok(())
    }

    /// Time left before an in-flight block is proposed again, if it is tracked.
    pub fn block_in_flight_for(&self, height: u64, confirmation_delay: u32) -> Option<Duration> {
        let entry = self
            .blocks_in_flight
            .get_entry(&block_cache_key(height, u64::from(confirmation_delay)))?;
        let window = self.blocks_in_flight.window();
        Some(window.saturating_sub(entry.inserted_at.elapsed()))
    }
}

/// Canonical hash per requested height, failing if any height is unknown.
fn hashes_by_height(
    heights: &[u64],
    heads: &[BlockHead],
) -> Result<HashMap<u64, B256>, CoordinatorError> {
    let hashes: HashMap<u64, B256> = heads.iter().map(|h| (h.number, h.hash)).collect();
    if heights.iter().any(|h| !hashes.contains_key(h)) {
        return Err(CoordinatorError::MissingHeads {
            want: heights.len(),
            got: heads.len(),
        });
    }
    Ok(hashes)
}

fn committee(
    context: &'static str,
    config_set: ConfigSetEvent,
) -> Result<OcrCommittee, CoordinatorError> {
    if config_set.signers.len() != config_set.transmitters.len() {
        return Err(CoordinatorError::InvalidCommittee {
            context,
            signers: config_set.signers.len(),
            transmitters: config_set.transmitters.len(),
        });
    }

    Ok(OcrCommittee {
        signers: config_set.signers,
        transmitters: config_set.transmitters,
    })
}

/// Greedy, order-preserving selection of callbacks under the remaining gas.
///
/// Callbacks are sorted by eligibility height, then gas allowance, then
/// request id. Selection stops at the first callback that does not fit.
fn select_callbacks(
    mut requested: Vec<&RandomnessFulfillmentRequestedEvent>,
    fulfilled: &HashSet<u64>,
    config: &CoordinatorConfig,
    mut gas_used: u64,
) -> Vec<CallbackRequest> {
    requested.retain(|r| !fulfilled.contains(&r.request_id));
    requested.sort_by_key(|r| {
        (
            r.next_beacon_output_height.saturating_add(u64::from(r.confirmation_delay)),
            r.gas_allowance,
            r.request_id,
        )
    });

    let mut callbacks = Vec::with_capacity(requested.len());
    for r in requested {
        let remaining = config.batch_gas_limit.saturating_sub(gas_used);
        let cost = config
            .callback_overhead
            .checked_add(u64::from(r.gas_allowance))
            .filter(|cost| *cost <= remaining);
        let Some(cost) = cost else {
            tracing::debug!(
                request_id = r.request_id,
                gas_allowance = r.gas_allowance,
                gas_used,
                "Callback gas budget exhausted"
            );
            break;
        };
        gas_used = gas_used.saturating_add(cost);

        callbacks.push(CallbackRequest {
            request_id: r.request_id,
            beacon_height: r.next_beacon_output_height,
            confirmation_delay: r.confirmation_delay,
            subscription_id: r.subscription_id,
            requester: r.requester,
            arguments: r.arguments.clone(),
            gas_allowance: U96::from(r.gas_allowance),
            price: U96::ZERO,
            request_height: r.meta.block_number,
            request_block_hash: r.meta.block_hash,
            num_words: r.num_words,
            gas_price: r.gas_price,
            wei_per_unit_link: r.wei_per_unit_link,
        });
    }
    callbacks
}
