//! In-memory chain and contract doubles
//!
//! `MemoryChain` stands in for both the log store and the head store: it
//! keeps a list of logs, a tip height and a canonical hash per height that
//! tests can rewrite to simulate re-orgs. `StaticBeacon` and
//! `StaticCoordinator` answer view calls with fixed values.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use alloy::rpc::types::Log;
use alloy_primitives::{keccak256, Address, Log as PrimitiveLog, LogData, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use eyre::Result;
use parking_lot::RwLock;

use crate::router::{BeaconClient, CoordinatorClient};
use crate::stores::{confirmed_tip, BlockHead, HeadStore, LogFilter, LogStore};

#[derive(Default)]
struct ChainState {
    latest: u64,
    // Rewritten or removed canonical hashes; heights not present use `default_hash`.
    overrides: BTreeMap<u64, Option<B256>>,
    logs: Vec<Log>,
    next_log_index: u64,
    filters: Vec<LogFilter>,
    failure: Option<String>,
    latency: Option<Duration>,
}

/// Simulated log and head store
#[derive(Default)]
pub struct MemoryChain {
    state: RwLock<ChainState>,
}

impl MemoryChain {
    pub fn new(latest: u64) -> Self {
        let chain = Self::default();
        chain.set_latest(latest);
        chain
    }

    /// Canonical hash of `height` unless rewritten
    pub fn default_hash(height: u64) -> B256 {
        keccak256(height.to_be_bytes())
    }

    pub fn set_latest(&self, latest: u64) {
        self.state.write().latest = latest;
    }

    pub fn latest(&self) -> u64 {
        self.state.read().latest
    }

    /// Replace the canonical hash at `height`
    pub fn reorg(&self, height: u64, hash: B256) {
        self.state.write().overrides.insert(height, Some(hash));
    }

    /// Make the head at `height` unknown
    pub fn forget_head(&self, height: u64) {
        self.state.write().overrides.insert(height, None);
    }

    pub fn canonical_hash(&self, height: u64) -> Option<B256> {
        let state = self.state.read();
        Self::hash_in(&state, height)
    }

    fn hash_in(state: &ChainState, height: u64) -> Option<B256> {
        if height > state.latest {
            return None;
        }
        match state.overrides.get(&height) {
            Some(hash) => *hash,
            None => Some(Self::default_hash(height)),
        }
    }

    /// Append an event emitted by `address` in block `block_number`.
    pub fn push_event<E: SolEvent>(&self, address: Address, block_number: u64, event: &E) -> Log {
        self.push_log(address, block_number, event.encode_log_data())
    }

    pub fn push_log(&self, address: Address, block_number: u64, data: LogData) -> Log {
        let mut state = self.state.write();
        let log_index = state.next_log_index;
        state.next_log_index += 1;

        let block_hash = Self::hash_in(&state, block_number).unwrap_or(Self::default_hash(block_number));
        let log = Log {
            inner: PrimitiveLog { address, data },
            block_hash: Some(block_hash),
            block_number: Some(block_number),
            transaction_hash: Some(keccak256(log_index.to_be_bytes())),
            log_index: Some(log_index),
            ..Default::default()
        };
        state.logs.push(log.clone());
        log
    }

    pub fn filters(&self) -> Vec<LogFilter> {
        self.state.read().filters.clone()
    }

    /// Fail every store call with `message` until cleared
    pub fn fail_with(&self, message: impl Into<String>) {
        self.state.write().failure = Some(message.into());
    }

    pub fn clear_failure(&self) {
        self.state.write().failure = None;
    }

    /// Delay every store call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.write().latency = Some(latency);
    }

    async fn before_call(&self) -> Result<()> {
        let (failure, latency) = {
            let state = self.state.read();
            (state.failure.clone(), state.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(message) => Err(eyre::eyre!("{}", message)),
            None => Ok(()),
        }
    }

    fn matching_logs(&self, pred: impl Fn(&Log) -> bool) -> Vec<Log> {
        let mut logs: Vec<Log> = self
            .state
            .read()
            .logs
            .iter()
            .filter(|log| pred(log))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        logs
    }

    fn heads(&self, numbers: &[u64]) -> Vec<BlockHead> {
        let state = self.state.read();
        numbers
            .iter()
            .filter_map(|n| Self::hash_in(&state, *n).map(|hash| BlockHead { number: *n, hash }))
            .collect()
    }
}

fn topic0(log: &Log) -> Option<B256> {
    log.topics().first().copied()
}

#[async_trait]
impl LogStore for MemoryChain {
    async fn register_filter(&self, filter: LogFilter) -> Result<()> {
        self.before_call().await?;
        self.state.write().filters.push(filter);
        Ok(())
    }

    async fn latest_block(&self) -> Result<u64> {
        self.before_call().await?;
        Ok(self.latest())
    }

    async fn logs_with_sigs(
        &self,
        from_block: u64,
        to_block: u64,
        event_sigs: &[B256],
        address: Address,
    ) -> Result<Vec<Log>> {
        self.before_call().await?;
        let sigs: HashSet<B256> = event_sigs.iter().copied().collect();
        Ok(self.matching_logs(|log| {
            let block = log.block_number.unwrap_or_default();
            log.address() == address
                && (from_block..=to_block).contains(&block)
                && topic0(log).is_some_and(|t| sigs.contains(&t))
        }))
    }

    async fn latest_log_by_event_sig_with_confs(
        &self,
        event_sig: B256,
        address: Address,
        confs: u64,
    ) -> Result<Log> {
        self.before_call().await?;
        let tip = confirmed_tip(self.latest(), confs);
        self.matching_logs(|log| {
            log.address() == address
                && topic0(log) == Some(event_sig)
                && log.block_number.unwrap_or_default() <= tip
        })
        .pop()
        .ok_or_else(|| eyre::eyre!("no log {} from {} with {} confirmations", event_sig, address, confs))
    }

    async fn indexed_logs(
        &self,
        event_sig: B256,
        address: Address,
        topic_index: usize,
        topic_values: &[B256],
        confs: u64,
    ) -> Result<Vec<Log>> {
        self.before_call().await?;
        let tip = confirmed_tip(self.latest(), confs);
        Ok(self.matching_logs(|log| {
            log.address() == address
                && topic0(log) == Some(event_sig)
                && log.block_number.unwrap_or_default() <= tip
                && log
                    .topics()
                    .get(topic_index)
                    .is_some_and(|t| topic_values.contains(t))
        }))
    }

    async fn get_blocks(&self, numbers: &[u64]) -> Result<Vec<BlockHead>> {
        self.before_call().await?;
        Ok(self.heads(numbers))
    }
}

#[async_trait]
impl HeadStore for MemoryChain {
    async fn heads_by_numbers(&self, numbers: &[u64]) -> Result<Vec<BlockHead>> {
        self.before_call().await?;
        Ok(self.heads(numbers))
    }
}

/// Beacon contract with fixed view values
#[derive(Debug, Clone, Default)]
pub struct StaticBeacon {
    address: Address,
    proving_key_hash: B256,
    key_id: B256,
    failure: Option<String>,
}

impl StaticBeacon {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn with_proving_key_hash(mut self, hash: B256) -> Self {
        self.proving_key_hash = hash;
        self
    }

    pub fn with_key_id(mut self, key_id: B256) -> Self {
        self.key_id = key_id;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(eyre::eyre!("{}", message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BeaconClient for StaticBeacon {
    fn address(&self) -> Address {
        self.address
    }

    async fn s_proving_key_hash(&self) -> Result<B256> {
        self.check()?;
        Ok(self.proving_key_hash)
    }

    async fn s_key_id(&self) -> Result<B256> {
        self.check()?;
        Ok(self.key_id)
    }
}

/// Coordinator contract with fixed view values
#[derive(Debug, Clone, Default)]
pub struct StaticCoordinator {
    address: Address,
    beacon_period_blocks: U256,
    confirmation_delays: [u32; 8],
}

impl StaticCoordinator {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn with_beacon_period_blocks(mut self, period: U256) -> Self {
        self.beacon_period_blocks = period;
        self
    }

    pub fn with_confirmation_delays(mut self, delays: [u32; 8]) -> Self {
        self.confirmation_delays = delays;
        self
    }
}

#[async_trait]
impl CoordinatorClient for StaticCoordinator {
    fn address(&self) -> Address {
        self.address
    }

    async fn i_beacon_period_blocks(&self) -> Result<U256> {
        Ok(self.beacon_period_blocks)
    }

    async fn get_confirmation_delays(&self) -> Result<[u32; 8]> {
        Ok(self.confirmation_delays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heads_follow_tip_and_reorgs() {
        let chain = MemoryChain::new(10);

        let heads = chain.heads_by_numbers(&[5, 10, 11]).await.unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].hash, MemoryChain::default_hash(5));

        chain.reorg(5, B256::repeat_byte(1));
        chain.forget_head(10);
        let heads = chain.heads_by_numbers(&[5, 10]).await.unwrap();
        assert_eq!(heads, vec![BlockHead { number: 5, hash: B256::repeat_byte(1) }]);
    }

    #[tokio::test]
    async fn test_logs_filtered_by_range_and_signature() {
        let chain = MemoryChain::new(100);
        let address = Address::repeat_byte(1);
        let sig = B256::repeat_byte(2);

        chain.push_log(address, 10, LogData::new_unchecked(vec![sig], Default::default()));
        chain.push_log(address, 20, LogData::new_unchecked(vec![sig], Default::default()));
        chain.push_log(address, 30, LogData::new_unchecked(vec![B256::ZERO], Default::default()));
        chain.push_log(Address::ZERO, 15, LogData::new_unchecked(vec![sig], Default::default()));

        let logs = chain.logs_with_sigs(10, 25, &[sig], address).await.unwrap();
        assert_eq!(logs.len(), 2);

        let latest = chain
            .latest_log_by_event_sig_with_confs(sig, address, 1)
            .await
            .unwrap();
        assert_eq!(latest.block_number, Some(20));

        // Block 20 has only 81 confirmations
        assert!(chain
            .latest_log_by_event_sig_with_confs(sig, address, 90)
            .await
            .is_ok_and(|log| log.block_number == Some(10)));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let chain = MemoryChain::new(1);
        chain.fail_with("db down");
        assert!(chain.latest_block().await.is_err());

        chain.clear_failure();
        assert_eq!(chain.latest_block().await.unwrap(), 1);
    }
}
