//! Log and head store interfaces, plus an adapter over an alloy provider
//!
//! The coordinator never talks to the chain directly. It reads logs through
//! [`LogStore`] and resolves canonical block hashes through [`HeadStore`].

use std::collections::HashMap;
use std::future::Future;

use alloy::eips::BlockNumberOrTag;
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use eyre::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::RwLock;

/// Widest block range a single `eth_getLogs` request may cover
pub const DEFAULT_LOG_SCAN_BLOCKS: u64 = 10_000;

/// Block requests kept in flight while resolving heads
pub const MAX_CONCURRENT_HEAD_REQUESTS: usize = 32;

/// Block number and canonical hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHead {
    pub number: u64,
    pub hash: B256,
}

/// Topics and addresses a log store must index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub name: String,
    pub event_sigs: Vec<B256>,
    pub addresses: Vec<Address>,
}

/// Query interface of the log indexing store
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Ask the store to index logs matching `filter`.
    async fn register_filter(&self, filter: LogFilter) -> Result<()>;

    async fn latest_block(&self) -> Result<u64>;

    /// Logs from `address` with topic0 in `event_sigs`, in `[from_block, to_block]`,
    /// ordered by block then log index.
    async fn logs_with_sigs(
        &self,
        from_block: u64,
        to_block: u64,
        event_sigs: &[B256],
        address: Address,
    ) -> Result<Vec<Log>>;

    /// Most recent log with topic0 `event_sig` that has at least `confs` confirmations.
    async fn latest_log_by_event_sig_with_confs(
        &self,
        event_sig: B256,
        address: Address,
        confs: u64,
    ) -> Result<Log>;

    /// Logs whose topic at `topic_index` is one of `topic_values`.
    ///
    /// `topic_index` is the position in the topics array, so 1 selects the
    /// first indexed event argument.
    async fn indexed_logs(
        &self,
        event_sig: B256,
        address: Address,
        topic_index: usize,
        topic_values: &[B256],
        confs: u64,
    ) -> Result<Vec<Log>>;

    async fn get_blocks(&self, numbers: &[u64]) -> Result<Vec<BlockHead>>;
}

/// Canonical head lookup by block number
#[async_trait]
pub trait HeadStore: Send + Sync {
    /// Heads for the requested numbers. Numbers the store does not know are
    /// left out; callers decide whether that is an error.
    async fn heads_by_numbers(&self, numbers: &[u64]) -> Result<Vec<BlockHead>>;
}

/// Highest block with at least `confs` confirmations when the tip is `latest`.
///
/// The tip itself has one confirmation.
pub fn confirmed_tip(latest: u64, confs: u64) -> u64 {
    latest.saturating_add(1).saturating_sub(confs).min(latest)
}

/// Inclusive block ranges of at most `span` blocks, walking back from `tip`
/// to genesis, newest first.
pub fn ranges_back_from(tip: u64, span: u64) -> impl Iterator<Item = (u64, u64)> {
    let span = span.max(1);
    std::iter::successors(Some((tip.saturating_sub(span - 1), tip)), move |&(from, _)| {
        (from > 0).then(|| {
            let to = from - 1;
            (to.saturating_sub(span - 1), to)
        })
    })
}

/// Run `fetch` for every number with at most `limit` calls in flight.
///
/// Results keep the order of `numbers`; the first error aborts the batch.
pub async fn fetch_concurrently<T, F, Fut>(numbers: &[u64], limit: usize, fetch: F) -> Result<Vec<T>>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    stream::iter(numbers.iter().copied())
        .map(fetch)
        .buffered(limit.max(1))
        .try_collect()
        .await
}

/// [`LogStore`] and [`HeadStore`] answered straight from an RPC node
pub struct ProviderLogStore<P: Provider + Clone> {
    provider: P,
    filters: RwLock<HashMap<String, LogFilter>>,
    scan_blocks: u64,
}

impl<P> ProviderLogStore<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            filters: RwLock::new(HashMap::new()),
            scan_blocks: DEFAULT_LOG_SCAN_BLOCKS,
        }
    }

    /// Cap the block range of each log query. Zero is treated as one block.
    pub fn with_scan_blocks(mut self, blocks: u64) -> Self {
        self.scan_blocks = blocks.max(1);
        self
    }

    /// Names of the filters registered so far
    pub fn filter_names(&self) -> Vec<String> {
        self.filters.read().keys().cloned().collect()
    }

    async fn fetch_logs(&self, filter: Filter) -> Result<Vec<Log>> {
        let mut logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| eyre::eyre!("eth_getLogs failed: {}", e))?;

        logs.retain(|log| !log.removed);
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn head(&self, number: u64) -> Result<Option<BlockHead>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| eyre::eyre!("eth_getBlockByNumber({}) failed: {}", number, e))?;

        Ok(block.map(|b| BlockHead {
            number,
            hash: b.header.hash,
        }))
    }
}

#[async_trait]
impl<P> LogStore for ProviderLogStore<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn register_filter(&self, filter: LogFilter) -> Result<()> {
        tracing::info!(
            name = %filter.name,
            event_sigs = filter.event_sigs.len(),
            addresses = ?filter.addresses,
            "Registered log filter"
        );
        self.filters.write().insert(filter.name.clone(), filter);
        Ok(())
    }

    async fn latest_block(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| eyre::eyre!("eth_blockNumber failed: {}", e))
    }

    async fn logs_with_sigs(
        &self,
        from_block: u64,
        to_block: u64,
        event_sigs: &[B256],
        address: Address,
    ) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(address)
            .event_signature(event_sigs.to_vec())
            .from_block(from_block)
            .to_block(to_block);

        self.fetch_logs(filter).await
    }

    async fn latest_log_by_event_sig_with_confs(
        &self,
        event_sig: B256,
        address: Address,
        confs: u64,
    ) -> Result<Log> {
        let tip = confirmed_tip(self.latest_block().await?, confs);

        for (from_block, to_block) in ranges_back_from(tip, self.scan_blocks) {
            let filter = Filter::new()
                .address(address)
                .event_signature(event_sig)
                .from_block(from_block)
                .to_block(to_block);

            if let Some(log) = self.fetch_logs(filter).await?.pop() {
                return Ok(log);
            }
            tracing::trace!(%event_sig, %address, from_block, to_block, "No log in range");
        }

        Err(eyre::eyre!("no log {} from {} with {} confirmations", event_sig, address, confs))
    }

    async fn indexed_logs(
        &self,
        event_sig: B256,
        address: Address,
        topic_index: usize,
        topic_values: &[B256],
        confs: u64,
    ) -> Result<Vec<Log>> {
        // Only the most recent `scan_blocks` confirmed blocks are searched.
        let tip = confirmed_tip(self.latest_block().await?, confs);
        let from_block = tip.saturating_sub(self.scan_blocks - 1);
        let filter = Filter::new()
            .address(address)
            .event_signature(event_sig)
            .from_block(from_block)
            .to_block(tip);

        let values = topic_values.to_vec();
        let filter = match topic_index {
            1 => filter.topic1(values),
            2 => filter.topic2(values),
            3 => filter.topic3(values),
            other => return Err(eyre::eyre!("invalid indexed topic position {}", other)),
        };

        self.fetch_logs(filter).await
    }

    async fn get_blocks(&self, numbers: &[u64]) -> Result<Vec<BlockHead>> {
        self.heads_by_numbers(numbers).await
    }
}

#[async_trait]
impl<P> HeadStore for ProviderLogStore<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn heads_by_numbers(&self, numbers: &[u64]) -> Result<Vec<BlockHead>> {
        let found =
            fetch_concurrently(numbers, MAX_CONCURRENT_HEAD_REQUESTS, |n| self.head(n)).await?;

        let mut heads = Vec::with_capacity(found.len());
        for (number, head) in numbers.iter().zip(found) {
            match head {
                Some(head) => heads.push(head),
                None => tracing::debug!(number, "Block not found"),
            }
        }
        Ok(heads)
    }
}
