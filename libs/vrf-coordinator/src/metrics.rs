//! Report size and method timing metrics
//!
//! Histograms are recorded through the `metrics` facade; installing an
//! exporter is left to the host process.

use std::time::{Duration, Instant};

use alloy_primitives::B256;
use metrics::{describe_histogram, histogram, Unit};

pub const BLOCKS_TO_REPORT: &str = "ocr2vrf_coordinator_blocks_to_report";
pub const CALLBACKS_TO_REPORT: &str = "ocr2vrf_coordinator_callbacks_to_report";
pub const BLOCKS_IN_REPORT: &str = "ocr2vrf_coordinator_blocks_in_report";
pub const CALLBACKS_IN_REPORT: &str = "ocr2vrf_coordinator_callbacks_in_report";
pub const METHOD_TIME: &str = "ocr2vrf_coordinator_method_time";

pub fn describe_metrics() {
    describe_histogram!(
        BLOCKS_TO_REPORT,
        "Unfulfilled blocks that fit in the current report"
    );
    describe_histogram!(
        CALLBACKS_TO_REPORT,
        "Unfulfilled callbacks that fit in the current report"
    );
    describe_histogram!(BLOCKS_IN_REPORT, "Blocks in a report accepted for transmission");
    describe_histogram!(
        CALLBACKS_IN_REPORT,
        "Callbacks in a report accepted for transmission"
    );
    describe_histogram!(METHOD_TIME, Unit::Seconds, "Time spent in a coordinator method");
}

/// Labels attached to every coordinator metric
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricLabels {
    pub oracle_id: u8,
    pub config_digest: B256,
}

impl MetricLabels {
    fn pairs(&self) -> [(&'static str, String); 2] {
        [
            ("oracle_id", self.oracle_id.to_string()),
            ("config_digest", self.config_digest.to_string()),
        ]
    }
}

pub fn record_report_blocks(labels: &MetricLabels, blocks: usize, callbacks: usize) {
    histogram!(BLOCKS_TO_REPORT, &labels.pairs()).record(blocks as f64);
    histogram!(CALLBACKS_TO_REPORT, &labels.pairs()).record(callbacks as f64);
}

pub fn record_report_will_be_transmitted(labels: &MetricLabels, blocks: usize, callbacks: usize) {
    histogram!(BLOCKS_IN_REPORT, &labels.pairs()).record(blocks as f64);
    histogram!(CALLBACKS_IN_REPORT, &labels.pairs()).record(callbacks as f64);
}

/// Logs and records the duration of a method call when dropped
#[derive(Debug)]
pub struct MethodTimer {
    method: &'static str,
    labels: MetricLabels,
    start: Instant,
}

impl MethodTimer {
    pub fn start(method: &'static str, labels: MetricLabels) -> Self {
        Self {
            method,
            labels,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for MethodTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        tracing::debug!(
            method = self.method,
            elapsed_ms = elapsed.as_millis() as u64,
            "{} took {}ms to complete",
            self.method,
            elapsed.as_millis()
        );

        let mut labels = self.labels.pairs().to_vec();
        labels.push(("method", self.method.to_string()));
        histogram!(METHOD_TIME, &labels).record(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_render_digest_as_hex() {
        let labels = MetricLabels {
            oracle_id: 3,
            config_digest: B256::repeat_byte(0xab),
        };
        let pairs = labels.pairs();

        assert_eq!(pairs[0], ("oracle_id", "3".to_string()));
        assert!(pairs[1].1.starts_with("0xabab"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_report_blocks(&MetricLabels::default(), 2, 5);

        let timer = MethodTimer::start("ReportBlocks", MetricLabels::default());
        assert!(timer.elapsed() < Duration::from_secs(60));
    }
}
