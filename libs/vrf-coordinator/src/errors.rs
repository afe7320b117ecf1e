//! Error types for coordinator operations

use std::time::Duration;

use alloy_primitives::B256;

use crate::events::DecodeError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`crate::Coordinator`] methods.
///
/// Policy rejections (unsupported confirmation delay, unexpected topics,
/// undecodable logs) are logged and skipped, they never show up here.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Log store, head store or contract call failed
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Head store did not return one head per requested height
    #[error("could not find all heads: want {want} got {got}")]
    MissingHeads { want: usize, got: usize },

    /// Canonical hash at `height` differs from the one a report was built on
    #[error("re-org detected at height {height}: canonical {canonical}, reported {reported}")]
    Reorg {
        height: u64,
        canonical: B256,
        reported: B256,
    },

    #[error("{context}: committee has {signers} signers but {transmitters} transmitters")]
    InvalidCommittee {
        context: &'static str,
        signers: usize,
        transmitters: usize,
    },

    #[error("{field} out of range: {value}")]
    ValueOutOfRange { field: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{context} timed out after {after:?}")]
    Timeout {
        context: &'static str,
        after: Duration,
    },
}

impl CoordinatorError {
    pub fn transport(context: &'static str, report: eyre::Report) -> Self {
        CoordinatorError::Transport {
            context,
            source: report.into(),
        }
    }

    /// True for failures the host protocol may retry on its own schedule.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Transport { .. } | CoordinatorError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_keeps_context_and_source() {
        let err = CoordinatorError::transport("logs with sigs", eyre::eyre!("connection refused"));

        assert_eq!(err.to_string(), "logs with sigs: connection refused");
        assert!(err.is_transient());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_consistency_errors_are_not_transient() {
        let err = CoordinatorError::Reorg {
            height: 10,
            canonical: B256::repeat_byte(1),
            reported: B256::repeat_byte(2),
        };
        assert!(!err.is_transient());
        assert!(!CoordinatorError::MissingHeads { want: 3, got: 2 }.is_transient());
        assert_eq!(
            CoordinatorError::MissingHeads { want: 3, got: 2 }.to_string(),
            "could not find all heads: want 3 got 2"
        );
    }
}
