//! Quorum reader configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuorumError, QuorumResult};

/// Which node-holder list a read is sent to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSelection {
    /// The top `consensus` replicas by weight
    #[default]
    Healthy,
    /// Every known replica, best first
    All,
}

/// Quorum reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    /// Percentage of queried replicas that must return the same body
    pub consensus_percent: u32,

    /// Deadline for a single replica request
    pub request_timeout: Duration,

    /// Deadline for the whole read
    pub read_timeout: Duration,

    pub selection: NodeSelection,

    /// Shuffle the selected replicas before dispatch
    pub shuffle: bool,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            consensus_percent: 51,
            request_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            selection: NodeSelection::Healthy,
            shuffle: true,
        }
    }
}

impl QuorumConfig {
    pub fn validate(&self) -> QuorumResult<()> {
        if self.consensus_percent == 0 || self.consensus_percent > 100 {
            return Err(QuorumError::Config(format!(
                "consensus_percent must be in 1..=100, got {}",
                self.consensus_percent
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(QuorumError::Config("request_timeout must be non-zero".to_string()));
        }
        if self.read_timeout.is_zero() {
            return Err(QuorumError::Config("read_timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Number of identical bodies needed out of `replicas` answers (at least 1)
    pub fn required_consensus(&self, replicas: usize) -> usize {
        let percent = self.consensus_percent as usize;
        (replicas * percent).div_ceil(100).max(1)
    }
}
