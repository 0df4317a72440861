//! Engine configuration.

use std::time::Duration;

use viewsync_core::{Result, SyncError};

use crate::batch::DEFAULT_BATCH_SIZE;

/// Configuration for the sync engine and its scheduler.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long the scheduler sleeps between reconciliation cycles
    pub poll_interval: Duration,
    /// Metadata tables processed per batch; zero falls back to the
    /// default of 1000
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    /// Minimum allowed poll interval.
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval < Self::MIN_POLL_INTERVAL {
            return Err(SyncError::Config(format!(
                "poll_interval ({:?}) must be >= {:?}",
                self.poll_interval,
                Self::MIN_POLL_INTERVAL
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = SyncConfig {
            poll_interval: Duration::ZERO,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
