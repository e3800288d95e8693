//! Block cache tunables

use config::Config;
use tracing::{info, warn};

const DEFAULT_VOTE_INTERVAL: u64 = 1200;
const DEFAULT_PRUNE_INTERVAL: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCacheConfig {
    /// Heights at which linking re-reads the pending witness set
    pub vote_interval: u64,

    /// Root heights at which a flush sweeps stale orphan branches
    pub prune_interval: u64,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self {
            vote_interval: DEFAULT_VOTE_INTERVAL,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
        }
    }
}

impl BlockCacheConfig {
    pub fn from_config(config: &Config) -> Self {
        let vote_interval = read_interval(config, "vote-interval", DEFAULT_VOTE_INTERVAL);
        info!("Vote interval {vote_interval}");

        let prune_interval = read_interval(config, "prune-interval", DEFAULT_PRUNE_INTERVAL);
        info!("Orphan prune interval {prune_interval}");

        Self {
            vote_interval,
            prune_interval,
        }
    }

    /// Replace zero intervals with the defaults
    pub fn checked(self) -> Self {
        Self {
            vote_interval: nonzero_interval(
                "vote-interval",
                self.vote_interval,
                DEFAULT_VOTE_INTERVAL,
            ),
            prune_interval: nonzero_interval(
                "prune-interval",
                self.prune_interval,
                DEFAULT_PRUNE_INTERVAL,
            ),
        }
    }
}

fn read_interval(config: &Config, key: &str, default: u64) -> u64 {
    match config.get_int(key) {
        Ok(value) if value < 0 => {
            warn!("Ignoring negative {key} {value}, using {default}");
            default
        }
        Ok(value) => nonzero_interval(key, value as u64, default),
        Err(_) => default,
    }
}

fn nonzero_interval(key: &str, value: u64, default: u64) -> u64 {
    if value == 0 {
        warn!("Ignoring zero {key}, using {default}");
        return default;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = Config::builder().build().unwrap();
        assert_eq!(BlockCacheConfig::from_config(&config), BlockCacheConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::builder()
            .set_override("vote-interval", 6)
            .unwrap()
            .set_override("prune-interval", 3)
            .unwrap()
            .build()
            .unwrap();

        let cache_config = BlockCacheConfig::from_config(&config);
        assert_eq!(cache_config.vote_interval, 6);
        assert_eq!(cache_config.prune_interval, 3);
    }

    #[test]
    fn zero_falls_back_to_default() {
        let config = Config::builder().set_override("prune-interval", 0).unwrap().build().unwrap();
        assert_eq!(
            BlockCacheConfig::from_config(&config).prune_interval,
            DEFAULT_PRUNE_INTERVAL
        );
    }

    #[test]
    fn checked_replaces_zero_intervals() {
        let config = BlockCacheConfig {
            vote_interval: 0,
            prune_interval: 4,
        }
        .checked();
        assert_eq!(config.vote_interval, DEFAULT_VOTE_INTERVAL);
        assert_eq!(config.prune_interval, 4);

        let config = BlockCacheConfig {
            vote_interval: 5,
            prune_interval: 0,
        }
        .checked();
        assert_eq!(config.vote_interval, 5);
        assert_eq!(config.prune_interval, DEFAULT_PRUNE_INTERVAL);
    }
}
