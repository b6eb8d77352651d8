//! Job service configuration, read from the environment with sane defaults.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;

/// Tunables for the job subsystem.
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// Root directory for produced artifacts.
    pub artifact_dir: PathBuf,
    /// How long completed results stay downloadable.
    pub retention: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: StdDuration,
    /// Worker loop idle poll interval.
    pub poll_interval: StdDuration,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("./artifacts"),
            retention: Duration::hours(24),
            sweep_interval: StdDuration::from_secs(60),
            poll_interval: StdDuration::from_millis(250),
        }
    }
}

impl JobServiceConfig {
    /// Build from `QUILLERP_*` environment variables; unset or unparseable
    /// values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            artifact_dir: std::env::var("QUILLERP_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            retention: env_u64("QUILLERP_RESULT_RETENTION_HOURS")
                .map(|h| Duration::hours(h as i64))
                .unwrap_or(defaults.retention),
            sweep_interval: env_u64("QUILLERP_SWEEP_INTERVAL_SECS")
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            poll_interval: env_u64("QUILLERP_POLL_INTERVAL_MS")
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_results_for_a_day() {
        let config = JobServiceConfig::default();
        assert_eq!(config.retention, Duration::hours(24));
        assert_eq!(config.sweep_interval, StdDuration::from_secs(60));
    }
}
