//! Planner configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Settings consumed by the planning core.
///
/// Every field has a default, so a JSON file only needs to name what it
/// overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Routing backend base URLs. Order is the tie-break preference.
    pub backends: Vec<String>,
    /// OSRM routing profile.
    pub profile: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Attempts per backend for a single pair.
    pub max_retries: usize,
    /// Delay between attempts on the same backend, in milliseconds.
    pub retry_delay_ms: u64,
    /// Skip the network entirely and use great-circle distances.
    pub fallback_only: bool,
    /// Serve only cached matrices; never build new ones.
    pub offline: bool,
    /// Probe backends at start-up and race them in latency order.
    pub probe_backends: bool,
    /// Daily distance cap for day segmentation, in kilometers.
    pub max_daily_km: f64,
    /// Worker pool size for matrix assembly and tour search.
    pub workers: usize,
    pub cache_dir: PathBuf,
    /// Dated backups kept per cache file.
    pub max_backups: usize,
    /// Status reports kept in the cache directory.
    pub max_reports: usize,
    /// Tour result files kept in the cache directory.
    pub max_results: usize,
    /// Persist the pair cache after this many new pairs.
    pub autosave_every: usize,
    /// Upper bound on 2-opt rounds.
    pub two_opt_max_rounds: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                "https://routing.openstreetmap.de".to_string(),
                "https://router.project-osrm.org".to_string(),
            ],
            profile: "driving".to_string(),
            request_timeout_secs: 45,
            max_retries: 3,
            retry_delay_ms: 2000,
            fallback_only: false,
            offline: false,
            probe_backends: false,
            max_daily_km: 1000.0,
            workers: 4,
            cache_dir: PathBuf::from("cache"),
            max_backups: 5,
            max_reports: 3,
            max_results: 5,
            autosave_every: 10,
            two_opt_max_rounds: 1000,
        }
    }
}

impl PlannerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: PlannerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_input("workers must be greater than zero"));
        }
        if self.max_retries == 0 {
            return Err(Error::invalid_input("max_retries must be greater than zero"));
        }
        if self.max_backups == 0 {
            return Err(Error::invalid_input("max_backups must be greater than zero"));
        }
        if !self.max_daily_km.is_finite() || self.max_daily_km <= 0.0 {
            return Err(Error::invalid_input(format!(
                "max_daily_km must be a positive number, got {}",
                self.max_daily_km
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"workers": 8, "backends": []}"#).expect("parse config");
        assert_eq!(config.workers, 8);
        assert!(config.backends.is_empty());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_daily_km, 1000.0);
    }

    #[test]
    fn test_from_file_rejects_zero_workers() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("planner.json");
        fs::write(&path, r#"{"workers": 0}"#).expect("write config");
        assert!(matches!(
            PlannerConfig::from_file(&path),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_bad_daily_cap() {
        let config = PlannerConfig {
            max_daily_km: f64::NAN,
            ..PlannerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
