use crate::error::{validation_error, AppError};
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "PHISHPROBE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub dns_timeout_ms: u64,
    pub tls_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub tls_port: u16,
    pub max_redirects: u32,
    pub user_agent: String,
    pub trust_roots: TrustRoots,
}

/// Where the TLS sub-probe gets its trust anchors from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustRoots {
    /// Platform certificate store, falling back to the bundled Mozilla set
    /// when the platform yields nothing.
    #[default]
    System,
    /// Bundled Mozilla set only.
    Bundled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Config {
    /// Defaults overlaid with `PHISHPROBE_<SECTION>__<KEY>` environment variables.
    pub fn load() -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let probe = &self.probe;
        if probe.dns_timeout_ms == 0 || probe.tls_timeout_ms == 0 || probe.http_timeout_ms == 0 {
            return Err(validation_error("probe timeouts must be greater than zero"));
        }
        if self.batch.concurrency == 0 {
            return Err(validation_error("batch concurrency must be at least 1"));
        }
        let fraction = self.training.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(validation_error("test_fraction must lie strictly between 0 and 1"));
        }
        if self.training.epochs == 0 || self.training.learning_rate <= 0.0 {
            return Err(validation_error(
                "training needs a positive epoch count and learning rate",
            ));
        }
        Ok(())
    }
}

impl ProbeConfig {
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn tls_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dns_timeout_ms: 3000,
            tls_timeout_ms: 3000,
            http_timeout_ms: 5000,
            tls_port: 443,
            max_redirects: 30,
            user_agent: format!("phishprobe/{}", env!("CARGO_PKG_VERSION")),
            trust_roots: TrustRoots::System,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            seed: 42,
            epochs: 500,
            learning_rate: 0.1,
            l2: 0.001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.concurrency, 10);
        assert_eq!(config.probe.tls_port, 443);
        assert_eq!(config.probe.tls_timeout(), Duration::from_secs(3));
        assert_eq!(config.probe.http_timeout(), Duration::from_secs(5));
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.probe.max_redirects, 30);
        assert_eq!(config.probe.trust_roots, TrustRoots::System);
    }

    #[test]
    fn test_trust_roots_parse_from_lowercase() {
        let roots: TrustRoots = serde_json::from_str("\"bundled\"").unwrap();
        assert_eq!(roots, TrustRoots::Bundled);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.batch.concurrency = 0;
        assert!(matches!(config.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_out_of_range_fraction() {
        let mut config = Config::default();
        config.training.test_fraction = 1.0;
        assert!(config.validate().is_err());
        config.training.test_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_environment_uses_defaults() {
        let config = Config::load().unwrap();
        assert_eq!(config.probe.http_timeout_ms, 5000);
        assert_eq!(config.training.test_fraction, 0.3);
    }
}
