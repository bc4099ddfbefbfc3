use anyhow::{Context, Result};
use facematch_vision::VisionConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::comparator::{Comparator, DEFAULT_MATCH_THRESHOLD};
use crate::extractor::SelectionPolicy;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEMATCH_CONFIG_PATH").unwrap_or("/usr/local/etc/facematch/config.toml"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind: String,
    /// Distances strictly below this count as the same person.
    pub match_threshold: f64,
    /// When set, compare requests must use exactly this many components.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_dimension: Option<usize>,
    pub face_selection: SelectionPolicy,
    /// Independent extraction pipelines, i.e. max concurrent inferences.
    pub workers: usize,
    pub max_upload_mb: usize,
    pub timeout_secs: u64,
    pub vision: VisionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5001".to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            expected_dimension: None,
            face_selection: SelectionPolicy::First,
            workers: 2,
            max_upload_mb: 10,
            timeout_secs: 30,
            vision: VisionConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.match_threshold.is_finite() || self.match_threshold <= 0.0 {
            anyhow::bail!(
                "match_threshold must be a positive number, got {}",
                self.match_threshold
            );
        }
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.expected_dimension == Some(0) {
            anyhow::bail!("expected_dimension must be at least 1 when set");
        }
        if self.max_upload_mb == 0 {
            anyhow::bail!("max_upload_mb must be at least 1");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.bind))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn comparator(&self) -> Result<Comparator> {
        Ok(Comparator::new(self.match_threshold)?.with_expected_dimension(self.expected_dimension))
    }
}

pub fn parse_config(raw: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("parsing config {}", path.display()))
}
