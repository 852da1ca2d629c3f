//! CLI configuration

use hawk_advisor::AdvisorConfig;
use hawk_analyzer::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CtlError, CtlResult};

/// Configuration for hawkctl, read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HawkConfig {
    /// Region analyzed first
    #[serde(default = "default_region")]
    pub primary_region: String,

    /// Region serving the billing APIs
    #[serde(default = "default_region")]
    pub cost_region: String,

    /// Regions scanned when discovery fails
    #[serde(default = "default_fallback_regions")]
    pub fallback_regions: Vec<String>,

    /// Directory holding history, limits and credentials
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Outer bound on one analysis run
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,

    /// History entries fed to the advisor
    #[serde(default = "default_history_limit")]
    pub history_context_limit: usize,

    #[serde(default)]
    pub llm: AdvisorConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_grace")]
    pub grace_period_secs: i64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_fallback_regions() -> Vec<String> {
    hawk_cloud::FALLBACK_REGIONS
        .iter()
        .map(|r| r.to_string())
        .collect()
}

fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".costhawk")
}

fn default_analysis_timeout() -> u64 {
    300
}

fn default_history_limit() -> usize {
    5
}

fn default_grace() -> i64 {
    hawk_guard::DEFAULT_GRACE_SECS
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for HawkConfig {
    fn default() -> Self {
        Self {
            primary_region: default_region(),
            cost_region: default_region(),
            fallback_regions: default_fallback_regions(),
            state_path: default_state_path(),
            analysis_timeout_secs: default_analysis_timeout(),
            history_context_limit: default_history_limit(),
            llm: AdvisorConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl HawkConfig {
    pub fn default_path() -> PathBuf {
        default_state_path().join("config.json")
    }

    pub fn load(path: &Path) -> CtlResult<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CtlError::Config(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| CtlError::Config(format!("parse {}: {e}", path.display())))
    }

    /// Like [`load`](Self::load), but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> CtlResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> CtlResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Apply `AWS_REGION`, `GEMINI_API_KEY` and `COSTHAWK_STATE`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(region) = set("AWS_REGION") {
            self.primary_region = region;
        }
        if let Some(key) = set("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(path) = set("COSTHAWK_STATE") {
            self.state_path = PathBuf::from(path);
        }
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            primary_region: self.primary_region.clone(),
            cost_region: self.cost_region.clone(),
            fallback_regions: self.fallback_regions.clone(),
        }
    }
}
