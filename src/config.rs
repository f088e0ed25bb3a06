//! Execution configuration
//!
//! Handles loading and managing the recognized execution options.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;

/// Partitioning algorithm for parallel collection scheduling
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelAlgorithm {
    /// Shared executor with a cap on concurrently running collections
    #[default]
    Conservative,
    /// Fixed-size private pool of exactly N long-lived workers
    Aggressive,
}

impl fmt::Display for ParallelAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParallelAlgorithm::Conservative => write!(f, "conservative"),
            ParallelAlgorithm::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// Recognized execution options
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Run all test collections serially on the caller's task
    #[serde(default)]
    pub disable_parallelization: bool,

    /// `-1` = unlimited, `0`/unset = CPU count, `1` = serial-by-policy,
    /// `N` = bounded
    #[serde(default)]
    pub max_parallel_threads: i32,

    #[serde(default)]
    pub parallel_algorithm: ParallelAlgorithm,

    /// Force the synchronous bus variant so sinks observe each message
    /// inline
    #[serde(default)]
    pub synchronous_message_reporting: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            disable_parallelization: false,
            max_parallel_threads: 0,
            parallel_algorithm: ParallelAlgorithm::Conservative,
            synchronous_message_reporting: false,
        }
    }
}

impl ExecutionConfig {
    /// Load configuration from a YAML or JSON file, by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to a YAML or JSON file, by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply `CRUCIBLE_*` environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> Self {
        let overrides = EnvOverrides::load();
        if let Some(value) = overrides.disable_parallelization {
            self.disable_parallelization = value;
        }
        if let Some(value) = overrides.max_parallel_threads {
            self.max_parallel_threads = value;
        }
        if let Some(value) = overrides.parallel_algorithm {
            self.parallel_algorithm = value;
        }
        if let Some(value) = overrides.synchronous_message_reporting {
            self.synchronous_message_reporting = value;
        }
        self
    }

    /// Worker cap after resolving the unlimited/unset sentinels
    pub fn effective_parallel_threads(&self) -> usize {
        match self.max_parallel_threads {
            n if n <= 0 => num_cpus::get(),
            n => n as usize,
        }
    }

    /// Human description used in the test-framework environment string
    pub fn parallelism_description(&self) -> String {
        if self.disable_parallelization {
            "non-parallel".to_string()
        } else {
            format!(
                "parallel ({} threads, {})",
                self.effective_parallel_threads(),
                self.parallel_algorithm
            )
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// Environment variable prefix
const ENV_PREFIX: &str = "CRUCIBLE";

/// Environment overrides for [`ExecutionConfig`]
#[derive(Clone, Debug, Default)]
pub struct EnvOverrides {
    /// From `CRUCIBLE_DISABLE_PARALLELIZATION`
    pub disable_parallelization: Option<bool>,
    /// From `CRUCIBLE_MAX_PARALLEL_THREADS`
    pub max_parallel_threads: Option<i32>,
    /// From `CRUCIBLE_PARALLEL_ALGORITHM`
    pub parallel_algorithm: Option<ParallelAlgorithm>,
    /// From `CRUCIBLE_SYNCHRONOUS_MESSAGE_REPORTING`
    pub synchronous_message_reporting: Option<bool>,
}

impl EnvOverrides {
    /// Load overrides from environment variables
    pub fn load() -> Self {
        Self {
            disable_parallelization: get_env_bool("DISABLE_PARALLELIZATION"),
            max_parallel_threads: get_env_parse("MAX_PARALLEL_THREADS"),
            parallel_algorithm: get_env("PARALLEL_ALGORITHM").and_then(|s| parse_algorithm(&s)),
            synchronous_message_reporting: get_env_bool("SYNCHRONOUS_MESSAGE_REPORTING"),
        }
    }

    pub fn has_any(&self) -> bool {
        self.disable_parallelization.is_some()
            || self.max_parallel_threads.is_some()
            || self.parallel_algorithm.is_some()
            || self.synchronous_message_reporting.is_some()
    }
}

fn parse_algorithm(value: &str) -> Option<ParallelAlgorithm> {
    match value.to_lowercase().as_str() {
        "conservative" => Some(ParallelAlgorithm::Conservative),
        "aggressive" => Some(ParallelAlgorithm::Aggressive),
        _ => None,
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}
