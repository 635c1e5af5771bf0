//! Node settings loaded from YAML.

use crate::{
    config::{Configuration, ParamValue},
    sync::MatchPolicy,
};
use eyre::{Result, WrapErr, bail, ensure, eyre};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Root settings structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    /// Synchronization parameters.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Initial input and output frames.
    #[serde(default)]
    pub frames: FrameConfig,

    /// Initial algorithm parameters, applied over the defaults.
    #[serde(default)]
    pub parameters: IndexMap<String, ParamValue>,
}

impl NodeConfig {
    /// Load settings from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .wrap_err_with(|| format!("Failed to load config file: {}", path.display()))
    }

    /// Parse and validate settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: NodeConfig =
            serde_yaml::from_str(yaml).wrap_err("Failed to parse node settings")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sync.max_queue_size > 0,
            "sync.max_queue_size must be greater than zero"
        );

        if self.sync.use_indices && self.sync.approximate_sync {
            match self.sync.tolerance {
                Some(tolerance) => ensure!(
                    !tolerance.is_zero(),
                    "sync.tolerance must be greater than zero"
                ),
                None => bail!("sync.tolerance is required when sync.approximate_sync is set"),
            }
        }

        Ok(())
    }

    /// The matching policy these settings select.
    pub fn match_policy(&self) -> Result<MatchPolicy> {
        if !self.sync.use_indices {
            return Ok(MatchPolicy::Passthrough);
        }
        if !self.sync.approximate_sync {
            return Ok(MatchPolicy::Exact);
        }

        let tolerance = self
            .sync
            .tolerance
            .ok_or_else(|| eyre!("sync.tolerance is required when sync.approximate_sync is set"))?;
        Ok(MatchPolicy::Approximate { tolerance })
    }

    /// The configuration the store starts with: the default parameter set
    /// overridden by `parameters`. Non-empty `frames` take precedence over
    /// frame names given as parameters.
    pub fn initial_configuration(&self) -> Configuration {
        let mut config = Configuration::default();
        for (name, value) in &self.parameters {
            config.set(name, value);
        }
        if !self.frames.input_frame.is_empty() {
            config.input_frame.clone_from(&self.frames.input_frame);
        }
        if !self.frames.output_frame.is_empty() {
            config.output_frame.clone_from(&self.frames.output_frame);
        }
        config
    }
}

/// Synchronization parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Pair records with the index stream. Records pass straight through
    /// when unset.
    #[serde(default)]
    pub use_indices: bool,

    /// Pair by closest timestamp within `tolerance` instead of by identical
    /// timestamp.
    #[serde(default)]
    pub approximate_sync: bool,

    /// Maximum messages to buffer per input stream.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Largest timestamp difference accepted by approximate matching.
    #[serde(default, with = "humantime_serde")]
    pub tolerance: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            use_indices: false,
            approximate_sync: false,
            max_queue_size: default_max_queue_size(),
            tolerance: None,
        }
    }
}

fn default_max_queue_size() -> usize {
    3
}

/// Initial frame settings. Empty names disable reframing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameConfig {
    #[serde(default)]
    pub input_frame: String,

    #[serde(default)]
    pub output_frame: String,
}
