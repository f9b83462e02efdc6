use faceid_core::{
    ClassifierConfig, GalleryError, GroupingPolicy, Ingest, DEFAULT_THRESHOLD, DESCRIPTOR_DIM,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("classifier: {0}")]
    Classifier(#[from] GalleryError),
    #[error("descriptor dimension {0} out of range")]
    DimensionOutOfRange(usize),
}

/// Largest descriptor length accepted from configuration.
pub const MAX_DIMENSION: usize = 65_536;

/// Recognition configuration, from `FACEID_*` environment variables or a
/// TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Euclidean distance threshold for a positive match.
    pub threshold: f32,
    /// Descriptor length produced by the face engine.
    pub dimension: usize,
    /// How training labels are grouped into categories.
    pub grouping: GroupingPolicy,
    /// Refuse to train an empty gallery.
    pub require_non_empty: bool,
    /// JSON training dataset to load at startup.
    pub dataset_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            dimension: DESCRIPTOR_DIM,
            grouping: GroupingPolicy::Adjacent,
            require_non_empty: false,
            dataset_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `FACEID_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            threshold: parse_or(&lookup, "FACEID_THRESHOLD", defaults.threshold),
            dimension: parse_or(&lookup, "FACEID_DIMENSION", defaults.dimension),
            grouping: lookup("FACEID_GROUPING")
                .map(|v| parse_grouping(&v))
                .unwrap_or(defaults.grouping),
            require_non_empty: lookup("FACEID_REQUIRE_NON_EMPTY")
                .map(|v| parse_flag("FACEID_REQUIRE_NON_EMPTY", &v, defaults.require_non_empty))
                .unwrap_or(defaults.require_non_empty),
            dataset_path: lookup("FACEID_DATASET").map(PathBuf::from),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.classifier_config().validate()?;
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(ConfigError::DimensionOutOfRange(self.dimension));
        }
        Ok(())
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            threshold: self.threshold,
        }
    }

    pub fn ingest(&self) -> Ingest {
        Ingest::new()
            .policy(self.grouping)
            .require_non_empty(self.require_non_empty)
            .dimension(self.dimension)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(key: &str, value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => {
            tracing::warn!(key, value = other, "unrecognised boolean; using default");
            default
        }
    }
}

fn parse_grouping(value: &str) -> GroupingPolicy {
    match value.trim().to_ascii_lowercase().as_str() {
        "global" => GroupingPolicy::Global,
        "adjacent" => GroupingPolicy::Adjacent,
        other => {
            tracing::warn!(value = other, "unknown FACEID_GROUPING; using adjacent");
            GroupingPolicy::Adjacent
        }
    }
}
