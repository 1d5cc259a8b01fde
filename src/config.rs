use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const DEFAULT_INPUT_PREFIX: &str = "pdfs";
pub const DEFAULT_OUTPUT_PREFIX: &str = "json";
pub const DEFAULT_PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConverterConfig {
    pub program: String,
    /// `{input}` được thay bằng đường dẫn PDF
    #[serde(default)]
    pub args: Vec<String>,
}

/// YAML config file; mọi field đều optional, CLI override.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    pub store: Option<StoreConfig>,
    pub input_prefix: Option<String>,
    pub output_prefix: Option<String>,
    pub metadata_prefix: Option<String>,
    pub converter: Option<ConverterConfig>,
    pub required_fields: Option<Vec<String>>,
    pub workers: Option<usize>,
    pub progress_every: Option<usize>,
}

pub fn load_yaml(path: &Path) -> Result<YamlConfig> {
    let file = File::open(path).with_context(|| format!("open config {}", path.display()))?;
    serde_yaml::from_reader(file).with_context(|| format!("parse config {}", path.display()))
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub store: StoreConfig,
    pub input_prefix: String,
    pub output_prefix: String,
    pub metadata_prefix: String,
    pub converter: Option<ConverterConfig>,
    pub required_fields: Vec<String>,
    pub workers: usize,
    pub progress_every: usize,
}

impl Settings {
    /// Defaults for everything the YAML file leaves out. Local store at `.`
    /// when no store is configured.
    pub fn from_yaml(y: YamlConfig) -> Self {
        let output_prefix = y
            .output_prefix
            .unwrap_or_else(|| DEFAULT_OUTPUT_PREFIX.to_string());
        let metadata_prefix = y
            .metadata_prefix
            .unwrap_or_else(|| format!("{}/metadata", output_prefix.trim_end_matches('/')));

        Self {
            store: y.store.unwrap_or(StoreConfig::Local {
                root: PathBuf::from("."),
            }),
            input_prefix: y
                .input_prefix
                .unwrap_or_else(|| DEFAULT_INPUT_PREFIX.to_string()),
            output_prefix,
            metadata_prefix,
            converter: y.converter,
            required_fields: y
                .required_fields
                .unwrap_or_else(|| vec!["latitude".to_string(), "longitude".to_string()]),
            workers: y.workers.unwrap_or(1).max(1),
            progress_every: y
                .progress_every
                .unwrap_or(DEFAULT_PROGRESS_EVERY)
                .max(1),
        }
    }

    /// `<metadata_prefix>/file_list.json`
    pub fn catalog_key(&self) -> String {
        crate::store::join_key(&self.metadata_prefix, "file_list.json")
    }

    /// `<metadata_prefix>/run_report.json`
    pub fn report_key(&self) -> String {
        crate::store::join_key(&self.metadata_prefix, "run_report.json")
    }
}
