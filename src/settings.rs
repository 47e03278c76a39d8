use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::sections::{BareHeaders, Preamble, SegmentPolicy};

const ENV_PREFIX: &str = "CODEBOOK";
const CONFIG_FILE: &str = "codebook";

/// Settings from an optional `codebook.toml` and `CODEBOOK_*` variables.
/// Command-line flags override these.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub keep_preamble: bool,
    #[serde(default)]
    pub keep_bare_headers: bool,
    #[serde(default)]
    pub wash: bool,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("media/plumbing_code/text")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("media/plumbing_code/json")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("media/plumbing_code/uploads")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/codebook.sqlite")
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn segment_policy(&self) -> SegmentPolicy {
        SegmentPolicy {
            preamble: if self.keep_preamble {
                Preamble::Keep
            } else {
                Preamble::Drop
            },
            bare_headers: if self.keep_bare_headers {
                BareHeaders::Keep
            } else {
                BareHeaders::Drop
            },
        }
    }
}
