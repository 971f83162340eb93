use std::path::PathBuf;

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    anki::FieldLayout,
    core::ImportError,
    frequency::FrequencySource,
    persistence::{
        load_json_or_default,
        save_json,
        DEFAULT_BATCH_SIZE,
    },
};

pub const SETTINGS_FILE: &str = "import_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    /// SQLite file; `None` means `cards.db` in the app data dir.
    Local { path: Option<PathBuf> },
    Rest { base_url: String, token: Option<String> },
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Local { path: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub frequency_source: Option<FrequencySource>,
    pub field_layout: FieldLayout,
    pub backend: Backend,
    pub allow_empty_review_log: bool,
    /// Name reported to the backend with each upload. Defaults to the archive's file name.
    pub upload_filename: Option<String>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            frequency_source: None,
            field_layout: FieldLayout::default(),
            backend: Backend::default(),
            allow_empty_review_log: false,
            upload_filename: None,
        }
    }
}

impl ImportSettings {
    pub fn load() -> Self {
        load_json_or_default(SETTINGS_FILE)
    }

    pub fn save(&self) -> Result<(), ImportError> {
        save_json(self, SETTINGS_FILE)
    }

    /// Applies command-line overrides on top of the loaded settings.
    pub fn apply(&mut self, overrides: &CliOverrides) -> Result<(), ImportError> {
        if let Some(freq) = &overrides.freq {
            self.frequency_source = Some(FrequencySource::parse(freq));
        }
        if let Some(filename) = &overrides.filename {
            self.upload_filename = Some(filename.clone());
        }
        match overrides.batch_size {
            Some(0) => return Err(ImportError::Custom("Batch size must be at least 1".to_string())),
            Some(n) => self.batch_size = n,
            None => {}
        }
        if overrides.allow_empty_revlog {
            self.allow_empty_review_log = true;
        }

        match (&overrides.rest, &overrides.db) {
            (Some(_), Some(_)) => {
                return Err(ImportError::Custom("--rest and --db cannot be combined".to_string()));
            }
            (Some(base_url), None) => {
                let token = overrides.token.clone().or_else(|| match &self.backend {
                    Backend::Rest { token, .. } => token.clone(),
                    Backend::Local { .. } => None,
                });
                self.backend = Backend::Rest { base_url: base_url.clone(), token };
            }
            (None, Some(path)) => self.backend = Backend::Local { path: Some(path.clone()) },
            (None, None) => {
                if let (Some(new_token), Backend::Rest { token, .. }) = (&overrides.token, &mut self.backend) {
                    *token = Some(new_token.clone());
                }
            }
        }

        Ok(())
    }
}

/// Flags shared by every subcommand.
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    /// Frequency list (CSV, or TSV for .tsv/.txt)
    #[arg(long, value_name = "PATH|URL")]
    pub freq: Option<String>,
    /// Remote card API instead of the local store
    #[arg(long, value_name = "URL", conflicts_with = "db")]
    pub rest: Option<String>,
    /// Bearer token for the remote card API
    #[arg(long)]
    pub token: Option<String>,
    /// Local SQLite store
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
    /// Name reported with uploads
    #[arg(long)]
    pub filename: Option<String>,
    /// Cards per write
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Import decks that were never reviewed
    #[arg(long)]
    pub allow_empty_revlog: bool,
}
