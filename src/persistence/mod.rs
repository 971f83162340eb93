use std::{
    fs,
    path::PathBuf,
};

use async_trait::async_trait;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::core::{
    models::{
        CardRecord,
        ImportHistory,
        ImportMetadata,
        StatsUpdate,
        SyncSummary,
    },
    settings::Backend,
    ImportError,
    Progress,
};

pub mod local_store;
pub mod rest_store;

pub use local_store::LocalStore;
pub use rest_store::RestStore;

const APP_NAME: &str = "ankiport";

pub const DEFAULT_BATCH_SIZE: usize = 100;

pub fn get_app_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join(APP_NAME);
        let _ = fs::create_dir_all(&app_dir);
        app_dir
    } else {
        PathBuf::from(".")
    }
}

pub fn get_data_file_path(filename: &str) -> PathBuf {
    get_app_data_dir().join(filename)
}

pub fn save_json<T: Serialize>(data: &T, filename: &str) -> Result<(), ImportError> {
    let file_path = get_data_file_path(filename);
    let json = serde_json::to_string_pretty(data)?;
    fs::write(&file_path, json)?;
    debug!("Data saved to: {}", file_path.display());
    Ok(())
}

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> Result<T, ImportError> {
    let file_path = get_data_file_path(filename);

    if !file_path.exists() {
        return Ok(T::default());
    }

    let json = fs::read_to_string(&file_path)?;
    let data: T = serde_json::from_str(&json)?;
    debug!("Data loaded from: {}", file_path.display());
    Ok(data)
}

pub fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> T {
    match load_json::<T>(filename) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to load {}: {}. Using defaults.", filename, e);
            T::default()
        }
    }
}

/// Where finished cards go. Implementations must leave app-specific fields
/// (answer counters, confusion links) alone when applying stats updates.
#[async_trait]
pub trait CardStore: Send {
    /// Writes one batch; cards are keyed by note id and replace earlier copies.
    async fn save_cards(&mut self, batch: &[CardRecord]) -> Result<(), ImportError>;

    async fn record_import(&mut self, metadata: &ImportMetadata) -> Result<(), ImportError>;

    /// Updates scheduling data of cards that already exist, skipping unknown notes.
    async fn apply_stats(&mut self, updates: &[StatsUpdate]) -> Result<SyncSummary, ImportError>;

    async fn import_history(&mut self) -> Result<ImportHistory, ImportError>;
}

pub fn open_store(backend: &Backend, upload_filename: &str) -> Result<Box<dyn CardStore>, ImportError> {
    match backend {
        Backend::Local { path: Some(path) } => Ok(Box::new(LocalStore::open(path)?)),
        Backend::Local { path: None } => Ok(Box::new(LocalStore::open_default()?)),
        Backend::Rest { base_url, token } => {
            info!("Using card backend at {}", base_url);
            Ok(Box::new(RestStore::new(base_url, token.clone())?.with_upload_filename(upload_filename)))
        }
    }
}

/// Writes records in sequential batches. The first failing batch aborts the
/// rest; batches already written are kept.
pub async fn write_batches<S: CardStore + ?Sized>(
    store: &mut S,
    records: &[CardRecord],
    batch_size: usize,
    progress: &Progress,
) -> Result<usize, ImportError> {
    let batch_size = batch_size.max(1);
    let total_batches = records.len().div_ceil(batch_size);

    for (i, batch) in records.chunks(batch_size).enumerate() {
        let batch_num = i + 1;
        let pct = 90 + ((batch_num * 9) / total_batches) as u8;
        progress.report(
            pct,
            &format!("Saving batch {}/{} ({} cards)...", batch_num, total_batches, batch.len()),
        );

        store.save_cards(batch).await.map_err(|e| match e {
            ImportError::Persistence(_) => e,
            other => ImportError::Persistence(format!("batch {}/{}: {}", batch_num, total_batches, other)),
        })?;
        debug!("Saved batch {}/{}", batch_num, total_batches);
    }

    info!("Saved {} cards in {} batches", records.len(), total_batches);
    Ok(total_batches)
}
