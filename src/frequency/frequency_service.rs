use std::{
    collections::{
        hash_map::DefaultHasher,
        HashMap,
    },
    fmt,
    fs::{
        self,
        File,
    },
    hash::{
        Hash,
        Hasher,
    },
    io::{
        BufReader,
        Read,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::{
        Instant,
        UNIX_EPOCH,
    },
};

use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    info,
    warn,
};

use super::frequency_table::FrequencyTable;
use crate::{
    core::{
        http,
        ImportError,
    },
    persistence::get_app_data_dir,
};

pub fn get_frequency_cache_dir() -> PathBuf {
    get_app_data_dir().join("frequency")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "location", rename_all = "snake_case")]
pub enum FrequencySource {
    Path(PathBuf),
    Url(String),
}

impl FrequencySource {
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            FrequencySource::Url(input.to_string())
        } else {
            FrequencySource::Path(PathBuf::from(input))
        }
    }

    fn key(&self) -> String {
        self.to_string()
    }

    fn delimiter(&self) -> u8 {
        let name = match self {
            FrequencySource::Path(path) => path.to_string_lossy().to_lowercase(),
            FrequencySource::Url(url) => url.to_lowercase(),
        };
        if name.ends_with(".tsv") || name.ends_with(".txt") {
            b'\t'
        } else {
            b','
        }
    }
}

impl fmt::Display for FrequencySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencySource::Path(path) => write!(f, "{}", path.display()),
            FrequencySource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Loads frequency tables once per source and hands out shared copies.
/// Local files are also cached on disk, keyed by size and modification time.
#[derive(Debug, Default)]
pub struct FrequencyService {
    cache_dir: Option<PathBuf>,
    tables: HashMap<String, Arc<FrequencyTable>>,
}

impl FrequencyService {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir, tables: HashMap::new() }
    }

    pub fn with_default_cache() -> Self {
        Self::new(Some(get_frequency_cache_dir()))
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub async fn load(&mut self, source: &FrequencySource) -> Result<Arc<FrequencyTable>, ImportError> {
        let key = source.key();
        if let Some(table) = self.tables.get(&key) {
            debug!("Frequency table for {} already loaded", key);
            return Ok(table.clone());
        }

        let start = Instant::now();
        let table = match source {
            FrequencySource::Path(path) => self.load_path(path, source)?,
            FrequencySource::Url(url) => {
                let bytes = http::fetch_bytes(&http::http_client()?, url)
                    .await
                    .map_err(|e| ImportError::FrequencyLoad(e.to_string()))?;
                FrequencyTable::from_reader(bytes.as_slice(), source.delimiter(), key.clone(), String::new())?
            }
        };
        info!("Loaded {} frequency ranks from {} in {:?}", table.len(), key, start.elapsed());

        let table = Arc::new(table);
        self.tables.insert(key, table.clone());
        Ok(table)
    }

    /// Failure to load is never fatal to an import: every card just stays unranked.
    pub async fn load_or_unranked(&mut self, source: Option<&FrequencySource>) -> Arc<FrequencyTable> {
        let Some(source) = source else {
            debug!("No frequency source configured");
            return Arc::new(FrequencyTable::empty());
        };

        match self.load(source).await {
            Ok(table) => table,
            Err(e) => {
                warn!("Could not load frequency map, skipping frequency ranks: {}", e);
                Arc::new(FrequencyTable::empty())
            }
        }
    }

    fn load_path(&self, path: &Path, source: &FrequencySource) -> Result<FrequencyTable, ImportError> {
        let metadata = fs::metadata(path).map_err(|e| {
            ImportError::FrequencyLoad(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let revision = format!("{}-{}", metadata.len(), modified);
        let key = source.key();

        let cache_path = self.cache_path(&key);
        if let Some(cache_path) = &cache_path {
            match load_cached_table(cache_path) {
                Ok(cached) if cached.source == key && cached.revision == revision => {
                    debug!("Loaded frequency table for {} from cache", key);
                    return Ok(cached);
                }
                Ok(cached) => {
                    debug!(
                        "Revision mismatch for '{}': cache={}, file={}",
                        key, cached.revision, revision
                    );
                }
                Err(e) => debug!("No usable cache for '{}': {}", key, e),
            }
        }

        let file = File::open(path).map_err(|e| {
            ImportError::FrequencyLoad(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let table =
            FrequencyTable::from_reader(BufReader::new(file), source.delimiter(), key.clone(), revision)?;

        if let Some(cache_path) = &cache_path {
            if let Err(e) = save_cached_table(&table, cache_path) {
                warn!("Failed to save frequency cache for '{}': {}", key, e);
            }
        }

        Ok(table)
    }

    fn cache_path(&self, key: &str) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Some(dir.join(format!("{:016x}.bin", hasher.finish())))
    }
}

fn load_cached_table(cache_path: &Path) -> Result<FrequencyTable, ImportError> {
    let mut buffer = Vec::new();
    BufReader::new(File::open(cache_path)?).read_to_end(&mut buffer)?;
    let (table, _): (FrequencyTable, usize) =
        bincode::serde::decode_from_slice(&buffer, bincode::config::standard())?;
    Ok(table)
}

fn save_cached_table(table: &FrequencyTable, cache_path: &Path) -> Result<(), ImportError> {
    let encoded = bincode::serde::encode_to_vec(table, bincode::config::standard())?;
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(cache_path)?.write_all(&encoded)?;
    Ok(())
}
