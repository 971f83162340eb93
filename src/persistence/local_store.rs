//! SQLite-backed card store.
//!
//! Anki-derived data lives in the `record` column as JSON, minus media bytes
//! which go to the `media` table keyed by filename. App-specific columns
//! (answer counters, confused pairs) are never touched by an import.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{
    params,
    Connection,
    OptionalExtension,
    Result as SqlResult,
    Transaction,
};
use tracing::{
    debug,
    info,
};

use super::{
    get_data_file_path,
    CardStore,
};
use crate::core::{
    models::{
        CardRecord,
        ImportHistory,
        ImportKind,
        ImportMetadata,
        MediaBlob,
        StatsUpdate,
        SyncSummary,
    },
    utils::now_millis,
    ImportError,
};

const DEFAULT_DB_FILE: &str = "cards.db";

const META_LAST_FULL_IMPORT: &str = "last_full_import";
const META_LAST_ANKI_SYNC: &str = "last_anki_sync";
const META_TOTAL_CARDS: &str = "total_cards";
const META_LAST_RUN_ID: &str = "last_run_id";

/// Per-card answer counters kept by the study app.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AppStats {
    pub total_attempts: i64,
    pub correct_attempts: i64,
}

impl AppStats {
    pub fn answer_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.correct_attempts as f64 / self.total_attempts as f64
        }
    }
}

pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        info!("Opened card store at {}", path.display());
        Ok(store)
    }

    pub fn open_default() -> Result<Self, ImportError> {
        Self::open(&get_data_file_path(DEFAULT_DB_FILE))
    }

    pub fn in_memory() -> Result<Self, ImportError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), ImportError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cards (
                nid INTEGER PRIMARY KEY,
                original_index INTEGER NOT NULL,
                rank INTEGER,
                due INTEGER,
                record TEXT NOT NULL,
                app_total_attempts INTEGER NOT NULL DEFAULT 0,
                app_correct_attempts INTEGER NOT NULL DEFAULT 0,
                last_modified INTEGER NOT NULL,
                last_anki_sync INTEGER
            );

            CREATE TABLE IF NOT EXISTS confused_pairs (
                card_id_1 INTEGER NOT NULL,
                card_id_2 INTEGER NOT NULL,
                count INTEGER NOT NULL DEFAULT 1,
                last_confused INTEGER NOT NULL,
                PRIMARY KEY (card_id_1, card_id_2)
            );

            CREATE TABLE IF NOT EXISTS media (
                filename TEXT PRIMARY KEY,
                data BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cards_original_index ON cards(original_index);
            CREATE INDEX IF NOT EXISTS idx_cards_rank ON cards(rank);
            CREATE INDEX IF NOT EXISTS idx_cards_due ON cards(due);
            "#,
        )?;
        Ok(())
    }

    /// Card as last written, without media bytes. See [`LocalStore::media`].
    pub fn card(&self, nid: i64) -> Result<Option<CardRecord>, ImportError> {
        let record: Option<String> = self
            .conn
            .query_row("SELECT record FROM cards WHERE nid = ?1", params![nid], |row| row.get(0))
            .optional()?;

        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Every card in deck order.
    pub fn all_cards(&self) -> Result<Vec<CardRecord>, ImportError> {
        let mut stmt = self.conn.prepare("SELECT record FROM cards ORDER BY original_index, nid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?.collect::<SqlResult<Vec<_>>>()?;

        rows.iter().map(|json| serde_json::from_str(json).map_err(ImportError::from)).collect()
    }

    pub fn card_count(&self) -> Result<usize, ImportError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn media(&self, filename: &str) -> Result<Option<Vec<u8>>, ImportError> {
        Ok(self
            .conn
            .query_row("SELECT data FROM media WHERE filename = ?1", params![filename], |row| row.get(0))
            .optional()?)
    }

    pub fn app_stats(&self, nid: i64) -> Result<Option<AppStats>, ImportError> {
        Ok(self
            .conn
            .query_row(
                "SELECT app_total_attempts, app_correct_attempts FROM cards WHERE nid = ?1",
                params![nid],
                |row| Ok(AppStats { total_attempts: row.get(0)?, correct_attempts: row.get(1)? }),
            )
            .optional()?)
    }

    pub fn record_answer(&mut self, nid: i64, correct: bool) -> Result<(), ImportError> {
        let changed = self.conn.execute(
            "UPDATE cards SET app_total_attempts = app_total_attempts + 1,
                              app_correct_attempts = app_correct_attempts + ?2
             WHERE nid = ?1",
            params![nid, correct as i64],
        )?;
        if changed == 0 {
            return Err(ImportError::Persistence(format!("No card with note id {}", nid)));
        }
        Ok(())
    }

    /// Pairs are unordered; recording the same pair again bumps its count.
    pub fn add_confused_pair(&mut self, a: i64, b: i64) -> Result<(), ImportError> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.conn.execute(
            "INSERT INTO confused_pairs (card_id_1, card_id_2, count, last_confused)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(card_id_1, card_id_2)
             DO UPDATE SET count = count + 1, last_confused = excluded.last_confused",
            params![first, second, now_millis()],
        )?;
        Ok(())
    }

    pub fn confused_with(&self, nid: i64) -> Result<Vec<i64>, ImportError> {
        let mut stmt = self.conn.prepare(
            "SELECT card_id_2 FROM confused_pairs WHERE card_id_1 = ?1
             UNION
             SELECT card_id_1 FROM confused_pairs WHERE card_id_2 = ?1
             ORDER BY 1",
        )?;
        let ids = stmt.query_map(params![nid], |row| row.get(0))?.collect::<SqlResult<Vec<i64>>>()?;
        Ok(ids)
    }

    fn metadata(&self, key: &str) -> Result<Option<String>, ImportError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?)
    }

    fn metadata_i64(&self, key: &str) -> Result<Option<i64>, ImportError> {
        Ok(self.metadata(key)?.and_then(|v| v.parse().ok()))
    }
}

fn set_metadata(tx: &Transaction<'_>, key: &str, value: &str) -> SqlResult<()> {
    tx.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn save_media(tx: &Transaction<'_>, filename: Option<&String>, blob: Option<&MediaBlob>) -> SqlResult<()> {
    if let (Some(filename), Some(blob)) = (filename, blob) {
        tx.execute(
            "INSERT INTO media (filename, data) VALUES (?1, ?2)
             ON CONFLICT(filename) DO UPDATE SET data = excluded.data",
            params![filename, blob.as_bytes()],
        )?;
    }
    Ok(())
}

fn save_card(tx: &Transaction<'_>, card: &CardRecord, now: i64) -> Result<(), ImportError> {
    save_media(tx, card.audio_filename.as_ref(), card.word_audio.as_ref())?;
    save_media(tx, card.sentence_audio_filename.as_ref(), card.sentence_audio.as_ref())?;
    save_media(tx, card.image_filename.as_ref(), card.image.as_ref())?;

    let stripped = CardRecord { word_audio: None, sentence_audio: None, image: None, ..card.clone() };
    tx.execute(
        "INSERT INTO cards (nid, original_index, rank, due, record, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(nid) DO UPDATE SET
             original_index = excluded.original_index,
             rank = excluded.rank,
             due = excluded.due,
             record = excluded.record,
             last_modified = excluded.last_modified",
        params![
            card.nid,
            card.original_index as i64,
            card.rank,
            card.due,
            serde_json::to_string(&stripped)?,
            now,
        ],
    )?;
    Ok(())
}

impl LocalStore {
    fn save_batch(&mut self, batch: &[CardRecord]) -> Result<(), ImportError> {
        let now = now_millis();
        let tx = self.conn.transaction()?;
        for card in batch {
            save_card(&tx, card, now)?;
        }
        tx.commit()?;
        debug!("Stored {} cards", batch.len());
        Ok(())
    }

    fn write_metadata(&mut self, metadata: &ImportMetadata) -> Result<(), ImportError> {
        let tx = self.conn.transaction()?;
        match metadata.kind {
            ImportKind::FullImport => {
                set_metadata(&tx, META_LAST_FULL_IMPORT, &metadata.completed_at.to_string())?;
                set_metadata(&tx, META_TOTAL_CARDS, &metadata.total_cards.to_string())?;
            }
            ImportKind::StatsSync => {
                set_metadata(&tx, META_LAST_ANKI_SYNC, &metadata.completed_at.to_string())?;
            }
        }
        set_metadata(&tx, META_LAST_RUN_ID, &metadata.run_id.to_string())?;
        tx.commit()?;
        Ok(())
    }

    fn update_stats(&mut self, updates: &[StatsUpdate]) -> Result<SyncSummary, ImportError> {
        let now = now_millis();
        let mut summary = SyncSummary::default();
        let tx = self.conn.transaction()?;

        for update in updates {
            let record: Option<String> = tx
                .query_row("SELECT record FROM cards WHERE nid = ?1", params![update.nid], |row| row.get(0))
                .optional()?;
            let Some(json) = record else {
                debug!("Note {} not in store, skipping stats", update.nid);
                summary.missing += 1;
                continue;
            };

            let mut card: CardRecord = serde_json::from_str(&json)?;
            card.apply_stats(update);
            tx.execute(
                "UPDATE cards SET due = ?2, record = ?3, last_modified = ?4, last_anki_sync = ?4
                 WHERE nid = ?1",
                params![update.nid, card.due, serde_json::to_string(&card)?, now],
            )?;
            summary.updated += 1;
        }

        tx.commit()?;
        Ok(summary)
    }
}

// Synchronous underneath, nothing here awaits.
#[async_trait]
impl CardStore for LocalStore {
    async fn save_cards(&mut self, batch: &[CardRecord]) -> Result<(), ImportError> {
        self.save_batch(batch)
    }

    async fn record_import(&mut self, metadata: &ImportMetadata) -> Result<(), ImportError> {
        self.write_metadata(metadata)
    }

    async fn apply_stats(&mut self, updates: &[StatsUpdate]) -> Result<SyncSummary, ImportError> {
        self.update_stats(updates)
    }

    async fn import_history(&mut self) -> Result<ImportHistory, ImportError> {
        Ok(ImportHistory {
            last_full_import: self.metadata_i64(META_LAST_FULL_IMPORT)?,
            last_anki_sync: self.metadata_i64(META_LAST_ANKI_SYNC)?,
            total_cards: self.metadata_i64(META_TOTAL_CARDS)?.map(|n| n as usize),
        })
    }
}
