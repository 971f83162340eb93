use std::io::Write;

use rusqlite::{
    Connection,
    OpenFlags,
};
use tempfile::NamedTempFile;
use tracing::{
    info,
    warn,
};

use crate::core::{
    models::{
        Note,
        PhysicalCard,
    },
    ImportError,
};

const FIELD_SEPARATOR: char = '\x1f';

/// One `revlog` row before it is attached to a card.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLogRow {
    pub id: i64,
    pub card_id: i64,
    pub ease: i64,
    pub interval: i64,
    pub last_interval: i64,
    pub factor: i64,
    pub time_ms: i64,
    pub kind: i64,
}

/// The three tables the merge stage needs, in table row order.
#[derive(Debug, Clone, Default)]
pub struct CollectionData {
    pub notes: Vec<Note>,
    pub cards: Vec<PhysicalCard>,
    pub revlog: Vec<ReviewLogRow>,
}

pub struct Collection {
    conn: Connection,
    // Keeps the backing file alive for as long as the connection is open
    _file: NamedTempFile,
}

impl Collection {
    /// Opens decompressed collection bytes as a read-only SQLite database.
    pub fn open(bytes: &[u8]) -> Result<Self, ImportError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;

        let conn = Connection::open_with_flags(
            file.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // Newer schemas declare columns with Anki's case-insensitive collation
        conn.create_collation("unicase", |a: &str, b: &str| {
            a.to_lowercase().cmp(&b.to_lowercase())
        })?;

        Ok(Self { conn, _file: file })
    }

    pub fn notes(&self) -> Result<Vec<Note>, ImportError> {
        let mut stmt = self.conn.prepare("SELECT id, flds FROM notes ORDER BY rowid")?;
        let notes = stmt
            .query_map([], |row| {
                let fields: String = row.get(1)?;
                Ok(Note {
                    note_id: row.get(0)?,
                    fields: fields.split(FIELD_SEPARATOR).map(str::to_string).collect(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    pub fn cards(&self) -> Result<Vec<PhysicalCard>, ImportError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, nid, ord, due, ivl, factor, reps, lapses FROM cards ORDER BY rowid",
        )?;
        let cards = stmt
            .query_map([], |row| {
                Ok(PhysicalCard {
                    card_id: row.get(0)?,
                    note_id: row.get(1)?,
                    ordinal: row.get(2)?,
                    due: row.get(3)?,
                    interval: row.get(4)?,
                    ease_factor: row.get(5)?,
                    repetitions: row.get(6)?,
                    lapses: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    pub fn revlog(&self) -> Result<Vec<ReviewLogRow>, ImportError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, cid, ease, ivl, lastIvl, factor, time, type FROM revlog ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ReviewLogRow {
                    id: row.get(0)?,
                    card_id: row.get(1)?,
                    ease: row.get(2)?,
                    interval: row.get(3)?,
                    last_interval: row.get(4)?,
                    factor: row.get(5)?,
                    time_ms: row.get(6)?,
                    kind: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Runs all three projections. Every table must have rows unless
    /// `allow_empty_review_log` lets a never-studied deck through.
    pub fn extract(&self, allow_empty_review_log: bool) -> Result<CollectionData, ImportError> {
        let notes = self.notes()?;
        if notes.is_empty() {
            return Err(ImportError::MissingTable("notes"));
        }

        let cards = self.cards()?;
        if cards.is_empty() {
            return Err(ImportError::MissingTable("cards"));
        }

        let revlog = self.revlog()?;
        if revlog.is_empty() {
            if allow_empty_review_log {
                warn!("revlog is empty, importing cards without review history");
            } else {
                return Err(ImportError::MissingTable("revlog"));
            }
        }

        info!(
            "Extracted {} notes, {} cards, {} review log entries",
            notes.len(),
            cards.len(),
            revlog.len()
        );
        Ok(CollectionData { notes, cards, revlog })
    }
}
