use std::fmt;

use base64::{
    engine::general_purpose::STANDARD,
    Engine,
};
use chrono::{
    DateTime,
    SecondsFormat,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

/// Ease factor Anki assigns to a card that has never been graded (2.5 in permille).
pub const DEFAULT_EASE_FACTOR: i64 = 2500;

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub note_id: i64,
    pub fields: Vec<String>, // Split on the 0x1f unit separator
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalCard {
    pub card_id: i64,
    pub note_id: i64,
    pub ordinal: i64,    // Template index, 0 = reading, anything else = listening
    pub due: i64,
    pub interval: i64,   // Days, negative values are learning steps in seconds
    pub ease_factor: i64, // Permille, 2500 = 2.5
    pub repetitions: i64,
    pub lapses: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyMode {
    Reading,
    Listening,
}

impl StudyMode {
    pub fn from_ordinal(ordinal: i64) -> Self {
        if ordinal == 0 {
            StudyMode::Reading
        } else {
            StudyMode::Listening
        }
    }
}

impl fmt::Display for StudyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudyMode::Reading => write!(f, "reading"),
            StudyMode::Listening => write!(f, "listening"),
        }
    }
}

/// Revlog `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ReviewKind {
    Learn,
    Review,
    Relearn,
    Filtered,
    Manual,
    Other(i64),
}

impl From<i64> for ReviewKind {
    fn from(value: i64) -> Self {
        match value {
            0 => ReviewKind::Learn,
            1 => ReviewKind::Review,
            2 => ReviewKind::Relearn,
            3 => ReviewKind::Filtered,
            4 => ReviewKind::Manual,
            other => ReviewKind::Other(other),
        }
    }
}

impl From<ReviewKind> for i64 {
    fn from(kind: ReviewKind) -> Self {
        match kind {
            ReviewKind::Learn => 0,
            ReviewKind::Review => 1,
            ReviewKind::Relearn => 2,
            ReviewKind::Filtered => 3,
            ReviewKind::Manual => 4,
            ReviewKind::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewEvent {
    pub event_id: i64, // Milliseconds since epoch
    pub card_id: i64,
    pub rating: i64,
    pub interval: i64,
    pub last_interval: i64,
    pub ease_factor: i64,
    pub response_time_ms: i64,
    pub kind: ReviewKind,
    pub study_mode: StudyMode,
}

/// One card per note, with every sibling's history folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalCard {
    pub note_id: i64,
    pub base_card_id: i64,
    pub fields: Vec<String>,
    pub due: Option<i64>,
    pub interval: i64,
    pub ease_factor: i64,
    pub repetitions: i64,
    pub lapses: i64,
    pub reviews: Vec<ReviewEvent>,
    pub original_index: usize,
}

impl LogicalCard {
    pub fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Raw media bytes. Serializes as a base64 string for transport.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob(pub Vec<u8>);

impl MediaBlob {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaBlob({} bytes)", self.0.len())
    }
}

impl Serialize for MediaBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for MediaBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map(MediaBlob).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub timestamp: String,
    pub timestamp_ms: i64,
    pub ease: i64,
    pub interval: i64,
    pub last_interval: i64,
    pub response_time: f64, // Seconds
    pub review_type: ReviewKind,
    pub ease_factor: i64,
    #[serde(rename = "studyMode", alias = "study_mode")]
    pub study_mode: StudyMode,
}

impl From<&ReviewEvent> for ReviewRecord {
    fn from(event: &ReviewEvent) -> Self {
        let timestamp = DateTime::from_timestamp_millis(event.event_id)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();

        ReviewRecord {
            timestamp,
            timestamp_ms: event.event_id,
            ease: event.rating,
            interval: event.interval,
            last_interval: event.last_interval,
            response_time: event.response_time_ms as f64 / 1000.0,
            review_type: event.kind,
            ease_factor: event.ease_factor,
            study_mode: event.study_mode,
        }
    }
}

/// The persisted shape of a [`LogicalCard`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub nid: i64,
    pub word: String,
    pub reading: String,
    pub meaning: String,
    pub sentence: String,
    pub sentence_reading: String,
    pub sentence_meaning: String,
    pub audio_filename: Option<String>,
    pub sentence_audio_filename: Option<String>,
    pub image_filename: Option<String>,
    pub word_audio: Option<MediaBlob>,
    pub sentence_audio: Option<MediaBlob>,
    pub image: Option<MediaBlob>,
    pub original_index: usize,
    pub rank: Option<u32>,
    pub due: Option<i64>,
    pub interval: i64,
    pub ease_factor: f64,
    pub reps: i64,
    pub lapses: i64,
    #[serde(default)]
    pub tags: String,
    pub reviews: Vec<ReviewRecord>,
}

impl CardRecord {
    pub fn apply_stats(&mut self, update: &StatsUpdate) {
        self.due = update.due;
        self.interval = update.interval;
        self.ease_factor = update.ease_factor;
        self.reps = update.reps;
        self.lapses = update.lapses;
        self.reviews = update.reviews.clone();
    }
}

/// Scheduling-only projection of a [`LogicalCard`], used by stats sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsUpdate {
    pub nid: i64,
    pub due: Option<i64>,
    pub interval: i64,
    pub ease_factor: f64,
    pub reps: i64,
    pub lapses: i64,
    pub reviews: Vec<ReviewRecord>,
}

impl From<&LogicalCard> for StatsUpdate {
    fn from(card: &LogicalCard) -> Self {
        StatsUpdate {
            nid: card.note_id,
            due: card.due,
            interval: card.interval,
            ease_factor: card.ease_factor as f64 / 1000.0,
            reps: card.repetitions,
            lapses: card.lapses,
            reviews: card.reviews.iter().map(ReviewRecord::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    FullImport,
    StatsSync,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMetadata {
    pub run_id: uuid::Uuid,
    pub kind: ImportKind,
    pub completed_at: i64, // Milliseconds since epoch
    pub total_cards: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportHistory {
    pub last_full_import: Option<i64>,
    pub last_anki_sync: Option<i64>,
    pub total_cards: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub run_id: uuid::Uuid,
    pub cards: usize,
    pub media_files: usize,
    pub ranked: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub updated: usize,
    pub missing: usize,
}
