use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::core::{
    models::{
        CardRecord,
        LogicalCard,
        MediaBlob,
        ReviewRecord,
    },
    utils::{
        collapse_doubled_reading,
        extract_image_filename,
        extract_sound_filename,
        StripHtml,
    },
};

/// Positional offsets of each role within a note's field list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLayout {
    pub word: usize,
    pub meaning: usize,
    pub reading: usize,
    pub word_audio: usize,
    pub sentence: usize,
    pub sentence_reading: usize,
    pub sentence_meaning: usize,
    pub sentence_audio: usize,
    pub image: usize,
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self {
            word: 0,
            meaning: 1,
            reading: 2,
            word_audio: 3,
            sentence: 4,
            sentence_reading: 5,
            sentence_meaning: 6,
            sentence_audio: 7,
            image: 8,
        }
    }
}

pub struct FieldResolver<'a> {
    layout: &'a FieldLayout,
    media: &'a HashMap<String, Vec<u8>>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(layout: &'a FieldLayout, media: &'a HashMap<String, Vec<u8>>) -> Self {
        Self { layout, media }
    }

    fn blob(&self, filename: Option<&String>) -> Option<MediaBlob> {
        let filename = filename?;
        match self.media.get(filename) {
            Some(bytes) => Some(MediaBlob(bytes.clone())),
            None => {
                debug!("Media file {} not in package", filename);
                None
            }
        }
    }

    /// Cleans text fields, pulls media filenames out of their markup and
    /// attaches the blobs that exist. The rank is filled in later.
    pub fn resolve(&self, card: &LogicalCard) -> CardRecord {
        let layout = self.layout;

        let reading = card.field(layout.reading).strip_html();
        let audio_filename = extract_sound_filename(card.field(layout.word_audio));
        let sentence_audio_filename = extract_sound_filename(card.field(layout.sentence_audio));
        let image_filename = extract_image_filename(card.field(layout.image));

        CardRecord {
            nid: card.note_id,
            word: card.field(layout.word).strip_html(),
            reading: collapse_doubled_reading(&reading).to_string(),
            meaning: card.field(layout.meaning).strip_html(),
            sentence: card.field(layout.sentence).strip_html(),
            sentence_reading: card.field(layout.sentence_reading).strip_html(),
            sentence_meaning: card.field(layout.sentence_meaning).strip_html(),
            word_audio: self.blob(audio_filename.as_ref()),
            sentence_audio: self.blob(sentence_audio_filename.as_ref()),
            image: self.blob(image_filename.as_ref()),
            audio_filename,
            sentence_audio_filename,
            image_filename,
            original_index: card.original_index,
            rank: None,
            due: card.due,
            interval: card.interval,
            ease_factor: card.ease_factor as f64 / 1000.0,
            reps: card.repetitions,
            lapses: card.lapses,
            tags: String::new(),
            reviews: card.reviews.iter().map(ReviewRecord::from).collect(),
        }
    }

    pub fn resolve_all(&self, cards: &[LogicalCard]) -> Vec<CardRecord> {
        cards.iter().map(|card| self.resolve(card)).collect()
    }
}
