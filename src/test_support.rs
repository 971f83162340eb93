//! Fixture builders for tests: real SQLite collections packed into real zip archives.

use std::io::{
    Cursor,
    Write,
};

use rusqlite::{
    params,
    Connection,
};
use zip::{
    write::SimpleFileOptions,
    ZipWriter,
};

use crate::core::models::CardRecord;

pub fn zip_entries<S: AsRef<str>>(entries: &[(S, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(name.as_ref(), SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[derive(Debug, Clone)]
pub struct TestCard {
    pub id: i64,
    pub nid: i64,
    pub ord: i64,
    pub due: i64,
    pub ivl: i64,
    pub factor: i64,
    pub reps: i64,
    pub lapses: i64,
}

impl TestCard {
    pub fn new(id: i64, nid: i64, ord: i64) -> Self {
        Self { id, nid, ord, due: 0, ivl: 0, factor: 2500, reps: 0, lapses: 0 }
    }

    pub fn due(mut self, due: i64) -> Self {
        self.due = due;
        self
    }

    pub fn ivl(mut self, ivl: i64) -> Self {
        self.ivl = ivl;
        self
    }

    pub fn factor(mut self, factor: i64) -> Self {
        self.factor = factor;
        self
    }

    pub fn reps(mut self, reps: i64) -> Self {
        self.reps = reps;
        self
    }

    pub fn lapses(mut self, lapses: i64) -> Self {
        self.lapses = lapses;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestReview {
    pub id: i64,
    pub cid: i64,
    pub ease: i64,
    pub ivl: i64,
    pub last_ivl: i64,
    pub factor: i64,
    pub time: i64,
    pub kind: i64,
}

impl TestReview {
    pub fn new(id: i64, cid: i64) -> Self {
        Self { id, cid, ease: 3, ivl: 1, last_ivl: 0, factor: 2500, time: 4200, kind: 1 }
    }

    pub fn ease(mut self, ease: i64) -> Self {
        self.ease = ease;
        self
    }

    pub fn kind(mut self, kind: i64) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Debug, Default)]
pub struct CollectionBuilder {
    notes: Vec<(i64, String)>,
    cards: Vec<TestCard>,
    reviews: Vec<TestReview>,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(mut self, id: i64, fields: &[&str]) -> Self {
        self.notes.push((id, fields.join("\x1f")));
        self
    }

    pub fn card(self, id: i64, nid: i64, ord: i64) -> Self {
        self.card_with(TestCard::new(id, nid, ord))
    }

    pub fn card_with(mut self, card: TestCard) -> Self {
        self.cards.push(card);
        self
    }

    pub fn review(mut self, review: TestReview) -> Self {
        self.reviews.push(review);
        self
    }

    /// `count` reviews for `cid`, ids starting at `first_id`.
    pub fn reviews(mut self, cid: i64, first_id: i64, count: usize) -> Self {
        for i in 0..count {
            self.reviews.push(TestReview::new(first_id + i as i64 * 60_000, cid));
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.anki2");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE notes (id integer primary key, guid text not null default '', mid integer not null default 0, flds text not null);
                 CREATE TABLE cards (id integer primary key, nid integer not null, did integer not null default 1, ord integer not null, due integer not null, ivl integer not null, factor integer not null, reps integer not null, lapses integer not null);
                 CREATE TABLE revlog (id integer primary key, cid integer not null, usn integer not null default 0, ease integer not null, ivl integer not null, lastIvl integer not null, factor integer not null, time integer not null, type integer not null);",
            )
            .unwrap();

            for (id, flds) in &self.notes {
                conn.execute("INSERT INTO notes (id, flds) VALUES (?1, ?2)", params![id, flds])
                    .unwrap();
            }
            for c in &self.cards {
                conn.execute(
                    "INSERT INTO cards (id, nid, ord, due, ivl, factor, reps, lapses) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![c.id, c.nid, c.ord, c.due, c.ivl, c.factor, c.reps, c.lapses],
                )
                .unwrap();
            }
            for r in &self.reviews {
                conn.execute(
                    "INSERT INTO revlog (id, cid, ease, ivl, lastIvl, factor, time, type) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![r.id, r.cid, r.ease, r.ivl, r.last_ivl, r.factor, r.time, r.kind],
                )
                .unwrap();
            }
        }
        std::fs::read(&path).unwrap()
    }
}

/// The two collections used across pipeline tests: note 500 has a reading
/// card with three reviews and a listening card with two.
pub fn dog_and_cat_collection() -> Vec<u8> {
    CollectionBuilder::new()
        .note(
            500,
            &[
                "<b>犬</b>",
                "dog",
                "いぬいぬ",
                "[sound:word123.mp3]",
                "犬が好き",
                "いぬがすき",
                "I like dogs",
                "[sound:missing.mp3]",
                r#"<img src="dog.jpg">"#,
            ],
        )
        .note(501, &["猫", "cat", "ねこ", "", "", "", "", "", ""])
        .card_with(TestCard::new(1, 500, 0).due(120).ivl(10).factor(2300).reps(3).lapses(1))
        .card_with(TestCard::new(2, 500, 1).due(150).ivl(4).factor(2600).reps(2).lapses(0))
        .card_with(TestCard::new(3, 501, 0).due(90).ivl(1).reps(1))
        .reviews(1, 1_700_000_000_000, 3)
        .reviews(2, 1_700_100_000_000, 2)
        .reviews(3, 1_700_200_000_000, 1)
        .build()
}

enum PackageFormat {
    Legacy,
    Zstd,
}

pub struct PackageBuilder {
    collection: Vec<u8>,
    manifest: Option<Vec<(String, String)>>,
    media: Vec<(String, Vec<u8>)>,
    format: PackageFormat,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self {
            collection: dog_and_cat_collection(),
            manifest: Some(Vec::new()),
            media: Vec::new(),
            format: PackageFormat::Legacy,
        }
    }

    pub fn collection(mut self, collection: Vec<u8>) -> Self {
        self.collection = collection;
        self
    }

    /// Adds a manifest entry and its blob.
    pub fn media(mut self, entry: &str, filename: &str, data: &[u8]) -> Self {
        self.manifest_entry(entry, filename);
        self.media.push((entry.to_string(), data.to_vec()));
        self
    }

    /// Adds a manifest entry without storing the blob in the zip.
    pub fn dangling_media(mut self, entry: &str, filename: &str) -> Self {
        self.manifest_entry(entry, filename);
        self
    }

    fn manifest_entry(&mut self, entry: &str, filename: &str) {
        self.manifest
            .get_or_insert_with(Vec::new)
            .push((entry.to_string(), filename.to_string()));
    }

    pub fn without_manifest(mut self) -> Self {
        self.manifest = None;
        self
    }

    pub fn zstd(mut self) -> Self {
        self.format = PackageFormat::Zstd;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

        if let Some(manifest) = &self.manifest {
            let map: serde_json::Map<String, serde_json::Value> = manifest
                .iter()
                .map(|(entry, name)| (entry.clone(), serde_json::Value::String(name.clone())))
                .collect();
            let json = serde_json::to_vec(&map).unwrap();
            let raw = match self.format {
                PackageFormat::Legacy => json,
                PackageFormat::Zstd => zstd::stream::encode_all(json.as_slice(), 0).unwrap(),
            };
            entries.push(("media".to_string(), raw));
        }

        match self.format {
            PackageFormat::Legacy => {
                entries.push(("collection.anki2".to_string(), self.collection));
            }
            PackageFormat::Zstd => {
                entries.push(("collection.anki2".to_string(), b"stub".to_vec()));
                entries.push((
                    "collection.anki21b".to_string(),
                    zstd::stream::encode_all(self.collection.as_slice(), 0).unwrap(),
                ));
            }
        }

        for (entry, data) in self.media {
            let data = match self.format {
                PackageFormat::Legacy => data,
                PackageFormat::Zstd => zstd::stream::encode_all(data.as_slice(), 0).unwrap(),
            };
            entries.push((entry, data));
        }

        zip_entries(&entries)
    }
}

/// Header plus one word per row, rank implied by row order.
pub fn frequency_csv(words: &[&str]) -> String {
    let mut csv = String::from("word\n");
    for word in words {
        csv.push_str(word);
        csv.push('\n');
    }
    csv
}

/// A resolved card with no media and no history.
pub fn card_record(nid: i64, word: &str) -> CardRecord {
    CardRecord {
        nid,
        word: word.to_string(),
        reading: String::new(),
        meaning: String::new(),
        sentence: String::new(),
        sentence_reading: String::new(),
        sentence_meaning: String::new(),
        audio_filename: None,
        sentence_audio_filename: None,
        image_filename: None,
        word_audio: None,
        sentence_audio: None,
        image: None,
        original_index: 1,
        rank: None,
        due: None,
        interval: 0,
        ease_factor: 2.5,
        reps: 0,
        lapses: 0,
        tags: String::new(),
        reviews: Vec::new(),
    }
}
