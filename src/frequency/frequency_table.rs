use std::{
    collections::HashMap,
    io::Read,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    models::CardRecord,
    ImportError,
};

/// Word -> rank, where rank is the 1-based data row the word appeared on.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable {
    pub source: String,
    pub revision: String,
    ranks: HashMap<String, u32>,
}

impl FrequencyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Header row is skipped. The rank comes from the line number, so blank
    /// lines and rows with an empty first cell still consume a rank. A
    /// repeated word keeps its last rank.
    pub fn from_reader<R: Read>(
        reader: R,
        delimiter: u8,
        source: String,
        revision: String,
    ) -> Result<Self, ImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut ranks = HashMap::new();
        let header_line = csv_reader.headers()?.position().map_or(1, |p| p.line());
        for (i, record) in csv_reader.records().enumerate() {
            let record = record?;
            let Some(word) = record.get(0).map(str::trim).filter(|w| !w.is_empty()) else {
                continue;
            };
            let rank = record.position().map_or(i as u64 + 1, |p| p.line().saturating_sub(header_line));
            ranks.insert(word.to_string(), rank as u32);
        }

        Ok(Self { source, revision, ranks })
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Exact match on an already cleaned word.
    pub fn rank(&self, word: &str) -> Option<u32> {
        self.ranks.get(word).copied()
    }

    /// Sets `rank` on every record, returns how many were found.
    pub fn annotate(&self, records: &mut [CardRecord]) -> usize {
        let mut ranked = 0;
        for record in records.iter_mut() {
            record.rank = self.rank(&record.word);
            if record.rank.is_some() {
                ranked += 1;
            }
        }
        ranked
    }
}
