use std::collections::HashMap;

use tracing::{
    debug,
    warn,
};

use super::collection::{
    CollectionData,
    ReviewLogRow,
};
use crate::core::models::{
    LogicalCard,
    PhysicalCard,
    ReviewEvent,
    ReviewKind,
    StudyMode,
    DEFAULT_EASE_FACTOR,
};

fn tag_review(row: &ReviewLogRow, study_mode: StudyMode) -> ReviewEvent {
    ReviewEvent {
        event_id: row.id,
        card_id: row.card_id,
        rating: row.ease,
        interval: row.interval,
        last_interval: row.last_interval,
        ease_factor: row.factor,
        response_time_ms: row.time_ms,
        kind: ReviewKind::from(row.kind),
        study_mode,
    }
}

fn ease_or_default(ease_factor: i64) -> i64 {
    if ease_factor > 0 {
        ease_factor
    } else {
        DEFAULT_EASE_FACTOR
    }
}

fn due_or_none(due: i64) -> Option<i64> {
    (due != 0).then_some(due)
}

impl LogicalCard {
    fn from_base(
        card: &PhysicalCard,
        fields: Vec<String>,
        reviews: Vec<ReviewEvent>,
        original_index: usize,
    ) -> Self {
        LogicalCard {
            note_id: card.note_id,
            base_card_id: card.card_id,
            fields,
            due: due_or_none(card.due),
            interval: card.interval,
            ease_factor: ease_or_default(card.ease_factor),
            repetitions: card.repetitions,
            lapses: card.lapses,
            reviews,
            original_index,
        }
    }

    /// Folds a sibling card of the same note into this one: counters summed,
    /// interval and ease take the most mature value, due takes the latest.
    fn absorb(&mut self, sibling: &PhysicalCard, reviews: Vec<ReviewEvent>) {
        self.reviews.extend(reviews);
        self.repetitions += sibling.repetitions;
        self.lapses += sibling.lapses;
        self.interval = self.interval.max(sibling.interval);
        self.ease_factor = self.ease_factor.max(ease_or_default(sibling.ease_factor));

        if let Some(due) = due_or_none(sibling.due) {
            if self.due.map_or(true, |current| due > current) {
                self.due = Some(due);
            }
        }
    }
}

/// Collapses physical cards into one logical card per note, in first-seen
/// note order. `original_index` is the 1-based cards-table row of the base card.
pub fn merge_cards(data: &CollectionData) -> Vec<LogicalCard> {
    let notes: HashMap<i64, &Vec<String>> =
        data.notes.iter().map(|note| (note.note_id, &note.fields)).collect();

    let mut reviews_by_card: HashMap<i64, Vec<&ReviewLogRow>> = HashMap::new();
    for row in &data.revlog {
        reviews_by_card.entry(row.card_id).or_default().push(row);
    }

    let mut groups: Vec<LogicalCard> = Vec::new();
    let mut group_by_note: HashMap<i64, usize> = HashMap::new();

    for (row_index, card) in data.cards.iter().enumerate() {
        let study_mode = StudyMode::from_ordinal(card.ordinal);
        let reviews: Vec<ReviewEvent> = reviews_by_card
            .get(&card.card_id)
            .map(|rows| rows.iter().map(|row| tag_review(row, study_mode)).collect())
            .unwrap_or_default();

        match group_by_note.get(&card.note_id) {
            Some(&group) => {
                debug!(
                    "Merging card {} ({}) into note {}",
                    card.card_id, study_mode, card.note_id
                );
                groups[group].absorb(card, reviews);
            }
            None => {
                let fields = match notes.get(&card.note_id) {
                    Some(fields) => (*fields).clone(),
                    None => {
                        warn!("Card {} references missing note {}", card.card_id, card.note_id);
                        Vec::new()
                    }
                };
                group_by_note.insert(card.note_id, groups.len());
                groups.push(LogicalCard::from_base(card, fields, reviews, row_index + 1));
            }
        }
    }

    debug!("Merged {} physical cards into {} logical cards", data.cards.len(), groups.len());
    groups
}
