use std::time::Instant;

use tracing::{
    info,
    info_span,
    Instrument,
};
use uuid::Uuid;

use crate::{
    anki::{
        decompress::decompress,
        merge_cards,
        AnkiPackage,
        ArchiveSource,
        Collection,
        CollectionData,
        FieldResolver,
    },
    core::{
        models::{
            ImportKind,
            ImportMetadata,
            ImportSummary,
            StatsUpdate,
            SyncSummary,
        },
        settings::ImportSettings,
        utils::now_millis,
        ImportError,
        Progress,
    },
    frequency::FrequencyService,
    persistence::{
        write_batches,
        CardStore,
    },
};

fn read_collection(package: &mut AnkiPackage, allow_empty_review_log: bool) -> Result<CollectionData, ImportError> {
    let raw = package.collection()?;
    let collection = Collection::open(&decompress(&raw))?;
    collection.extract(allow_empty_review_log)
}

/// Full import: archive to store, media and frequency ranks included.
pub async fn import_deck(
    source: ArchiveSource,
    settings: &ImportSettings,
    frequency: &mut FrequencyService,
    store: &mut dyn CardStore,
    progress: &Progress,
) -> Result<ImportSummary, ImportError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("import", %run_id, source = %source);

    async move {
        let start = Instant::now();
        progress.report(0, "Starting import...");

        progress.report(10, "Reading archive...");
        let bytes = source.read().await?;
        let mut package = AnkiPackage::open(bytes)?;

        progress.report(20, "Loading media...");
        let manifest = package.media_manifest()?;
        let media = package.load_media(&manifest, progress)?;

        progress.report(40, "Extracting collection...");
        progress.report(45, "Reading notes, cards and review log...");
        let data = read_collection(&mut package, settings.allow_empty_review_log)?;

        progress.report(50, &format!("Merging {} cards...", data.cards.len()));
        let cards = merge_cards(&data);

        progress.report(60, "Resolving fields and media...");
        let mut records = FieldResolver::new(&settings.field_layout, &media).resolve_all(&cards);

        progress.report(70, "Loading frequency list...");
        let table = frequency.load_or_unranked(settings.frequency_source.as_ref()).await;

        progress.report(80, "Ranking words...");
        let ranked = table.annotate(&mut records);
        info!("Ranked {}/{} words", ranked, records.len());

        write_batches(store, &records, settings.batch_size, progress).await?;
        store
            .record_import(&ImportMetadata {
                run_id,
                kind: ImportKind::FullImport,
                completed_at: now_millis(),
                total_cards: records.len(),
            })
            .await?;

        progress.report(100, "Import complete");
        info!("Imported {} cards in {:?}", records.len(), start.elapsed());

        Ok(ImportSummary { run_id, cards: records.len(), media_files: media.len(), ranked })
    }
    .instrument(span)
    .await
}

/// Refreshes scheduling data of cards already in the store. Media is never
/// read and cards the store does not know are skipped.
pub async fn sync_stats(
    source: ArchiveSource,
    settings: &ImportSettings,
    store: &mut dyn CardStore,
    progress: &Progress,
) -> Result<SyncSummary, ImportError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("sync", %run_id, source = %source);

    async move {
        progress.report(0, "Starting stats sync...");

        progress.report(10, "Reading archive...");
        let bytes = source.read().await?;
        let mut package = AnkiPackage::open(bytes)?;

        progress.report(40, "Extracting collection...");
        let data = read_collection(&mut package, settings.allow_empty_review_log)?;

        progress.report(50, &format!("Merging {} cards...", data.cards.len()));
        let updates: Vec<StatsUpdate> = merge_cards(&data).iter().map(StatsUpdate::from).collect();

        progress.report(80, &format!("Updating {} cards...", updates.len()));
        let summary = store.apply_stats(&updates).await?;
        store
            .record_import(&ImportMetadata {
                run_id,
                kind: ImportKind::StatsSync,
                completed_at: now_millis(),
                total_cards: summary.updated,
            })
            .await?;

        progress.report(100, "Sync complete");
        info!("Synced {} cards, {} not in store", summary.updated, summary.missing);
        Ok(summary)
    }
    .instrument(span)
    .await
}
