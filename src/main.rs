use std::process::ExitCode;

use ankiport::{
    anki::ArchiveSource,
    frequency::FrequencyService,
    import_deck,
    persistence::open_store,
    sync_stats,
    CliOverrides,
    ImportError,
    ImportSettings,
    Progress,
};
use clap::Parser;
use tracing::{
    error,
    info,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
enum Args {
    /// Import an .apkg/.colpkg into the card store
    Import {
        /// Archive path or URL
        archive: String,
        #[command(flatten)]
        options: CliOverrides,
    },
    /// Refresh scheduling stats of imported cards
    Sync {
        /// Archive path or URL
        archive: String,
        #[command(flatten)]
        options: CliOverrides,
    },
    /// Show when the last import and sync ran
    History {
        #[command(flatten)]
        options: CliOverrides,
    },
    /// Save the given options as defaults
    Config {
        #[command(flatten)]
        options: CliOverrides,
    },
}

impl Args {
    fn options(&self) -> &CliOverrides {
        match self {
            Args::Import { options, .. }
            | Args::Sync { options, .. }
            | Args::History { options }
            | Args::Config { options } => options,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ImportError> {
    let mut settings = ImportSettings::load();
    settings.apply(args.options())?;
    let progress = Progress::new(Box::new(|pct, msg| info!("[{:>3}%] {}", pct, msg)));

    match args {
        Args::Import { archive, .. } => {
            let source = ArchiveSource::parse(&archive);
            let filename = settings.upload_filename.clone().unwrap_or_else(|| source.file_name());
            let mut store = open_store(&settings.backend, &filename)?;
            let mut frequency = FrequencyService::with_default_cache();

            let summary = import_deck(source, &settings, &mut frequency, store.as_mut(), &progress).await?;
            println!(
                "Imported {} cards ({} media files, {} ranked), run {}",
                summary.cards, summary.media_files, summary.ranked, summary.run_id
            );
        }
        Args::Sync { archive, .. } => {
            let source = ArchiveSource::parse(&archive);
            let filename = settings.upload_filename.clone().unwrap_or_else(|| source.file_name());
            let mut store = open_store(&settings.backend, &filename)?;

            let summary = sync_stats(source, &settings, store.as_mut(), &progress).await?;
            println!("Updated {} cards, {} not imported yet", summary.updated, summary.missing);
        }
        Args::History { .. } => {
            let mut store = open_store(&settings.backend, "")?;
            let history = store.import_history().await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Args::Config { .. } => {
            settings.save()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_flags() {
        let args = Args::try_parse_from([
            "ankiport",
            "import",
            "deck.apkg",
            "--freq",
            "lists/freq.tsv",
            "--batch-size",
            "50",
            "--allow-empty-revlog",
        ])
        .unwrap();

        let (archive, options) = match args {
            Args::Import { archive, options } => (archive, options),
            other => panic!("Expected import, got {:?}", other),
        };
        assert_eq!(archive, "deck.apkg");
        assert_eq!(options.freq.as_deref(), Some("lists/freq.tsv"));
        assert_eq!(options.batch_size, Some(50));
        assert!(options.allow_empty_revlog);
    }

    #[test]
    fn test_history_without_archive() {
        let args = Args::try_parse_from(["ankiport", "history", "--db", "cards.db"]).unwrap();
        assert_eq!(args.options().db, Some("cards.db".into()));
    }

    #[test]
    fn test_rejected_args() {
        assert!(Args::try_parse_from(["ankiport", "import"]).is_err());
        assert!(Args::try_parse_from(["ankiport", "sync", "deck.apkg", "--verbose"]).is_err());
        assert!(Args::try_parse_from(["ankiport", "import", "deck.apkg", "--freq"]).is_err());
        assert!(
            Args::try_parse_from(["ankiport", "config", "--rest", "http://x", "--db", "cards.db"]).is_err()
        );
    }
}
