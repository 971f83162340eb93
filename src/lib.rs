pub mod anki;
pub mod core;
pub mod frequency;
pub mod persistence;

#[cfg(test)]
mod test_support;

pub use crate::core::{
    pipeline::{
        import_deck,
        sync_stats,
    },
    settings::{
        Backend,
        CliOverrides,
        ImportSettings,
    },
    ImportError,
    Progress,
};
