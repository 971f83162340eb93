pub mod frequency_service;
pub mod frequency_table;

pub use frequency_service::{
    FrequencyService,
    FrequencySource,
};
pub use frequency_table::FrequencyTable;
