pub mod errors;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod settings;
pub mod utils;

pub use errors::ImportError;
pub use progress::{
    Progress,
    ProgressCallback,
};
