use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid Anki package: {0}")]
    ArchiveFormat(String),

    #[error("No data found in the {0} table")]
    MissingTable(&'static str),

    #[error("Failed to persist cards: {0}")]
    Persistence(String),

    #[error("Failed to load frequency list: {0}")]
    FrequencyLoad(String),

    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(Box<zip::result::ZipError>),

    #[error("SQLite error: {0}")]
    Sqlite(Box<rusqlite::Error>),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("CSV error: {0}")]
    Csv(Box<csv::Error>),

    #[error("Cache encoding error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Cache decoding error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("ImportError: {0}")]
    Custom(String),
}

impl From<std::io::Error> for ImportError {
    fn from(error: std::io::Error) -> Self {
        ImportError::Io(Box::new(error))
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(error: zip::result::ZipError) -> Self {
        ImportError::Zip(Box::new(error))
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(error: rusqlite::Error) -> Self {
        ImportError::Sqlite(Box::new(error))
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(error: reqwest::Error) -> Self {
        ImportError::Reqwest(Box::new(error))
    }
}

impl From<csv::Error> for ImportError {
    fn from(error: csv::Error) -> Self {
        ImportError::Csv(Box::new(error))
    }
}
