use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeightError>;

#[derive(Error, Debug)]
pub enum WeightError {
    #[error("db error: {0}")]
    Db(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("signal source unavailable: {0}")]
    SignalUnavailable(&'static str),

    #[error("arithmetic overflow while scaling weight for {0}")]
    Overflow(String),

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid vote extensions: {0}")]
    InvalidExtensions(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for WeightError {
    fn from(e: rocksdb::Error) -> Self {
        WeightError::Db(e.to_string())
    }
}
