use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("unknown gadget category: {0}")]
    UnknownGadgetCategory(String),

    #[error("cache entry corrupt: {0}")]
    CacheCorrupt(String),

    #[error("decode failure: {0}")]
    Decode(String),

    #[error("binary error: {0}")]
    Binary(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
