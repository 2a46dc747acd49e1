use std::io;

use thiserror::Error;
use torrent_parser::error::TorrentParserError;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Torrent Parser Error: {0}")]
    TorrentParserError(#[from] TorrentParserError),

    #[error("Tracker refused the announce: {0}")]
    Failure(String),

    #[error("Tracker returned no peers")]
    NoPeers,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found")]
    NotFound,

    #[error("Storage Error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    IOError(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// What callers of the streamer get to see. Failures below this layer are
/// logged where they happen and collapsed into one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Something went wrong")]
    Internal,
}

impl From<StorageError> for StreamError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => StreamError::NotFound,
            StorageError::Internal(_) => StreamError::Internal,
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
