use std::{num::ParseIntError, string::FromUtf8Error};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TorrentParserError {
    #[error("Invalid Structure: {0}")]
    InvalidStructure(String),

    #[error("Parse Int Error: {0}")]
    ParseIntError(#[from] ParseIntError),

    #[error("Missing Required Field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid Field Type for {field}: expected {expected}, found {found}")]
    FieldTypeError {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unknown Specifier: {0:#04x}")]
    UnknownSpecifier(u8),

    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("Malformed Pieces: {0} bytes is not a multiple of 20")]
    MalformedPieces(usize),

    #[error("Malformed Peers: {0} bytes is not a multiple of 6")]
    MalformedPeers(usize),

    #[error("Piece Count Mismatch: {length} bytes in pieces of {piece_length} need {expected} hashes, found {found}")]
    PieceCountMismatch {
        length: u64,
        piece_length: u64,
        expected: u64,
        found: usize,
    },

    #[error("Invalid Value for {field}: {value}")]
    InvalidValue { field: String, value: i64 },

    #[error("Cannot Read File: {0}")]
    CannotReadFile(#[from] std::io::Error),
}
