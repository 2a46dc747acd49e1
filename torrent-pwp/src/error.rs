use std::io;

use thiserror::Error;

/// Failure of one peer connection. Never fatal for a fetch, the next peer
/// is tried.
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Peer closed the connection")]
    ConnectionClosed,

    #[error("Handshake with an empty protocol string")]
    EmptyHandshake,

    #[error("Info hash from the peer handshake does not match ours")]
    InfoHashMismatch,

    #[error("Expected {expected} message, got {found}")]
    UnexpectedMessage {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Received a keep-alive frame")]
    KeepAlive,

    #[error("Frame of {0} bytes exceeds the maximum message size")]
    FrameTooLarge(usize),

    #[error("Malformed {0} message")]
    MalformedMessage(&'static str),

    #[error("Peer does not have piece {0}")]
    MissingPiece(u32),

    #[error("Received a block of piece {found} while downloading piece {expected}")]
    PieceIndexMismatch { expected: u32, found: u32 },

    #[error("Block at {begin} with {length} bytes does not fit in a piece of {size} bytes")]
    BlockOutOfRange { begin: u32, length: usize, size: u32 },

    #[error("Piece {0} does not match its expected hash")]
    HashMismatch(u32),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Piece index {index} must be in range [0..{count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Piece {index} of {size} bytes cannot be requested over the wire")]
    PieceTooLarge { index: usize, size: u64 },

    #[error("Cannot download piece {0} because no peer has it")]
    NoPeerHasPiece(usize),
}
