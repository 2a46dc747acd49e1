pub mod bitfield;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod handshake;
pub mod message;

pub use client::PeerClient;
pub use config::PeerConfig;
pub use fetch::{Piece, PieceFetcher};

/// Protocol string sent in every handshake.
pub const PSTR: &[u8; 19] = b"BitTorrent protocol";
