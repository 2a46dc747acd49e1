use std::time::Duration;

pub const DEFAULT_BLOCK_SIZE: u32 = 8192;
pub const DEFAULT_MAX_BACKLOG: usize = 5;

/// Deadlines and pipelining limits for one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerConfig {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Deadline for the bitfield that must follow the handshake.
    pub bitfield_timeout: Duration,
    /// Deadline for downloading one whole piece from one peer.
    pub piece_timeout: Duration,
    pub block_size: u32,
    /// Most block requests outstanding at once.
    pub max_backlog: usize,
    /// Check each downloaded piece against the descriptor hash.
    pub verify_piece_hashes: bool,
    /// Skip zero-length frames instead of dropping the peer.
    pub tolerate_keep_alive: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            bitfield_timeout: Duration::from_secs(5),
            piece_timeout: Duration::from_secs(15),
            block_size: DEFAULT_BLOCK_SIZE,
            max_backlog: DEFAULT_MAX_BACKLOG,
            verify_piece_hashes: false,
            tolerate_keep_alive: false,
        }
    }
}
