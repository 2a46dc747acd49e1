use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

pub type Sha1Hash = [u8; 20];

pub struct InfoFile {
    pub length: u64,
    pub path: Vec<String>,
}

/// Everything a descriptor file says about one torrent. Never mutated once
/// decoded.
pub struct TorrentDescriptor {
    pub announce: String,
    pub announce_list: Option<Vec<Vec<String>>>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub creation_date: Option<i64>,
    pub name: String,
    pub piece_length: u64,
    pub pieces: Vec<Sha1Hash>,
    pub private: Option<bool>,
    pub files: Option<Vec<InfoFile>>,
    /// Total content length; for multi-file descriptors the files are laid
    /// out back to back.
    pub length: u64,
    pub info_hash: Sha1Hash,
}

impl TorrentDescriptor {
    pub fn is_single_file(&self) -> bool {
        self.files.is_none()
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Byte offset of piece `index` in the content.
    pub fn piece_offset(&self, index: usize) -> u64 {
        index as u64 * self.piece_length
    }

    /// Byte length of piece `index`, the last piece may be short. `None` when
    /// the index is out of range.
    pub fn piece_size(&self, index: usize) -> Option<u64> {
        if index >= self.piece_count() {
            return None;
        }
        let begin = self.piece_offset(index);
        let end = begin.saturating_add(self.piece_length).min(self.length);
        Some(end.saturating_sub(begin))
    }
}

impl fmt::Debug for TorrentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TorrentDescriptor")
            .field("name", &self.name)
            .field("announce", &self.announce)
            .field("info_hash", &hex::encode(self.info_hash))
            .field("piece_length", &self.piece_length)
            .field("pieces", &self.pieces.len())
            .field("length", &self.length)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,
}

impl Peer {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Peer {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

/// An open torrent: the descriptor plus the peers the tracker handed out
/// and the identity we announced with.
#[derive(Debug)]
pub struct TorrentMetadata {
    pub descriptor: TorrentDescriptor,
    pub peers: Vec<Peer>,
    pub peer_id: Sha1Hash,
}

pub struct TrackerSuccessResponse {
    pub interval: Option<i64>,
    pub min_interval: Option<i64>,
    pub tracker_id: Option<String>,
    pub complete: Option<i64>,
    pub incomplete: Option<i64>,
    pub warning: Option<String>,
    pub peers: Vec<Peer>,
}

pub enum TrackerResponse {
    Failure(String),
    Success(TrackerSuccessResponse),
}
