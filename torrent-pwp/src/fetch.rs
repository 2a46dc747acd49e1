use std::fmt;

use sha1::{Digest, Sha1};
use torrent_parser::model::{Peer, Sha1Hash, TorrentMetadata};
use tracing::{debug, info, warn};

use crate::{
    client::PeerClient,
    config::PeerConfig,
    error::{FetchError, PeerError},
};

/// A downloaded piece. Lives only as long as the request that fetched it.
pub struct Piece {
    pub index: usize,
    pub buf: Vec<u8>,
    /// Hash the descriptor expects for this piece.
    pub hash: Sha1Hash,
}

impl fmt::Debug for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Piece")
            .field("index", &self.index)
            .field("len", &self.buf.len())
            .finish()
    }
}

/// Downloads single pieces, trying the tracker's peers in order.
#[derive(Debug, Clone, Default)]
pub struct PieceFetcher {
    config: PeerConfig,
}

impl PieceFetcher {
    pub fn new(config: PeerConfig) -> Self {
        PieceFetcher { config }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Returns piece `index` from the first peer that has it and delivers it
    /// in full. An index outside the piece range fails before any peer is
    /// contacted.
    pub async fn fetch(&self, metadata: &TorrentMetadata, index: usize) -> Result<Piece, FetchError> {
        let descriptor = &metadata.descriptor;
        let count = descriptor.piece_count();
        let size = descriptor
            .piece_size(index)
            .ok_or(FetchError::IndexOutOfRange { index, count })?;
        let wire_index =
            u32::try_from(index).map_err(|_| FetchError::IndexOutOfRange { index, count })?;
        let wire_size =
            u32::try_from(size).map_err(|_| FetchError::PieceTooLarge { index, size })?;
        let hash = descriptor.pieces[index];

        for peer in &metadata.peers {
            match self
                .fetch_from(peer, metadata, wire_index, wire_size, &hash)
                .await
            {
                Ok(buf) => {
                    info!(%peer, index, "downloaded piece");
                    return Ok(Piece { index, buf, hash });
                }
                Err(e) => warn!(%peer, index, "skipping peer: {e}"),
            }
        }

        Err(FetchError::NoPeerHasPiece(index))
    }

    async fn fetch_from(
        &self,
        peer: &Peer,
        metadata: &TorrentMetadata,
        index: u32,
        size: u32,
        hash: &Sha1Hash,
    ) -> Result<Vec<u8>, PeerError> {
        let mut client = PeerClient::connect(
            peer.socket_addr(),
            metadata.descriptor.info_hash,
            metadata.peer_id,
            self.config,
        )
        .await?;
        if !client.has_piece(index) {
            return Err(PeerError::MissingPiece(index));
        }

        client.send_interested().await?;
        let buf = client.download_piece(index, size).await?;

        if self.config.verify_piece_hashes && Sha1::digest(&buf).as_slice() != hash.as_slice() {
            return Err(PeerError::HashMismatch(index));
        }

        if let Err(e) = client.send_have(index).await {
            debug!(%peer, "failed to announce have: {e}");
        }

        Ok(buf)
    }
}
