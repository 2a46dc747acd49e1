//! One connection to one peer.
//!
//! A [`PeerClient`] is built by [`PeerClient::connect`], which dials,
//! exchanges handshakes and waits for the peer's bitfield. From there it can
//! download whole pieces, pipelining block requests while the peer keeps us
//! unchoked. The connection closes when the client is dropped.

use std::{collections::HashSet, net::SocketAddr};

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::{Framed, FramedParts};
use torrent_parser::model::Sha1Hash;
use tracing::{debug, instrument};

use crate::{
    bitfield::Bitfield,
    config::PeerConfig,
    error::PeerError,
    handshake::{Handshake, HandshakeCodec},
    message::{Block, BlockInfo, Message, MessageCodec},
};

pub struct PeerClient {
    socket: Framed<TcpStream, MessageCodec>,
    addr: SocketAddr,
    bitfield: Bitfield,
    choked: bool,
    config: PeerConfig,
}

impl PeerClient {
    #[instrument(skip_all, fields(peer = %addr))]
    pub async fn connect(
        addr: SocketAddr,
        info_hash: Sha1Hash,
        peer_id: Sha1Hash,
        config: PeerConfig,
    ) -> Result<Self, PeerError> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::Timeout("connect"))??;

        let mut socket = Framed::new(stream, HandshakeCodec);
        socket.send(Handshake::new(info_hash, peer_id)).await?;

        let reply = timeout(config.handshake_timeout, socket.next())
            .await
            .map_err(|_| PeerError::Timeout("handshake"))?
            .ok_or(PeerError::ConnectionClosed)??;
        if reply.info_hash != info_hash {
            return Err(PeerError::InfoHashMismatch);
        }
        debug!("handshake complete");

        // the bitfield may already sit in the read buffer
        let handshake_parts = socket.into_parts();
        let mut parts = FramedParts::new::<Message>(handshake_parts.io, MessageCodec);
        parts.read_buf = handshake_parts.read_buf;
        parts.write_buf = handshake_parts.write_buf;

        let mut client = PeerClient {
            socket: Framed::from_parts(parts),
            addr,
            bitfield: Bitfield::default(),
            choked: true,
            config,
        };

        let first = timeout(config.bitfield_timeout, client.read_message())
            .await
            .map_err(|_| PeerError::Timeout("bitfield"))??;
        match first {
            Message::Bitfield(bitfield) => {
                debug!(pieces = bitfield.count_ones(), "received bitfield");
                client.bitfield = bitfield;
                Ok(client)
            }
            other => Err(PeerError::UnexpectedMessage {
                expected: "bitfield",
                found: other.name(),
            }),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.has(index as usize)
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    /// Announces we will not choke the peer and want its pieces.
    pub async fn send_interested(&mut self) -> Result<(), PeerError> {
        self.socket.send(Message::Unchoke).await?;
        self.socket.send(Message::Interested).await
    }

    pub async fn send_have(&mut self, index: u32) -> Result<(), PeerError> {
        self.socket.send(Message::Have(index)).await
    }

    /// Downloads piece `index` of `size` bytes. The whole download shares
    /// one deadline.
    pub async fn download_piece(&mut self, index: u32, size: u32) -> Result<Vec<u8>, PeerError> {
        timeout(self.config.piece_timeout, self.download(index, size))
            .await
            .map_err(|_| PeerError::Timeout("piece download"))?
    }

    async fn download(&mut self, index: u32, size: u32) -> Result<Vec<u8>, PeerError> {
        let block_size = self.config.block_size.max(1);
        let mut buf = vec![0; size as usize];
        let mut received = HashSet::new();
        let mut downloaded = 0u64;
        let mut requested = 0u32;
        let mut backlog = 0usize;

        while downloaded < u64::from(size) {
            if !self.choked {
                while backlog < self.config.max_backlog && requested < size {
                    let length = block_size.min(size - requested);
                    self.socket
                        .send(Message::Request(BlockInfo {
                            index,
                            begin: requested,
                            length,
                        }))
                        .await?;
                    backlog += 1;
                    requested += length;
                }
            }

            match self.read_message().await? {
                Message::Unchoke => {
                    debug!(peer = %self.addr, "unchoked");
                    self.choked = false;
                }
                Message::Choke => {
                    debug!(peer = %self.addr, "choked");
                    self.choked = true;
                    // the peer drops our pending requests when it chokes
                    backlog = 0;
                    requested = 0;
                    while requested < size && received.contains(&requested) {
                        requested += block_size;
                    }
                }
                Message::Have(have) => self.bitfield.set(have as usize),
                Message::Piece(block) => {
                    let length = store_block(&mut buf, index, &block)?;
                    if received.insert(block.begin) {
                        downloaded += length as u64;
                    }
                    backlog = backlog.saturating_sub(1);
                }
                other => debug!(peer = %self.addr, "ignoring {} message", other.name()),
            }
        }

        Ok(buf)
    }

    async fn read_message(&mut self) -> Result<Message, PeerError> {
        loop {
            let message = self
                .socket
                .next()
                .await
                .ok_or(PeerError::ConnectionClosed)??;
            match message {
                Message::KeepAlive if self.config.tolerate_keep_alive => {
                    debug!(peer = %self.addr, "keep-alive");
                }
                Message::KeepAlive => return Err(PeerError::KeepAlive),
                message => return Ok(message),
            }
        }
    }
}

/// Copies a received block into the piece buffer, returning its length.
fn store_block(buf: &mut [u8], index: u32, block: &Block) -> Result<usize, PeerError> {
    if block.index != index {
        return Err(PeerError::PieceIndexMismatch {
            expected: index,
            found: block.index,
        });
    }

    let begin = block.begin as usize;
    let end = begin + block.data.len();
    if begin >= buf.len() || end > buf.len() {
        return Err(PeerError::BlockOutOfRange {
            begin: block.begin,
            length: block.data.len(),
            size: buf.len() as u32,
        });
    }

    buf[begin..end].copy_from_slice(&block.data);
    Ok(block.data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u32, begin: u32, data: &[u8]) -> Block {
        Block {
            index,
            begin,
            data: data.to_vec(),
        }
    }

    #[test]
    fn stores_block_at_offset() {
        let mut buf = vec![0; 6];
        assert_eq!(store_block(&mut buf, 3, &block(3, 2, &[7, 8])).unwrap(), 2);
        assert_eq!(buf, vec![0, 0, 7, 8, 0, 0]);
    }

    #[test]
    fn rejects_wrong_piece() {
        let mut buf = vec![0; 6];
        assert!(matches!(
            store_block(&mut buf, 3, &block(4, 0, &[1])),
            Err(PeerError::PieceIndexMismatch {
                expected: 3,
                found: 4
            })
        ));
    }

    #[test]
    fn rejects_block_outside_piece() {
        let mut buf = vec![0; 6];
        assert!(matches!(
            store_block(&mut buf, 0, &block(0, 6, &[1])),
            Err(PeerError::BlockOutOfRange { begin: 6, .. })
        ));
        assert!(matches!(
            store_block(&mut buf, 0, &block(0, 4, &[1, 2, 3])),
            Err(PeerError::BlockOutOfRange { begin: 4, length: 3, size: 6 })
        ));
        assert_eq!(buf, vec![0; 6]);
    }
}
