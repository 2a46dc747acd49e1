//! Codec for the handshake that opens every peer connection.
//!
//! The handshake does not share the length-prefixed framing of the other
//! messages, so a connection starts on [`HandshakeCodec`] and switches to
//! [`MessageCodec`](crate::message::MessageCodec) once both sides have sent
//! theirs. The read buffer must be carried over on the switch.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use torrent_parser::model::Sha1Hash;

use crate::{error::PeerError, PSTR};

/// `<pstrlen><pstr><reserved: 8><info_hash: 20><peer_id: 20>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub pstr: Vec<u8>,
    pub reserved: [u8; 8],
    pub info_hash: Sha1Hash,
    pub peer_id: Sha1Hash,
}

impl Handshake {
    /// Our handshake, no extensions advertised.
    pub fn new(info_hash: Sha1Hash, peer_id: Sha1Hash) -> Self {
        Handshake {
            pstr: PSTR.to_vec(),
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct HandshakeCodec;

impl Encoder<Handshake> for HandshakeCodec {
    type Error = PeerError;

    fn encode(&mut self, handshake: Handshake, buf: &mut BytesMut) -> Result<(), PeerError> {
        let Handshake {
            pstr,
            reserved,
            info_hash,
            peer_id,
        } = handshake;

        buf.reserve(1 + pstr.len() + 48);
        buf.put_u8(pstr.len() as u8);
        buf.extend_from_slice(&pstr);
        buf.extend_from_slice(&reserved);
        buf.extend_from_slice(&info_hash);
        buf.extend_from_slice(&peer_id);

        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = PeerError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Handshake>, PeerError> {
        let Some(&pstr_len) = buf.first() else {
            return Ok(None);
        };
        let pstr_len = pstr_len as usize;
        if pstr_len == 0 {
            return Err(PeerError::EmptyHandshake);
        }

        // wait for the whole handshake before consuming anything
        if buf.len() < 1 + pstr_len + 48 {
            return Ok(None);
        }
        buf.advance(1);

        let pstr = buf.split_to(pstr_len).to_vec();
        let mut reserved = [0; 8];
        buf.copy_to_slice(&mut reserved);
        let mut info_hash = [0; 20];
        buf.copy_to_slice(&mut info_hash);
        let mut peer_id = [0; 20];
        buf.copy_to_slice(&mut peer_id);

        Ok(Some(Handshake {
            pstr,
            reserved,
            info_hash,
            peer_id,
        }))
    }
}
