use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::{bitfield::Bitfield, error::PeerError};

/// Largest frame accepted from a peer, well above one block plus header.
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// `<index><begin><length>` of a request or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

/// Payload of a piece message.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u32,
    pub begin: u32,
    pub data: Vec<u8>,
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("index", &self.index)
            .field("begin", &self.begin)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Messages exchanged after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Bitfield),
    Request(BlockInfo),
    Piece(Block),
    Cancel(BlockInfo),
    /// A well-framed message with an id we do not speak.
    Unknown(u8),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::KeepAlive => "keep-alive",
            Message::Choke => "choke",
            Message::Unchoke => "unchoke",
            Message::Interested => "interested",
            Message::NotInterested => "not-interested",
            Message::Have(_) => "have",
            Message::Bitfield(_) => "bitfield",
            Message::Request(_) => "request",
            Message::Piece(_) => "piece",
            Message::Cancel(_) => "cancel",
            Message::Unknown(_) => "unknown",
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, u8> {
        Ok(match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => return Err(other),
        })
    }
}

/// `<length: u32 big endian><id: u8><payload>` framing. A zero length frame
/// decodes to [`Message::KeepAlive`]; whether that is acceptable is up to
/// the connection owner.
#[derive(Debug, Default)]
pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {
    type Error = PeerError;

    fn encode(&mut self, item: Message, buf: &mut BytesMut) -> Result<(), PeerError> {
        match item {
            Message::KeepAlive => buf.put_u32(0),
            Message::Choke => put_header(buf, MessageId::Choke, 0),
            Message::Unchoke => put_header(buf, MessageId::Unchoke, 0),
            Message::Interested => put_header(buf, MessageId::Interested, 0),
            Message::NotInterested => put_header(buf, MessageId::NotInterested, 0),
            Message::Have(index) => {
                put_header(buf, MessageId::Have, 4);
                buf.put_u32(index);
            }
            Message::Bitfield(bitfield) => {
                let bytes = bitfield.to_bytes();
                put_header(buf, MessageId::Bitfield, bytes.len());
                buf.extend_from_slice(&bytes);
            }
            Message::Request(block) => {
                put_header(buf, MessageId::Request, 12);
                put_block_info(buf, block);
            }
            Message::Cancel(block) => {
                put_header(buf, MessageId::Cancel, 12);
                put_block_info(buf, block);
            }
            Message::Piece(Block { index, begin, data }) => {
                put_header(buf, MessageId::Piece, 8 + data.len());
                buf.put_u32(index);
                buf.put_u32(begin);
                buf.extend_from_slice(&data);
            }
            Message::Unknown(id) => {
                buf.put_u32(1);
                buf.put_u8(id);
            }
        }
        Ok(())
    }
}

fn put_header(buf: &mut BytesMut, id: MessageId, payload_len: usize) {
    buf.reserve(5 + payload_len);
    buf.put_u32(1 + payload_len as u32);
    buf.put_u8(id as u8);
}

fn put_block_info(buf: &mut BytesMut, block: BlockInfo) {
    buf.put_u32(block.index);
    buf.put_u32(block.begin);
    buf.put_u32(block.length);
}

fn expect_len(payload: &BytesMut, len: usize, name: &'static str) -> Result<(), PeerError> {
    if payload.len() == len {
        Ok(())
    } else {
        Err(PeerError::MalformedMessage(name))
    }
}

fn get_block_info(payload: &mut BytesMut, name: &'static str) -> Result<BlockInfo, PeerError> {
    expect_len(payload, 12, name)?;
    Ok(BlockInfo {
        index: payload.get_u32(),
        begin: payload.get_u32(),
        length: payload.get_u32(),
    })
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = PeerError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, PeerError> {
        // peek at the length prefix without consuming it
        if buf.len() < 4 {
            return Ok(None);
        }
        let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if size == 0 {
            buf.advance(4);
            return Ok(Some(Message::KeepAlive));
        }
        if size > MAX_MESSAGE_SIZE {
            return Err(PeerError::FrameTooLarge(size));
        }
        if buf.len() < 4 + size {
            buf.reserve(4 + size - buf.len());
            return Ok(None);
        }

        buf.advance(4);
        let mut payload = buf.split_to(size);
        let id = payload.get_u8();

        let message = match MessageId::try_from(id) {
            Ok(MessageId::Choke) => {
                expect_len(&payload, 0, "choke")?;
                Message::Choke
            }
            Ok(MessageId::Unchoke) => {
                expect_len(&payload, 0, "unchoke")?;
                Message::Unchoke
            }
            Ok(MessageId::Interested) => {
                expect_len(&payload, 0, "interested")?;
                Message::Interested
            }
            Ok(MessageId::NotInterested) => {
                expect_len(&payload, 0, "not-interested")?;
                Message::NotInterested
            }
            Ok(MessageId::Have) => {
                expect_len(&payload, 4, "have")?;
                Message::Have(payload.get_u32())
            }
            Ok(MessageId::Bitfield) => Message::Bitfield(Bitfield::from_bytes(payload.to_vec())),
            Ok(MessageId::Request) => Message::Request(get_block_info(&mut payload, "request")?),
            Ok(MessageId::Cancel) => Message::Cancel(get_block_info(&mut payload, "cancel")?),
            Ok(MessageId::Piece) => {
                if payload.len() < 8 {
                    return Err(PeerError::MalformedMessage("piece"));
                }
                let index = payload.get_u32();
                let begin = payload.get_u32();
                Message::Piece(Block {
                    index,
                    begin,
                    data: payload.to_vec(),
                })
            }
            Err(id) => {
                warn!("unknown message id {id}");
                Message::Unknown(id)
            }
        };

        Ok(Some(message))
    }
}
