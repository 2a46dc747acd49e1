//! Piece availability advertised by a peer.
use bitvec::prelude::*;

/// Bit `i` set means the peer has piece `i`. Most significant bit of the
/// first byte is piece 0, as on the wire. Padding bits past the last piece
/// are always zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield(BitVec<u8, Msb0>);

impl Bitfield {
    /// All-zero bitfield sized for `pieces` pieces.
    pub fn new(pieces: usize) -> Self {
        Bitfield(bitvec![u8, Msb0; 0; pieces])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Bitfield(BitVec::from_vec(bytes))
    }

    pub fn has(&self, index: usize) -> bool {
        self.0.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Marks piece `index` as present, growing the field when a peer
    /// announces a piece past its original bitfield.
    pub fn set(&mut self, index: usize) {
        if self.0.len() <= index {
            self.0.resize(index + 1, false);
            self.0.set_uninitialized(false);
        }
        self.0.set(index, true);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count_ones(&self) -> usize {
        self.0.count_ones()
    }

    /// Wire form, padded with zero bits to a whole byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_raw_slice().to_vec()
    }
}
