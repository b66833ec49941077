//! CBP frame layout.
//!
//! ```text
//! +-------+---------+-------+--------+----------+---------+
//! | magic | version | flags | length | checksum | payload |
//! |  2B   |   1B    |  1B   | 2B BE  |  2B BE   | length  |
//! +-------+---------+-------+--------+----------+---------+
//! ```
//!
//! The checksum is CRC-16/CCITT-FALSE over the payload. Flags are derived
//! from [`FramePayload`], so only legal combinations can be written:
//!
//! | payload   | flags                        | payload bytes        |
//! |-----------|------------------------------|----------------------|
//! | `Raw`     | none or `COMPRESSED`         | body                 |
//! | `HashRef` | `HAS_HASH`                   | hash (8B BE)         |
//! | `Delta`   | `IS_DELTA`, maybe `COMPRESSED` | base hash (8B BE) + body |

use crate::cbp::compression::decompress_block;
use crate::cbp::schema::SCHEMA_VERSION;
use crate::core::{ContentHash, Error, Result};
use crc::{Crc, CRC_16_IBM_3740};

/// Frame magic bytes.
pub const MAGIC: [u8; 2] = [0xCB, 0x50];

/// Frame format version. Tracks the schema and vocabulary tables.
pub const VERSION: u8 = SCHEMA_VERSION;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Header flag bits.
pub mod flags {
    /// Payload is a delta against a registered base
    pub const IS_DELTA: u8 = 0x01;
    /// Payload is a hash reference to a registered message
    pub const HAS_HASH: u8 = 0x02;
    /// Body is LZ4 compressed
    pub const COMPRESSED: u8 = 0x04;

    pub(crate) const ALL: u8 = IS_DELTA | HAS_HASH | COMPRESSED;
}

/// A serialized message body, optionally compressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Plain(Vec<u8>),
    /// Size-prefixed LZ4 block
    Lz4(Vec<u8>),
}

impl Block {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Block::Lz4(_))
    }

    /// Bytes as carried on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Block::Plain(bytes) | Block::Lz4(bytes) => bytes,
        }
    }

    /// Uncompressed body.
    pub fn into_plain(self) -> Result<Vec<u8>> {
        match self {
            Block::Plain(bytes) => Ok(bytes),
            Block::Lz4(bytes) => decompress_block(&bytes),
        }
    }

    fn from_wire(bytes: &[u8], compressed: bool) -> Self {
        if compressed {
            Block::Lz4(bytes.to_vec())
        } else {
            Block::Plain(bytes.to_vec())
        }
    }
}

/// What a frame carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FramePayload {
    /// Full message body
    Raw(Block),
    /// Reference to a message the receiver already holds
    HashRef(ContentHash),
    /// Changes relative to a registered base
    Delta { base: ContentHash, body: Block },
}

impl FramePayload {
    /// Header flags for this payload.
    pub fn flags(&self) -> u8 {
        match self {
            FramePayload::Raw(body) => compressed_flag(body),
            FramePayload::HashRef(_) => flags::HAS_HASH,
            FramePayload::Delta { body, .. } => flags::IS_DELTA | compressed_flag(body),
        }
    }

    fn wire_bytes(&self) -> Vec<u8> {
        match self {
            FramePayload::Raw(body) => body.as_bytes().to_vec(),
            FramePayload::HashRef(hash) => hash.to_be_bytes().to_vec(),
            FramePayload::Delta { base, body } => {
                let mut bytes = Vec::with_capacity(ContentHash::WIRE_SIZE + body.as_bytes().len());
                bytes.extend_from_slice(&base.to_be_bytes());
                bytes.extend_from_slice(body.as_bytes());
                bytes
            }
        }
    }

    fn from_wire(flag_bits: u8, payload: &[u8]) -> Result<Self> {
        if flag_bits & !flags::ALL != 0 {
            return Err(Error::Frame(format!("unknown flag bits {:#04x}", flag_bits)));
        }

        let compressed = flag_bits & flags::COMPRESSED != 0;
        let is_delta = flag_bits & flags::IS_DELTA != 0;
        let has_hash = flag_bits & flags::HAS_HASH != 0;

        match (has_hash, is_delta) {
            (true, true) => Err(Error::Frame("HAS_HASH and IS_DELTA are exclusive".into())),
            (true, false) => {
                if compressed {
                    return Err(Error::Frame("hash references cannot be compressed".into()));
                }
                if payload.len() != ContentHash::WIRE_SIZE {
                    return Err(Error::Frame(format!(
                        "hash reference must be {} bytes, got {}",
                        ContentHash::WIRE_SIZE,
                        payload.len()
                    )));
                }
                ContentHash::from_be_slice(payload)
                    .map(FramePayload::HashRef)
                    .ok_or_else(|| Error::Frame("truncated hash reference".into()))
            }
            (false, true) => {
                let base = ContentHash::from_be_slice(payload)
                    .ok_or_else(|| Error::Frame("delta payload shorter than its base hash".into()))?;
                Ok(FramePayload::Delta {
                    base,
                    body: Block::from_wire(&payload[ContentHash::WIRE_SIZE..], compressed),
                })
            }
            (false, false) => Ok(FramePayload::Raw(Block::from_wire(payload, compressed))),
        }
    }
}

fn compressed_flag(body: &Block) -> u8 {
    if body.is_compressed() {
        flags::COMPRESSED
    } else {
        0
    }
}

/// One CBP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub payload: FramePayload,
}

impl Frame {
    pub fn new(payload: FramePayload) -> Self {
        Self { payload }
    }

    /// Write the frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = self.payload.wire_bytes();
        let length = u16::try_from(payload.len())
            .map_err(|_| Error::PayloadTooLarge(payload.len()))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.payload.flags());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&crc16(&payload).to_be_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse and verify a frame.
    ///
    /// Magic and version are checked before anything else, then the declared
    /// length, then the checksum, and only then the flags.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Frame(format!(
                "frame of {} bytes is shorter than the header",
                bytes.len()
            )));
        }
        if bytes[..2] != MAGIC {
            return Err(Error::Frame(format!(
                "bad magic {:02x}{:02x}",
                bytes[0], bytes[1]
            )));
        }
        if bytes[2] != VERSION {
            return Err(Error::Frame(format!(
                "unsupported version {:#04x}, expected {:#04x}",
                bytes[2], VERSION
            )));
        }

        let flag_bits = bytes[3];
        let length = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
        let expected = u16::from_be_bytes([bytes[6], bytes[7]]);
        let payload = &bytes[HEADER_SIZE..];

        if payload.len() != length {
            return Err(Error::Frame(format!(
                "declared length {} but {} payload bytes present",
                length,
                payload.len()
            )));
        }

        let actual = crc16(payload);
        if actual != expected {
            return Err(Error::Checksum { expected, actual });
        }

        Ok(Self {
            payload: FramePayload::from_wire(flag_bits, payload)?,
        })
    }
}

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection).
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
