use crate::models::error::HeaderError;
use crate::models::message_type::MessageType;

/// Frame magic, `AA 55 AA 55` on the wire.
pub const PROTOCOL_MAGIC: u32 = 0x55AA_55AA;

pub const HEADER_SIZE: usize = 16;

/// A validated 16-byte frame header.
///
/// Wire layout (little-endian): `magic | length | type | type_check`, where
/// `type_check == !type`. The check is only enforced for recognized types;
/// unrecognized ids pass through so they can be surfaced as unknown messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    /// Declared payload length in bytes.
    pub length: u32,
    /// Raw type id.
    pub type_id: u32,
}

impl MessageHeader {
    pub fn new(message_type: MessageType, length: u32) -> Self {
        Self {
            length,
            type_id: message_type.id(),
        }
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_id(self.type_id)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&PROTOCOL_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8..12].copy_from_slice(&self.type_id.to_le_bytes());
        out[12..16].copy_from_slice(&(!self.type_id).to_le_bytes());
        out
    }
}

pub(crate) fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Parse and validate a frame header.
pub fn parse_header(bytes: &[u8]) -> Result<MessageHeader, HeaderError> {
    if bytes.len() != HEADER_SIZE {
        return Err(HeaderError::InvalidSize(bytes.len()));
    }
    let field = |offset| u32_at(bytes, offset).ok_or(HeaderError::InvalidSize(bytes.len()));

    let magic = field(0)?;
    if magic != PROTOCOL_MAGIC {
        return Err(HeaderError::InvalidMagic(magic));
    }

    let length = field(4)?;
    let type_id = field(8)?;
    let check = field(12)?;

    if MessageType::from_id(type_id).is_some() && check != !type_id {
        return Err(HeaderError::InvalidTypeCheck { type_id, check });
    }

    Ok(MessageHeader { length, type_id })
}

/// Whether `bytes` begins with the frame magic.
pub fn starts_with_magic(bytes: &[u8]) -> bool {
    u32_at(bytes, 0) == Some(PROTOCOL_MAGIC)
}
