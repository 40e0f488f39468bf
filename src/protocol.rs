//! Voice packet wire format
//!
//! ```text
//! ┌───────────┬──────────────────────┬─────────────────────────┐
//! │ flags (1) │ sequence (varint)    │ payload (opaque)        │
//! └───────────┴──────────────────────┴─────────────────────────┘
//!   bits 7..5 = message type, bits 4..0 untouched here
//! ```
//!
//! The sequence number uses the voice protocol's prefix-coded integer, see
//! [`read_varint`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::PacketError;

/// Sequence number carried by the stream-restart placeholder frame.
///
/// A placeholder always has an empty payload; playback buffers treat
/// `(empty payload, PLACEHOLDER_SEQUENCE)` as "the stream is restarting" and
/// reset their expected sequence rather than queueing audio.
pub const PLACEHOLDER_SEQUENCE: u64 = 0;

/// UDP message type, stored in the top 3 bits of the flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    CeltAlpha,
    Ping,
    Speex,
    CeltBeta,
    Opus,
    /// Values 5-7, not assigned by the protocol
    Reserved(u8),
}

impl MessageType {
    /// Decode the message type from a packet's flags byte
    pub fn from_flags(flags: u8) -> Self {
        match (flags >> 5) & 0x7 {
            0 => MessageType::CeltAlpha,
            1 => MessageType::Ping,
            2 => MessageType::Speex,
            3 => MessageType::CeltBeta,
            4 => MessageType::Opus,
            other => MessageType::Reserved(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::CeltAlpha => 0,
            MessageType::Ping => 1,
            MessageType::Speex => 2,
            MessageType::CeltBeta => 3,
            MessageType::Opus => 4,
            MessageType::Reserved(v) => v & 0x7,
        }
    }

    /// Flags byte with this type and all other bits clear
    pub fn to_flags(self) -> u8 {
        self.as_u8() << 5
    }
}

/// Read a prefix-coded integer from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
///
/// | prefix      | extra bytes | value                      |
/// |-------------|-------------|----------------------------|
/// | `0xxxxxxx`  | 0           | 7-bit positive             |
/// | `10xxxxxx`  | 1           | 14-bit positive            |
/// | `110xxxxx`  | 2           | 21-bit positive            |
/// | `1110xxxx`  | 3           | 28-bit positive            |
/// | `111100__`  | 4           | 32-bit positive            |
/// | `111101__`  | 8           | 64-bit                     |
/// | `111110__`  | varint      | bitwise-inverted varint    |
/// | `111111xx`  | 0           | inverted 2-bit negative    |
///
/// The `111110__` prefix may appear once; a second one nested inside it is
/// rejected as malformed.
pub fn read_varint(data: &[u8]) -> Result<(i64, usize), PacketError> {
    read_prefixed(data, true)
}

fn read_prefixed(data: &[u8], allow_negation: bool) -> Result<(i64, usize), PacketError> {
    let first = *data.first().ok_or(PacketError::Truncated {
        needed: 1,
        remaining: 0,
    })?;
    let v = first as u64;

    let take = |n: usize| -> Result<u64, PacketError> {
        let rest = &data[1..];
        if rest.len() < n {
            return Err(PacketError::Truncated {
                needed: n,
                remaining: rest.len(),
            });
        }
        Ok(rest[..n].iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    };

    if v & 0x80 == 0x00 {
        Ok(((v & 0x7F) as i64, 1))
    } else if v & 0xC0 == 0x80 {
        Ok(((((v & 0x3F) << 8) | take(1)?) as i64, 2))
    } else if v & 0xF0 == 0xF0 {
        if v & 0xF8 == 0xF8 && !allow_negation {
            return Err(PacketError::Malformed("nested negation prefix"));
        }
        match v & 0xFC {
            0xF0 => Ok((take(4)? as i64, 5)),
            0xF4 => Ok((take(8)? as i64, 9)),
            0xF8 => {
                let (inner, used) = read_prefixed(&data[1..], false)?;
                Ok((!inner, used + 1))
            }
            0xFC => Ok((!((v & 0x03) as i64), 1)),
            _ => unreachable!("masked with 0xFC"),
        }
    } else if v & 0xF0 == 0xE0 {
        Ok(((((v & 0x0F) << 24) | take(3)?) as i64, 4))
    } else {
        // 110xxxxx
        Ok(((((v & 0x1F) << 16) | take(2)?) as i64, 3))
    }
}

/// Append `value` to `buf` in the shortest prefix-coded form
pub fn write_varint(buf: &mut BytesMut, value: i64) {
    let mut i = value as u64;

    if value < 0 && !i < 0x1_0000_0000 {
        i = !i;
        if i <= 0x3 {
            buf.put_u8(0xFC | i as u8);
            return;
        }
        buf.put_u8(0xF8);
    }

    if i < 0x80 {
        buf.put_u8(i as u8);
    } else if i < 0x4000 {
        buf.put_u8(((i >> 8) | 0x80) as u8);
        buf.put_u8(i as u8);
    } else if i < 0x20_0000 {
        buf.put_u8(((i >> 16) | 0xC0) as u8);
        buf.put_u16(i as u16);
    } else if i < 0x1000_0000 {
        buf.put_u8(((i >> 24) | 0xE0) as u8);
        buf.put_u8((i >> 16) as u8);
        buf.put_u16(i as u16);
    } else if i < 0x1_0000_0000 {
        buf.put_u8(0xF0);
        buf.put_u32(i as u32);
    } else {
        buf.put_u8(0xF4);
        buf.put_u64(i);
    }
}

/// A voice packet split into its wire fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePacket {
    pub flags: u8,
    pub sequence: u64,
    pub payload: Bytes,
}

impl VoicePacket {
    /// Parse a packet as it leaves the encoder: flags, varint sequence, payload
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        let (&flags, rest) = data.split_first().ok_or(PacketError::Empty)?;
        let (sequence, used) = read_varint(rest)?;
        if sequence < 0 {
            return Err(PacketError::NegativeSequence(sequence));
        }

        Ok(Self {
            flags,
            sequence: sequence as u64,
            payload: Bytes::copy_from_slice(&rest[used..]),
        })
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from_flags(self.flags)
    }

    /// The payload the playback engine expects: the flags byte followed by
    /// the payload, with the sequence number removed.
    pub fn playback_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 1);
        buf.put_u8(self.flags);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Serialize back into wire form
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 10);
        buf.put_u8(self.flags);
        write_varint(&mut buf, self.sequence as i64);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_message_type_from_flags() {
        assert_eq!(MessageType::from_flags(0x20), MessageType::Ping);
        assert_eq!(MessageType::from_flags(0x80), MessageType::Opus);
        assert_eq!(MessageType::from_flags(0x1F), MessageType::CeltAlpha);
        assert_eq!(MessageType::from_flags(0xE0), MessageType::Reserved(7));
        assert_eq!(MessageType::Opus.to_flags(), 0x80);
    }

    #[test]
    fn test_parse_packet() {
        let packet = VoicePacket::parse(&[0x20, 0x05, b'a', b'b', b'c']).unwrap();
        assert_eq!(packet.flags, 0x20);
        assert_eq!(packet.sequence, 5);
        assert_eq!(&packet.payload[..], b"abc");
        assert_eq!(packet.message_type(), MessageType::Ping);
        assert_eq!(&packet.playback_payload()[..], b"\x20abc");
    }

    #[test]
    fn test_parse_two_byte_sequence() {
        // 0x80 | 0x01, 0x2C => 300
        let packet = VoicePacket::parse(&[0x80, 0x81, 0x2C, 0xFF]).unwrap();
        assert_eq!(packet.sequence, 300);
        assert_eq!(&packet.payload[..], &[0xFF]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(VoicePacket::parse(&[]), Err(PacketError::Empty));
        assert_eq!(
            VoicePacket::parse(&[0x80]),
            Err(PacketError::Truncated {
                needed: 1,
                remaining: 0
            })
        );
        assert_eq!(
            VoicePacket::parse(&[0x80, 0xF0, 0x00]),
            Err(PacketError::Truncated {
                needed: 4,
                remaining: 1
            })
        );
        assert_eq!(
            VoicePacket::parse(&[0x80, 0xFC]),
            Err(PacketError::NegativeSequence(-1))
        );
    }

    #[test]
    fn test_nested_negation_rejected() {
        // a single negation prefix is fine
        assert_eq!(read_varint(&[0xF8, 0x05]), Ok((!5, 2)));

        assert_eq!(
            read_varint(&[0xF8, 0xFD]),
            Err(PacketError::Malformed("nested negation prefix"))
        );

        // deep nesting must fail fast instead of recursing
        let mut packet = vec![0x80];
        packet.extend(std::iter::repeat(0xF8).take(1_000_000));
        packet.push(0x05);
        assert_eq!(
            VoicePacket::parse(&packet),
            Err(PacketError::Malformed("nested negation prefix"))
        );
    }

    #[test]
    fn test_varint_known_encodings() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 0x7F);
        write_varint(&mut buf, 0x3FFF);
        write_varint(&mut buf, -2);
        assert_eq!(&buf[..], &[0x7F, 0xBF, 0xFF, 0xFD]);
    }

    proptest! {
        #[test]
        fn varint_decodes_what_it_encodes(value in any::<i64>()) {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            let (decoded, used) = read_varint(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(used, buf.len());
        }
    }
}
