//! Binary frame format for the tidekv KV protocol.
//!
//! Classic frame layout (24-byte header + body):
//!
//! ```text
//! +-------+--------+---------+------------+----------+---------+
//! | magic | opcode | key_len | extras_len | datatype | part/st |
//! | 1 byte| 1 byte | 2 bytes |  1 byte    |  1 byte  | 2 bytes |
//! +-------+--------+---------+------------+----------+---------+
//! | total_body_len | opaque  |           cas                   |
//! |    4 bytes     | 4 bytes |         8 bytes                 |
//! +----------------+---------+---------------------------------+
//! | extras | key | value                                       |
//! +--------+-----+---------------------------------------------+
//! ```
//!
//! The flexible variant (magics 0x08/0x18) narrows `key_len` to one byte and
//! uses the freed byte for a framing-extras length, carried between the header
//! and the fixed extras. Byte 6..8 is the partition on requests and the status
//! code on responses. All integers are big-endian.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic byte of a classic request.
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte of a request carrying flexible framing extras.
pub const FLEXIBLE_REQUEST_MAGIC: u8 = 0x08;

/// Magic byte of a classic response.
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Magic byte of a response carrying flexible framing extras.
pub const FLEXIBLE_RESPONSE_MAGIC: u8 = 0x18;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Datatype bit signalling a compressed value.
pub const DATATYPE_COMPRESSED: u8 = 0x01;

/// Maximum length of a bare document key in bytes.
pub const MAX_KEY_SIZE: usize = 250;

/// Maximum value payload accepted by the server (20 MiB).
pub const MAX_VALUE_SIZE: usize = 20 * 1024 * 1024;

/// Upper bound on a declared response body, with headroom for extras and key.
const MAX_BODY_SIZE: usize = MAX_VALUE_SIZE + 8192;

/// KV operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
}

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Encodes a u32 as unsigned LEB128, used to qualify keys with a collection id.
pub fn leb128(mut value: u32) -> BytesMut {
    let mut out = BytesMut::with_capacity(5);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            out.put_u8(byte | 0x80);
        } else {
            out.put_u8(byte);
            return out;
        }
    }
}

/// Builds a classic request frame.
///
/// Callers are responsible for keeping `key` within [`MAX_KEY_SIZE`] plus any
/// collection prefix; lengths beyond the field widths wrap silently otherwise.
pub fn request(
    opcode: Opcode,
    datatype: u8,
    partition: u16,
    opaque: u32,
    cas: u64,
    extras: &[u8],
    key: &[u8],
    value: &[u8],
) -> BytesMut {
    let total_body = extras.len() + key.len() + value.len();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + total_body);
    buf.put_u8(REQUEST_MAGIC);
    buf.put_u8(opcode.code());
    buf.put_u16(key.len() as u16);
    buf.put_u8(extras.len() as u8);
    buf.put_u8(datatype);
    buf.put_u16(partition);
    buf.put_u32(total_body as u32);
    buf.put_u32(opaque);
    buf.put_u64(cas);
    buf.put_slice(extras);
    buf.put_slice(key);
    buf.put_slice(value);
    buf
}

/// Builds a request frame in the alternate layout with flexible framing extras.
pub fn flexible_request(
    opcode: Opcode,
    datatype: u8,
    partition: u16,
    opaque: u32,
    cas: u64,
    framing_extras: &[u8],
    extras: &[u8],
    key: &[u8],
    value: &[u8],
) -> BytesMut {
    let total_body = framing_extras.len() + extras.len() + key.len() + value.len();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + total_body);
    buf.put_u8(FLEXIBLE_REQUEST_MAGIC);
    buf.put_u8(opcode.code());
    buf.put_u8(framing_extras.len() as u8);
    buf.put_u8(key.len() as u8);
    buf.put_u8(extras.len() as u8);
    buf.put_u8(datatype);
    buf.put_u16(partition);
    buf.put_u32(total_body as u32);
    buf.put_u32(opaque);
    buf.put_u64(cas);
    buf.put_slice(framing_extras);
    buf.put_slice(extras);
    buf.put_slice(key);
    buf.put_slice(value);
    buf
}

/// A parsed response frame.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    /// Magic byte the frame arrived with.
    pub magic: u8,
    /// Raw operation code echoed by the server.
    pub opcode: u8,
    /// Datatype bitmap; see [`DATATYPE_COMPRESSED`].
    pub datatype: u8,
    /// Raw status code.
    pub status: u16,
    /// Correlation identifier echoed from the request.
    pub opaque: u32,
    /// CAS value of the affected document, 0 if not applicable.
    pub cas: u64,
    /// Flexible framing extras (empty on classic responses).
    pub framing_extras: Bytes,
    /// Fixed extras.
    pub extras: Bytes,
    /// Key bytes (usually empty on responses).
    pub key: Bytes,
    /// Value payload.
    pub value: Bytes,
}

/// Streaming decoder reassembling response frames from raw inbound bytes.
///
/// Incomplete input is never an error: [`FrameDecoder::decode`] returns
/// `Ok(None)` until a whole frame is buffered. All body lengths are taken
/// from the header and validated against each other before any split.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends raw bytes from the transport to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next response frame from the buffer.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(&mut self) -> Result<Option<ResponseFrame>, ProtocolError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let magic = self.buffer[0];
        let (framing_len, key_len) = match magic {
            RESPONSE_MAGIC => (
                0usize,
                u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize,
            ),
            FLEXIBLE_RESPONSE_MAGIC => (self.buffer[2] as usize, self.buffer[3] as usize),
            other => return Err(ProtocolError::InvalidMagic(other)),
        };

        let extras_len = self.buffer[4] as usize;
        let datatype = self.buffer[5];
        let status = u16::from_be_bytes([self.buffer[6], self.buffer[7]]);
        let total_body = u32::from_be_bytes([
            self.buffer[8],
            self.buffer[9],
            self.buffer[10],
            self.buffer[11],
        ]) as usize;

        if total_body > MAX_BODY_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: total_body,
                max: MAX_BODY_SIZE,
            });
        }
        if framing_len + extras_len + key_len > total_body {
            return Err(ProtocolError::InvalidBodyLengths {
                framing: framing_len,
                extras: extras_len,
                key: key_len,
                total: total_body,
            });
        }

        if self.buffer.len() < HEADER_SIZE + total_body {
            return Ok(None);
        }

        let opcode = self.buffer[1];
        let opaque = u32::from_be_bytes([
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        ]);
        let cas = u64::from_be_bytes([
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
            self.buffer[20],
            self.buffer[21],
            self.buffer[22],
            self.buffer[23],
        ]);

        self.buffer.advance(HEADER_SIZE);
        let framing_extras = self.buffer.split_to(framing_len).freeze();
        let extras = self.buffer.split_to(extras_len).freeze();
        let key = self.buffer.split_to(key_len).freeze();
        let value = self
            .buffer
            .split_to(total_body - framing_len - extras_len - key_len)
            .freeze();

        Ok(Some(ResponseFrame {
            magic,
            opcode,
            datatype,
            status,
            opaque,
            cas,
            framing_extras,
            extras,
            key,
            value,
        }))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a classic response frame, mirroring what a server would send.
    fn response_bytes(
        status: u16,
        opaque: u32,
        cas: u64,
        extras: &[u8],
        value: &[u8],
    ) -> BytesMut {
        let total_body = extras.len() + value.len();
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + total_body);
        buf.put_u8(RESPONSE_MAGIC);
        buf.put_u8(Opcode::Get.code());
        buf.put_u16(0); // key_len
        buf.put_u8(extras.len() as u8);
        buf.put_u8(0); // datatype
        buf.put_u16(status);
        buf.put_u32(total_body as u32);
        buf.put_u32(opaque);
        buf.put_u64(cas);
        buf.put_slice(extras);
        buf.put_slice(value);
        buf
    }

    #[test]
    fn test_request_layout() {
        let frame = request(
            Opcode::Set,
            DATATYPE_COMPRESSED,
            0x0123,
            0xdeadbeef,
            0x1122334455667788,
            &[0xaa; 8],
            b"key",
            b"value",
        );

        assert_eq!(frame[0], REQUEST_MAGIC);
        assert_eq!(frame[1], 0x01);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 3);
        assert_eq!(frame[4], 8);
        assert_eq!(frame[5], DATATYPE_COMPRESSED);
        assert_eq!(u16::from_be_bytes([frame[6], frame[7]]), 0x0123);
        assert_eq!(
            u32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]),
            16
        );
        assert_eq!(
            u32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]),
            0xdeadbeef
        );
        assert_eq!(&frame[24..32], &[0xaa; 8]);
        assert_eq!(&frame[32..35], b"key");
        assert_eq!(&frame[35..], b"value");
        assert_eq!(frame.len(), HEADER_SIZE + 16);
    }

    #[test]
    fn test_flexible_request_layout() {
        let framing = [0x13, 0x01, 0x00, 0x64];
        let frame = flexible_request(
            Opcode::Replace,
            0,
            7,
            42,
            0,
            &framing,
            &[0u8; 8],
            b"k",
            b"v",
        );

        assert_eq!(frame[0], FLEXIBLE_REQUEST_MAGIC);
        assert_eq!(frame[1], 0x03);
        assert_eq!(frame[2], 4); // framing extras len
        assert_eq!(frame[3], 1); // key len
        assert_eq!(frame[4], 8); // extras len
        assert_eq!(
            u32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]),
            4 + 8 + 1 + 1
        );
        assert_eq!(&frame[24..28], &framing);
    }

    #[test]
    fn test_leb128_encoding() {
        assert_eq!(&leb128(0)[..], &[0x00]);
        assert_eq!(&leb128(0x7f)[..], &[0x7f]);
        assert_eq!(&leb128(0x80)[..], &[0x80, 0x01]);
        assert_eq!(&leb128(0x1234)[..], &[0xb4, 0x24]);
        assert_eq!(&leb128(u32::MAX)[..], &[0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn test_decode_roundtrip() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&response_bytes(0x0000, 99, 0xcafe, &[], b"doc"));

        let frame = decoder.decode().unwrap().unwrap();
        assert_eq!(frame.status, 0);
        assert_eq!(frame.opaque, 99);
        assert_eq!(frame.cas, 0xcafe);
        assert_eq!(frame.value.as_ref(), b"doc");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[RESPONSE_MAGIC, 0x00, 0x00]);
        assert!(decoder.decode().unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete_body() {
        let full = response_bytes(0, 1, 0, &[], b"partial value");
        let mut decoder = FrameDecoder::new();
        decoder.extend(&full[..full.len() - 4]);
        assert!(decoder.decode().unwrap().is_none());

        decoder.extend(&full[full.len() - 4..]);
        let frame = decoder.decode().unwrap().unwrap();
        assert_eq!(frame.value.as_ref(), b"partial value");
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x42; HEADER_SIZE]);
        assert!(matches!(
            decoder.decode(),
            Err(ProtocolError::InvalidMagic(0x42))
        ));
    }

    #[test]
    fn test_decode_inconsistent_lengths() {
        // Declares a 10-byte key inside a 4-byte body.
        let mut buf = BytesMut::new();
        buf.put_u8(RESPONSE_MAGIC);
        buf.put_u8(0);
        buf.put_u16(10);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u16(0);
        buf.put_u32(4);
        buf.put_u32(1);
        buf.put_u64(0);
        buf.put_slice(&[0u8; 4]);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf);
        assert!(matches!(
            decoder.decode(),
            Err(ProtocolError::InvalidBodyLengths { .. })
        ));
    }

    #[test]
    fn test_decode_flexible_response() {
        let framing = [0x21, 0x00, 0x03];
        let extras = [0x00, 0x00, 0x00, 0x0e];
        let total_body = framing.len() + extras.len() + 2;
        let mut buf = BytesMut::new();
        buf.put_u8(FLEXIBLE_RESPONSE_MAGIC);
        buf.put_u8(0);
        buf.put_u8(framing.len() as u8);
        buf.put_u8(0); // key len
        buf.put_u8(extras.len() as u8);
        buf.put_u8(0);
        buf.put_u16(0);
        buf.put_u32(total_body as u32);
        buf.put_u32(7);
        buf.put_u64(0);
        buf.put_slice(&framing);
        buf.put_slice(&extras);
        buf.put_slice(b"ok");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf);
        let frame = decoder.decode().unwrap().unwrap();
        assert_eq!(frame.framing_extras.as_ref(), &framing);
        assert_eq!(frame.extras.as_ref(), &extras);
        assert_eq!(frame.value.as_ref(), b"ok");
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&response_bytes(0, 1, 0, &[], b"first"));
        decoder.extend(&response_bytes(0, 2, 0, &[], b"second"));

        let first = decoder.decode().unwrap().unwrap();
        assert_eq!(first.opaque, 1);
        let second = decoder.decode().unwrap().unwrap();
        assert_eq!(second.opaque, 2);
        assert!(decoder.decode().unwrap().is_none());
    }

    #[test]
    fn test_decode_oversized_body() {
        let mut buf = BytesMut::new();
        buf.put_u8(RESPONSE_MAGIC);
        buf.put_u8(0);
        buf.put_u16(0);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u16(0);
        buf.put_u32(u32::MAX);
        buf.put_u32(1);
        buf.put_u64(0);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&buf);
        assert!(matches!(
            decoder.decode(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
