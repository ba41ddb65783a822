use crate::{Result, StatErr};
use std::io::{ErrorKind, Read};

const SEGMENT_BITS: u32 = 0x7F;
const CHECKER_BIT: u8 = 0x80;
const MAX_VARINT_LEN: usize = 5;

/// Encode the given number as a [VarInt](https://wiki.vg/Protocol#VarInt_and_VarLong).
pub fn encode_varint(num: i32) -> Vec<u8> {
    // Negative values are encoded through their two's complement,
    // so they always take the maximum of five bytes.
    let mut num = num as u32;
    let mut result = Vec::<u8>::with_capacity(MAX_VARINT_LEN);

    loop {
        if (num & !SEGMENT_BITS) == 0 {
            result.push(num as u8);

            return result;
        }

        result.push(((num & SEGMENT_BITS) as u8) | CHECKER_BIT);
        num >>= 7;
    }
}

/// Decode a complete VarInt held in `bufs`.
///
/// Returns the value together with the number of bytes consumed.
pub fn decode_varint(bufs: &[u8]) -> Result<(i32, usize)> {
    let mut result = 0u32;

    for (i, &buf) in bufs.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(StatErr::ProtocolErr("VarInt too big".into()));
        }

        result |= ((buf as u32) & SEGMENT_BITS) << (i * 7);

        if buf & CHECKER_BIT == 0 {
            return Ok((result as i32, i + 1));
        }
    }

    Err(StatErr::ProtocolErr(format!(
        "Incomplete VarInt: [{}]",
        bufs.iter()
            .map(|x| format!("0x{:02X}", x))
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

/// Read one VarInt from a blocking stream.
///
/// A read that yields no byte (EOF or timeout) ends the VarInt as value 0.
/// Status callers treat that as "no valid response" rather than an error.
/// Other socket failures propagate, and more than five bytes is a
/// [StatErr::ProtocolErr].
pub fn read_varint<R: Read>(reader: &mut R) -> Result<i32> {
    let mut bufs = Vec::<u8>::with_capacity(MAX_VARINT_LEN);
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(1) => {}
            Ok(_) => {
                tracing::debug!(consumed = bufs.len(), "stream ended inside VarInt, reading as 0");
                return Ok(0);
            }
            Err(err) => match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::UnexpectedEof => {
                    tracing::debug!(consumed = bufs.len(), error = %err, "no byte for VarInt, reading as 0");
                    return Ok(0);
                }
                _ => return Err(err.into()),
            },
        }

        bufs.push(byte[0]);

        if byte[0] & CHECKER_BIT == 0 || bufs.len() > MAX_VARINT_LEN {
            return decode_varint(&bufs).map(|(num, _)| num);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{self, Cursor};

    /// Reader failing every call with the given error kind.
    struct FailingReader(ErrorKind);

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "failing reader"))
        }
    }

    #[test]
    fn encodes_known_values() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(1), vec![0x01]);
        assert_eq!(encode_varint(127), vec![0x7F]);
        assert_eq!(encode_varint(128), vec![0x80, 0x01]);
        assert_eq!(encode_varint(255), vec![0xFF, 0x01]);
        assert_eq!(encode_varint(25565), vec![0xDD, 0xC7, 0x01]);
        assert_eq!(encode_varint(2147483647), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(encode_varint(-1), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn decodes_with_consumed_len() {
        assert_eq!(decode_varint(&[0xDD, 0xC7, 0x01, 0x55]).unwrap(), (25565, 3));
        assert_eq!(decode_varint(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]).unwrap(), (-1, 5));
    }

    #[test]
    fn decode_rejects_sixth_byte() {
        let err = decode_varint(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert!(matches!(err, StatErr::ProtocolErr(ref m) if m == "VarInt too big"));
    }

    #[test]
    fn decode_rejects_truncated() {
        assert!(matches!(decode_varint(&[0x80, 0x80]), Err(StatErr::ProtocolErr(_))));
        assert!(matches!(decode_varint(&[]), Err(StatErr::ProtocolErr(_))));
    }

    #[test]
    fn read_from_stream() {
        let mut cursor = Cursor::new(vec![0xAC, 0x02, 0x07]);

        assert_eq!(read_varint(&mut cursor).unwrap(), 300);
        assert_eq!(read_varint(&mut cursor).unwrap(), 7);
    }

    #[test]
    fn read_eof_is_zero() {
        assert_eq!(read_varint(&mut Cursor::new(Vec::new())).unwrap(), 0);
        assert_eq!(read_varint(&mut Cursor::new(vec![0xFF, 0xFF])).unwrap(), 0);
    }

    #[test]
    fn read_rejects_sixth_byte() {
        let mut cursor = Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);

        assert!(matches!(read_varint(&mut cursor), Err(StatErr::ProtocolErr(_))));
    }

    #[test]
    fn read_timeout_is_zero() {
        assert_eq!(read_varint(&mut FailingReader(ErrorKind::WouldBlock)).unwrap(), 0);
        assert_eq!(read_varint(&mut FailingReader(ErrorKind::TimedOut)).unwrap(), 0);
    }

    #[test]
    fn read_reset_propagates() {
        assert!(matches!(
            read_varint(&mut FailingReader(ErrorKind::ConnectionReset)),
            Err(StatErr::IoErr(_))
        ));
        assert!(matches!(
            read_varint(&mut FailingReader(ErrorKind::BrokenPipe)),
            Err(StatErr::IoErr(_))
        ));
    }

    proptest! {
        /// Every non-negative i32 survives encode then decode.
        #[test]
        fn roundtrip(num in 0..=i32::MAX) {
            let encoded = encode_varint(num);

            prop_assert!(encoded.len() <= MAX_VARINT_LEN);
            prop_assert_eq!(decode_varint(&encoded).unwrap(), (num, encoded.len()));
            prop_assert_eq!(read_varint(&mut Cursor::new(encoded)).unwrap(), num);
        }

        /// Five continuation bytes followed by anything is too big.
        #[test]
        fn sixth_byte_fails(prefix in prop::collection::vec(0x80u8..=0xFF, 5), last in any::<u8>()) {
            let mut bufs = prefix;
            bufs.push(last);

            let decoded = decode_varint(&bufs);
            let read = read_varint(&mut Cursor::new(bufs));

            prop_assert!(matches!(decoded, Err(StatErr::ProtocolErr(_))));
            prop_assert!(matches!(read, Err(StatErr::ProtocolErr(_))));
        }
    }
}
