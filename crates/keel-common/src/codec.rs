//! Length-self-describing serialization for keys and values.
//!
//! Every indexable key or value type implements [`Codec`]. Encodings carry
//! their own length (fixed-width integers, length-prefixed strings), so a
//! decoder never needs out-of-band size information.

use crate::error::{KeelError, Result};
use crate::types::RecordId;

/// Byte-oriented codec for a value type.
pub trait Codec: Sized {
    /// Number of bytes `encode` will append for this value.
    fn encoded_size(&self) -> usize;

    /// Appends the encoded value to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decodes one value from the front of `buf`.
    ///
    /// Returns the value and the number of bytes consumed.
    fn decode(buf: &[u8]) -> Result<(Self, usize)>;
}

fn take<const N: usize>(buf: &[u8]) -> Result<[u8; N]> {
    if buf.len() < N {
        return Err(KeelError::Corrupted(format!(
            "truncated value: need {N} bytes, have {}",
            buf.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[..N]);
    Ok(out)
}

impl Codec for i64 {
    fn encoded_size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Ok((i64::from_le_bytes(take::<8>(buf)?), 8))
    }
}

impl Codec for u64 {
    fn encoded_size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Ok((u64::from_le_bytes(take::<8>(buf)?), 8))
    }
}

impl Codec for u32 {
    fn encoded_size(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Ok((u32::from_le_bytes(take::<4>(buf)?), 4))
    }
}

impl Codec for RecordId {
    fn encoded_size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.raw().to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let raw = i64::from_le_bytes(take::<8>(buf)?);
        let id = if raw < 0 {
            RecordId::EMPTY
        } else {
            RecordId::new(raw)
        };
        Ok((id, 8))
    }
}

/// Strings are encoded as a u16 length prefix followed by UTF-8 bytes.
impl Codec for String {
    fn encoded_size(&self) -> usize {
        2 + self.len()
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let len = u16::from_le_bytes(take::<2>(buf)?) as usize;
        if buf.len() < 2 + len {
            return Err(KeelError::Corrupted(format!(
                "truncated string: need {} bytes, have {}",
                2 + len,
                buf.len()
            )));
        }
        let s = std::str::from_utf8(&buf[2..2 + len])
            .map_err(|e| KeelError::Corrupted(format!("invalid UTF-8 in string: {e}")))?
            .to_string();
        Ok((s, 2 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Codec + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Vec::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), value.encoded_size());

        let (decoded, consumed) = T::decode(&buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_int_roundtrip() {
        roundtrip(0i64);
        roundtrip(-1i64);
        roundtrip(i64::MAX);
        roundtrip(i64::MIN);
    }

    #[test]
    fn test_unsigned_roundtrip() {
        roundtrip(0u32);
        roundtrip(u32::MAX);
        roundtrip(u64::MAX);
    }

    #[test]
    fn test_record_id_roundtrip() {
        roundtrip(RecordId::new(0));
        roundtrip(RecordId::new(123_456_789));
        roundtrip(RecordId::EMPTY);
    }

    #[test]
    fn test_string_roundtrip() {
        roundtrip(String::new());
        roundtrip("hello".to_string());
        roundtrip("naïve ünïcode".to_string());
    }

    #[test]
    fn test_decode_consumes_prefix_only() {
        let mut buf = Vec::new();
        "ab".to_string().encode(&mut buf);
        42i64.encode(&mut buf);

        let (s, consumed) = String::decode(&buf).unwrap();
        assert_eq!(s, "ab");

        let (n, _) = i64::decode(&buf[consumed..]).unwrap();
        assert_eq!(n, 42);
    }

    #[test]
    fn test_decode_truncated_fails() {
        assert!(i64::decode(&[1, 2, 3]).is_err());

        let mut buf = Vec::new();
        "hello".to_string().encode(&mut buf);
        assert!(String::decode(&buf[..4]).is_err());
    }

    #[test]
    fn test_decode_invalid_utf8_fails() {
        let buf = [2u8, 0, 0xFF, 0xFE];
        assert!(String::decode(&buf).is_err());
    }
}
