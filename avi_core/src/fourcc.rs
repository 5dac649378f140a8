//! Four-byte RIFF/AVI tags (§3).

use std::fmt;

/// A 4-byte tag, stored as the little-endian `u32` it occupies on disk.
///
/// Equality is on that `u32` value, matching the spec: two `FourCC`s built
/// from the same bytes compare equal regardless of how they were
/// constructed (from a string or from raw bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub u32);

impl FourCC {
    /// Build from the 4 on-disk bytes (little-endian `u32`).
    pub const fn from_bytes(bytes: &[u8; 4]) -> Self {
        FourCC(u32::from_le_bytes(*bytes))
    }

    /// Build from an ASCII string of at most 4 bytes, right-padded with
    /// spaces (e.g. `"AVI "`, `"avih"`).
    pub fn from_ascii(s: &str) -> Self {
        assert!(
            s.is_ascii() && s.len() <= 4,
            "FourCC string must be ASCII and at most 4 bytes, got {s:?}"
        );
        let mut bytes = [b' '; 4];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Self::from_bytes(&bytes)
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// The raw on-disk `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        match std::str::from_utf8(&bytes) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "FourCC({s:?})"),
            _ => write!(f, "FourCC({bytes:?})"),
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        match std::str::from_utf8(&bytes) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{s}"),
            _ => write!(f, "{bytes:?}"),
        }
    }
}

/// Builds the two-digit-decimal stream chunk id `"##xx"` (§3): `xx` is one
/// of `db`/`dc`/`wb`, `##` is the stream's zero-padded decimal index.
pub fn stream_chunk_id(index: u8, suffix: &[u8; 2]) -> FourCC {
    assert!(index < 100, "stream index must be 0..99, got {index}");
    let tens = b'0' + (index / 10);
    let ones = b'0' + (index % 10);
    FourCC::from_bytes(&[tens, ones, suffix[0], suffix[1]])
}

/// Builds the per-RIFF standard-index chunk id `"ix##"` (§3).
pub fn standard_index_chunk_id(index: u8) -> FourCC {
    assert!(index < 100, "stream index must be 0..99, got {index}");
    let tens = b'0' + (index / 10);
    let ones = b'0' + (index % 10);
    FourCC::from_bytes(&[b'i', b'x', tens, ones])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let fcc = FourCC::from_bytes(b"RIFF");
        assert_eq!(FourCC::from_bytes(&fcc.to_bytes()), fcc);
    }

    #[test]
    fn ascii_right_pads_with_spaces() {
        let fcc = FourCC::from_ascii("AVI");
        assert_eq!(&fcc.to_bytes(), b"AVI ");
        let fcc2 = FourCC::from_ascii("AVI ");
        assert_eq!(fcc, fcc2);
    }

    #[test]
    fn equality_is_on_the_u32_value() {
        assert_eq!(FourCC::from_ascii("movi"), FourCC::from_bytes(b"movi"));
        assert_ne!(FourCC::from_ascii("movi"), FourCC::from_ascii("MOVI"));
    }

    #[test]
    fn stream_chunk_ids() {
        assert_eq!(stream_chunk_id(0, b"db").to_bytes(), *b"00db");
        assert_eq!(stream_chunk_id(7, b"wb").to_bytes(), *b"07wb");
        assert_eq!(stream_chunk_id(42, b"dc").to_bytes(), *b"42dc");
        assert_eq!(standard_index_chunk_id(3).to_bytes(), *b"ix03");
    }

    #[test]
    #[should_panic]
    fn stream_chunk_id_rejects_out_of_range_index() {
        stream_chunk_id(100, b"db");
    }
}
