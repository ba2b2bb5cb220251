//! `index.bin` binary layout
//!
//! ```text
//! Offset   Size     Type        Description
//! ──────────────────────────────────────────────────────────
//! 0x00     8        [u8; 8]     Magic: "SSIDX001"
//! 0x08     4        u32 LE      Format version
//! 0x0C     4        u32 LE      Metric code (0 = cosine)
//! 0x10     8        u64 LE      N: number of rows
//! 0x18     8        u64 LE      K: embedding dimension
//! 0x20     ...      N x (u32 LE length + UTF-8 bytes)   track ids
//! ...      N*K*8    [f64 LE]    row-major embeddings
//! ```
//!
//! Floats are stored bit-exact, so a load reproduces the index that was
//! saved.

use songspace_core::TrackId;

use crate::error::PersistenceError;
use crate::index::{FlatIndex, Metric};

pub const INDEX_MAGIC: [u8; 8] = *b"SSIDX001";
pub const INDEX_FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 32;

fn metric_code(metric: Metric) -> u32 {
    match metric {
        Metric::Cosine => 0,
    }
}

fn metric_from_code(code: u32) -> Option<Metric> {
    match code {
        0 => Some(Metric::Cosine),
        _ => None,
    }
}

/// Serialize an index to its binary form.
#[must_use]
pub fn encode_index(index: &FlatIndex) -> Vec<u8> {
    let id_bytes: usize = index.ids().iter().map(|id| 4 + id.as_str().len()).sum();
    let mut buf = Vec::with_capacity(HEADER_SIZE + id_bytes + index.data().len() * 8);
    buf.extend_from_slice(&INDEX_MAGIC);
    buf.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&metric_code(index.metric()).to_le_bytes());
    buf.extend_from_slice(&(index.len() as u64).to_le_bytes());
    buf.extend_from_slice(&(index.dim() as u64).to_le_bytes());
    for id in index.ids() {
        let bytes = id.as_str().as_bytes();
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    for value in index.data() {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

/// Parse an index from its binary form.
///
/// # Errors
/// Returns `PersistenceError::InvalidFormat` for truncated, oversized, or
/// otherwise malformed input and `UnsupportedVersion` for a newer layout.
pub fn decode_index(bytes: &[u8]) -> Result<FlatIndex, PersistenceError> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.take(8)? != INDEX_MAGIC {
        return Err(invalid("bad magic bytes"));
    }
    let version = reader.u32()?;
    if version != INDEX_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            artifact: "index",
            found: version,
            expected: INDEX_FORMAT_VERSION,
        });
    }
    let metric = metric_from_code(reader.u32()?).ok_or_else(|| invalid("unknown metric code"))?;
    let n = usize::try_from(reader.u64()?).map_err(|_| invalid("row count overflows"))?;
    let dim = usize::try_from(reader.u64()?).map_err(|_| invalid("dimension overflows"))?;

    let values = n
        .checked_mul(dim)
        .filter(|v| v.checked_mul(8).is_some_and(|b| b <= bytes.len()))
        .ok_or_else(|| invalid("header sizes exceed file length"))?;

    let mut ids = Vec::with_capacity(n.min(bytes.len() / 4));
    for _ in 0..n {
        let len = reader.u32()? as usize;
        let raw = reader.take(len)?;
        let text = std::str::from_utf8(raw).map_err(|_| invalid("track id is not UTF-8"))?;
        ids.push(TrackId::new(text).map_err(|e| invalid(&e.to_string()))?);
    }

    let mut data = Vec::with_capacity(values);
    for _ in 0..values {
        data.push(f64::from_le_bytes(reader.array()?));
    }
    if reader.pos != bytes.len() {
        return Err(invalid("trailing bytes after embeddings"));
    }

    FlatIndex::from_parts(metric, dim, ids, data).map_err(|e| invalid(&e.to_string()))
}

fn invalid(message: &str) -> PersistenceError {
    PersistenceError::InvalidFormat {
        artifact: "index",
        message: message.to_string(),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], PersistenceError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| invalid("unexpected end of file"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PersistenceError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, PersistenceError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, PersistenceError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIndex {
        FlatIndex::build(
            vec![TrackId::new("TRA").unwrap(), TrackId::new("TRß").unwrap()],
            vec![vec![0.6, 0.8], vec![0.1_f64.sqrt(), 0.9_f64.sqrt()]],
        )
        .unwrap()
    }

    #[test]
    fn test_decode_reproduces_index_exactly() {
        let index = sample();
        let decoded = decode_index(&encode_index(&index)).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode_index(&sample());
        assert_eq!(&bytes[0..8], b"SSIDX001");
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(bytes[24..32].try_into().unwrap()), 2);
    }

    #[test]
    fn test_rejects_truncated_and_corrupt_input() {
        let bytes = encode_index(&sample());
        assert!(decode_index(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_index(&bytes[..10]).is_err());

        let mut extra = bytes.clone();
        extra.push(0);
        assert!(decode_index(&extra).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(decode_index(&bad_magic).is_err());

        let mut future = bytes;
        future[8] = 9;
        assert!(matches!(
            decode_index(&future),
            Err(PersistenceError::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn test_rejects_absurd_header_sizes() {
        let mut bytes = encode_index(&sample());
        bytes[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(decode_index(&bytes).is_err());
    }
}
