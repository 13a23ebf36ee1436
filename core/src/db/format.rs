//! On-disk framing: a single file holding independently-decodable, fixed-size LZMA2-via-`xz2`
//! blocks plus a small trailing index, enabling random access to any block without decompressing
//! the whole file. `xz2` (the standard Rust binding to liblzma) doesn't expose liblzma's own
//! block-index API, so the index is ours: each block is written as its own complete XZ stream
//! (valid concatenated XZ, decodable independently), and a footer records where each one starts.
//!
//! Checkpoints use `lz4_flex`'s block API (`compress_prepend_size`/`decompress_size_prepended`),
//! the same crate an LSM-tree storage engine reaches for to compress an optional segment.

use crate::error::{Error, Res};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Default uncompressed block size (1 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;
/// Default xz compression level (0-9).
pub const DEFAULT_LEVEL: u32 = 6;

/// liblzma's `LZMA_PRESET_EXTREME` flag (bit 31 of the preset word), ORed into the level when
/// extreme mode is requested.
const LZMA_PRESET_EXTREME: u32 = 1 << 31;

const MAGIC: [u8; 8] = *b"GM1TIERD";

struct BlockIndexEntry {
    compressed_offset: u64,
    compressed_len: u64,
    uncompressed_len: u64,
}

const INDEX_ENTRY_SIZE: u64 = 24;
/// Footer: `index_offset: u64`, `block_count: u64`, `magic: [u8; 8]`.
const FOOTER_SIZE: u64 = 8 + 8 + 8;

#[derive(Clone, Copy)]
pub struct XzOptions {
    pub block_size: usize,
    pub level: u32,
    pub extreme: bool,
}

impl Default for XzOptions {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, level: DEFAULT_LEVEL, extreme: false }
    }
}

impl XzOptions {
    fn preset(&self) -> u32 {
        if self.extreme {
            self.level | LZMA_PRESET_EXTREME
        } else {
            self.level
        }
    }
}

/// Compresses `raw` to `tmp_path` block by block, then atomically renames it to `final_path`.
pub fn write_blocked_xz_atomic(
    final_path: &Path,
    tmp_path: &Path,
    raw: &[u8],
    opts: XzOptions,
) -> Res<()> {
    let file = File::create(tmp_path)?;
    let mut writer = BufWriter::new(file);
    let mut index = Vec::new();
    let mut offset = 0u64;
    let block_size = opts.block_size.max(1);

    for chunk in raw.chunks(block_size) {
        let mut encoder = XzEncoder::new(Vec::new(), opts.preset());
        encoder.write_all(chunk)?;
        let compressed = encoder.finish()?;
        writer.write_all(&compressed)?;
        index.push(BlockIndexEntry {
            compressed_offset: offset,
            compressed_len: compressed.len() as u64,
            uncompressed_len: chunk.len() as u64,
        });
        offset += compressed.len() as u64;
    }

    let index_offset = offset;
    for entry in &index {
        writer.write_all(&entry.compressed_offset.to_le_bytes())?;
        writer.write_all(&entry.compressed_len.to_le_bytes())?;
        writer.write_all(&entry.uncompressed_len.to_le_bytes())?;
    }
    writer.write_all(&index_offset.to_le_bytes())?;
    writer.write_all(&(index.len() as u64).to_le_bytes())?;
    writer.write_all(&MAGIC)?;
    writer.flush()?;
    drop(writer);

    std::fs::rename(tmp_path, final_path)?;
    Ok(())
}

/// Decompresses an entire blocked-xz file into memory (used by `LoadTier`, which always wants
/// the whole sibling tier resident).
pub fn read_blocked_xz_full(path: &Path) -> Res<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let index = parse_index(&bytes)?;
    let mut out = Vec::new();
    for entry in &index {
        let start = entry.compressed_offset as usize;
        let end = start + entry.compressed_len as usize;
        let mut decoder = XzDecoder::new(&bytes[start..end]);
        let mut chunk = Vec::with_capacity(entry.uncompressed_len as usize);
        decoder.read_to_end(&mut chunk)?;
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// A file handle plus its parsed block index, reused across `ProbeValue`/`ProbeRemoteness` calls
/// on the same tier, with the most recently decoded block cached.
pub struct BlockReader {
    bytes: Vec<u8>,
    index: Vec<BlockIndexEntry>,
    block_size: usize,
    cached_block: Option<(usize, Vec<u8>)>,
}

impl BlockReader {
    pub fn open(path: &Path) -> Res<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let index = parse_index(&bytes)?;
        let block_size =
            index.first().map(|e| e.uncompressed_len as usize).unwrap_or(DEFAULT_BLOCK_SIZE).max(1);
        Ok(Self { bytes, index, block_size, cached_block: None })
    }

    /// Returns the decompressed byte at `uncompressed_offset`, decompressing (and caching) the
    /// containing block as needed.
    pub fn byte_at(&mut self, uncompressed_offset: u64) -> Res<u8> {
        let block_no = (uncompressed_offset as usize) / self.block_size;
        let local = (uncompressed_offset as usize) % self.block_size;
        if self.cached_block.as_ref().map(|(n, _)| *n) != Some(block_no) {
            let entry = self
                .index
                .get(block_no)
                .ok_or(Error::UnreachableBranch("tier db block index out of range"))?;
            let start = entry.compressed_offset as usize;
            let end = start + entry.compressed_len as usize;
            let mut decoder = XzDecoder::new(&self.bytes[start..end]);
            let mut chunk = Vec::with_capacity(entry.uncompressed_len as usize);
            decoder.read_to_end(&mut chunk)?;
            self.cached_block = Some((block_no, chunk));
        }
        let (_, chunk) = self.cached_block.as_ref().unwrap();
        chunk
            .get(local)
            .copied()
            .ok_or(Error::UnreachableBranch("tier db block offset out of range"))
    }

    /// Reads `len` contiguous decompressed bytes starting at `uncompressed_offset`. Used to pull
    /// out a whole 2-byte record; may span a block boundary.
    pub fn read_at(&mut self, uncompressed_offset: u64, len: usize) -> Res<Vec<u8>> {
        (0..len as u64).map(|i| self.byte_at(uncompressed_offset + i)).collect()
    }
}

fn parse_index(bytes: &[u8]) -> Res<Vec<BlockIndexEntry>> {
    let len = bytes.len() as u64;
    if len < FOOTER_SIZE {
        return Err(Error::FileSystem(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "tier db file too short for footer",
        )));
    }
    let footer_start = (len - FOOTER_SIZE) as usize;
    let magic = &bytes[footer_start + 16..footer_start + 24];
    if magic != MAGIC {
        return Err(Error::FileSystem(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "tier db file footer magic mismatch",
        )));
    }
    let index_offset = u64::from_le_bytes(bytes[footer_start..footer_start + 8].try_into().unwrap());
    let block_count =
        u64::from_le_bytes(bytes[footer_start + 8..footer_start + 16].try_into().unwrap());

    let expected_index_bytes = block_count.checked_mul(INDEX_ENTRY_SIZE).ok_or(Error::IntegerOverflow)?;
    if index_offset + expected_index_bytes != len - FOOTER_SIZE {
        return Err(Error::FileSystem(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "tier db file index size mismatch",
        )));
    }

    let mut index = Vec::with_capacity(block_count as usize);
    let mut cursor = index_offset as usize;
    for _ in 0..block_count {
        let compressed_offset = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        let compressed_len = u64::from_le_bytes(bytes[cursor + 8..cursor + 16].try_into().unwrap());
        let uncompressed_len = u64::from_le_bytes(bytes[cursor + 16..cursor + 24].try_into().unwrap());
        index.push(BlockIndexEntry { compressed_offset, compressed_len, uncompressed_len });
        cursor += INDEX_ENTRY_SIZE as usize;
    }
    Ok(index)
}

/// Returns `true` iff `path` exists and decodes as a well-formed blocked-xz file.
pub fn is_decodable(path: &Path) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => parse_index(&bytes).is_ok(),
        Err(_) => false,
    }
}

/// LZ4-compresses `record_bytes ++ status_blob` as one block (`compress_prepend_size` prefixes
/// the combined length) and writes it atomically via a `.tmp` sibling, the same rename-based
/// atomicity as [`write_blocked_xz_atomic`].
pub fn write_checkpoint_atomic(
    final_path: &Path,
    tmp_path: &Path,
    record_bytes: &[u8],
    status_blob: &[u8],
) -> Res<()> {
    let mut combined = Vec::with_capacity(record_bytes.len() + status_blob.len());
    combined.extend_from_slice(record_bytes);
    combined.extend_from_slice(status_blob);
    let compressed = lz4_flex::compress_prepend_size(&combined);
    std::fs::write(tmp_path, compressed)?;
    std::fs::rename(tmp_path, final_path)?;
    Ok(())
}

/// Inverse of [`write_checkpoint_atomic`]: splits the decompressed buffer into
/// `(record_bytes, status_blob)` given the known record-array length.
pub fn read_checkpoint(path: &Path, record_bytes_len: usize) -> Res<(Vec<u8>, Vec<u8>)> {
    let compressed = std::fs::read(path)?;
    let combined = lz4_flex::decompress_size_prepended(&compressed)
        .map_err(|e| Error::Runtime(format!("corrupt checkpoint: {e}")))?;
    if combined.len() < record_bytes_len {
        return Err(Error::Runtime("checkpoint shorter than the expected record array".into()));
    }
    let (record_bytes, status_blob) = combined.split_at(record_bytes_len);
    Ok((record_bytes.to_vec(), status_blob.to_vec()))
}

/// LZ4-compresses an arbitrary byte buffer (used for the one-bit worker's discovery-map
/// persistence).
pub fn write_lz4_atomic(final_path: &Path, tmp_path: &Path, raw: &[u8]) -> Res<()> {
    let compressed = lz4_flex::compress_prepend_size(raw);
    std::fs::write(tmp_path, compressed)?;
    std::fs::rename(tmp_path, final_path)?;
    Ok(())
}

pub fn read_lz4(path: &Path) -> Res<Vec<u8>> {
    let compressed = std::fs::read(path)?;
    lz4_flex::decompress_size_prepended(&compressed).map_err(|e| Error::Runtime(format!("corrupt lz4 blob: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn blocked_xz_round_trip_single_block() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("t.adb.xz");
        let tmp_path = dir.path().join("t.adb.xz.tmp");
        let raw: Vec<u8> = (0..2000u32).flat_map(|v| (v as u16).to_ne_bytes()).collect();
        write_blocked_xz_atomic(&final_path, &tmp_path, &raw, XzOptions::default()).unwrap();
        assert!(!tmp_path.exists());
        let restored = read_blocked_xz_full(&final_path).unwrap();
        assert_eq!(restored, raw);
    }

    #[test]
    fn blocked_xz_round_trip_multi_block_probe() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("t.adb.xz");
        let tmp_path = dir.path().join("t.adb.xz.tmp");
        let raw: Vec<u8> = (0..500_000u32).map(|v| (v % 251) as u8).collect();
        let opts = XzOptions { block_size: 4096, level: 1, extreme: false };
        write_blocked_xz_atomic(&final_path, &tmp_path, &raw, opts).unwrap();

        let mut reader = BlockReader::open(&final_path).unwrap();
        for offset in [0u64, 4095, 4096, 300_000, 499_999] {
            assert_eq!(reader.byte_at(offset).unwrap(), raw[offset as usize]);
        }
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("t.chk");
        let tmp_path = dir.path().join("t.chk.tmp");
        let record_bytes = vec![7u8; 40];
        let status = 0xDEADBEEFu32.to_le_bytes();
        write_checkpoint_atomic(&final_path, &tmp_path, &record_bytes, &status).unwrap();
        let (restored_records, restored_status) = read_checkpoint(&final_path, 40).unwrap();
        assert_eq!(restored_records, record_bytes);
        assert_eq!(restored_status, status);
    }
}
