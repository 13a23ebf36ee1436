//! [`BitPackedArray`]: a logical array of `N` entries, each up to 31 bits wide, backed by a byte
//! stream plus a value-dictionary that maps observed 64-bit values to small dense codes.
//! `bits_per_entry` starts at 1 and grows (by re-allocating and copying — expansion stays
//! out-of-place, see [`Self::expand`]) whenever a freshly assigned code no longer fits.
//!
//! The 8-byte unaligned segment load/store is the same trick a packed transposition-table
//! entry's fallback pack/unpack path uses to pull sub-word fields out of a 64-bit word,
//! generalized here to a *variable* bit width instead of a fixed layout; gated behind the
//! `unsafe` feature, with a portable byte-wise fallback always compiled in.

use crate::error::{Error, Res};
use std::collections::HashMap;

/// Maximum width: the dictionary's code index is treated as fitting a 31-bit unsigned range, and
/// a single 64-bit segment load must fully contain one entry.
const MAX_BITS_PER_ENTRY: u32 = 31;

pub struct BitPackedArray {
    stream: Vec<u8>,
    len: u64,
    bits_per_entry: u32,
    /// value -> code
    codes: HashMap<u64, u32>,
    /// code -> value, monotonically grown
    values: Vec<u64>,
}

impl BitPackedArray {
    pub fn new(len: u64) -> Res<Self> {
        let bits_per_entry = 1u32;
        let stream = vec![0u8; Self::stream_len(len, bits_per_entry)?];
        Ok(Self { stream, len, bits_per_entry, codes: HashMap::new(), values: Vec::new() })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits_per_entry(&self) -> u32 {
        self.bits_per_entry
    }

    fn stream_len(len: u64, bits: u32) -> Res<usize> {
        let total_bits = len.checked_mul(bits as u64).ok_or(Error::IntegerOverflow)?;
        let bytes = total_bits.div_ceil(8).checked_add(8).ok_or(Error::IntegerOverflow)?;
        usize::try_from(bytes).map_err(|_| Error::IntegerOverflow)
    }

    #[inline]
    fn check_index(&self, i: u64) -> Res<()> {
        if i >= self.len {
            return Err(Error::IllegalArgument(format!("index {i} out of range for length {}", self.len)));
        }
        Ok(())
    }

    fn read_code(stream: &[u8], i: u64, bits: u32) -> u32 {
        let bit = i * bits as u64;
        let byte = (bit / 8) as usize;
        let local = (bit % 8) as u32;
        let word = load_segment(stream, byte);
        let mask = mask_for(bits) << local;
        ((word & mask) >> local) as u32
    }

    fn write_code(stream: &mut [u8], i: u64, bits: u32, code: u32) {
        let bit = i * bits as u64;
        let byte = (bit / 8) as usize;
        let local = (bit % 8) as u32;
        let mask = mask_for(bits) << local;
        let word = load_segment(stream, byte);
        let word = (word & !mask) | ((code as u64) << local);
        store_segment(stream, byte, word);
    }

    /// Look up or insert `value` in the dictionary, growing it monotonically.
    fn code_for(&mut self, value: u64) -> Res<u32> {
        if let Some(&code) = self.codes.get(&value) {
            return Ok(code);
        }
        let code = u32::try_from(self.values.len()).map_err(|_| Error::MemoryOverflow)?;
        self.values.push(value);
        self.codes.insert(value, code);
        Ok(code)
    }

    /// Grows `bits_per_entry` by 1 and copies every entry into a freshly allocated, wider stream.
    /// Out-of-place: an in-place expansion (rewriting backwards inside a single larger
    /// allocation) is a legal future optimization but not implemented here.
    fn expand(&mut self) -> Res<()> {
        let new_bits = self.bits_per_entry + 1;
        if new_bits > MAX_BITS_PER_ENTRY {
            return Err(Error::MemoryOverflow);
        }
        let mut new_stream = vec![0u8; Self::stream_len(self.len, new_bits)?];
        for i in 0..self.len {
            let code = Self::read_code(&self.stream, i, self.bits_per_entry);
            Self::write_code(&mut new_stream, i, new_bits, code);
        }
        self.stream = new_stream;
        self.bits_per_entry = new_bits;
        Ok(())
    }

    pub fn get(&self, i: u64) -> Res<u64> {
        self.check_index(i)?;
        let code = Self::read_code(&self.stream, i, self.bits_per_entry);
        self.values
            .get(code as usize)
            .copied()
            .ok_or(Error::UnreachableBranch("bit-packed array code has no dictionary entry"))
    }

    pub fn set(&mut self, i: u64, value: u64) -> Res<()> {
        self.check_index(i)?;
        let code = self.code_for(value)?;
        while code >= (1u32 << self.bits_per_entry) {
            self.expand()?;
        }
        Self::write_code(&mut self.stream, i, self.bits_per_entry, code);
        Ok(())
    }
}

fn mask_for(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[cfg(feature = "unsafe")]
fn load_segment(stream: &[u8], byte: usize) -> u64 {
    debug_assert!(byte + 8 <= stream.len(), "segment load out of bounds: missing tail padding");
    // SAFETY: `stream` always carries 8 bytes of tail padding beyond any entry's last touched
    // byte (see `stream_len`), so an 8-byte unaligned read starting at `byte` never runs past
    // the allocation.
    unsafe { (stream.as_ptr().add(byte) as *const u64).read_unaligned() }
}

#[cfg(not(feature = "unsafe"))]
fn load_segment(stream: &[u8], byte: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&stream[byte..byte + 8]);
    u64::from_ne_bytes(buf)
}

#[cfg(feature = "unsafe")]
fn store_segment(stream: &mut [u8], byte: usize, word: u64) {
    debug_assert!(byte + 8 <= stream.len(), "segment store out of bounds: missing tail padding");
    // SAFETY: see `load_segment`.
    unsafe { (stream.as_mut_ptr().add(byte) as *mut u64).write_unaligned(word) };
}

#[cfg(not(feature = "unsafe"))]
fn store_segment(stream: &mut [u8], byte: usize, word: u64) {
    stream[byte..byte + 8].copy_from_slice(&word.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_round_trip() {
        let mut arr = BitPackedArray::new(100).unwrap();
        for i in 0..100u64 {
            arr.set(i, (i * 37) % 50).unwrap();
        }
        for i in 0..100u64 {
            assert_eq!(arr.get(i).unwrap(), (i * 37) % 50);
        }
    }

    #[test]
    fn bits_per_entry_never_decreases() {
        let mut arr = BitPackedArray::new(10).unwrap();
        let mut last = arr.bits_per_entry();
        for v in 0..40u64 {
            arr.set(0, v).unwrap();
            assert!(arr.bits_per_entry() >= last);
            last = arr.bits_per_entry();
        }
    }

    #[test]
    fn expansion_from_one_to_two_bits() {
        let mut arr = BitPackedArray::new(4).unwrap();
        assert_eq!(arr.bits_per_entry(), 1);
        arr.set(0, 0).unwrap();
        arr.set(1, 1).unwrap();
        assert_eq!(arr.bits_per_entry(), 1);
        arr.set(2, 2).unwrap();
        assert_eq!(arr.bits_per_entry(), 2);
        assert_eq!(arr.get(0).unwrap(), 0);
        assert_eq!(arr.get(1).unwrap(), 1);
        assert_eq!(arr.get(2).unwrap(), 2);
        assert_eq!(arr.get(3).unwrap(), 0);
    }

    #[test]
    fn repeated_value_reuses_code() {
        let mut arr = BitPackedArray::new(8).unwrap();
        for i in 0..8 {
            arr.set(i, 42).unwrap();
        }
        assert_eq!(arr.bits_per_entry(), 1);
        for i in 0..8u64 {
            assert_eq!(arr.get(i).unwrap(), 42);
        }
    }

    #[test]
    fn out_of_range_index_errors() {
        let arr = BitPackedArray::new(4).unwrap();
        assert!(arr.get(4).is_err());
    }

    #[test]
    fn large_value_count_grows_past_single_byte() {
        let mut arr = BitPackedArray::new(300).unwrap();
        for i in 0..300u64 {
            arr.set(i, i).unwrap();
        }
        assert!(arr.bits_per_entry() >= 9);
        for i in 0..300u64 {
            assert_eq!(arr.get(i).unwrap(), i);
        }
    }
}
