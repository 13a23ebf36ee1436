//! [`ConcurrentBitset`]: a lock-free fixed-size set of `[0, N)` indices. Modeled directly on
//! `motors::search::tt::AtomicTTEntry`/`TTBucket` — a flat `Box<[AtomicU64]>`, no locks, no
//! CAS loop on the hot path (`fetch_or`/`fetch_and` suffice for single-bit set/reset), with the
//! caller-supplied [`Ordering`] threaded through every call the way
//! `multithreading::AtomicSearchState` threads `Relaxed`/`Acquire`/`Release` through its fields.

use crate::error::{Error, Res};
use crate::mem::{BlockAllocator, Blocks, GlobalAllocator};
use std::sync::atomic::{AtomicU64, Ordering};

/// `num_bits` bits laid out as `ceil(num_bits/64)` 64-bit blocks. Bit `i`'s logical value is bit
/// `i mod 64` of block `i div 64`.
#[derive(Debug)]
pub struct ConcurrentBitset {
    blocks: Blocks,
    num_bits: u64,
}

fn num_blocks(num_bits: u64) -> Res<usize> {
    usize::try_from(num_bits.div_ceil(64)).map_err(|_| Error::IntegerOverflow)
}

impl ConcurrentBitset {
    /// Allocates `ceil(n/64)` zeroed 64-bit blocks via the [`GlobalAllocator`].
    pub fn create(n: u64) -> Res<Self> {
        Self::create_with_allocator(n, &GlobalAllocator)
    }

    /// As [`Self::create`], but the backing storage comes from a borrowed allocator.
    pub fn create_with_allocator(n: u64, allocator: &dyn BlockAllocator) -> Res<Self> {
        if n == 0 {
            return Err(Error::IllegalArgument("bitset size must be positive".into()));
        }
        let blocks = allocator.alloc_u64_blocks(num_blocks(n)?)?;
        Ok(Self { blocks, num_bits: n })
    }

    pub fn len(&self) -> u64 {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    #[inline]
    fn locate(&self, i: u64) -> (usize, u64) {
        debug_assert!(i < self.num_bits, "bit index {i} out of range for a {}-bit set", self.num_bits);
        ((i / 64) as usize, i % 64)
    }

    /// Atomically ORs the bit in under `order`; returns the previous value.
    pub fn set(&self, i: u64, order: Ordering) -> bool {
        let (block, bit) = self.locate(i);
        let mask = 1u64 << bit;
        (self.blocks[block].fetch_or(mask, order) & mask) != 0
    }

    /// Atomically ANDs the bit out under `order`; returns the previous value.
    pub fn reset(&self, i: u64, order: Ordering) -> bool {
        let (block, bit) = self.locate(i);
        let mask = 1u64 << bit;
        (self.blocks[block].fetch_and(!mask, order) & mask) != 0
    }

    /// Atomic load of the bit's block, masked.
    pub fn test(&self, i: u64, order: Ordering) -> bool {
        let (block, bit) = self.locate(i);
        (self.blocks[block].load(order) & (1u64 << bit)) != 0
    }

    /// Not thread-safe: clears every block. Callers must externally synchronize.
    pub fn reset_all(&mut self) {
        for block in self.blocks.iter() {
            block.store(0, Ordering::Relaxed);
        }
    }

    /// Exact byte length a [`Self::serialize`] call writes.
    pub fn serialized_size(&self) -> usize {
        self.blocks.len() * 8
    }

    /// Writes blocks in native byte order. Not thread-safe.
    pub fn serialize(&self, buf: &mut [u8]) -> Res<()> {
        if buf.len() != self.serialized_size() {
            return Err(Error::IllegalArgument(format!(
                "serialize buffer must be exactly {} bytes, got {}",
                self.serialized_size(),
                buf.len()
            )));
        }
        for (block, chunk) in self.blocks.iter().zip(buf.chunks_exact_mut(8)) {
            chunk.copy_from_slice(&block.load(Ordering::Relaxed).to_ne_bytes());
        }
        Ok(())
    }

    /// Inverse of [`Self::serialize`]. Assumes `buf` was produced by a bitset of the same `n`.
    /// Not thread-safe.
    pub fn deserialize(&mut self, buf: &[u8]) -> Res<()> {
        if buf.len() != self.serialized_size() {
            return Err(Error::IllegalArgument(format!(
                "deserialize buffer must be exactly {} bytes, got {}",
                self.serialized_size(),
                buf.len()
            )));
        }
        for (block, chunk) in self.blocks.iter().zip(buf.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            block.store(u64::from_ne_bytes(raw), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Snapshot copy from `other` into `self`. Not thread-safe; both bitsets must have the same
    /// `num_bits`.
    pub fn copy_from(&mut self, other: &Self) -> Res<()> {
        if self.num_bits != other.num_bits {
            return Err(Error::IllegalArgument("bitset size mismatch in copy".into()));
        }
        for (dst, src) in self.blocks.iter().zip(other.blocks.iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn create_rejects_zero() {
        assert!(matches!(ConcurrentBitset::create(0), Err(Error::IllegalArgument(_))));
    }

    #[test]
    fn set_reset_test_round_trip() {
        let bs = ConcurrentBitset::create(130).unwrap();
        assert!(!bs.test(0, Ordering::Acquire));
        assert!(!bs.set(0, Ordering::Release));
        assert!(bs.test(0, Ordering::Acquire));
        assert!(!bs.set(129, Ordering::Release));
        assert!(bs.test(129, Ordering::Acquire));
        assert!(bs.reset(0, Ordering::AcqRel));
        assert!(!bs.test(0, Ordering::Acquire));
    }

    #[test]
    fn set_idempotence() {
        let bs = ConcurrentBitset::create(8).unwrap();
        assert!(!bs.set(3, Ordering::SeqCst));
        assert!(bs.set(3, Ordering::SeqCst));
        assert!(bs.test(3, Ordering::SeqCst));
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let mut bs = ConcurrentBitset::create(200).unwrap();
        for i in (0..200).step_by(7) {
            bs.set(i, Ordering::Relaxed);
        }
        let mut buf = vec![0u8; bs.serialized_size()];
        bs.serialize(&mut buf).unwrap();

        let mut other = ConcurrentBitset::create(200).unwrap();
        other.deserialize(&buf).unwrap();
        for i in 0..200u64 {
            assert_eq!(bs.test(i, Ordering::Relaxed), other.test(i, Ordering::Relaxed));
        }
    }

    #[test]
    fn concurrent_strided_set_covers_every_bit() {
        // k threads each set i*k+thread_id for i in [0, N/k); every bit ends up set.
        let k = 8u64;
        let n = 8_000u64;
        let bs = Arc::new(ConcurrentBitset::create(n).unwrap());
        let handles: Vec<_> = (0..k)
            .map(|tid| {
                let bs = Arc::clone(&bs);
                thread::spawn(move || {
                    let mut i = 0u64;
                    while i * k + tid < n {
                        bs.set(i * k + tid, Ordering::AcqRel);
                        i += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for j in 0..n {
            assert!(bs.test(j, Ordering::Acquire), "bit {j} should be set");
        }
    }
}
