//! [`RecordArray`]: a dense `tier_size`-entry array of packed 16-bit
//! [`Record`](crate::model::Record)s. Modeled the same way as a packed transposition-table
//! entry's pack/unpack pair: a fixed-width packed value, no dynamic dispatch, decoded on read.
//! Backed by `Box<[AtomicU16]>` rather than a plain byte buffer: concurrent readers and
//! disjoint-position writers only need "no locks, no torn reads", which `AtomicU16` with
//! `Relaxed` ordering gives for free without a hand-rolled unsafe aliasing story (each position
//! is written by exactly one thread within a given sweep).

use crate::error::{Error, Res};
use crate::model::{Position, Record, Remoteness, Value};
use std::sync::atomic::{AtomicU16, Ordering};

pub struct RecordArray {
    records: Box<[AtomicU16]>,
}

impl RecordArray {
    /// Allocates `size` records, all reading as `(Undecided, 0)` — the record encoding's zero
    /// value — without an explicit initialization pass.
    pub fn new(size: u64) -> Res<Self> {
        let size = usize::try_from(size).map_err(|_| Error::IntegerOverflow)?;
        let mut records = Vec::new();
        records.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        records.resize_with(size, || AtomicU16::new(0));
        Ok(Self { records: records.into_boxed_slice() })
    }

    pub fn size(&self) -> u64 {
        self.records.len() as u64
    }

    #[inline]
    fn index(&self, pos: Position) -> Res<usize> {
        let idx = pos.0 as usize;
        if idx >= self.records.len() {
            return Err(Error::IllegalGamePosition(pos.0));
        }
        Ok(idx)
    }

    pub fn get_record(&self, pos: Position) -> Res<Record> {
        Ok(Record(self.records[self.index(pos)?].load(Ordering::Relaxed)))
    }

    pub fn set_record(&self, pos: Position, record: Record) -> Res<()> {
        self.records[self.index(pos)?].store(record.0, Ordering::Relaxed);
        Ok(())
    }

    pub fn get_value(&self, pos: Position) -> Res<Value> {
        Ok(self.get_record(pos)?.value())
    }

    pub fn get_remoteness(&self, pos: Position) -> Res<Remoteness> {
        Ok(self.get_record(pos)?.remoteness())
    }

    pub fn set_value(&self, pos: Position, value: Value) -> Res<()> {
        let idx = self.index(pos)?;
        let remoteness = Record(self.records[idx].load(Ordering::Relaxed)).remoteness();
        self.records[idx].store(Record::encode(value, remoteness).0, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_remoteness(&self, pos: Position, remoteness: Remoteness) -> Res<()> {
        let idx = self.index(pos)?;
        let value = Record(self.records[idx].load(Ordering::Relaxed)).value();
        self.records[idx].store(Record::encode(value, remoteness).0, Ordering::Relaxed);
        Ok(())
    }

    /// Flattens the array into raw bytes (little-endian `u16`s) for the on-disk format. The
    /// `unsafe` feature reinterprets the backing buffer directly instead of copying
    /// element-by-element, the same fast-path/fallback split as `TTEntry::pack_into`/
    /// `pack_fallback`.
    pub fn to_bytes(&self) -> Vec<u8> {
        #[cfg(feature = "unsafe")]
        {
            // SAFETY: `AtomicU16` has the same size, alignment and bit validity as `u16`; no
            // other thread may be concurrently resizing `self.records` (it's a fixed-size boxed
            // slice), so reading through a raw byte view here is sound as long as readers don't
            // race a `store` to the *same* element — which the solver never does across a flush.
            unsafe {
                let ptr = self.records.as_ptr().cast::<u8>();
                std::slice::from_raw_parts(ptr, self.records.len() * 2).to_vec()
            }
        }
        #[cfg(not(feature = "unsafe"))]
        {
            let mut out = Vec::with_capacity(self.records.len() * 2);
            for r in self.records.iter() {
                out.extend_from_slice(&r.load(Ordering::Relaxed).to_ne_bytes());
            }
            out
        }
    }

    /// Inverse of [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Res<Self> {
        if bytes.len() % 2 != 0 {
            return Err(Error::Runtime("record array byte length must be even".into()));
        }
        let mut records = Vec::with_capacity(bytes.len() / 2);
        for chunk in bytes.chunks_exact(2) {
            records.push(AtomicU16::new(u16::from_ne_bytes([chunk[0], chunk[1]])));
        }
        Ok(Self { records: records.into_boxed_slice() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_array_reads_undecided() {
        let arr = RecordArray::new(16).unwrap();
        assert_eq!(arr.get_value(Position(5)).unwrap(), Value::Undecided);
        assert_eq!(arr.get_remoteness(Position(5)).unwrap(), 0);
    }

    #[test]
    fn set_value_preserves_remoteness_and_vice_versa() {
        let arr = RecordArray::new(4).unwrap();
        arr.set_remoteness(Position(1), 7).unwrap();
        arr.set_value(Position(1), Value::Win).unwrap();
        assert_eq!(arr.get_value(Position(1)).unwrap(), Value::Win);
        assert_eq!(arr.get_remoteness(Position(1)).unwrap(), 7);
    }

    #[test]
    fn out_of_range_position_errors() {
        let arr = RecordArray::new(2).unwrap();
        assert!(arr.get_value(Position(2)).is_err());
    }

    #[test]
    fn byte_round_trip() {
        let arr = RecordArray::new(10).unwrap();
        for i in 0..10 {
            arr.set_value(Position(i), Value::Tie).unwrap();
            arr.set_remoteness(Position(i), i as Remoteness).unwrap();
        }
        let bytes = arr.to_bytes();
        assert_eq!(bytes.len(), 20);
        let restored = RecordArray::from_bytes(&bytes).unwrap();
        for i in 0..10 {
            assert_eq!(restored.get_value(Position(i)).unwrap(), Value::Tie);
            assert_eq!(restored.get_remoteness(Position(i)).unwrap(), i as Remoteness);
        }
    }

    #[test]
    fn parallel_writes_to_disjoint_positions() {
        use std::sync::Arc;
        let arr = Arc::new(RecordArray::new(1000).unwrap());
        std::thread::scope(|scope| {
            for t in 0..4 {
                let arr = Arc::clone(&arr);
                scope.spawn(move || {
                    for i in (t..1000).step_by(4) {
                        arr.set_value(Position(i as u64), Value::Win).unwrap();
                        arr.set_remoteness(Position(i as u64), i as Remoteness).unwrap();
                    }
                });
            }
        });
        for i in 0..1000u64 {
            assert_eq!(arr.get_value(Position(i)).unwrap(), Value::Win);
            assert_eq!(arr.get_remoteness(Position(i)).unwrap(), i as Remoteness);
        }
    }
}
