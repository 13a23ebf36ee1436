//! [`TierDatabase`]: per-tier file creation, block-compressed flush, random-access probe,
//! load/unload of sibling tiers, and checkpointing. The loaded-tier cache is a process-wide
//! `Tier -> slot` map with a fixed maximum of simultaneously resident tiers (`>= 256`); slot 0
//! is reserved for the tier currently being solved and is held directly on `TierDatabase` rather
//! than inside the slot array, since it has different lifecycle rules (`CreateSolvingTier`/
//! `FlushSolvingTier`/`FreeSolvingTier` instead of `LoadTier`/`UnloadTier`).

mod format;
mod paths;

pub use format::XzOptions;
pub use paths::DbPaths;

use crate::error::{Error, Res};
use crate::model::{Position, Record, Remoteness, Tier, TierPosition, Value};
use crate::record_array::RecordArray;
use std::collections::HashMap;
use std::fmt;

/// Default cap on simultaneously loaded sibling tiers: a fixed maximum number of simultaneously
/// resident tiers, at least 256.
pub const DEFAULT_MAX_LOADED: usize = 256;

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display, strum_macros::EnumIter)]
pub enum TierStatus {
    Solved,
    Corrupted,
    Missing,
    CheckError,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display, strum_macros::EnumIter)]
pub enum GameStatus {
    Solved,
    Incomplete,
    CheckError,
}

pub struct TierDatabase {
    paths: DbPaths,
    xz_opts: XzOptions,
    max_loaded: usize,
    solving_tier: Option<Tier>,
    solving: Option<RecordArray>,
    slots: Vec<Option<RecordArray>>,
    slot_of: HashMap<Tier, usize>,
}

impl fmt::Debug for TierDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierDatabase")
            .field("paths", &self.paths)
            .field("solving_tier", &self.solving_tier)
            .field("loaded", &self.slot_of.len())
            .field("max_loaded", &self.max_loaded)
            .finish()
    }
}

impl TierDatabase {
    pub fn new(paths: DbPaths) -> Self {
        Self::with_options(paths, XzOptions::default(), DEFAULT_MAX_LOADED)
    }

    pub fn with_options(paths: DbPaths, xz_opts: XzOptions, max_loaded: usize) -> Self {
        let mut slots = Vec::with_capacity(max_loaded);
        slots.resize_with(max_loaded, || None);
        Self { paths, xz_opts, max_loaded, solving_tier: None, solving: None, slots, slot_of: HashMap::new() }
    }

    pub fn paths(&self) -> &DbPaths {
        &self.paths
    }

    pub fn xz_options(&self) -> XzOptions {
        self.xz_opts
    }

    pub fn solving_tier(&self) -> Option<Tier> {
        self.solving_tier
    }

    pub fn num_loaded(&self) -> usize {
        self.slot_of.len()
    }

    // -- solving-tier (slot 0) lifecycle ---------------------------------------------------

    pub fn create_solving_tier(&mut self, tier: Tier, size: u64) -> Res<()> {
        if self.solving_tier.is_some() {
            return Err(Error::Runtime("slot 0 is already occupied by a solving tier".into()));
        }
        self.solving = Some(RecordArray::new(size)?);
        self.solving_tier = Some(tier);
        Ok(())
    }

    fn solving_array(&self) -> Res<&RecordArray> {
        self.solving.as_ref().ok_or_else(|| Error::Runtime("no tier is currently being solved".into()))
    }

    pub fn set_value(&self, pos: Position, value: Value) -> Res<()> {
        self.solving_array()?.set_value(pos, value)
    }

    pub fn set_remoteness(&self, pos: Position, remoteness: Remoteness) -> Res<()> {
        self.solving_array()?.set_remoteness(pos, remoteness)
    }

    pub fn get_value(&self, pos: Position) -> Res<Value> {
        self.solving_array()?.get_value(pos)
    }

    pub fn get_remoteness(&self, pos: Position) -> Res<Remoteness> {
        self.solving_array()?.get_remoteness(pos)
    }

    pub fn flush_solving_tier(&self, tier_name: &str) -> Res<()> {
        let arr = self.solving_array()?;
        self.paths.ensure_dir()?;
        let raw = arr.to_bytes();
        format::write_blocked_xz_atomic(&self.paths.adb(tier_name), &self.paths.adb_tmp(tier_name), &raw, self.xz_opts)
    }

    pub fn free_solving_tier(&mut self) -> Res<()> {
        self.solving = None;
        self.solving_tier = None;
        Ok(())
    }

    // -- sibling-tier loaded cache ----------------------------------------------------------

    /// Allocates the smallest free slot `>= 1` and stream-decompresses `tier_name`'s file into
    /// it. Idempotent: loading an already-loaded tier is a no-op.
    pub fn load_tier(&mut self, tier: Tier, tier_name: &str, size: u64) -> Res<()> {
        if self.slot_of.contains_key(&tier) {
            return Ok(());
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::MemoryOverflow)?;
        let raw = format::read_blocked_xz_full(&self.paths.adb(tier_name))?;
        let expected = (size as usize) * 2;
        if raw.len() != expected {
            return Err(Error::Runtime(format!(
                "tier {tier_name} on-disk size mismatch: expected {expected} bytes, found {}",
                raw.len()
            )));
        }
        self.slots[slot] = Some(RecordArray::from_bytes(&raw)?);
        self.slot_of.insert(tier, slot);
        Ok(())
    }

    /// Refuses to unload the solving tier (it doesn't occupy a numbered slot in the first
    /// place, so this is really "tier isn't in the loaded map").
    pub fn unload_tier(&mut self, tier: Tier) -> Res<()> {
        let slot = self
            .slot_of
            .remove(&tier)
            .ok_or_else(|| Error::Runtime(format!("tier {tier:?} is not loaded")))?;
        self.slots[slot] = None;
        Ok(())
    }

    pub fn is_tier_loaded(&self, tier: Tier) -> bool {
        self.slot_of.contains_key(&tier) || self.solving_tier == Some(tier)
    }

    pub fn get_value_from_loaded(&self, tp: TierPosition) -> Res<Value> {
        if self.solving_tier == Some(tp.tier) {
            return self.get_value(tp.position);
        }
        let slot = *self
            .slot_of
            .get(&tp.tier)
            .ok_or_else(|| Error::Runtime(format!("tier {:?} is not loaded", tp.tier)))?;
        self.slots[slot].as_ref().expect("registered slot must hold a record array").get_value(tp.position)
    }

    pub fn get_remoteness_from_loaded(&self, tp: TierPosition) -> Res<Remoteness> {
        if self.solving_tier == Some(tp.tier) {
            return self.get_remoteness(tp.position);
        }
        let slot = *self
            .slot_of
            .get(&tp.tier)
            .ok_or_else(|| Error::Runtime(format!("tier {:?} is not loaded", tp.tier)))?;
        self.slots[slot]
            .as_ref()
            .expect("registered slot must hold a record array")
            .get_remoteness(tp.position)
    }

    // -- checkpointing ------------------------------------------------------------------------

    pub fn checkpoint_save(&self, tier_name: &str, status_blob: &[u8]) -> Res<()> {
        let arr = self.solving_array()?;
        self.paths.ensure_dir()?;
        format::write_checkpoint_atomic(
            &self.paths.checkpoint(tier_name),
            &self.paths.checkpoint_tmp(tier_name),
            &arr.to_bytes(),
            status_blob,
        )
    }

    /// Restores the solving tier's record array into slot 0 and returns the worker-status blob.
    pub fn checkpoint_load(&mut self, tier: Tier, tier_name: &str, size: u64, status_len: usize) -> Res<Vec<u8>> {
        let (record_bytes, status) = format::read_checkpoint(&self.paths.checkpoint(tier_name), (size as usize) * 2)?;
        if status.len() != status_len {
            return Err(Error::IllegalArgument(format!(
                "checkpoint status blob length mismatch: expected {status_len}, found {}",
                status.len()
            )));
        }
        self.solving = Some(RecordArray::from_bytes(&record_bytes)?);
        self.solving_tier = Some(tier);
        Ok(status)
    }

    pub fn checkpoint_exists(&self, tier_name: &str) -> bool {
        self.paths.checkpoint(tier_name).exists()
    }

    pub fn checkpoint_remove(&self, tier_name: &str) -> Res<()> {
        match std::fs::remove_file(self.paths.checkpoint(tier_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // -- status ---------------------------------------------------------------------------------

    pub fn tier_status(&self, tier_name: &str) -> TierStatus {
        let path = self.paths.adb(tier_name);
        match path.try_exists() {
            Ok(false) => TierStatus::Missing,
            Ok(true) => {
                if format::is_decodable(&path) {
                    TierStatus::Solved
                } else {
                    TierStatus::Corrupted
                }
            }
            Err(_) => TierStatus::CheckError,
        }
    }

    pub fn mark_game_solved(&self) -> Res<()> {
        self.paths.ensure_dir()?;
        std::fs::write(self.paths.finish(), [])?;
        Ok(())
    }

    pub fn game_status(&self) -> GameStatus {
        match self.paths.finish().try_exists() {
            Ok(true) => GameStatus::Solved,
            Ok(false) => GameStatus::Incomplete,
            Err(_) => GameStatus::CheckError,
        }
    }

    // -- one-bit discovery-map persistence --------------------------------------------------------

    pub fn save_discovery_map(&self, tier_name: &str, bits: &[u8]) -> Res<()> {
        self.paths.ensure_analysis_dir()?;
        let path = self.paths.discovery_map(tier_name);
        let tmp = path.with_extension("lz4.tmp");
        format::write_lz4_atomic(&path, &tmp, bits)
    }

    pub fn load_discovery_map(&self, tier_name: &str) -> Res<Vec<u8>> {
        format::read_lz4(&self.paths.discovery_map(tier_name))
    }
}

/// Per-thread handle owning one open compressed file plus its decoded-block cache. `ProbeValue`/
/// `ProbeRemoteness` switch files automatically when the requested tier differs from the probe's
/// current one. Not thread-safe — give each thread its own.
///
/// A sentinel `Value = Error`/`Remoteness = -1` is the traditional way to signal a failed probe;
/// here a `Res<_>` return does the same job as a typed, matchable failure instead of a sentinel
/// value a caller could forget to check.
pub struct Probe {
    paths: DbPaths,
    current_tier: Option<Tier>,
    reader: Option<format::BlockReader>,
}

impl Probe {
    pub fn new(paths: DbPaths) -> Self {
        Self { paths, current_tier: None, reader: None }
    }

    fn ensure_tier(&mut self, tier: Tier, tier_name: &str) -> Res<()> {
        if self.current_tier != Some(tier) {
            self.reader = Some(format::BlockReader::open(&self.paths.adb(tier_name))?);
            self.current_tier = Some(tier);
        }
        Ok(())
    }

    pub fn probe_record(&mut self, tp: TierPosition, tier_name: &str) -> Res<Record> {
        self.ensure_tier(tp.tier, tier_name)?;
        let reader = self.reader.as_mut().expect("ensure_tier always populates the reader");
        let bytes = reader.read_at(tp.position.0 * 2, 2)?;
        Ok(Record(u16::from_ne_bytes([bytes[0], bytes[1]])))
    }

    pub fn probe_value(&mut self, tp: TierPosition, tier_name: &str) -> Res<Value> {
        self.probe_record(tp, tier_name).map(Record::value)
    }

    pub fn probe_remoteness(&mut self, tp: TierPosition, tier_name: &str) -> Res<Remoteness> {
        self.probe_record(tp, tier_name).map(Record::remoteness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn db_at(dir: &std::path::Path) -> TierDatabase {
        TierDatabase::new(DbPaths::new(dir, "testgame", 0, "arraydb"))
    }

    #[test]
    fn create_flush_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut db = db_at(dir.path());
        db.create_solving_tier(Tier(0), 10).unwrap();
        for i in 0..10u64 {
            db.set_value(Position(i), Value::Win).unwrap();
            db.set_remoteness(Position(i), i as Remoteness).unwrap();
        }
        db.flush_solving_tier("t0").unwrap();
        db.free_solving_tier().unwrap();
        assert_eq!(db.tier_status("t0"), TierStatus::Solved);

        db.load_tier(Tier(0), "t0", 10).unwrap();
        assert!(db.is_tier_loaded(Tier(0)));
        for i in 0..10u64 {
            let tp = TierPosition::new(Tier(0), Position(i));
            assert_eq!(db.get_value_from_loaded(tp).unwrap(), Value::Win);
            assert_eq!(db.get_remoteness_from_loaded(tp).unwrap(), i as Remoteness);
        }
        db.unload_tier(Tier(0)).unwrap();
        assert!(!db.is_tier_loaded(Tier(0)));
    }

    #[test]
    fn create_solving_tier_twice_fails() {
        let dir = tempdir().unwrap();
        let mut db = db_at(dir.path());
        db.create_solving_tier(Tier(0), 4).unwrap();
        assert!(db.create_solving_tier(Tier(1), 4).is_err());
    }

    #[test]
    fn load_tier_respects_slot_cap() {
        let dir = tempdir().unwrap();
        let mut db = TierDatabase::with_options(DbPaths::new(dir.path(), "g", 0, "db"), XzOptions::default(), 1);
        for t in 0..2u64 {
            db.create_solving_tier(Tier(t), 2).unwrap();
            db.flush_solving_tier(&format!("t{t}")).unwrap();
            db.free_solving_tier().unwrap();
        }
        db.load_tier(Tier(0), "t0", 2).unwrap();
        assert!(matches!(db.load_tier(Tier(1), "t1", 2), Err(Error::MemoryOverflow)));
    }

    #[test]
    fn missing_tier_status() {
        let dir = tempdir().unwrap();
        let db = db_at(dir.path());
        assert_eq!(db.tier_status("nope"), TierStatus::Missing);
    }

    #[test]
    fn checkpoint_round_trip_resumes_solving_tier() {
        let dir = tempdir().unwrap();
        let mut db = db_at(dir.path());
        db.create_solving_tier(Tier(3), 5).unwrap();
        db.set_value(Position(2), Value::Tie).unwrap();
        db.set_remoteness(Position(2), 9).unwrap();
        let status = 0xDEADBEEFu32.to_le_bytes();
        db.checkpoint_save("t3", &status).unwrap();

        let mut resumed = db_at(dir.path());
        let restored_status = resumed.checkpoint_load(Tier(3), "t3", 5, 4).unwrap();
        assert_eq!(restored_status, status);
        assert_eq!(resumed.get_value(Position(2)).unwrap(), Value::Tie);
        assert_eq!(resumed.get_remoteness(Position(2)).unwrap(), 9);
    }

    #[test]
    fn game_status_tracks_finish_flag() {
        let dir = tempdir().unwrap();
        let db = db_at(dir.path());
        assert_eq!(db.game_status(), GameStatus::Incomplete);
        db.mark_game_solved().unwrap();
        assert_eq!(db.game_status(), GameStatus::Solved);
    }

    #[test]
    fn probe_reads_across_flushed_blocks() {
        let dir = tempdir().unwrap();
        let mut db = TierDatabase::with_options(
            DbPaths::new(dir.path(), "g", 0, "db"),
            XzOptions { block_size: 16, level: 1, extreme: false },
            DEFAULT_MAX_LOADED,
        );
        db.create_solving_tier(Tier(5), 50).unwrap();
        for i in 0..50u64 {
            db.set_value(Position(i), Value::Lose).unwrap();
            db.set_remoteness(Position(i), (i % 100) as Remoteness).unwrap();
        }
        db.flush_solving_tier("t5").unwrap();

        let mut probe = Probe::new(db.paths().clone());
        for i in [0u64, 7, 8, 31, 49] {
            let tp = TierPosition::new(Tier(5), Position(i));
            assert_eq!(probe.probe_value(tp, "t5").unwrap(), Value::Lose);
            assert_eq!(probe.probe_remoteness(tp, "t5").unwrap(), (i % 100) as Remoteness);
        }
    }
}
