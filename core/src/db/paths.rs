//! Centralized path construction for the on-disk database layout, bit-exact:
//!
//! ```text
//! <data_path>/<game_name>/<variant_int>/<db_internal_name>/<tier_name>.adb.xz
//! <data_path>/<game_name>/<variant_int>/<db_internal_name>/<tier_name>.adb.xz.chk
//! <data_path>/<game_name>/<variant_int>/<db_internal_name>/.finish
//! ```
//!
//! Kept in one small helper rather than `format!`-ed inline at each call site, the same way a
//! board's FEN/PGN naming helpers centralize string construction instead of scattering it across
//! the crate.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DbPaths {
    data_path: PathBuf,
    game_name: String,
    variant: u64,
    db_name: String,
}

impl DbPaths {
    pub fn new(
        data_path: impl Into<PathBuf>,
        game_name: impl Into<String>,
        variant: u64,
        db_name: impl Into<String>,
    ) -> Self {
        Self { data_path: data_path.into(), game_name: game_name.into(), variant, db_name: db_name.into() }
    }

    pub fn dir(&self) -> PathBuf {
        self.data_path.join(&self.game_name).join(self.variant.to_string()).join(&self.db_name)
    }

    pub fn adb(&self, tier_name: &str) -> PathBuf {
        self.dir().join(format!("{tier_name}.adb.xz"))
    }

    pub fn adb_tmp(&self, tier_name: &str) -> PathBuf {
        self.dir().join(format!("{tier_name}.adb.xz.tmp"))
    }

    pub fn checkpoint(&self, tier_name: &str) -> PathBuf {
        self.dir().join(format!("{tier_name}.adb.xz.chk"))
    }

    pub fn checkpoint_tmp(&self, tier_name: &str) -> PathBuf {
        self.dir().join(format!("{tier_name}.adb.xz.chk.tmp"))
    }

    pub fn finish(&self) -> PathBuf {
        self.dir().join(".finish")
    }

    pub fn discovery_map(&self, tier_name: &str) -> PathBuf {
        self.data_path.join("analysis").join(format!("{tier_name}.map.lz4"))
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.dir())
    }

    pub fn ensure_analysis_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.data_path.join("analysis"))
    }

    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn variant(&self) -> u64 {
        self.variant
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}
