//! Solver error kinds. Ordinals are stable and used across modules: the [`SolverManager`](
//! crate::manager::SolverManager) matches on them to decide which per-tier failures are
//! recoverable, and the `gamesman` binary maps them directly to process exit codes.
//!
//! A single `thiserror`-derived enum rather than one struct per failure mode, scaled up from
//! the single-struct pattern used elsewhere in the corpus (e.g. a parser's own `NoNextLineError`)
//! to the full set of ordinals a multi-stage solver needs to distinguish.

use thiserror::Error;

#[derive(Debug, Error)]
#[repr(i32)]
pub enum Error {
    #[error("allocation failed")]
    OutOfMemory = 1,

    #[error("not implemented")]
    NotImplemented = 2,

    #[error("internal invariant violated: {0}")]
    UnreachableBranch(&'static str) = 3,

    #[error("integer overflow")]
    IntegerOverflow = 4,

    #[error("memory overflow")]
    MemoryOverflow = 5,

    #[error("filesystem error: {0}")]
    FileSystem(#[from] std::io::Error) = 6,

    #[error("illegal argument: {0}")]
    IllegalArgument(String) = 7,

    #[error("illegal game name: {0}")]
    IllegalGameName(String) = 8,

    #[error("illegal game variant: {0}")]
    IllegalGameVariant(String) = 9,

    #[error("illegal game tier: {0}")]
    IllegalGameTier(u64) = 10,

    #[error("illegal game position: {0}")]
    IllegalGamePosition(u64) = 11,

    #[error("illegal game position value")]
    IllegalGamePositionValue = 12,

    #[error("cycle detected in tier graph")]
    IllegalTierGraph = 13,

    #[error("illegal solver option: {0}")]
    IllegalSolverOption(String) = 14,

    #[error("incomplete GameApi: missing {0}")]
    IncompleteGameplayApi(&'static str) = 15,

    #[error("game initialization failed")]
    GameInit = 16,

    #[error("used before init")]
    UseBeforeInit = 17,

    #[error("CLI argument error: {0}")]
    HeadlessError(String) = 18,

    #[error("generic-hash error")]
    GenericHashError = 19,

    #[error("runtime error: {0}")]
    Runtime(String) = 20,
}

impl Error {
    /// Stable ordinal (`NoError` is 0 and has no variant here — callers represent success as
    /// `Ok(())`, never as this enum).
    pub fn code(&self) -> i32 {
        // SAFETY: `Self` is `repr(i32)` with a unit-or-payload variant per discriminant; reading
        // the discriminant through a `*const i32` cast is the standard pattern for fieldful
        // repr(i32) enums (see the `std::mem::discriminant` docs).
        unsafe { *<*const _>::from(self).cast::<i32>() }
    }

    /// Failures the [`SolverManager`](crate::manager::SolverManager) treats as non-fatal to a
    /// single tier: the run continues with other ready tiers.
    pub fn tier_local(&self) -> bool {
        matches!(self, Error::OutOfMemory | Error::Runtime(_) | Error::FileSystem(_))
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::Runtime(msg.into())
    }
}

pub type Res<T> = Result<T, Error>;
