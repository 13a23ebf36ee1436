//! Both `TierWorker` variants: given a ready canonical tier, load its children,
//! compute this tier's [`RecordArray`](crate::record_array::RecordArray), flush it, and unload
//! the children again.

mod common;
pub mod one_bit;
pub mod value_iteration;

pub use common::WorkerConfig;
pub use one_bit::solve_tier_one_bit;
pub use value_iteration::solve_tier_value_iteration;
