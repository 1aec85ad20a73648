//! Durable write queue and its replay machinery.
//!
//! `store` owns item lifetime (enqueue, FIFO listing, attempt bookkeeping,
//! dead-lettering); `sync` drives delivery with at-least-once semantics and
//! idempotency keys, so server cooperation yields effectively-once behavior.

mod store;
mod sync;

pub use store::{DeadLetter, OutboxItem, OutboxStore};
pub use sync::{CycleOutcome, CycleState, SyncConfig, SyncCoordinator, IDEMPOTENCY_HEADER};
