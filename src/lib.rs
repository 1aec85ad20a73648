//! Offline resilience layer for a database-backed website's client.
//!
//! The layer does two things: it serves intercepted reads under per-route
//! cache policies so pages keep working with degraded connectivity, and it
//! durably queues state-changing submissions made while offline, replaying
//! them in order once connectivity returns.
//!
//! The pieces, leaf-first:
//! - [`db`]: shared SQLite persistence for both stores
//! - [`cache`]: versioned response buckets and the per-route policy engine
//! - [`outbox`]: durable write queue and the replay coordinator
//! - [`lifecycle`]: install/activate state machine owning generation rollover
//! - [`bridge`]: connectivity flag, enqueue entry point and UI events
//! - [`net`]: request/response snapshots and the network client seam

pub mod bridge;
pub mod cache;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod net;
pub mod outbox;

pub use bridge::{BridgeEvent, UiBridge};
pub use cache::{BucketStore, CacheGeneration, PolicyEngine, RouteTable};
pub use config::Config;
pub use db::Database;
pub use lifecycle::{LifecycleManager, WorkerState};
pub use net::{FetchRequest, FetchResponse, NetworkClient, ReqwestClient};
pub use outbox::{OutboxStore, SyncConfig, SyncCoordinator};
