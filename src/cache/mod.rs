//! Cache side of the offline layer.
//!
//! `bucket` is the versioned response store; `policy` decides, per route
//! class, whether a request is served from cache, from the network, or from
//! the offline fallback.

mod bucket;
mod policy;

pub use bucket::{Bucket, BucketStore, CacheGeneration, CachedEntry};
pub use policy::{PolicyEngine, RouteClass, RouteTable};
