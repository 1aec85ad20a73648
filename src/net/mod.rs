//! Network seam: request/response snapshots and the client trait the rest of
//! the layer fetches through.

mod client;
mod types;

#[cfg(test)]
pub mod testutil;

pub use client::{NetworkClient, ReqwestClient};
pub use types::{FetchRequest, FetchResponse};
