#![doc = include_str!("../README.md")]

mod counter;
mod error;
mod identity;
mod queue;
pub mod store;
mod time;

pub use crate::counter::*;
pub use crate::error::*;
pub use crate::identity::*;
pub use crate::queue::*;
pub use crate::store::Store;
pub use crate::time::*;
// Re-exported so downstream crates share the same payload and cancellation
// types without pinning their own versions.
pub use bytes;
pub use tokio_util::sync::CancellationToken;
