//! Reference accelerator context backed by host memory.
//!
//! Useful for exercising the storage layer without a device: allocations are
//! plain byte vectors and barrier submissions are recorded instead of issued.

pub mod host;

pub use host::{HostBuffer, HostContext, HostImage, HostStats};
