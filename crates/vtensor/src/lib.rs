//! Accelerator-resident tensor storage.
//!
//! Tensors live in opaque device memory (images or linear buffers) allocated
//! through an [`AcceleratorContext`]. Each allocation remembers the last
//! pipeline stage and access mode that touched it, and the storage layer
//! appends memory barriers to a caller-owned [`PipelineBarrier`] whenever a
//! new access would race with the previous one.

pub mod barrier;
pub mod config;
pub mod context;
pub mod convert;
pub mod descriptor;
pub mod dtype;
mod env;
pub mod error;
pub mod storage;
#[cfg(test)]
mod testing;
pub mod view;

pub use barrier::{
    add_buffer_barrier, BufferBarrier, ImageBarrier, LastAccess, MemoryAccess, PipelineBarrier,
    PipelineStage,
};
pub use config::{ConfigError, RankPolicy, StorageConfig};
pub use context::{AcceleratorContext, DeviceResource, ImageRequest, ResourceId};
pub use convert::{
    as_view, as_view_mut, into_generic, into_generic_quantized, DeviceKind, GenericTensor,
};
pub use descriptor::{Dims, MemoryFormat, ResourceDescriptor, StorageKind, UVec3, UVec4};
pub use dtype::{DType, TextureFormat};
pub use error::{ContextError, ContextResult, ShapeError, StorageError, StorageResult};
pub use storage::StorageBacking;
pub use view::{QuantParams, ReadAccess, TensorOptions, TensorView, WriteAccess};
