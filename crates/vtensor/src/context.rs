//! The seam between tensor storage and a concrete accelerator runtime.
//!
//! Storage code never talks to a device API directly. It asks an
//! [`AcceleratorContext`] for images and buffers, hands them back when the
//! last view goes away, and passes accumulated barrier batches to
//! [`AcceleratorContext::submit_barrier`].

use std::fmt;

use crate::barrier::PipelineBarrier;
use crate::descriptor::{StorageKind, UVec3};
use crate::dtype::TextureFormat;
use crate::error::{ContextResult, ShapeError};

/// Identity of one accelerator allocation, unique within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Implemented by every image and buffer handle a context hands out.
pub trait DeviceResource {
    fn resource_id(&self) -> ResourceId;
}

/// Parameters of an image allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    /// Either [`StorageKind::Texture3D`] or [`StorageKind::Texture2D`].
    pub kind: StorageKind,
    pub extents: UVec3,
    pub format: TextureFormat,
}

impl ImageRequest {
    pub fn bytes(&self) -> Result<usize, ShapeError> {
        let texels = self.extents.element_count()?;
        texels
            .checked_mul(self.format.texel_bytes())
            .ok_or_else(|| ShapeError::ElementOverflow {
                sizes: self.extents.0.iter().map(|&v| v as usize).collect(),
            })
    }
}

/// Allocator and submission queue for one accelerator device.
///
/// Methods take `&self`; implementations that keep mutable bookkeeping use
/// interior mutability. A context is shared with every backing it allocates
/// through an `Arc`, so it always outlives them.
pub trait AcceleratorContext {
    type Image: DeviceResource + fmt::Debug;
    type Buffer: DeviceResource + fmt::Debug;

    /// Human readable device name used in diagnostics.
    fn device_name(&self) -> &str;

    fn allocate_image(&self, request: &ImageRequest) -> ContextResult<Self::Image>;

    fn allocate_buffer(&self, bytes: usize) -> ContextResult<Self::Buffer>;

    /// Returns an image to the context. Called exactly once per allocation.
    fn release_image(&self, image: Self::Image) -> ContextResult<()>;

    /// Returns a buffer to the context. Called exactly once per allocation.
    fn release_buffer(&self, buffer: Self::Buffer) -> ContextResult<()>;

    /// Records a non-empty barrier batch on the device queue.
    fn submit_barrier(&self, barrier: &PipelineBarrier) -> ContextResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_bytes_scale_with_texel_size() {
        let request = ImageRequest {
            kind: StorageKind::Texture2D,
            extents: UVec3([4, 6, 1]),
            format: TextureFormat::Rgba32F,
        };
        assert_eq!(request.bytes(), Ok(4 * 6 * 16));
    }

    #[test]
    fn oversized_image_request_is_an_overflow() {
        let request = ImageRequest {
            kind: StorageKind::Texture3D,
            extents: UVec3([u32::MAX; 3]),
            format: TextureFormat::Rgba8Ui,
        };
        assert!(matches!(
            request.bytes(),
            Err(ShapeError::ElementOverflow { .. })
        ));
    }
}
