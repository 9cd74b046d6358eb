//! Pipeline stages, access masks, and barrier batches.
//!
//! A resource remembers one [`LastAccess`]. Before the next access the
//! storage layer compares the two and, when they form a hazard, appends a
//! barrier to a caller-owned [`PipelineBarrier`]. The batch is submitted
//! later in one go, so many transitions can share a single device call.

use bitflags::bitflags;

use crate::context::{AcceleratorContext, ResourceId};
use crate::error::ContextResult;

bitflags! {
    /// Phases of accelerator execution an access can belong to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStage: u32 {
        const COMPUTE = 1 << 0;
        const HOST = 1 << 1;
        const TRANSFER = 1 << 2;
        const TOP_OF_PIPE = 1 << 3;
        const BOTTOM_OF_PIPE = 1 << 4;
    }
}

impl PipelineStage {
    pub const NO_STAGE: Self = Self::empty();
}

bitflags! {
    /// Read and write intent of an access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryAccess: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl MemoryAccess {
    pub const NONE: Self = Self::empty();
}

/// Most recent stage and access mode that touched a resource.
///
/// The default value is the "never accessed" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LastAccess {
    pub stage: PipelineStage,
    pub access: MemoryAccess,
}

impl LastAccess {
    pub const fn new(stage: PipelineStage, access: MemoryAccess) -> Self {
        LastAccess { stage, access }
    }

    pub fn is_sentinel(&self) -> bool {
        self.stage.is_empty() && self.access.is_empty()
    }

    /// Whether moving from `self` to `next` is a hazard that needs a barrier.
    ///
    /// Any write on either side orders the pair; two reads never do. Nothing
    /// precedes the sentinel, so it never needs one.
    pub fn needs_barrier_before(&self, next: LastAccess) -> bool {
        if self.is_sentinel() {
            return false;
        }
        self.access.contains(MemoryAccess::WRITE) || next.access.contains(MemoryAccess::WRITE)
    }
}

/// Memory dependency on a linear buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferBarrier {
    pub resource: ResourceId,
    pub src_access: MemoryAccess,
    pub dst_access: MemoryAccess,
    /// Bytes covered by the dependency, starting at offset zero.
    pub size: usize,
}

/// Memory dependency on an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBarrier {
    pub resource: ResourceId,
    pub src_access: MemoryAccess,
    pub dst_access: MemoryAccess,
}

/// Batch of barriers sharing aggregate source and destination stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineBarrier {
    src_stage: PipelineStage,
    dst_stage: PipelineStage,
    buffers: Vec<BufferBarrier>,
    images: Vec<ImageBarrier>,
}

impl PipelineBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the batch holds no barrier and no stage dependency.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
            && self.images.is_empty()
            && self.src_stage.is_empty()
            && self.dst_stage.is_empty()
    }

    pub fn src_stage(&self) -> PipelineStage {
        self.src_stage
    }

    pub fn dst_stage(&self) -> PipelineStage {
        self.dst_stage
    }

    pub fn buffers(&self) -> &[BufferBarrier] {
        &self.buffers
    }

    pub fn images(&self) -> &[ImageBarrier] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn push_buffer(&mut self, barrier: BufferBarrier, src: PipelineStage, dst: PipelineStage) {
        self.widen_stages(src, dst);
        self.buffers.push(barrier);
    }

    pub fn push_image(&mut self, barrier: ImageBarrier, src: PipelineStage, dst: PipelineStage) {
        self.widen_stages(src, dst);
        self.images.push(barrier);
    }

    fn widen_stages(&mut self, src: PipelineStage, dst: PipelineStage) {
        self.src_stage |= if src.is_empty() {
            PipelineStage::TOP_OF_PIPE
        } else {
            src
        };
        self.dst_stage |= if dst.is_empty() {
            PipelineStage::BOTTOM_OF_PIPE
        } else {
            dst
        };
    }

    pub fn clear(&mut self) {
        self.src_stage = PipelineStage::NO_STAGE;
        self.dst_stage = PipelineStage::NO_STAGE;
        self.buffers.clear();
        self.images.clear();
    }

    /// Hands the batch to `context` and empties it.
    ///
    /// Returns `Ok(false)` without calling the context when the batch is empty.
    /// On failure the batch is left intact so the caller can inspect it.
    pub fn submit<C>(&mut self, context: &C) -> ContextResult<bool>
    where
        C: AcceleratorContext + ?Sized,
    {
        if self.is_empty() {
            return Ok(false);
        }
        tracing::debug!(
            device = context.device_name(),
            src_stage = ?self.src_stage,
            dst_stage = ?self.dst_stage,
            buffers = self.buffers.len(),
            images = self.images.len(),
            "submitting pipeline barrier"
        );
        context.submit_barrier(self)?;
        self.clear();
        Ok(true)
    }
}

/// Appends an explicit buffer dependency for memory no backing tracks,
/// such as staging buffers.
pub fn add_buffer_barrier(
    barrier: &mut PipelineBarrier,
    resource: ResourceId,
    size: usize,
    src_stage: PipelineStage,
    src_access: MemoryAccess,
    dst_stage: PipelineStage,
    dst_access: MemoryAccess,
) {
    tracing::trace!(%resource, ?src_stage, ?dst_stage, "explicit buffer barrier");
    barrier.push_buffer(
        BufferBarrier {
            resource,
            src_access,
            dst_access,
            size,
        },
        src_stage,
        dst_stage,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPUTE_READ: LastAccess = LastAccess::new(PipelineStage::COMPUTE, MemoryAccess::READ);
    const COMPUTE_WRITE: LastAccess = LastAccess::new(PipelineStage::COMPUTE, MemoryAccess::WRITE);

    #[test]
    fn sentinel_is_default() {
        let access = LastAccess::default();
        assert!(access.is_sentinel());
        assert_eq!(access.stage, PipelineStage::NO_STAGE);
        assert_eq!(access.access, MemoryAccess::NONE);
    }

    #[test]
    fn hazard_table() {
        assert!(!COMPUTE_READ.needs_barrier_before(COMPUTE_READ));
        assert!(COMPUTE_READ.needs_barrier_before(COMPUTE_WRITE));
        assert!(COMPUTE_WRITE.needs_barrier_before(COMPUTE_READ));
        assert!(COMPUTE_WRITE.needs_barrier_before(COMPUTE_WRITE));
        assert!(!LastAccess::default().needs_barrier_before(COMPUTE_WRITE));
    }

    #[test]
    fn empty_stages_fall_back_to_pipe_ends() {
        let mut batch = PipelineBarrier::new();
        assert!(batch.is_empty());
        add_buffer_barrier(
            &mut batch,
            ResourceId(7),
            64,
            PipelineStage::NO_STAGE,
            MemoryAccess::NONE,
            PipelineStage::NO_STAGE,
            MemoryAccess::READ,
        );
        assert!(!batch.is_empty());
        assert_eq!(batch.src_stage(), PipelineStage::TOP_OF_PIPE);
        assert_eq!(batch.dst_stage(), PipelineStage::BOTTOM_OF_PIPE);
        assert_eq!(batch.buffers()[0].size, 64);
    }

    #[test]
    fn stages_accumulate_across_barriers() {
        let mut batch = PipelineBarrier::new();
        batch.push_image(
            ImageBarrier {
                resource: ResourceId(1),
                src_access: MemoryAccess::WRITE,
                dst_access: MemoryAccess::READ,
            },
            PipelineStage::COMPUTE,
            PipelineStage::TRANSFER,
        );
        batch.push_image(
            ImageBarrier {
                resource: ResourceId(2),
                src_access: MemoryAccess::WRITE,
                dst_access: MemoryAccess::READ,
            },
            PipelineStage::HOST,
            PipelineStage::COMPUTE,
        );
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.src_stage(), PipelineStage::COMPUTE | PipelineStage::HOST);
        assert_eq!(
            batch.dst_stage(),
            PipelineStage::TRANSFER | PipelineStage::COMPUTE
        );
        batch.clear();
        assert!(batch.is_empty());
    }
}
