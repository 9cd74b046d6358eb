//! Ownership of one accelerator allocation plus its last-access record.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use crate::barrier::{
    BufferBarrier, ImageBarrier, LastAccess, MemoryAccess, PipelineBarrier, PipelineStage,
};
use crate::context::{AcceleratorContext, DeviceResource, ImageRequest, ResourceId};
use crate::descriptor::{ResourceDescriptor, StorageKind, UVec3};
use crate::error::{StorageError, StorageResult};

enum Resource<C: AcceleratorContext> {
    Unallocated,
    Image(C::Image),
    Buffer(C::Buffer),
}

/// Accelerator memory behind one or more tensor views.
///
/// Exactly one of image or buffer is live, chosen by the storage kind. The
/// only state that changes after construction is the last-access record. It
/// is updated only inside this crate, through a view's write capability;
/// holders of `&StorageBacking` can inspect but never record. Dropping the
/// backing releases the resource through the context that allocated it.
pub struct StorageBacking<C: AcceleratorContext> {
    context: Option<Arc<C>>,
    kind: StorageKind,
    extents: UVec3,
    buffer_length: usize,
    allocation_bytes: usize,
    resource: Resource<C>,
    last_access: Cell<LastAccess>,
}

impl<C: AcceleratorContext> StorageBacking<C> {
    /// Allocates a resource sized by `descriptor`.
    pub fn new(context: Arc<C>, descriptor: &ResourceDescriptor) -> StorageResult<Self> {
        let kind = descriptor.kind();
        let allocation_bytes = descriptor.allocation_bytes();
        let resource = if kind.is_image() {
            let request = ImageRequest {
                kind,
                extents: descriptor.allocation_extents(),
                format: descriptor.texture_format(),
            };
            Resource::Image(context.allocate_image(&request)?)
        } else {
            Resource::Buffer(context.allocate_buffer(allocation_bytes)?)
        };

        let backing = StorageBacking {
            context: Some(context),
            kind,
            extents: descriptor.extents(),
            buffer_length: descriptor.buffer_length(),
            allocation_bytes,
            resource,
            last_access: Cell::new(LastAccess::default()),
        };
        tracing::debug!(
            resource = ?backing.resource_id(),
            kind = ?kind,
            extents = ?backing.extents.0,
            bytes = allocation_bytes,
            "allocated storage backing"
        );
        Ok(backing)
    }

    /// A backing with no resource and no context.
    ///
    /// Every access on it fails with [`StorageError::InvariantViolation`].
    pub fn empty(kind: StorageKind) -> Self {
        StorageBacking {
            context: None,
            kind,
            extents: UVec3::default(),
            buffer_length: 0,
            allocation_bytes: 0,
            resource: Resource::Unallocated,
            last_access: Cell::new(LastAccess::default()),
        }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn extents(&self) -> UVec3 {
        self.extents
    }

    pub fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    pub fn allocation_bytes(&self) -> usize {
        self.allocation_bytes
    }

    pub fn is_allocated(&self) -> bool {
        !matches!(self.resource, Resource::Unallocated)
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        match &self.resource {
            Resource::Unallocated => None,
            Resource::Image(image) => Some(image.resource_id()),
            Resource::Buffer(buffer) => Some(buffer.resource_id()),
        }
    }

    pub fn last_access(&self) -> LastAccess {
        self.last_access.get()
    }

    /// Records a new access, appending a barrier to `barrier` on a hazard.
    pub(crate) fn transition(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) -> StorageResult<()> {
        let prev = self.last_access.get();
        let next = LastAccess::new(stage, access);

        if prev.needs_barrier_before(next) {
            match &self.resource {
                Resource::Unallocated => return Err(unallocated()),
                Resource::Image(image) => barrier.push_image(
                    ImageBarrier {
                        resource: image.resource_id(),
                        src_access: prev.access,
                        dst_access: access,
                    },
                    prev.stage,
                    stage,
                ),
                Resource::Buffer(buffer) => barrier.push_buffer(
                    BufferBarrier {
                        resource: buffer.resource_id(),
                        src_access: prev.access,
                        dst_access: access,
                        size: self.allocation_bytes,
                    },
                    prev.stage,
                    stage,
                ),
            }
            tracing::trace!(
                resource = ?self.resource_id(),
                src_stage = ?prev.stage,
                src_access = ?prev.access,
                dst_stage = ?stage,
                dst_access = ?access,
                "inserted barrier"
            );
        } else if !self.is_allocated() {
            return Err(unallocated());
        }

        self.last_access.set(next);
        Ok(())
    }

    /// Transitions and returns the image.
    pub(crate) fn image(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) -> StorageResult<&C::Image> {
        let image = self.peek_image()?;
        self.transition(barrier, stage, access)?;
        Ok(image)
    }

    /// Transitions and returns the buffer.
    pub(crate) fn buffer(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) -> StorageResult<&C::Buffer> {
        let buffer = self.peek_buffer()?;
        self.transition(barrier, stage, access)?;
        Ok(buffer)
    }

    /// The image without touching the last-access record.
    pub fn peek_image(&self) -> StorageResult<&C::Image> {
        match &self.resource {
            Resource::Image(image) => Ok(image),
            Resource::Buffer(_) => Err(StorageError::invariant(
                "image requested from buffer-backed storage",
            )),
            Resource::Unallocated => Err(unallocated()),
        }
    }

    /// The buffer without touching the last-access record.
    pub fn peek_buffer(&self) -> StorageResult<&C::Buffer> {
        match &self.resource {
            Resource::Buffer(buffer) => Ok(buffer),
            Resource::Image(_) => Err(StorageError::invariant(
                "buffer requested from image-backed storage",
            )),
            Resource::Unallocated => Err(unallocated()),
        }
    }
}

fn unallocated() -> StorageError {
    StorageError::invariant("storage backing holds no resource")
}

impl<C: AcceleratorContext> Drop for StorageBacking<C> {
    fn drop(&mut self) {
        let resource = std::mem::replace(&mut self.resource, Resource::Unallocated);
        let Some(context) = self.context.as_ref() else {
            return;
        };
        let released = match resource {
            Resource::Unallocated => return,
            Resource::Image(image) => {
                tracing::debug!(resource = ?image.resource_id(), "releasing image");
                context.release_image(image)
            }
            Resource::Buffer(buffer) => {
                tracing::debug!(resource = ?buffer.resource_id(), "releasing buffer");
                context.release_buffer(buffer)
            }
        };
        if let Err(err) = released {
            tracing::warn!(error = %err, device = context.device_name(), "release failed");
        }
    }
}

impl<C: AcceleratorContext> fmt::Debug for StorageBacking<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBacking")
            .field("kind", &self.kind)
            .field("resource", &self.resource_id())
            .field("extents", &self.extents)
            .field("buffer_length", &self.buffer_length)
            .field("last_access", &self.last_access.get())
            .finish()
    }
}
