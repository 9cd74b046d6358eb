use std::cell::{Cell, RefCell};

use crate::barrier::PipelineBarrier;
use crate::context::{AcceleratorContext, DeviceResource, ImageRequest, ResourceId};
use crate::error::{ContextError, ContextResult};

#[derive(Debug)]
pub(crate) struct Handle(ResourceId);

impl DeviceResource for Handle {
    fn resource_id(&self) -> ResourceId {
        self.0
    }
}

/// Context that hands out ids and counts live allocations.
#[derive(Default)]
pub(crate) struct CountingContext {
    next_id: Cell<u64>,
    live: Cell<usize>,
    reject_releases: Cell<bool>,
    failed_releases: Cell<usize>,
    submitted: RefCell<Vec<PipelineBarrier>>,
}

impl CountingContext {
    pub(crate) fn live(&self) -> usize {
        self.live.get()
    }

    /// Makes every later release fail with `UnknownResource`.
    pub(crate) fn reject_releases(&self) {
        self.reject_releases.set(true);
    }

    pub(crate) fn failed_releases(&self) -> usize {
        self.failed_releases.get()
    }

    pub(crate) fn submitted(&self) -> Vec<PipelineBarrier> {
        self.submitted.borrow().clone()
    }

    fn allocate(&self) -> Handle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.live.set(self.live.get() + 1);
        Handle(ResourceId(id))
    }

    fn release(&self, handle: Handle) -> ContextResult<()> {
        if self.reject_releases.get() {
            self.failed_releases.set(self.failed_releases.get() + 1);
            return Err(ContextError::UnknownResource(handle.0 .0));
        }
        let live = self
            .live
            .get()
            .checked_sub(1)
            .ok_or(ContextError::UnknownResource(0))?;
        self.live.set(live);
        Ok(())
    }
}

impl AcceleratorContext for CountingContext {
    type Image = Handle;
    type Buffer = Handle;

    fn device_name(&self) -> &str {
        "counting"
    }

    fn allocate_image(&self, _request: &ImageRequest) -> ContextResult<Handle> {
        Ok(self.allocate())
    }

    fn allocate_buffer(&self, _bytes: usize) -> ContextResult<Handle> {
        Ok(self.allocate())
    }

    fn release_image(&self, image: Handle) -> ContextResult<()> {
        self.release(image)
    }

    fn release_buffer(&self, buffer: Handle) -> ContextResult<()> {
        self.release(buffer)
    }

    fn submit_barrier(&self, barrier: &PipelineBarrier) -> ContextResult<()> {
        self.submitted.borrow_mut().push(barrier.clone());
        Ok(())
    }
}
