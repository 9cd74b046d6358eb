//! Host-memory implementation of [`AcceleratorContext`].
//!
//! Every image and buffer is a zero-initialised `Vec<u8>` owned by the
//! context. Released allocations go back into a pool keyed by byte size and
//! are reused (and re-zeroed) by the next request of the same size. Pooled
//! bytes count against the memory limit and are evicted before a request is
//! refused; the pool itself is capped separately. Submitted
//! barrier batches are validated against the live resource table and kept in
//! a log that tests can inspect.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use vtensor::{
    AcceleratorContext, ContextError, ContextResult, DeviceResource, ImageRequest,
    PipelineBarrier, ResourceId, StorageKind,
};

/// Image handle issued by [`HostContext`].
#[derive(Debug)]
pub struct HostImage {
    id: ResourceId,
    request: ImageRequest,
}

impl HostImage {
    pub fn request(&self) -> &ImageRequest {
        &self.request
    }
}

impl DeviceResource for HostImage {
    fn resource_id(&self) -> ResourceId {
        self.id
    }
}

/// Buffer handle issued by [`HostContext`].
#[derive(Debug)]
pub struct HostBuffer {
    id: ResourceId,
    bytes: usize,
}

impl HostBuffer {
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl DeviceResource for HostBuffer {
    fn resource_id(&self) -> ResourceId {
        self.id
    }
}

/// Counters describing context activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub allocations: usize,
    pub releases: usize,
    pub pool_hits: usize,
    pub submissions: usize,
    pub barriers: usize,
    pub live_bytes: usize,
    pub pooled_bytes: usize,
    pub evictions: usize,
}

struct Allocation {
    kind: StorageKind,
    memory: Vec<u8>,
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    live: HashMap<ResourceId, Allocation>,
    pool: HashMap<usize, Vec<Vec<u8>>>,
    log: Vec<PipelineBarrier>,
    stats: HostStats,
}

/// Default cap on bytes kept for reuse after release.
pub const DEFAULT_POOL_LIMIT: usize = 64 << 20;

pub struct HostContext {
    name: String,
    memory_limit: Option<usize>,
    pool_limit: usize,
    state: Mutex<HostState>,
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HostContext {
    pub fn new() -> Self {
        HostContext {
            name: "host".to_string(),
            memory_limit: None,
            pool_limit: DEFAULT_POOL_LIMIT,
            state: Mutex::new(HostState::default()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Caps the live plus pooled bytes held at once.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Caps the bytes kept for reuse; releases beyond it are freed.
    pub fn with_pool_limit(mut self, bytes: usize) -> Self {
        self.pool_limit = bytes;
        self
    }

    fn state(&self) -> ContextResult<MutexGuard<'_, HostState>> {
        self.state
            .lock()
            .map_err(|_| ContextError::Submission("host context state mutex poisoned".into()))
    }

    pub fn stats(&self) -> ContextResult<HostStats> {
        Ok(self.state()?.stats)
    }

    pub fn live_resources(&self) -> ContextResult<usize> {
        Ok(self.state()?.live.len())
    }

    pub fn is_live(&self, id: ResourceId) -> ContextResult<bool> {
        Ok(self.state()?.live.contains_key(&id))
    }

    /// Storage kind recorded for a live resource.
    pub fn kind_of(&self, id: ResourceId) -> ContextResult<StorageKind> {
        let state = self.state()?;
        state
            .live
            .get(&id)
            .map(|allocation| allocation.kind)
            .ok_or(ContextError::UnknownResource(id.0))
    }

    /// Every barrier batch submitted so far, in order.
    pub fn barrier_log(&self) -> ContextResult<Vec<PipelineBarrier>> {
        Ok(self.state()?.log.clone())
    }

    pub fn clear_barrier_log(&self) -> ContextResult<()> {
        self.state()?.log.clear();
        Ok(())
    }

    /// Copies `data` into a live resource at `offset`.
    pub fn write_bytes(&self, id: ResourceId, offset: usize, data: &[u8]) -> ContextResult<()> {
        let mut state = self.state()?;
        let allocation = state
            .live
            .get_mut(&id)
            .ok_or(ContextError::UnknownResource(id.0))?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= allocation.memory.len())
            .ok_or_else(|| {
                ContextError::Submission(format!(
                    "write of {} bytes at offset {offset} exceeds resource {id} of {} bytes",
                    data.len(),
                    allocation.memory.len()
                ))
            })?;
        allocation.memory[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Snapshot of a live resource's contents.
    pub fn read_bytes(&self, id: ResourceId) -> ContextResult<Vec<u8>> {
        let state = self.state()?;
        state
            .live
            .get(&id)
            .map(|allocation| allocation.memory.clone())
            .ok_or(ContextError::UnknownResource(id.0))
    }

    fn allocate(&self, kind: StorageKind, bytes: usize) -> ContextResult<ResourceId> {
        let mut state = self.state()?;
        let memory = match state.take_pooled(bytes) {
            Some(mut memory) => {
                memory.fill(0);
                state.stats.pool_hits += 1;
                memory
            }
            None => {
                if let Some(limit) = self.memory_limit {
                    state.evict_until(limit.saturating_sub(bytes));
                    let requested = state.stats.live_bytes.saturating_add(bytes);
                    if requested > limit {
                        return Err(ContextError::Allocation {
                            bytes,
                            reason: format!(
                                "{} of {limit} bytes already live on {}",
                                state.stats.live_bytes, self.name
                            ),
                        });
                    }
                }
                vec![0u8; bytes]
            }
        };

        state.next_id += 1;
        let id = ResourceId(state.next_id);
        state.live.insert(id, Allocation { kind, memory });
        state.stats.allocations += 1;
        state.stats.live_bytes += bytes;
        tracing::trace!(resource = %id, ?kind, bytes, "host allocation");
        Ok(id)
    }

    fn release(&self, id: ResourceId) -> ContextResult<()> {
        let mut state = self.state()?;
        let allocation = state
            .live
            .remove(&id)
            .ok_or(ContextError::UnknownResource(id.0))?;
        let bytes = allocation.memory.len();
        state.stats.releases += 1;
        state.stats.live_bytes -= bytes;
        if state.stats.pooled_bytes.saturating_add(bytes) <= self.pool_limit {
            state.stats.pooled_bytes += bytes;
            state.pool.entry(bytes).or_default().push(allocation.memory);
        }
        tracing::trace!(resource = %id, bytes, "host release");
        Ok(())
    }
}

impl HostState {
    fn take_pooled(&mut self, bytes: usize) -> Option<Vec<u8>> {
        let memory = self.pool.get_mut(&bytes).and_then(Vec::pop)?;
        self.stats.pooled_bytes -= bytes;
        Some(memory)
    }

    /// Frees pooled memory until live plus pooled bytes fit in `budget`.
    fn evict_until(&mut self, budget: usize) {
        while self.stats.live_bytes + self.stats.pooled_bytes > budget {
            let Some(&size) = self.pool.keys().max() else {
                break;
            };
            let freed = self.pool.get_mut(&size).and_then(Vec::pop);
            if self.pool.get(&size).is_some_and(Vec::is_empty) {
                self.pool.remove(&size);
            }
            if let Some(memory) = freed {
                self.stats.pooled_bytes -= memory.len();
                self.stats.evictions += 1;
                tracing::trace!(bytes = memory.len(), "evicted pooled allocation");
            }
        }
    }
}

impl AcceleratorContext for HostContext {
    type Image = HostImage;
    type Buffer = HostBuffer;

    fn device_name(&self) -> &str {
        &self.name
    }

    fn allocate_image(&self, request: &ImageRequest) -> ContextResult<HostImage> {
        let bytes = request.bytes()?;
        if !request.kind.is_image() {
            return Err(ContextError::Allocation {
                bytes,
                reason: format!("{:?} is not an image kind", request.kind),
            });
        }
        let id = self.allocate(request.kind, bytes)?;
        Ok(HostImage {
            id,
            request: *request,
        })
    }

    fn allocate_buffer(&self, bytes: usize) -> ContextResult<HostBuffer> {
        let id = self.allocate(StorageKind::Buffer, bytes)?;
        Ok(HostBuffer { id, bytes })
    }

    fn release_image(&self, image: HostImage) -> ContextResult<()> {
        self.release(image.id)
    }

    fn release_buffer(&self, buffer: HostBuffer) -> ContextResult<()> {
        self.release(buffer.id)
    }

    fn submit_barrier(&self, barrier: &PipelineBarrier) -> ContextResult<()> {
        let mut state = self.state()?;
        let referenced = barrier
            .buffers()
            .iter()
            .map(|b| b.resource)
            .chain(barrier.images().iter().map(|b| b.resource));
        for id in referenced {
            if !state.live.contains_key(&id) {
                return Err(ContextError::UnknownResource(id.0));
            }
        }
        state.stats.submissions += 1;
        state.stats.barriers += barrier.len();
        state.log.push(barrier.clone());
        Ok(())
    }
}
