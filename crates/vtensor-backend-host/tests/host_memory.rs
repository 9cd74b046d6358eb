use std::sync::Arc;

use anyhow::{Context as _, Result};
use vtensor::{
    DType, DeviceResource, MemoryAccess, PipelineBarrier, PipelineStage, StorageConfig,
    StorageKind, TensorOptions, TensorView,
};
use vtensor_backend_host::HostContext;

fn options(dtype: DType, kind: StorageKind) -> TensorOptions {
    TensorOptions::new(dtype)
        .config(StorageConfig::default())
        .storage(kind)
}

#[test]
fn dropping_last_view_returns_memory_to_pool() -> Result<()> {
    let context = Arc::new(HostContext::new());
    let view = TensorView::new(&context, &[3, 5], options(DType::F32, StorageKind::Buffer))?;
    let alias = view.clone();
    assert_eq!(context.live_resources()?, 1);

    drop(view);
    assert_eq!(context.live_resources()?, 1);
    drop(alias);
    assert_eq!(context.live_resources()?, 0);

    let _again = TensorView::new(&context, &[3, 5], options(DType::F32, StorageKind::Buffer))?;
    let stats = context.stats()?;
    assert_eq!(stats.pool_hits, 1);
    assert_eq!(stats.releases, 1);
    Ok(())
}

#[test]
fn buffer_allocation_uses_padded_length() -> Result<()> {
    let context = Arc::new(HostContext::new());
    let view = TensorView::new(&context, &[2, 3], options(DType::F16, StorageKind::Buffer))?;
    let id = view
        .read()
        .buffer(PipelineStage::HOST)?
        .resource_id();
    assert_eq!(context.read_bytes(id)?.len(), view.gpu_nbytes());
    assert_eq!(view.gpu_nbytes(), 2 * 4 * 2);
    Ok(())
}

#[test]
fn image_allocation_uses_clamped_extents() -> Result<()> {
    let context = Arc::new(HostContext::new());
    let view = TensorView::new(&context, &[0, 7], options(DType::U8, StorageKind::Texture3D))?;
    let image = view.read().image(PipelineStage::HOST)?;
    assert_eq!(image.request().extents.0, [7, 1, 1]);
    assert_eq!(context.kind_of(image.resource_id())?, StorageKind::Texture3D);
    Ok(())
}

#[test]
fn staged_upload_orders_host_write_before_compute_read() -> Result<()> {
    let context = Arc::new(HostContext::new());
    let mut view = TensorView::new(&context, &[8], options(DType::U8, StorageKind::Buffer))?;
    let mut batch = PipelineBarrier::new();

    let id = view
        .write()
        .buffer(&mut batch, PipelineStage::HOST, MemoryAccess::WRITE)?
        .resource_id();
    context.write_bytes(id, 0, &[1, 2, 3, 4, 5, 6, 7, 8])?;
    view.write()
        .buffer(&mut batch, PipelineStage::COMPUTE, MemoryAccess::READ)?;
    batch.submit(context.as_ref())?;

    let log = context.barrier_log()?;
    let submitted = log.first().context("no barrier submitted")?;
    assert_eq!(submitted.src_stage(), PipelineStage::HOST);
    assert_eq!(submitted.dst_stage(), PipelineStage::COMPUTE);
    assert_eq!(submitted.buffers()[0].resource, id);
    assert_eq!(&context.read_bytes(id)?[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    Ok(())
}

#[test]
fn exhausted_memory_surfaces_as_context_error() {
    let context = Arc::new(HostContext::new().with_memory_limit(64));
    let err = TensorView::new(&context, &[64], options(DType::F32, StorageKind::Buffer))
        .unwrap_err();
    assert!(matches!(
        err,
        vtensor::StorageError::Context(vtensor::ContextError::Allocation { .. })
    ));
}
