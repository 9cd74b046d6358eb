//! Conformance checks any [`AcceleratorContext`] must pass.
//!
//! Each function drives the storage layer through the public API against a
//! caller-provided context and returns an error describing the first
//! violated expectation.

use std::sync::Arc;

use anyhow::{ensure, Context as _, Result};
use vtensor::{
    add_buffer_barrier, as_view, into_generic, into_generic_quantized, AcceleratorContext, DType,
    DeviceResource, LastAccess, MemoryAccess, MemoryFormat, PipelineBarrier, PipelineStage,
    StorageConfig, StorageKind, TensorOptions, TensorView,
};

const KINDS: [StorageKind; 3] = [
    StorageKind::Texture3D,
    StorageKind::Texture2D,
    StorageKind::Buffer,
];

fn options(dtype: DType, kind: StorageKind) -> TensorOptions {
    TensorOptions::new(dtype)
        .config(StorageConfig::default())
        .storage(kind)
}

/// Padded counts cover the logical shape and stay vector aligned.
pub fn padding_invariants<C: AcceleratorContext>(context: &Arc<C>) -> Result<()> {
    let shapes: [&[usize]; 7] = [&[], &[1], &[5], &[3, 7], &[2, 5, 9], &[3, 6, 1, 2], &[0, 4]];
    for kind in KINDS {
        for sizes in shapes {
            let view = TensorView::new(context, sizes, options(DType::F32, kind))
                .with_context(|| format!("allocating {sizes:?} as {kind:?}"))?;
            ensure!(
                view.gpu_numel() >= view.numel(),
                "{kind:?} {sizes:?}: gpu_numel {} < numel {}",
                view.gpu_numel(),
                view.numel()
            );
            ensure!(
                view.gpu_numel() % 4 == 0,
                "{kind:?} {sizes:?}: gpu_numel {} not a multiple of 4",
                view.gpu_numel()
            );
            ensure!(
                view.sizes().len() == view.strides().len(),
                "{kind:?} {sizes:?}: rank mismatch between sizes and strides"
            );
            ensure!(view.storage().is_allocated());
        }
    }
    Ok(())
}

/// Write then read on one resource yields exactly one barrier.
pub fn write_then_read_inserts_barrier<C: AcceleratorContext>(context: &Arc<C>) -> Result<()> {
    for kind in KINDS {
        let mut view = TensorView::new(context, &[2, 4, 4], options(DType::F16, kind))?;
        let mut batch = PipelineBarrier::new();
        access(&mut view, &mut batch, PipelineStage::TRANSFER, MemoryAccess::WRITE)?;
        ensure!(batch.is_empty(), "{kind:?}: first access must not need a barrier");

        access(&mut view, &mut batch, PipelineStage::COMPUTE, MemoryAccess::READ)?;
        ensure!(batch.len() == 1, "{kind:?}: expected one barrier, got {}", batch.len());
        ensure!(batch.src_stage() == PipelineStage::TRANSFER);
        ensure!(batch.dst_stage() == PipelineStage::COMPUTE);
        ensure!(batch.images().len() == usize::from(kind.is_image()));
        ensure!(
            batch.submit(context.as_ref())?,
            "{kind:?}: non-empty batch was not submitted"
        );
        ensure!(batch.is_empty());
    }
    Ok(())
}

/// Two reads in a row never produce a barrier.
pub fn read_after_read_is_free<C: AcceleratorContext>(context: &Arc<C>) -> Result<()> {
    let mut view = TensorView::new(context, &[16], options(DType::U8, StorageKind::Buffer))?;
    let mut batch = PipelineBarrier::new();
    for stage in [PipelineStage::COMPUTE, PipelineStage::TRANSFER, PipelineStage::HOST] {
        access(&mut view, &mut batch, stage, MemoryAccess::READ)?;
    }
    ensure!(batch.is_empty(), "read-after-read inserted {} barriers", batch.len());
    ensure!(!batch.submit(context.as_ref())?, "empty batch must not be submitted");
    Ok(())
}

/// The read capability hands out resources without recording anything.
pub fn read_capability_leaves_record<C: AcceleratorContext>(context: &Arc<C>) -> Result<()> {
    let mut image = TensorView::new(context, &[4, 4], options(DType::F32, StorageKind::Texture3D))?;
    let mut batch = PipelineBarrier::new();
    access(&mut image, &mut batch, PipelineStage::COMPUTE, MemoryAccess::WRITE)?;
    let before = image.last_access();

    image.read().image(PipelineStage::TRANSFER)?;
    ensure!(image.last_access() == before, "read capability changed the record");
    ensure!(
        image.read().buffer(PipelineStage::TRANSFER).is_err(),
        "image storage must not expose a buffer"
    );
    Ok(())
}

/// Clones share one backing and observe each other's transitions.
pub fn clones_share_access_record<C: AcceleratorContext>(context: &Arc<C>) -> Result<()> {
    let mut view = TensorView::new(context, &[3, 3], options(DType::I32, StorageKind::Texture2D))?;
    let alias = view.clone();
    let mut batch = PipelineBarrier::new();
    access(&mut view, &mut batch, PipelineStage::HOST, MemoryAccess::WRITE)?;
    ensure!(alias.aliases(&view));
    ensure!(
        alias.last_access() == LastAccess::new(PipelineStage::HOST, MemoryAccess::WRITE),
        "alias did not observe the write"
    );
    Ok(())
}

/// Explicit barriers on untracked buffers reach the context.
pub fn explicit_buffer_barrier_submits<C: AcceleratorContext>(context: &Arc<C>) -> Result<()> {
    let staging = context.allocate_buffer(256)?;
    let mut batch = PipelineBarrier::new();
    add_buffer_barrier(
        &mut batch,
        staging.resource_id(),
        256,
        PipelineStage::HOST,
        MemoryAccess::WRITE,
        PipelineStage::TRANSFER,
        MemoryAccess::READ,
    );
    ensure!(batch.buffers().len() == 1);
    ensure!(batch.submit(context.as_ref())?);
    context.release_buffer(staging)?;
    Ok(())
}

/// Views survive a trip through the type-erased handle.
pub fn generic_round_trip<C: AcceleratorContext + 'static>(context: &Arc<C>) -> Result<()> {
    let channels_last =
        options(DType::QUInt8, StorageKind::Buffer).memory_format(MemoryFormat::ChannelsLast);
    let view = TensorView::quantized(context, &[1, 3, 4, 4], channels_last, 0.5, 128)?;
    let generic = into_generic_quantized(view)?;
    ensure!(generic.is_quantized());
    ensure!(generic.strides() == [48, 1, 12, 3]);
    let back = as_view::<C>(&generic)?;
    ensure!(back.zero_point_i32()? == 128);

    let plain = TensorView::new(context, &[2], options(DType::F32, StorageKind::Texture3D))?;
    ensure!(
        into_generic_quantized(plain.clone()).is_err(),
        "non-quantized view converted as quantized"
    );
    let generic = into_generic(plain);
    ensure!(!generic.is_quantized());
    Ok(())
}

fn access<C: AcceleratorContext>(
    view: &mut TensorView<C>,
    batch: &mut PipelineBarrier,
    stage: PipelineStage,
    mode: MemoryAccess,
) -> Result<()> {
    let kind = view.storage_kind();
    let write = view.write();
    if kind.is_image() {
        write.image(batch, stage, mode)?;
    } else {
        write.buffer(batch, stage, mode)?;
    }
    Ok(())
}
