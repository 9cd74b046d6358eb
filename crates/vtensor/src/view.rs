//! Tensor views over shared accelerator storage.
//!
//! A [`TensorView`] is a cheap handle: logical metadata plus an `Rc` to the
//! [`StorageBacking`] that owns the memory. Cloning a view aliases the same
//! backing, so every clone observes the same last-access record. The `Rc`
//! also makes views `!Send`, pinning all submission to one thread.
//!
//! Access comes in two capabilities. [`TensorView::read`] yields a
//! [`ReadAccess`] that hands out resources for reading without touching the
//! record. [`TensorView::write`] yields a [`WriteAccess`] that runs the
//! barrier protocol for an explicit stage and access mask.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::barrier::{LastAccess, MemoryAccess, PipelineBarrier, PipelineStage};
use crate::config::StorageConfig;
use crate::context::AcceleratorContext;
use crate::descriptor::{MemoryFormat, ResourceDescriptor, StorageKind, UVec3, UVec4};
use crate::dtype::{DType, TextureFormat};
use crate::error::{ShapeError, StorageError, StorageResult};
use crate::storage::StorageBacking;

/// Creation options for a view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorOptions {
    pub dtype: DType,
    /// `None` picks the config's default storage kind.
    pub storage: Option<StorageKind>,
    pub memory_format: MemoryFormat,
    pub config: StorageConfig,
}

impl TensorOptions {
    /// Contiguous options for `dtype` under the process-wide config.
    pub fn new(dtype: DType) -> Self {
        TensorOptions {
            dtype,
            storage: None,
            memory_format: MemoryFormat::Contiguous,
            config: *StorageConfig::global(),
        }
    }

    pub fn storage(mut self, kind: StorageKind) -> Self {
        self.storage = Some(kind);
        self
    }

    pub fn memory_format(mut self, memory_format: MemoryFormat) -> Self {
        self.memory_format = memory_format;
        self
    }

    pub fn config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.unwrap_or(self.config.default_storage)
    }
}

/// Affine quantization parameters carried alongside a view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f64,
    pub zero_point: i64,
    pub quantized: bool,
}

impl Default for QuantParams {
    fn default() -> Self {
        QuantParams {
            scale: 1.0,
            zero_point: 0,
            quantized: false,
        }
    }
}

pub struct TensorView<C: AcceleratorContext> {
    descriptor: ResourceDescriptor,
    config: StorageConfig,
    quant: QuantParams,
    storage: Rc<StorageBacking<C>>,
}

impl<C: AcceleratorContext> Clone for TensorView<C> {
    fn clone(&self) -> Self {
        TensorView {
            descriptor: self.descriptor.clone(),
            config: self.config,
            quant: self.quant,
            storage: Rc::clone(&self.storage),
        }
    }
}

impl<C: AcceleratorContext> fmt::Debug for TensorView<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("dtype", &self.descriptor.dtype())
            .field("sizes", &self.descriptor.sizes())
            .field("gpu_sizes", &self.descriptor.gpu_sizes())
            .field("quant", &self.quant)
            .field("storage", &self.storage)
            .finish()
    }
}

impl<C: AcceleratorContext> TensorView<C> {
    /// Allocates a view with strides implied by the memory format.
    pub fn new(context: &Arc<C>, sizes: &[usize], options: TensorOptions) -> StorageResult<Self> {
        let descriptor = ResourceDescriptor::new(
            sizes,
            options.dtype,
            options.storage_kind(),
            options.memory_format,
            &options.config,
        )?;
        Self::allocate(context, descriptor, options.config, QuantParams::default())
    }

    /// Allocates a view with explicit strides; `options.memory_format` is
    /// replaced by the format the strides describe.
    pub fn with_strides(
        context: &Arc<C>,
        sizes: &[usize],
        strides: &[usize],
        options: TensorOptions,
    ) -> StorageResult<Self> {
        let descriptor = ResourceDescriptor::with_strides(
            sizes,
            strides,
            options.dtype,
            options.storage_kind(),
            &options.config,
        )?;
        Self::allocate(context, descriptor, options.config, QuantParams::default())
    }

    /// Allocates a view flagged as quantized with the given parameters.
    pub fn quantized(
        context: &Arc<C>,
        sizes: &[usize],
        options: TensorOptions,
        scale: f64,
        zero_point: i64,
    ) -> StorageResult<Self> {
        let descriptor = ResourceDescriptor::new(
            sizes,
            options.dtype,
            options.storage_kind(),
            options.memory_format,
            &options.config,
        )?;
        let quant = QuantParams {
            scale,
            zero_point,
            quantized: true,
        };
        Self::allocate(context, descriptor, options.config, quant)
    }

    fn allocate(
        context: &Arc<C>,
        descriptor: ResourceDescriptor,
        config: StorageConfig,
        quant: QuantParams,
    ) -> StorageResult<Self> {
        let storage = StorageBacking::new(Arc::clone(context), &descriptor)?;
        Ok(TensorView {
            descriptor,
            config,
            quant,
            storage: Rc::new(storage),
        })
    }

    /// A second view over this backing with different logical sizes.
    ///
    /// The new shape must resolve to the same storage kind, extents, and
    /// padded length as the backing.
    pub fn alias_with_sizes(&self, sizes: &[usize]) -> StorageResult<Self> {
        let memory_format = match self.descriptor.memory_format() {
            MemoryFormat::ChannelsLast if sizes.len() == 4 => MemoryFormat::ChannelsLast,
            _ => MemoryFormat::Contiguous,
        };
        let descriptor = ResourceDescriptor::new(
            sizes,
            self.descriptor.dtype(),
            self.storage.kind(),
            memory_format,
            &self.config,
        )?;
        if descriptor.extents() != self.storage.extents()
            || descriptor.buffer_length() != self.storage.buffer_length()
        {
            return Err(ShapeError::IncompatibleAlias {
                requested: sizes.to_vec(),
                requested_len: descriptor.buffer_length(),
                requested_extents: descriptor.extents().0,
                backing_len: self.storage.buffer_length(),
                backing_extents: self.storage.extents().0,
            }
            .into());
        }
        Ok(TensorView {
            descriptor,
            config: self.config,
            quant: self.quant,
            storage: Rc::clone(&self.storage),
        })
    }

    pub fn read(&self) -> ReadAccess<'_, C> {
        ReadAccess {
            storage: &self.storage,
        }
    }

    pub fn write(&mut self) -> WriteAccess<'_, C> {
        WriteAccess {
            storage: &self.storage,
        }
    }

    /// Whether both views share one backing.
    pub fn aliases(&self, other: &TensorView<C>) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    /// Current last-access record of the backing.
    pub fn last_access(&self) -> LastAccess {
        self.storage.last_access()
    }

    /// The shared backing, for inspection only.
    ///
    /// Recording an access needs [`TensorView::write`], so a shared
    /// reference to a view cannot move the last-access record:
    ///
    /// ```compile_fail
    /// # use std::sync::Arc;
    /// # use vtensor::{DType, MemoryAccess, PipelineBarrier, PipelineStage, TensorOptions, TensorView};
    /// # use vtensor_backend_host::HostContext;
    /// fn touch(view: &TensorView<HostContext>, batch: &mut PipelineBarrier) {
    ///     let _ = view
    ///         .storage()
    ///         .transition(batch, PipelineStage::COMPUTE, MemoryAccess::WRITE);
    /// }
    /// ```
    ///
    /// ```compile_fail
    /// # use std::sync::Arc;
    /// # use vtensor::{DType, MemoryAccess, PipelineBarrier, PipelineStage, TensorOptions, TensorView};
    /// # use vtensor_backend_host::HostContext;
    /// fn touch(view: &TensorView<HostContext>, batch: &mut PipelineBarrier) {
    ///     let _ = view.write().buffer(batch, PipelineStage::COMPUTE, MemoryAccess::WRITE);
    /// }
    /// ```
    ///
    /// Inspection through the backing leaves the record alone:
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use vtensor::{DType, StorageConfig, StorageKind, TensorOptions, TensorView};
    /// # use vtensor_backend_host::HostContext;
    /// let context = Arc::new(HostContext::new());
    /// let options = TensorOptions::new(DType::F32)
    ///     .config(StorageConfig::default())
    ///     .storage(StorageKind::Buffer);
    /// let view = TensorView::new(&context, &[4, 4], options)?;
    /// view.storage().peek_buffer()?;
    /// assert!(view.last_access().is_sentinel());
    /// # Ok::<(), vtensor::StorageError>(())
    /// ```
    pub fn storage(&self) -> &StorageBacking<C> {
        &self.storage
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn dtype(&self) -> DType {
        self.descriptor.dtype()
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    pub fn memory_format(&self) -> MemoryFormat {
        self.descriptor.memory_format()
    }

    pub fn sizes(&self) -> &[usize] {
        self.descriptor.sizes()
    }

    pub fn strides(&self) -> &[usize] {
        self.descriptor.strides()
    }

    pub fn gpu_sizes(&self) -> &[usize] {
        self.descriptor.gpu_sizes()
    }

    pub fn gpu_strides(&self) -> &[usize] {
        self.descriptor.gpu_strides()
    }

    pub fn sizes_uvec4(&self) -> UVec4 {
        self.descriptor.sizes_uvec4()
    }

    pub fn strides_uvec4(&self) -> UVec4 {
        self.descriptor.strides_uvec4()
    }

    pub fn gpu_sizes_uvec4(&self) -> UVec4 {
        self.descriptor.gpu_sizes_uvec4()
    }

    pub fn gpu_strides_uvec4(&self) -> UVec4 {
        self.descriptor.gpu_strides_uvec4()
    }

    pub fn extents(&self) -> UVec3 {
        self.storage.extents()
    }

    pub fn numel(&self) -> usize {
        self.descriptor.numel()
    }

    pub fn gpu_numel(&self) -> usize {
        self.descriptor.gpu_numel()
    }

    pub fn nbytes(&self) -> usize {
        self.descriptor.nbytes()
    }

    pub fn gpu_nbytes(&self) -> usize {
        self.descriptor.gpu_nbytes()
    }

    pub fn texture_format(&self) -> TextureFormat {
        self.descriptor.texture_format()
    }

    /// Element type an image of [`Self::texture_format`] decodes to.
    pub fn texture_dtype(&self) -> DType {
        self.texture_format().dtype()
    }

    pub fn quant_params(&self) -> QuantParams {
        self.quant
    }

    pub fn is_quantized(&self) -> bool {
        self.quant.quantized
    }

    pub fn set_quantized(&mut self) {
        self.quant.quantized = true;
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.quant.scale = scale;
    }

    pub fn set_zero_point(&mut self, zero_point: i64) {
        self.quant.zero_point = zero_point;
    }

    pub fn scale(&self) -> f64 {
        self.quant.scale
    }

    /// Scale narrowed to `f32`; fails when a finite scale leaves `f32` range.
    pub fn scale_f32(&self) -> StorageResult<f32> {
        let scale = self.quant.scale;
        let narrowed = scale as f32;
        if scale.is_finite() && !narrowed.is_finite() {
            return Err(StorageError::Narrowing {
                what: "scale",
                value: scale.to_string(),
                target: "f32",
            });
        }
        Ok(narrowed)
    }

    pub fn zero_point(&self) -> i64 {
        self.quant.zero_point
    }

    pub fn zero_point_i32(&self) -> StorageResult<i32> {
        i32::try_from(self.quant.zero_point).map_err(|_| StorageError::Narrowing {
            what: "zero point",
            value: self.quant.zero_point.to_string(),
            target: "i32",
        })
    }
}

/// Read capability: resources for reading, record untouched.
pub struct ReadAccess<'a, C: AcceleratorContext> {
    storage: &'a StorageBacking<C>,
}

impl<'a, C: AcceleratorContext> ReadAccess<'a, C> {
    pub fn image(&self, stage: PipelineStage) -> StorageResult<&'a C::Image> {
        tracing::trace!(resource = ?self.storage.resource_id(), ?stage, "read-only image access");
        self.storage.peek_image()
    }

    pub fn buffer(&self, stage: PipelineStage) -> StorageResult<&'a C::Buffer> {
        tracing::trace!(resource = ?self.storage.resource_id(), ?stage, "read-only buffer access");
        self.storage.peek_buffer()
    }
}

/// Read-write capability: every access runs the barrier protocol.
pub struct WriteAccess<'a, C: AcceleratorContext> {
    storage: &'a StorageBacking<C>,
}

impl<'a, C: AcceleratorContext> WriteAccess<'a, C> {
    pub fn image(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) -> StorageResult<&'a C::Image> {
        self.storage.image(barrier, stage, access)
    }

    pub fn buffer(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) -> StorageResult<&'a C::Buffer> {
        self.storage.buffer(barrier, stage, access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingContext;

    fn options(dtype: DType) -> TensorOptions {
        TensorOptions::new(dtype).config(StorageConfig::default())
    }

    #[test]
    fn clones_share_access_state() {
        let context = Arc::new(CountingContext::default());
        let mut view = TensorView::new(&context, &[2, 3, 4], options(DType::F32)).unwrap();
        let alias = view.clone();
        assert!(view.aliases(&alias));

        let mut batch = PipelineBarrier::new();
        view.write()
            .image(&mut batch, PipelineStage::COMPUTE, MemoryAccess::WRITE)
            .unwrap();
        assert_eq!(alias.last_access(), view.last_access());
        assert_eq!(context.live(), 1);
        drop(view);
        assert_eq!(context.live(), 1);
        drop(alias);
        assert_eq!(context.live(), 0);
    }

    #[test]
    fn hazards_across_views_are_batched_and_submitted() {
        let context = Arc::new(CountingContext::default());
        let mut lhs = TensorView::new(&context, &[4, 4], options(DType::F32)).unwrap();
        let mut rhs = TensorView::new(&context, &[4, 4], options(DType::F32)).unwrap();
        let mut batch = PipelineBarrier::new();

        for view in [&mut lhs, &mut rhs] {
            view.write()
                .image(&mut batch, PipelineStage::TRANSFER, MemoryAccess::WRITE)
                .unwrap();
        }
        assert!(!batch.submit(context.as_ref()).unwrap());

        for view in [&mut lhs, &mut rhs] {
            view.write()
                .image(&mut batch, PipelineStage::COMPUTE, MemoryAccess::READ)
                .unwrap();
        }
        assert_eq!(batch.images().len(), 2);
        assert!(batch.submit(context.as_ref()).unwrap());
        assert!(batch.is_empty());

        let submitted = context.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].src_stage(), PipelineStage::TRANSFER);
        assert_eq!(submitted[0].dst_stage(), PipelineStage::COMPUTE);
    }

    #[test]
    fn read_capability_never_records() {
        let context = Arc::new(CountingContext::default());
        let view = TensorView::new(
            &context,
            &[8],
            options(DType::U8).storage(StorageKind::Buffer),
        )
        .unwrap();
        view.read().buffer(PipelineStage::COMPUTE).unwrap();
        assert!(view.last_access().is_sentinel());
        assert!(view.read().image(PipelineStage::COMPUTE).is_err());
    }

    #[test]
    fn default_storage_comes_from_config() {
        let context = Arc::new(CountingContext::default());
        let config = StorageConfig {
            default_storage: StorageKind::Buffer,
            ..StorageConfig::default()
        };
        let view = TensorView::new(&context, &[3], TensorOptions::new(DType::F32).config(config))
            .unwrap();
        assert_eq!(view.storage_kind(), StorageKind::Buffer);
        assert_eq!(view.gpu_sizes(), &[4]);
    }

    #[test]
    fn explicit_strides_pick_channels_last() {
        let context = Arc::new(CountingContext::default());
        let view = TensorView::with_strides(
            &context,
            &[1, 3, 2, 2],
            &[12, 1, 6, 3],
            options(DType::F32).storage(StorageKind::Buffer),
        )
        .unwrap();
        assert_eq!(view.memory_format(), MemoryFormat::ChannelsLast);
        assert_eq!(view.gpu_sizes(), &[1, 4, 2, 2]);
    }

    #[test]
    fn quantized_constructor_sets_params() {
        let context = Arc::new(CountingContext::default());
        let mut view =
            TensorView::quantized(&context, &[4, 4], options(DType::QUInt8), 0.25, 3).unwrap();
        assert!(view.is_quantized());
        assert_eq!(view.scale_f32().unwrap(), 0.25);
        assert_eq!(view.zero_point_i32().unwrap(), 3);
        assert_eq!(view.texture_format(), TextureFormat::Rgba8Ui);

        view.set_zero_point(i64::from(i32::MAX) + 1);
        assert!(matches!(
            view.zero_point_i32(),
            Err(StorageError::Narrowing { target: "i32", .. })
        ));
        view.set_scale(1e300);
        assert!(matches!(
            view.scale_f32(),
            Err(StorageError::Narrowing { target: "f32", .. })
        ));
    }

    #[test]
    fn setters_mark_plain_view_quantized() {
        let context = Arc::new(CountingContext::default());
        let mut view = TensorView::new(&context, &[4], options(DType::QInt8)).unwrap();
        assert!(!view.is_quantized());
        view.set_quantized();
        view.set_scale(0.5);
        view.set_zero_point(-2);
        assert_eq!(
            view.quant_params(),
            QuantParams {
                scale: 0.5,
                zero_point: -2,
                quantized: true
            }
        );
    }

    #[test]
    fn alias_requires_matching_backing() {
        let context = Arc::new(CountingContext::default());
        let view = TensorView::new(
            &context,
            &[2, 8],
            options(DType::F32).storage(StorageKind::Buffer),
        )
        .unwrap();
        let reshaped = view.alias_with_sizes(&[4, 4]).unwrap();
        assert!(reshaped.aliases(&view));
        assert_eq!(reshaped.sizes(), &[4, 4]);

        let err = view.alias_with_sizes(&[16, 1]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Shape(ShapeError::IncompatibleAlias { .. })
        ));
    }

    #[test]
    fn packed_properties_follow_descriptor() {
        let context = Arc::new(CountingContext::default());
        let view = TensorView::new(&context, &[1, 3, 5, 7], options(DType::F16)).unwrap();
        assert_eq!(view.sizes_uvec4(), UVec4([7, 5, 3, 1]));
        assert_eq!(view.gpu_sizes_uvec4(), UVec4([7, 5, 4, 1]));
        assert_eq!(view.extents(), UVec3([7, 5, 1]));
        assert_eq!(view.nbytes(), 105 * 2);
        assert_eq!(view.gpu_nbytes(), 140 * 2);
        assert_eq!(view.texture_dtype(), DType::F16);
    }
}
