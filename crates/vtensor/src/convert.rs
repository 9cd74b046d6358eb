//! Type-erased tensor handles for the surrounding framework.
//!
//! The framework passes tensors around without knowing which backend owns
//! them. [`GenericTensor`] carries the metadata every backend agrees on and
//! boxes the backend payload; [`as_view`] and [`as_view_mut`] recover the
//! accelerator view after checking the device tag.

use std::any::Any;
use std::fmt;

use crate::context::AcceleratorContext;
use crate::descriptor::Dims;
use crate::dtype::DType;
use crate::error::{StorageError, StorageResult};
use crate::view::{QuantParams, TensorView};

/// Device that owns a generic tensor's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Host,
    Accelerator,
}

pub struct GenericTensor {
    device: DeviceKind,
    dtype: DType,
    sizes: Dims,
    strides: Dims,
    quant: Option<QuantParams>,
    payload: Box<dyn Any>,
}

impl GenericTensor {
    /// Wraps a host-resident payload.
    pub fn host<T: Any>(dtype: DType, sizes: &[usize], strides: &[usize], payload: T) -> Self {
        GenericTensor {
            device: DeviceKind::Host,
            dtype,
            sizes: Dims::from_slice(sizes),
            strides: Dims::from_slice(strides),
            quant: None,
            payload: Box::new(payload),
        }
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Quantization parameters when converted through [`into_generic_quantized`].
    pub fn quant_params(&self) -> Option<QuantParams> {
        self.quant
    }

    pub fn is_quantized(&self) -> bool {
        self.quant.is_some()
    }

    /// Takes the accelerator view back out of the handle.
    pub fn into_view<C>(self) -> StorageResult<TensorView<C>>
    where
        C: AcceleratorContext + 'static,
    {
        expect_accelerator(self.device)?;
        self.payload
            .downcast::<TensorView<C>>()
            .map(|view| *view)
            .map_err(|_| payload_mismatch::<C>())
    }
}

impl fmt::Debug for GenericTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericTensor")
            .field("device", &self.device)
            .field("dtype", &self.dtype)
            .field("sizes", &self.sizes)
            .field("strides", &self.strides)
            .field("quant", &self.quant)
            .finish_non_exhaustive()
    }
}

/// Wraps a view in a generic handle tagged with the accelerator device.
pub fn into_generic<C>(view: TensorView<C>) -> GenericTensor
where
    C: AcceleratorContext + 'static,
{
    wrap(view, None)
}

/// Like [`into_generic`], carrying the view's quantization parameters.
///
/// Fails when the view is not flagged as quantized.
pub fn into_generic_quantized<C>(view: TensorView<C>) -> StorageResult<GenericTensor>
where
    C: AcceleratorContext + 'static,
{
    if !view.is_quantized() {
        return Err(StorageError::invariant(
            "quantized conversion requested for a non-quantized view",
        ));
    }
    let quant = view.quant_params();
    Ok(wrap(view, Some(quant)))
}

fn wrap<C>(view: TensorView<C>, quant: Option<QuantParams>) -> GenericTensor
where
    C: AcceleratorContext + 'static,
{
    GenericTensor {
        device: DeviceKind::Accelerator,
        dtype: view.dtype(),
        sizes: Dims::from_slice(view.sizes()),
        strides: Dims::from_slice(view.strides()),
        quant,
        payload: Box::new(view),
    }
}

pub fn as_view<C>(tensor: &GenericTensor) -> StorageResult<&TensorView<C>>
where
    C: AcceleratorContext + 'static,
{
    expect_accelerator(tensor.device)?;
    tensor
        .payload
        .downcast_ref::<TensorView<C>>()
        .ok_or_else(payload_mismatch::<C>)
}

pub fn as_view_mut<C>(tensor: &mut GenericTensor) -> StorageResult<&mut TensorView<C>>
where
    C: AcceleratorContext + 'static,
{
    expect_accelerator(tensor.device)?;
    tensor
        .payload
        .downcast_mut::<TensorView<C>>()
        .ok_or_else(payload_mismatch::<C>)
}

fn expect_accelerator(device: DeviceKind) -> StorageResult<()> {
    if device != DeviceKind::Accelerator {
        return Err(StorageError::invariant(format!(
            "expected an accelerator tensor, found {device:?}"
        )));
    }
    Ok(())
}

fn payload_mismatch<C>() -> StorageError {
    StorageError::invariant(format!(
        "accelerator payload is not a view over {}",
        std::any::type_name::<C>()
    ))
}
