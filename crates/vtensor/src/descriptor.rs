//! Resource sizing: padded shapes, packed vectors, and image extents.
//!
//! Logical sizes are what users see. The accelerator stores one axis rounded
//! up to a multiple of the vector width so shaders can work in four-lane
//! vectors. For images that axis is always the channel axis; for linear
//! buffers it is the fastest-moving axis of the memory format.
//!
//! Axes are addressed from the innermost end (`W = dims[-1]`, `H = dims[-2]`,
//! `C = dims[-3]`, `N = dims[-4]`) and read as 1 when absent.

use std::ops::Index;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::{RankPolicy, StorageConfig};
use crate::dtype::{DType, TextureFormat};
use crate::error::ShapeError;

/// Inline storage for sizes and strides; ranks above six spill to the heap.
pub type Dims = SmallVec<[usize; 6]>;

/// Largest rank representable in the packed four-component form.
pub const MAX_PACKED_RANK: usize = 4;

/// Channels held by one texel of every supported image format.
pub const TEXEL_CHANNELS: usize = 4;

/// Physical form of the accelerator allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    #[serde(rename = "texture3d")]
    Texture3D,
    #[serde(rename = "texture2d")]
    Texture2D,
    #[serde(rename = "buffer")]
    Buffer,
}

impl StorageKind {
    pub fn is_image(self) -> bool {
        !matches!(self, StorageKind::Buffer)
    }
}

/// Order in which logical axes are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryFormat {
    #[default]
    Contiguous,
    /// NHWC ordering of a rank-4 NCHW tensor.
    ChannelsLast,
}

/// Three unsigned components, used for image extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UVec3(pub [u32; 3]);

/// Four unsigned components packed innermost-first (`[W, H, C, N]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UVec4(pub [u32; 4]);

impl UVec3 {
    /// Product of the components, failing when it does not fit `usize`.
    pub fn element_count(&self) -> Result<usize, ShapeError> {
        let overflow = || ShapeError::ElementOverflow {
            sizes: self.0.iter().map(|&v| v as usize).collect(),
        };
        self.0.iter().try_fold(1usize, |acc, &v| {
            let v = usize::try_from(v).map_err(|_| overflow())?;
            acc.checked_mul(v).ok_or_else(overflow)
        })
    }
}

impl Index<usize> for UVec3 {
    type Output = u32;

    fn index(&self, index: usize) -> &u32 {
        &self.0[index]
    }
}

impl Index<usize> for UVec4 {
    type Output = u32;

    fn index(&self, index: usize) -> &u32 {
        &self.0[index]
    }
}

/// Complete sizing of one accelerator resource.
///
/// Built once per allocation and never mutated; every quantity derives from
/// the logical sizes, the memory format, the storage kind, and the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    kind: StorageKind,
    memory_format: MemoryFormat,
    dtype: DType,
    vector_width: usize,
    sizes: Dims,
    strides: Dims,
    gpu_sizes: Dims,
    gpu_strides: Dims,
    sizes_uvec4: UVec4,
    strides_uvec4: UVec4,
    gpu_sizes_uvec4: UVec4,
    gpu_strides_uvec4: UVec4,
    extents: UVec3,
    buffer_length: usize,
    allocation_bytes: usize,
}

impl ResourceDescriptor {
    /// Sizes a resource whose logical strides follow `memory_format`.
    pub fn new(
        sizes: &[usize],
        dtype: DType,
        kind: StorageKind,
        memory_format: MemoryFormat,
        config: &StorageConfig,
    ) -> Result<Self, ShapeError> {
        if memory_format == MemoryFormat::ChannelsLast && sizes.len() != 4 {
            return Err(ShapeError::ChannelsLastRank { rank: sizes.len() });
        }
        let strides = strides_for(sizes, memory_format)?;
        Self::build(sizes, &strides, memory_format, dtype, kind, config)
    }

    /// Sizes a resource with explicit logical strides.
    ///
    /// The memory format is inferred from the strides; layouts other than
    /// contiguous and channels-last are rejected.
    pub fn with_strides(
        sizes: &[usize],
        strides: &[usize],
        dtype: DType,
        kind: StorageKind,
        config: &StorageConfig,
    ) -> Result<Self, ShapeError> {
        if sizes.len() != strides.len() {
            return Err(ShapeError::RankStrideMismatch {
                rank: sizes.len(),
                strides: strides.len(),
            });
        }
        let memory_format = infer_memory_format(sizes, strides)?;
        Self::build(sizes, strides, memory_format, dtype, kind, config)
    }

    fn build(
        sizes: &[usize],
        strides: &[usize],
        memory_format: MemoryFormat,
        dtype: DType,
        kind: StorageKind,
        config: &StorageConfig,
    ) -> Result<Self, ShapeError> {
        let (sizes, strides): (Dims, Dims) = if sizes.is_empty() {
            (Dims::from_slice(&[1]), Dims::from_slice(&[1]))
        } else {
            (Dims::from_slice(sizes), Dims::from_slice(strides))
        };
        let numel = checked_numel(&sizes)?;

        let vector_width = config.vector_width;
        let gpu_sizes = match kind {
            StorageKind::Buffer => buffer_gpu_sizes(&sizes, memory_format, vector_width)?,
            StorageKind::Texture3D | StorageKind::Texture2D => {
                let folded = fold_dims(&sizes, config.rank_policy)?;
                texture_gpu_sizes(&folded, vector_width.max(TEXEL_CHANNELS))?
            }
        };
        let gpu_strides = strides_for(&gpu_sizes, memory_format)?;
        let buffer_length = checked_numel(&gpu_sizes)?;
        let extents = image_extents(&gpu_sizes, kind)?;
        let allocation_bytes = allocation_bytes(
            kind,
            extents,
            buffer_length.max(vector_width),
            dtype,
            &sizes,
        )?;

        let packed_sizes = fold_dims(&sizes, config.rank_policy)?;
        let packed_strides = fold_strides(&strides, config.rank_policy);
        let packed_gpu_sizes = fold_dims(&gpu_sizes, config.rank_policy)?;
        let packed_gpu_strides = fold_strides(&gpu_strides, config.rank_policy);

        Ok(ResourceDescriptor {
            kind,
            memory_format,
            dtype,
            vector_width,
            sizes_uvec4: pack_sizes(&packed_sizes)?,
            strides_uvec4: pack_strides(&packed_strides, numel)?,
            gpu_sizes_uvec4: pack_sizes(&packed_gpu_sizes)?,
            gpu_strides_uvec4: pack_strides(&packed_gpu_strides, buffer_length)?,
            sizes,
            strides,
            gpu_sizes,
            gpu_strides,
            extents,
            buffer_length,
            allocation_bytes,
        })
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn memory_format(&self) -> MemoryFormat {
        self.memory_format
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn vector_width(&self) -> usize {
        self.vector_width
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn gpu_sizes(&self) -> &[usize] {
        &self.gpu_sizes
    }

    pub fn gpu_strides(&self) -> &[usize] {
        &self.gpu_strides
    }

    pub fn sizes_uvec4(&self) -> UVec4 {
        self.sizes_uvec4
    }

    pub fn strides_uvec4(&self) -> UVec4 {
        self.strides_uvec4
    }

    pub fn gpu_sizes_uvec4(&self) -> UVec4 {
        self.gpu_sizes_uvec4
    }

    pub fn gpu_strides_uvec4(&self) -> UVec4 {
        self.gpu_strides_uvec4
    }

    /// Image extents; `(0, 0, 0)` for linear buffers.
    pub fn extents(&self) -> UVec3 {
        self.extents
    }

    /// Padded element count, which is also the backing's linear length.
    pub fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    pub fn numel(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn gpu_numel(&self) -> usize {
        self.buffer_length
    }

    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype.size_in_bytes()
    }

    pub fn gpu_nbytes(&self) -> usize {
        self.gpu_numel() * self.dtype.size_in_bytes()
    }

    pub fn texture_format(&self) -> TextureFormat {
        self.dtype.texture_format()
    }

    /// Element count actually requested from the context.
    ///
    /// Never below one vector, so degenerate shapes still map to a valid
    /// allocation.
    pub fn allocation_elements(&self) -> usize {
        self.buffer_length.max(self.vector_width)
    }

    /// Image extents requested from the context, each axis at least 1.
    pub fn allocation_extents(&self) -> UVec3 {
        UVec3(self.extents.0.map(|v| v.max(1)))
    }

    /// Bytes backing the allocation for either resource form.
    pub fn allocation_bytes(&self) -> usize {
        self.allocation_bytes
    }
}

/// Rounds `value` up to the next multiple of `alignment`.
pub fn align_up(value: usize, alignment: usize) -> Result<usize, ShapeError> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(alignment - 1)
        .map(|v| v / alignment * alignment)
        .ok_or(ShapeError::DimensionOverflow { value })
}

/// Dimension `from_end` positions from the innermost axis, 1 when absent.
pub fn val_at(from_end: usize, dims: &[usize]) -> usize {
    if from_end == 0 || from_end > dims.len() {
        1
    } else {
        dims[dims.len() - from_end]
    }
}

pub fn contiguous_strides(sizes: &[usize]) -> Dims {
    let mut strides: Dims = SmallVec::from_elem(1, sizes.len());
    for i in (0..sizes.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * sizes[i + 1].max(1);
    }
    strides
}

/// Strides of a rank-4 NCHW tensor stored as NHWC.
pub fn channels_last_strides(sizes: &[usize]) -> Dims {
    debug_assert_eq!(sizes.len(), 4);
    let (c, h, w) = (sizes[1].max(1), sizes[2].max(1), sizes[3].max(1));
    SmallVec::from_slice(&[h * w * c, 1, w * c, c])
}

fn strides_for(sizes: &[usize], memory_format: MemoryFormat) -> Result<Dims, ShapeError> {
    match memory_format {
        MemoryFormat::Contiguous => Ok(contiguous_strides(sizes)),
        MemoryFormat::ChannelsLast if sizes.len() == 4 => Ok(channels_last_strides(sizes)),
        MemoryFormat::ChannelsLast => Err(ShapeError::ChannelsLastRank { rank: sizes.len() }),
    }
}

fn strides_match(sizes: &[usize], strides: &[usize], expected: &[usize]) -> bool {
    // Singleton axes never move the offset, so their stride is free.
    sizes
        .iter()
        .zip(strides.iter().zip(expected))
        .all(|(&size, (&actual, &expected))| size == 1 || actual == expected)
}

fn infer_memory_format(sizes: &[usize], strides: &[usize]) -> Result<MemoryFormat, ShapeError> {
    if strides_match(sizes, strides, &contiguous_strides(sizes)) {
        return Ok(MemoryFormat::Contiguous);
    }
    if sizes.len() == 4 && strides_match(sizes, strides, &channels_last_strides(sizes)) {
        return Ok(MemoryFormat::ChannelsLast);
    }
    Err(ShapeError::UnsupportedStrides {
        sizes: sizes.to_vec(),
        strides: strides.to_vec(),
    })
}

fn allocation_bytes(
    kind: StorageKind,
    extents: UVec3,
    elements: usize,
    dtype: DType,
    sizes: &[usize],
) -> Result<usize, ShapeError> {
    let bytes = if kind.is_image() {
        let texels = UVec3(extents.0.map(|v| v.max(1))).element_count()?;
        texels.checked_mul(dtype.texture_format().texel_bytes())
    } else {
        elements.checked_mul(dtype.size_in_bytes())
    };
    bytes.ok_or_else(|| ShapeError::ElementOverflow {
        sizes: sizes.to_vec(),
    })
}

fn checked_numel(sizes: &[usize]) -> Result<usize, ShapeError> {
    sizes
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| ShapeError::ElementOverflow {
            sizes: sizes.to_vec(),
        })
}

fn fold_dims(dims: &[usize], policy: RankPolicy) -> Result<Dims, ShapeError> {
    let rank = dims.len();
    if rank <= MAX_PACKED_RANK {
        return Ok(Dims::from_slice(dims));
    }
    match policy {
        RankPolicy::Reject => Err(ShapeError::RankTooLarge {
            rank,
            max: MAX_PACKED_RANK,
        }),
        RankPolicy::Fold => {
            let batch = checked_numel(&dims[..rank - 3])?;
            let mut folded = Dims::new();
            folded.push(batch);
            folded.extend_from_slice(&dims[rank - 3..]);
            Ok(folded)
        }
    }
}

fn fold_strides(strides: &[usize], policy: RankPolicy) -> Dims {
    let rank = strides.len();
    if rank <= MAX_PACKED_RANK || policy == RankPolicy::Reject {
        // Reject already failed on the matching sizes.
        return Dims::from_slice(strides);
    }
    Dims::from_slice(&strides[rank - MAX_PACKED_RANK..])
}

fn buffer_gpu_sizes(
    sizes: &[usize],
    memory_format: MemoryFormat,
    vector_width: usize,
) -> Result<Dims, ShapeError> {
    let mut gpu_sizes = Dims::from_slice(sizes);
    let axis = match memory_format {
        MemoryFormat::Contiguous => gpu_sizes.len() - 1,
        MemoryFormat::ChannelsLast => gpu_sizes.len() - 3,
    };
    gpu_sizes[axis] = align_up(gpu_sizes[axis], vector_width)?;
    Ok(gpu_sizes)
}

fn texture_gpu_sizes(sizes: &[usize], channel_alignment: usize) -> Result<Dims, ShapeError> {
    let channels = align_up(val_at(3, sizes), channel_alignment)?;
    let height = val_at(2, sizes);
    let width = val_at(1, sizes);
    if sizes.len() == 4 {
        Ok(SmallVec::from_slice(&[sizes[0], channels, height, width]))
    } else {
        Ok(SmallVec::from_slice(&[channels, height, width]))
    }
}

fn to_u32(value: usize) -> Result<u32, ShapeError> {
    u32::try_from(value).map_err(|_| ShapeError::DimensionOverflow { value })
}

fn image_extents(gpu_sizes: &[usize], kind: StorageKind) -> Result<UVec3, ShapeError> {
    let width = val_at(1, gpu_sizes);
    let height = val_at(2, gpu_sizes);
    let depth = (val_at(3, gpu_sizes) / TEXEL_CHANNELS)
        .checked_mul(val_at(4, gpu_sizes))
        .ok_or_else(|| ShapeError::ElementOverflow {
            sizes: gpu_sizes.to_vec(),
        })?;
    match kind {
        StorageKind::Buffer => Ok(UVec3::default()),
        StorageKind::Texture3D => Ok(UVec3([to_u32(width)?, to_u32(height)?, to_u32(depth)?])),
        StorageKind::Texture2D => {
            let rows = height
                .checked_mul(depth)
                .ok_or(ShapeError::DimensionOverflow { value: height })?;
            Ok(UVec3([to_u32(width)?, to_u32(rows)?, 1]))
        }
    }
}

fn pack_sizes(dims: &[usize]) -> Result<UVec4, ShapeError> {
    let mut packed = [1u32; 4];
    for (slot, &dim) in packed.iter_mut().zip(dims.iter().rev()) {
        *slot = to_u32(dim)?;
    }
    Ok(UVec4(packed))
}

fn pack_strides(strides: &[usize], span: usize) -> Result<UVec4, ShapeError> {
    let fill = to_u32(span)?;
    let mut packed = [fill; 4];
    for (slot, &stride) in packed.iter_mut().zip(strides.iter().rev()) {
        *slot = to_u32(stride)?;
    }
    Ok(UVec4(packed))
}
