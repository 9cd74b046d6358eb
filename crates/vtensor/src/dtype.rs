//! Scalar element types and the image formats used to hold them.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared by views and generic tensor handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 16-bit floating point (fp16).
    F16,
    /// 32-bit signed integer.
    I32,
    /// Unsigned byte.
    U8,
    /// Affine-quantized unsigned 8-bit values.
    QUInt8,
    /// Affine-quantized signed 8-bit values.
    QInt8,
    /// Affine-quantized signed 32-bit values.
    QInt32,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 | DType::QInt32 => 4,
            DType::F16 => 2,
            DType::U8 | DType::QUInt8 | DType::QInt8 => 1,
        }
    }

    /// Returns `true` for the affine-quantized dtypes.
    pub fn is_quantized(self) -> bool {
        matches!(self, DType::QUInt8 | DType::QInt8 | DType::QInt32)
    }

    /// Image format used when this dtype is stored in a texture.
    pub fn texture_format(self) -> TextureFormat {
        match self {
            DType::F32 => TextureFormat::Rgba32F,
            DType::F16 => TextureFormat::Rgba16F,
            DType::I32 | DType::QInt32 => TextureFormat::Rgba32I,
            DType::U8 | DType::QUInt8 => TextureFormat::Rgba8Ui,
            DType::QInt8 => TextureFormat::Rgba8I,
        }
    }
}

/// Four-channel image formats available to texture-backed storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgba32F,
    Rgba16F,
    Rgba32I,
    Rgba8Ui,
    Rgba8I,
}

impl TextureFormat {
    /// Dtype that a shader observes when sampling this format.
    ///
    /// Quantized dtypes collapse onto their storage integer type, so this is
    /// not always the inverse of [`DType::texture_format`].
    pub fn dtype(self) -> DType {
        match self {
            TextureFormat::Rgba32F => DType::F32,
            TextureFormat::Rgba16F => DType::F16,
            TextureFormat::Rgba32I => DType::I32,
            TextureFormat::Rgba8Ui => DType::U8,
            TextureFormat::Rgba8I => DType::QInt8,
        }
    }

    /// Bytes occupied by one texel (all four channels).
    pub fn texel_bytes(self) -> usize {
        match self {
            TextureFormat::Rgba32F | TextureFormat::Rgba32I => 16,
            TextureFormat::Rgba16F => 8,
            TextureFormat::Rgba8Ui | TextureFormat::Rgba8I => 4,
        }
    }
}
