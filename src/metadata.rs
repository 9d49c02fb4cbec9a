use crate::{Extent, MetadataError, Point};

use enum_primitive_derive::Primitive;
use num_traits::cast::FromPrimitive;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-width sample type of the remote array.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Dtype {
    #[serde(rename = "|u1")]
    U8,
    #[serde(rename = "<u2")]
    U16,
    #[serde(rename = "<f4")]
    F32,
}

impl Dtype {
    /// Bytes per sample.
    pub fn size(self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::U16 => 2,
            Dtype::F32 => 4,
        }
    }

    /// Widens the sample at `index` (in samples, not bytes) to `f32`.
    #[inline]
    pub fn sample(self, bytes: &[u8], index: usize) -> f32 {
        match self {
            Dtype::U8 => bytes[index] as f32,
            Dtype::U16 => {
                let b = 2 * index;
                u16::from_le_bytes([bytes[b], bytes[b + 1]]) as f32
            }
            Dtype::F32 => {
                let b = 4 * index;
                f32::from_le_bytes([bytes[b], bytes[b + 1], bytes[b + 2], bytes[b + 3]])
            }
        }
    }

    /// Widens `dest.len()` consecutive samples starting at sample `first` into `dest`.
    pub fn decode_run(self, bytes: &[u8], first: usize, dest: &mut [f32]) {
        match self {
            Dtype::U8 => {
                let n = dest.len();
                for (d, s) in dest.iter_mut().zip(&bytes[first..first + n]) {
                    *d = *s as f32;
                }
            }
            _ => {
                for (i, d) in dest.iter_mut().enumerate() {
                    *d = self.sample(bytes, first + i);
                }
            }
        }
    }
}

/// Byte-shuffle filter applied before compression, as stored in the codec parameters.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Primitive)]
pub enum Shuffle {
    NoShuffle = 0,
    ByteShuffle = 1,
    BitShuffle = 2,
}

impl Serialize for Shuffle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Shuffle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flag = u8::deserialize(deserializer)?;

        Shuffle::from_u8(flag).ok_or_else(|| de::Error::custom(MetadataError::UnknownShuffle(flag)))
    }
}

/// Compression parameters of the remote array. Only consumed by the decompression collaborator.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CodecParams {
    pub id: String,
    #[serde(rename = "cname")]
    pub name: String,
    #[serde(rename = "clevel")]
    pub level: u8,
    #[serde(rename = "blocksize")]
    pub block_size: usize,
    pub shuffle: Shuffle,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum MemoryOrder {
    #[serde(rename = "C")]
    RowMajor,
    #[serde(rename = "F")]
    ColumnMajor,
}

/// Shape, chunking, and encoding of the remote array. Axis arrays are ordered `[z, y, x]`.
///
/// Field names follow the zarr v2 `.zarray` document so an external parser can deserialize
/// straight into this record.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ArrayMetadata {
    pub shape: [usize; 3],
    #[serde(rename = "chunks")]
    pub chunk_shape: [usize; 3],
    pub dtype: Dtype,
    #[serde(rename = "compressor")]
    pub codec: Option<CodecParams>,
    pub fill_value: Option<f64>,
    #[serde(rename = "order")]
    pub memory_order: MemoryOrder,
    #[serde(rename = "zarr_format")]
    pub format_version: u8,
}

impl ArrayMetadata {
    /// Metadata for an uncompressed, row-major array.
    pub fn new(shape: [usize; 3], chunk_shape: [usize; 3], dtype: Dtype) -> Self {
        ArrayMetadata {
            shape,
            chunk_shape,
            dtype,
            codec: None,
            fill_value: Some(0.0),
            memory_order: MemoryOrder::RowMajor,
            format_version: 2,
        }
    }

    /// Checks the assumptions the chunk pipeline makes about the array.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.memory_order != MemoryOrder::RowMajor {
            return Err(MetadataError::UnsupportedOrder(self.memory_order));
        }
        if self.format_version != 2 {
            return Err(MetadataError::UnsupportedFormat(self.format_version));
        }
        if self.chunk_shape.iter().any(|&c| c == 0) {
            return Err(MetadataError::EmptyChunkShape(self.chunk_shape));
        }
        let too_big = |dims: &[usize; 3]| dims.iter().any(|&d| d > i32::MAX as usize);
        if too_big(&self.shape) || too_big(&self.chunk_shape) {
            return Err(MetadataError::ShapeOverflow(self.shape));
        }

        Ok(())
    }

    /// Dataset size as a point (`x, y, z`).
    pub fn shape_point(&self) -> Point {
        to_point(&self.shape)
    }

    /// Chunk size as a point (`x, y, z`).
    pub fn chunk_point(&self) -> Point {
        to_point(&self.chunk_shape)
    }

    /// Every voxel of the dataset.
    pub fn extent(&self) -> Extent {
        Extent::from_min_and_local_supremum(Point::zero(), self.shape_point())
    }

    pub fn samples_per_chunk(&self) -> usize {
        self.chunk_shape.iter().product()
    }

    /// Uncompressed size of one chunk; every chunk is stored full size, even at the array edge.
    pub fn chunk_byte_len(&self) -> usize {
        self.samples_per_chunk() * self.dtype.size()
    }
}

fn to_point(zyx: &[usize; 3]) -> Point {
    Point::from_zyx([zyx[0] as i32, zyx[1] as i32, zyx[2] as i32])
}
