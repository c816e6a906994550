//! Tensor descriptors and the ggml element-type table.
//!
//! Only the descriptor table is decoded. Tensor payload bytes stay in the
//! source and are fetched on demand with [`read_tensor_data`].

use std::io::{Read, Seek, SeekFrom, Write};

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{GgufError, Result};

/// GGUF tensor data types
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u32)]
pub enum TensorType {
    F32 = 0,
    F16 = 1,
    Q4_0 = 2,
    Q4_1 = 3,
    Q5_0 = 6,
    Q5_1 = 7,
    Q8_0 = 8,
    Q8_1 = 9,
    Q2K = 10,
    Q3K = 11,
    Q4K = 12,
    Q5K = 13,
    Q6K = 14,
    Q8K = 15,
    Iq2Xxs = 16,
    Iq2Xs = 17,
    Iq3Xxs = 18,
    Iq1S = 19,
    Iq4Nl = 20,
    Iq3S = 21,
    Iq2S = 22,
    Iq4Xs = 23,
    I8 = 24,
    I16 = 25,
    I32 = 26,
    I64 = 27,
    F64 = 28,
    Iq1M = 29,
    Bf16 = 30,
    Tq1_0 = 34,
    Tq2_0 = 35,
    Mxfp4 = 39,
}

impl TensorType {
    /// Convert a raw u32 type ID into a TensorType.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(TensorType::F32),
            1 => Some(TensorType::F16),
            2 => Some(TensorType::Q4_0),
            3 => Some(TensorType::Q4_1),
            6 => Some(TensorType::Q5_0),
            7 => Some(TensorType::Q5_1),
            8 => Some(TensorType::Q8_0),
            9 => Some(TensorType::Q8_1),
            10 => Some(TensorType::Q2K),
            11 => Some(TensorType::Q3K),
            12 => Some(TensorType::Q4K),
            13 => Some(TensorType::Q5K),
            14 => Some(TensorType::Q6K),
            15 => Some(TensorType::Q8K),
            16 => Some(TensorType::Iq2Xxs),
            17 => Some(TensorType::Iq2Xs),
            18 => Some(TensorType::Iq3Xxs),
            19 => Some(TensorType::Iq1S),
            20 => Some(TensorType::Iq4Nl),
            21 => Some(TensorType::Iq3S),
            22 => Some(TensorType::Iq2S),
            23 => Some(TensorType::Iq4Xs),
            24 => Some(TensorType::I8),
            25 => Some(TensorType::I16),
            26 => Some(TensorType::I32),
            27 => Some(TensorType::I64),
            28 => Some(TensorType::F64),
            29 => Some(TensorType::Iq1M),
            30 => Some(TensorType::Bf16),
            34 => Some(TensorType::Tq1_0),
            35 => Some(TensorType::Tq2_0),
            39 => Some(TensorType::Mxfp4),
            _ => None,
        }
    }

    /// Like [`TensorType::from_u32`], but an unknown code is an error.
    pub fn try_from_u32(value: u32) -> Result<Self> {
        Self::from_u32(value).ok_or_else(|| GgufError::unknown_tensor_type(value))
    }

    /// Number of elements packed into one block (1 for plain types)
    pub fn block_size(self) -> u64 {
        match self {
            TensorType::F32
            | TensorType::F16
            | TensorType::Bf16
            | TensorType::I8
            | TensorType::I16
            | TensorType::I32
            | TensorType::I64
            | TensorType::F64 => 1,
            TensorType::Q4_0
            | TensorType::Q4_1
            | TensorType::Q5_0
            | TensorType::Q5_1
            | TensorType::Q8_0
            | TensorType::Q8_1
            | TensorType::Iq4Nl
            | TensorType::Mxfp4 => 32,
            _ => 256,
        }
    }

    /// Bytes per block
    pub fn type_size(self) -> u64 {
        match self {
            TensorType::F32 => 4,
            TensorType::F16 => 2,
            TensorType::Bf16 => 2,
            TensorType::I8 => 1,
            TensorType::I16 => 2,
            TensorType::I32 => 4,
            TensorType::I64 => 8,
            TensorType::F64 => 8,
            TensorType::Q4_0 => 18,
            TensorType::Q4_1 => 20,
            TensorType::Q5_0 => 22,
            TensorType::Q5_1 => 24,
            TensorType::Q8_0 => 34,
            TensorType::Q8_1 => 36,
            TensorType::Q2K => 84,
            TensorType::Q3K => 110,
            TensorType::Q4K => 144,
            TensorType::Q5K => 176,
            TensorType::Q6K => 210,
            TensorType::Q8K => 292,
            TensorType::Iq2Xxs => 66,
            TensorType::Iq2Xs => 74,
            TensorType::Iq3Xxs => 98,
            TensorType::Iq1S => 50,
            TensorType::Iq4Nl => 18,
            TensorType::Iq3S => 110,
            TensorType::Iq2S => 82,
            TensorType::Iq4Xs => 136,
            TensorType::Iq1M => 56,
            TensorType::Tq1_0 => 54,
            TensorType::Tq2_0 => 66,
            TensorType::Mxfp4 => 17,
        }
    }

    /// Conventional ggml name, e.g. `Q4_K`
    pub fn name(self) -> &'static str {
        match self {
            TensorType::F32 => "F32",
            TensorType::F16 => "F16",
            TensorType::Q4_0 => "Q4_0",
            TensorType::Q4_1 => "Q4_1",
            TensorType::Q5_0 => "Q5_0",
            TensorType::Q5_1 => "Q5_1",
            TensorType::Q8_0 => "Q8_0",
            TensorType::Q8_1 => "Q8_1",
            TensorType::Q2K => "Q2_K",
            TensorType::Q3K => "Q3_K",
            TensorType::Q4K => "Q4_K",
            TensorType::Q5K => "Q5_K",
            TensorType::Q6K => "Q6_K",
            TensorType::Q8K => "Q8_K",
            TensorType::Iq2Xxs => "IQ2_XXS",
            TensorType::Iq2Xs => "IQ2_XS",
            TensorType::Iq3Xxs => "IQ3_XXS",
            TensorType::Iq1S => "IQ1_S",
            TensorType::Iq4Nl => "IQ4_NL",
            TensorType::Iq3S => "IQ3_S",
            TensorType::Iq2S => "IQ2_S",
            TensorType::Iq4Xs => "IQ4_XS",
            TensorType::I8 => "I8",
            TensorType::I16 => "I16",
            TensorType::I32 => "I32",
            TensorType::I64 => "I64",
            TensorType::F64 => "F64",
            TensorType::Iq1M => "IQ1_M",
            TensorType::Bf16 => "BF16",
            TensorType::Tq1_0 => "TQ1_0",
            TensorType::Tq2_0 => "TQ2_0",
            TensorType::Mxfp4 => "MXFP4",
        }
    }
}

/// Information about a single tensor in the GGUF file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    /// Name of the tensor (e.g., "blk.0.attn_norm.weight")
    pub name: String,
    /// Shape of the tensor - size of each dimension
    pub dims: Vec<u64>,
    /// Data type of the tensor
    pub tensor_type: TensorType,
    /// Byte offset from the start of the tensor data section
    pub offset: u64,
}

impl TensorDescriptor {
    pub fn new(name: impl Into<String>, dims: Vec<u64>, tensor_type: TensorType, offset: u64) -> Self {
        Self {
            name: name.into(),
            dims,
            tensor_type,
            offset,
        }
    }

    /// Total number of elements, or `None` on overflow
    pub fn element_count(&self) -> Option<u64> {
        self.dims.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }

    /// Size in bytes of this tensor's data span.
    ///
    /// Quantized types round the element count up to whole blocks.
    pub fn byte_size(&self) -> Result<u64> {
        let overflow = || {
            GgufError::InconsistentDescriptors(format!(
                "byte size of tensor '{}' with dims {:?} overflows",
                self.name, self.dims
            ))
        };
        let elements = self.element_count().ok_or_else(overflow)?;
        let blocks = elements.div_ceil(self.tensor_type.block_size());
        blocks
            .checked_mul(self.tensor_type.type_size())
            .ok_or_else(overflow)
    }

    /// Offset one past the last byte of this tensor, relative to the data region
    pub fn end_offset(&self) -> Result<u64> {
        self.offset.checked_add(self.byte_size()?).ok_or_else(|| {
            GgufError::InconsistentDescriptors(format!(
                "tensor '{}' ends beyond the addressable range",
                self.name
            ))
        })
    }
}

/// Read all tensor descriptors from the GGUF file.
///
/// The cursor must sit right after the last metadata entry.
pub fn read_descriptors<R: Read>(
    reader: &mut ByteReader<R>,
    tensor_count: u64,
) -> Result<Vec<TensorDescriptor>> {
    // name length + n_dims + type + offset
    let capacity = reader.plausible_count(tensor_count, 8 + 4 + 4 + 8)?;
    let mut tensors = Vec::with_capacity(capacity);

    for _ in 0..tensor_count {
        let name = reader.read_string()?;

        let n_dims = reader.read_u32()?;
        let rank = reader.plausible_count(u64::from(n_dims), 8)?;
        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(reader.read_u64()?);
        }

        let tensor_type = TensorType::try_from_u32(reader.read_u32()?)?;
        let offset = reader.read_u64()?;

        tensors.push(TensorDescriptor {
            name,
            dims,
            tensor_type,
            offset,
        });
    }

    Ok(tensors)
}

/// Write descriptors in order, mirroring [`read_descriptors`].
pub fn write_descriptors<W: Write>(
    writer: &mut ByteWriter<W>,
    tensors: &[TensorDescriptor],
) -> Result<()> {
    for tensor in tensors {
        writer.write_string(&tensor.name)?;
        writer.write_u32(tensor.dims.len() as u32)?;
        for &dim in &tensor.dims {
            writer.write_u64(dim)?;
        }
        writer.write_u32(tensor.tensor_type as u32)?;
        writer.write_u64(tensor.offset)?;
    }
    Ok(())
}

/// Load one tensor's raw bytes from the source.
///
/// `data_start` is the absolute offset of the aligned data region. The bytes
/// are returned as stored; nothing is decoded.
pub fn read_tensor_data<R: Read + Seek>(
    source: &mut R,
    tensor: &TensorDescriptor,
    data_start: u64,
) -> Result<Vec<u8>> {
    let byte_size = tensor.byte_size()?;
    let absolute_offset = data_start + tensor.offset;
    source.seek(SeekFrom::Start(absolute_offset))?;

    let mut data = vec![0u8; byte_size as usize];
    source.read_exact(&mut data).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            GgufError::TruncatedInput {
                offset: absolute_offset,
                needed: byte_size,
            }
        } else {
            GgufError::Io(e)
        }
    })?;
    Ok(data)
}
