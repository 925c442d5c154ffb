//! Scalar element types and their per-dialect / per-runtime mappings.

use crate::error::{Error, Result};

/// Logical element type carried by tensors in a graph.
///
/// `NotSet` is the default; validation fills it in from the graph context
/// (I/O type for boundary tensors, intermediate type for virtual ones).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DataType {
    #[default]
    NotSet,
    Half,
    BFloat16,
    Float,
    Double,
    Uint8,
    Int8,
    Int16,
    Int32,
    Int64,
    Boolean,
    FP8E5M2,
}

/// One registry row per concrete element type. Keeping the dialect
/// spelling, the aten scalar-type code and the HAL element-type id in a
/// single table makes adding a type a one-place change.
struct DataTypeSpec {
    /// Spelling inside `!torch.vtensor<[...],...>` types.
    asm: &'static str,
    /// `torch.constant.int` code accepted by `torch.aten.empty.memory_format`.
    torch_code: i64,
    /// Runtime HAL element-type id (`numerical_type << 24 | bit_count`).
    hal: u32,
    /// Storage bytes per element.
    bytes: usize,
}

const NUMERICAL_SINT: u32 = 0x11;
const NUMERICAL_UINT: u32 = 0x12;
const NUMERICAL_BOOL: u32 = 0x13;
const NUMERICAL_FLOAT_IEEE: u32 = 0x21;
const NUMERICAL_FLOAT_BRAIN: u32 = 0x22;
const NUMERICAL_FLOAT_8_E5M2: u32 = 0x24;

const fn hal_type(numerical: u32, bits: u32) -> u32 {
    (numerical << 24) | bits
}

impl DataType {
    fn spec(self) -> Result<&'static DataTypeSpec> {
        const HALF: DataTypeSpec = DataTypeSpec {
            asm: "f16",
            torch_code: 5,
            hal: hal_type(NUMERICAL_FLOAT_IEEE, 16),
            bytes: 2,
        };
        const BFLOAT16: DataTypeSpec = DataTypeSpec {
            asm: "bf16",
            torch_code: 15,
            hal: hal_type(NUMERICAL_FLOAT_BRAIN, 16),
            bytes: 2,
        };
        const FLOAT: DataTypeSpec = DataTypeSpec {
            asm: "f32",
            torch_code: 6,
            hal: hal_type(NUMERICAL_FLOAT_IEEE, 32),
            bytes: 4,
        };
        const DOUBLE: DataTypeSpec = DataTypeSpec {
            asm: "f64",
            torch_code: 7,
            hal: hal_type(NUMERICAL_FLOAT_IEEE, 64),
            bytes: 8,
        };
        const UINT8: DataTypeSpec = DataTypeSpec {
            asm: "ui8",
            torch_code: 0,
            hal: hal_type(NUMERICAL_UINT, 8),
            bytes: 1,
        };
        const INT8: DataTypeSpec = DataTypeSpec {
            asm: "si8",
            torch_code: 1,
            hal: hal_type(NUMERICAL_SINT, 8),
            bytes: 1,
        };
        const INT16: DataTypeSpec = DataTypeSpec {
            asm: "si16",
            torch_code: 2,
            hal: hal_type(NUMERICAL_SINT, 16),
            bytes: 2,
        };
        const INT32: DataTypeSpec = DataTypeSpec {
            asm: "si32",
            torch_code: 3,
            hal: hal_type(NUMERICAL_SINT, 32),
            bytes: 4,
        };
        const INT64: DataTypeSpec = DataTypeSpec {
            asm: "si64",
            torch_code: 4,
            hal: hal_type(NUMERICAL_SINT, 64),
            bytes: 8,
        };
        const BOOLEAN: DataTypeSpec = DataTypeSpec {
            asm: "i1",
            torch_code: 11,
            hal: hal_type(NUMERICAL_BOOL, 8),
            bytes: 1,
        };
        const FP8E5M2: DataTypeSpec = DataTypeSpec {
            asm: "f8E5M2",
            torch_code: 23,
            hal: hal_type(NUMERICAL_FLOAT_8_E5M2, 8),
            bytes: 1,
        };

        match self {
            DataType::NotSet => Err(Error::attribute_not_set(
                "data type queried before inference resolved it",
            )),
            DataType::Half => Ok(&HALF),
            DataType::BFloat16 => Ok(&BFLOAT16),
            DataType::Float => Ok(&FLOAT),
            DataType::Double => Ok(&DOUBLE),
            DataType::Uint8 => Ok(&UINT8),
            DataType::Int8 => Ok(&INT8),
            DataType::Int16 => Ok(&INT16),
            DataType::Int32 => Ok(&INT32),
            DataType::Int64 => Ok(&INT64),
            DataType::Boolean => Ok(&BOOLEAN),
            DataType::FP8E5M2 => Ok(&FP8E5M2),
        }
    }

    /// Canonical spelling in the emitted torch dialect, e.g. `f32`.
    pub fn asm_spelling(self) -> Result<&'static str> {
        Ok(self.spec()?.asm)
    }

    /// Integer scalar-type code used by `torch.aten.empty.memory_format`.
    pub fn torch_type_code(self) -> Result<i64> {
        Ok(self.spec()?.torch_code)
    }

    /// Runtime HAL element-type identifier for buffer marshalling.
    pub fn hal_element_type(self) -> Result<u32> {
        Ok(self.spec()?.hal)
    }

    /// Storage size in bytes per element.
    pub fn size_in_bytes(self) -> Result<usize> {
        Ok(self.spec()?.bytes)
    }

    pub fn is_set(self) -> bool {
        self != DataType::NotSet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asm_spellings_match_dialect() {
        assert_eq!(DataType::Half.asm_spelling().unwrap(), "f16");
        assert_eq!(DataType::Float.asm_spelling().unwrap(), "f32");
        assert_eq!(DataType::BFloat16.asm_spelling().unwrap(), "bf16");
        assert_eq!(DataType::Boolean.asm_spelling().unwrap(), "i1");
        assert_eq!(DataType::FP8E5M2.asm_spelling().unwrap(), "f8E5M2");
    }

    #[test]
    fn torch_codes_follow_aten_scalar_types() {
        assert_eq!(DataType::Float.torch_type_code().unwrap(), 6);
        assert_eq!(DataType::Half.torch_type_code().unwrap(), 5);
        assert_eq!(DataType::BFloat16.torch_type_code().unwrap(), 15);
    }

    #[test]
    fn not_set_is_an_error() {
        assert!(DataType::NotSet.asm_spelling().is_err());
        assert!(!DataType::NotSet.is_set());
    }

    #[test]
    fn hal_ids_use_packed_encoding() {
        assert_eq!(DataType::Float.hal_element_type().unwrap(), 0x2100_0020);
        assert_eq!(DataType::Int32.hal_element_type().unwrap(), 0x1100_0020);
    }
}
