//! Common types for the TrackView store abstraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Element type of a stored array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn item_size(&self) -> usize {
        match self {
            DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 => 8,
        }
    }

    /// Returns true for floating-point element types.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Parses a Zarr v2 / NumPy type string such as `<f4` or `|i1`.
    pub fn from_zarr(typestr: &str) -> Option<(DType, Endian)> {
        let mut chars = typestr.chars();
        let endian = match chars.next()? {
            '<' => Endian::Little,
            '>' => Endian::Big,
            '|' => Endian::NotApplicable,
            _ => return None,
        };
        let dtype = match chars.as_str() {
            "i1" => DType::Int8,
            "i2" => DType::Int16,
            "i4" => DType::Int32,
            "i8" => DType::Int64,
            "u1" => DType::UInt8,
            "u2" => DType::UInt16,
            "u4" => DType::UInt32,
            "u8" => DType::UInt64,
            "f4" => DType::Float32,
            "f8" => DType::Float64,
            _ => return None,
        };
        Some((dtype, endian))
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// Byte order of stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
    /// Single-byte types
    NotApplicable,
}

/// Shape, element type and user attributes of one stored array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    /// Array path relative to the store root (e.g. `tracks_to_points/indptr`)
    pub path: String,

    /// Dimensions, outermost first
    pub shape: Vec<u64>,

    /// Element type
    pub dtype: DType,

    /// JSON attributes attached to the array
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

impl ArrayMeta {
    /// Creates metadata with no attributes.
    pub fn new(path: impl Into<String>, shape: Vec<u64>, dtype: DType) -> Self {
        Self {
            path: path.into(),
            shape,
            dtype,
            attrs: Map::new(),
        }
    }

    /// Total number of elements.
    pub fn len(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns true if the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rows (size of the outermost dimension).
    pub fn rows(&self) -> u64 {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements per row (product of the trailing dimensions).
    pub fn row_len(&self) -> u64 {
        self.shape.iter().skip(1).product()
    }

    /// Reads a numeric attribute as `f64`.
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).and_then(Value::as_f64)
    }

    /// Reads a non-negative integer attribute.
    pub fn attr_u64(&self, name: &str) -> Option<u64> {
        self.attrs.get(name).and_then(Value::as_u64)
    }
}
