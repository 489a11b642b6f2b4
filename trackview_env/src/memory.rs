//! In-memory implementation of ChunkedArrayStore.

use crate::error::{check_range, StoreError};
use crate::store::ChunkedArrayStore;
use crate::types::{ArrayMeta, DType};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone)]
enum ArrayData {
    Ints(Vec<i64>),
    Floats(Vec<f32>),
}

#[derive(Debug, Clone)]
struct MemoryArray {
    meta: ArrayMeta,
    data: ArrayData,
}

/// Store backed by arrays held in memory.
///
/// Used by unit tests and the simulator. Arrays are inserted up front and
/// are immutable once the store is shared.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    arrays: HashMap<String, MemoryArray>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arrays: HashMap::new(),
        }
    }

    /// Inserts an integer array stored as `int64`.
    pub fn insert_ints(&mut self, path: &str, shape: Vec<u64>, values: Vec<i64>) -> Result<(), StoreError> {
        self.insert(path, shape, DType::Int64, ArrayData::Ints(values))
    }

    /// Inserts a float array stored as `float32`.
    pub fn insert_floats(&mut self, path: &str, shape: Vec<u64>, values: Vec<f32>) -> Result<(), StoreError> {
        self.insert(path, shape, DType::Float32, ArrayData::Floats(values))
    }

    /// Attaches a JSON attribute to an existing array.
    pub fn set_attr(&mut self, path: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let array = self
            .arrays
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        array.meta.attrs.insert(key.to_string(), value);
        Ok(())
    }

    /// Returns true if an array exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.arrays.contains_key(path)
    }

    /// Paths of all stored arrays, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.arrays.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn insert(&mut self, path: &str, shape: Vec<u64>, dtype: DType, data: ArrayData) -> Result<(), StoreError> {
        let expected: u64 = shape.iter().product();
        let actual = match &data {
            ArrayData::Ints(v) => v.len(),
            ArrayData::Floats(v) => v.len(),
        } as u64;
        if expected != actual {
            return Err(StoreError::corrupt(
                path,
                format!("shape {:?} implies {} elements, got {}", shape, expected, actual),
            ));
        }
        self.arrays.insert(
            path.to_string(),
            MemoryArray {
                meta: ArrayMeta::new(path, shape, dtype),
                data,
            },
        );
        Ok(())
    }

    fn get(&self, path: &str) -> Result<&MemoryArray, StoreError> {
        self.arrays
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

#[async_trait]
impl ChunkedArrayStore for MemoryStore {
    async fn array_meta(&self, path: &str) -> Result<ArrayMeta, StoreError> {
        Ok(self.get(path)?.meta.clone())
    }

    async fn read_ints(&self, path: &str, elements: Range<u64>) -> Result<Vec<i64>, StoreError> {
        let array = self.get(path)?;
        check_range(path, &elements, array.meta.len())?;
        match &array.data {
            ArrayData::Ints(values) => Ok(values[elements.start as usize..elements.end as usize].to_vec()),
            ArrayData::Floats(_) => Err(StoreError::TypeMismatch {
                path: path.to_string(),
                expected: "integer",
                found: array.meta.dtype.to_string(),
            }),
        }
    }

    async fn read_floats(&self, path: &str, elements: Range<u64>) -> Result<Vec<f32>, StoreError> {
        let array = self.get(path)?;
        check_range(path, &elements, array.meta.len())?;
        let range = elements.start as usize..elements.end as usize;
        Ok(match &array.data {
            ArrayData::Floats(values) => values[range].to_vec(),
            ArrayData::Ints(values) => values[range].iter().map(|&v| v as f32).collect(),
        })
    }

    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }
}
