//! Production implementation of ChunkedArrayStore over a Zarr v2 directory.

use crate::codec::Compressor;
use crate::error::{check_range, StoreError};
use crate::store::ChunkedArrayStore;
use crate::types::{ArrayMeta, DType, Endian};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Raw `.zarray` document.
#[derive(Debug, Deserialize)]
struct ZarrayDocument {
    zarr_format: u8,
    shape: Vec<u64>,
    chunks: Vec<u64>,
    dtype: String,
    #[serde(default)]
    compressor: Option<Value>,
    #[serde(default)]
    fill_value: Value,
    #[serde(default = "default_order")]
    order: String,
    #[serde(default)]
    filters: Option<Vec<Value>>,
    #[serde(default)]
    dimension_separator: Option<String>,
}

fn default_order() -> String {
    "C".to_string()
}

/// Parsed, validated layout of one array.
#[derive(Debug)]
struct ArrayLayout {
    meta: ArrayMeta,
    chunks: Vec<u64>,
    endian: Endian,
    compressor: Compressor,
    fill: f64,
    separator: String,
}

impl ArrayLayout {
    fn chunk_key(&self, row_chunk: u64, col_chunk: u64) -> String {
        if self.meta.shape.len() == 1 {
            row_chunk.to_string()
        } else {
            format!("{}{}{}", row_chunk, self.separator, col_chunk)
        }
    }
}

/// Store reading a Zarr v2 directory hierarchy from the local filesystem.
///
/// Supports rank-1 and rank-2 arrays in C order, with raw, `blosc`, `zlib`
/// or `gzip` chunks.
/// Chunk files that do not exist read as the array's `fill_value`, matching
/// how Zarr writers omit empty chunks. Array layouts are parsed once and
/// cached for the lifetime of the store.
pub struct ZarrDirStore {
    root: PathBuf,
    layouts: RwLock<HashMap<String, Arc<ArrayLayout>>>,
}

impl ZarrDirStore {
    /// Opens a store rooted at `root` (the `.zarr` directory).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layouts: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an Arc-wrapped store for sharing across tasks.
    pub fn shared(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self::new(root))
    }

    async fn layout(&self, path: &str) -> Result<Arc<ArrayLayout>, StoreError> {
        if let Some(layout) = self.layouts.read().await.get(path) {
            return Ok(Arc::clone(layout));
        }
        let layout = Arc::new(self.load_layout(path).await?);
        self.layouts
            .write()
            .await
            .insert(path.to_string(), Arc::clone(&layout));
        Ok(layout)
    }

    async fn load_layout(&self, path: &str) -> Result<ArrayLayout, StoreError> {
        let dir = self.root.join(path);
        let raw = match read_optional(&dir.join(".zarray")).await? {
            Some(bytes) => bytes,
            None => return Err(StoreError::NotFound(path.to_string())),
        };
        let doc: ZarrayDocument = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::corrupt(path, format!("invalid .zarray: {}", e)))?;

        if doc.zarr_format != 2 {
            return Err(StoreError::corrupt(path, format!("zarr_format {} not supported", doc.zarr_format)));
        }
        let compressor = Compressor::from_zarr(doc.compressor.as_ref())
            .map_err(|id| StoreError::corrupt(path, format!("compressor '{}' not supported", id)))?;
        if doc.filters.as_ref().is_some_and(|f| !f.is_empty()) {
            return Err(StoreError::corrupt(path, "filters not supported"));
        }
        if doc.order != "C" {
            return Err(StoreError::corrupt(path, format!("order '{}' not supported", doc.order)));
        }
        if doc.shape.is_empty() || doc.shape.len() > 2 {
            return Err(StoreError::corrupt(path, format!("rank {} not supported", doc.shape.len())));
        }
        if doc.chunks.len() != doc.shape.len() || doc.chunks.contains(&0) {
            return Err(StoreError::corrupt(path, format!("invalid chunks {:?}", doc.chunks)));
        }
        let (dtype, endian) = DType::from_zarr(&doc.dtype)
            .ok_or_else(|| StoreError::corrupt(path, format!("dtype '{}' not supported", doc.dtype)))?;

        let attrs = match read_optional(&dir.join(".zattrs")).await? {
            Some(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes)
                .map_err(|e| StoreError::corrupt(path, format!("invalid .zattrs: {}", e)))?,
            None => Map::new(),
        };

        debug!(
            "opened zarr array {} shape={:?} chunks={:?} dtype={} compressor={:?}",
            path, doc.shape, doc.chunks, dtype, compressor
        );

        let mut meta = ArrayMeta::new(path, doc.shape, dtype);
        meta.attrs = attrs;
        Ok(ArrayLayout {
            meta,
            chunks: doc.chunks,
            endian,
            compressor,
            fill: parse_fill(&doc.fill_value),
            separator: doc.dimension_separator.unwrap_or_else(|| ".".to_string()),
        })
    }

    /// Assembles a flat element range from the chunks covering it.
    async fn read_elements<T, F>(
        &self,
        layout: &ArrayLayout,
        elements: Range<u64>,
        fill: T,
        decode: F,
    ) -> Result<Vec<T>, StoreError>
    where
        T: Copy + Send,
        F: Fn(&[u8]) -> Result<Vec<T>, String> + Send + Sync,
    {
        let path = layout.meta.path.as_str();
        check_range(path, &elements, layout.meta.len())?;
        if elements.is_empty() {
            return Ok(Vec::new());
        }

        let ncols = layout.meta.row_len();
        let rows = (elements.start / ncols)..elements.end.div_ceil(ncols);
        let chunk_rows = layout.chunks[0];
        let chunk_cols = layout.chunks.get(1).copied().unwrap_or(1);
        let col_chunks = ncols.div_ceil(chunk_cols);
        let chunk_bytes = (chunk_rows * chunk_cols) as usize * layout.meta.dtype.item_size();

        let mut buffer = vec![fill; ((rows.end - rows.start) * ncols) as usize];
        for ci in (rows.start / chunk_rows)..=((rows.end - 1) / chunk_rows) {
            for cj in 0..col_chunks {
                let key = layout.chunk_key(ci, cj);
                let Some(bytes) = read_optional(&self.root.join(path).join(&key)).await? else {
                    continue;
                };
                let values = layout
                    .compressor
                    .decompress(bytes, chunk_bytes)
                    .and_then(|raw| decode(&raw))
                    .map_err(|reason| StoreError::corrupt(path, format!("chunk {}: {}", key, reason)))?;
                if values.len() as u64 != chunk_rows * chunk_cols {
                    return Err(StoreError::corrupt(
                        path,
                        format!("chunk {} has {} elements, expected {}", key, values.len(), chunk_rows * chunk_cols),
                    ));
                }
                for lr in 0..chunk_rows {
                    let r = ci * chunk_rows + lr;
                    if r < rows.start || r >= rows.end {
                        continue;
                    }
                    for lc in 0..chunk_cols {
                        let c = cj * chunk_cols + lc;
                        if c >= ncols {
                            break;
                        }
                        buffer[((r - rows.start) * ncols + c) as usize] = values[(lr * chunk_cols + lc) as usize];
                    }
                }
            }
        }

        let offset = rows.start * ncols;
        Ok(buffer[(elements.start - offset) as usize..(elements.end - offset) as usize].to_vec())
    }
}

#[async_trait]
impl ChunkedArrayStore for ZarrDirStore {
    async fn array_meta(&self, path: &str) -> Result<ArrayMeta, StoreError> {
        Ok(self.layout(path).await?.meta.clone())
    }

    async fn read_ints(&self, path: &str, elements: Range<u64>) -> Result<Vec<i64>, StoreError> {
        let layout = self.layout(path).await?;
        let dtype = layout.meta.dtype;
        if dtype.is_float() {
            return Err(StoreError::TypeMismatch {
                path: path.to_string(),
                expected: "integer",
                found: dtype.to_string(),
            });
        }
        let endian = layout.endian;
        self.read_elements(&layout, elements, layout.fill as i64, |bytes| {
            decode_ints(bytes, dtype, endian)
        })
        .await
    }

    async fn read_floats(&self, path: &str, elements: Range<u64>) -> Result<Vec<f32>, StoreError> {
        let layout = self.layout(path).await?;
        let dtype = layout.meta.dtype;
        let endian = layout.endian;
        self.read_elements(&layout, elements, layout.fill as f32, |bytes| {
            decode_floats(bytes, dtype, endian)
        })
        .await
    }

    fn location(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

/// Reads a file, mapping "not found" to `None` and other I/O errors to transient failures.
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::transient(format!("{}: {}", path.display(), e))),
    }
}

fn parse_fill(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => match s.as_str() {
            "NaN" => f64::NAN,
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

/// Splits `bytes` into little-endian words of `N` bytes.
fn words<const N: usize>(bytes: &[u8], endian: Endian) -> Result<Vec<[u8; N]>, String> {
    if bytes.len() % N != 0 {
        return Err(format!("{} bytes is not a multiple of item size {}", bytes.len(), N));
    }
    Ok(bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut word = [0u8; N];
            word.copy_from_slice(chunk);
            if endian == Endian::Big {
                word.reverse();
            }
            word
        })
        .collect())
}

fn decode_ints(bytes: &[u8], dtype: DType, endian: Endian) -> Result<Vec<i64>, String> {
    Ok(match dtype {
        DType::Int8 => bytes.iter().map(|&b| b as i8 as i64).collect(),
        DType::UInt8 => bytes.iter().map(|&b| b as i64).collect(),
        DType::Int16 => words::<2>(bytes, endian)?.into_iter().map(|w| i16::from_le_bytes(w) as i64).collect(),
        DType::UInt16 => words::<2>(bytes, endian)?.into_iter().map(|w| u16::from_le_bytes(w) as i64).collect(),
        DType::Int32 => words::<4>(bytes, endian)?.into_iter().map(|w| i32::from_le_bytes(w) as i64).collect(),
        DType::UInt32 => words::<4>(bytes, endian)?.into_iter().map(|w| u32::from_le_bytes(w) as i64).collect(),
        DType::Int64 => words::<8>(bytes, endian)?.into_iter().map(i64::from_le_bytes).collect(),
        DType::UInt64 => words::<8>(bytes, endian)?
            .into_iter()
            .map(|w| i64::try_from(u64::from_le_bytes(w)).map_err(|_| "uint64 value exceeds int64".to_string()))
            .collect::<Result<_, _>>()?,
        DType::Float32 | DType::Float64 => return Err(format!("{} is not an integer type", dtype)),
    })
}

fn decode_floats(bytes: &[u8], dtype: DType, endian: Endian) -> Result<Vec<f32>, String> {
    Ok(match dtype {
        DType::Float32 => words::<4>(bytes, endian)?.into_iter().map(f32::from_le_bytes).collect(),
        DType::Float64 => words::<8>(bytes, endian)?.into_iter().map(|w| f64::from_le_bytes(w) as f32).collect(),
        _ => decode_ints(bytes, dtype, endian)?.into_iter().map(|v| v as f32).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{blosc_lz4, blosc_stored, zlib};
    use serde_json::json;
    use std::fs;

    fn write_array(root: &Path, path: &str, zarray: Value, attrs: Option<Value>, chunks: &[(&str, Vec<u8>)]) {
        let dir = root.join(path);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(".zarray"), serde_json::to_vec(&zarray).unwrap()).unwrap();
        if let Some(attrs) = attrs {
            fs::write(dir.join(".zattrs"), serde_json::to_vec(&attrs).unwrap()).unwrap();
        }
        for (key, bytes) in chunks {
            fs::write(dir.join(key), bytes).unwrap();
        }
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn zarray(shape: Value, chunks: Value, dtype: &str, fill: Value) -> Value {
        json!({
            "zarr_format": 2,
            "shape": shape,
            "chunks": chunks,
            "dtype": dtype,
            "compressor": null,
            "fill_value": fill,
            "filters": null,
            "order": "C"
        })
    }

    /// 3x4 float array in 2x3 chunks; chunk (1,1) is absent.
    fn points_fixture(root: &Path) {
        write_array(
            root,
            "points",
            zarray(json!([3, 4]), json!([2, 3]), "<f4", json!(-9999.0)),
            Some(json!({"values_per_point": 3})),
            &[
                ("0.0", f32_bytes(&[0.0, 1.0, 2.0, 10.0, 11.0, 12.0])),
                ("0.1", f32_bytes(&[3.0, 0.0, 0.0, 13.0, 0.0, 0.0])),
                ("1.0", f32_bytes(&[20.0, 21.0, 22.0, 0.0, 0.0, 0.0])),
            ],
        );
    }

    #[tokio::test]
    async fn test_read_2d_rows_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        points_fixture(dir.path());
        let store = ZarrDirStore::new(dir.path());

        let meta = store.array_meta("points").await.unwrap();
        assert_eq!(meta.shape, vec![3, 4]);
        assert_eq!(meta.attr_u64("values_per_point"), Some(3));

        assert_eq!(store.read_floats("points", 0..4).await.unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(store.read_floats("points", 2..7).await.unwrap(), vec![2.0, 3.0, 10.0, 11.0, 12.0]);
        // (2, 3) lives in the missing chunk and reads as fill_value
        assert_eq!(store.read_floats("points", 8..12).await.unwrap(), vec![20.0, 21.0, 22.0, -9999.0]);
    }

    #[tokio::test]
    async fn test_read_1d_ints_with_padded_edge_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let i32_bytes = |values: &[i32]| values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>();
        write_array(
            dir.path(),
            "rel/indptr",
            zarray(json!([5]), json!([2]), "<i4", json!(0)),
            None,
            &[
                ("0", i32_bytes(&[0, 2])),
                ("1", i32_bytes(&[2, 5])),
                ("2", i32_bytes(&[7, 0])),
            ],
        );
        let store = ZarrDirStore::new(dir.path());

        assert_eq!(store.read_ints("rel/indptr", 0..5).await.unwrap(), vec![0, 2, 2, 5, 7]);
        assert_eq!(store.read_ints("rel/indptr", 3..5).await.unwrap(), vec![5, 7]);
        assert!(store.read_ints("rel/indptr", 3..3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_big_endian_and_int8() {
        let dir = tempfile::tempdir().unwrap();
        write_array(
            dir.path(),
            "big",
            zarray(json!([2]), json!([2]), ">i8", json!(0)),
            None,
            &[("0", [7i64.to_be_bytes(), (-3i64).to_be_bytes()].concat())],
        );
        write_array(
            dir.path(),
            "small",
            zarray(json!([3]), json!([3]), "|i1", json!(-127)),
            None,
            &[("0", vec![5u8, 0x81, 0])],
        );
        let store = ZarrDirStore::new(dir.path());

        assert_eq!(store.read_ints("big", 0..2).await.unwrap(), vec![7, -3]);
        assert_eq!(store.read_floats("small", 0..3).await.unwrap(), vec![5.0, -127.0, 0.0]);
    }

    #[tokio::test]
    async fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        points_fixture(dir.path());
        let mut compressed = zarray(json!([4]), json!([4]), "<f4", json!(0));
        compressed["compressor"] = json!({"id": "lzma"});
        write_array(dir.path(), "compressed", compressed, None, &[]);
        let store = ZarrDirStore::new(dir.path());

        assert!(matches!(store.array_meta("nope").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.read_ints("points", 0..1).await,
            Err(StoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.read_floats("points", 0..13).await,
            Err(StoreError::OutOfBounds { .. })
        ));
        match store.array_meta("compressed").await {
            Err(StoreError::Corrupt { reason, .. }) => assert!(reason.contains("lzma")),
            other => panic!("expected corrupt error, got {:?}", other),
        }
    }

    /// Layout zarr-python writes for `points`: one row per chunk, blosc/lz4.
    #[tokio::test]
    async fn test_read_compressed_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut points = zarray(json!([3, 3]), json!([1, 3]), "<f4", json!(-9999.0));
        points["compressor"] = json!({"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1, "blocksize": 0});
        write_array(
            dir.path(),
            "points",
            points,
            None,
            &[
                ("0.0", blosc_lz4(&f32_bytes(&[0.0, 1.0, 2.0]), 4)),
                ("1.0", blosc_stored(&f32_bytes(&[3.0, 4.0, 5.0]), 4)),
            ],
        );
        let mut indices = zarray(json!([4]), json!([4]), "<i8", json!(0));
        indices["compressor"] = json!({"id": "zlib", "level": 1});
        let raw: Vec<u8> = [4i64, 5, 6, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        write_array(dir.path(), "rel/indices", indices, None, &[("0", zlib(&raw))]);
        let mut broken = zarray(json!([4]), json!([4]), "<i8", json!(0));
        broken["compressor"] = json!({"id": "zlib", "level": 1});
        write_array(dir.path(), "broken", broken, None, &[("0", raw.clone())]);
        let store = ZarrDirStore::new(dir.path());

        assert_eq!(store.read_floats("points", 1..5).await.unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        // row 2 has no chunk file
        assert_eq!(store.read_floats("points", 6..9).await.unwrap(), vec![-9999.0; 3]);
        assert_eq!(store.read_ints("rel/indices", 0..4).await.unwrap(), vec![4, 5, 6, 7]);
        assert!(matches!(
            store.read_ints("broken", 0..4).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_parse_fill() {
        assert_eq!(parse_fill(&json!(-9999.9)), -9999.9);
        assert!(parse_fill(&json!("NaN")).is_nan());
        assert_eq!(parse_fill(&Value::Null), 0.0);
    }
}
