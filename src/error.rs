//! Error types for object building, post-processing and analysis.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing data product: {key}")]
    MissingProduct { key: String },

    #[error("Data product `{key}` is not a {expected}")]
    UnexpectedProduct { key: String, expected: &'static str },

    #[error("Must provide metadata to build objects in cm")]
    MissingMeta,

    #[error("Module `{module}` requires `{key}`, which is not in the data")]
    MissingField { module: String, key: String },

    #[error("Batched product `{key}` has {got} entries, expected {expected}")]
    BatchLength {
        key: String,
        expected: usize,
        got: usize,
    },

    #[error("Module `{module}` produced `{field}` for {got} entries, expected {expected}")]
    IncompleteUpdate {
        module: String,
        field: String,
        expected: usize,
        got: usize,
    },

    #[error("Match index {index} out of range for {len} {kind}s")]
    MatchIndex {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Voxel index {index} out of range for a tensor of {rows} rows")]
    VoxelIndex { index: usize, rows: usize },

    #[error("Tensor `{key}` has {got} columns, expected at least {expected}")]
    Columns {
        key: String,
        expected: usize,
        got: usize,
    },

    #[error("Cannot merge the points of interaction {id}: {source}")]
    Points {
        id: usize,
        source: ndarray::ShapeError,
    },

    #[error("CSV sink `{sink}` expects columns {expected:?}, got {got:?}")]
    RowKeys {
        sink: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecoResult<T> = Result<T, RecoError>;

impl RecoError {
    /// Wrap a configuration deserialization failure with the module name.
    pub fn config(module: &str, err: impl std::fmt::Display) -> Self {
        RecoError::Config(format!("{module}: {err}"))
    }
}
