// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure taxonomy for the two ingest pipelines. The driver recovers from
/// `CatalogUnavailable` and `EmptyDay` by moving to the next day; `Fetch` is
/// recovered even lower, by skipping the single locator. Everything else
/// halts the remaining range.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote listing for one day could not be retrieved.
    #[error("catalog unavailable for {url}: {reason}")]
    CatalogUnavailable { url: String, reason: String },

    /// A single payload could not be downloaded.
    #[error("fetch failed for {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    /// A payload violated a schema assumption (bad validTime, missing
    /// coordinate variable, malformed geometry).
    #[error("parse error: {0}")]
    Parse(String),

    /// A day yielded no payloads at all. Expected and frequent; callers
    /// treat it as a no-op, not a failure.
    #[error("no payloads for this day")]
    EmptyDay,

    /// Bad product or store arguments, raised before any network I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The batch being appended does not match the store's schema.
    #[error("schema mismatch appending to store {store}")]
    SchemaMismatch { store: PathBuf },

    /// The batch being appended does not extend the store's time axis
    /// strictly forward.
    #[error("time axis not monotonic appending to store {store}")]
    TimeNotMonotonic { store: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    #[error(transparent)]
    NetCdf(#[from] netcdf::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
