use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VelocityError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Temporal baseline is zero days, velocity is undefined")]
    ZeroBaseline,

    #[error("Shape mismatch: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("No input rasters found for {0}")]
    EmptyStack(String),

    #[error("Window at x={x}, y={y} with pad {pad} exceeds raster of {rows}x{cols}")]
    WindowOutOfBounds {
        x: usize,
        y: usize,
        pad: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Offset raster must have 2 or 3 bands, found {0}")]
    InvalidBandCount(usize),

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Pixel size is non-positive: {0}")]
    InvalidPixelSize(f64),

    #[error("Cannot derive scene id or date from {0}")]
    InvalidSceneId(String),

    #[error("Match table is empty")]
    EmptyMatchTable,

    #[error("Malformed match table {path}: {reason}")]
    MatchTable { path: PathBuf, reason: String },

    #[error("AOI {0} contains no geometries")]
    EmptyAoi(PathBuf),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),
}

pub type Result<T> = std::result::Result<T, VelocityError>;
