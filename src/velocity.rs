use crate::error::{Result, VelocityError};
use crate::io::{self, RasterMetadata, WriteOptions};
use crate::matches::MatchTable;
use crate::stats::StatSummary;
use crate::units::{annual_scale, apply_validity, TemporalBaseline};
use gdal::Dataset;
use log::{debug, info, warn};
use ndarray::{Array2, Zip};
use std::path::{Path, PathBuf};

/// Pixel offsets between two correlated images.
#[derive(Debug, Clone)]
pub struct OffsetRaster {
    pub dx: Array2<f64>,
    pub dy: Array2<f64>,
    /// Optional third band, 1 = valid correlation, 0 = rejected.
    pub valid: Option<Array2<f64>>,
    pub metadata: RasterMetadata,
}

impl OffsetRaster {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dataset = Dataset::open(path)?;
        let metadata = io::extract_metadata_from_dataset(&dataset)?;

        if !(2..=3).contains(&metadata.band_count) {
            return Err(VelocityError::InvalidBandCount(metadata.band_count));
        }

        let dx = io::read_band(&dataset, 1)?;
        let dy = io::read_band(&dataset, 2)?;
        let valid = if metadata.band_count == 3 {
            debug!("Interpreting band 3 of {} as validity mask", path.display());
            Some(io::read_band(&dataset, 3)?)
        } else {
            None
        };

        Ok(Self {
            dx,
            dy,
            valid,
            metadata,
        })
    }

    /// x/y offsets with rejected pixels set to NaN.
    pub fn masked_offsets(&self) -> Result<(Array2<f64>, Array2<f64>)> {
        match &self.valid {
            Some(valid) => Ok((
                apply_validity(self.dx.view(), valid.view())?,
                apply_validity(self.dy.view(), valid.view())?,
            )),
            None => Ok((self.dx.clone(), self.dy.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityOptions {
    /// Ground resolution; read from the geotransform when `None`.
    pub resolution: Option<f64>,
    /// Subtract each band's median offset before conversion.
    pub median_shift: bool,
}

/// Velocity magnitude (ground units per year) and bearing (degrees from north).
#[derive(Debug, Clone)]
pub struct VelocityField {
    pub magnitude: Array2<f64>,
    pub bearing: Array2<f64>,
}

/// NaN-aware median of a band.
pub fn nan_median(band: &Array2<f64>) -> f64 {
    StatSummary::from_values(band.iter().copied()).median
}

/// Subtract the band's median offset from every pixel.
pub fn median_shift(band: &Array2<f64>) -> Array2<f64> {
    let median = nan_median(band);
    debug!("Median shift: {:.4}", median);
    band.mapv(|v| v - median)
}

/// Bearing of offset `(x, y)` in degrees clockwise from north, `[0, 360)`.
pub fn bearing(x: f64, y: f64) -> f64 {
    let length = x.hypot(y);
    let angle = (y / length).clamp(-1.0, 1.0).acos().to_degrees();
    if x < 0.0 {
        // x rounding just below zero gives acos() == 0, which must stay 0
        (360.0 - angle).rem_euclid(360.0)
    } else {
        angle
    }
}

/// Convert an offset raster to velocity and bearing.
pub fn compute_velocity(
    offsets: &OffsetRaster,
    dt: TemporalBaseline,
    options: VelocityOptions,
) -> Result<VelocityField> {
    let resolution = options
        .resolution
        .unwrap_or_else(|| offsets.metadata.resolution());
    let scale = annual_scale(resolution, dt)?;

    let (mut dx, mut dy) = offsets.masked_offsets()?;

    if dt.is_reversed() {
        dx.mapv_inplace(|v| -v);
        dy.mapv_inplace(|v| -v);
    }

    if options.median_shift {
        dx = median_shift(&dx);
        dy = median_shift(&dy);
    }

    let magnitude = Zip::from(&dx)
        .and(&dy)
        .map_collect(|&x, &y| x.hypot(y) * scale);
    let bearing = Zip::from(&dx).and(&dy).map_collect(|&x, &y| bearing(x, y));

    Ok(VelocityField { magnitude, bearing })
}

/// Read a disparity file, convert it and return the field with its grid.
pub fn velocity_from_file<P: AsRef<Path>>(
    path: P,
    dt: TemporalBaseline,
    options: VelocityOptions,
) -> Result<(VelocityField, RasterMetadata)> {
    let offsets = OffsetRaster::open(path)?;
    let field = compute_velocity(&offsets, dt, options)?;
    Ok((field, offsets.metadata))
}

/// Write a velocity field as a 2-band raster (magnitude, bearing).
pub fn write_velocity<P: AsRef<Path>>(
    path: P,
    field: &VelocityField,
    metadata: &RasterMetadata,
    options: &WriteOptions,
) -> Result<()> {
    let mut out_meta = metadata.clone();
    out_meta.band_count = 2;
    io::write_multiband_output(
        path,
        &[field.magnitude.clone(), field.bearing.clone()],
        &["velocity", "direction"],
        &out_meta,
        options,
    )
}

/// `<stem>_velocity.tif` next to the disparity file.
pub fn default_velocity_path(disparity: &Path) -> PathBuf {
    let stem = disparity
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    disparity.with_file_name(format!("{}_velocity.tif", stem))
}

/// Compute velocity rasters for every pair of `table` whose disparity file exists.
///
/// Existing outputs are kept unless `overwrite` is set. Returns the written paths.
pub fn compute_velocity_batch(
    table: &MatchTable,
    prefix_ext: &str,
    overwrite: bool,
    median_shift: bool,
    write_options: &WriteOptions,
) -> Result<Vec<PathBuf>> {
    info!("Computing velocity for {} pairs", table.len());
    let options = VelocityOptions {
        resolution: None,
        median_shift,
    };

    let mut written = Vec::new();
    for record in &table.records {
        let disparity = record.disparity_path(prefix_ext);
        if !disparity.is_file() {
            warn!(
                "Disparity file {} not found, skipping velocity calculation",
                disparity.display()
            );
            continue;
        }

        let target = record.velocity_path(prefix_ext);
        if target.is_file() && !overwrite {
            debug!("Velocity file {} exists, skipping", target.display());
            continue;
        }

        let (field, metadata) = velocity_from_file(&disparity, record.dt, options)?;
        write_velocity(&target, &field, &metadata, write_options)?;
        written.push(target);
    }

    info!("Wrote {} velocity rasters", written.len());
    Ok(written)
}
