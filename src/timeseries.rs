//! Per-pair statistics over an AOI or a pixel window, collected into a table.

use crate::aoi::AoiMask;
use crate::error::{Result, VelocityError};
use crate::io::{self, RasterMetadata};
use crate::matches::{MatchRecord, MatchTable};
use crate::stats::{mask_stats, pixel_stats, SampleUnits, StatSummary};
use crate::velocity::OffsetRaster;
use log::{debug, error, info, warn};
use ndarray::Array2;
use std::path::{Path, PathBuf};

const STAT_NAMES: [&str; 5] = ["mean", "std", "median", "p25", "p75"];

/// Where statistics are sampled.
#[derive(Debug)]
pub enum Region {
    /// Pixels inside (or, inverted, outside) a vector AOI.
    Aoi(AoiMask),
    /// Square window of side `2*pad+1` centred on column `x`, row `y`.
    Pixel { x: usize, y: usize, pad: usize },
}

impl Region {
    pub fn aoi<P: Into<PathBuf>>(path: P, invert: bool) -> Self {
        Self::Aoi(AoiMask::new(path, invert))
    }

    /// Identity of the region in output file names.
    pub fn name(&self) -> String {
        match self {
            Self::Aoi(mask) => mask.name(),
            Self::Pixel { x, y, .. } => format!("x{}_y{}", x, y),
        }
    }

    fn summarize(
        &mut self,
        band: &Array2<f64>,
        metadata: &RasterMetadata,
        units: SampleUnits,
    ) -> Result<StatSummary> {
        match self {
            Self::Aoi(aoi) => {
                let mask = aoi.for_grid(metadata)?;
                summarize_in_mask(band, mask, units)
            }
            Self::Pixel { x, y, pad } => pixel_stats(band.view(), *x, *y, *pad, units),
        }
    }
}

/// Mask statistics for one table row; a mask that does not fit the raster
/// yields an all-NaN summary instead of failing the whole table.
///
/// Masks from [`AoiMask::for_grid`] always match their raster, so this only
/// fires for masks built elsewhere.
fn summarize_in_mask(
    band: &Array2<f64>,
    mask: &Array2<u8>,
    units: SampleUnits,
) -> Result<StatSummary> {
    match mask_stats(band.view(), mask.view(), units) {
        Err(VelocityError::ShapeMismatch { expected, found }) => {
            error!(
                "Raster of shape {:?} does not fit AOI mask of shape {:?}, check the correlation extent",
                expected, found
            );
            Ok(StatSummary::nan())
        }
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct TimeSeriesOptions {
    /// Extension distinguishing processing variants in disparity file names.
    pub prefix_ext: String,
    /// Drop pairs whose baseline exceeds this many days.
    pub max_dt: Option<i64>,
    /// Summarize the velocity raster instead of raw x/y displacement.
    pub take_velocity: bool,
}

impl Default for TimeSeriesOptions {
    fn default() -> Self {
        Self {
            prefix_ext: String::new(),
            max_dt: None,
            take_velocity: true,
        }
    }
}

/// Match records joined with one row of statistic columns each.
#[derive(Debug, Clone)]
pub struct StatsTable {
    pub records: Vec<MatchRecord>,
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl StatsTable {
    fn new(records: Vec<MatchRecord>, take_velocity: bool) -> Self {
        let prefixes: &[&str] = if take_velocity { &["vel"] } else { &["dx", "dy"] };
        let columns: Vec<String> = prefixes
            .iter()
            .flat_map(|p| STAT_NAMES.iter().map(move |s| format!("{}_{}", p, s)))
            .collect();
        let values = vec![vec![f64::NAN; columns.len()]; records.len()];
        Self {
            records,
            columns,
            values,
        }
    }

    fn set(&mut self, row: usize, summaries: &[StatSummary]) {
        let flat: Vec<f64> = summaries.iter().flat_map(|s| s.to_array()).collect();
        self.values[row] = flat;
    }

    /// Value of `column` for record `row`.
    pub fn get(&self, row: usize, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.values.get(row).map(|r| r[col])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write as CSV; NaN becomes an empty field.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;

        let mut header: Vec<String> = [
            "ref", "sec", "id_ref", "id_sec", "date_ref", "date_sec", "path", "dt",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;

        for (record, values) in self.records.iter().zip(&self.values) {
            let mut row = vec![
                record.reference.display().to_string(),
                record.secondary.display().to_string(),
                record.id_ref.clone(),
                record.id_sec.clone(),
                record.date_ref.to_string(),
                record.date_sec.to_string(),
                record.directory().display().to_string(),
                record.dt.days().to_string(),
            ];
            row.extend(values.iter().map(|v| {
                if v.is_nan() {
                    String::new()
                } else {
                    v.to_string()
                }
            }));
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn record_stats(
    record: &MatchRecord,
    path: &Path,
    region: &mut Region,
    take_velocity: bool,
) -> Result<Vec<StatSummary>> {
    if take_velocity {
        let (bands, metadata) = io::read_bands(path, &[1])?;
        let summary = region.summarize(&bands[0], &metadata, SampleUnits::Velocity)?;
        return Ok(vec![summary]);
    }

    let offsets = OffsetRaster::open(path)?;
    let (dx, dy) = offsets.masked_offsets()?;
    let units = SampleUnits::from_flags(
        false,
        Some(offsets.metadata.resolution()),
        Some(record.dt),
    )?;
    Ok(vec![
        region.summarize(&dx, &offsets.metadata, units)?,
        region.summarize(&dy, &offsets.metadata, units)?,
    ])
}

/// Statistics for every pair of `table`, also written as CSV next to the table.
///
/// Pairs without a derived file keep NaN statistics.
pub fn extract_time_series(
    table: &MatchTable,
    region: &mut Region,
    options: &TimeSeriesOptions,
) -> Result<(StatsTable, PathBuf)> {
    let region_name = region.name();
    match &*region {
        Region::Aoi(_) => info!("Calculating statistics inside AOI {}", region_name),
        Region::Pixel { x, y, pad } => info!(
            "Calculating statistics at pixel {} {} with a padding of {} pixels",
            x, y, pad
        ),
    }

    let table = match options.max_dt {
        Some(max_dt) => table.clone().filter_max_dt(max_dt),
        None => table.clone(),
    };

    let ext = if options.take_velocity {
        info!("Using velocity rasters to generate timeline");
        "_velocity"
    } else {
        info!("Using disparity maps to generate timeline");
        ""
    };

    let mut stats = StatsTable::new(table.records.clone(), options.take_velocity);

    for (row, record) in table.records.iter().enumerate() {
        let path = if options.take_velocity {
            record.velocity_path(&options.prefix_ext)
        } else {
            record.disparity_path(&options.prefix_ext)
        };

        if !path.is_file() {
            warn!("Disparity file {} not found", path.display());
            continue;
        }

        debug!(
            "[{}/{}] {} -> {}",
            row + 1,
            table.len(),
            record.id_ref,
            record.id_sec
        );
        let summaries = record_stats(record, &path, region, options.take_velocity)?;
        stats.set(row, &summaries);
    }

    let out_path = table.output_dir.join(format!(
        "stats_in_aoi_{}{}_{}.csv",
        table.name, ext, region_name
    ));
    stats.write_csv(&out_path)?;
    info!("Wrote {}", out_path.display());

    Ok((stats, out_path))
}
