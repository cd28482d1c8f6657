//! Mean and spread composites of many single-pair rasters.

use crate::circular::{circular_mean, circular_std};
use crate::error::{Result, VelocityError};
use crate::io::{self, RasterMetadata, WriteOptions};
use crate::matches::{MatchRecord, MatchTable};
use crate::units::{annualize_component, TemporalBaseline};
use crate::velocity::{median_shift, OffsetRaster};
use log::{debug, info, warn};
use ndarray::Array2;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How a stack of values at one pixel is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Arithmetic mean and standard deviation.
    Linear,
    /// Circular mean and standard deviation of angles in degrees.
    Circular,
}

/// Derived quantity to stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackQuantity {
    /// East-west displacement rate from band 1 of the disparity map.
    Dx,
    /// North-south displacement rate from band 2 of the disparity map.
    Dy,
    /// Velocity magnitude from band 1 of the velocity raster.
    Velocity,
    /// Bearing from band 2 of the velocity raster.
    Direction,
}

impl StackQuantity {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Dx => "dx",
            Self::Dy => "dy",
            Self::Velocity => "velocity",
            Self::Direction => "direction",
        }
    }

    pub fn reduction(self) -> Reduction {
        match self {
            Self::Direction => Reduction::Circular,
            Self::Dx | Self::Dy | Self::Velocity => Reduction::Linear,
        }
    }

    fn band(self) -> usize {
        match self {
            Self::Dx | Self::Velocity => 1,
            Self::Dy | Self::Direction => 2,
        }
    }

    fn is_raw(self) -> bool {
        matches!(self, Self::Dx | Self::Dy)
    }

    /// File holding this quantity for `record`.
    pub fn source_path(self, record: &MatchRecord, prefix_ext: &str) -> PathBuf {
        if self.is_raw() {
            record.disparity_path(prefix_ext)
        } else {
            record.velocity_path(prefix_ext)
        }
    }
}

impl fmt::Display for StackQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for StackQuantity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dx" => Ok(Self::Dx),
            "dy" => Ok(Self::Dy),
            "velocity" => Ok(Self::Velocity),
            "direction" => Ok(Self::Direction),
            other => Err(format!(
                "unknown quantity '{}', expected dx, dy, velocity or direction",
                other
            )),
        }
    }
}

/// Per-pixel mean and standard deviation of a stack.
#[derive(Debug, Clone)]
pub struct Composite {
    pub mean: Array2<f64>,
    pub std: Array2<f64>,
}

fn linear_pixel(values: &[f64]) -> (f64, f64) {
    let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    let var = valid.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn circular_pixel(degrees: &[f64]) -> (f64, f64) {
    let radians = degrees.iter().map(|d| d.to_radians());
    (
        circular_mean(radians.clone()).to_degrees(),
        circular_std(radians).to_degrees(),
    )
}

/// Reduce same-shape layers pixel by pixel, ignoring NaN.
///
/// Circular layers are bearings in degrees; the result is in degrees too.
pub fn reduce_stack(layers: &[Array2<f64>], reduction: Reduction) -> Result<Composite> {
    let first = layers
        .first()
        .ok_or_else(|| VelocityError::EmptyStack("stack reduction".to_string()))?;
    let (nrows, ncols) = first.dim();

    for layer in layers {
        if layer.dim() != (nrows, ncols) {
            return Err(VelocityError::ShapeMismatch {
                expected: (nrows, ncols),
                found: layer.dim(),
            });
        }
    }

    let rows: Vec<Vec<(f64, f64)>> = (0..nrows)
        .into_par_iter()
        .map(|row| {
            let mut values = vec![0.0; layers.len()];
            (0..ncols)
                .map(|col| {
                    for (v, layer) in values.iter_mut().zip(layers) {
                        *v = layer[[row, col]];
                    }
                    match reduction {
                        Reduction::Linear => linear_pixel(&values),
                        Reduction::Circular => circular_pixel(&values),
                    }
                })
                .collect()
        })
        .collect();

    let (mean_vec, std_vec): (Vec<f64>, Vec<f64>) = rows.into_iter().flatten().unzip();
    Ok(Composite {
        mean: Array2::from_shape_vec((nrows, ncols), mean_vec)?,
        std: Array2::from_shape_vec((nrows, ncols), std_vec)?,
    })
}

/// Annualized displacement layer for one disparity raster.
///
/// Rejected pixels are masked first; the median shift runs on pixel offsets
/// before conversion.
pub fn displacement_layer(
    offsets: &OffsetRaster,
    quantity: StackQuantity,
    dt: TemporalBaseline,
    shift: bool,
) -> Result<Array2<f64>> {
    let (dx, dy) = offsets.masked_offsets()?;
    let component = if quantity == StackQuantity::Dy { dy } else { dx };
    let component = if shift {
        median_shift(&component)
    } else {
        component
    };
    annualize_component(component.view(), offsets.metadata.resolution(), dt)
}

fn load_layer(
    record: &MatchRecord,
    quantity: StackQuantity,
    prefix_ext: &str,
    shift: bool,
) -> Result<Option<(Array2<f64>, RasterMetadata)>> {
    let path = quantity.source_path(record, prefix_ext);
    if !path.is_file() {
        warn!("{} not found, leaving it out of the stack", path.display());
        return Ok(None);
    }
    debug!("Loading {} from {}", quantity, path.display());

    if quantity.is_raw() {
        let offsets = OffsetRaster::open(&path)?;
        let layer = displacement_layer(&offsets, quantity, record.dt, shift)?;
        Ok(Some((layer, offsets.metadata)))
    } else {
        let (mut bands, metadata) = io::read_bands(&path, &[quantity.band()])?;
        Ok(bands.pop().map(|band| (band, metadata)))
    }
}

/// `<table name>_average_<quantity><prefix_ext>.tif` in the table's output directory.
pub fn composite_path(table: &MatchTable, quantity: StackQuantity, prefix_ext: &str) -> PathBuf {
    table.output_dir.join(format!(
        "{}_average_{}{}.tif",
        table.name,
        quantity.tag(),
        prefix_ext
    ))
}

/// Stack `quantity` over every pair of `table` whose file exists and write the composite.
pub fn stack_rasters(
    table: &MatchTable,
    quantity: StackQuantity,
    prefix_ext: &str,
    shift: bool,
    write_options: &WriteOptions,
) -> Result<PathBuf> {
    info!("Stacking {} over {} pairs", quantity, table.len());

    let loaded = table
        .records
        .par_iter()
        .map(|record| load_layer(record, quantity, prefix_ext, shift))
        .collect::<Result<Vec<_>>>()?;

    let mut metadata: Option<RasterMetadata> = None;
    let mut layers = Vec::new();
    for (layer, meta) in loaded.into_iter().flatten() {
        if metadata.is_none() {
            metadata = Some(meta);
        }
        layers.push(layer);
    }

    let metadata = metadata.ok_or_else(|| VelocityError::EmptyStack(quantity.tag().to_string()))?;
    info!("Reducing {} layers", layers.len());
    let composite = reduce_stack(&layers, quantity.reduction())?;

    let out_path = composite_path(table, quantity, prefix_ext);
    write_composite(&out_path, &composite, &metadata, write_options)?;
    Ok(out_path)
}

fn write_composite(
    path: &Path,
    composite: &Composite,
    metadata: &RasterMetadata,
    write_options: &WriteOptions,
) -> Result<()> {
    let mut out_meta = metadata.clone();
    out_meta.band_count = 2;
    io::write_multiband_output(
        path,
        &[composite.mean.clone(), composite.std.clone()],
        &["mean", "std"],
        &out_meta,
        write_options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{metadata, write_raster};
    use approx::assert_relative_eq;
    use ndarray::arr2;
    use std::fs;

    #[test]
    fn test_linear_reduction_skips_nan() {
        let layers = vec![
            arr2(&[[1.0, f64::NAN], [2.0, f64::NAN]]),
            arr2(&[[3.0, 5.0], [f64::NAN, f64::NAN]]),
        ];
        let composite = reduce_stack(&layers, Reduction::Linear).unwrap();
        assert_relative_eq!(composite.mean[[0, 0]], 2.0);
        assert_relative_eq!(composite.std[[0, 0]], 1.0);
        assert_relative_eq!(composite.mean[[0, 1]], 5.0);
        assert_relative_eq!(composite.std[[0, 1]], 0.0);
        assert_relative_eq!(composite.mean[[1, 0]], 2.0);
        assert!(composite.mean[[1, 1]].is_nan());
        assert!(composite.std[[1, 1]].is_nan());
    }

    #[test]
    fn test_circular_reduction_wraps() {
        let layers: Vec<Array2<f64>> = [10.0, 20.0, 350.0, 0.0]
            .iter()
            .map(|&d| Array2::from_elem((2, 2), d))
            .collect();
        let composite = reduce_stack(&layers, Reduction::Circular).unwrap();
        let mean = composite.mean[[1, 1]];
        assert!(mean < 10.0, "circular mean was {}", mean);

        let linear = reduce_stack(&layers, Reduction::Linear).unwrap();
        assert_relative_eq!(linear.mean[[1, 1]], 95.0);
    }

    #[test]
    fn test_empty_stack_fails() {
        assert!(matches!(
            reduce_stack(&[], Reduction::Linear),
            Err(VelocityError::EmptyStack(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let layers = vec![Array2::zeros((2, 2)), Array2::zeros((2, 3))];
        assert!(matches!(
            reduce_stack(&layers, Reduction::Linear),
            Err(VelocityError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_median_shift_recovers_baseline_mean() {
        let baselines = vec![
            arr2(&[[-1.0, 0.0, 1.0], [2.0, 0.0, -2.0]]),
            arr2(&[[0.5, -0.5, 0.0], [0.0, 3.0, -3.0]]),
        ];
        let dt = TemporalBaseline::from_days(73);
        let to_offsets = |dx: Array2<f64>| OffsetRaster {
            dy: Array2::zeros(dx.dim()),
            metadata: metadata(3, 2, 2, 3.0),
            valid: None,
            dx,
        };

        let expected: Vec<Array2<f64>> = baselines
            .iter()
            .map(|b| displacement_layer(&to_offsets(b.clone()), StackQuantity::Dx, dt, false).unwrap())
            .collect();
        let shifted: Vec<Array2<f64>> = baselines
            .iter()
            .map(|b| {
                displacement_layer(&to_offsets(b.mapv(|v| v + 4.25)), StackQuantity::Dx, dt, true)
                    .unwrap()
            })
            .collect();

        let expected = reduce_stack(&expected, Reduction::Linear).unwrap();
        let shifted = reduce_stack(&shifted, Reduction::Linear).unwrap();
        for (a, b) in expected.mean.iter().zip(shifted.mean.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_quantity_selection() {
        assert_eq!("direction".parse::<StackQuantity>().unwrap(), StackQuantity::Direction);
        assert!("speed".parse::<StackQuantity>().is_err());
        assert_eq!(StackQuantity::Direction.reduction(), Reduction::Circular);
        assert_eq!(StackQuantity::Velocity.reduction(), Reduction::Linear);
        assert_eq!(StackQuantity::Dy.reduction(), Reduction::Linear);
    }

    fn site() -> (tempfile::TempDir, Vec<MatchRecord>) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("disparity_maps")).unwrap();
        let reference = dir.path().join("20200101_000000_aa.tif");
        let records = ["20200131_000000_bb.tif", "20200301_000000_cc.tif", "20200501_000000_dd.tif"]
            .iter()
            .map(|s| MatchRecord::new(reference.clone(), dir.path().join(s)).unwrap())
            .collect();
        (dir, records)
    }

    #[test]
    fn test_stack_direction_files() {
        let (dir, records) = site();
        // third pair has no velocity raster
        for (record, bearing) in records.iter().zip([350.0, 10.0]) {
            write_raster(
                &record.velocity_path(""),
                &[Array2::from_elem((4, 4), 5.0), Array2::from_elem((4, 4), bearing)],
                3.0,
            );
        }
        let table = MatchTable::from_records(records).unwrap();
        let out = stack_rasters(
            &table,
            StackQuantity::Direction,
            "",
            false,
            &WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(out, dir.path().join("matches_average_direction.tif"));

        let (bands, _) = io::read_bands(&out, &[1, 2]).unwrap();
        let mean = bands[0][[2, 2]];
        assert!(mean < 1e-3 || mean > 359.999, "mean was {}", mean);
        assert!(bands[1][[2, 2]] > 0.0);
    }

    #[test]
    fn test_stack_raw_displacement_files() {
        let (_dir, records) = site();
        let mut valid = Array2::from_elem((4, 4), 1.0);
        valid[[0, 0]] = 0.0;
        write_raster(
            &records[0].disparity_path("_v2"),
            &[Array2::from_elem((4, 4), 1.0), Array2::zeros((4, 4)), valid],
            3.0,
        );
        write_raster(
            &records[1].disparity_path("_v2"),
            &[Array2::from_elem((4, 4), 4.0), Array2::zeros((4, 4))],
            3.0,
        );
        let dt0 = records[0].dt;
        let dt1 = records[1].dt;
        let table = MatchTable::from_records(records).unwrap();
        let out = stack_rasters(&table, StackQuantity::Dx, "_v2", false, &WriteOptions::default())
            .unwrap();
        assert!(out.ends_with("matches_average_dx_v2.tif"));

        let first = 3.0 / dt0.days() as f64 * 365.0;
        let second = 4.0 * 3.0 / dt1.days() as f64 * 365.0;
        let (bands, _) = io::read_bands(&out, &[1]).unwrap();
        assert_relative_eq!(bands[0][[3, 3]], (first + second) / 2.0, epsilon = 1e-3);
        // masked in the first pair, only the second contributes
        assert_relative_eq!(bands[0][[0, 0]], second, epsilon = 1e-3);
    }

    #[test]
    fn test_stack_without_files_fails() {
        let (_dir, records) = site();
        let table = MatchTable::from_records(records).unwrap();
        let result = stack_rasters(
            &table,
            StackQuantity::Velocity,
            "",
            false,
            &WriteOptions::default(),
        );
        assert!(matches!(result, Err(VelocityError::EmptyStack(_))));
    }
}
