//! Robust five-number summaries over a pixel window or a boolean mask.

use crate::error::{Result, VelocityError};
use crate::units::{annual_scale, is_nodata, TemporalBaseline};
use ndarray::{s, ArrayView2};

/// Mean, standard deviation, median and quartiles of a sample.
///
/// Every field is NaN when the sample holds no valid value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSummary {
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
}

impl StatSummary {
    pub fn nan() -> Self {
        Self {
            mean: f64::NAN,
            std: f64::NAN,
            median: f64::NAN,
            p25: f64::NAN,
            p75: f64::NAN,
        }
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.mean, self.std, self.median, self.p25, self.p75]
    }

    /// Summary of the valid (non-NaN, non-sentinel) values in `values`.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut sample: Vec<f64> = values.into_iter().filter(|&v| !is_nodata(v)).collect();
        if sample.is_empty() {
            return Self::nan();
        }

        let n = sample.len() as f64;
        let mean = sample.iter().sum::<f64>() / n;
        let var = sample.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        sample.sort_by(|a, b| a.total_cmp(b));

        Self {
            mean,
            std: var.sqrt(),
            median: percentile_sorted(&sample, 50.0),
            p25: percentile_sorted(&sample, 25.0),
            p75: percentile_sorted(&sample, 75.0),
        }
    }
}

/// Percentile with linear interpolation between closest ranks.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Units of the sampled raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleUnits {
    /// Values are already velocities.
    Velocity,
    /// Values are raw pixel offsets, annualized before summarizing.
    PixelOffset {
        resolution: f64,
        dt: TemporalBaseline,
    },
}

impl SampleUnits {
    /// Resolve the `take_velocity` flag and its optional companions.
    pub fn from_flags(
        take_velocity: bool,
        resolution: Option<f64>,
        dt: Option<TemporalBaseline>,
    ) -> Result<Self> {
        if take_velocity {
            return Ok(Self::Velocity);
        }
        let resolution = resolution.ok_or(VelocityError::MissingArgument(
            "resolution is required for displacement statistics",
        ))?;
        let dt = dt.ok_or(VelocityError::MissingArgument(
            "temporal baseline is required for displacement statistics",
        ))?;
        Ok(Self::PixelOffset { resolution, dt })
    }

    fn converter(&self) -> Result<impl Fn(f64) -> f64> {
        let (scale, dt) = match *self {
            Self::Velocity => (1.0, TemporalBaseline::from_days(1)),
            Self::PixelOffset { resolution, dt } => (annual_scale(resolution, dt)?, dt),
        };
        Ok(move |v: f64| {
            if is_nodata(v) {
                f64::NAN
            } else {
                dt.orient(v) * scale
            }
        })
    }
}

/// Statistics over the `(2*pad+1)²` window centred on column `x`, row `y`.
pub fn pixel_stats(
    raster: ArrayView2<f64>,
    x: usize,
    y: usize,
    pad: usize,
    units: SampleUnits,
) -> Result<StatSummary> {
    let (rows, cols) = raster.dim();
    let out_of_bounds = VelocityError::WindowOutOfBounds {
        x,
        y,
        pad,
        rows,
        cols,
    };
    let (x_end, y_end) = match (x.checked_add(pad), y.checked_add(pad)) {
        (Some(x_end), Some(y_end)) => (x_end, y_end),
        _ => return Err(out_of_bounds),
    };
    if x < pad || y < pad || x_end >= cols || y_end >= rows {
        return Err(out_of_bounds);
    }

    let convert = units.converter()?;
    let window = raster.slice(s![y - pad..=y + pad, x - pad..=x + pad]);
    Ok(StatSummary::from_values(window.iter().map(|&v| convert(v))))
}

/// Statistics over every pixel whose mask value is 1.
pub fn mask_stats(
    raster: ArrayView2<f64>,
    mask: ArrayView2<u8>,
    units: SampleUnits,
) -> Result<StatSummary> {
    if raster.dim() != mask.dim() {
        return Err(VelocityError::ShapeMismatch {
            expected: raster.dim(),
            found: mask.dim(),
        });
    }

    let convert = units.converter()?;
    let sample = raster
        .iter()
        .zip(mask.iter())
        .filter(|(_, &m)| m == 1)
        .map(|(&v, _)| convert(v));
    Ok(StatSummary::from_values(sample))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::NODATA;
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array2};

    #[test]
    fn test_summary_matches_numpy_conventions() {
        let summary = StatSummary::from_values([1.0, 2.0, 3.0, 4.0]);
        assert_relative_eq!(summary.mean, 2.5);
        // population standard deviation
        assert_relative_eq!(summary.std, 1.118033988749895, epsilon = 1e-12);
        assert_relative_eq!(summary.median, 2.5);
        assert_relative_eq!(summary.p25, 1.75);
        assert_relative_eq!(summary.p75, 3.25);
    }

    #[test]
    fn test_summary_ignores_nan_and_sentinel() {
        let summary = StatSummary::from_values([f64::NAN, 2.0, NODATA, 4.0]);
        assert_relative_eq!(summary.mean, 3.0);
        assert_relative_eq!(summary.median, 3.0);
    }

    #[test]
    fn test_only_sentinel_gives_nan_summary() {
        let raster = Array2::from_elem((3, 3), NODATA);
        let summary = pixel_stats(raster.view(), 1, 1, 1, SampleUnits::Velocity).unwrap();
        assert!(summary.to_array().iter().all(|v| v.is_nan()));

        let mask = Array2::from_elem((3, 3), 1u8);
        let summary = mask_stats(raster.view(), mask.view(), SampleUnits::Velocity).unwrap();
        assert!(summary.to_array().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_single_pixel_window() {
        let raster = arr2(&[[1.0, 2.0, 3.0], [4.0, 7.5, 6.0], [7.0, 8.0, 9.0]]);
        let summary = pixel_stats(raster.view(), 1, 1, 0, SampleUnits::Velocity).unwrap();
        assert_eq!(summary.mean, 7.5);
        assert_eq!(summary.median, 7.5);
        assert_eq!(summary.std, 0.0);
        assert_eq!(summary.p25, 7.5);
        assert_eq!(summary.p75, 7.5);
    }

    #[test]
    fn test_window_uses_column_then_row() {
        let raster = arr2(&[[0.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 5.0]]);
        let summary = pixel_stats(raster.view(), 3, 1, 0, SampleUnits::Velocity).unwrap();
        assert_eq!(summary.mean, 5.0);
    }

    #[test]
    fn test_window_out_of_bounds() {
        let raster = Array2::<f64>::zeros((5, 5));
        assert!(matches!(
            pixel_stats(raster.view(), 4, 2, 1, SampleUnits::Velocity),
            Err(VelocityError::WindowOutOfBounds { .. })
        ));
        assert!(matches!(
            pixel_stats(raster.view(), 0, 2, 1, SampleUnits::Velocity),
            Err(VelocityError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_window_at_usize_max_is_out_of_bounds() {
        let raster = Array2::<f64>::zeros((5, 5));
        assert!(matches!(
            pixel_stats(raster.view(), usize::MAX, 2, 1, SampleUnits::Velocity),
            Err(VelocityError::WindowOutOfBounds { .. })
        ));
        assert!(matches!(
            pixel_stats(raster.view(), 2, usize::MAX - 1, 3, SampleUnits::Velocity),
            Err(VelocityError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_mask_selects_flagged_pixels() {
        let raster = arr2(&[[1.0, 100.0], [3.0, 100.0]]);
        let mask = arr2(&[[1u8, 0], [1, 0]]);
        let summary = mask_stats(raster.view(), mask.view(), SampleUnits::Velocity).unwrap();
        assert_relative_eq!(summary.mean, 2.0);
        assert_relative_eq!(summary.std, 1.0);
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let raster = Array2::<f64>::zeros((4, 4));
        let mask = Array2::<u8>::ones((4, 5));
        assert!(matches!(
            mask_stats(raster.view(), mask.view(), SampleUnits::Velocity),
            Err(VelocityError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_raw_offsets_are_annualized() {
        let raster = Array2::from_elem((3, 3), 2.0);
        let units = SampleUnits::PixelOffset {
            resolution: 3.0,
            dt: TemporalBaseline::from_days(-365),
        };
        let summary = pixel_stats(raster.view(), 1, 1, 1, units).unwrap();
        // reversed pair flips the sign
        assert_relative_eq!(summary.mean, -6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_raw_mode_requires_resolution_and_baseline() {
        assert!(matches!(
            SampleUnits::from_flags(false, None, Some(TemporalBaseline::from_days(10))),
            Err(VelocityError::MissingArgument(_))
        ));
        assert!(matches!(
            SampleUnits::from_flags(false, Some(3.0), None),
            Err(VelocityError::MissingArgument(_))
        ));
        assert_eq!(
            SampleUnits::from_flags(true, None, None).unwrap(),
            SampleUnits::Velocity
        );
    }

    #[test]
    fn test_raw_mode_zero_baseline() {
        let raster = Array2::from_elem((3, 3), 2.0);
        let units = SampleUnits::PixelOffset {
            resolution: 3.0,
            dt: TemporalBaseline::from_days(0),
        };
        assert!(matches!(
            pixel_stats(raster.view(), 1, 1, 0, units),
            Err(VelocityError::ZeroBaseline)
        ));
    }
}
