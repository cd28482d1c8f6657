//! Temporal baselines, the no-data sentinel and the single pixel-offset to
//! ground-velocity conversion used by every component.

use crate::error::{Result, VelocityError};
use ndarray::{Array2, ArrayView2};

/// No-data sentinel written by the correlation engine.
pub const NODATA: f64 = -9999.0;

/// Days per year used when annualizing displacements.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Signed day count between secondary and reference acquisition.
///
/// A negative value means the secondary scene is older than the reference;
/// offsets measured against such a pair point backwards in time and are
/// flipped by [`TemporalBaseline::orient`] before any conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TemporalBaseline {
    days: i64,
}

impl TemporalBaseline {
    pub fn from_days(days: i64) -> Self {
        Self { days }
    }

    pub fn days(&self) -> i64 {
        self.days
    }

    pub fn is_reversed(&self) -> bool {
        self.days < 0
    }

    /// Flip an offset component so it points forward in time.
    pub fn orient(&self, offset: f64) -> f64 {
        if self.is_reversed() {
            -offset
        } else {
            offset
        }
    }

    /// `|dt|` in days, rejecting a zero baseline.
    pub fn divisor(&self) -> Result<f64> {
        if self.days == 0 {
            return Err(VelocityError::ZeroBaseline);
        }
        Ok(self.days.unsigned_abs() as f64)
    }
}

/// Factor turning a pixel offset into ground units per year:
/// `resolution / |dt| * 365`.
///
/// Offsets keep their sign, so callers orient components with
/// [`TemporalBaseline::orient`] first and scale the vector length when they
/// want a magnitude.
pub fn annual_scale(resolution: f64, dt: TemporalBaseline) -> Result<f64> {
    Ok(resolution / dt.divisor()? * DAYS_PER_YEAR)
}

/// Oriented and annualized copy of a raw offset band.
pub fn annualize_component(
    band: ArrayView2<f64>,
    resolution: f64,
    dt: TemporalBaseline,
) -> Result<Array2<f64>> {
    let scale = annual_scale(resolution, dt)?;
    Ok(band.mapv(|v| dt.orient(v) * scale))
}

pub fn is_nodata(value: f64) -> bool {
    value.is_nan() || value == NODATA
}

/// Copy of `data` with the sentinel replaced by NaN.
pub fn mask_nodata(data: ArrayView2<f64>) -> Array2<f64> {
    data.mapv(|v| if v == NODATA { f64::NAN } else { v })
}

/// Copy of `data` with every pixel whose validity flag is 0 set to NaN.
pub fn apply_validity(data: ArrayView2<f64>, valid: ArrayView2<f64>) -> Result<Array2<f64>> {
    if data.dim() != valid.dim() {
        return Err(VelocityError::ShapeMismatch {
            expected: data.dim(),
            found: valid.dim(),
        });
    }
    let mut out = data.to_owned();
    out.zip_mut_with(&valid, |v, &flag| {
        if flag == 0.0 {
            *v = f64::NAN;
        }
    });
    Ok(out)
}
