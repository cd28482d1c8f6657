//! Image-pair tables and the file naming conventions derived from them.

use crate::error::{Result, VelocityError};
use crate::units::TemporalBaseline;
use chrono::NaiveDate;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DISPARITY_DIR: &str = "disparity_maps";

/// Scene identifier and acquisition date parsed from an image path.
///
/// PlanetScope names start with `YYYYMMDD_HHMMSS_<sat>`; those three tokens
/// form the id. Other names keep their whole stem as id, but must still start
/// with an 8-digit date.
pub fn parse_scene<P: AsRef<Path>>(path: P) -> Result<(String, NaiveDate)> {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| VelocityError::InvalidSceneId(path.display().to_string()))?;

    let tokens: Vec<&str> = stem.split('_').collect();
    let date = NaiveDate::parse_from_str(tokens[0], "%Y%m%d")
        .map_err(|_| VelocityError::InvalidSceneId(stem.to_string()))?;

    let is_time = |t: &str| t.len() == 6 && t.chars().all(|c| c.is_ascii_digit());
    let id = if tokens.len() >= 3 && is_time(tokens[1]) {
        tokens[..3].join("_")
    } else {
        stem.to_string()
    };

    Ok((id, date))
}

/// One correlated image pair.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub reference: PathBuf,
    pub secondary: PathBuf,
    pub id_ref: String,
    pub id_sec: String,
    pub date_ref: NaiveDate,
    pub date_sec: NaiveDate,
    pub dt: TemporalBaseline,
}

impl MatchRecord {
    pub fn new<P: Into<PathBuf>>(reference: P, secondary: P) -> Result<Self> {
        let reference = reference.into();
        let secondary = secondary.into();
        let (id_ref, date_ref) = parse_scene(&reference)?;
        let (id_sec, date_sec) = parse_scene(&secondary)?;
        let dt = TemporalBaseline::from_days(date_sec.signed_duration_since(date_ref).num_days());

        Ok(Self {
            reference,
            secondary,
            id_ref,
            id_sec,
            date_ref,
            date_sec,
            dt,
        })
    }

    /// Directory holding the reference scene.
    pub fn directory(&self) -> PathBuf {
        self.reference
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    fn derived_path(&self, prefix_ext: &str, suffix: &str) -> PathBuf {
        self.directory().join(DISPARITY_DIR).join(format!(
            "{}_{}{}-F{}.tif",
            self.id_ref, self.id_sec, prefix_ext, suffix
        ))
    }

    /// Offset raster written by the correlator.
    pub fn disparity_path(&self, prefix_ext: &str) -> PathBuf {
        self.derived_path(prefix_ext, "")
    }

    /// Two-band velocity raster derived from [`Self::disparity_path`].
    pub fn velocity_path(&self, prefix_ext: &str) -> PathBuf {
        self.derived_path(prefix_ext, "_velocity")
    }
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    #[serde(rename = "ref")]
    reference: String,
    sec: String,
}

/// Ordered collection of image pairs plus where derived tables are written.
#[derive(Debug, Clone)]
pub struct MatchTable {
    pub records: Vec<MatchRecord>,
    /// Directory receiving statistics tables and composites.
    pub output_dir: PathBuf,
    /// Name used in output file names, the CSV stem or `matches`.
    pub name: String,
}

impl MatchTable {
    /// Load a match CSV with at least `ref` and `sec` columns.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading match table: {}", path.display());

        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        for column in ["ref", "sec"] {
            if !headers.iter().any(|h| h == column) {
                return Err(VelocityError::MatchTable {
                    path: path.to_path_buf(),
                    reason: format!("missing column '{}'", column),
                });
            }
        }

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let row: MatchRow = row?;
            records.push(MatchRecord::new(row.reference, row.sec)?);
        }

        let output_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("matches")
            .to_string();

        debug!("Loaded {} pairs from {}", records.len(), path.display());
        Ok(Self {
            records,
            output_dir,
            name,
        })
    }

    /// Build a table from in-memory records; outputs go next to the first reference.
    pub fn from_records(records: Vec<MatchRecord>) -> Result<Self> {
        let output_dir = records
            .first()
            .map(MatchRecord::directory)
            .ok_or(VelocityError::EmptyMatchTable)?;
        Ok(Self {
            records,
            output_dir,
            name: "matches".to_string(),
        })
    }

    /// Keep pairs whose baseline length `|dt|` does not exceed `max_dt` days.
    pub fn filter_max_dt(mut self, max_dt: i64) -> Self {
        let before = self.records.len();
        self.records.retain(|r| r.dt.days().abs() <= max_dt);
        debug!(
            "Baseline filter |dt| <= {} days kept {} of {} pairs",
            max_dt,
            self.records.len(),
            before
        );
        self
    }

    /// Reverse processing order, e.g. to split work across machines.
    pub fn reversed(mut self) -> Self {
        self.records.reverse();
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
