//! Inclusion masks rasterized from a vector area of interest.

use crate::crs::{compare_crs, CrsMatch};
use crate::error::{Result, VelocityError};
use crate::io::{GridSpec, RasterMetadata};
use gdal::raster::rasterize;
use gdal::vector::{Geometry, LayerAccess};
use gdal::{Dataset, DriverManager};
use log::{debug, info, warn};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Burn the AOI polygons onto the grid of `metadata`: 1 inside, 0 outside.
///
/// With `invert` the mask selects everything outside the AOI instead.
pub fn rasterize_aoi(aoi: &Path, metadata: &RasterMetadata, invert: bool) -> Result<Array2<u8>> {
    info!(
        "Rasterizing AOI {} onto {}x{} grid",
        aoi.display(),
        metadata.width,
        metadata.height
    );
    debug!("Target extent {:?}", metadata.extent());

    let vector = Dataset::open(aoi)?;
    let mut geometries: Vec<Geometry> = Vec::new();
    let mut aoi_srs = None;
    for mut layer in vector.layers() {
        if aoi_srs.is_none() {
            aoi_srs = layer.spatial_ref();
        }
        for feature in layer.features() {
            if let Some(geometry) = feature.geometry() {
                geometries.push(geometry.clone());
            }
        }
    }

    if geometries.is_empty() {
        return Err(VelocityError::EmptyAoi(aoi.to_path_buf()));
    }

    if compare_crs(aoi_srs.as_ref(), &metadata.projection) == CrsMatch::Different {
        warn!(
            "AOI {} is not in the raster's CRS, reproject it first or the mask will be misplaced",
            aoi.display()
        );
    }

    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut target =
        driver.create_with_band_type::<u8, _>("", metadata.width, metadata.height, 1)?;
    target.set_geo_transform(&metadata.geotransform)?;
    if !metadata.projection.is_empty() {
        target.set_projection(&metadata.projection)?;
    }

    let burn_values = vec![1.0; geometries.len()];
    rasterize(&mut target, &[1], &geometries, &burn_values, None)?;

    let band = target.rasterband(1)?;
    let buffer = band.read_as::<u8>(
        (0, 0),
        (metadata.width, metadata.height),
        (metadata.width, metadata.height),
        None,
    )?;
    let data_vec: Vec<u8> = buffer.into_iter().collect();
    let mask = Array2::from_shape_vec((metadata.height, metadata.width), data_vec)?;

    let mask = if invert {
        mask.mapv(|v| u8::from(v != 1))
    } else {
        mask.mapv(|v| u8::from(v == 1))
    };

    debug!(
        "AOI mask selects {} of {} pixels",
        mask.iter().filter(|&&v| v == 1).count(),
        mask.len()
    );
    Ok(mask)
}

/// AOI masks built lazily, one per distinct raster grid.
#[derive(Debug)]
pub struct AoiMask {
    path: PathBuf,
    invert: bool,
    cache: Vec<(GridSpec, Array2<u8>)>,
}

impl AoiMask {
    pub fn new<P: Into<PathBuf>>(path: P, invert: bool) -> Self {
        Self {
            path: path.into(),
            invert,
            cache: Vec::new(),
        }
    }

    /// File name up to the first dot, used in output names.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .unwrap_or("aoi")
            .to_string()
    }

    pub fn grids(&self) -> usize {
        self.cache.len()
    }

    /// Mask aligned to the grid of `metadata`, rasterized on first use.
    pub fn for_grid(&mut self, metadata: &RasterMetadata) -> Result<&Array2<u8>> {
        let grid = metadata.grid();
        let idx = match self.cache.iter().position(|(g, _)| *g == grid) {
            Some(idx) => idx,
            None => {
                if !self.cache.is_empty() {
                    warn!(
                        "Raster grid {}x{} at ({}, {}) differs from earlier files, building a new AOI mask",
                        grid.width, grid.height, grid.geotransform[0], grid.geotransform[3]
                    );
                }
                let mask = rasterize_aoi(&self.path, metadata, self.invert)?;
                self.cache.push((grid, mask));
                self.cache.len() - 1
            }
        };
        Ok(&self.cache[idx].1)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    /// GeoJSON square covering `[x0, x1] x [y0, y1]`.
    pub fn write_square_aoi(path: &Path, x0: f64, y0: f64, x1: f64, y1: f64) {
        let json = format!(
            r#"{{"type":"FeatureCollection","features":[{{"type":"Feature","properties":{{}},"geometry":{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}}}]}}"#
        );
        fs::write(path, json).unwrap();
    }
}
