use crate::error::{Result, VelocityError};
use crate::units::mask_nodata;
use gdal::cpl::CslStringList;
use gdal::raster::RasterBand;
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info};
use ndarray::Array2;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

/// Size and georeferencing of a raster, used to tell grids apart.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
}

impl RasterMetadata {
    /// Ground units per pixel, taken from the geotransform x-scale.
    pub fn resolution(&self) -> f64 {
        self.pixel_width
    }

    /// `[min_x, min_y, max_x, max_y]` in raster CRS units.
    pub fn extent(&self) -> [f64; 4] {
        let gt = &self.geotransform;
        let x0 = gt[0];
        let x1 = gt[0] + self.width as f64 * gt[1];
        let y0 = gt[3];
        let y1 = gt[3] + self.height as f64 * gt[5];
        [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
    }

    pub fn grid(&self) -> GridSpec {
        GridSpec {
            width: self.width,
            height: self.height,
            geotransform: self.geotransform,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// GeoTIFF creation settings for derived rasters.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub compression: String,
    pub tile_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            tile_size: 256,
        }
    }
}

impl WriteOptions {
    pub fn new(compression: &str, tile_size: usize) -> Result<Self> {
        let compression = compression.to_uppercase();
        let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
        if !valid_types.contains(&compression.as_str()) {
            return Err(VelocityError::InvalidCompression(compression));
        }
        if tile_size == 0 || tile_size % 16 != 0 {
            return Err(VelocityError::InvalidTileSize(tile_size));
        }
        Ok(Self {
            compression,
            tile_size,
        })
    }

    fn creation_options(&self) -> Vec<String> {
        vec![
            format!("COMPRESS={}", self.compression),
            "TILED=YES".to_string(),
            format!("BLOCKXSIZE={}", self.tile_size),
            format!("BLOCKYSIZE={}", self.tile_size),
            "BIGTIFF=IF_SAFER".to_string(),
        ]
    }
}

/// Extract metadata from a dataset without reading any band data
pub fn extract_metadata_from_dataset(dataset: &Dataset) -> Result<RasterMetadata> {
    let rasterband: RasterBand = dataset.rasterband(1)?;

    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    if width == 0 || height == 0 {
        return Err(VelocityError::InvalidDimensions(width, height));
    }

    let nodata = rasterband.no_data_value();
    let geotransform = dataset.geo_transform()?;
    let pixel_width = geotransform[1].abs();
    let pixel_height = geotransform[5].abs();

    if pixel_width <= 0.0 {
        return Err(VelocityError::InvalidPixelSize(pixel_width));
    }

    Ok(RasterMetadata {
        width,
        height,
        band_count: dataset.raster_count() as usize,
        geotransform,
        projection: dataset.projection(),
        nodata,
        pixel_width,
        pixel_height,
    })
}

/// Read one band as `f64` with the no-data sentinel mapped to NaN.
pub fn read_band(dataset: &Dataset, band_index: usize) -> Result<Array2<f64>> {
    let rasterband = dataset.rasterband(band_index)?;
    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
    let data_vec: Vec<f64> = buffer.into_iter().collect();
    let data = Array2::from_shape_vec((height, width), data_vec)?;

    Ok(mask_nodata(data.view()))
}

/// Open a raster and read the requested bands (1-indexed)
pub fn read_bands<P: AsRef<Path>>(
    path: P,
    bands: &[usize],
) -> Result<(Vec<Array2<f64>>, RasterMetadata)> {
    let path = path.as_ref();
    debug!("Reading bands {:?} from {}", bands, path.display());
    let dataset = Dataset::open(path)?;
    let metadata = extract_metadata_from_dataset(&dataset)?;

    let arrays = bands
        .iter()
        .map(|&band| read_band(&dataset, band))
        .collect::<Result<Vec<_>>>()?;

    Ok((arrays, metadata))
}

/// Write a multi-band float32 GeoTIFF on the grid described by `metadata`
pub fn write_multiband_output<P: AsRef<Path>>(
    path: P,
    bands: &[Array2<f64>],
    descriptions: &[&str],
    metadata: &RasterMetadata,
    options: &WriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    info!("Creating output raster: {}", path.display());

    for band in bands {
        if band.dim() != metadata.shape() {
            return Err(VelocityError::ShapeMismatch {
                expected: metadata.shape(),
                found: band.dim(),
            });
        }
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut gdal_options = CslStringList::new();
    for opt in options.creation_options() {
        gdal_options.add_string(&opt)?;
    }

    let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
        path,
        metadata.width,
        metadata.height,
        bands.len(),
        &gdal_options,
    )?;

    dataset.set_geo_transform(&metadata.geotransform)?;
    if !metadata.projection.is_empty() {
        dataset.set_projection(&metadata.projection)?;
    }

    for (i, band_data) in bands.iter().enumerate() {
        let band_index = i + 1;
        let mut raster_band = dataset.rasterband(band_index)?;

        // Array2 is row-major, as GDAL expects
        let values: Vec<f32> = band_data.iter().map(|&v| v as f32).collect();
        let mut buffer = gdal::raster::Buffer::new((metadata.width, metadata.height), values);
        raster_band.write((0, 0), (metadata.width, metadata.height), &mut buffer)?;

        if let Some(description) = descriptions.get(i) {
            raster_band.set_description(description)?;
        }
        raster_band.set_no_data_value(Some(f64::NAN))?;
        debug!("Wrote band {} of {}", band_index, path.display());
    }

    info!("Successfully wrote {} bands to output", bands.len());
    Ok(())
}
