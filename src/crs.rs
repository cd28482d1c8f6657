use gdal::spatial_ref::SpatialRef;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrsMatch {
    Same,
    Different,
    Unknown,
}

/// Compare the spatial reference of an AOI layer with a raster's WKT.
///
/// Authority codes are compared when both sides carry one, the WKT text
/// otherwise.
pub fn compare_crs(aoi: Option<&SpatialRef>, raster_wkt: &str) -> CrsMatch {
    let Some(aoi) = aoi else {
        debug!("AOI has no spatial reference");
        return CrsMatch::Unknown;
    };
    if raster_wkt.is_empty() {
        debug!("Raster has no spatial reference");
        return CrsMatch::Unknown;
    }

    let raster = match SpatialRef::from_wkt(raster_wkt) {
        Ok(sr) => sr,
        Err(e) => {
            warn!("Failed to parse raster projection WKT: {}", e);
            return CrsMatch::Unknown;
        }
    };

    match (aoi.auth_code(), raster.auth_code()) {
        (Ok(a), Ok(r)) => {
            debug!("AOI EPSG:{} vs raster EPSG:{}", a, r);
            if a == r {
                CrsMatch::Same
            } else {
                CrsMatch::Different
            }
        }
        _ => match (aoi.to_wkt(), raster.to_wkt()) {
            (Ok(a), Ok(r)) if a == r => CrsMatch::Same,
            (Ok(_), Ok(_)) => CrsMatch::Different,
            _ => CrsMatch::Unknown,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_epsg() {
        let aoi = SpatialRef::from_epsg(32633).unwrap();
        let raster = SpatialRef::from_epsg(32633).unwrap().to_wkt().unwrap();
        assert_eq!(compare_crs(Some(&aoi), &raster), CrsMatch::Same);
    }

    #[test]
    fn test_different_epsg() {
        let aoi = SpatialRef::from_epsg(4326).unwrap();
        let raster = SpatialRef::from_epsg(32633).unwrap().to_wkt().unwrap();
        assert_eq!(compare_crs(Some(&aoi), &raster), CrsMatch::Different);
    }

    #[test]
    fn test_missing_reference_is_unknown() {
        let raster = SpatialRef::from_epsg(32633).unwrap().to_wkt().unwrap();
        assert_eq!(compare_crs(None, &raster), CrsMatch::Unknown);
        let aoi = SpatialRef::from_epsg(4326).unwrap();
        assert_eq!(compare_crs(Some(&aoi), ""), CrsMatch::Unknown);
    }
}
