//! Footprints for catalog items.
//!
//! Raster bounds arrive in Swiss LV95 (EPSG:2056) and are converted to
//! WGS84 with swisstopo's approximate formulas (accurate to about 1 m).

use eoflow_protocol::BoundingBox;

use crate::error::PublishError;

pub const EPSG_LV95: u32 = 2056;
pub const EPSG_LV03: u32 = 21781;
pub const EPSG_WGS84: u32 = 4326;

/// Raster extent with the CRS it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterBounds {
    pub bbox: BoundingBox,
    pub epsg: u32,
}

impl RasterBounds {
    pub fn new(bbox: BoundingBox, epsg: u32) -> Self {
        Self { bbox, epsg }
    }
}

/// LV95 easting/northing to (longitude, latitude) in degrees.
pub fn lv95_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let y = (easting - 2_600_000.0) / 1_000_000.0;
    let x = (northing - 1_200_000.0) / 1_000_000.0;

    let lambda = 2.677_909_4 + 4.728_982 * y + 0.791_484 * y * x + 0.130_6 * y * x * x
        - 0.043_6 * y * y * y;
    let phi = 16.902_389_2 + 3.238_272 * x
        - 0.270_978 * y * y
        - 0.002_528 * x * x
        - 0.044_7 * y * y * x
        - 0.014_0 * x * x * x;

    (lambda * 100.0 / 36.0, phi * 100.0 / 36.0)
}

/// Closed polygon ring (lon, lat) around the bounds.
pub fn wgs84_ring(bounds: &RasterBounds) -> Result<Vec<[f64; 2]>, PublishError> {
    let to_wgs84: fn(f64, f64) -> (f64, f64) = match bounds.epsg {
        EPSG_WGS84 => |x, y| (x, y),
        EPSG_LV95 => lv95_to_wgs84,
        EPSG_LV03 => |e, n| lv95_to_wgs84(e + 2_000_000.0, n + 1_000_000.0),
        other => return Err(PublishError::UnsupportedCrs(other)),
    };

    Ok(bounds
        .bbox
        .ring()
        .iter()
        .map(|[x, y]| {
            let (lon, lat) = to_wgs84(*x, *y);
            [lon, lat]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_bern_reference_point() {
        let (lon, lat) = lv95_to_wgs84(2_600_000.0, 1_200_000.0);
        assert!(close(lon, 7.438_637), "lon {lon}");
        assert!(close(lat, 46.951_081), "lat {lat}");
    }

    #[test]
    fn test_ring_is_closed_and_in_switzerland() {
        let bounds = RasterBounds::new(
            BoundingBox::new(2_480_000.0, 1_070_000.0, 2_840_000.0, 1_300_000.0),
            EPSG_LV95,
        );
        let ring = wgs84_ring(&bounds).unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        for [lon, lat] in &ring {
            assert!((5.5..11.0).contains(lon), "lon {lon}");
            assert!((45.5..48.0).contains(lat), "lat {lat}");
        }
    }

    #[test]
    fn test_lv03_matches_lv95() {
        let lv03 = RasterBounds::new(
            BoundingBox::new(600_000.0, 200_000.0, 601_000.0, 201_000.0),
            EPSG_LV03,
        );
        let lv95 = RasterBounds::new(
            BoundingBox::new(2_600_000.0, 1_200_000.0, 2_601_000.0, 1_201_000.0),
            EPSG_LV95,
        );
        assert_eq!(wgs84_ring(&lv03).unwrap(), wgs84_ring(&lv95).unwrap());
    }

    #[test]
    fn test_degrees_pass_through() {
        let bounds = RasterBounds::new(BoundingBox::new(5.78, 45.70, 10.69, 47.89), EPSG_WGS84);
        let ring = wgs84_ring(&bounds).unwrap();
        assert!(ring.contains(&[5.78, 45.70]));
        assert!(ring.contains(&[10.69, 47.89]));
    }

    #[test]
    fn test_unknown_crs_rejected() {
        let bounds = RasterBounds::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 3857);
        assert!(matches!(
            wgs84_ring(&bounds),
            Err(PublishError::UnsupportedCrs(3857))
        ));
    }
}
