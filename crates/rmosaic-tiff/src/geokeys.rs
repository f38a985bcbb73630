//! GeoTIFF georeferencing tags.
//!
//! Transforms are stored either as ModelPixelScale + ModelTiepoint (north-up
//! grids) or as a 4x4 ModelTransformation matrix. The reference system is
//! stored as an EPSG code in the GeoKeyDirectory.

use crate::{Result, TiffIoError};
use rmosaic_geom::AffineTransform;
use rmosaic_merge::Crs;

/// ModelPixelScaleTag: `[scale_x, scale_y, scale_z]`.
pub const MODEL_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag: `[i, j, k, x, y, z]`.
pub const MODEL_TIEPOINT: u16 = 33922;
/// ModelTransformationTag: row-major 4x4 matrix.
pub const MODEL_TRANSFORMATION: u16 = 34264;
/// GeoKeyDirectoryTag.
pub const GEO_KEY_DIRECTORY: u16 = 34735;
/// GDAL_NODATA, stored as an ASCII string.
pub const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u32 = 32767;

/// Transform from a tiepoint and pixel scale.
///
/// The tiepoint ties raster point `(i, j)` to world point `(x, y)`; rows run
/// southwards.
pub fn transform_from_tiepoint(tiepoint: &[f64], scale: &[f64]) -> Result<AffineTransform> {
    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(TiffIoError::InvalidGeoTiff(format!(
            "tiepoint has {} values and pixel scale {}; need 6 and 2",
            tiepoint.len(),
            scale.len()
        )));
    }
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);
    Ok(AffineTransform::new(
        sx,
        0.0,
        x - i * sx,
        0.0,
        -sy,
        y + j * sy,
    )?)
}

/// Transform from a ModelTransformation matrix.
pub fn transform_from_matrix(matrix: &[f64]) -> Result<AffineTransform> {
    if matrix.len() < 16 {
        return Err(TiffIoError::InvalidGeoTiff(format!(
            "model transformation has {} values, need 16",
            matrix.len()
        )));
    }
    Ok(AffineTransform::new(
        matrix[0], matrix[1], matrix[3], matrix[4], matrix[5], matrix[7],
    )?)
}

/// True when `transform` can be written as a pixel scale and tiepoint.
pub fn is_north_up(transform: &AffineTransform) -> bool {
    transform.is_rectilinear() && transform.a() > 0.0 && transform.e() < 0.0
}

/// `(pixel_scale, tiepoint)` for a north-up transform.
pub fn tiepoint_tags(transform: &AffineTransform) -> ([f64; 3], [f64; 6]) {
    (
        [transform.a(), -transform.e(), 0.0],
        [0.0, 0.0, 0.0, transform.c(), transform.f(), 0.0],
    )
}

/// ModelTransformation matrix for any transform.
pub fn matrix_tag(transform: &AffineTransform) -> [f64; 16] {
    let t = transform;
    [
        t.a(), t.b(), 0.0, t.c(),
        t.d(), t.e(), 0.0, t.f(),
        0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

fn is_geographic(crs: Crs) -> bool {
    (4000..5000).contains(&crs.epsg())
}

/// GeoKeyDirectory declaring `crs`, or `None` if the code does not fit a key.
pub fn geokey_directory(crs: Crs) -> Option<Vec<u16>> {
    let code = u16::try_from(crs.epsg()).ok()?;
    let (model_type, crs_key) = if is_geographic(crs) {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };
    Some(vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, code,
    ])
}

/// EPSG code declared by a GeoKeyDirectory.
///
/// A projected system takes precedence over a geographic one; user-defined
/// and indirectly stored codes are ignored.
pub fn crs_from_geokeys(directory: &[u32]) -> Option<Crs> {
    let count = *directory.get(3)? as usize;
    let entries: Vec<&[u32]> = directory
        .get(4..)?
        .chunks_exact(4)
        .take(count)
        .collect();
    let lookup = |key: u16| {
        entries
            .iter()
            .find(|e| e[0] == key as u32 && e[1] == 0)
            .map(|e| e[3])
            .filter(|&code| code != 0 && code != USER_DEFINED)
    };
    lookup(PROJECTED_CS_TYPE)
        .or_else(|| lookup(GEOGRAPHIC_TYPE))
        .map(Crs)
}

/// Parse a GDAL_NODATA string.
pub fn parse_nodata(raw: &str) -> Option<f64> {
    raw.trim_end_matches('\0').trim().parse().ok()
}

/// Format a nodata value for GDAL_NODATA.
pub fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        nodata.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmosaic_geom::transform::from_origin;

    #[test]
    fn test_tiepoint_round_trip() {
        let t = from_origin(-114.0, 46.0, 0.2, 0.2).unwrap();
        assert!(is_north_up(&t));
        let (scale, tie) = tiepoint_tags(&t);
        assert_eq!(transform_from_tiepoint(&tie, &scale).unwrap(), t);
    }

    #[test]
    fn test_tiepoint_offset_from_origin() {
        // Raster point (2, 1) tied to (10, 20) at 0.5 units per pixel.
        let t = transform_from_tiepoint(&[2.0, 1.0, 0.0, 10.0, 20.0, 0.0], &[0.5, 0.5, 0.0]).unwrap();
        assert_eq!(t.forward(0.0, 0.0), (9.0, 20.5));
    }

    #[test]
    fn test_matrix_round_trip() {
        let t = AffineTransform::new(1.0, 0.5, 100.0, 0.25, -1.0, 200.0).unwrap();
        assert!(!is_north_up(&t));
        assert_eq!(transform_from_matrix(&matrix_tag(&t)).unwrap(), t);
        assert!(transform_from_matrix(&[1.0; 6]).is_err());
    }

    #[test]
    fn test_short_tags_rejected() {
        assert!(matches!(
            transform_from_tiepoint(&[0.0; 3], &[1.0, 1.0]),
            Err(TiffIoError::InvalidGeoTiff(_))
        ));
    }

    #[test]
    fn test_geokeys() {
        let dir = geokey_directory(Crs(4326)).unwrap();
        assert_eq!(&dir[12..], &[GEOGRAPHIC_TYPE, 0, 1, 4326]);
        let as_u32: Vec<u32> = dir.iter().map(|&v| v as u32).collect();
        assert_eq!(crs_from_geokeys(&as_u32), Some(Crs(4326)));

        let utm: Vec<u32> = geokey_directory(Crs(32612))
            .unwrap()
            .into_iter()
            .map(u32::from)
            .collect();
        assert_eq!(crs_from_geokeys(&utm), Some(Crs(32612)));

        assert!(geokey_directory(Crs(100_000)).is_none());
        assert_eq!(crs_from_geokeys(&[1, 1, 0, 1, 3072, 0, 1, 32767]), None);
        assert_eq!(crs_from_geokeys(&[1, 1]), None);
    }

    #[test]
    fn test_nodata_strings() {
        assert_eq!(parse_nodata("-9999\0"), Some(-9999.0));
        assert!(parse_nodata("nan").unwrap().is_nan());
        assert_eq!(parse_nodata("none"), None);
        assert_eq!(format_nodata(0.0), "0");
        assert_eq!(format_nodata(-3.5), "-3.5");
        assert_eq!(format_nodata(f64::NAN), "nan");
    }
}
