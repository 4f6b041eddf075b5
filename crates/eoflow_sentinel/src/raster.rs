//! Raster merge tooling.
//!
//! The merge is delegated to GDAL command-line tools:
//!
//! ```text
//! {output}_list.txt -> gdalbuildvrt -> {output}.vrt
//!   -> gdal_translate (COG, BIGTIFF, DEFLATE, PREDICTOR=2) -> {output}_mosaic.tif
//!   -> gdalwarp (target CRS, resolution, cutline, nodata) -> {output}.tif
//! ```

use eoflow_protocol::BoundingBox;
use eoflow_publish::RasterBounds;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::error::MergeError;

/// Inputs of one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequest {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub target_crs: String,
    pub resolution: f64,
    pub nodata: f64,
    pub boundary_mask: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutput {
    pub artifact: PathBuf,
    /// Files produced along the way, removed once the group is finalized
    pub intermediates: Vec<PathBuf>,
}

pub trait RasterToolkit: Send + Sync {
    fn merge(&self, request: &MergeRequest) -> Result<MergeOutput, MergeError>;

    /// Extent of a raster in its own CRS.
    fn bounds(&self, path: &Path) -> Result<RasterBounds, MergeError>;
}

/// GDAL CLI implementation. Tools are looked up on `PATH` unless `bin_dir`
/// is set.
#[derive(Debug, Clone)]
pub struct GdalToolkit {
    bin_dir: Option<PathBuf>,
    epsg: u32,
}

impl GdalToolkit {
    pub fn new(epsg: u32) -> Self {
        Self { bin_dir: None, epsg }
    }

    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(bin_dir.into());
        self
    }

    fn tool(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn run(&self, name: &str, args: &[OsString]) -> Result<Vec<u8>, MergeError> {
        debug!(tool = name, ?args, "Running raster tool");
        let output = Command::new(self.tool(name))
            .args(args)
            .output()
            .map_err(|e| MergeError::io(self.tool(name), e))?;
        if !output.status.success() {
            return Err(MergeError::ToolFailed {
                tool: name.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// `{output}` with its extension replaced by `suffix`.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{stem}{suffix}"))
}

/// Arguments for the final reprojection and clip.
pub fn warp_args(request: &MergeRequest, input: &Path) -> Vec<OsString> {
    let resolution = request.resolution.to_string();
    let mut args: Vec<OsString> = vec![
        "-overwrite".into(),
        "-t_srs".into(),
        request.target_crs.clone().into(),
        "-tr".into(),
        resolution.clone().into(),
        resolution.into(),
    ];
    if let Some(mask) = &request.boundary_mask {
        args.push("-cutline".into());
        args.push(mask.clone().into());
        args.push("-crop_to_cutline".into());
    }
    let tail: [OsString; 12] = [
        "-dstnodata".into(),
        request.nodata.to_string().into(),
        "-of".into(),
        "COG".into(),
        "-co".into(),
        "BIGTIFF=YES".into(),
        "-co".into(),
        "COMPRESS=DEFLATE".into(),
        "-co".into(),
        "PREDICTOR=2".into(),
        input.as_os_str().to_owned(),
        request.output.as_os_str().to_owned(),
    ];
    args.extend(tail);
    args
}

impl RasterToolkit for GdalToolkit {
    fn merge(&self, request: &MergeRequest) -> Result<MergeOutput, MergeError> {
        if request.inputs.is_empty() {
            return Err(MergeError::NoInputs);
        }

        let list = sibling(&request.output, "_list.txt");
        let vrt = sibling(&request.output, ".vrt");
        let mosaic = sibling(&request.output, "_mosaic.tif");

        let mut inputs = request.inputs.clone();
        inputs.sort();
        let listing: String = inputs
            .iter()
            .map(|p| format!("{}\n", p.display()))
            .collect();
        std::fs::write(&list, listing).map_err(|e| MergeError::io(&list, e))?;

        self.run(
            "gdalbuildvrt",
            &[
                "-input_file_list".into(),
                list.clone().into(),
                vrt.clone().into(),
            ],
        )?;
        self.run(
            "gdal_translate",
            &[
                "-of".into(),
                "COG".into(),
                "-co".into(),
                "BIGTIFF=YES".into(),
                "-co".into(),
                "COMPRESS=DEFLATE".into(),
                "-co".into(),
                "PREDICTOR=2".into(),
                vrt.clone().into(),
                mosaic.clone().into(),
            ],
        )?;
        self.run("gdalwarp", &warp_args(request, &mosaic))?;

        info!(output = %request.output.display(), parts = inputs.len(), "Merged partitions");
        Ok(MergeOutput {
            artifact: request.output.clone(),
            intermediates: vec![list, vrt, mosaic],
        })
    }

    fn bounds(&self, path: &Path) -> Result<RasterBounds, MergeError> {
        let stdout = self.run("gdalinfo", &["-json".into(), path.into()])?;
        let bbox = parse_gdalinfo_bounds(&stdout)?;
        Ok(RasterBounds::new(bbox, self.epsg))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GdalInfo {
    corner_coordinates: CornerCoordinates,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CornerCoordinates {
    lower_left: [f64; 2],
    upper_right: [f64; 2],
}

/// Extent from `gdalinfo -json` output.
pub fn parse_gdalinfo_bounds(stdout: &[u8]) -> Result<BoundingBox, MergeError> {
    let info: GdalInfo = serde_json::from_slice(stdout).map_err(|e| MergeError::Decode {
        tool: "gdalinfo".to_string(),
        message: e.to_string(),
    })?;
    let corners = info.corner_coordinates;
    Ok(BoundingBox::new(
        corners.lower_left[0],
        corners.lower_left[1],
        corners.upper_right[0],
        corners.upper_right[1],
    ))
}
