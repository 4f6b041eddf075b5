//! Raster toolkit that concatenates partitions instead of calling GDAL.

use eoflow_protocol::BoundingBox;
use eoflow_publish::RasterBounds;
use eoflow_sentinel::{MergeError, MergeOutput, MergeRequest, RasterToolkit};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A box around Bern in LV95.
pub const SAMPLE_LV95_BOUNDS: [f64; 4] = [2_595_000.0, 1_195_000.0, 2_605_000.0, 1_205_000.0];

pub struct FakeRasterToolkit {
    bounds: RasterBounds,
    merges: AtomicUsize,
    fail: AtomicBool,
}

impl Default for FakeRasterToolkit {
    fn default() -> Self {
        let [min_x, min_y, max_x, max_y] = SAMPLE_LV95_BOUNDS;
        Self::with_bounds(RasterBounds::new(
            BoundingBox::new(min_x, min_y, max_x, max_y),
            2056,
        ))
    }
}

impl FakeRasterToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: RasterBounds) -> Self {
        Self {
            bounds,
            merges: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every following merge fail like a crashed GDAL tool.
    pub fn fail_merges(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn merge_count(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }
}

impl RasterToolkit for FakeRasterToolkit {
    fn merge(&self, request: &MergeRequest) -> Result<MergeOutput, MergeError> {
        if request.inputs.is_empty() {
            return Err(MergeError::NoInputs);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MergeError::ToolFailed {
                tool: "gdalwarp".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "ERROR 1: injected".to_string(),
            });
        }

        let mut inputs = request.inputs.clone();
        inputs.sort();
        let mut merged = Vec::new();
        for input in &inputs {
            merged.extend(std::fs::read(input).map_err(|e| MergeError::io(input, e))?);
        }
        std::fs::write(&request.output, merged).map_err(|e| MergeError::io(&request.output, e))?;
        self.merges.fetch_add(1, Ordering::SeqCst);

        Ok(MergeOutput {
            artifact: request.output.clone(),
            intermediates: Vec::new(),
        })
    }

    fn bounds(&self, path: &Path) -> Result<RasterBounds, MergeError> {
        if !path.exists() {
            return Err(MergeError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "raster missing"),
            ));
        }
        Ok(self.bounds)
    }
}
