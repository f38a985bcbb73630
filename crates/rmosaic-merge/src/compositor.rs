//! Reverse-painter compositing of inputs onto one output grid.
//!
//! Inputs are composited in reverse of the order they are listed. Every
//! valid (non-nodata) input pixel overwrites whatever an earlier pass wrote,
//! so the first-listed input is painted last and takes priority wherever
//! it has data.

use crate::dataset::{CreationOptions, DatasetOpener, DatasetWriter};
use crate::resample::{resampling_from_env, Resampling};
use crate::{Crs, DType, Dataset, DatasetInfo, Env, GridBuilder, MergeError, RasterArray, Resolution, Result};
use rmosaic_geom::{is_nodata, window_bounds, window_transform, AffineTransform, BoundingBox, RasterGrid, Window};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Caller overrides for a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Output extent; defaults to the union of input bounds.
    pub bounds: Option<BoundingBox>,
    /// Output pixel size; defaults to the finest input pixel size.
    pub resolution: Option<Resolution>,
    /// Nodata for the output and for every input.
    pub nodata: Option<f64>,
    /// Output format; defaults to the writer's own driver.
    pub driver: Option<String>,
}

impl MergeOptions {
    fn grid_builder(&self) -> GridBuilder {
        GridBuilder::new()
            .bounds(self.bounds)
            .resolution(self.resolution)
    }
}

// ============================================================================
// Output Buffer
// ============================================================================

/// Dense output array plus a per-pixel record of which pixels received
/// valid data.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    data: RasterArray,
    written: Vec<bool>,
}

impl OutputBuffer {
    /// Buffer of shape `(bands, height, width)` filled with `nodata`.
    pub fn new(bands: usize, height: usize, width: usize, nodata: f64) -> Self {
        Self {
            data: RasterArray::filled(bands, height, width, nodata),
            written: vec![false; height * width],
        }
    }

    pub fn data(&self) -> &RasterArray {
        &self.data
    }

    /// True once any input has written valid data at `(row, col)`.
    pub fn is_written(&self, row: usize, col: usize) -> bool {
        row < self.data.height()
            && col < self.data.width()
            && self.written[row * self.data.width() + col]
    }

    /// Number of pixels holding valid data.
    pub fn written_count(&self) -> usize {
        self.written.iter().filter(|&&w| w).count()
    }

    fn put(&mut self, band: usize, row: usize, col: usize, value: f64) {
        if let Some(cell) = self.data.get_mut(band, row, col) {
            *cell = value;
        }
    }

    fn mark(&mut self, row: usize, col: usize) {
        let width = self.data.width();
        if let Some(flag) = self.written.get_mut(row * width + col) {
            *flag = true;
        }
    }
}

// ============================================================================
// Merged Raster
// ============================================================================

/// The finished mosaic, ready for a writer.
#[derive(Debug, Clone)]
pub struct MergedRaster {
    pub grid: RasterGrid,
    pub dtype: DType,
    pub nodata: f64,
    pub crs: Option<Crs>,
    pub data: RasterArray,
    /// Pixels that received valid data from some input.
    pub valid_pixels: usize,
}

impl Dataset for MergedRaster {
    fn name(&self) -> &str {
        "merged"
    }

    fn transform(&self) -> AffineTransform {
        self.grid.transform
    }

    fn width(&self) -> usize {
        self.grid.width
    }

    fn height(&self) -> usize {
        self.grid.height
    }

    fn count(&self) -> usize {
        self.data.bands()
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn nodata(&self) -> Option<f64> {
        Some(self.nodata)
    }

    fn crs(&self) -> Option<Crs> {
        self.crs
    }

    fn read(&self, window: &Window) -> Result<RasterArray> {
        self.data.read_window(window, self.nodata)
    }
}

// ============================================================================
// Compositor
// ============================================================================

/// Where a compositor is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    /// No input processed yet.
    Init,
    /// At least one input processed.
    Processing { processed: usize },
}

/// Result of compositing a single input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// The input does not overlap the output grid.
    Skipped,
    /// The input overlapped; `pixels` output pixels took at least one valid value from it.
    Composited { pixels: usize },
}

/// Composites inputs one at a time into an [`OutputBuffer`].
///
/// Call [`process`](Self::process) once per input in paint order (lowest
/// priority first), then [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct MergeCompositor {
    grid: RasterGrid,
    bounds: BoundingBox,
    count: usize,
    dtype: DType,
    nodata: f64,
    crs: Option<Crs>,
    resampler: Box<dyn Resampling>,
    debug_windows: bool,
    buffer: OutputBuffer,
    state: MergeState,
}

impl MergeCompositor {
    /// Create a compositor for `count` bands of `dtype` on `grid`, with every
    /// output pixel starting at `nodata`.
    pub fn new(
        grid: RasterGrid,
        count: usize,
        dtype: DType,
        nodata: f64,
        crs: Option<Crs>,
        resampler: Box<dyn Resampling>,
    ) -> Result<Self> {
        let bounds = grid.bounds()?;
        crate::grid::buffer_len(count, grid.height, grid.width)?;
        if !dtype.contains(nodata) {
            warn!(
                nodata,
                dtype = %dtype,
                stored_as = dtype.cast(nodata),
                "Nodata value is beyond the valid range of the output data type; \
                 gaps will be stored as the cast value. Consider overriding it"
            );
        }
        Ok(Self {
            grid,
            bounds,
            count,
            dtype,
            nodata,
            crs,
            resampler,
            debug_windows: false,
            buffer: OutputBuffer::new(count, grid.height, grid.width, nodata),
            state: MergeState::Init,
        })
    }

    /// Log source and destination windows for every input.
    pub fn with_debug_windows(mut self, enabled: bool) -> Self {
        self.debug_windows = enabled;
        self
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    pub fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    /// Composite one input on top of everything processed so far.
    ///
    /// Pixels are matched by output pixel centre: each centre is mapped into
    /// the input's pixel space and sampled with the configured resampling
    /// policy. Values equal to `nodata_override`, or to the input's own
    /// nodata when there is no override, are left untouched.
    pub fn process(
        &mut self,
        input: &dyn Dataset,
        nodata_override: Option<f64>,
    ) -> Result<InputOutcome> {
        self.state = match self.state {
            MergeState::Init => MergeState::Processing { processed: 1 },
            MergeState::Processing { processed } => MergeState::Processing {
                processed: processed + 1,
            },
        };

        if input.count() != self.count {
            return Err(MergeError::IncompatibleInputs(format!(
                "{} has {} bands, output has {}",
                input.name(),
                input.count(),
                self.count
            )));
        }
        if input.dtype() != self.dtype {
            warn!(
                input = input.name(),
                from = %input.dtype(),
                to = %self.dtype,
                "Casting input to output data type"
            );
        }

        let input_bounds = input.bounds()?;
        let Some(overlap) = input_bounds.intersection(&self.bounds) else {
            debug!(input = input.name(), "Input does not overlap output, skipping");
            return Ok(InputOutcome::Skipped);
        };

        let dst_window = self
            .grid
            .window(&overlap, false)?
            .round_outward()
            .crop(self.grid.height, self.grid.width);
        if dst_window.is_empty() {
            debug!(input = input.name(), "Overlap covers no output pixels, skipping");
            return Ok(InputOutcome::Skipped);
        }

        let dst_bounds = window_bounds(&dst_window, &self.grid.transform)?;
        let src_window = input.grid().window(&dst_bounds, true)?.round_outward();
        if self.debug_windows {
            debug!(
                input = input.name(),
                src_window = ?src_window.to_slices(),
                dst_window = ?dst_window.to_slices(),
                "Computed merge windows"
            );
        }

        let source = input
            .read(&src_window)
            .map_err(|e| MergeError::read_failure(input.name(), e))?;
        let to_source = window_transform(&src_window, &input.transform()).invert()?;
        let (in_height, in_width) = (input.height() as f64, input.width() as f64);
        let nodata = nodata_override.or(input.nodata());

        let (rows, cols) = dst_window.to_pixel_ranges()?;
        let mut pixels = 0;
        for row in rows {
            for col in cols.clone() {
                let (x, y) = self
                    .grid
                    .transform
                    .forward(col as f64 + 0.5, row as f64 + 0.5);
                let (src_col, src_row) = to_source.forward(x, y);

                // Centres outside the input's own raster take nothing from it.
                let in_col = src_col + src_window.col_start();
                let in_row = src_row + src_window.row_start();
                if in_col < 0.0 || in_row < 0.0 || in_col >= in_width || in_row >= in_height {
                    continue;
                }

                let mut wrote = false;
                for band in 0..self.count {
                    let Some(value) = self.resampler.sample(&source, band, src_row, src_col)
                    else {
                        continue;
                    };
                    if nodata.is_some_and(|nd| is_nodata(value, nd)) {
                        continue;
                    }
                    self.buffer.put(band, row, col, self.dtype.cast(value));
                    wrote = true;
                }
                if wrote {
                    self.buffer.mark(row, col);
                    pixels += 1;
                }
            }
        }

        debug!(input = input.name(), pixels, "Composited input");
        Ok(InputOutcome::Composited { pixels })
    }

    /// Finish the run and hand over the filled buffer.
    pub fn finalize(self) -> MergedRaster {
        let valid_pixels = self.buffer.written_count();
        MergedRaster {
            grid: self.grid,
            dtype: self.dtype,
            nodata: self.nodata,
            crs: self.crs,
            data: self.buffer.data,
            valid_pixels,
        }
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Output dtype, nodata and reference system implied by the inputs.
fn output_profile(infos: &[DatasetInfo], options: &MergeOptions) -> Result<(DType, f64, Option<Crs>)> {
    let first = infos.first().ok_or(MergeError::NoInputs)?;
    let nodata = options
        .nodata
        .or(first.nodata)
        .unwrap_or(first.dtype.default_nodata());
    let crs = infos.iter().find_map(|info| info.crs);
    Ok((first.dtype, nodata, crs))
}

fn compositor_for(
    infos: &[DatasetInfo],
    options: &MergeOptions,
    env: &Env,
) -> Result<MergeCompositor> {
    let grid = options.grid_builder().build(infos)?;
    let (dtype, nodata, crs) = output_profile(infos, options)?;
    info!(
        inputs = infos.len(),
        width = grid.width,
        height = grid.height,
        dtype = %dtype,
        nodata,
        "Merging inputs"
    );
    Ok(MergeCompositor::new(
        grid,
        infos[0].count,
        dtype,
        nodata,
        crs,
        resampling_from_env(env)?,
    )?
    .with_debug_windows(env.cpl_debug()))
}

/// Merge in-memory datasets. The first-listed dataset takes priority.
pub fn merge_datasets(
    inputs: &[&dyn Dataset],
    options: &MergeOptions,
    env: &Env,
) -> Result<MergedRaster> {
    let infos = inputs
        .iter()
        .map(|ds| ds.info())
        .collect::<Result<Vec<_>>>()?;
    let mut compositor = compositor_for(&infos, options, env)?;
    for input in inputs.iter().rev() {
        compositor.process(*input, options.nodata)?;
    }
    Ok(compositor.finalize())
}

/// Summary of a file-level merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    pub grid: RasterGrid,
    pub inputs: usize,
    pub skipped: usize,
    pub valid_pixels: usize,
}

/// Merge the rasters at `inputs` and write the mosaic to `output`.
///
/// Each input is opened twice: once to scan its metadata and once, in
/// reverse order, to composite it. Only one input is open at a time. Any
/// input that fails to open or read aborts the merge before the writer is
/// called, so no partial output is produced.
pub fn merge(
    inputs: &[PathBuf],
    output: &Path,
    opener: &dyn DatasetOpener,
    writer: &dyn DatasetWriter,
    options: &MergeOptions,
    creation_options: &CreationOptions,
    env: &Env,
) -> Result<MergeReport> {
    if inputs.is_empty() {
        return Err(MergeError::NoInputs);
    }
    if let Some(driver) = &options.driver {
        if !driver.eq_ignore_ascii_case(writer.driver()) {
            return Err(MergeError::OutputWriteFailure(format!(
                "unsupported format driver {driver:?} (expected {})",
                writer.driver()
            )));
        }
    }

    let mut infos = Vec::with_capacity(inputs.len());
    for path in inputs {
        let name = path.display().to_string();
        let dataset = opener
            .open(path, env)
            .map_err(|e| MergeError::read_failure(&name, e))?;
        infos.push(dataset.info().map_err(|e| MergeError::read_failure(&name, e))?);
    }

    let mut compositor = compositor_for(&infos, options, env)?;
    let mut skipped = 0;
    for path in inputs.iter().rev() {
        let name = path.display().to_string();
        let dataset = opener
            .open(path, env)
            .map_err(|e| MergeError::read_failure(&name, e))?;
        if compositor.process(dataset.as_ref(), options.nodata)? == InputOutcome::Skipped {
            skipped += 1;
        }
    }

    let raster = compositor.finalize();
    writer
        .write(output, &raster, creation_options, env)
        .map_err(|e| match e {
            MergeError::OutputWriteFailure(_) => e,
            other => MergeError::OutputWriteFailure(other.to_string()),
        })?;

    info!(
        output = %output.display(),
        valid_pixels = raster.valid_pixels,
        skipped,
        "Merge complete"
    );
    Ok(MergeReport {
        output: output.to_path_buf(),
        grid: raster.grid,
        inputs: inputs.len(),
        skipped,
        valid_pixels: raster.valid_pixels,
    })
}
