//! Integration tests for grid selection and reverse-painter compositing.
//!
//! ## Test Strategy
//!
//! 1. **Priority**: overlapping inputs resolve in favour of the first-listed one.
//! 2. **Grid selection**: finest resolution and union extent without overrides.
//! 3. **Nodata**: uncovered pixels keep the output nodata.
//! 4. **File-level merge**: inputs are opened one at a time, failures abort
//!    before the writer runs.

use approx::assert_abs_diff_eq;
use rmosaic_geom::transform::from_origin;
use rmosaic_geom::{AffineTransform, BoundingBox};
use rmosaic_merge::{
    merge, merge_datasets, ConfigValue, CreationOptions, Crs, DType, Dataset, DatasetOpener,
    DatasetWriter, Env, MemDataset, MergeError, MergeOptions, MergedRaster, RasterArray,
    Resolution, Result,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

// ============================================================================
// Helper Functions
// ============================================================================

fn constant(name: &str, west: f64, north: f64, res: f64, size: usize, value: f64) -> MemDataset {
    MemDataset::constant(
        name,
        from_origin(west, north, res, res).unwrap(),
        size,
        size,
        DType::U8,
        Some(0.0),
        value,
    )
}

/// The north-west / south-east pair of 10x10 uint8 tiles at 0.2 degrees.
fn overlapping_pair() -> (MemDataset, MemDataset) {
    let nw = MemDataset::constant(
        "nw.tif",
        AffineTransform::from_gdal(-114.0, 0.2, 0.0, 46.0, 0.0, -0.2).unwrap(),
        10,
        10,
        DType::U8,
        Some(0.0),
        1.0,
    )
    .with_crs(Crs(4326));
    let se = MemDataset::constant(
        "se.tif",
        AffineTransform::from_gdal(-113.0, 0.2, 0.0, 45.0, 0.0, -0.2).unwrap(),
        10,
        10,
        DType::U8,
        Some(0.0),
        2.0,
    )
    .with_crs(Crs(4326));
    (nw, se)
}

// ============================================================================
// Priority and Nodata
// ============================================================================

#[test]
fn test_first_listed_input_wins() {
    let t = from_origin(0.0, 10.0, 1.0, 1.0).unwrap();
    let a = MemDataset::constant("a", t, 10, 10, DType::U8, None, 1.0);
    let b = MemDataset::constant("b", t, 10, 10, DType::U8, None, 2.0);

    let merged = merge_datasets(&[&a, &b], &MergeOptions::default(), &Env::new()).unwrap();
    assert!(merged.data.data().iter().all(|&v| v == 1.0));

    let merged = merge_datasets(&[&b, &a], &MergeOptions::default(), &Env::new()).unwrap();
    assert!(merged.data.data().iter().all(|&v| v == 2.0));
}

#[test]
fn test_overlapping_tiles() {
    let (nw, se) = overlapping_pair();
    let merged = merge_datasets(&[&nw, &se], &MergeOptions::default(), &Env::new()).unwrap();

    assert_eq!(merged.count(), 1);
    assert_eq!((merged.grid.height, merged.grid.width), (15, 15));
    assert_eq!(merged.crs, Some(Crs(4326)));
    let bounds = merged.bounds().unwrap();
    assert_abs_diff_eq!(bounds.left, -114.0, epsilon = 1e-9);
    assert_abs_diff_eq!(bounds.bottom, 43.0, epsilon = 1e-9);
    assert_abs_diff_eq!(bounds.right, -111.0, epsilon = 1e-9);
    assert_abs_diff_eq!(bounds.top, 46.0, epsilon = 1e-9);

    for row in 0..15 {
        for col in 0..15 {
            let expected = if row < 10 && col < 10 {
                1.0
            } else if row >= 5 && col >= 5 {
                2.0
            } else {
                0.0
            };
            assert_eq!(
                merged.data.get(0, row, col),
                Some(expected),
                "pixel ({row}, {col})"
            );
        }
    }
    assert_eq!(merged.valid_pixels, 175);
}

#[test]
fn test_nodata_pixels_do_not_overwrite() {
    let t = from_origin(0.0, 2.0, 1.0, 1.0).unwrap();
    let top = MemDataset::new(
        "top",
        t,
        DType::U8,
        Some(0.0),
        RasterArray::new(1, 2, 2, vec![0.0, 5.0, 5.0, 0.0]).unwrap(),
    );
    let bottom = MemDataset::constant("bottom", t, 2, 2, DType::U8, Some(0.0), 9.0);

    let merged = merge_datasets(&[&top, &bottom], &MergeOptions::default(), &Env::new()).unwrap();
    assert_eq!(merged.data.data(), &[9.0, 5.0, 5.0, 9.0]);
}

#[test]
fn test_disjoint_inputs_leave_nodata_gap() {
    let a = constant("a", 0.0, 10.0, 1.0, 4, 1.0);
    let b = constant("b", 6.0, 10.0, 1.0, 4, 2.0);

    let merged = merge_datasets(&[&a, &b], &MergeOptions::default(), &Env::new()).unwrap();
    assert_eq!(merged.grid.width, 10);
    for row in 0..4 {
        for col in 4..6 {
            assert_eq!(merged.data.get(0, row, col), Some(0.0));
        }
    }

    let options = MergeOptions {
        nodata: Some(255.0),
        ..Default::default()
    };
    let merged = merge_datasets(&[&a, &b], &options, &Env::new()).unwrap();
    assert_eq!(merged.nodata, 255.0);
    assert_eq!(merged.data.get(0, 0, 4), Some(255.0));
    assert_eq!(merged.data.get(0, 0, 0), Some(1.0));
    assert_eq!(merged.data.get(0, 0, 9), Some(2.0));
}

// ============================================================================
// Grid Selection
// ============================================================================

#[test]
fn test_resolution_is_finest_input() {
    let coarse = constant("coarse", 0.0, 10.0, 1.0, 10, 1.0);
    let fine = constant("fine", 0.0, 10.0, 0.5, 20, 2.0);

    let merged = merge_datasets(&[&coarse, &fine], &MergeOptions::default(), &Env::new()).unwrap();
    assert_eq!(merged.grid.res(), (0.5, 0.5));
    assert_eq!((merged.grid.width, merged.grid.height), (20, 20));
    // The coarse input is listed first and covers everything.
    assert!(merged.data.data().iter().all(|&v| v == 1.0));
}

#[test]
fn test_extent_is_union_of_inputs() {
    let a = constant("a", 0.0, 10.0, 1.0, 10, 1.0);
    let b = constant("b", 5.0, 15.0, 1.0, 10, 2.0);

    let merged = merge_datasets(&[&a, &b], &MergeOptions::default(), &Env::new()).unwrap();
    assert_eq!(
        merged.bounds().unwrap(),
        BoundingBox::new(0.0, 0.0, 15.0, 15.0).unwrap()
    );
}

#[test]
fn test_bounds_and_resolution_overrides() {
    let (nw, se) = overlapping_pair();
    let options = MergeOptions {
        bounds: Some(BoundingBox::new(-113.5, 43.5, -111.5, 45.5).unwrap()),
        resolution: Some(Resolution::Rect(0.25, 0.5)),
        ..Default::default()
    };
    let merged = merge_datasets(&[&nw, &se], &options, &Env::new()).unwrap();
    assert_eq!((merged.grid.width, merged.grid.height), (8, 4));
    assert_eq!(merged.grid.res(), (0.25, 0.5));
    // Centre (-113.375, 45.25) lies only in nw.
    assert_eq!(merged.data.get(0, 0, 0), Some(1.0));
    // Centre (-111.625, 43.75) lies only in se.
    assert_eq!(merged.data.get(0, 3, 7), Some(2.0));
    // Centre (-112.625, 44.25) lies in both.
    assert_eq!(merged.data.get(0, 2, 3), Some(1.0));
}

#[test]
fn test_tiny_resolution_is_an_error() {
    let tile = constant("tile", 0.0, 10.0, 1.0, 10, 1.0);
    let options = MergeOptions {
        resolution: Some(Resolution::Square(1e-9)),
        ..Default::default()
    };
    assert!(matches!(
        merge_datasets(&[&tile], &options, &Env::new()),
        Err(MergeError::Geometry(_))
    ));
}

#[test]
fn test_incompatible_crs_rejected() {
    let (nw, _) = overlapping_pair();
    let other = constant("utm", -113.0, 45.0, 0.2, 10, 2.0).with_crs(Crs(32612));
    assert!(matches!(
        merge_datasets(&[&nw, &other], &MergeOptions::default(), &Env::new()),
        Err(MergeError::IncompatibleInputs(_))
    ));
}

#[test]
fn test_merge_is_deterministic() {
    let (nw, se) = overlapping_pair();
    let first = merge_datasets(&[&nw, &se], &MergeOptions::default(), &Env::new()).unwrap();
    let second = merge_datasets(&[&nw, &se], &MergeOptions::default(), &Env::new()).unwrap();
    assert_eq!(first.data, second.data);
    assert_eq!(first.grid, second.grid);
}

#[test]
fn test_no_inputs() {
    assert!(matches!(
        merge_datasets(&[], &MergeOptions::default(), &Env::new()),
        Err(MergeError::NoInputs)
    ));
}

// ============================================================================
// File-level Merge
// ============================================================================

/// Dataset wrapper that tracks how many datasets are open at once.
struct Tracked {
    inner: MemDataset,
    open: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.open.set(self.open.get() - 1);
    }
}

impl Dataset for Tracked {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn transform(&self) -> AffineTransform {
        self.inner.transform()
    }

    fn width(&self) -> usize {
        self.inner.width()
    }

    fn height(&self) -> usize {
        self.inner.height()
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn dtype(&self) -> DType {
        self.inner.dtype()
    }

    fn nodata(&self) -> Option<f64> {
        self.inner.nodata()
    }

    fn crs(&self) -> Option<Crs> {
        self.inner.crs()
    }

    fn read(&self, window: &rmosaic_geom::Window) -> Result<RasterArray> {
        self.inner.read(window)
    }
}

#[derive(Default)]
struct MockOpener {
    datasets: HashMap<PathBuf, MemDataset>,
    open: Rc<Cell<usize>>,
    max_open: Cell<usize>,
    opened: RefCell<Vec<PathBuf>>,
}

impl MockOpener {
    fn with(mut self, path: &str, dataset: MemDataset) -> Self {
        self.datasets.insert(PathBuf::from(path), dataset);
        self
    }
}

impl DatasetOpener for MockOpener {
    fn open(&self, path: &Path, _env: &Env) -> Result<Box<dyn Dataset>> {
        let inner = self
            .datasets
            .get(path)
            .cloned()
            .ok_or_else(|| MergeError::InputReadFailure {
                input: path.display().to_string(),
                reason: "No such file".to_string(),
            })?;
        self.open.set(self.open.get() + 1);
        self.max_open.set(self.max_open.get().max(self.open.get()));
        self.opened.borrow_mut().push(path.to_path_buf());
        Ok(Box::new(Tracked {
            inner,
            open: Rc::clone(&self.open),
        }))
    }
}

#[derive(Default)]
struct MockWriter {
    fail: bool,
    written: RefCell<Option<(PathBuf, MergedRaster, CreationOptions)>>,
}

impl DatasetWriter for MockWriter {
    fn driver(&self) -> &str {
        "GTiff"
    }

    fn write(
        &self,
        path: &Path,
        raster: &MergedRaster,
        options: &CreationOptions,
        _env: &Env,
    ) -> Result<()> {
        if self.fail {
            return Err(MergeError::InvalidOption {
                key: "COMPRESS".to_string(),
                reason: "unsupported".to_string(),
            });
        }
        *self.written.borrow_mut() = Some((path.to_path_buf(), raster.clone(), options.clone()));
        Ok(())
    }
}

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|name| PathBuf::from(*name)).collect()
}

#[test]
fn test_file_merge_opens_one_input_at_a_time() {
    let (nw, se) = overlapping_pair();
    let opener = MockOpener::default()
        .with("nw.tif", nw)
        .with("se.tif", se);
    let writer = MockWriter::default();
    let mut co = CreationOptions::new();
    co.insert("COMPRESS".to_string(), "LZW".to_string());

    let report = merge(
        &paths(&["nw.tif", "se.tif"]),
        Path::new("out.tif"),
        &opener,
        &writer,
        &MergeOptions::default(),
        &co,
        &Env::new(),
    )
    .unwrap();

    assert_eq!(report.inputs, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.valid_pixels, 175);
    assert_eq!(opener.max_open.get(), 1);
    assert_eq!(opener.open.get(), 0);
    // Metadata scan in listed order, then compositing in reverse.
    assert_eq!(
        *opener.opened.borrow(),
        paths(&["nw.tif", "se.tif", "se.tif", "nw.tif"])
    );

    let written = writer.written.borrow();
    let (path, raster, options) = written.as_ref().unwrap();
    assert_eq!(path, Path::new("out.tif"));
    assert_eq!(raster.data.get(0, 7, 7), Some(1.0));
    assert_eq!(options.get("COMPRESS").map(String::as_str), Some("LZW"));
}

#[test]
fn test_missing_input_aborts_before_writing() {
    let (nw, _) = overlapping_pair();
    let opener = MockOpener::default().with("nw.tif", nw);
    let writer = MockWriter::default();

    let result = merge(
        &paths(&["nw.tif", "missing.tif"]),
        Path::new("out.tif"),
        &opener,
        &writer,
        &MergeOptions::default(),
        &CreationOptions::new(),
        &Env::new(),
    );
    match result {
        Err(MergeError::InputReadFailure { input, .. }) => assert_eq!(input, "missing.tif"),
        other => panic!("expected InputReadFailure, got {other:?}"),
    }
    assert!(writer.written.borrow().is_none());
    assert_eq!(opener.open.get(), 0);
}

#[test]
fn test_writer_failure_is_output_write_failure() {
    let (nw, se) = overlapping_pair();
    let opener = MockOpener::default()
        .with("nw.tif", nw)
        .with("se.tif", se);
    let writer = MockWriter {
        fail: true,
        ..Default::default()
    };
    let result = merge(
        &paths(&["nw.tif", "se.tif"]),
        Path::new("out.tif"),
        &opener,
        &writer,
        &MergeOptions::default(),
        &CreationOptions::new(),
        &Env::new(),
    );
    assert!(matches!(result, Err(MergeError::OutputWriteFailure(_))));
}

#[test]
fn test_unknown_driver_rejected() {
    let opener = MockOpener::default();
    let writer = MockWriter::default();
    let options = MergeOptions {
        driver: Some("PNG".to_string()),
        ..Default::default()
    };
    let result = merge(
        &paths(&["nw.tif"]),
        Path::new("out.png"),
        &opener,
        &writer,
        &options,
        &CreationOptions::new(),
        &Env::new(),
    );
    assert!(matches!(result, Err(MergeError::OutputWriteFailure(_))));
    assert!(opener.opened.borrow().is_empty());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_env_scope_during_merge() {
    let (nw, se) = overlapping_pair();
    let mut env = Env::new();
    {
        let scope = env
            .scope([("CPL_DEBUG", ConfigValue::Bool(true))])
            .unwrap();
        assert!(scope.cpl_debug());
        let merged = merge_datasets(&[&nw, &se], &MergeOptions::default(), &scope).unwrap();
        assert_eq!(merged.valid_pixels, 175);
    }
    assert!(!env.cpl_debug());

    let bad = Env::with_options([("MERGE_RESAMPLING", "lanczos")]).unwrap();
    assert!(matches!(
        merge_datasets(&[&nw, &se], &MergeOptions::default(), &bad),
        Err(MergeError::InvalidOption { .. })
    ));
}
