//! Subcommand implementations.
//!
//! Each command writes its result to `out` so it can be captured in tests.

use crate::cli::{Cli, Commands, EnvArgs, InfoArgs, MergeArgs, WindowArgs};
use crate::config::ConfigFile;
use crate::error::CliError;
use rmosaic_geom::{from_bounds, BoundingBox};
use rmosaic_merge::{histogram, merge, Dataset, Env, MergeError, MergeOptions, RasterSource, Resolution};
use rmosaic_tiff::{GeoTiffDataset, GeoTiffOpener, GeoTiffWriter};
use serde::Serialize;
use std::io::Write;
use tracing::debug;

pub type Result<T> = std::result::Result<T, CliError>;

/// Run the selected subcommand.
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Commands::Merge(args) => run_merge(args, cli.cpl_debug(), out),
        Commands::Info(args) => run_info(args, cli.cpl_debug(), out),
        Commands::Window(args) => run_window(args, cli.cpl_debug(), out),
    }
}

fn load_env(args: &EnvArgs, cpl_debug: bool) -> Result<(ConfigFile, Env)> {
    let config = ConfigFile::load_optional(args.config.as_deref())?;
    let env = config.env(cpl_debug, &args.env)?;
    debug!(options = ?env.options(), "Environment");
    Ok((config, env))
}

fn bounds_arg(values: &[f64]) -> Result<BoundingBox> {
    match values {
        [left, bottom, right, top] => Ok(BoundingBox::new(*left, *bottom, *right, *top)?),
        _ => Err(CliError::InvalidArgument {
            arg: "--bounds".to_string(),
            reason: format!("expected 4 values, got {}", values.len()),
        }),
    }
}

// ============================================================================
// merge
// ============================================================================

fn run_merge(args: &MergeArgs, cpl_debug: bool, out: &mut dyn Write) -> Result<()> {
    let (config, env) = load_env(&args.env, cpl_debug)?;
    let (inputs, output) = args.inputs_and_output().ok_or_else(|| CliError::InvalidArgument {
        arg: "PATH".to_string(),
        reason: "expected input files followed by an output file".to_string(),
    })?;

    let options = MergeOptions {
        bounds: args.bounds.as_deref().map(bounds_arg).transpose()?,
        resolution: if args.res.is_empty() {
            None
        } else {
            Some(Resolution::from_values(&args.res)?)
        },
        nodata: args.nodata,
        driver: args.format.clone(),
    };
    let creation_options = config.creation_options(&args.creation_options);

    debug!(inputs = inputs.len(), output = %output.display(), "Merging");
    let report = merge(
        inputs,
        output,
        &GeoTiffOpener,
        &GeoTiffWriter,
        &options,
        &creation_options,
        &env,
    )?;
    writeln!(out, "{}", serde_json::to_string(&report)?)?;
    Ok(())
}

// ============================================================================
// info
// ============================================================================

fn run_info(args: &InfoArgs, cpl_debug: bool, out: &mut dyn Write) -> Result<()> {
    let (_, env) = load_env(&args.env, cpl_debug)?;
    let dataset = GeoTiffDataset::open(&args.path, &env)?;

    if let Some(band) = args.bidx {
        if band == 0 || band > dataset.count() {
            return Err(MergeError::InvalidBand {
                band,
                count: dataset.count(),
            }
            .into());
        }
    }

    let mut value = serde_json::to_value(dataset.info()?)?;
    let colorinterp: Vec<_> = (1..=dataset.count())
        .map(|band| dataset.colorinterp(band))
        .collect();
    value["colorinterp"] = serde_json::to_value(colorinterp)?;

    if let Some(bins) = args.hist {
        let source = match args.bidx {
            Some(band) => RasterSource::DatasetBandIndex(&dataset, band),
            None => RasterSource::SingleBandDataset(&dataset),
        };
        let resolved = source.resolve()?;
        let hist = histogram(&resolved.array, bins, resolved.nodata)?;
        value["histogram"] = serde_json::json!({
            "bands": resolved.bands,
            "range": hist.range,
            "edges": hist.edges,
            "counts": hist.counts,
        });
    }

    write_json(out, &value, args.indent)
}

fn write_json<T: Serialize>(out: &mut dyn Write, value: &T, indent: Option<usize>) -> Result<()> {
    match indent {
        None => serde_json::to_writer(&mut *out, value)?,
        Some(n) => {
            let spaces = vec![b' '; n];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&spaces);
            let mut serializer = serde_json::Serializer::with_formatter(&mut *out, formatter);
            value.serialize(&mut serializer)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

// ============================================================================
// window
// ============================================================================

fn run_window(args: &WindowArgs, cpl_debug: bool, out: &mut dyn Write) -> Result<()> {
    let (_, env) = load_env(&args.env, cpl_debug)?;
    let dataset = GeoTiffDataset::open(&args.path, &env)?;
    let bounds = bounds_arg(&args.bounds)?;

    let window = from_bounds(
        bounds.left,
        bounds.bottom,
        bounds.right,
        bounds.top,
        &dataset.transform(),
        dataset.height(),
        dataset.width(),
        args.boundless,
    )?;
    let ((row_start, row_stop), (col_start, col_stop)) = window.to_slices();
    writeln!(
        out,
        "{}",
        serde_json::json!([[row_start, row_stop], [col_start, col_stop]])
    )?;
    Ok(())
}
