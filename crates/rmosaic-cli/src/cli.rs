//! Command-line arguments.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Merge and inspect georeferenced rasters
#[derive(Parser, Debug)]
#[command(
    name = "rmosaic",
    author,
    version,
    about,
    long_about = None,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v debug, -vv trace and CPL_DEBUG)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Log filter for the selected verbosity; `RUST_LOG` wins when set.
    pub fn log_filter(&self) -> EnvFilter {
        let level = match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }

    /// Whether compositing windows should be logged.
    pub fn cpl_debug(&self) -> bool {
        self.verbose >= 2
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge rasters into one; earlier inputs are painted over later ones
    Merge(MergeArgs),

    /// Print dataset metadata as JSON
    Info(InfoArgs),

    /// Print the pixel window covering a bounding box
    Window(WindowArgs),
}

/// Options shared by every command that opens datasets.
#[derive(Args, Debug, Clone, Default)]
pub struct EnvArgs {
    /// Configuration option for this run (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// YAML file with `env` and `creation_options` sections
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Input files followed by the output file
    #[arg(required = true, num_args = 2.., value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Output format driver
    #[arg(short = 'f', long = "format", value_name = "DRIVER")]
    pub format: Option<String>,

    /// Output extent
    #[arg(
        long,
        num_args = 4,
        value_names = ["LEFT", "BOTTOM", "RIGHT", "TOP"],
        allow_negative_numbers = true
    )]
    pub bounds: Option<Vec<f64>>,

    /// Output pixel size; repeat the flag to give x then y
    #[arg(long, num_args = 1, action = ArgAction::Append, value_name = "RES")]
    pub res: Vec<f64>,

    /// Nodata value for the inputs and the output
    #[arg(long, allow_negative_numbers = true, value_name = "VALUE")]
    pub nodata: Option<f64>,

    /// Writer creation option (repeatable)
    #[arg(long = "co", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub creation_options: Vec<(String, String)>,

    #[command(flatten)]
    pub env: EnvArgs,
}

impl MergeArgs {
    /// Split the positional paths into inputs and output.
    pub fn inputs_and_output(&self) -> Option<(&[PathBuf], &PathBuf)> {
        let (output, inputs) = self.paths.split_last()?;
        Some((inputs, output))
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Dataset to describe
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// 1-based band used for the histogram
    #[arg(long, value_name = "N")]
    pub bidx: Option<usize>,

    /// Add a histogram with this many bins
    #[arg(long, value_name = "BINS")]
    pub hist: Option<usize>,

    /// Pretty-print with this many spaces of indentation
    #[arg(long, value_name = "N")]
    pub indent: Option<usize>,

    #[command(flatten)]
    pub env: EnvArgs,
}

#[derive(Args, Debug)]
pub struct WindowArgs {
    /// Dataset whose grid is used
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Bounding box in the dataset's coordinates
    #[arg(
        long,
        required = true,
        num_args = 4,
        value_names = ["LEFT", "BOTTOM", "RIGHT", "TOP"],
        allow_negative_numbers = true
    )]
    pub bounds: Vec<f64>,

    /// Do not clip the window to the raster
    #[arg(long)]
    pub boundless: bool,

    #[command(flatten)]
    pub env: EnvArgs,
}

/// Parse `KEY=VALUE`; the key must be non-empty.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rmosaic").chain(args.iter().copied()))
    }

    fn merge_args(args: &[&str]) -> MergeArgs {
        match parse(args).unwrap().command {
            Commands::Merge(merge) => merge,
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("COMPRESS=LZW").unwrap(),
            ("COMPRESS".to_string(), "LZW".to_string())
        );
        assert_eq!(
            parse_key_value("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("COMPRESS").is_err());
        assert!(parse_key_value("=LZW").is_err());
    }

    #[test]
    fn test_merge_paths_split() {
        let args = merge_args(&["merge", "a.tif", "b.tif", "out.tif"]);
        let (inputs, output) = args.inputs_and_output().unwrap();
        assert_eq!(inputs, &[PathBuf::from("a.tif"), PathBuf::from("b.tif")]);
        assert_eq!(output, &PathBuf::from("out.tif"));
    }

    #[test]
    fn test_merge_needs_two_paths() {
        assert!(parse(&["merge", "only.tif"]).is_err());
        assert!(parse(&["merge"]).is_err());
    }

    #[test]
    fn test_res_forms() {
        let args = merge_args(&["merge", "a.tif", "out.tif", "--res", "0.5"]);
        assert_eq!(args.res, vec![0.5]);

        let args = merge_args(&["merge", "a.tif", "out.tif", "--res", "0.5", "--res", "0.25"]);
        assert_eq!(args.res, vec![0.5, 0.25]);

        let args = merge_args(&["merge", "--res", "0.5", "a.tif", "out.tif"]);
        assert_eq!(args.res, vec![0.5]);
        assert_eq!(args.paths, vec![PathBuf::from("a.tif"), PathBuf::from("out.tif")]);
    }

    #[test]
    fn test_negative_bounds_and_options() {
        let args = merge_args(&[
            "merge", "a.tif", "out.tif", "--bounds", "-114", "43", "-111", "46", "--nodata", "-9999",
            "--co", "COMPRESS=DEFLATE", "--env", "CPL_DEBUG=yes",
        ]);
        assert_eq!(args.bounds, Some(vec![-114.0, 43.0, -111.0, 46.0]));
        assert_eq!(args.nodata, Some(-9999.0));
        assert_eq!(args.creation_options, vec![("COMPRESS".to_string(), "DEFLATE".to_string())]);
        assert_eq!(args.env.env, vec![("CPL_DEBUG".to_string(), "yes".to_string())]);
    }

    #[test]
    fn test_verbosity() {
        let cli = parse(&["-vv", "info", "a.tif"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.cpl_debug());
        assert!(parse(&["-q", "-v", "info", "a.tif"]).is_err());
    }

    #[test]
    fn test_window_requires_bounds() {
        let err = parse(&["window", "a.tif"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
