mod app;
mod catalog;
mod config;
mod convert;
mod error;
mod filter;
mod ledger;
mod logging;
mod serial;
mod stats;
mod store;
mod types;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{ConverterConfig, Settings, StoreConfig, YamlConfig};
use convert::CommandConverter;
use error::RunError;
use filter::FilterSpec;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use types::RunMode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Batch PDF -> JSON conversion helper")]
struct Cli {
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// local directory used as the store
    #[arg(long, global = true, conflicts_with = "bucket")]
    root: Option<PathBuf>,

    /// S3 bucket used as the store (needs the `s3` feature)
    #[arg(long, global = true)]
    bucket: Option<String>,

    #[arg(long, global = true)]
    region: Option<String>,

    /// custom S3 endpoint (MinIO, LocalStack)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[arg(long, global = true)]
    input_prefix: Option<String>,

    #[arg(long, global = true)]
    output_prefix: Option<String>,

    #[arg(long, global = true)]
    metadata_prefix: Option<String>,

    #[arg(long, short, global = true)]
    quiet: bool,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// inclusive serial number range
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    serial_range: Option<Vec<u64>>,

    /// RFC 3339 timestamp, inclusive
    #[arg(long, conflicts_with = "last_hours")]
    updated_after: Option<String>,

    #[arg(long)]
    last_hours: Option<f64>,

    /// keep only the N most recently modified files
    #[arg(long)]
    last_n: Option<usize>,

    /// regex matched against the filename
    #[arg(long)]
    filename_pattern: Option<String>,
}

#[derive(Args, Debug, Default)]
struct SelectArgs {
    #[command(flatten)]
    filters: FilterArgs,

    /// filter the persisted file_list.json instead of listing again
    #[arg(long)]
    from_catalog: bool,

    /// process even when an output already exists
    #[arg(long, conflicts_with = "reprocess_failed")]
    no_skip: bool,

    /// only files whose output misses a required field
    #[arg(long)]
    reprocess_failed: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List source PDFs and write the catalog, nothing else
    List,
    /// Show what a run would process
    Plan {
        #[command(flatten)]
        select: SelectArgs,
    },
    /// Convert the selected PDFs
    Run {
        #[command(flatten)]
        select: SelectArgs,

        #[arg(long)]
        workers: Option<usize>,

        /// converter program (overrides the config file)
        #[arg(long)]
        converter: Option<String>,

        /// converter argument, repeatable; `{input}` is the staged PDF path
        #[arg(long = "converter-arg", allow_hyphen_values = true)]
        converter_args: Vec<String>,
    },
}

impl SelectArgs {
    fn mode(&self) -> RunMode {
        if self.no_skip {
            RunMode::Force
        } else if self.reprocess_failed {
            RunMode::ReprocessIncomplete
        } else {
            RunMode::Incremental
        }
    }
}

/// CLI flags override the config file.
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut y = match &cli.config {
        Some(path) => config::load_yaml(path)?,
        None => YamlConfig::default(),
    };

    if let Some(root) = &cli.root {
        y.store = Some(StoreConfig::Local { root: root.clone() });
    }
    if let Some(bucket) = &cli.bucket {
        // region/endpoint từ YAML vẫn giữ nếu store đã là S3
        let (region, endpoint) = match y.store.take() {
            Some(StoreConfig::S3 {
                region, endpoint, ..
            }) => (region, endpoint),
            _ => (None, None),
        };
        y.store = Some(StoreConfig::S3 {
            bucket: bucket.clone(),
            region,
            endpoint,
        });
    }
    if let Some(StoreConfig::S3 {
        region, endpoint, ..
    }) = &mut y.store
    {
        if cli.region.is_some() {
            region.clone_from(&cli.region);
        }
        if cli.endpoint.is_some() {
            endpoint.clone_from(&cli.endpoint);
        }
    }

    if cli.input_prefix.is_some() {
        y.input_prefix.clone_from(&cli.input_prefix);
    }
    if cli.output_prefix.is_some() {
        y.output_prefix.clone_from(&cli.output_prefix);
    }
    if cli.metadata_prefix.is_some() {
        y.metadata_prefix.clone_from(&cli.metadata_prefix);
    }

    Ok(Settings::from_yaml(y))
}

fn build_filter(f: &FilterArgs) -> Result<FilterSpec, RunError> {
    let mut spec = FilterSpec::new();

    if let Some(&[lo, hi]) = f.serial_range.as_deref() {
        spec = spec.with_serial_range(lo, hi);
    }
    if let Some(s) = &f.updated_after {
        let t = OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|e| RunError::Setup(format!("--updated-after '{s}' is not RFC 3339: {e}")))?;
        spec = spec.with_updated_after(t);
    }
    if let Some(h) = f.last_hours {
        spec = spec.with_last_hours(h);
    }
    if let Some(n) = f.last_n {
        spec = spec.with_last_n(n);
    }
    if let Some(p) = &f.filename_pattern {
        spec = spec.with_filename_pattern(p)?;
    }

    spec.validate()?;
    Ok(spec)
}

fn resolve_converter(
    configured: Option<ConverterConfig>,
    program: Option<String>,
    args: Vec<String>,
) -> Result<CommandConverter, RunError> {
    let cfg = match (program, configured) {
        (Some(program), _) => ConverterConfig { program, args },
        (None, Some(mut cfg)) => {
            if !args.is_empty() {
                cfg.args = args;
            }
            cfg
        }
        (None, None) => {
            return Err(RunError::Setup(
                "no converter configured: pass --converter or set `converter` in the config file"
                    .to_string(),
            ));
        }
    };
    Ok(CommandConverter::from_config(&cfg))
}

fn print_catalog(cat: &catalog::Catalog) {
    println!("PDFs discovered: {}", cat.total_files);
    for f in &cat.files {
        match serial::extract_with_matcher(&f.filename) {
            Some((m, n)) => println!("  - {} (serial={}, via {})", f.key, n, m.name()),
            None => println!("  - {} (no serial)", f.key),
        }
    }
    let (numbered, unnumbered) = cat.serial_coverage();
    println!("Numbered={numbered}, unnumbered={unnumbered}");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(logging::level_for(cli.quiet, cli.verbose))?;

    let mut settings = resolve_settings(&cli)?;
    let store = store::open(&settings.store)?;
    info!(store = %store.describe(), "store ready");

    match cli.cmd {
        Commands::List => {
            let (cat, _stats) = app::list_only(store.as_ref(), &settings)?;
            print_catalog(&cat);
        }
        Commands::Plan { select } => {
            let filter = build_filter(&select.filters)?;
            app::plan(
                store.as_ref(),
                &settings,
                &filter,
                select.mode(),
                select.from_catalog,
            )?;
        }
        Commands::Run {
            select,
            workers,
            converter,
            converter_args,
        } => {
            let filter = build_filter(&select.filters)?;
            let converter = resolve_converter(settings.converter.clone(), converter, converter_args)?;
            if let Some(w) = workers {
                settings.workers = w.max(1);
            }

            let stats = app::run(
                store.as_ref(),
                &converter,
                &settings,
                &filter,
                select.mode(),
                select.from_catalog,
            )
            .context("batch run aborted")?;

            println!(
                "DONE: discovered={}, filtered_out={}, skipped={}, processed={} (complete={}, incomplete={}), failed={}",
                stats.discovered,
                stats.filtered_out,
                stats.skipped,
                stats.processed,
                stats.complete,
                stats.incomplete,
                stats.failed
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pdf_batch_helper").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = parse(&[
            "--root",
            "/data",
            "run",
            "--serial-range",
            "10",
            "20",
            "--last-n",
            "3",
            "--reprocess-failed",
            "--converter",
            "sh",
            "--converter-arg",
            "-c",
            "--converter-arg",
            "pdf2json {input}",
        ])
        .unwrap();

        let Commands::Run {
            select,
            converter,
            converter_args,
            ..
        } = cli.cmd
        else {
            panic!("expected run");
        };
        assert_eq!(select.mode(), RunMode::ReprocessIncomplete);
        assert_eq!(converter.as_deref(), Some("sh"));
        assert_eq!(converter_args, vec!["-c", "pdf2json {input}"]);

        let f = build_filter(&select.filters).unwrap();
        assert_eq!(f.serial_range, Some((10, 20)));
        assert_eq!(f.last_n, Some(3));
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(parse(&["run", "--no-skip", "--reprocess-failed"]).is_err());
        assert!(parse(&["plan", "--updated-after", "2025-01-01T00:00:00Z", "--last-hours", "2"]).is_err());
        assert!(parse(&["--root", "x", "--bucket", "b", "list"]).is_err());
    }

    #[test]
    fn test_build_filter_rejects_bad_input() {
        let bad_time = FilterArgs {
            updated_after: Some("yesterday".to_string()),
            ..FilterArgs::default()
        };
        assert!(matches!(build_filter(&bad_time), Err(RunError::Setup(_))));

        let bad_range = FilterArgs {
            serial_range: Some(vec![9, 1]),
            ..FilterArgs::default()
        };
        assert!(build_filter(&bad_range).is_err());

        let bad_regex = FilterArgs {
            filename_pattern: Some("(".to_string()),
            ..FilterArgs::default()
        };
        assert!(build_filter(&bad_regex).is_err());
    }

    #[test]
    fn test_cli_overrides_settings() {
        let cli = parse(&[
            "--root",
            "/srv/docs",
            "--output-prefix",
            "out",
            "list",
        ])
        .unwrap();
        let s = resolve_settings(&cli).unwrap();
        assert_eq!(
            s.store,
            StoreConfig::Local {
                root: PathBuf::from("/srv/docs")
            }
        );
        assert_eq!(s.output_prefix, "out");
        assert_eq!(s.metadata_prefix, "out/metadata");
        assert_eq!(s.input_prefix, "pdfs");
    }

    #[test]
    fn test_bucket_override_keeps_yaml_region_and_endpoint() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(
            &path,
            "store:\n  kind: s3\n  bucket: old\n  region: ap-south-1\n  endpoint: http://localhost:9000\n",
        )
        .unwrap();
        let path = path.to_str().unwrap();

        let cli = parse(&["--config", path, "--bucket", "new", "list"]).unwrap();
        assert_eq!(
            resolve_settings(&cli).unwrap().store,
            StoreConfig::S3 {
                bucket: "new".to_string(),
                region: Some("ap-south-1".to_string()),
                endpoint: Some("http://localhost:9000".to_string()),
            }
        );

        let cli = parse(&["--config", path, "--bucket", "new", "--region", "eu-west-1", "list"]).unwrap();
        let StoreConfig::S3 { region, endpoint, .. } = resolve_settings(&cli).unwrap().store else {
            panic!("expected s3 store");
        };
        assert_eq!(region.as_deref(), Some("eu-west-1"));
        assert_eq!(endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_resolve_converter() {
        assert!(matches!(
            resolve_converter(None, None, vec![]),
            Err(RunError::Setup(_))
        ));

        let configured = ConverterConfig {
            program: "python3".to_string(),
            args: vec!["conv.py".to_string(), "{input}".to_string()],
        };
        assert!(resolve_converter(Some(configured), None, vec![]).is_ok());
        assert!(resolve_converter(None, Some("pdf2json".to_string()), vec![]).is_ok());
    }
}
