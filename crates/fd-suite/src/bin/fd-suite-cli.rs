#![forbid(unsafe_code)]

use std::path::PathBuf;

use fd_io::read_flights_csv;
use fd_runtime::{LogFormat, init_logging};
use fd_suite::{SuiteConfig, fixtures, run_suite};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut input: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut synthetic_rows: Option<usize> = None;
    let mut json_logs = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input" => {
                let value = args.next().ok_or("--input requires a CSV path")?;
                input = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = args.next().ok_or("--config requires a YAML path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--out" => {
                let value = args.next().ok_or("--out requires a directory")?;
                out_dir = Some(PathBuf::from(value));
            }
            "--synthetic" => {
                let value = args.next().ok_or("--synthetic requires a row count")?;
                let rows = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid row count: {value}"))?;
                synthetic_rows = Some(rows);
            }
            "--json-logs" => {
                json_logs = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let mut config = match &config_path {
        Some(path) => SuiteConfig::from_path(path)?,
        None => SuiteConfig::default(),
    };
    if let Some(dir) = out_dir {
        config.output_dir = dir;
    }
    if input.is_some() {
        config.input = input;
    }
    if json_logs {
        config.log.format = LogFormat::Json;
    }
    init_logging(&config.log)?;

    let dataset = match (synthetic_rows, &config.input) {
        (Some(rows), _) => fixtures::synthetic_flights(rows)?,
        (None, Some(path)) => read_flights_csv(path)?,
        (None, None) => {
            return Err(
                "no input: pass --input <csv>, set `input` in the config, or use --synthetic <rows>"
                    .into(),
            );
        }
    };

    let report = run_suite(&dataset, &config)?;
    for artifact in &report.manifest.artifacts {
        println!(
            "wrote name={} path={} bytes={} sha256={}",
            artifact.name,
            artifact.path.display(),
            artifact.bytes,
            artifact.sha256
        );
    }
    println!(
        "rows={} artifacts={} elapsed_ms={}",
        dataset.len(),
        report.manifest.artifacts.len(),
        report.ledger.total_ms()
    );
    Ok(())
}

fn print_help() {
    println!("fd-suite-cli: render the flight dashboards");
    println!();
    println!("  --input <csv>        flights CSV (overrides `input` in the config)");
    println!("  --config <yaml>      suite configuration");
    println!("  --out <dir>          output directory (default: dashboards)");
    println!("  --synthetic <rows>   use generated flights instead of a CSV");
    println!("  --json-logs          emit logs as JSON lines");
    println!("  -h, --help           show this help");
}
