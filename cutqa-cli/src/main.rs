use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cutqa::color::{is_close_to_target, is_magenta};
use cutqa::sample::{SamplePage, SampleSheet};
use cutqa::{Rgb, ScanVerdict, MATCH_THRESHOLD, TARGET_COLOR};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cutqa",
    about = "Finds cut-line magenta vector paths in PDF cut sheets",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan PDF files and report a verdict for each
    Scan {
        /// Input PDF files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Exit with an error status when any file fails the check
        #[arg(long)]
        strict: bool,
    },

    /// Generate a sample cut sheet with a known number of magenta lines
    Demo {
        /// Output file path
        #[arg(short, long, default_value = "cut_sheet_demo.pdf")]
        output: PathBuf,

        /// Magenta cut lines per page
        #[arg(long, default_value_t = 3)]
        magenta: usize,

        /// Lines in other colors per page
        #[arg(long, default_value_t = 5)]
        other: usize,

        /// Number of pages
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Show how a single RGB color (components 0..1) is classified
    Classify {
        #[arg(allow_negative_numbers = true)]
        r: f64,
        #[arg(allow_negative_numbers = true)]
        g: f64,
        #[arg(allow_negative_numbers = true)]
        b: f64,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            files,
            json,
            strict,
        } => Ok(scan_files(&files, json, strict)),

        Commands::Demo {
            output,
            magenta,
            other,
            pages,
        } => {
            let page = SamplePage::new()
                .magenta_lines(magenta)
                .other_lines(other)
                .magenta_fills(1);
            let sheet = (0..pages.max(1)).fold(SampleSheet::new(), |sheet, _| {
                sheet.page(page.clone())
            });

            let bytes = sheet.to_bytes().context("Failed to build sample sheet")?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "Sample sheet written to: {} ({} expected instances)",
                output.display(),
                sheet.expected_instances()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Classify { r, g, b } => {
            let color = Rgb::new(r, g, b);
            let close = is_close_to_target(&color);
            let magenta = is_magenta(&color);

            println!(
                "Distance to target: {:.6} (threshold {MATCH_THRESHOLD})",
                color.distance(&TARGET_COLOR)
            );
            println!("Close to target: {}", yes_no(close));
            println!("Magenta hue: {}", yes_no(magenta));
            println!("Match: {}", yes_no(close && magenta));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn scan_file(path: &Path) -> Result<ScanVerdict> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    debug!(file = %path.display(), bytes = bytes.len(), "Scanning file");
    cutqa::scan(&bytes).with_context(|| format!("Failed to scan {}", path.display()))
}

/// Scans every file, even after one fails, and maps the results to an exit status.
fn scan_files(files: &[PathBuf], as_json: bool, strict: bool) -> ExitCode {
    let mut errors = 0;
    let mut failed_checks = 0;
    let mut reports = Vec::with_capacity(files.len());

    for path in files {
        match scan_file(path) {
            Ok(verdict) => {
                if !verdict.passed() {
                    failed_checks += 1;
                }
                if as_json {
                    reports.push(json!({
                        "file": path.display().to_string(),
                        "instance_count": verdict.instance_count(),
                        "status": verdict.status(),
                        "message": verdict.message(),
                    }));
                } else {
                    println!("{}: {verdict}", path.display());
                }
            }
            Err(e) => {
                errors += 1;
                if as_json {
                    reports.push(json!({
                        "file": path.display().to_string(),
                        "error": format!("{e:#}"),
                    }));
                } else {
                    eprintln!("{}: ERROR: {e:#}", path.display());
                }
            }
        }
    }

    if as_json {
        match serde_json::to_string_pretty(&reports) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("Failed to serialize results: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if errors > 0 || (strict && failed_checks > 0) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
