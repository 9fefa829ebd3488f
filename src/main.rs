use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use copernicus_fetch::{
    AreaOfInterest, BatchOrchestrator, BatchReport, BatchRequest, CatalogClient, Credentials,
    DateRange, ProductDownloader, Settings, TokenProvider,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Download Copernicus Dataspace product archives for an area and date range.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory the `.zip` archives are written to
    #[arg(long)]
    save_dir: PathBuf,

    /// First day of the acquisition window (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Day after the acquisition window (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Catalog collection, e.g. SENTINEL-2
    #[arg(long)]
    collection: String,

    /// Processing level that must appear in the product name, e.g. L1C or L2A
    #[arg(long)]
    level: String,

    #[arg(long, allow_negative_numbers = true)]
    north: f64,

    #[arg(long, allow_negative_numbers = true)]
    south: f64,

    #[arg(long, allow_negative_numbers = true)]
    east: f64,

    #[arg(long, allow_negative_numbers = true)]
    west: f64,

    #[arg(long, env = "CDSE_USERNAME")]
    username: String,

    #[arg(long, env = "CDSE_PASSWORD", hide_env_values = true)]
    password: String,

    /// TOML file overriding endpoints and timeouts
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a JSON report of every product to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Search and filter only; download nothing
    #[arg(long)]
    dry_run: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = match &cli.config {
        Some(path) => Settings::read(path)?,
        None => Settings::default(),
    };
    let client = settings.http_client()?;

    let tokens = TokenProvider::new(client.clone(), &settings);
    let catalog = CatalogClient::new(client.clone(), &settings);
    let downloader = ProductDownloader::new(client, tokens, settings);
    let orchestrator = BatchOrchestrator::new(catalog, downloader).dry_run(cli.dry_run);

    let request = BatchRequest {
        aoi: AreaOfInterest::new(cli.north, cli.south, cli.east, cli.west),
        dates: DateRange::new(cli.start, cli.end),
        collection: cli.collection,
        level: cli.level,
        target_dir: cli.save_dir,
    };
    let credentials = Credentials::new(cli.username, cli.password);

    let report = orchestrator
        .run(&request, &credentials)
        .await
        .context("Download run aborted")?;

    Ok(ExitCode::from(finish(&report, cli.report.as_deref())))
}

/// Prints the summary and writes the optional JSON report. Once downloads
/// have run nothing here is fatal: a report that cannot be written only
/// turns the status into 2, like a failed item.
fn finish(report: &BatchReport, report_path: Option<&Path>) -> u8 {
    println!("Download complete: {report}");
    let mut status = if report.failed() > 0 { 2 } else { 0 };
    if let Some(path) = report_path {
        if let Err(e) = report.write(path) {
            warn!("{e}");
            status = 2;
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use copernicus_fetch::batch::ItemReport;
    use copernicus_fetch::error::DownloadError;
    use copernicus_fetch::{DownloadOutcome, ProductDescriptor};
    use reqwest::StatusCode;
    use tempfile::TempDir;

    fn saved(id: &str) -> ItemReport {
        ItemReport {
            product: ProductDescriptor::new(id, format!("{id}_L1C")),
            outcome: DownloadOutcome::Succeeded {
                path: PathBuf::from(format!("/data/{id}_L1C.zip")),
                bytes: 1,
            },
        }
    }

    #[test]
    fn test_clean_run_exits_zero_and_writes_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let report = BatchReport {
            found: 1,
            items: vec![saved("a")],
        };
        assert_eq!(finish(&report, Some(&path)), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_failed_item_exits_two() {
        let failed = ItemReport {
            product: ProductDescriptor::new("b", "b_L1C"),
            outcome: DownloadOutcome::Failed(DownloadError::Status {
                id: "b".to_string(),
                url: "http://localhost/Products(b)/$value".to_string(),
                status: StatusCode::NOT_FOUND,
            }),
        };
        let report = BatchReport {
            found: 2,
            items: vec![saved("a"), failed],
        };
        assert_eq!(finish(&report, None), 2);
    }

    #[test]
    fn test_unwritable_report_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("report.json");
        let report = BatchReport {
            found: 1,
            items: vec![saved("a")],
        };
        assert_eq!(finish(&report, Some(&path)), 2);
        assert!(!path.exists());
    }
}
