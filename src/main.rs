use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use slow_hub::acquisition::AcquisitionOrchestrator;
use slow_hub::auth::{OAuthClient, TokenManager};
use slow_hub::fetch::ImageRequestExecutor;
use slow_hub::sentinel_hub::{http_client, ProcessApi};
use slow_hub::settings::{parse_sections, Overrides, Settings};
use slow_hub::storage::ImageStore;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Fetch Sentinel-2 imagery for a region, section by section and week by week.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Fetch imagery from Sentinel Hub
    #[arg(long)]
    fetch: bool,

    /// Process fetched imagery
    #[arg(long)]
    process: bool,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// First date to fetch (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// Last date to fetch (YYYY-MM-DD or "current")
    #[arg(long)]
    end_date: Option<String>,

    /// Grid shape as "rows,cols"
    #[arg(long)]
    sections: Option<String>,

    /// Approximate number of sections instead of an explicit grid
    #[arg(long)]
    target_sections: Option<usize>,

    /// Section id to resume from, e.g. section_5
    #[arg(long)]
    resume_from: Option<String>,

    #[arg(long)]
    client_id: Option<String>,

    #[arg(long)]
    client_secret: Option<String>,

    /// Border-points file the region's bounding rectangle is derived from
    #[arg(long)]
    region_file: Option<PathBuf>,

    /// Where images and metadata are written
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Deprecated, use --client-id
    #[arg(long, hide = true)]
    api_key: Option<String>,

    /// Deprecated, use --client-secret
    #[arg(long, hide = true)]
    instance_id: Option<String>,
}

impl Args {
    fn overrides(&self) -> Result<Overrides> {
        let sections = match &self.sections {
            Some(s) => Some(parse_sections(s)?),
            None => None,
        };
        if self.api_key.is_some() {
            warn!("--api-key is deprecated, use --client-id");
        }
        if self.instance_id.is_some() {
            warn!("--instance-id is deprecated, use --client-secret");
        }
        Ok(Overrides {
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            sections,
            target_sections: self.target_sections,
            resume_from: self.resume_from.clone(),
            region_file: self.region_file.clone(),
            client_id: self.client_id.clone().or_else(|| self.api_key.clone()),
            client_secret: self.client_secret.clone().or_else(|| self.instance_id.clone()),
            data_dir: self.data_dir.clone(),
        })
    }
}

async fn fetch(settings: &Settings) -> Result<()> {
    settings.validate()?;

    let client = http_client(settings.timeout(), settings.api.verify_ssl)?;
    let exchange = OAuthClient::new(
        client.clone(),
        &settings.api.oauth_url,
        &settings.api.client_id,
        &settings.api.client_secret,
    );
    let tokens = TokenManager::new(exchange, settings.token_refresh_margin());
    let executor = ImageRequestExecutor::new(
        ProcessApi::new(client, &settings.api.process_url),
        settings,
    );
    let store = ImageStore::open(&settings.storage.data_dir, &settings.imagery.format)
        .with_context(|| {
            format!(
                "Unable to prepare data directory {}",
                settings.storage.data_dir.display()
            )
        })?;

    let mut orchestrator = AcquisitionOrchestrator::new(executor, tokens, store, settings);
    let report = orchestrator.run_configured(settings).await?;
    info!(
        "Fetched {} images ({} not found, {} failed to store, {} sections skipped)",
        report.successes(),
        report.not_found,
        report.failed,
        report.skipped_sections
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if !args.fetch && !args.process {
        Args::command().print_help()?;
        return Ok(());
    }

    let started = Instant::now();
    let settings = match &args.config {
        Some(path) => Settings::read(path)
            .with_context(|| format!("Unable to read settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let settings = settings
        .with_overrides(&args.overrides()?)
        .with_region_from_file();

    if args.fetch {
        fetch(&settings).await?;
    }
    if args.process {
        info!("Processing of fetched imagery is not implemented yet");
    }

    info!("Finished in {:.1?}", started.elapsed());
    Ok(())
}
