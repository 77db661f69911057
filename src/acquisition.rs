//! Resumable section x date traversal over a region.
use crate::auth::TokenSource;
use crate::dates::DateRange;
use crate::error::Result;
use crate::fetch::{FetchOutcome, ImageRequestExecutor};
use crate::grid::{partition, partition_into, GeoBounds, Section};
use crate::imagery::ImageryResult;
use crate::sentinel_hub::ImageryApi;
use crate::settings::{GridShape, Settings};
use crate::storage::ImageStore;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Outcome of one run. `results` holds every image written, in traversal order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<ImageryResult>,
    pub attempted: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped_sections: usize,
}

impl RunReport {
    pub fn successes(&self) -> usize {
        self.results.len()
    }
}

pub struct AcquisitionOrchestrator<A, T> {
    executor: ImageRequestExecutor<A>,
    tokens: T,
    store: ImageStore,
    request_pause: Duration,
}

impl<A: ImageryApi, T: TokenSource> AcquisitionOrchestrator<A, T> {
    pub fn new(
        executor: ImageRequestExecutor<A>,
        tokens: T,
        store: ImageStore,
        settings: &Settings,
    ) -> Self {
        Self {
            executor,
            tokens,
            store,
            request_pause: settings.request_pause(),
        }
    }

    pub fn executor(&self) -> &ImageRequestExecutor<A> {
        &self.executor
    }

    pub async fn run_configured(&mut self, settings: &Settings) -> Result<RunReport> {
        let range = settings.date_range()?;
        self.run(
            &settings.region,
            &settings.grid_shape(),
            &range,
            settings.resume_from.as_deref(),
        )
        .await
    }

    /// Fetches every (section, date) pair, skipping sections before `resume_from`.
    ///
    /// Only an invalid grid or date range is an error; failed pairs are logged and
    /// counted, and the traversal moves on.
    pub async fn run(
        &mut self,
        region: &GeoBounds,
        shape: &GridShape,
        range: &DateRange,
        resume_from: Option<&str>,
    ) -> Result<RunReport> {
        let sections = match shape {
            GridShape::Rows { rows, cols, shift } => {
                info!("Dividing into {rows}x{cols} sections");
                partition(region, *rows, *cols, shift.as_ref())?
            }
            GridShape::Target(n) => {
                info!("Dividing into {n} sections");
                partition_into(region, *n)?
            }
        };
        let dates = range.generate()?;
        info!("Generated {} dates for processing", dates.len());

        let mut resume = resume_from.map(str::to_string);
        if let Some(id) = &resume {
            if sections.iter().any(|s| &s.id == id) {
                info!("Will resume from {id}");
            } else {
                warn!("Resume point {id} is not in this grid; every section will be skipped");
            }
        }

        let mut report = RunReport::default();
        for section in &sections {
            if let Some(id) = &resume {
                if *id != section.id {
                    info!("Skipping {} (resuming from {id})", section.id);
                    report.skipped_sections += 1;
                    continue;
                }
                info!("Resuming from {}", section.id);
                resume = None;
            }

            log_section(section);
            for date in &dates {
                report.attempted += 1;
                info!("Fetching imagery for {} on {date}", section.id);
                match self.executor.fetch(section, *date, &mut self.tokens).await {
                    FetchOutcome::Found(mut result) => {
                        match self.store.persist(&mut result) {
                            Ok(()) => report.results.push(result),
                            Err(e) => {
                                error!("Unable to store imagery for {} on {date}: {e}", section.id);
                                report.failed += 1;
                            }
                        }
                        sleep(self.request_pause).await;
                    }
                    FetchOutcome::NotFound => {
                        report.not_found += 1;
                    }
                }
            }
        }

        info!(
            "Successfully fetched {} of {} images",
            report.successes(),
            report.attempted
        );
        Ok(report)
    }
}

fn log_section(section: &Section) {
    let b = &section.bounds;
    info!(
        "Processing {}: lat {:.6} to {:.6}, lon {:.6} to {:.6}",
        section.id, b.min_lat, b.max_lat, b.min_lon, b.max_lon
    );
}
