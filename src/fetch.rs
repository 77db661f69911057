//! One imagery fetch for a (section, date) pair.
use crate::auth::TokenSource;
use crate::error::{AcquisitionError, Result};
use crate::grid::Section;
use crate::imagery::{ImageryMetadata, ImageryResult};
use crate::quality::QualityGate;
use crate::sentinel_hub::{
    Collection, ImageryApi, ProcessRequest, RequestTemplate, TimeWindow, SOURCE,
};
use crate::settings::Settings;
use bytes::Bytes;
use chrono::NaiveDate;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum FetchOutcome {
    Found(ImageryResult),
    /// No collection produced an acceptable image for the pair.
    NotFound,
}

pub struct ImageRequestExecutor<A> {
    api: A,
    template: RequestTemplate,
    collections: Vec<Collection>,
    gate: QualityGate,
    window_days: u32,
    max_retries: u32,
    retry_delay: Duration,
}

impl<A: ImageryApi> ImageRequestExecutor<A> {
    pub fn new(api: A, settings: &Settings) -> Self {
        Self {
            api,
            template: settings.request_template(),
            collections: settings.imagery.collections.clone(),
            gate: settings.quality.clone(),
            window_days: settings.window_days(),
            max_retries: settings.retry.max_retries,
            retry_delay: settings.retry_delay(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Tries each collection in order and returns the first image the quality gate accepts.
    ///
    /// Results from different collections are never merged. An image that fails the
    /// gate ends the search for this pair, since a poor image reflects the date rather
    /// than the collection. Failures of any kind are logged and reduced to `NotFound`.
    pub async fn fetch<T: TokenSource>(
        &self,
        section: &Section,
        date: NaiveDate,
        tokens: &mut T,
    ) -> FetchOutcome {
        let window = TimeWindow::around(date, self.window_days);
        debug!("Using extended date range: {window} (±{} days)", self.window_days);

        let mut token = match tokens.token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("No token available, requests will need a refresh: {e}");
                String::new()
            }
        };

        for collection in &self.collections {
            info!("Trying {collection} for {} on {date}", section.id);
            let request = self.template.build(&section.bounds, window, *collection);

            let image = match self.attempt(&request, &mut token, tokens).await {
                Ok(image) => image,
                Err(e) => {
                    warn!("Giving up on {collection} for {} on {date}: {e}", section.id);
                    continue;
                }
            };

            if !self.gate.accepts(&image) {
                warn!("Image for {} on {date} failed quality check", section.id);
                return FetchOutcome::NotFound;
            }

            let metadata = ImageryMetadata {
                source: SOURCE.to_string(),
                collection: *collection,
                bbox: section.bounds.bbox(),
                date_range: window.to_string(),
            };
            return FetchOutcome::Found(ImageryResult::new(&section.id, date, image, metadata));
        }

        warn!("Could not obtain valid imagery for {} on {date}", section.id);
        FetchOutcome::NotFound
    }

    /// Sends `request` until it returns an image or the retry budget runs out.
    /// Every failed attempt uses one slot of the budget, whatever the cause.
    async fn attempt<T: TokenSource>(
        &self,
        request: &ProcessRequest,
        token: &mut String,
        tokens: &mut T,
    ) -> Result<Bytes> {
        let mut retries = 0;
        let mut last_error = AcquisitionError::Settings("max_retries is zero".to_string());

        while retries < self.max_retries {
            let delay = match self.api.process(token, request).await {
                Ok(response) if response.status == StatusCode::OK => return Ok(response.body),
                Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                    if retries + 1 < self.max_retries {
                        warn!("Token rejected, requesting a new one");
                        *token = tokens.force_refresh().await?;
                    }
                    last_error = AcquisitionError::AuthFailure("request unauthorized".to_string());
                    Duration::ZERO
                }
                Ok(response) if response.status == StatusCode::TOO_MANY_REQUESTS => {
                    last_error = AcquisitionError::RateLimited;
                    self.retry_delay.saturating_mul(2u32.saturating_pow(retries))
                }
                Ok(response) => {
                    last_error = AcquisitionError::Api {
                        status: response.status,
                        body: String::from_utf8_lossy(&response.body).into_owned(),
                    };
                    self.retry_delay
                }
                Err(e) => {
                    last_error = e;
                    self.retry_delay
                }
            };

            retries += 1;
            if retries < self.max_retries && !delay.is_zero() {
                warn!(
                    "{last_error}; retrying in {}s ({retries}/{})",
                    delay.as_secs_f64(),
                    self.max_retries
                );
                sleep(delay).await;
            }
        }
        Err(last_error)
    }
}
