//! Run configuration, read once from TOML and never mutated afterwards.
use crate::borders;
use crate::dates::{parse_date, DateRange, EndDate};
use crate::error::{AcquisitionError, Result};
use crate::grid::{GeoBounds, ShiftRules};
use crate::quality::QualityGate;
use crate::sentinel_hub::{Collection, RequestTemplate};
use chrono::{NaiveDate, TimeDelta};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{
      bands: ["B04", "B03", "B02", "B08"],
      units: "REFLECTANCE"
    }],
    output: {
      bands: 3,
      sampleType: "AUTO"
    }
  };
}

function evaluatePixel(sample) {
  let gain = 3.0;
  let gamma = 0.8;

  let r = Math.pow(Math.min(sample.B04 * gain, 1), gamma);
  let g = Math.pow(Math.min(sample.B03 * gain, 1), gamma);
  let b = Math.pow(Math.min(sample.B02 * gain, 1), gamma);

  if (sample.B08) {
    r = Math.min(r + sample.B08 * 0.1, 1.0);
    g = Math.min(g + sample.B08 * 0.05, 1.0);
  }

  return [r, g, b];
}
"#;

/// Cloud coverage thresholds at or above this use the wider search window.
const HIGH_CLOUD_THRESHOLD: f64 = 50.0;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub resume_from: Option<String>,
    /// Border-points file whose enclosing rectangle replaces `region` when readable.
    pub region_file: Option<PathBuf>,
    pub api: ApiSettings,
    pub region: GeoBounds,
    pub grid: GridSettings,
    pub dates: DateSettings,
    pub imagery: ImagerySettings,
    pub retry: RetrySettings,
    pub quality: QualityGate,
    pub storage: StorageSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub process_url: String,
    pub oauth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub verify_ssl: bool,
    pub timeout_secs: u64,
    pub token_refresh_margin_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GridSettings {
    pub rows: usize,
    pub cols: usize,
    pub target_sections: Option<usize>,
    pub eastern_shift: Option<ShiftRules>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DateSettings {
    pub start: String,
    pub end: String,
    pub period_days: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ImagerySettings {
    pub collections: Vec<Collection>,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub cloud_coverage: f64,
    pub high_cloud_days: u32,
    pub low_cloud_days: u32,
    pub time_from: String,
    pub time_to: String,
    pub evalscript: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub request_pause_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

/// How the region is cut into sections.
#[derive(Clone, Debug, PartialEq)]
pub enum GridShape {
    Rows {
        rows: usize,
        cols: usize,
        shift: Option<ShiftRules>,
    },
    Target(usize),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resume_from: None,
            region_file: None,
            api: ApiSettings::default(),
            region: GeoBounds {
                min_lat: 31.235845,
                max_lat: 31.594361,
                min_lon: 34.2195,
                max_lon: 34.558917,
            },
            grid: GridSettings::default(),
            dates: DateSettings::default(),
            imagery: ImagerySettings::default(),
            retry: RetrySettings::default(),
            quality: QualityGate::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            process_url: "https://services.sentinel-hub.com/api/v1/process".to_string(),
            oauth_url: "https://services.sentinel-hub.com/oauth/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            verify_ssl: true,
            timeout_secs: 180,
            token_refresh_margin_secs: 300,
        }
    }
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            rows: 10,
            cols: 2,
            target_sections: None,
            eastern_shift: Some(ShiftRules::default()),
        }
    }
}

impl Default for DateSettings {
    fn default() -> Self {
        Self {
            start: "2023-01-01".to_string(),
            end: "current".to_string(),
            period_days: 7,
        }
    }
}

impl Default for ImagerySettings {
    fn default() -> Self {
        Self {
            collections: vec![Collection::Sentinel2L2A, Collection::Sentinel2L1C],
            width: 2028,
            height: 1024,
            format: "png".to_string(),
            cloud_coverage: 50.0,
            high_cloud_days: 3,
            low_cloud_days: 1,
            time_from: "08:00:00Z".to_string(),
            time_to: "17:00:00Z".to_string(),
            evalscript: EVALSCRIPT.to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay_secs: 5,
            request_pause_secs: 1,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Values given on the command line. Each one that is set replaces the corresponding setting.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sections: Option<(usize, usize)>,
    pub target_sections: Option<usize>,
    pub resume_from: Option<String>,
    pub region_file: Option<PathBuf>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self =
            toml::from_str(&content).map_err(|e| AcquisitionError::Settings(e.to_string()))?;
        Ok(settings)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AcquisitionError::Settings(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(start) = &overrides.start_date {
            self.dates.start = start.clone();
        }
        if let Some(end) = &overrides.end_date {
            self.dates.end = end.clone();
        }
        if let Some((rows, cols)) = overrides.sections {
            self.grid.rows = rows;
            self.grid.cols = cols;
            self.grid.target_sections = None;
        }
        if let Some(n) = overrides.target_sections {
            self.grid.target_sections = Some(n);
        }
        if let Some(resume_from) = &overrides.resume_from {
            self.resume_from = Some(resume_from.clone());
        }
        if let Some(region_file) = &overrides.region_file {
            self.region_file = Some(region_file.clone());
        }
        if let Some(client_id) = &overrides.client_id {
            self.api.client_id = client_id.clone();
        }
        if let Some(client_secret) = &overrides.client_secret {
            self.api.client_secret = client_secret.clone();
        }
        if let Some(data_dir) = &overrides.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        self
    }

    /// Replaces `region` with the rectangle enclosing the points in `region_file`.
    /// A file that cannot be read or holds no points leaves the configured region in place.
    pub fn with_region_from_file(mut self) -> Self {
        let Some(path) = &self.region_file else {
            return self;
        };
        match borders::read_bounds(path) {
            Ok(bounds) => {
                info!(
                    "Region from {}: lat {} to {}, lon {} to {}",
                    path.display(),
                    bounds.min_lat,
                    bounds.max_lat,
                    bounds.min_lon,
                    bounds.max_lon
                );
                self.region = bounds;
            }
            Err(e) => warn!(
                "Unable to derive region from {}, using configured bounds: {e}",
                path.display()
            ),
        }
        self
    }

    /// Checks everything a fetch run needs before any request is made.
    pub fn validate(&self) -> Result<()> {
        if self.api.client_id.trim().is_empty() || self.api.client_secret.trim().is_empty() {
            return Err(AcquisitionError::MissingCredentials);
        }
        for url in [&self.api.process_url, &self.api.oauth_url] {
            Url::parse(url).map_err(|e| AcquisitionError::Settings(format!("'{url}': {e}")))?;
        }
        self.region.validate()?;
        if self.retry.max_retries == 0 {
            return Err(AcquisitionError::Settings(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.imagery.collections.is_empty() {
            return Err(AcquisitionError::Settings(
                "at least one collection is required".to_string(),
            ));
        }
        if let Some(resume_from) = &self.resume_from {
            let pattern =
                Regex::new(r"^section_\d+$").expect("Regex pattern should always compile");
            if !pattern.is_match(resume_from) {
                return Err(AcquisitionError::Settings(format!(
                    "resume_from must look like 'section_<n>', got '{resume_from}'"
                )));
            }
        }
        self.date_range()?;
        Ok(())
    }

    pub fn date_range(&self) -> Result<DateRange> {
        let start: NaiveDate = parse_date(&self.dates.start)?;
        let end: EndDate = self.dates.end.parse()?;
        if self.dates.period_days == 0 {
            return Err(AcquisitionError::InvalidRange(
                "period_days must be positive".to_string(),
            ));
        }
        Ok(DateRange {
            start,
            end,
            period: TimeDelta::days(i64::from(self.dates.period_days)),
        })
    }

    pub fn grid_shape(&self) -> GridShape {
        match self.grid.target_sections {
            Some(n) => GridShape::Target(n),
            None => GridShape::Rows {
                rows: self.grid.rows,
                cols: self.grid.cols,
                shift: self.grid.eastern_shift.clone(),
            },
        }
    }

    pub fn request_template(&self) -> RequestTemplate {
        RequestTemplate {
            width: self.imagery.width,
            height: self.imagery.height,
            mime_type: format!("image/{}", self.imagery.format),
            evalscript: self.imagery.evalscript.clone(),
            max_cloud_coverage: self.imagery.cloud_coverage,
            time_from: self.imagery.time_from.clone(),
            time_to: self.imagery.time_to.clone(),
        }
    }

    /// Days searched either side of a sampled date. Permissive cloud thresholds
    /// search wider to find any usable pass.
    pub fn window_days(&self) -> u32 {
        if self.imagery.cloud_coverage >= HIGH_CLOUD_THRESHOLD {
            self.imagery.high_cloud_days
        } else {
            self.imagery.low_cloud_days
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.api.token_refresh_margin_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.retry_delay_secs)
    }

    pub fn request_pause(&self) -> Duration {
        Duration::from_secs(self.retry.request_pause_secs)
    }
}

/// Parses a `lat,lon` section count such as `2,2`.
pub fn parse_sections(s: &str) -> Result<(usize, usize)> {
    let invalid =
        || AcquisitionError::InvalidGrid(format!("'{s}' is not in 'lat,lon' form (e.g. '2,2')"));
    let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
    let lat: usize = lat.trim().parse().map_err(|_| invalid())?;
    let lon: usize = lon.trim().parse().map_err(|_| invalid())?;
    Ok((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentinel_hub::TimeWindow;

    fn with_credentials() -> Settings {
        Settings::default().with_overrides(&Overrides {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        let expected = GridShape::Rows {
            rows: 10,
            cols: 2,
            shift: Some(ShiftRules::default()),
        };
        assert_eq!(settings.grid_shape(), expected);
        assert_eq!(settings.window_days(), 3);
        assert_eq!(settings.retry.max_retries, 10);
        assert_eq!(settings.timeout(), Duration::from_secs(180));
        assert_eq!(settings.request_template().mime_type, "image/png");
    }

    #[test]
    fn test_low_cloud_threshold_narrows_window() {
        let mut settings = Settings::default();
        settings.imagery.cloud_coverage = 20.0;
        assert_eq!(settings.window_days(), 1);
        let date = NaiveDate::from_ymd_opt(2023, 1, 8).unwrap();
        let window = TimeWindow::around(date, settings.window_days());
        assert_eq!(window.to_string(), "2023-01-07 to 2023-01-09");
    }

    #[test]
    fn test_missing_credentials() {
        assert!(matches!(
            Settings::default().validate(),
            Err(AcquisitionError::MissingCredentials)
        ));
        assert!(with_credentials().validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let settings = with_credentials().with_overrides(&Overrides {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-02-01".to_string()),
            sections: Some((2, 2)),
            resume_from: Some("section_2".to_string()),
            ..Default::default()
        });
        assert_eq!(settings.dates.start, "2024-01-01");
        assert_eq!(settings.grid.rows, 2);
        assert_eq!(settings.resume_from.as_deref(), Some("section_2"));
        assert!(settings.validate().is_ok());

        let targeted = settings.with_overrides(&Overrides {
            target_sections: Some(150),
            ..Default::default()
        });
        assert_eq!(targeted.grid_shape(), GridShape::Target(150));
    }

    #[test]
    fn test_bad_resume_id_rejected() {
        let settings = with_credentials().with_overrides(&Overrides {
            resume_from: Some("north".to_string()),
            ..Default::default()
        });
        assert!(matches!(settings.validate(), Err(AcquisitionError::Settings(_))));
    }

    #[test]
    fn test_bad_date_rejected() {
        let settings = with_credentials().with_overrides(&Overrides {
            end_date: Some("yesterday".to_string()),
            ..Default::default()
        });
        assert!(matches!(settings.validate(), Err(AcquisitionError::InvalidRange(_))));
    }

    #[test]
    fn test_write_then_read_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let settings = with_credentials();
        settings.write(&path).unwrap();
        assert_eq!(Settings::read(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [grid]
            rows = 2
            cols = 2

            [imagery]
            cloud_coverage = 10.0
            collections = ["sentinel-2-l1c"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.grid.rows, 2);
        assert_eq!(settings.grid.eastern_shift, Some(ShiftRules::default()));
        assert_eq!(settings.imagery.collections, vec![Collection::Sentinel2L1C]);
        assert_eq!(settings.imagery.width, 2028);
        assert_eq!(settings.window_days(), 1);
    }

    #[test]
    fn test_parse_sections() {
        assert_eq!(parse_sections("2,2").unwrap(), (2, 2));
        assert_eq!(parse_sections(" 10 , 3 ").unwrap(), (10, 3));
        assert!(parse_sections("2x2").is_err());
        assert!(parse_sections("a,2").is_err());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut settings = with_credentials();
        settings.retry.max_retries = 0;
        assert!(matches!(settings.validate(), Err(AcquisitionError::Settings(_))));
    }

    #[test]
    fn test_region_from_border_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("borders.txt");
        fs::write(
            &path,
            "north_border = [(31.6, 34.5)]\nsouth_border = [(31.2, 34.2), (31.3, 34.6)]",
        )
        .unwrap();
        let settings = Settings::default()
            .with_overrides(&Overrides {
                region_file: Some(path),
                ..Default::default()
            })
            .with_region_from_file();
        assert_eq!(settings.region, GeoBounds::new(31.2, 31.6, 34.2, 34.6).unwrap());
    }

    #[test]
    fn test_unreadable_border_file_keeps_region() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.region_file = Some(dir.path().join("missing.txt"));
        let resolved = settings.clone().with_region_from_file();
        assert_eq!(resolved.region, settings.region);

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "no borders here").unwrap();
        settings.region_file = Some(empty);
        assert_eq!(settings.clone().with_region_from_file().region, settings.region);
    }
}
