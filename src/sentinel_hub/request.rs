use super::Collection;
use crate::dates::DATE_FORMAT;
use crate::grid::GeoBounds;
use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;
use std::fmt;

const CRS_WGS84: &str = "http://www.opengis.net/def/crs/EPSG/0/4326";
const LEAST_CLOUD_COVER: &str = "leastCC";

/// Dates searched for a pass, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl TimeWindow {
    pub fn around(date: NaiveDate, days: u32) -> Self {
        let days = TimeDelta::days(i64::from(days));
        Self {
            from: date - days,
            to: date + days,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format(DATE_FORMAT),
            self.to.format(DATE_FORMAT)
        )
    }
}

/// The parts of a Process API request that stay fixed for a whole run.
#[derive(Clone, Debug)]
pub struct RequestTemplate {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub evalscript: String,
    pub max_cloud_coverage: f64,
    pub time_from: String,
    pub time_to: String,
}

impl RequestTemplate {
    pub fn build(
        &self,
        bounds: &GeoBounds,
        window: TimeWindow,
        collection: Collection,
    ) -> ProcessRequest {
        let from = format!("{}T{}", window.from.format(DATE_FORMAT), self.time_from);
        let to = format!("{}T{}", window.to.format(DATE_FORMAT), self.time_to);
        ProcessRequest {
            input: Input {
                bounds: Bounds {
                    bbox: bounds.bbox(),
                    properties: BoundsProperties {
                        crs: CRS_WGS84.to_string(),
                    },
                },
                data: vec![DataSource {
                    data_filter: DataFilter {
                        time_range: TimeRange { from, to },
                        mosaicking_order: LEAST_CLOUD_COVER.to_string(),
                        max_cloud_coverage: self.max_cloud_coverage,
                    },
                    kind: collection,
                }],
            },
            output: Output {
                width: self.width,
                height: self.height,
                responses: vec![OutputResponse {
                    identifier: "default".to_string(),
                    format: OutputFormat {
                        kind: self.mime_type.clone(),
                    },
                }],
            },
            evalscript: self.evalscript.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ProcessRequest {
    pub input: Input,
    pub output: Output,
    pub evalscript: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct Input {
    pub bounds: Bounds,
    pub data: Vec<DataSource>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Bounds {
    pub bbox: [f64; 4],
    pub properties: BoundsProperties,
}

#[derive(Serialize, Clone, Debug)]
pub struct BoundsProperties {
    pub crs: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct DataSource {
    #[serde(rename = "dataFilter")]
    pub data_filter: DataFilter,
    #[serde(rename = "type")]
    pub kind: Collection,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DataFilter {
    pub time_range: TimeRange,
    pub mosaicking_order: String,
    pub max_cloud_coverage: f64,
}

#[derive(Serialize, Clone, Debug)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct Output {
    pub width: u32,
    pub height: u32,
    pub responses: Vec<OutputResponse>,
}

#[derive(Serialize, Clone, Debug)]
pub struct OutputResponse {
    pub identifier: String,
    pub format: OutputFormat,
}

#[derive(Serialize, Clone, Debug)]
pub struct OutputFormat {
    #[serde(rename = "type")]
    pub kind: String,
}
