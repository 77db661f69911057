//! Spatial partitioning of a region into addressable sections.
use crate::error::{AcquisitionError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        let bounds = Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        let all_finite = [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(AcquisitionError::InvalidBounds(format!(
                "non-finite coordinate in {:?}",
                self
            )));
        }
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(AcquisitionError::InvalidBounds(format!(
                "min must not exceed max: {:?}",
                self
            )));
        }
        Ok(())
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn center(&self) -> Center {
        Center {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    pub fn contains(&self, point: Center) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }

    /// Bounding box in the `[min_lon, min_lat, max_lon, max_lat]` order used by the Process API.
    pub fn bbox(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    fn shifted_east(self, offset: f64) -> Self {
        Self {
            min_lon: self.min_lon + offset,
            max_lon: self.max_lon + offset,
            ..self
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Section {
    pub id: String,
    pub bounds: GeoBounds,
    pub center: Center,
}

impl Section {
    fn new(index: usize, bounds: GeoBounds) -> Self {
        Self {
            id: section_id(index),
            center: bounds.center(),
            bounds,
        }
    }
}

pub fn section_id(index: usize) -> String {
    format!("section_{index}")
}

/// Eastward translation applied to cells of the eastern column(s).
///
/// Imagery returned for the eastern edge of the region is known to sit west of
/// where it belongs. Each affected cell is moved east by `multiplier * base`
/// degrees; the cell keeps its width. Overrides are matched in order and the
/// first match wins.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ShiftRules {
    pub base: f64,
    pub eastern_columns: Vec<usize>,
    pub default_multiplier: f64,
    pub overrides: Vec<ShiftOverride>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct ShiftOverride {
    pub row: usize,
    pub col: usize,
    pub multiplier: f64,
}

impl Default for ShiftRules {
    fn default() -> Self {
        Self {
            base: 0.15,
            eastern_columns: vec![1],
            default_multiplier: 1.0,
            overrides: vec![
                ShiftOverride {
                    row: 1,
                    col: 1,
                    multiplier: 3.0,
                },
                ShiftOverride {
                    row: 0,
                    col: 1,
                    multiplier: 1.5,
                },
            ],
        }
    }
}

impl ShiftRules {
    /// Longitude offset for the cell at (`row`, `col`); zero outside the eastern columns.
    pub fn offset(&self, row: usize, col: usize) -> f64 {
        if !self.eastern_columns.contains(&col) {
            return 0.0;
        }
        let multiplier = self
            .overrides
            .iter()
            .find(|o| o.row == row && o.col == col)
            .map(|o| o.multiplier)
            .unwrap_or(self.default_multiplier);
        multiplier * self.base
    }
}

/// Divides `bounds` into `rows` x `cols` cells, south to north then west to east.
pub fn partition(
    bounds: &GeoBounds,
    rows: usize,
    cols: usize,
    shift: Option<&ShiftRules>,
) -> Result<Vec<Section>> {
    if rows == 0 || cols == 0 {
        return Err(AcquisitionError::InvalidGrid(format!(
            "rows and cols must be positive, got {rows}x{cols}"
        )));
    }
    bounds.validate()?;

    let sections = cells(bounds, rows, cols)
        .enumerate()
        .map(|(index, (row, col, cell))| {
            let offset = shift.map(|rules| rules.offset(row, col)).unwrap_or(0.0);
            if offset != 0.0 {
                debug!(
                    "Shifting {} east by {offset} degrees (row {row}, col {col})",
                    section_id(index)
                );
            }
            Section::new(index, cell.shifted_east(offset))
        })
        .collect();
    Ok(sections)
}

/// Divides `bounds` into exactly `n` sections on a grid shaped after the region's aspect ratio.
///
/// The grid uses `rows = floor(sqrt(n / aspect))` (at least 1, at most `n`) and
/// `cols = ceil(n / rows)`, which covers `n` with fewer than `rows` spare cells.
/// Spare cells are dropped from the end of the traversal, i.e. the eastern end
/// of the northernmost row.
pub fn partition_into(bounds: &GeoBounds, n: usize) -> Result<Vec<Section>> {
    if n == 0 {
        return Err(AcquisitionError::InvalidGrid(
            "target section count must be positive".to_string(),
        ));
    }
    bounds.validate()?;

    let (rows, cols) = target_shape(bounds, n);
    debug!("Target of {n} sections uses a {rows}x{cols} grid");

    let sections = cells(bounds, rows, cols)
        .take(n)
        .enumerate()
        .map(|(index, (_, _, cell))| Section::new(index, cell))
        .collect();
    Ok(sections)
}

fn target_shape(bounds: &GeoBounds, n: usize) -> (usize, usize) {
    let (lat_span, lon_span) = (bounds.lat_span(), bounds.lon_span());
    let aspect = if lat_span > 0.0 && lon_span > 0.0 {
        lon_span / lat_span
    } else {
        1.0
    };
    let rows = ((n as f64 / aspect).sqrt().floor() as usize).clamp(1, n);
    let cols = n.div_ceil(rows);
    (rows, cols)
}

fn cells(
    bounds: &GeoBounds,
    rows: usize,
    cols: usize,
) -> impl Iterator<Item = (usize, usize, GeoBounds)> + '_ {
    (0..rows).flat_map(move |row| {
        (0..cols).map(move |col| {
            let cell = GeoBounds {
                min_lat: edge(bounds.min_lat, bounds.max_lat, row, rows),
                max_lat: edge(bounds.min_lat, bounds.max_lat, row + 1, rows),
                min_lon: edge(bounds.min_lon, bounds.max_lon, col, cols),
                max_lon: edge(bounds.min_lon, bounds.max_lon, col + 1, cols),
            };
            (row, col, cell)
        })
    })
}

// Shared edges come from the same expression, so neighbours never gap or overlap.
fn edge(min: f64, max: f64, k: usize, n: usize) -> f64 {
    if k == n {
        max
    } else {
        min + (max - min) * (k as f64 / n as f64)
    }
}
