//! Region bounds from a border-points file.
//!
//! The file assigns lists of `(lat, lon)` tuples to named borders:
//!
//! ```text
//! north_border = [(31.594, 34.490), (31.580, 34.520)]
//! west_border = [(31.235, 34.219), (31.400, 34.360)]
//! ```
//!
//! Only the enclosing rectangle is derived; the outline itself is not kept.
use crate::error::{AcquisitionError, Result};
use crate::grid::{Center, GeoBounds};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::info;

/// Every point listed under a `north/south/east/west_border = [...]` assignment.
pub fn parse_border_points(content: &str) -> Vec<Center> {
    let border = Regex::new(r"(?s)\b(north|south|east|west)_border\s*=\s*\[(.*?)\]")
        .expect("Regex pattern should always compile");
    let point = Regex::new(r"\(\s*(-?[\d.]+)\s*,\s*(-?[\d.]+)\s*\)")
        .expect("Regex pattern should always compile");

    let mut points = vec![];
    for list in border.captures_iter(content) {
        for pair in point.captures_iter(&list[2]) {
            if let (Ok(lat), Ok(lon)) = (pair[1].parse::<f64>(), pair[2].parse::<f64>()) {
                points.push(Center { lat, lon });
            }
        }
    }
    points
}

pub fn enclosing_bounds(points: &[Center]) -> Result<GeoBounds> {
    let Some(first) = points.first() else {
        return Err(AcquisitionError::InvalidBounds(
            "no border points found".to_string(),
        ));
    };
    let start = GeoBounds {
        min_lat: first.lat,
        max_lat: first.lat,
        min_lon: first.lon,
        max_lon: first.lon,
    };
    let bounds = points.iter().fold(start, |b, p| GeoBounds {
        min_lat: b.min_lat.min(p.lat),
        max_lat: b.max_lat.max(p.lat),
        min_lon: b.min_lon.min(p.lon),
        max_lon: b.max_lon.max(p.lon),
    });
    bounds.validate()?;
    Ok(bounds)
}

pub fn read_bounds<P: AsRef<Path>>(path: P) -> Result<GeoBounds> {
    let content = fs::read_to_string(&path)?;
    let points = parse_border_points(&content);
    info!(
        "Loaded {} border points from {}",
        points.len(),
        path.as_ref().display()
    );
    enclosing_bounds(&points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BORDERS: &str = r#"
north_border = [(31.594361, 34.490000), (31.580000, 34.520000)]
south_border = [
    (31.235845, 34.250000),
    (31.240000, 34.300000)
]
east_border = [(31.500000, 34.558917)]
west_border = [(31.300000, 34.219500), (31.400000, 34.360000)]
"#;

    #[test]
    fn test_points_from_every_border() {
        let points = parse_border_points(BORDERS);
        assert_eq!(points.len(), 7);
        assert_eq!(
            points[0],
            Center {
                lat: 31.594361,
                lon: 34.49
            }
        );
    }

    #[test]
    fn test_enclosing_rectangle() {
        let bounds = enclosing_bounds(&parse_border_points(BORDERS)).unwrap();
        assert_eq!(
            bounds,
            GeoBounds {
                min_lat: 31.235845,
                max_lat: 31.594361,
                min_lon: 34.2195,
                max_lon: 34.558917,
            }
        );
    }

    #[test]
    fn test_unrelated_lists_ignored() {
        let points = parse_border_points("crossings = [(31.0, 34.0)]\nnorth_border = []");
        assert!(points.is_empty());
        assert!(matches!(
            enclosing_bounds(&points),
            Err(AcquisitionError::InvalidBounds(_))
        ));
    }

    #[test]
    fn test_read_bounds_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("borders.txt");
        fs::write(&path, BORDERS).unwrap();
        assert_eq!(read_bounds(&path).unwrap().max_lon, 34.558917);
        assert!(matches!(
            read_bounds(dir.path().join("missing.txt")),
            Err(AcquisitionError::Storage(_))
        ));
    }
}
