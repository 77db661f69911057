use crate::sentinel_hub::Collection;
use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where an image came from and which search produced it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ImageryMetadata {
    pub source: String,
    pub collection: Collection,
    pub bbox: [f64; 4],
    pub date_range: String,
}

/// One accepted image for a (section, date) pair.
///
/// `image_data` is held until the image has been written, then released.
#[derive(Clone, Debug)]
pub struct ImageryResult {
    pub section_id: String,
    pub date: NaiveDate,
    pub image_url: String,
    pub image_data: Option<Bytes>,
    pub metadata: ImageryMetadata,
    pub local_path: Option<PathBuf>,
}

/// Serializable view of an [`ImageryResult`] without the image bytes.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ImageryRecord {
    pub image_url: String,
    pub timestamp: NaiveDate,
    pub metadata: ImageryMetadata,
    pub section_id: String,
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub has_image_data: bool,
}

impl ImageryResult {
    pub fn new(
        section_id: &str,
        date: NaiveDate,
        image_data: Bytes,
        metadata: ImageryMetadata,
    ) -> Self {
        Self {
            section_id: section_id.to_string(),
            date,
            image_url: String::new(),
            image_data: Some(image_data),
            metadata,
            local_path: None,
        }
    }

    pub fn to_record(&self) -> ImageryRecord {
        ImageryRecord {
            image_url: self.image_url.clone(),
            timestamp: self.date,
            metadata: self.metadata.clone(),
            section_id: self.section_id.clone(),
            local_path: self.local_path.clone(),
            has_image_data: self.image_data.is_some(),
        }
    }

    pub fn from_record(record: ImageryRecord) -> Self {
        Self {
            section_id: record.section_id,
            date: record.timestamp,
            image_url: record.image_url,
            image_data: None,
            metadata: record.metadata,
            local_path: record.local_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ImageryResult {
        ImageryResult::new(
            "section_4",
            NaiveDate::from_ymd_opt(2023, 1, 8).unwrap(),
            Bytes::from_static(b"png bytes"),
            ImageryMetadata {
                source: "Sentinel Hub".to_string(),
                collection: Collection::Sentinel2L2A,
                bbox: [34.0, 31.0, 34.5, 31.5],
                date_range: "2023-01-05 to 2023-01-11".to_string(),
            },
        )
    }

    #[test]
    fn test_record_notes_image_data_without_embedding_it() {
        let json = serde_json::to_value(result().to_record()).unwrap();
        assert_eq!(json["has_image_data"], true);
        assert_eq!(json["timestamp"], "2023-01-08");
        assert_eq!(json["metadata"]["collection"], "sentinel-2-l2a");
        assert!(json.get("image_data").is_none());
    }

    #[test]
    fn test_from_record_drops_bytes() {
        let restored = ImageryResult::from_record(result().to_record());
        assert_eq!(restored.section_id, "section_4");
        assert!(restored.image_data.is_none());
        assert_eq!(restored.metadata, result().metadata);
    }
}
