//! On-disk layout for fetched images and their metadata.
//!
//! ```text
//! <data_dir>/images/<section_id>/<YYYY-MM-DD>.<format>
//! <data_dir>/metadata/<section_id>_<YYYY-MM-DD>.json
//! ```
use crate::dates::DATE_FORMAT;
use crate::error::Result;
use crate::imagery::{ImageryMetadata, ImageryResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The JSON document written next to each image.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MetadataDocument {
    pub timestamp: NaiveDate,
    pub section_id: String,
    pub local_path: PathBuf,
    #[serde(flatten)]
    pub metadata: ImageryMetadata,
}

pub struct ImageStore {
    images_dir: PathBuf,
    metadata_dir: PathBuf,
    extension: String,
}

impl ImageStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, extension: &str) -> Result<Self> {
        let images_dir = data_dir.as_ref().join("images");
        let metadata_dir = data_dir.as_ref().join("metadata");
        fs::create_dir_all(&images_dir)?;
        fs::create_dir_all(&metadata_dir)?;
        Ok(Self {
            images_dir,
            metadata_dir,
            extension: extension.to_string(),
        })
    }

    pub fn image_path(&self, section_id: &str, date: NaiveDate) -> PathBuf {
        self.images_dir
            .join(section_id)
            .join(format!("{}.{}", date.format(DATE_FORMAT), self.extension))
    }

    pub fn metadata_path(&self, section_id: &str, date: NaiveDate) -> PathBuf {
        self.metadata_dir
            .join(format!("{}_{}.json", section_id, date.format(DATE_FORMAT)))
    }

    /// Writes the image and its metadata document, records the image path on `result`
    /// and releases the image bytes. If the metadata cannot be written the image is
    /// removed again and `result` is left untouched.
    pub fn persist(&self, result: &mut ImageryResult) -> Result<()> {
        let image_path = self.image_path(&result.section_id, result.date);
        if let Some(data) = &result.image_data {
            write_image(&image_path, data)?;
            info!("Image saved to {}", image_path.display());
        }

        let document = MetadataDocument {
            timestamp: result.date,
            section_id: result.section_id.clone(),
            local_path: image_path.clone(),
            metadata: result.metadata.clone(),
        };
        let metadata_path = self.metadata_path(&result.section_id, result.date);
        if let Err(e) = write_metadata(&metadata_path, &document) {
            if result.image_data.is_some() {
                if let Err(remove) = fs::remove_file(&image_path) {
                    warn!("Unable to remove {}: {remove}", image_path.display());
                }
            }
            return Err(e);
        }
        info!("Metadata saved to {}", metadata_path.display());

        result.local_path = Some(image_path);
        result.image_data = None;
        Ok(())
    }

    pub fn read_metadata(&self, section_id: &str, date: NaiveDate) -> Result<MetadataDocument> {
        let content = fs::read_to_string(self.metadata_path(section_id, date))?;
        let document: MetadataDocument = serde_json::from_str(&content)?;
        Ok(document)
    }
}

fn write_metadata(dst: &Path, document: &MetadataDocument) -> Result<()> {
    fs::write(dst, serde_json::to_string_pretty(document)?)?;
    Ok(())
}

// Written to a `.partial` file first so an interrupted run never leaves a truncated image.
fn write_image(dst: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent_dir) = dst.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    let partial = dst.with_extension("partial");
    fs::write(&partial, data)?;
    fs::rename(&partial, dst)?;
    Ok(())
}
