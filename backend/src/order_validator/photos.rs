use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use shared::Property;

const PHOTO_NAME_MARKER: &str = "photo";
const UPLOAD_MARKERS: [&str; 2] = ["uploadkit", "cdn"];

lazy_static! {
    static ref INDEX_IN_NAME: Regex = Regex::new(r"\d+").unwrap();
    static ref UPLOAD_UUID: Regex = Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}"
    )
    .unwrap();
}

/// How uploaded photos are counted on a line item.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhotoCounting {
    /// Every qualifying property counts. Thumbnail and full size entries of
    /// the same photo are counted twice.
    Naive,
    /// Qualifying properties are grouped by photo identifier.
    #[default]
    Deduplicated,
}

/// Identifier of one uploaded photo. Kinds are kept apart so that index `1`
/// never collides with a raw value `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PhotoId {
    Index(String),
    Upload(String),
    Raw(String),
}

#[derive(Debug, Copy, Clone)]
pub struct PhotoCounter {
    counting: PhotoCounting,
}

impl PhotoCounter {
    pub fn new(counting: PhotoCounting) -> Self {
        Self { counting }
    }

    pub fn count(&self, properties: &[Property]) -> u32 {
        let uploads = properties.iter().filter(|p| is_uploaded_photo(p));

        let count = match self.counting {
            PhotoCounting::Naive => uploads.count(),
            PhotoCounting::Deduplicated => uploads.map(photo_id).collect::<HashSet<_>>().len(),
        };

        tracing::debug!(count, counting = ?self.counting, "Uploaded photos detected in properties");

        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

fn is_uploaded_photo(property: &Property) -> bool {
    property.name.to_lowercase().contains(PHOTO_NAME_MARKER)
        && UPLOAD_MARKERS
            .iter()
            .any(|marker| property.value.contains(marker))
}

fn photo_id(property: &Property) -> PhotoId {
    if let Some(index) = INDEX_IN_NAME.find(&property.name) {
        return PhotoId::Index(index.as_str().to_string());
    }

    if let Some(uuid) = UPLOAD_UUID.find(&property.value) {
        return PhotoId::Upload(uuid.as_str().to_lowercase());
    }

    PhotoId::Raw(property.value.trim().to_string())
}
