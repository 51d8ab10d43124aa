//! Bookmark document and its persistence.
//!
//! The document is always read and written whole; concurrent writers are
//! last-writer-wins.

use crate::dsp::DemodMode;
use crate::error::{Result, SdrError};
use crate::scanner::ScanEntry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkDocument {
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stations: Vec<Bookmark>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub frequency: u64,
    #[serde(default)]
    pub mode: DemodMode,
}

impl BookmarkDocument {
    /// Names of all non-empty-named categories, in document order.
    pub fn categories(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Scan entries for one category (case-insensitive) or all of them.
    ///
    /// Stations without a frequency are left out.
    pub fn entries(&self, category: Option<&str>) -> Vec<ScanEntry> {
        self.categories
            .iter()
            .filter(|c| category.is_none_or(|name| c.name.eq_ignore_ascii_case(name)))
            .flat_map(|c| c.stations.iter())
            .filter(|s| s.frequency > 0)
            .map(|s| ScanEntry::new(s.frequency, s.mode, s.label.clone()))
            .collect()
    }

    pub fn station_count(&self) -> usize {
        self.categories.iter().map(|c| c.stations.len()).sum()
    }
}

/// Whole-document bookmark persistence.
pub trait BookmarkStore: Send + Sync {
    /// The current document; an absent store reads as empty.
    fn load(&self) -> Result<BookmarkDocument>;

    /// Replace the stored document.
    fn save(&self, document: &BookmarkDocument) -> Result<()>;
}

/// Bookmarks in a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonBookmarkStore {
    path: PathBuf,
}

impl JsonBookmarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BookmarkStore for JsonBookmarkStore {
    fn load(&self) -> Result<BookmarkDocument> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BookmarkDocument::default());
            }
            Err(e) => return Err(SdrError::Io(e)),
        };
        serde_json::from_str(&text).map_err(|e| SdrError::ConfigParse {
            message: format!("{}: {}", self.path.display(), e),
        })
    }

    fn save(&self, document: &BookmarkDocument) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| SdrError::Other(format!("failed to encode bookmarks: {e}")))?;

        // Write beside the target, then rename over it.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        log::info!(
            "Saved {} bookmarks in {} categories to {}",
            document.station_count(),
            document.categories.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBookmarkStore {
    document: Mutex<BookmarkDocument>,
}

impl MemoryBookmarkStore {
    pub fn new(document: BookmarkDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }
}

impl BookmarkStore for MemoryBookmarkStore {
    fn load(&self) -> Result<BookmarkDocument> {
        Ok(self
            .document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, document: &BookmarkDocument) -> Result<()> {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = document.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "categories": [
            {"name": "Broadcast", "stations": [
                {"label": "Classic", "frequency": 98500000, "mode": "FM"},
                {"label": "Empty", "frequency": 0, "mode": "FM"}
            ]},
            {"name": "Air", "stations": [
                {"label": "Tower", "frequency": 118100000, "mode": "AM"}
            ]},
            {"name": "", "stations": []}
        ]
    }"#;

    fn sample() -> BookmarkDocument {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn parses_nested_categories() {
        let doc = sample();
        assert_eq!(doc.categories(), vec!["Broadcast", "Air"]);
        assert_eq!(doc.station_count(), 3);
        assert_eq!(doc.categories[0].stations[0].mode, DemodMode::Wbfm);
    }

    #[test]
    fn entries_skip_zero_frequency() {
        let all = sample().entries(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].label, "Classic");
        assert_eq!(all[1].mode, DemodMode::Am);
    }

    #[test]
    fn category_filter_ignores_case() {
        let air = sample().entries(Some("AIR"));
        assert_eq!(air.len(), 1);
        assert_eq!(air[0].frequency, 118_100_000);
        assert!(sample().entries(Some("Marine")).is_empty());
    }

    #[test]
    fn missing_fields_default() {
        let doc: BookmarkDocument =
            serde_json::from_str(r#"{"categories":[{"stations":[{"frequency":1}]}]}"#).unwrap();
        assert_eq!(doc.categories[0].stations[0].mode, DemodMode::Wbfm);
        assert!(doc.categories().is_empty());
        let empty: BookmarkDocument = serde_json::from_str("{}").unwrap();
        assert!(empty.categories.is_empty());
    }

    #[test]
    fn json_store_round_trip_replaces_whole_document() {
        let dir = TempDir::new().unwrap();
        let store = JsonBookmarkStore::new(dir.path().join("nested").join("bookmarks.json"));
        assert_eq!(store.load().unwrap(), BookmarkDocument::default());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());

        let replacement = BookmarkDocument {
            categories: vec![Category {
                name: "Only".to_string(),
                stations: Vec::new(),
            }],
        };
        store.save(&replacement).unwrap();
        assert_eq!(store.load().unwrap().categories(), vec!["Only"]);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn json_store_reports_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.json");
        fs::write(&path, "{ not json").unwrap();
        let err = JsonBookmarkStore::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryBookmarkStore::default();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap().station_count(), 3);
    }
}
