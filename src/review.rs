use crate::config::ReviewConfig;
use crate::error::{DoorError, Result};
use crate::frame::FaceRegion;
use chrono::{DateTime, NaiveDateTime, Utc};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

const SNAPSHOT_PREFIX: &str = "unknown_";

/// Sidecar written next to a snapshot when metadata is enabled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    pub file_name: String,
    pub captured_at: DateTime<Utc>,
    pub confidence: f64,
    pub frame_id: u64,
    pub region: FaceRegion,
}

/// Result of a retention pass
#[derive(Debug, Clone, Default)]
pub struct CleanupResult {
    pub files_deleted: usize,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

/// Review folder for faces that did not match anyone
pub struct ReviewStore {
    root: PathBuf,
    interval: Duration,
    save_metadata: bool,
    last_saved: Option<Instant>,
}

impl ReviewStore {
    pub fn new<P: Into<PathBuf>>(root: P, interval: Duration, save_metadata: bool) -> Self {
        Self {
            root: root.into(),
            interval,
            save_metadata,
            last_saved: None,
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(&config.path, config.snapshot_interval(), config.save_metadata)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot file name for a capture time: `unknown_YYYYmmdd_HHMMSS_mmm.jpg`
    pub fn snapshot_name(captured_at: SystemTime) -> String {
        let datetime: DateTime<Utc> = captured_at.into();
        format!(
            "{}{}.jpg",
            SNAPSHOT_PREFIX,
            datetime.format("%Y%m%d_%H%M%S_%3f")
        )
    }

    /// Save an unknown face unless one was saved less than the interval ago.
    ///
    /// Returns the snapshot path, or `None` when rate limited.
    pub fn save_unknown(
        &mut self,
        face: &GrayImage,
        confidence: f64,
        frame_id: u64,
        region: FaceRegion,
        captured_at: SystemTime,
        now: Instant,
    ) -> Result<Option<PathBuf>> {
        if let Some(last) = self.last_saved {
            if now.saturating_duration_since(last) < self.interval {
                return Ok(None);
            }
        }

        fs::create_dir_all(&self.root)?;
        let path = self.unique_path(&Self::snapshot_name(captured_at));
        face.save(&path)?;
        self.last_saved = Some(now);
        debug!("Saved unknown face snapshot {}", path.display());

        if self.save_metadata {
            let metadata = SnapshotMetadata {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                captured_at: captured_at.into(),
                confidence,
                frame_id,
                region,
            };
            // The snapshot itself is already on disk
            if let Err(e) = self.write_metadata(&path, &metadata) {
                warn!("Snapshot {} saved without metadata: {}", path.display(), e);
            }
        }

        Ok(Some(path))
    }

    fn unique_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.root.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let stem = file_name.trim_end_matches(".jpg");
        (1..)
            .map(|n| self.root.join(format!("{}_{}.jpg", stem, n)))
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }

    fn write_metadata(&self, snapshot: &Path, metadata: &SnapshotMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata).map_err(|e| {
            DoorError::component("review_store", &format!("Failed to serialize metadata: {}", e))
        })?;
        let path = snapshot.with_extension("json");
        fs::write(&path, json)?;
        debug!("Saved snapshot metadata to {}", path.display());
        Ok(())
    }

    /// Delete snapshots (and their sidecars) captured more than `retention` before `now`
    pub fn trim_older_than(&self, retention: Duration, now: SystemTime) -> Result<CleanupResult> {
        let mut result = CleanupResult::default();
        if !self.root.is_dir() {
            return Ok(result);
        }

        let cutoff: DateTime<Utc> = now
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();
        debug!("Review cleanup cutoff: {}", cutoff);

        for entry in fs::read_dir(&self.root)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    result.errors.push(format!("Failed to read entry: {}", e));
                    continue;
                }
            };

            let Some(captured) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_snapshot_time)
            else {
                continue;
            };

            if captured >= cutoff.naive_utc() {
                continue;
            }

            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(&path) {
                Ok(()) => {
                    result.files_deleted += 1;
                    result.bytes_freed += size;
                }
                Err(e) => {
                    let message = format!("Failed to delete {}: {}", path.display(), e);
                    error!("{}", message);
                    result.errors.push(message);
                }
            }
        }

        if result.files_deleted > 0 {
            info!(
                "Removed {} old review files ({} bytes)",
                result.files_deleted, result.bytes_freed
            );
        }

        Ok(result)
    }
}

/// Capture time encoded in a snapshot or sidecar file name, to the second
fn parse_snapshot_time(file_name: &str) -> Option<NaiveDateTime> {
    let rest = file_name.strip_prefix(SNAPSHOT_PREFIX)?;
    if !(rest.ends_with(".jpg") || rest.ends_with(".json")) {
        return None;
    }
    let stamp = rest.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use tempfile::TempDir;

    fn face() -> GrayImage {
        GrayImage::from_pixel(24, 24, Luma([128]))
    }

    fn region() -> FaceRegion {
        FaceRegion::new(10, 20, 24, 24)
    }

    #[test]
    fn test_snapshot_name_format() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(
            ReviewStore::snapshot_name(at),
            "unknown_20231114_221320_123.jpg"
        );
    }

    #[test]
    fn test_snapshots_are_rate_limited() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ReviewStore::new(temp_dir.path(), Duration::from_secs(1), false);
        let start = Instant::now();
        let wall = SystemTime::now();

        let first = store
            .save_unknown(&face(), 150.0, 1, region(), wall, start)
            .unwrap();
        let second = store
            .save_unknown(
                &face(),
                150.0,
                2,
                region(),
                wall + Duration::from_millis(500),
                start + Duration::from_millis(500),
            )
            .unwrap();
        let third = store
            .save_unknown(
                &face(),
                150.0,
                3,
                region(),
                wall + Duration::from_millis(1000),
                start + Duration::from_millis(1000),
            )
            .unwrap();

        assert!(first.as_ref().is_some_and(|p| p.exists()));
        assert!(second.is_none());
        assert!(third.is_some());
        assert_ne!(first, third);
    }

    #[test]
    fn test_zero_interval_saves_every_face() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ReviewStore::new(temp_dir.path(), Duration::ZERO, false);
        let now = Instant::now();
        let wall = SystemTime::now();

        let a = store.save_unknown(&face(), 120.0, 1, region(), wall, now).unwrap();
        let b = store.save_unknown(&face(), 120.0, 1, region(), wall, now).unwrap();

        assert!(a.is_some());
        assert!(b.is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn test_metadata_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ReviewStore::new(temp_dir.path(), Duration::ZERO, true);

        let path = store
            .save_unknown(&face(), 133.5, 42, region(), SystemTime::now(), Instant::now())
            .unwrap()
            .unwrap();

        let json = fs::read_to_string(path.with_extension("json")).unwrap();
        let metadata: SnapshotMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata.frame_id, 42);
        assert_eq!(metadata.confidence, 133.5);
        assert_eq!(metadata.region, region());
        assert_eq!(
            metadata.file_name,
            path.file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn test_snapshot_kept_when_sidecar_cannot_be_written() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = ReviewStore::new(temp_dir.path(), Duration::ZERO, true);
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);

        // A directory where the sidecar file should go
        fs::create_dir(temp_dir.path().join("unknown_20231114_221320_123.json")).unwrap();

        let path = store
            .save_unknown(&face(), 140.0, 7, region(), at, Instant::now())
            .unwrap()
            .unwrap();

        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "unknown_20231114_221320_123.jpg");
    }

    #[test]
    fn test_trim_removes_only_old_snapshots() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReviewStore::new(temp_dir.path(), Duration::ZERO, false);
        let now = SystemTime::now();
        let old = now - Duration::from_secs(40 * 24 * 3600);

        let old_name = ReviewStore::snapshot_name(old);
        fs::write(temp_dir.path().join(&old_name), b"old").unwrap();
        fs::write(
            temp_dir.path().join(old_name.replace(".jpg", ".json")),
            b"{}",
        )
        .unwrap();
        let fresh_name = ReviewStore::snapshot_name(now);
        fs::write(temp_dir.path().join(&fresh_name), b"new").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"keep me").unwrap();

        let result = store
            .trim_older_than(Duration::from_secs(30 * 24 * 3600), now)
            .unwrap();

        assert_eq!(result.files_deleted, 2);
        assert!(result.errors.is_empty());
        assert!(!temp_dir.path().join(&old_name).exists());
        assert!(temp_dir.path().join(&fresh_name).exists());
        assert!(temp_dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_trim_missing_folder_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReviewStore::new(temp_dir.path().join("missing"), Duration::ZERO, false);

        let result = store
            .trim_older_than(Duration::from_secs(3600), SystemTime::now())
            .unwrap();
        assert_eq!(result.files_deleted, 0);
    }
}
