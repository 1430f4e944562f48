use crate::error::{DoorError, Result};
use crate::recognition::LabeledSample;
use image::GrayImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SAMPLE_EXTENSION: &str = "jpg";
const SAMPLE_SUFFIX: &str = ".jpg";

/// Folder of enrolled face samples named `<name>_<sequence>.jpg`
#[derive(Debug, Clone)]
pub struct EnrollmentStore {
    root: PathBuf,
}

impl EnrollmentStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject names that cannot be stored as a single file name prefix
    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(DoorError::enrollment("name must not be empty"));
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(DoorError::enrollment(format!(
                "name '{}' must not contain path separators",
                name
            )));
        }
        Ok(())
    }

    /// Split a sample file name into its label and sequence number.
    ///
    /// The label is everything before the last `_`, so names may contain underscores.
    pub fn parse_file_name(file_name: &str) -> Option<(&str, Option<u32>)> {
        let stem = file_name.strip_suffix(SAMPLE_SUFFIX)?;
        match stem.rsplit_once('_') {
            Some((label, seq)) if !label.is_empty() => Some((label, seq.parse().ok())),
            Some(_) => None,
            None if !stem.is_empty() => Some((stem, None)),
            None => None,
        }
    }

    /// First unused sequence number for `name`, continuing after the highest stored one
    pub fn next_sequence(&self, name: &str) -> Result<u32> {
        let highest = self
            .sample_files()?
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
            .filter_map(Self::parse_file_name)
            .filter(|(label, _)| *label == name)
            .filter_map(|(_, seq)| seq)
            .max();

        match highest {
            None => Ok(1),
            Some(seq) => seq.checked_add(1).ok_or_else(|| {
                DoorError::enrollment(format!("no sequence numbers left for '{}'", name))
            }),
        }
    }

    /// Write one face sample and return its path
    pub fn save_sample(&self, name: &str, sequence: u32, face: &GrayImage) -> Result<PathBuf> {
        Self::validate_name(name)?;
        fs::create_dir_all(&self.root)?;

        let path = self
            .root
            .join(format!("{}_{}{}", name, sequence, SAMPLE_SUFFIX));
        face.save(&path)?;
        debug!("Saved enrollment sample {}", path.display());
        Ok(path)
    }

    /// Load every decodable sample with its label. A missing folder yields no samples.
    pub fn load_all(&self) -> Result<Vec<LabeledSample>> {
        let mut samples = Vec::new();

        for path in self.sample_files()? {
            let Some(label) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(Self::parse_file_name)
                .map(|(label, _)| label.to_string())
            else {
                continue;
            };

            match image::open(&path) {
                Ok(img) => samples.push(LabeledSample::new(label, img.into_luma8())),
                Err(e) => warn!("Skipping unreadable sample {}: {}", path.display(), e),
            }
        }

        Ok(samples)
    }

    /// Distinct enrolled names in file name order
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for path in self.sample_files()? {
            if let Some((label, _)) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(Self::parse_file_name)
            {
                if !names.iter().any(|n| n == label) {
                    names.push(label.to_string());
                }
            }
        }
        Ok(names)
    }

    fn sample_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext == SAMPLE_EXTENSION)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}
