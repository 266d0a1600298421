//! Persistence for runtime doc weights.
//!
//! The file is a flat TOML table of doc id to multiplier:
//!
//! ```toml
//! "tools/astropy/README.md" = 2.0
//! "papers/reviews/notes.txt" = 0.5
//! ```
//!
//! A missing file means no overrides. Entries whose value is not a positive
//! number are skipped with a warning, so one bad hand edit does not discard
//! the rest.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub struct WeightsFile {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process
    lock: Mutex<()>,
}

impl WeightsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeMap<String, f64>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read weights file: {}", self.path.display()))?;
        let table: BTreeMap<String, toml::Value> = toml::from_str(&content)
            .with_context(|| format!("Failed to parse weights file: {}", self.path.display()))?;

        let mut out = BTreeMap::new();
        for (doc_id, value) in table {
            let number = match value {
                toml::Value::Float(f) => f,
                toml::Value::Integer(i) => i as f64,
                other => {
                    tracing::warn!(doc_id = %doc_id, value = %other, "ignoring non-numeric weight");
                    continue;
                }
            };
            if !number.is_finite() || number <= 0.0 {
                tracing::warn!(doc_id = %doc_id, value = number, "ignoring non-positive weight");
                continue;
            }
            out.insert(doc_id, number);
        }
        Ok(out)
    }

    /// Replace the file contents with `weights`, creating parent directories.
    pub fn save<'a, I>(&self, weights: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a String, &'a f64)>,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_locked(weights.into_iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    /// Set (`Some`) or remove (`None`) one entry; returns the previous value.
    pub fn set(&self, doc_id: &str, value: Option<f64>) -> Result<Option<f64>> {
        if let Some(v) = value {
            if !v.is_finite() || v <= 0.0 {
                bail!("weight for '{}' must be a positive number, got {}", doc_id, v);
            }
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut weights = self.load()?;
        let previous = match value {
            Some(v) => weights.insert(doc_id.to_string(), v),
            None => weights.remove(doc_id),
        };
        self.write_locked(weights)?;
        Ok(previous)
    }

    fn write_locked(&self, weights: BTreeMap<String, f64>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let body = toml::to_string(&weights)?;
        // Write then rename so readers never see a truncated file
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, body)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = WeightsFile::new(dir.path().join("nope.toml"));
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn test_set_returns_previous_and_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = WeightsFile::new(dir.path().join("state/weights.toml"));

        assert_eq!(file.set("tools/astropy/README.md", Some(2.0)).unwrap(), None);
        assert_eq!(
            file.set("tools/astropy/README.md", Some(3.5)).unwrap(),
            Some(2.0)
        );
        file.set("docs/guide/intro.md", Some(0.5)).unwrap();

        let reopened = WeightsFile::new(file.path());
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.get("tools/astropy/README.md"), Some(&3.5));
        assert_eq!(loaded.len(), 2);

        assert_eq!(file.set("docs/guide/intro.md", None).unwrap(), Some(0.5));
        assert_eq!(file.set("docs/guide/intro.md", None).unwrap(), None);
        assert_eq!(file.load().unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_bad_value() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = WeightsFile::new(dir.path().join("w.toml"));
        assert!(file.set("a/b/c", Some(0.0)).is_err());
        assert!(file.set("a/b/c", Some(f64::NAN)).is_err());
        assert!(!file.path().exists());
    }

    #[test]
    fn test_skips_non_numeric_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("w.toml");
        std::fs::write(&path, "\"a/b/c.py\" = 2\n\"a/b/d.py\" = \"heavy\"\n").unwrap();
        let loaded = WeightsFile::new(&path).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("a/b/c.py"), Some(&2.0));
    }

    #[test]
    fn test_skips_non_positive_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("w.toml");
        std::fs::write(
            &path,
            "\"a/b/zero.py\" = 0\n\"a/b/neg.py\" = -1.5\n\"a/b/nan.py\" = nan\n\"a/b/ok.py\" = 0.25\n",
        )
        .unwrap();
        let loaded = WeightsFile::new(&path).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("a/b/ok.py"), Some(&0.25));
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = WeightsFile::new(dir.path().join("w.toml"));
        file.set("x/y/old.md", Some(4.0)).unwrap();

        let mut current = HashMap::new();
        current.insert("x/y/new.md".to_string(), 1.5);
        file.save(&current).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("x/y/new.md"), Some(&1.5));
    }
}
