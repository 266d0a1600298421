//! Weight registry: static and runtime score multipliers.
//!
//! Three kinds of multiplier contribute to a document's final weight:
//!
//! | Kind | Key | Source |
//! |------|-----|--------|
//! | extension | lowercase extension with leading dot (`.py`) | config, loaded once |
//! | path | case-insensitive substring of the doc id | config, loaded once |
//! | doc | exact doc id | runtime, via [`WeightRegistry::set_doc_weight`] |
//!
//! `multiplier = extension × ∏(matching paths) × doc`; any absent entry is `1.0`.
//!
//! The runtime map is copy-on-write: readers clone an `Arc` of the current
//! map and never observe a half-applied update, writers are serialized by the
//! lock and replace the whole map.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::identifier::validate_doc_id;

/// Static weight tables as they appear in configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WeightTables {
    #[serde(default)]
    pub extensions: BTreeMap<String, f64>,
    #[serde(default)]
    pub path_includes: BTreeMap<String, f64>,
}

/// The factors behind a document's multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightBreakdown {
    pub extension: f64,
    pub path: f64,
    pub doc: f64,
    pub total: f64,
}

pub struct WeightRegistry {
    extensions: HashMap<String, f64>,
    paths: Vec<(String, f64)>,
    runtime: RwLock<Arc<HashMap<String, f64>>>,
}

impl WeightRegistry {
    /// A registry with no static weights (every multiplier is `1.0`).
    pub fn new() -> Self {
        Self {
            extensions: HashMap::new(),
            paths: Vec::new(),
            runtime: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Build a registry from configured tables.
    ///
    /// Fails with [`CoreError::Config`] if any multiplier is not a finite
    /// positive number, or if a key is empty.
    pub fn load(tables: &WeightTables) -> Result<Self> {
        let mut extensions = HashMap::new();
        for (key, value) in &tables.extensions {
            check_static("extensions", key, *value)?;
            extensions.insert(normalize_extension(key), *value);
        }

        let mut paths = Vec::with_capacity(tables.path_includes.len());
        for (key, value) in &tables.path_includes {
            check_static("path_includes", key, *value)?;
            paths.push((key.to_lowercase(), *value));
        }

        Ok(Self {
            extensions,
            paths,
            runtime: RwLock::new(Arc::new(HashMap::new())),
        })
    }

    /// Seed runtime doc weights, e.g. from a persisted file.
    pub fn load_doc_weights<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut next = HashMap::new();
        for (doc_id, value) in entries {
            if !is_valid_multiplier(value) {
                return Err(CoreError::config(format!(
                    "doc weight for '{}' must be a positive number, got {}",
                    doc_id, value
                )));
            }
            next.insert(doc_id, value);
        }
        let mut guard = self.runtime.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Extension multiplier times every matching path multiplier.
    pub fn get_static_multiplier(&self, doc_id: &str) -> f64 {
        self.extension_multiplier(doc_id) * self.path_multiplier(doc_id)
    }

    /// Static multiplier times the runtime doc weight.
    pub fn get_effective_multiplier(&self, doc_id: &str) -> f64 {
        self.get_static_multiplier(doc_id) * self.doc_multiplier(doc_id)
    }

    pub fn explain(&self, doc_id: &str) -> WeightBreakdown {
        let extension = self.extension_multiplier(doc_id);
        let path = self.path_multiplier(doc_id);
        let doc = self.doc_multiplier(doc_id);
        WeightBreakdown {
            extension,
            path,
            doc,
            total: extension * path * doc,
        }
    }

    /// Set or overwrite the runtime weight for `doc_id`.
    ///
    /// Returns the previous runtime value, if any.
    pub fn set_doc_weight(&self, doc_id: &str, multiplier: f64) -> Result<Option<f64>> {
        validate_doc_id(doc_id)?;
        if !is_valid_multiplier(multiplier) {
            return Err(CoreError::validation(format!(
                "multiplier for '{}' must be > 0, got {}",
                doc_id, multiplier
            )));
        }
        Ok(self.update(|map| map.insert(doc_id.to_string(), multiplier)))
    }

    /// Remove the runtime weight for `doc_id`, returning the removed value.
    pub fn clear_doc_weight(&self, doc_id: &str) -> Option<f64> {
        self.update(|map| map.remove(doc_id))
    }

    /// Snapshot of the runtime weights.
    pub fn doc_weights(&self) -> Arc<HashMap<String, f64>> {
        self.runtime
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<R>(&self, apply: impl FnOnce(&mut HashMap<String, f64>) -> R) -> R {
        let mut guard = self.runtime.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = HashMap::clone(&guard);
        let out = apply(&mut next);
        *guard = Arc::new(next);
        out
    }

    fn extension_multiplier(&self, doc_id: &str) -> f64 {
        extension_of(doc_id)
            .and_then(|ext| self.extensions.get(&ext).copied())
            .unwrap_or(1.0)
    }

    fn path_multiplier(&self, doc_id: &str) -> f64 {
        if self.paths.is_empty() {
            return 1.0;
        }
        let lower = doc_id.to_lowercase();
        self.paths
            .iter()
            .filter(|(pattern, _)| lower.contains(pattern.as_str()))
            .map(|(_, m)| *m)
            .product()
    }

    fn doc_multiplier(&self, doc_id: &str) -> f64 {
        self.doc_weights().get(doc_id).copied().unwrap_or(1.0)
    }
}

impl Default for WeightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase extension of the final path segment, with a leading dot.
///
/// Dotfiles such as `.bashrc` have no extension.
pub fn extension_of(doc_id: &str) -> Option<String> {
    let name = doc_id.rsplit('/').next().unwrap_or(doc_id);
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => Some(name[pos..].to_lowercase()),
        _ => None,
    }
}

fn normalize_extension(key: &str) -> String {
    let lower = key.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

fn is_valid_multiplier(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn check_static(section: &str, key: &str, value: f64) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CoreError::config(format!("{}: empty key", section)));
    }
    if !is_valid_multiplier(value) {
        return Err(CoreError::config(format!(
            "{}: value for '{}' must be a positive number, got {}",
            section, key, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(ext: &[(&str, f64)], paths: &[(&str, f64)]) -> WeightTables {
        WeightTables {
            extensions: ext.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            path_includes: paths.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_unknown_extension_is_neutral() {
        let reg = WeightRegistry::load(&tables(&[(".py", 1.2)], &[])).unwrap();
        assert_eq!(reg.get_static_multiplier("docs/repo/notes.txt"), 1.0);
        assert_eq!(reg.get_static_multiplier("docs/repo/Makefile"), 1.0);
    }

    #[test]
    fn test_extension_case_insensitive_and_dotless_keys() {
        let reg = WeightRegistry::load(&tables(&[("py", 1.5), (".MD", 0.5)], &[])).unwrap();
        assert!((reg.get_static_multiplier("a/b/Main.PY") - 1.5).abs() < 1e-12);
        assert!((reg.get_static_multiplier("a/b/README.md") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_path_weights_multiply() {
        let reg = WeightRegistry::load(&tables(
            &[(".py", 2.0)],
            &[("tests/", 0.5), ("examples", 0.8)],
        ))
        .unwrap();
        let m = reg.get_static_multiplier("code/repo/examples/Tests/test_x.py");
        assert!((m - 2.0 * 0.5 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_load_rejects_non_positive() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = WeightRegistry::load(&tables(&[(".py", bad)], &[]));
            assert!(matches!(err, Err(CoreError::Config(_))), "value {}", bad);
        }
        let err = WeightRegistry::load(&tables(&[], &[("vendor", -0.1)]));
        assert!(matches!(err, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_set_doc_weight_validation() {
        let reg = WeightRegistry::new();
        assert!(matches!(
            reg.set_doc_weight("a/b.py", 0.0),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            reg.set_doc_weight("a/b.py", -2.0),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(reg.get_effective_multiplier("a/b.py"), 1.0);
    }

    #[test]
    fn test_set_then_read_and_clear() {
        let reg = WeightRegistry::load(&tables(&[(".py", 2.0)], &[])).unwrap();
        assert_eq!(reg.set_doc_weight("a/b.py", 1.5).unwrap(), None);
        assert!((reg.get_effective_multiplier("a/b.py") - 3.0).abs() < 1e-12);
        assert_eq!(reg.set_doc_weight("a/b.py", 0.5).unwrap(), Some(1.5));
        assert!((reg.get_effective_multiplier("a/b.py") - 1.0).abs() < 1e-12);
        assert_eq!(reg.clear_doc_weight("a/b.py"), Some(0.5));
        assert!((reg.get_effective_multiplier("a/b.py") - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_old_snapshot_unaffected_by_write() {
        let reg = WeightRegistry::new();
        reg.set_doc_weight("x", 2.0).unwrap();
        let before = reg.doc_weights();
        reg.set_doc_weight("x", 3.0).unwrap();
        assert_eq!(before.get("x"), Some(&2.0));
        assert_eq!(reg.doc_weights().get("x"), Some(&3.0));
    }

    #[test]
    fn test_write_visible_to_other_threads() {
        let reg = Arc::new(WeightRegistry::new());
        reg.set_doc_weight("a/b.py", 1.75).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.get_effective_multiplier("a/b.py"))
            })
            .collect();
        for h in handles {
            assert!((h.join().unwrap() - 1.75).abs() < 1e-12);
        }
    }

    #[test]
    fn test_concurrent_writers_last_value_wins_per_key() {
        let reg = Arc::new(WeightRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    reg.set_doc_weight(&format!("doc/{}", i), 1.0 + i as f64)
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snapshot = reg.doc_weights();
        assert_eq!(snapshot.len(), 16);
        for i in 0..16 {
            assert_eq!(snapshot.get(&format!("doc/{}", i)), Some(&(1.0 + i as f64)));
        }
    }

    #[test]
    fn test_explain_breakdown() {
        let reg = WeightRegistry::load(&tables(&[(".rs", 1.2)], &[("src", 1.5)])).unwrap();
        reg.set_doc_weight("c/r/src/lib.rs", 2.0).unwrap();
        let b = reg.explain("c/r/src/lib.rs");
        assert!((b.extension - 1.2).abs() < 1e-12);
        assert!((b.path - 1.5).abs() < 1e-12);
        assert!((b.doc - 2.0).abs() < 1e-12);
        assert!((b.total - 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a/b/c.tar.gz"), Some(".gz".into()));
        assert_eq!(extension_of("a/b/.bashrc"), None);
        assert_eq!(extension_of("a/b.d/Makefile"), None);
    }
}
