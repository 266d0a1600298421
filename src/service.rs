//! Application wiring: config to a running [`RagService`].
//!
//! [`App::open`] creates the embedding providers, loads static and persisted
//! weights, ingests the corpus and publishes the first snapshot. The CLI and
//! the HTTP server both go through it.

use anyhow::{Context, Result};
use nancy_brain_core::embedding::EmbeddingProvider;
use nancy_brain_core::weights::WeightRegistry;
use nancy_brain_core::RagService;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::build_snapshot;
use crate::weights_file::WeightsFile;

pub struct App {
    config: Config,
    service: RagService,
    general: Arc<dyn EmbeddingProvider>,
    code: Option<Arc<dyn EmbeddingProvider>>,
    weights_file: Option<WeightsFile>,
    // Keeps set/clear and the following save in one order
    weight_writes: tokio::sync::Mutex<()>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let general: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let code: Option<Arc<dyn EmbeddingProvider>> = match &config.embedding.code {
            Some(code_config) => Some(Arc::from(create_provider(code_config)?)),
            None => None,
        };
        tracing::debug!(
            general = general.model_name(),
            code = ?code.as_ref().map(|c| c.model_name()),
            "embedding providers ready"
        );

        let weights = WeightRegistry::load(&config.weights.tables)
            .context("Invalid [weights] configuration")?;

        let weights_file = config.weights.doc_weights_path.as_ref().map(WeightsFile::new);
        if let Some(file) = &weights_file {
            let persisted = file.load()?;
            tracing::info!(
                path = %file.path().display(),
                entries = persisted.len(),
                "loaded doc weights"
            );
            weights
                .load_doc_weights(persisted)
                .with_context(|| format!("Invalid doc weights in {}", file.path().display()))?;
        }

        let snapshot = {
            let general_ref = config
                .embedding
                .is_enabled()
                .then_some(general.as_ref());
            build_snapshot(config, general_ref, code.as_deref()).await?
        };

        let service = RagService::new(
            snapshot,
            Arc::new(weights),
            general.clone(),
            code.clone(),
            config.retrieval.settings(),
        );

        Ok(Self {
            config: config.clone(),
            service,
            general,
            code,
            weights_file,
            weight_writes: tokio::sync::Mutex::new(()),
        })
    }

    pub fn service(&self) -> &RagService {
        &self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn general_model(&self) -> &str {
        self.general.model_name()
    }

    pub fn code_model(&self) -> Option<&str> {
        self.code.as_deref().map(|c| c.model_name())
    }

    /// Re-scan and re-embed the corpus, then swap the new snapshot in.
    ///
    /// Queries keep running against the old snapshot until the swap.
    pub async fn reload(&self) -> Result<()> {
        let general_ref = self
            .config
            .embedding
            .is_enabled()
            .then_some(self.general.as_ref());
        let snapshot = build_snapshot(&self.config, general_ref, self.code.as_deref()).await?;
        let previous = self.service.publish(snapshot);
        tracing::info!(
            previous = previous.index_version(),
            current = self.service.snapshot().index_version(),
            "published new snapshot"
        );
        Ok(())
    }

    /// Set a runtime weight and persist the full map.
    pub async fn set_weight(&self, doc_id: &str, multiplier: f64) -> Result<Option<f64>> {
        let _guard = self.weight_writes.lock().await;
        let previous = self.service.set_weight(doc_id, multiplier)?;
        if let Err(e) = self.persist_weights() {
            self.restore_weight(doc_id, previous);
            return Err(e);
        }
        tracing::info!(doc_id, multiplier, ?previous, "doc weight set");
        Ok(previous)
    }

    /// Remove a runtime weight and persist the full map.
    pub async fn clear_weight(&self, doc_id: &str) -> Result<Option<f64>> {
        let _guard = self.weight_writes.lock().await;
        let previous = self.service.clear_weight(doc_id);
        if previous.is_some() {
            if let Err(e) = self.persist_weights() {
                self.restore_weight(doc_id, previous);
                return Err(e);
            }
        }
        tracing::info!(doc_id, ?previous, "doc weight cleared");
        Ok(previous)
    }

    fn persist_weights(&self) -> Result<()> {
        if let Some(file) = &self.weights_file {
            file.save(self.service.doc_weights().iter())?;
        }
        Ok(())
    }

    /// Put the in-memory weight back after a failed save.
    fn restore_weight(&self, doc_id: &str, previous: Option<f64>) {
        tracing::warn!(doc_id, ?previous, "weights file not written, reverting doc weight");
        match previous {
            // Already validated when it was first set
            Some(value) => {
                let _ = self.service.set_weight(doc_id, value);
            }
            None => {
                self.service.clear_weight(doc_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use std::path::Path;

    async fn open_app(dir: &Path, weights_path: &str) -> App {
        let doc = dir.join("kb/tools/lensing/fit.py");
        std::fs::create_dir_all(doc.parent().unwrap()).unwrap();
        std::fs::write(&doc, "def fit():\n    pass\n").unwrap();

        let cfg_path = dir.join("nancy.toml");
        std::fs::write(
            &cfg_path,
            format!(
                "[corpus]\nroot = \"kb\"\n\n[weights]\ndoc_weights_path = \"{}\"\n",
                weights_path
            ),
        )
        .unwrap();
        let config = load_config(&cfg_path).unwrap();
        App::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_skips_bad_persisted_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("w.toml"),
            "\"tools/lensing/fit.py\" = 0\n\"docs/guide/intro.md\" = 1.5\n",
        )
        .unwrap();
        let app = open_app(dir.path(), "w.toml").await;
        let weights = app.service().doc_weights();
        assert_eq!(weights.len(), 1);
        assert_eq!(weights.get("docs/guide/intro.md"), Some(&1.5));
    }

    #[tokio::test]
    async fn test_failed_save_reverts_weight() {
        let dir = tempfile::TempDir::new().unwrap();
        // A regular file where the weights directory should be
        std::fs::write(dir.path().join("sub"), "not a directory").unwrap();
        let app = open_app(dir.path(), "sub/w.toml").await;
        let doc_id = "tools/lensing/fit.py";

        assert!(app.set_weight(doc_id, 3.0).await.is_err());
        assert_eq!(app.service().weights().get_effective_multiplier(doc_id), 1.0);
        assert!(app.service().doc_weights().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_cleared_weight() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = open_app(dir.path(), "state/w.toml").await;
        let doc_id = "tools/lensing/fit.py";
        assert_eq!(app.set_weight(doc_id, 2.0).await.unwrap(), None);

        // Replace the state directory with a file so the next save fails
        std::fs::remove_dir_all(dir.path().join("state")).unwrap();
        std::fs::write(dir.path().join("state"), "blocked").unwrap();

        assert!(app.clear_weight(doc_id).await.is_err());
        assert_eq!(app.service().doc_weights().get(doc_id), Some(&2.0));
        assert!(app.set_weight(doc_id, 5.0).await.is_err());
        assert_eq!(app.service().doc_weights().get(doc_id), Some(&2.0));
    }
}
