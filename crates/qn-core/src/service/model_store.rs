//! Load-once holder for the serving model.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use qn_common::Result;
use tracing::{info, warn};

use crate::artifact::ModelArtifact;

/// Where the store gets its artifact from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    File(PathBuf),
    /// The built-in placeholder coefficients.
    Placeholder,
}

/// Lazily loads one immutable [`ModelArtifact`] and hands out shared
/// references. Concurrent first loads converge on a single value.
#[derive(Debug)]
pub struct ModelStore {
    source: ModelSource,
    slot: RwLock<Option<Arc<ModelArtifact>>>,
}

impl ModelStore {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            slot: RwLock::new(None),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(ModelSource::File(path.into()))
    }

    /// A store that is already loaded with `artifact`.
    pub fn preloaded(artifact: ModelArtifact) -> Self {
        Self {
            source: ModelSource::Placeholder,
            slot: RwLock::new(Some(Arc::new(artifact))),
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The loaded artifact, loading it on first use.
    pub fn get(&self) -> Result<Arc<ModelArtifact>> {
        if let Some(model) = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(model));
        }

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = Arc::new(self.load()?);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Re-read the source and replace the held artifact. On failure the
    /// previous artifact stays in place.
    pub fn reload(&self) -> Result<Arc<ModelArtifact>> {
        let model = match self.load() {
            Ok(m) => Arc::new(m),
            Err(e) => {
                warn!(error = %e, "model reload failed; keeping current model");
                return Err(e);
            }
        };
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&model));
        Ok(model)
    }

    fn load(&self) -> Result<ModelArtifact> {
        let artifact = match &self.source {
            ModelSource::File(path) => ModelArtifact::load(path)?,
            ModelSource::Placeholder => {
                warn!("serving placeholder model coefficients");
                ModelArtifact::placeholder(Utc::now())
            }
        };
        info!(
            version = %artifact.version,
            trained = %artifact.trained,
            "model loaded"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn concurrent_first_loads_share_one_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nowcast.json");
        ModelArtifact::placeholder(Utc::now()).save(&path).unwrap();
        let store = Arc::new(ModelStore::from_path(&path));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get().unwrap())
            })
            .collect();
        let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn missing_file_is_error_and_stays_unloaded() {
        let store = ModelStore::from_path("/nonexistent/nowcast.json");
        assert!(store.get().is_err());
        assert!(!store.is_loaded());
    }

    #[test]
    fn reload_replaces_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nowcast.json");
        let mut artifact = ModelArtifact::placeholder(Utc::now());
        artifact.save(&path).unwrap();
        let store = ModelStore::from_path(&path);
        let first = store.get().unwrap();

        artifact.model.intercept = -1.0;
        artifact.save(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &store.get().unwrap()));
        let second = store.reload().unwrap();
        assert_eq!(second.model.intercept, -1.0);
        assert_eq!(store.get().unwrap().model.intercept, -1.0);
    }

    #[test]
    fn failed_reload_keeps_previous() {
        let store = ModelStore::preloaded(ModelArtifact::placeholder(Utc::now()));
        assert!(store.is_loaded());
        let dir = TempDir::new().unwrap();
        let broken = ModelStore {
            source: ModelSource::File(dir.path().join("absent.json")),
            slot: RwLock::new(Some(store.get().unwrap())),
        };
        assert!(broken.reload().is_err());
        assert!(broken.get().is_ok());
    }
}
