//! A fitted model kept for as long as its training file is unchanged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{FittedModel, TrainingSpec};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::ingestion::RawTable;

/// Hex SHA-256 of a training snapshot
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

struct CachedModel {
    fingerprint: String,
    model: Arc<FittedModel>,
}

/// Fits once per training snapshot and hands out the shared model.
///
/// The file is re-read and hashed on every `get`; a different hash refits.
pub struct ModelCache {
    path: PathBuf,
    spec: TrainingSpec,
    current: Mutex<Option<CachedModel>>,
}

impl ModelCache {
    pub fn new<P: AsRef<Path>>(path: P, spec: TrainingSpec) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            spec,
            current: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> &TrainingSpec {
        &self.spec
    }

    /// The model for the file's current contents
    pub fn get(&self) -> Result<Arc<FittedModel>> {
        let bytes = fs::read(&self.path)?;
        let key = fingerprint(&bytes);

        // a poisoned lock only means an earlier fit panicked; the slot is still usable
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = current.as_ref().filter(|c| c.fingerprint == key) {
            debug!(fingerprint = %key, "model cache hit");
            metrics::cache::hit();
            return Ok(Arc::clone(&cached.model));
        }

        metrics::cache::miss();
        let table = RawTable::from_reader(bytes.as_slice())?;
        let model = Arc::new(self.spec.fit(&table)?);
        info!(
            path = %self.path.display(),
            fingerprint = %key,
            observations = model.observations(),
            "fitted model for training snapshot"
        );
        *current = Some(CachedModel {
            fingerprint: key,
            model: Arc::clone(&model),
        });
        Ok(model)
    }

    /// Fingerprint of the snapshot behind the cached model, if any
    pub fn cached_fingerprint(&self) -> Option<String> {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.as_ref().map(|c| c.fingerprint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FitOptions;
    use std::fs;
    use tempfile::tempdir;

    fn spec() -> TrainingSpec {
        TrainingSpec {
            outcome: "y".to_string(),
            predictors: vec!["group".to_string()],
            excluded_races: Vec::new(),
            options: FitOptions::default(),
        }
    }

    fn csv(positives_in_b: usize) -> String {
        let mut out = String::from("group,y\n");
        for y in [1, 0, 0, 0] {
            out.push_str(&format!("a,{}\n", y));
        }
        for i in 0..4 {
            out.push_str(&format!("b,{}\n", usize::from(i < positives_in_b)));
        }
        out
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_reuses_model_until_file_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("regional.csv");
        fs::write(&path, csv(3)).unwrap();
        let cache = ModelCache::new(&path, spec());

        let first = cache.get().unwrap();
        let again = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        fs::write(&path, csv(2)).unwrap();
        let refit = cache.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &refit));
        assert_eq!(cache.cached_fingerprint(), Some(fingerprint(csv(2).as_bytes())));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let cache = ModelCache::new(dir.path().join("absent.csv"), spec());
        assert!(cache.get().is_err());
        assert_eq!(cache.cached_fingerprint(), None);
    }
}
