//! # vstab-results: Run Store
//!
//! Persists solver results keyed by run identifier, decoupling "what was
//! computed" from "what is displayed". Clients store a result once and
//! query it later by ID instead of holding solver objects in memory.
//!
//! Each run is one JSON document under the store root:
//!
//! ```text
//! <root>/<run-id>.json
//!   { "run_id": "...", "kind": "cpf", "payload": { ... } }
//! ```
//!
//! The payload is whatever serde-serializable result type the solver crate
//! produced; the store is agnostic to its schema and versions are carried
//! by the payload types themselves.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors from the run store.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("run '{0}' not found")]
    NotFound(String),
}

/// Envelope wrapping a stored payload.
#[derive(Debug, Serialize, Deserialize)]
struct RunEnvelope<T> {
    run_id: String,
    kind: String,
    payload: T,
}

/// Summary of one stored run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub kind: String,
    pub path: String,
}

/// Filesystem-backed store of solver runs.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ResultsError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store a payload under a fresh run ID; returns the ID.
    pub fn store<T: Serialize>(&self, kind: &str, payload: &T) -> Result<String, ResultsError> {
        let run_id = Uuid::new_v4().to_string();
        self.store_as(&run_id, kind, payload)?;
        Ok(run_id)
    }

    /// Store a payload under a caller-chosen run ID.
    pub fn store_as<T: Serialize>(
        &self,
        run_id: &str,
        kind: &str,
        payload: &T,
    ) -> Result<(), ResultsError> {
        let envelope = RunEnvelope {
            run_id: run_id.to_string(),
            kind: kind.to_string(),
            payload,
        };
        let text = serde_json::to_string_pretty(&envelope)?;
        fs::write(self.path_for(run_id), text)?;
        Ok(())
    }

    /// Load a run's payload by ID.
    pub fn query<T: DeserializeOwned>(&self, run_id: &str) -> Result<T, ResultsError> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Err(ResultsError::NotFound(run_id.to_string()));
        }
        let text = fs::read_to_string(path)?;
        let envelope: RunEnvelope<T> = serde_json::from_str(&text)?;
        Ok(envelope.payload)
    }

    /// List all stored runs.
    pub fn list(&self) -> Result<Vec<RunSummary>, ResultsError> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let text = fs::read_to_string(&path)?;
                if let Ok(envelope) = serde_json::from_str::<RunEnvelope<serde_json::Value>>(&text)
                {
                    runs.push(RunSummary {
                        run_id: envelope.run_id,
                        kind: envelope.kind,
                        path: path.display().to_string(),
                    });
                }
            }
        }
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(runs)
    }

    /// Delete a stored run.
    pub fn delete(&self, run_id: &str) -> Result<(), ResultsError> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Err(ResultsError::NotFound(run_id.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct FakeTrace {
        lams: Vec<f64>,
        converged: bool,
    }

    #[test]
    fn store_and_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();

        let trace = FakeTrace {
            lams: vec![0.0, 0.5, 1.0],
            converged: true,
        };
        let run_id = store.store("cpf", &trace).unwrap();
        let back: FakeTrace = store.query(&run_id).unwrap();
        assert_eq!(back, trace);
    }

    #[test]
    fn list_reports_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        store
            .store_as("run-a", "cpf", &FakeTrace { lams: vec![], converged: false })
            .unwrap();
        store
            .store_as("run-b", "pf", &FakeTrace { lams: vec![], converged: true })
            .unwrap();

        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "run-a");
        assert_eq!(runs[0].kind, "cpf");
        assert_eq!(runs[1].kind, "pf");
    }

    #[test]
    fn missing_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        let err = store.query::<FakeTrace>("nope").unwrap_err();
        assert!(matches!(err, ResultsError::NotFound(_)));
    }

    #[test]
    fn delete_removes_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        let run_id = store
            .store("cpf", &FakeTrace { lams: vec![1.0], converged: true })
            .unwrap();
        store.delete(&run_id).unwrap();
        assert!(store.query::<FakeTrace>(&run_id).is_err());
    }
}
