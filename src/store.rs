//! Durable run storage: one trace append per tool attempt, one summary
//! record per run.
//!
//! The file implementation keeps a directory per run with newline-delimited
//! JSON traces (easy to tail and inspect) next to the summary record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{RunRecord, TraceRecord};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Sink for per-attempt traces and the per-run summary
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Append one attempt trace
    async fn append_trace(&self, trace: &TraceRecord) -> Result<(), StoreError>;

    /// Write (or overwrite) the run's summary record
    async fn write_record(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Read back a run's summary record
    async fn load_record(&self, run_id: Uuid) -> Result<Option<RunRecord>, StoreError>;

    /// Read back all traces for a run, in append order
    async fn replay_traces(&self, run_id: Uuid) -> Result<Vec<TraceRecord>, StoreError>;
}

/// File-based store: `<root>/<run_id>/traces.jsonl` + `record.json`
pub struct FileRunStore {
    root: PathBuf,
}

impl FileRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    async fn ensure_run_dir(&self, run_id: Uuid) -> Result<PathBuf, StoreError> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn append_trace(&self, trace: &TraceRecord) -> Result<(), StoreError> {
        let dir = self.ensure_run_dir(trace.run_id).await?;
        let path = dir.join("traces.jsonl");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let json = serde_json::to_string(trace)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    async fn write_record(&self, record: &RunRecord) -> Result<(), StoreError> {
        let dir = self.ensure_run_dir(record.run_id).await?;
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(dir.join("record.json"), json).await?;
        Ok(())
    }

    async fn load_record(&self, run_id: Uuid) -> Result<Option<RunRecord>, StoreError> {
        let path = self.run_dir(run_id).join("record.json");
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn replay_traces(&self, run_id: Uuid) -> Result<Vec<TraceRecord>, StoreError> {
        let path = self.run_dir(run_id).join("traces.jsonl");
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut traces = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            traces.push(serde_json::from_str(&line)?);
        }

        Ok(traces)
    }
}

/// In-memory store for tests and throwaway runs
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    traces: Mutex<Vec<TraceRecord>>,
    records: Mutex<HashMap<Uuid, RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn append_trace(&self, trace: &TraceRecord) -> Result<(), StoreError> {
        self.traces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(trace.clone());
        Ok(())
    }

    async fn write_record(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.run_id, record.clone());
        Ok(())
    }

    async fn load_record(&self, run_id: Uuid) -> Result<Option<RunRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&run_id)
            .cloned())
    }

    async fn replay_traces(&self, run_id: Uuid) -> Result<Vec<TraceRecord>, StoreError> {
        Ok(self
            .traces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|t| t.run_id == run_id)
            .cloned()
            .collect())
    }
}
