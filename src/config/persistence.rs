//! Results persistence module
//!
//! Writes the performance table CSV and keeps a rotating JSON history of
//! completed runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{PerformanceTable, RunRecord};
use crate::{FtdError, Result, APP_NAME, HISTORY_FILE, MAX_RESULTS_HISTORY};

/// Write the performance table as CSV, replacing any previous file
pub fn write_performance_table(table: &PerformanceTable, path: &Path) -> Result<()> {
    fs::write(path, table.to_csv()).map_err(|e| {
        FtdError::PersistenceError(format!(
            "Failed to write performance table {}: {}",
            path.display(),
            e
        ))
    })?;
    debug!("wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Run history manager
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// History file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    results: Vec<RunRecord>,
}

impl ResultsStorage {
    /// Storage at the standard history location
    pub fn new() -> Result<Self> {
        let results_path = Self::results_file_path()?;
        Ok(Self { results_path })
    }

    /// Storage backed by an explicit file
    pub fn with_path(results_path: PathBuf) -> Self {
        Self { results_path }
    }

    /// Get the standard history file path
    /// Uses $DATA_HOME/fill-the-drive/history.json
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            FtdError::PathError("Unable to determine data directory".to_string())
        })?;

        Ok(data_dir.join(APP_NAME).join(HISTORY_FILE))
    }

    /// Load all runs from the history file
    pub fn load_results(&self) -> Result<Vec<RunRecord>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            FtdError::PersistenceError(format!(
                "Failed to read history file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        let results_file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            FtdError::PersistenceError(format!(
                "Failed to parse history file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(results_file.results)
    }

    /// Append a run, keeping only the newest MAX_RESULTS_HISTORY entries
    pub fn append_result(&self, result: RunRecord) -> Result<()> {
        let mut results = self.load_results()?;
        results.push(result);

        if results.len() > MAX_RESULTS_HISTORY {
            let skip_count = results.len() - MAX_RESULTS_HISTORY;
            results.drain(..skip_count);
        }

        self.save_results(results)
    }

    fn save_results(&self, results: Vec<RunRecord>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FtdError::PathError(format!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let results_file = ResultsFile {
            version: 1,
            results,
        };
        let content = serde_json::to_string_pretty(&results_file)?;

        fs::write(&self.results_path, content).map_err(|e| {
            FtdError::PersistenceError(format!(
                "Failed to write history file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(())
    }
}
