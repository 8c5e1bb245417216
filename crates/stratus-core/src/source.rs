//! JSON Lines record source.
//!
//! Reads newline-delimited JSON objects from a single file or from every
//! `.jsonl` file in a directory. Each file is one unit of work, named by its
//! file name.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{KeySpec, Record};
use crate::traits::RecordSource;

/// File extension picked up when reading a directory.
pub const JSONL_EXTENSION: &str = "jsonl";

/// [`RecordSource`] over `.jsonl` files.
///
/// Lines that are blank are ignored. Lines that are not a JSON object, or
/// that lack a key field, are logged and skipped so one bad line does not
/// fail its whole file.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    key: KeySpec,
}

impl JsonLinesSource {
    /// Creates a source reading `path` and keying records with `key`.
    pub fn new(path: impl Into<PathBuf>, key: KeySpec) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn resolve(&self, unit: &str) -> Result<PathBuf, AppError> {
        let root = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| source_error(&self.path, e))?;

        if root.is_dir() {
            let candidate = self.path.join(unit);
            if Path::new(unit).components().count() != 1 || !is_file(&candidate).await {
                return Err(AppError::SourceError(format!(
                    "Unknown unit '{}' in {}",
                    unit,
                    self.path.display()
                )));
            }
            return Ok(candidate);
        }

        if unit_name(&self.path).as_deref() == Some(unit) {
            Ok(self.path.clone())
        } else {
            Err(AppError::SourceError(format!(
                "Unknown unit '{}' for {}",
                unit,
                self.path.display()
            )))
        }
    }

    /// Parses one file's contents into keyed records.
    pub fn parse(&self, unit: &str, content: &str) -> Vec<Record> {
        let mut records = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Map<String, Value> = match serde_json::from_str(line) {
                Ok(Value::Object(fields)) => fields,
                Ok(_) => {
                    warn!(unit, line = line_no, "Skipping line: not a JSON object");
                    continue;
                }
                Err(e) => {
                    warn!(unit, line = line_no, error = %e, "Skipping malformed line");
                    continue;
                }
            };

            match self.key.record(fields) {
                Ok(record) => records.push(record),
                Err(e) => warn!(unit, line = line_no, error = %e, "Skipping line without a usable key"),
            }
        }

        records
    }
}

fn unit_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file())
}

fn source_error(path: &Path, e: std::io::Error) -> AppError {
    AppError::SourceError(format!("{}: {}", path.display(), e))
}

impl RecordSource for JsonLinesSource {
    async fn list_units(&self) -> Result<Vec<String>, AppError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| source_error(&self.path, e))?;

        if !metadata.is_dir() {
            return Ok(unit_name(&self.path).into_iter().collect());
        }

        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .map_err(|e| source_error(&self.path, e))?;
        let mut units = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| source_error(&self.path, e))?
        {
            let path = entry.path();
            let is_jsonl = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(JSONL_EXTENSION));
            if is_jsonl && is_file(&path).await {
                units.extend(unit_name(&path));
            }
        }
        units.sort();

        debug!(path = %self.path.display(), units = units.len(), "Listed input files");
        Ok(units)
    }

    async fn fetch_records(&self, unit: &str) -> Result<Vec<Record>, AppError> {
        let path = self.resolve(unit).await?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| source_error(&path, e))?;
        Ok(self.parse(unit, &content))
    }
}
