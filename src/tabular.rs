//! Tabular-source collaborator: sheets of header + string rows.
//!
//! Precise format rules are out of scope for the pipeline; ingest only sees
//! [`Workbook`] values. The bundled loader reads a CSV file into a
//! single-sheet workbook named after the file stem. Rows shorter than the
//! header are padded with empty cells so downstream indexing never slices
//! past the end.

use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    /// First row with at least one non-empty cell, for prompt samples.
    pub fn sample_row(&self) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|row| row.as_slice())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    /// Source file name, recorded on every case's provenance.
    pub file_name: String,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Load a CSV file as a one-sheet workbook.
    pub fn load_csv(path: &Path) -> Result<Workbook> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let sheet_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Sheet1".to_string());

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("open {}", path.display()))?;
        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("read headers of {}", path.display()))?
            .iter()
            .map(|cell| cell.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("read row of {}", path.display()))?;
            let mut row: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
            rows.push(row);
        }

        Ok(Workbook {
            file_name,
            sheets: vec![Sheet {
                name: sheet_name,
                headers,
                rows,
            }],
        })
    }
}
