use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::utils::resolve_input_to_files;
use crate::document::{Metadata, MetadataValue};
use crate::loader::LoaderError;

/// One row of a nutrition table, keyed by column header. Empty cells are absent.
pub type NutritionRow = Metadata;

/// A builder for constructing a `NutritionTableLoader`.
///
/// It takes a list of glob patterns that get resolved to CSV files on every load.
pub struct NutritionTableLoaderBuilder {
    glob_patterns: Vec<String>,
    delimiter: u8,
}

impl NutritionTableLoaderBuilder {
    /// Creates a new `NutritionTableLoaderBuilder` instance.
    ///
    /// # Arguments
    /// * `glob_patterns` - glob patterns of the CSV files (or directories) to load.
    ///
    /// # Errors
    /// Fails if any pattern is not a valid glob pattern.
    pub fn new(glob_patterns: Vec<String>) -> Result<Self, LoaderError> {
        for pattern in &glob_patterns {
            Pattern::new(pattern)?;
        }
        Ok(Self {
            glob_patterns,
            delimiter: b',',
        })
    }

    /// Field delimiter, `,` by default
    #[must_use]
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn build(self) -> NutritionTableLoader {
        NutritionTableLoader {
            glob_patterns: self.glob_patterns,
            delimiter: self.delimiter,
        }
    }
}

/// Reads nutrition facts rows out of CSV files.
///
/// Rows from all matched files are concatenated in file order, so a row's
/// position in the returned vector is its table-wide row index. A row that
/// cannot be decoded is kept as an empty row, which downstream processing
/// skips, so indices stay aligned with the files.
#[derive(Debug, Clone)]
pub struct NutritionTableLoader {
    glob_patterns: Vec<String>,
    delimiter: u8,
}

impl NutritionTableLoader {
    pub fn builder(glob_patterns: Vec<String>) -> Result<NutritionTableLoaderBuilder, LoaderError> {
        NutritionTableLoaderBuilder::new(glob_patterns)
    }

    /// Loads every row; unreadable files are logged and skipped.
    pub async fn load(&self) -> Vec<NutritionRow> {
        let loader = self.clone();
        match tokio::task::spawn_blocking(move || loader.load_blocking()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "nutrition table load task failed");
                vec![]
            }
        }
    }

    fn load_blocking(&self) -> Vec<NutritionRow> {
        let files = resolve_input_to_files(&self.glob_patterns);
        let mut rows = vec![];
        for file in &files {
            match read_table_file(file, self.delimiter) {
                Ok(file_rows) => rows.extend(file_rows),
                Err(e) => warn!(error = %e, "skipping nutrition table"),
            }
        }
        info!(files = files.len(), rows = rows.len(), "loaded nutrition tables");
        rows
    }
}

fn read_table_file(path: &Path, delimiter: u8) -> Result<Vec<NutritionRow>, LoaderError> {
    let table_error = |reason: String| LoaderError::Table {
        path: path.display().to_string(),
        reason,
    };
    let file = std::fs::File::open(path).map_err(|e| table_error(e.to_string()))?;
    parse_rows(file, delimiter).map_err(|e| table_error(e.to_string()))
}

/// Parses CSV with a header row into nutrition rows.
///
/// # Errors
/// Fails only if the header row cannot be read.
pub fn parse_rows<R: io::Read>(reader: R, delimiter: u8) -> Result<Vec<NutritionRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = vec![];
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(row = index, error = %e, "undecodable nutrition row");
                rows.push(NutritionRow::new());
                continue;
            }
        };
        let row = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .filter_map(|(header, cell)| {
                MetadataValue::parse_cell(cell).map(|value| (header.clone(), value))
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

impl From<PathBuf> for NutritionTableLoader {
    fn from(path: PathBuf) -> Self {
        Self {
            glob_patterns: vec![path.to_string_lossy().to_string()],
            delimiter: b',',
        }
    }
}
