//! Row-major numeric table read from feature CSV files

use pte_core::{PteError, PteResult};
use std::fs;
use std::path::Path;

/// Named columns of `f64` values, stored row by row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

fn is_index_header(name: &str) -> bool {
    name.is_empty() || name.starts_with("Unnamed: ")
}

fn parse_cell(cell: &str) -> PteResult<f64> {
    let cell = cell.trim();
    match cell {
        "" => Ok(f64::NAN),
        "True" | "true" => Ok(1.0),
        "False" | "false" => Ok(0.0),
        _ if cell.eq_ignore_ascii_case("nan") => Ok(f64::NAN),
        _ => cell.parse::<f64>().map_err(|_| PteError::FormatError {
            reason: format!("'{}' is not a number", cell),
        }),
    }
}

/// Format a value the way the written CSVs expect (NaN as an empty cell)
pub(crate) fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

impl FeatureTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> PteResult<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(PteError::DimensionMismatch {
                what: "table row length",
                expected: columns.len(),
                actual: bad.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Build a table from named columns of equal length
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> PteResult<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        if let Some((name, bad)) = columns.iter().find(|(_, c)| c.len() != n_rows) {
            return Err(PteError::InvalidSignalData {
                reason: format!("Column '{}' has {} rows, expected {}", name, bad.len(), n_rows),
            });
        }
        let rows = (0..n_rows)
            .map(|i| columns.iter().map(|(_, c)| c[i]).collect())
            .collect();
        Ok(Self {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            rows,
        })
    }

    /// Read a CSV file with a header row, dropping a leading unnamed index column
    pub fn read_csv(path: impl AsRef<Path>) -> PteResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PteError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
        let format_error = |e: csv::Error| PteError::FormatError {
            reason: format!("{}: {}", path.display(), e),
        };

        let headers: Vec<String> = reader.headers().map_err(format_error)?.iter().map(str::to_string).collect();
        let skip = usize::from(headers.first().map(|h| is_index_header(h)).unwrap_or(false));
        let columns = headers[skip..].to_vec();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(format_error)?;
            let row = record
                .iter()
                .skip(skip)
                .map(parse_cell)
                .collect::<PteResult<Vec<_>>>()
                .map_err(|e| PteError::FormatError {
                    reason: format!("{} row {}: {}", path.display(), line + 1, e),
                })?;
            rows.push(row);
        }
        Self::new(columns, rows)
    }

    /// Write as CSV with a leading index column, optionally appending one extra column
    pub fn write_csv(&self, path: impl AsRef<Path>, extra_column: Option<(&str, &[f64])>) -> PteResult<()> {
        let path = path.as_ref();
        if let Some((name, values)) = extra_column {
            if values.len() != self.n_rows() {
                return Err(PteError::DimensionMismatch {
                    what: "extra column length",
                    expected: self.n_rows(),
                    actual: values.len(),
                });
            }
            tracing::trace!(column = name, "Appending column on write");
        }

        let mut writer = csv::Writer::from_path(path).map_err(|e| PteError::FormatError {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let write_error = |e: csv::Error| PteError::FormatError {
            reason: format!("{}: {}", path.display(), e),
        };

        let mut header = Vec::with_capacity(self.columns.len() + 2);
        header.push(String::new());
        header.extend(self.columns.iter().cloned());
        if let Some((name, _)) = extra_column {
            header.push(name.to_string());
        }
        writer.write_record(&header).map_err(write_error)?;

        for (i, row) in self.rows.iter().enumerate() {
            let mut record = Vec::with_capacity(header.len());
            record.push(i.to_string());
            record.extend(row.iter().map(|v| format_value(*v)));
            if let Some((_, values)) = extra_column {
                record.push(format_value(values[i]));
            }
            writer.write_record(&record).map_err(write_error)?;
        }
        writer.flush().map_err(|e| PteError::io(path, e))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    fn column_index(&self, name: &str) -> PteResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PteError::MissingColumn {
                column: name.to_string(),
                source: "feature table".to_string(),
            })
    }

    /// Values of one column
    pub fn column(&self, name: &str) -> PteResult<Vec<f64>> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index]).collect())
    }

    /// Names of the columns containing `pattern`
    pub fn columns_containing(&self, pattern: &str) -> Vec<String> {
        self.columns.iter().filter(|c| c.contains(pattern)).cloned().collect()
    }

    /// Table restricted to the given columns, in the given order
    pub fn select(&self, columns: &[String]) -> PteResult<FeatureTable> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<PteResult<Vec<_>>>()?;
        Ok(FeatureTable {
            columns: columns.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i]).collect())
                .collect(),
        })
    }

    /// Table restricted to the given rows, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            columns: self.columns.clone(),
            rows: indices.iter().filter_map(|&i| self.rows.get(i).cloned()).collect(),
        }
    }

    /// Consume the table into its rows
    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}
