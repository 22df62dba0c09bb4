//! Header-first delimited tables (metrics CSV, cluster-group TSV).
//!
//! Cells stay as the text that was read so that rewritten tables preserve
//! upstream formatting; numeric access parses on demand.

use csv::{ReaderBuilder, Terminator, WriterBuilder};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{FilterError, Result};

pub const CLUSTER_ID: &str = "cluster_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// File the table was read from; used in error messages.
    source: PathBuf,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(source: impl Into<PathBuf>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            source: source.into(),
            columns,
            rows,
        }
    }

    pub fn read(path: &Path, delimiter: Delimiter) -> Result<Self> {
        let file = File::open(path).map_err(|e| FilterError::io(path, e))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .from_reader(file);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| FilterError::csv(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| FilterError::csv(path, e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::new(path, columns, rows))
    }

    pub fn write(&self, path: &Path, delimiter: Delimiter) -> Result<()> {
        let file = File::create(path).map_err(|e| FilterError::io(path, e))?;
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter.as_byte())
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);

        writer
            .write_record(&self.columns)
            .map_err(|e| FilterError::csv(path, e))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| FilterError::csv(path, e))?;
        }
        writer
            .flush()
            .map_err(|e| FilterError::io(path, e))?;
        Ok(())
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| FilterError::schema(name, &self.source))
    }

    /// Cell text at `(row, col)`; short rows read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let idx = self.require_column(from)?;
        self.columns[idx] = to.to_string();
        Ok(())
    }

    /// Set `name` to `values`, replacing the column if it already exists.
    ///
    /// `values` must hold one entry per row.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if row.len() <= idx {
                        row.resize(idx + 1, String::new());
                    }
                    row[idx] = value;
                }
            }
            None => {
                let width = self.columns.len();
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.resize(width, String::new());
                    row.push(value);
                }
            }
        }
    }

    /// Parse the `cluster_id` column, rejecting duplicates.
    pub fn cluster_ids(&self) -> Result<Vec<u32>> {
        let col = self.require_column(CLUSTER_ID)?;
        let mut seen = HashSet::with_capacity(self.rows.len());
        let mut ids = Vec::with_capacity(self.rows.len());
        for row in 0..self.rows.len() {
            let raw = self.cell(row, col);
            let id = parse_cluster_id(raw).ok_or_else(|| FilterError::IncompleteMetrics {
                cluster_id: format!("row {}", row),
                field: CLUSTER_ID,
                value: raw.to_string(),
            })?;
            if !seen.insert(id) {
                return Err(FilterError::DuplicateCluster {
                    cluster_id: id,
                    path: self.source.clone(),
                });
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Inner join on `cluster_id`, keeping this table's row order.
    ///
    /// Non-key columns present on both sides are renamed with `_x` (left) and
    /// `_y` (right) suffixes, the dataframe merge convention used upstream.
    pub fn inner_join(&self, right: &Table) -> Result<Table> {
        let left_ids = self.cluster_ids()?;
        let right_ids = right.cluster_ids()?;
        let left_key = self.require_column(CLUSTER_ID)?;
        let right_key = right.require_column(CLUSTER_ID)?;

        let right_rows: HashMap<u32, usize> = right_ids
            .iter()
            .enumerate()
            .map(|(row, id)| (*id, row))
            .collect();

        let left_names: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let right_names: HashSet<&str> = right.columns.iter().map(String::as_str).collect();

        let mut columns = Vec::with_capacity(self.columns.len() + right.columns.len() - 1);
        for (idx, name) in self.columns.iter().enumerate() {
            if idx != left_key && right_names.contains(name.as_str()) {
                columns.push(format!("{}_x", name));
            } else {
                columns.push(name.clone());
            }
        }
        let right_cols: Vec<usize> = (0..right.columns.len()).filter(|c| *c != right_key).collect();
        for &idx in &right_cols {
            let name = &right.columns[idx];
            if left_names.contains(name.as_str()) {
                columns.push(format!("{}_y", name));
            } else {
                columns.push(name.clone());
            }
        }

        let mut rows = Vec::new();
        for (left_row, id) in left_ids.iter().enumerate() {
            let Some(&right_row) = right_rows.get(id) else {
                continue;
            };
            let mut row: Vec<String> = (0..self.columns.len())
                .map(|c| self.cell(left_row, c).to_string())
                .collect();
            row.extend(right_cols.iter().map(|&c| right.cell(right_row, c).to_string()));
            rows.push(row);
        }

        Ok(Table::new(self.source.clone(), columns, rows))
    }
}

/// Cluster ids are written as integers, but float-formatted ids (`12.0`)
/// appear when an upstream table was round-tripped through a float column.
pub fn parse_cluster_id(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<u32>() {
        return Some(id);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Parse a metric cell; empty and NaN cells are missing values.
pub fn parse_metric(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}
