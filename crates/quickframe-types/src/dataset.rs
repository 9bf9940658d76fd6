//! Tabular dataset handed to the analysis agent.
//!
//! Loading files into a [`Dataset`] happens elsewhere; this crate only
//! describes the already-parsed table and its schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Column data type, named after the conventional dataframe dtype spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "float64")]
    Float64,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "datetime64[ns]")]
    Datetime,
    /// Text or mixed values.
    #[serde(rename = "object")]
    Object,
}

impl ColumnType {
    /// The dtype name used in fingerprints and prompts.
    pub fn dtype_name(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Datetime => "datetime64[ns]",
            ColumnType::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Object)
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Shape and schema of a dataset, without any cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetShape {
    pub row_count: usize,
    pub column_names: Vec<String>,
    pub column_types: Vec<ColumnType>,
}

impl DatasetShape {
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }
}

/// Why a dataset's shape could not be determined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Row {row} has {actual} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// A parsed table: typed columns plus row-major cell values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names of int and float columns.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.dtype.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of text (object) columns.
    pub fn text_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.dtype.is_text())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Introspect row count and schema. Fails when a row's width disagrees with the header.
    pub fn shape(&self) -> Result<DatasetShape, ShapeError> {
        let expected = self.columns.len();
        if let Some((row, cells)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != expected)
        {
            return Err(ShapeError::RaggedRow {
                row,
                expected,
                actual: cells.len(),
            });
        }

        Ok(DatasetShape {
            row_count: self.rows.len(),
            column_names: self.columns.iter().map(|c| c.name.clone()).collect(),
            column_types: self.columns.iter().map(|c| c.dtype).collect(),
        })
    }
}
