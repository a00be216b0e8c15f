//! Query execution types.
//!
//! Defines the execution handle observed while a query runs and the tabular
//! shapes returned by the engine and handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{CdxError, Result};

/// Lifecycle state of a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Returns true once the engine will no longer change this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns the engine spelling of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses the engine spelling of a state.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status sample reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStatus {
    pub state: QueryState,
    pub data_scanned_bytes: Option<u64>,
    pub failure_reason: Option<String>,
}

impl ExecutionStatus {
    /// A status with no statistics and no failure reason.
    pub fn new(state: QueryState) -> Self {
        Self {
            state,
            data_scanned_bytes: None,
            failure_reason: None,
        }
    }
}

/// Handle for one submitted asynchronous query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecution {
    /// Opaque engine-assigned id.
    pub id: String,

    /// When the query was submitted.
    pub submitted_at: DateTime<Utc>,

    /// Last observed state.
    pub state: QueryState,

    /// Bytes scanned, once the engine reports it.
    pub data_scanned_bytes: Option<u64>,

    /// Engine diagnostic for failed or cancelled queries.
    pub failure_reason: Option<String>,
}

impl QueryExecution {
    /// Creates the handle for a freshly submitted query.
    pub fn submitted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            submitted_at: Utc::now(),
            state: QueryState::Queued,
            data_scanned_bytes: None,
            failure_reason: None,
        }
    }

    /// Returns the handle updated with an engine observation.
    ///
    /// Terminal handles are returned unchanged.
    pub fn observe(self, status: ExecutionStatus) -> Self {
        if self.state.is_terminal() {
            return self;
        }
        Self {
            state: status.state,
            data_scanned_bytes: status.data_scanned_bytes.or(self.data_scanned_bytes),
            failure_reason: status.failure_reason,
            ..self
        }
    }
}

/// A raw page of results as the engine returns it.
///
/// For `SELECT` statements the first row repeats the column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultPage {
    /// Builds a page whose first row is the header, as the engine does.
    pub fn with_header(columns: Vec<String>, data: Vec<Vec<Option<String>>>) -> Self {
        let header = columns.iter().cloned().map(Some).collect();
        let mut rows = Vec::with_capacity(data.len() + 1);
        rows.push(header);
        rows.extend(data);
        Self { columns, rows }
    }
}

/// Column-labelled rows read from a successful query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl ResultSet {
    /// Normalizes an engine page, dropping exactly one leading header row.
    ///
    /// Cells are matched to columns by position; missing or null cells
    /// become empty strings. Duplicate column names are rejected, since rows
    /// are keyed by name.
    pub fn from_page(page: ResultPage) -> Result<Self> {
        let ResultPage { columns, rows } = page;
        let mut seen = HashSet::with_capacity(columns.len());
        if let Some(duplicate) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(CdxError::engine(format!(
                "result has duplicate column '{duplicate}'"
            )));
        }
        let rows = rows
            .into_iter()
            .skip(1)
            .map(|row| {
                let mut cells = row.into_iter();
                columns
                    .iter()
                    .map(|column| {
                        let value = cells.next().flatten().unwrap_or_default();
                        (column.clone(), value)
                    })
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the value of `column` in the first row.
    pub fn first_value(&self, column: &str) -> Option<&str> {
        self.rows.first()?.get(column).map(String::as_str)
    }
}
