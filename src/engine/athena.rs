//! Athena query engine implementation.
//!
//! Provides the `AthenaEngine` struct that implements the `QueryEngine` trait
//! using the AWS SDK.

use super::{ExecutionStatus, QueryEngine, QueryState, ResultPage};
use crate::error::{CdxError, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_athena::error::DisplayErrorContext;
use aws_sdk_athena::types::ResultConfiguration;
use aws_sdk_athena::Client;
use tracing::{debug, warn};

/// Largest page Athena returns from `GetQueryResults`.
const MAX_PAGE_SIZE: usize = 1000;

/// Athena-backed query engine bound to one workgroup.
#[derive(Debug, Clone)]
pub struct AthenaEngine {
    client: Client,
    workgroup: String,
}

impl AthenaEngine {
    /// Creates an engine from a loaded AWS SDK configuration.
    pub fn new(sdk_config: &SdkConfig, workgroup: impl Into<String>) -> Self {
        Self {
            client: Client::new(sdk_config),
            workgroup: workgroup.into(),
        }
    }
}

#[async_trait]
impl QueryEngine for AthenaEngine {
    async fn start_execution(&self, sql: &str, output_location: &str) -> Result<String> {
        debug!("Submitting to workgroup {}:\n{}", self.workgroup, sql);

        let output = self
            .client
            .start_query_execution()
            .query_string(sql)
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(output_location)
                    .build(),
            )
            .work_group(&self.workgroup)
            .send()
            .await
            .map_err(|e| CdxError::submission(DisplayErrorContext(&e).to_string()))?;

        output
            .query_execution_id()
            .map(String::from)
            .ok_or_else(|| CdxError::submission("Athena returned no QueryExecutionId"))
    }

    async fn get_execution_status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| {
                CdxError::engine(format!(
                    "GetQueryExecution {execution_id}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let execution = output.query_execution().ok_or_else(|| {
            CdxError::engine(format!("No execution details for {execution_id}"))
        })?;
        let status = execution.status();

        let state = match status.and_then(|s| s.state()) {
            None => QueryState::Queued,
            Some(state) => QueryState::parse(state.as_str()).unwrap_or_else(|| {
                warn!("Unrecognized Athena state {:?}, treating as running", state);
                QueryState::Running
            }),
        };

        Ok(ExecutionStatus {
            state,
            data_scanned_bytes: execution
                .statistics()
                .and_then(|s| s.data_scanned_in_bytes())
                .map(|b| b.max(0) as u64),
            failure_reason: status
                .and_then(|s| s.state_change_reason())
                .map(String::from),
        })
    }

    async fn get_results(&self, execution_id: &str, page_size: usize) -> Result<ResultPage> {
        let output = self
            .client
            .get_query_results()
            .query_execution_id(execution_id)
            .max_results(page_size.clamp(1, MAX_PAGE_SIZE) as i32)
            .send()
            .await
            .map_err(|e| {
                CdxError::engine(format!(
                    "GetQueryResults {execution_id}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let Some(result_set) = output.result_set() else {
            return Ok(ResultPage::default());
        };

        let columns = result_set
            .result_set_metadata()
            .map(|m| {
                m.column_info()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let rows = result_set
            .rows()
            .iter()
            .map(|row| {
                row.data()
                    .iter()
                    .map(|d| d.var_char_value().map(String::from))
                    .collect()
            })
            .collect();

        Ok(ResultPage { columns, rows })
    }
}
