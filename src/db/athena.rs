//! Amazon Athena connector.
//!
//! Athena is asynchronous: start a query execution, poll the execution id
//! until it leaves the running states, then page through the results. The
//! poll interval and the overall client-side timeout are bounded by config
//! (`pollIntervalSeconds`, default 1; `timeoutSeconds`, default 300).
//! `s3StagingDir` is required.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use tracing::info;

use super::config::ConnectorConfig;
use super::connector::Connector;
use crate::error::{WbrError, WbrResult};
use crate::models::frame::{DailyTable, RawCell};

const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 1;
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

pub struct AthenaConnector {
    source_name: String,
    config: ConnectorConfig,
}

impl AthenaConnector {
    pub fn new(source_name: String, config: ConnectorConfig) -> WbrResult<Self> {
        config.require(&config.region, "region", &source_name)?;
        config.require(&config.s3_staging_dir, "s3StagingDir", &source_name)?;
        config.require(&config.database, "database", &source_name)?;
        Ok(Self {
            source_name,
            config,
        })
    }

    async fn client(&self) -> aws_sdk_athena::Client {
        let region = aws_config::Region::new(
            self.config.region.clone().unwrap_or_default(),
        );
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        aws_sdk_athena::Client::new(&shared)
    }

    async fn wait_for_completion(
        &self,
        client: &aws_sdk_athena::Client,
        execution_id: &str,
    ) -> WbrResult<()> {
        let poll_interval = Duration::from_secs(
            self.config
                .poll_interval_seconds
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
        );
        let timeout = Duration::from_secs(
            self.config
                .timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        );
        let started = std::time::Instant::now();

        loop {
            let response = client
                .get_query_execution()
                .query_execution_id(execution_id)
                .send()
                .await
                .map_err(|e| {
                    WbrError::connection(
                        &self.source_name,
                        format!("could not check query status: {}", e),
                    )
                })?;

            let status = response
                .query_execution()
                .and_then(|q| q.status())
                .ok_or_else(|| {
                    WbrError::connection(&self.source_name, "query status missing from response")
                })?;

            match status.state() {
                Some(QueryExecutionState::Succeeded) => return Ok(()),
                Some(QueryExecutionState::Failed) => {
                    let reason = status
                        .state_change_reason()
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(WbrError::connection(
                        &self.source_name,
                        format!("Athena query {} failed: {}", execution_id, reason),
                    ));
                }
                Some(QueryExecutionState::Cancelled) => {
                    return Err(WbrError::connection(
                        &self.source_name,
                        format!("Athena query {} was cancelled", execution_id),
                    ));
                }
                _ => {}
            }

            if started.elapsed() > timeout {
                return Err(WbrError::connection(
                    &self.source_name,
                    format!(
                        "Athena query {} did not complete within {}s",
                        execution_id,
                        timeout.as_secs()
                    ),
                ));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn fetch_results(
        &self,
        client: &aws_sdk_athena::Client,
        execution_id: &str,
    ) -> WbrResult<(Vec<String>, Vec<Vec<RawCell>>)> {
        let mut names: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<RawCell>> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut first_page = true;

        loop {
            let mut request = client
                .get_query_results()
                .query_execution_id(execution_id)
                .max_results(1000);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let response = request.send().await.map_err(|e| {
                WbrError::connection(
                    &self.source_name,
                    format!("could not fetch query results: {}", e),
                )
            })?;

            if let Some(result_set) = response.result_set() {
                if names.is_empty() {
                    if let Some(metadata) = result_set.result_set_metadata() {
                        names = metadata
                            .column_info()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect();
                    }
                }
                for (index, row) in result_set.rows().iter().enumerate() {
                    let cells: Vec<RawCell> = row
                        .data()
                        .iter()
                        .map(|datum| match datum.var_char_value() {
                            Some(text) => RawCell::Text(text.to_string()),
                            None => RawCell::Null,
                        })
                        .collect();
                    // Athena repeats the header as the first data row.
                    if first_page && index == 0 && is_header_row(&cells, &names) {
                        continue;
                    }
                    rows.push(cells);
                }
            }

            next_token = response.next_token().map(|t| t.to_string());
            first_page = false;
            if next_token.is_none() {
                break;
            }
        }

        Ok((names, rows))
    }
}

fn is_header_row(cells: &[RawCell], names: &[String]) -> bool {
    cells.len() == names.len()
        && cells
            .iter()
            .zip(names.iter())
            .all(|(cell, name)| matches!(cell, RawCell::Text(t) if t == name))
}

#[async_trait]
impl Connector for AthenaConnector {
    async fn execute_query(&self, query: &str) -> WbrResult<DailyTable> {
        let client = self.client().await;

        let start = client
            .start_query_execution()
            .query_string(query)
            .query_execution_context(
                QueryExecutionContext::builder()
                    .database(self.config.database.clone().unwrap_or_default())
                    .build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(self.config.s3_staging_dir.clone().unwrap_or_default())
                    .build(),
            )
            .set_work_group(self.config.workgroup.clone())
            .send()
            .await
            .map_err(|e| {
                WbrError::connection(
                    &self.source_name,
                    format!("could not start Athena query: {}", e),
                )
            })?;

        let execution_id = start
            .query_execution_id()
            .ok_or_else(|| {
                WbrError::connection(&self.source_name, "Athena returned no query execution id")
            })?
            .to_string();
        info!(source = %self.source_name, execution_id = %execution_id, "athena query started");

        self.wait_for_completion(&client, &execution_id).await?;
        let (names, rows) = self.fetch_results(&client, &execution_id).await?;
        info!(source = %self.source_name, rows = rows.len(), "athena query returned");

        DailyTable::from_cells(&names, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_staging_dir() {
        let config = ConnectorConfig {
            region: Some("us-east-1".into()),
            database: Some("metrics".into()),
            ..Default::default()
        };
        let err = AthenaConnector::new("MyAthena".into(), config).unwrap_err();
        assert!(err.to_string().contains("s3StagingDir"));
    }

    #[test]
    fn test_is_header_row() {
        let names = vec!["Date".to_string(), "Views".to_string()];
        let header = vec![RawCell::Text("Date".into()), RawCell::Text("Views".into())];
        let data = vec![
            RawCell::Text("2021-09-01".into()),
            RawCell::Text("100".into()),
        ];
        assert!(is_header_row(&header, &names));
        assert!(!is_header_row(&data, &names));
    }
}
