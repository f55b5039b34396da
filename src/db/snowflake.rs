//! Snowflake connector.
//!
//! Talks the driver REST protocol with reqwest: a login request exchanges
//! user/password for a session token, then a query request executes the SQL
//! and returns `rowtype`/`rowset` JSON. Snowflake uppercases result column
//! names, so `DATE` is re-canonicalized to `Date` before the table is built.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::config::ConnectorConfig;
use super::connector::Connector;
use crate::error::{WbrError, WbrResult};
use crate::models::frame::{DailyTable, RawCell, DATE_COLUMN};

pub struct SnowflakeConnector {
    source_name: String,
    config: ConnectorConfig,
    client: reqwest::Client,
}

impl SnowflakeConnector {
    pub fn new(source_name: String, config: ConnectorConfig) -> WbrResult<Self> {
        config.require(&config.account, "account", &source_name)?;
        config.require(&config.user, "user", &source_name)?;
        config.require(&config.password, "password", &source_name)?;
        Ok(Self {
            source_name,
            config,
            client: reqwest::Client::new(),
        })
    }

    fn base_url(&self) -> String {
        format!(
            "https://{}.snowflakecomputing.com",
            self.config.account.as_deref().unwrap_or_default()
        )
    }

    async fn login(&self) -> WbrResult<String> {
        let url = format!("{}/session/v1/login-request", self.base_url());
        let body = json!({
            "data": {
                "ACCOUNT_NAME": self.config.account,
                "LOGIN_NAME": self.config.user,
                "PASSWORD": self.config.password,
                "CLIENT_APP_ID": "wbr-engine",
                "SESSION_PARAMETERS": {},
            }
        });
        let response: serde_json::Value = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WbrError::connection(&self.source_name, format!("login failed: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                WbrError::connection(&self.source_name, format!("login response invalid: {}", e))
            })?;

        if response["success"].as_bool() != Some(true) {
            let message = response["message"].as_str().unwrap_or("unknown error");
            return Err(WbrError::connection(
                &self.source_name,
                format!("login rejected: {}", message),
            ));
        }
        response["data"]["token"]
            .as_str()
            .map(|t| t.to_string())
            .ok_or_else(|| {
                WbrError::connection(&self.source_name, "login response carried no token")
            })
    }

    /// Prefix the query with `USE` statements so warehouse/database/schema/
    /// role context applies to the session that executes it.
    fn context_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(role) = &self.config.role {
            statements.push(format!("USE ROLE {}", role));
        }
        if let Some(warehouse) = &self.config.warehouse {
            statements.push(format!("USE WAREHOUSE {}", warehouse));
        }
        if let Some(database) = &self.config.database {
            statements.push(format!("USE DATABASE {}", database));
        }
        if let Some(schema) = &self.config.schema {
            statements.push(format!("USE SCHEMA {}", schema));
        }
        statements
    }

    async fn run_statement(
        &self,
        token: &str,
        sql: &str,
        sequence_id: u64,
    ) -> WbrResult<serde_json::Value> {
        let url = format!("{}/queries/v1/query-request", self.base_url());
        let body = json!({ "sqlText": sql, "sequenceId": sequence_id });
        let response: serde_json::Value = self
            .client
            .post(&url)
            .header("Authorization", format!("Snowflake Token=\"{}\"", token))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WbrError::connection(&self.source_name, format!("query failed: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                WbrError::connection(&self.source_name, format!("query response invalid: {}", e))
            })?;

        if response["success"].as_bool() != Some(true) {
            let message = response["message"].as_str().unwrap_or("unknown error");
            return Err(WbrError::connection(
                &self.source_name,
                format!("query rejected: {}", message),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl Connector for SnowflakeConnector {
    async fn execute_query(&self, query: &str) -> WbrResult<DailyTable> {
        let token = self.login().await?;

        let mut sequence_id = 1;
        for statement in self.context_statements() {
            self.run_statement(&token, &statement, sequence_id).await?;
            sequence_id += 1;
        }
        let response = self.run_statement(&token, query, sequence_id).await?;

        let data = &response["data"];
        let mut names: Vec<String> = data["rowtype"]
            .as_array()
            .map(|cols| {
                cols.iter()
                    .map(|c| c["name"].as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default();
        // Snowflake uppercases unquoted identifiers; restore the canonical
        // Date spelling when the exact form is absent.
        if !names.iter().any(|n| n == DATE_COLUMN) {
            if let Some(name) = names.iter_mut().find(|n| n.eq_ignore_ascii_case(DATE_COLUMN)) {
                *name = DATE_COLUMN.to_string();
            }
        }

        let rows: Vec<Vec<RawCell>> = data["rowset"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(json_to_cell).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        info!(source = %self.source_name, rows = rows.len(), "snowflake query returned");

        DailyTable::from_cells(&names, rows)
    }
}

fn json_to_cell(value: &serde_json::Value) -> RawCell {
    match value {
        serde_json::Value::Null => RawCell::Null,
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(RawCell::Number)
            .unwrap_or(RawCell::Null),
        serde_json::Value::Bool(b) => RawCell::Number(if *b { 1.0 } else { 0.0 }),
        serde_json::Value::String(s) => RawCell::Text(s.clone()),
        other => RawCell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_credentials() {
        let err = SnowflakeConnector::new("MySnow".into(), ConnectorConfig::default());
        assert!(err.is_err());

        let config = ConnectorConfig {
            account: Some("acme-xy12345".into()),
            user: Some("wbr".into()),
            password: Some("secret".into()),
            ..Default::default()
        };
        assert!(SnowflakeConnector::new("MySnow".into(), config).is_ok());
    }

    #[test]
    fn test_context_statements_order() {
        let config = ConnectorConfig {
            account: Some("a".into()),
            user: Some("u".into()),
            password: Some("p".into()),
            warehouse: Some("REPORTING".into()),
            database: Some("METRICS".into()),
            schema: Some("PUBLIC".into()),
            role: Some("ANALYST".into()),
            ..Default::default()
        };
        let connector = SnowflakeConnector::new("MySnow".into(), config).unwrap();
        let statements = connector.context_statements();
        assert_eq!(
            statements,
            vec![
                "USE ROLE ANALYST",
                "USE WAREHOUSE REPORTING",
                "USE DATABASE METRICS",
                "USE SCHEMA PUBLIC",
            ]
        );
    }

    #[test]
    fn test_json_to_cell() {
        assert_eq!(json_to_cell(&serde_json::json!(null)), RawCell::Null);
        assert_eq!(json_to_cell(&serde_json::json!(2.5)), RawCell::Number(2.5));
        assert_eq!(
            json_to_cell(&serde_json::json!("2021-09-25")),
            RawCell::Text("2021-09-25".into())
        );
        assert_eq!(json_to_cell(&serde_json::json!(true)), RawCell::Number(1.0));
    }
}
