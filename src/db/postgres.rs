//! PostgreSQL connector.
//!
//! Executes the user-supplied query as-is; the query must alias its date
//! column as `"Date"`. The connection lives inside the call and is released
//! on every exit path, error paths included, because the client is dropped
//! when the call returns.

use async_trait::async_trait;
use tokio_postgres::types::Type;
use tokio_postgres::{NoTls, Row, Statement};
use tracing::{debug, info};

use super::config::ConnectorConfig;
use super::connector::Connector;
use crate::error::{WbrError, WbrResult};
use crate::models::frame::{DailyTable, RawCell};

pub struct PostgresConnector {
    source_name: String,
    config: ConnectorConfig,
}

impl PostgresConnector {
    pub fn new(source_name: String, config: ConnectorConfig) -> WbrResult<Self> {
        config.require(&config.host, "host", &source_name)?;
        config.require(&config.username, "username", &source_name)?;
        config.require(&config.database, "database", &source_name)?;
        Ok(Self {
            source_name,
            config,
        })
    }

    async fn run(&self, query: &str) -> WbrResult<(Vec<String>, Vec<Vec<RawCell>>)> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(self.config.host.as_deref().unwrap_or_default())
            .port(self.config.port.unwrap_or(5432))
            .user(self.config.username.as_deref().unwrap_or_default())
            .dbname(self.config.database.as_deref().unwrap_or_default());
        if let Some(password) = self.config.password.as_deref() {
            pg.password(password);
        }

        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            WbrError::connection(&self.source_name, format!("connect failed: {}", e))
        })?;
        let source = self.source_name.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(source = %source, error = %e, "postgres connection closed");
            }
        });

        let result = self.query_rows(&client, query).await;
        drop(client);
        driver.abort();
        result
    }

    async fn query_rows(
        &self,
        client: &tokio_postgres::Client,
        query: &str,
    ) -> WbrResult<(Vec<String>, Vec<Vec<RawCell>>)> {
        let statement = client.prepare(query).await.map_err(|e| {
            WbrError::connection(&self.source_name, format!("query failed to prepare: {}", e))
        })?;
        let rows = client.query(&statement, &[]).await.map_err(|e| {
            WbrError::connection(&self.source_name, format!("query failed: {}", e))
        })?;
        info!(source = %self.source_name, rows = rows.len(), "postgres query returned");

        let names: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let cells = rows
            .iter()
            .map(|row| self.row_to_cells(&statement, row))
            .collect::<WbrResult<Vec<_>>>()?;
        Ok((names, cells))
    }

    fn row_to_cells(&self, statement: &Statement, row: &Row) -> WbrResult<Vec<RawCell>> {
        statement
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| self.cell(row, idx, column.type_()))
            .collect()
    }

    fn cell(&self, row: &Row, idx: usize, ty: &Type) -> WbrResult<RawCell> {
        let get_err = |e: tokio_postgres::Error| {
            WbrError::connection(
                &self.source_name,
                format!("could not read column {}: {}", idx, e),
            )
        };
        let cell = if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .map_err(get_err)?
                .map(|v| RawCell::Number(v as f64))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .map_err(get_err)?
                .map(|v| RawCell::Number(v as f64))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)
                .map_err(get_err)?
                .map(|v| RawCell::Number(v as f64))
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)
                .map_err(get_err)?
                .map(|v| RawCell::Number(v as f64))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)
                .map_err(get_err)?
                .map(RawCell::Number)
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)
                .map_err(get_err)?
                .map(|v| RawCell::Number(if v { 1.0 } else { 0.0 }))
        } else if *ty == Type::DATE {
            row.try_get::<_, Option<chrono::NaiveDate>>(idx)
                .map_err(get_err)?
                .map(RawCell::Date)
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                .map_err(get_err)?
                .map(|v| RawCell::Date(v.date()))
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
            row.try_get::<_, Option<String>>(idx)
                .map_err(get_err)?
                .map(RawCell::Text)
        } else {
            return Err(WbrError::connection(
                &self.source_name,
                format!(
                    "column {} has unsupported type '{}'; cast it in the query \
                     (e.g. ::float8 or ::text)",
                    idx, ty
                ),
            ));
        };
        Ok(cell.unwrap_or(RawCell::Null))
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn execute_query(&self, query: &str) -> WbrResult<DailyTable> {
        let (names, cells) = self.run(query).await?;
        DailyTable::from_cells(&names, cells)
    }
}

/// Shared by the Redshift connector, which speaks the same protocol.
pub(super) async fn run_postgres_protocol(
    connector: &PostgresConnector,
    query: &str,
) -> WbrResult<(Vec<String>, Vec<Vec<RawCell>>)> {
    connector.run(query).await
}
