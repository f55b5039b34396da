//! Amazon Redshift connector.
//!
//! Redshift speaks the Postgres protocol but lowercases result column names,
//! so `Date` comes back as `date`. The canonical `Date` spelling is restored
//! here before the table is built; author-written lowercase columns pass
//! through untouched.

use async_trait::async_trait;

use super::config::ConnectorConfig;
use super::connector::Connector;
use super::postgres::{run_postgres_protocol, PostgresConnector};
use crate::error::WbrResult;
use crate::models::frame::{DailyTable, DATE_COLUMN};

pub struct RedshiftConnector {
    inner: PostgresConnector,
}

impl RedshiftConnector {
    pub fn new(source_name: String, config: ConnectorConfig) -> WbrResult<Self> {
        Ok(Self {
            inner: PostgresConnector::new(source_name, config)?,
        })
    }
}

#[async_trait]
impl Connector for RedshiftConnector {
    async fn execute_query(&self, query: &str) -> WbrResult<DailyTable> {
        let (mut names, cells) = run_postgres_protocol(&self.inner, query).await?;
        if !names.iter().any(|n| n == DATE_COLUMN) {
            if let Some(name) = names.iter_mut().find(|n| n.eq_ignore_ascii_case(DATE_COLUMN)) {
                *name = DATE_COLUMN.to_string();
            }
        }
        DailyTable::from_cells(&names, cells)
    }
}
