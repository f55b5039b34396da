//! The `connections.yaml` model.
//!
//! ```yaml
//! version: 1.0
//! connections:
//!   - name: MyPg
//!     type: postgres
//!     config:
//!       host: db.internal
//!       port: 5432
//!       username: wbr
//!       password: secret
//!       database: metrics
//! ```
//!
//! When `config.service: aws` is present the remaining fields are read from
//! the named Secrets Manager secret (a JSON object) and merged over the
//! inline values.

use serde::Deserialize;

use crate::error::{WbrError, WbrResult};

/// The parsed connections file.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionsFile {
    #[serde(default)]
    pub version: Option<serde_yaml::Value>,
    pub connections: Vec<ConnectionEntry>,
}

impl ConnectionsFile {
    /// Parse the file and reject duplicate connection names.
    pub fn parse(text: &str) -> WbrResult<Self> {
        let file: ConnectionsFile = serde_yaml::from_str(text)
            .map_err(|e| WbrError::config("connections", format!("could not parse: {}", e)))?;
        for (index, entry) in file.connections.iter().enumerate() {
            if file.connections[..index]
                .iter()
                .any(|other| other.name == entry.name)
            {
                return Err(WbrError::config(
                    "connections",
                    format!("duplicate connection name '{}'", entry.name),
                ));
            }
        }
        Ok(file)
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionEntry> {
        self.connections.iter().find(|c| c.name == name)
    }
}

/// One declared connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConnectorType,
    pub config: ConnectorConfig,
}

/// Supported connector kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    Postgres,
    Redshift,
    Snowflake,
    Athena,
}

impl ConnectorType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Redshift => "redshift",
            Self::Snowflake => "snowflake",
            Self::Athena => "athena",
        }
    }
}

/// Connection parameters: the superset of what the four connector kinds
/// need. Each connector validates the fields it requires.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorConfig {
    /// `aws` to resolve the remaining fields from a secret.
    pub service: Option<String>,
    pub secret_name: Option<String>,

    // Postgres / Redshift
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,

    // Snowflake
    pub account: Option<String>,
    pub user: Option<String>,
    pub warehouse: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,

    // Athena
    pub region: Option<String>,
    pub s3_staging_dir: Option<String>,
    pub workgroup: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

impl ConnectorConfig {
    /// A required string field, or a connection error naming it.
    pub fn require<'a>(
        &self,
        value: &'a Option<String>,
        field: &str,
        source_name: &str,
    ) -> WbrResult<&'a str> {
        value.as_deref().ok_or_else(|| {
            WbrError::connection(
                source_name,
                format!("connection config is missing required field '{}'", field),
            )
        })
    }

    /// Merge a JSON secret over this config. String values fill the string
    /// fields; `port` additionally accepts numbers.
    pub fn apply_secret(&mut self, secret: &serde_json::Value) {
        let Some(object) = secret.as_object() else {
            return;
        };
        for (key, value) in object {
            let text = value.as_str().map(|s| s.to_string());
            match key.as_str() {
                "host" => self.host = text.or(self.host.take()),
                "port" => {
                    self.port = value
                        .as_u64()
                        .map(|v| v as u16)
                        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                        .or(self.port.take());
                }
                "username" => self.username = text.or(self.username.take()),
                "password" => self.password = text.or(self.password.take()),
                "database" => self.database = text.or(self.database.take()),
                "account" => self.account = text.or(self.account.take()),
                "user" => self.user = text.or(self.user.take()),
                "warehouse" => self.warehouse = text.or(self.warehouse.take()),
                "schema" => self.schema = text.or(self.schema.take()),
                "role" => self.role = text.or(self.role.take()),
                "region" => self.region = text.or(self.region.take()),
                "s3StagingDir" => self.s3_staging_dir = text.or(self.s3_staging_dir.take()),
                "workgroup" => self.workgroup = text.or(self.workgroup.take()),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: 1.0
connections:
  - name: MyPg
    type: postgres
    config:
      host: db.internal
      port: 5432
      username: wbr
      password: secret
      database: metrics
  - name: MySnow
    type: snowflake
    config:
      account: acme-xy12345
      user: wbr
      password: secret
      warehouse: REPORTING
      database: METRICS
  - name: MyAthena
    type: athena
    config:
      service: aws
      secretName: wbr/athena
      region: us-east-1
      s3StagingDir: s3://wbr-results/stage/
      database: metrics
"#;

    #[test]
    fn test_parse_connections() {
        let file = ConnectionsFile::parse(SAMPLE).unwrap();
        assert_eq!(file.connections.len(), 3);
        let pg = file.get("MyPg").unwrap();
        assert_eq!(pg.kind, ConnectorType::Postgres);
        assert_eq!(pg.config.port, Some(5432));
        let athena = file.get("MyAthena").unwrap();
        assert_eq!(athena.config.service.as_deref(), Some("aws"));
        assert_eq!(
            athena.config.s3_staging_dir.as_deref(),
            Some("s3://wbr-results/stage/")
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
connections:
  - name: A
    type: postgres
    config: {}
  - name: A
    type: snowflake
    config: {}
"#;
        assert!(ConnectionsFile::parse(text).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let text = r#"
connections:
  - name: A
    type: oracle
    config: {}
"#;
        assert!(ConnectionsFile::parse(text).is_err());
    }

    #[test]
    fn test_apply_secret_overrides() {
        let mut config = ConnectorConfig {
            host: Some("stale".into()),
            ..Default::default()
        };
        let secret = serde_json::json!({
            "host": "db.internal",
            "port": "5433",
            "username": "wbr",
            "password": "s3cr3t",
            "database": "metrics",
            "irrelevant": {"nested": true}
        });
        config.apply_secret(&secret);
        assert_eq!(config.host.as_deref(), Some("db.internal"));
        assert_eq!(config.port, Some(5433));
        assert_eq!(config.password.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_require_names_the_field() {
        let config = ConnectorConfig::default();
        let err = config
            .require(&config.host, "host", "MyPg")
            .unwrap_err()
            .to_string();
        assert!(err.contains("host"));
        assert!(err.contains("MyPg"));
    }
}
