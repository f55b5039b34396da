//! Connector factory: dispatches on the connection type declared in
//! `connections.yaml` and resolves secret-backed credentials first.

use super::config::{ConnectionEntry, ConnectorType};
use super::connector::Connector;
use crate::error::{WbrError, WbrResult};

/// Factory for building connector instances from connection entries.
pub struct ConnectorFactory;

impl ConnectorFactory {
    /// Build the connector for a connection entry.
    ///
    /// Drivers are feature-gated; asking for a connector whose feature is
    /// disabled is a connection error, not a compile-time surprise for the
    /// caller.
    #[allow(unused_mut)]
    pub async fn create(entry: &ConnectionEntry) -> WbrResult<Box<dyn Connector>> {
        let mut config = entry.config.clone();

        if config.service.as_deref() == Some("aws") {
            #[cfg(feature = "aws-secrets")]
            {
                let secret_name = config.secret_name.clone().ok_or_else(|| {
                    WbrError::connection(
                        &entry.name,
                        "connection config is missing required field 'secretName'",
                    )
                })?;
                let secret =
                    super::secrets::fetch_secret_json(&secret_name, config.region.as_deref())
                        .await?;
                config.apply_secret(&secret);
            }
            #[cfg(not(feature = "aws-secrets"))]
            {
                return Err(WbrError::connection(
                    &entry.name,
                    "secret-backed connections require the 'aws-secrets' feature",
                ));
            }
        }

        match entry.kind {
            ConnectorType::Postgres => {
                #[cfg(feature = "postgres")]
                {
                    Ok(Box::new(super::postgres::PostgresConnector::new(
                        entry.name.clone(),
                        config,
                    )?))
                }
                #[cfg(not(feature = "postgres"))]
                {
                    Err(WbrError::connection(
                        &entry.name,
                        "postgres connections require the 'postgres' feature",
                    ))
                }
            }
            ConnectorType::Redshift => {
                #[cfg(feature = "postgres")]
                {
                    Ok(Box::new(super::redshift::RedshiftConnector::new(
                        entry.name.clone(),
                        config,
                    )?))
                }
                #[cfg(not(feature = "postgres"))]
                {
                    Err(WbrError::connection(
                        &entry.name,
                        "redshift connections require the 'postgres' feature",
                    ))
                }
            }
            ConnectorType::Snowflake => Ok(Box::new(super::snowflake::SnowflakeConnector::new(
                entry.name.clone(),
                config,
            )?)),
            ConnectorType::Athena => {
                #[cfg(feature = "athena")]
                {
                    Ok(Box::new(super::athena::AthenaConnector::new(
                        entry.name.clone(),
                        config,
                    )?))
                }
                #[cfg(not(feature = "athena"))]
                {
                    Err(WbrError::connection(
                        &entry.name,
                        "athena connections require the 'athena' feature",
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config::ConnectionsFile;

    #[tokio::test]
    async fn test_snowflake_connector_is_always_available() {
        let file = ConnectionsFile::parse(
            r#"
connections:
  - name: MySnow
    type: snowflake
    config:
      account: acme-xy12345
      user: wbr
      password: secret
"#,
        )
        .unwrap();
        let entry = file.get("MySnow").unwrap();
        assert!(ConnectorFactory::create(entry).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_fast() {
        let file = ConnectionsFile::parse(
            r#"
connections:
  - name: MySnow
    type: snowflake
    config: {}
"#,
        )
        .unwrap();
        let entry = file.get("MySnow").unwrap();
        let err = ConnectorFactory::create(entry).await.unwrap_err();
        assert_eq!(err.kind(), "connection");
    }
}
