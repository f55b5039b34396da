//! Database connectors.
//!
//! Every connector exposes the same capability, `execute_query -> DailyTable`,
//! and the factory dispatches on the connection type declared in
//! `connections.yaml`. Column-case quirks (Redshift lowercases, Snowflake
//! uppercases) are normalized inside the connector so the rest of the engine
//! always sees `Date` and author-supplied column names untouched.

pub mod config;
pub mod connector;
pub mod factory;

#[cfg(feature = "athena")]
pub mod athena;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod redshift;
#[cfg(feature = "aws-secrets")]
pub mod secrets;
pub mod snowflake;

pub use config::{ConnectionEntry, ConnectionsFile, ConnectorConfig, ConnectorType};
pub use connector::Connector;
pub use factory::ConnectorFactory;
