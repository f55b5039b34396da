//! Connection credential lookup from AWS Secrets Manager.
//!
//! A connection whose config carries `service: aws` names a secret holding a
//! JSON object; its fields are merged over the inline config before the
//! connector is built. Secret values stay inside the connector config and
//! never appear in errors or logs.

use tracing::info;

use crate::error::{WbrError, WbrResult};

/// Fetch and parse the named secret as a JSON object.
pub async fn fetch_secret_json(
    secret_name: &str,
    region: Option<&str>,
) -> WbrResult<serde_json::Value> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    let shared = loader.load().await;
    let client = aws_sdk_secretsmanager::Client::new(&shared);

    let response = client
        .get_secret_value()
        .secret_id(secret_name)
        .send()
        .await
        .map_err(|e| {
            WbrError::connection(
                secret_name,
                format!("could not fetch secret: {}", e),
            )
        })?;

    let text = response.secret_string().ok_or_else(|| {
        WbrError::connection(secret_name, "secret has no string payload")
    })?;
    info!(secret = secret_name, "resolved connection secret");

    serde_json::from_str(text).map_err(|_| {
        WbrError::connection(secret_name, "secret payload is not valid JSON")
    })
}
