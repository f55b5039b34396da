//! WBR HTTP server binary.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin wbr-server --features http-server
//! ```
//!
//! # Environment Variables
//!
//! - `HOST`: bind host (default: 0.0.0.0)
//! - `PORT`: bind port (default: 8080)
//! - `WBR_TEST_SUITE_DIR`: scenario directory for /wbr-unit-test
//!   (default: tests/scenarios)
//! - `RUST_LOG`: log level (default: info)

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wbr_engine::http::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    info!("Starting WBR HTTP server");

    let suite_dir = env::var("WBR_TEST_SUITE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("tests/scenarios"));
    let state = AppState::new(suite_dir);
    let app = create_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
