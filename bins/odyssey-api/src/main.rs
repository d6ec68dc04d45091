mod auth;
mod error;
mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use odyssey_common::config::Config;
use odyssey_grading::Platform;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::auth::{AuthProvider, GatewayAuth};

pub struct AppState {
    pub platform: Platform,
    pub auth: Arc<dyn AuthProvider>,
    pub history_page_size: usize,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Odyssey API booting...");

    let config = Config::from_env();
    let platform = Platform::connect(&config)
        .await
        .with_context(|| format!("Failed to open backends at {}", config.redis_url))?;

    let state = Arc::new(AppState {
        platform,
        auth: Arc::new(GatewayAuth),
        history_page_size: config.history_page_size,
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
