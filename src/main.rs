use std::sync::Arc;

use anyhow::Context;
use nps_survey::config::{self, ServerConfig, SurveyConfig};
use nps_survey::llm::{GatewayConfig, create_provider};
use nps_survey::store::{InMemorySessionStore, LibSqlSessionStore, SessionStore};
use nps_survey::survey::{SurveyManager, SurveyRouteState, spawn_expiry_task, survey_routes};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present, before any config is read
    let dotenv_result = config::load_dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match dotenv_result {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "Loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Using process environment only"),
    }

    let server_config = ServerConfig::from_env()?;
    let survey_config = SurveyConfig::from_env();

    let gateway_config = GatewayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export DATABRICKS_ENDPOINT_URL=https://.../serving-endpoints/<name>/invocations");
        eprintln!("  export DATABRICKS_API_TOKEN=dapi...");
        std::process::exit(1);
    });

    eprintln!("📋 NPS Survey v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Endpoint: {}", gateway_config.endpoint_url);
    eprintln!("   Product: {}", survey_config.product_name);
    eprintln!("   Chat API: http://{}/chat", server_config.bind_addr);
    eprintln!("   Start API: http://{}/api/survey/start", server_config.bind_addr);

    let llm = create_provider(gateway_config)?;

    // ── Sessions ─────────────────────────────────────────────────────────
    let store: Arc<dyn SessionStore> = match &server_config.db_path {
        Some(path) => {
            let store = LibSqlSessionStore::new_local(path)
                .await
                .with_context(|| format!("failed to open session database at {}", path.display()))?;
            eprintln!("   Sessions: {}", path.display());
            Arc::new(store)
        }
        None => {
            eprintln!("   Sessions: in memory (set SURVEY_DB_PATH to persist)");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let manager = Arc::new(SurveyManager::new(llm, store, survey_config));

    // Sweep idle sessions in the background
    let _expiry_handle = spawn_expiry_task(
        Arc::clone(&manager),
        server_config.session_ttl,
        server_config.sweep_interval,
    );
    eprintln!("   Session TTL: {} min", server_config.session_ttl.as_secs() / 60);

    let app = survey_routes(SurveyRouteState { manager })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_addr))?;
    tracing::info!(addr = %server_config.bind_addr, "Survey server started");
    eprintln!("   Press Ctrl-C to stop.\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Survey server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
