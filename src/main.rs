use crm_enrichment::config::Config;
use crm_enrichment::db::Database;
use crm_enrichment::handlers::{self, AppState};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Starts the HTTP server: tracing, configuration, database pool, clients and routes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_enrichment=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let state = AppState::new(config.clone(), db.pool.clone())?;
    tracing::info!(
        "Clients initialized: Salesforce {} / Harmonic {}",
        config.salesforce_instance_url,
        config.harmonic_base_url
    );

    let app = handlers::router(Arc::new(state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            // Workflow options are tiny; 1MB is generous
            .layer(RequestBodyLimitLayer::new(1024 * 1024)),
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
