use anyhow::Result;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use tarot_reading::{
    api::{create_router, AppState},
    logging::setup_logging,
    log_system_event, log_validation, CardCatalog, Config, ReadingService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.log_configuration_summary();
    if let Err(error) = config.validate() {
        log_validation!(failure, "configuration", error = error);
        return Err(error);
    }

    log_system_event!(startup, component = "server", "Starting tarot reading server");

    let catalog = CardCatalog::load(&config.catalog.path).await?;
    let reading_service = ReadingService::from_config(&config.providers, &config.reading);

    info!(
        providers = ?reading_service.configured_providers(),
        card_count = catalog.len(),
        "Reading service initialized"
    );

    let state = AppState {
        catalog: Arc::new(catalog),
        reading_service: Arc::new(reading_service),
    };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
