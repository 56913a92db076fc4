use actix_web::{web, App, HttpServer};
use actix_cors::Cors;
use anyhow::Context;
use session_server::auth::handlers;
use session_server::config::CorsConfig;
use session_server::{health_check, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn cors(config: &CorsConfig) -> Cors {
    // CORS disabled - use most restrictive settings
    if !config.enabled {
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
    } else {
        // Local frontends only
        Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec!["Content-Type"])
    };

    cors.max_age(config.max_age as usize)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging, RUST_LOG overrides the default level
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new().context("loading configuration")?;
    info!("Configuration loaded successfully");
    info!(
        "Using {:?} document store (collections: {}, {})",
        config.database.backend,
        config.database.credentials_collection,
        config.database.tokens_collection
    );

    // Initialize application state
    let state = AppState::new(config.clone())
        .await
        .context("initializing application state")?;
    let state = web::Data::new(state);

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
        .with_context(|| format!("binding {}:{}", config.server.host, config.server.port))?;

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    // Start HTTP server
    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&cors_config))
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .configure(handlers::configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .context("running HTTP server")?;

    Ok(())
}
