use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linepay_relay::{config::RelayConfig, cors, metrics::register_metrics, routes, AppState};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let port = config.port;
    let confirm_input = config.confirm_input;
    let allowed_origins = config.allowed_origins.clone();
    let rate_limit_rpm = config.rate_limit_rpm;
    let static_dir = config.static_dir.clone();

    tracing::info!("Starting linepay-relay on port {}", port);
    tracing::info!("Upstream: {}", config.base_url);
    tracing::info!("Channel id: {}", config.channel_id);
    tracing::info!(
        "Confirm input: {:?}, view: {:?}",
        config.confirm_input,
        config.confirm_view
    );

    register_metrics();

    let state = AppState::new(config).map_err(std::io::Error::other)?;
    let state_data = web::Data::new(state);

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm as u64)
        .finish()
        .expect("Failed to create rate limiter config");

    if let Some(ref dir) = static_dir {
        tracing::info!("Serving static files from: {}", dir);
    }

    HttpServer::new(move || {
        let cors = cors::build_cors(&allowed_origins);

        let mut app = App::new()
            .app_data(state_data.clone())
            .app_data(web::PayloadConfig::new(64 * 1024))
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Governor::new(&governor_conf))
            .configure(routes::health::configure)
            .configure(|cfg| routes::payments::configure(cfg, confirm_input));

        // Static files last (catch-all) so they never shadow the relay routes
        if let Some(ref dir) = static_dir {
            app = app.service(actix_files::Files::new("/", dir).index_file("index.html"));
        }

        app
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
