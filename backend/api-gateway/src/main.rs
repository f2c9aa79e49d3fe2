use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use api_gateway::config::SERVICE_TARGET_VARS;
use api_gateway::{configure, cors_headers, Config, GatewayState, RouteTable};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting API gateway...");

    let config = Config::from_env().context("Failed to load configuration")?;

    let routes = RouteTable::from_targets(config.services.iter().map(|(n, u)| (n.as_str(), u)))
        .context("Invalid service target")?;
    for (name, var) in SERVICE_TARGET_VARS {
        match routes.resolve(name) {
            Some(route) => info!(service = name, target = %route.target, "Service registered"),
            None => warn!(service = name, "{} not set; requests for this service get 400", var),
        }
    }

    let state = web::Data::new(
        GatewayState::new(routes, config.jwt.secret.clone(), config.upstream_timeout)
            .context("Failed to build upstream HTTP client")?,
    );

    let bind_addr = config.bind_address();
    info!(
        %bind_addr,
        upstream_timeout_secs = config.upstream_timeout.as_secs(),
        "API gateway listening"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(cors_headers())
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {bind_addr}"))?
    .run()
    .await
    .context("HTTP server error")
}
