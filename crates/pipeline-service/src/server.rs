//! HTTP server for the order pipeline.
//!
//! Health routes are always mounted. Ingestion routes (`/api/orders...`) and
//! worker routes (`/dapr/subscribe` plus the configured delivery route) are
//! mounted according to `service.role`.

use crate::apis;
use axum::{
	http::HeaderValue,
	routing::{get, post},
	Router,
};
use pipeline_config::ApiConfig;
use pipeline_core::Pipeline;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub pipeline: Pipeline,
}

/// Builds the router for the configured role.
pub fn build_router(pipeline: Pipeline) -> Router {
	let config = pipeline.config();
	let role = config.service.role;

	let mut app = Router::new()
		.route("/", get(apis::health::handle_root))
		.route("/health", get(apis::health::handle_health))
		.route("/ready", get(apis::health::handle_ready));

	if role.serves_ingestion() {
		app = app.nest(
			"/api",
			Router::new()
				.route("/orders", post(apis::order::handle_create_order))
				.route("/orders/bulk", post(apis::order::handle_create_bulk))
				.route("/orders/{id}", get(apis::order::handle_get_order)),
		);
	}

	if role.serves_worker() {
		app = app
			.route(
				"/dapr/subscribe",
				get(apis::subscription::handle_subscribe),
			)
			.route(
				&config.processor.route,
				post(apis::delivery::handle_delivery),
			);
	}

	let cors = cors_layer(&config.api);
	let body_limit = RequestBodyLimitLayer::new(config.api.max_request_size);

	app.layer(cors)
		.layer(body_limit)
		.layer(TraceLayer::new_for_http())
		.with_state(AppState { pipeline })
}

fn cors_layer(api: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api.cors else {
		return CorsLayer::permissive();
	};

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match HeaderValue::from_str(origin) {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();

	CorsLayer::permissive().allow_origin(origins)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn start_server(pipeline: Pipeline) -> Result<(), Box<dyn std::error::Error>> {
	let api = pipeline.config().api.clone();
	let role = pipeline.config().service.role;
	let app = build_router(pipeline);

	let bind_address = format!("{}:{}", api.host, api.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!(address = %bind_address, role = role.as_str(), "Order pipeline API server starting");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for shutdown signal");
		std::future::pending::<()>().await;
	}
	tracing::info!("Shutdown signal received");
}
