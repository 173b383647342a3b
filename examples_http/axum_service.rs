use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use service_logger::docs::{self, ApiDocs};
use service_logger::init::install;
use service_logger::logger::create_logger_from_env;
use service_logger::middleware::{error_logging, response_logger, ApiError, HttpLogging};

async fn place_order(Json(order): Json<Value>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let amount = order["amount"].as_f64().unwrap_or_default();
    if amount <= 0.0 {
        return Err(ApiError::new("amount must be positive").with_status(StatusCode::UNPROCESSABLE_ENTITY));
    }
    info!(amount, "order accepted");
    Ok((StatusCode::CREATED, Json(json!({ "amount": amount }))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // NODE_ENV, LOGS_FOLDER and DD_API_KEY are picked up here.
    let logger = create_logger_from_env(Some("cash-management"))?;
    install(&logger)?;

    let http = HttpLogging::new(logger.clone());
    let api_docs = ApiDocs::from_json_str(
        "Cash Management API",
        include_str!("../assets/openapi.json"),
    )?;

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/orders", post(place_order))
        .layer(from_fn_with_state(http.clone(), error_logging))
        .layer(from_fn_with_state(http, response_logger));
    let app = docs::mount_unless_production(app, "/docs", &logger.config().env, api_docs);

    let addr: SocketAddr = "127.0.0.1:3000".parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    logger.flush().await;
    Ok(())
}
