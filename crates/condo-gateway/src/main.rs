mod charges;
mod http;
mod indices;
mod progress;
mod registry;

use std::{net::SocketAddr, path::PathBuf};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    routing::{get, post, put},
};
use condo_calculator::{CalculatorConfig, ChargeCalculatorService, parse_index_rates};
use condo_platform::{HealthResponse, ServiceConfig, connect_database, ensure_schema};
use condo_store::PgChargeStore;
use sqlx::PgPool;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pool: PgPool,
    calculator: ChargeCalculatorService<PgChargeStore>,
    upload_dir: PathBuf,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "condo_gateway=info,condo_calculator=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    ensure_schema(&pool).await?;

    let mut calculator_config = CalculatorConfig::default();
    if let Some(raw) = config.correction_index_rates.as_deref() {
        calculator_config = calculator_config.with_index_rates(parse_index_rates(raw)?);
    }

    let state = AppState {
        calculator: ChargeCalculatorService::new(
            PgChargeStore::new(pool.clone()),
            calculator_config,
        ),
        pool,
        upload_dir: config.upload_dir.clone(),
    };
    let router = Router::new()
        .route("/api/health", get(healthz))
        .route(
            "/api/people",
            get(registry::list_people).post(registry::create_person),
        )
        .route("/api/people/{person_id}", get(registry::get_person))
        .route(
            "/api/clients",
            get(registry::list_clients).post(registry::create_client),
        )
        .route("/api/clients/{client_id}", get(registry::get_client))
        .route(
            "/api/clients/{client_id}/units",
            get(registry::list_units).post(registry::create_unit),
        )
        .route(
            "/api/clients/{client_id}/calculation-parameters",
            get(registry::list_parameters).post(registry::create_parameter),
        )
        .route("/api/units/{unit_id}/owners", post(registry::add_owner))
        .route(
            "/api/charges",
            get(charges::list_charges).post(charges::create_charge),
        )
        .route(
            "/api/charges/check-unit-status/{unit_id}",
            get(charges::check_unit_status),
        )
        .route("/api/charges/bulk-create", post(charges::bulk_create))
        .route(
            "/api/charges/unit/{unit_id}/history",
            get(charges::unit_history),
        )
        .route(
            "/api/charges/{charge_id}",
            get(charges::get_charge).delete(charges::cancel_charge),
        )
        .route(
            "/api/charges/{charge_id}/calculate",
            post(charges::recalculate_charge),
        )
        .route(
            "/api/charges/{charge_id}/negotiate",
            post(charges::negotiate_charge),
        )
        .route(
            "/api/charges/{charge_id}/payments",
            post(charges::register_payment),
        )
        .route("/api/charges/{charge_id}/fees", put(charges::upsert_fee))
        .route(
            "/api/charges/{charge_id}/spreadsheet",
            get(charges::debt_spreadsheet),
        )
        .route(
            "/api/charges/{charge_id}/spreadsheet/csv",
            get(charges::debt_spreadsheet_csv),
        )
        .route(
            "/api/progress/charge/{charge_id}/progress",
            get(progress::list_progress).post(progress::add_progress),
        )
        .route(
            "/api/progress/charge/{charge_id}/documents",
            get(progress::list_documents).post(progress::register_document),
        )
        .route(
            "/api/progress/charge/{charge_id}/whatsapp",
            get(progress::list_whatsapp),
        )
        .route(
            "/api/progress/charge/{charge_id}/timeline",
            get(progress::charge_timeline),
        )
        .route(
            "/api/progress/whatsapp/webhook",
            post(progress::whatsapp_webhook),
        )
        .route(
            "/api/economic-indices",
            get(indices::list_indices).post(indices::create_index),
        )
        .route(
            "/api/economic-indices/{index_id}",
            get(indices::get_index)
                .put(indices::update_index)
                .delete(indices::delete_index),
        )
        .route(
            "/api/economic-indices/{index_id}/values",
            get(indices::list_values).post(indices::add_value),
        )
        .route(
            "/api/economic-indices/values/{value_id}",
            put(indices::update_value).delete(indices::delete_value),
        )
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
