use axum::http::StatusCode;
use condo_core::{CalculationError, Charge};
use condo_store::rows::{CHARGE_COLUMNS, charge_from_row};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

pub(crate) type HttpError = (StatusCode, String);

pub(crate) fn invalid_request(err: anyhow::Error) -> HttpError {
    (StatusCode::BAD_REQUEST, err.to_string())
}

pub(crate) fn internal_error<E: std::fmt::Display>(err: E) -> HttpError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub(crate) fn not_found(entity: &str) -> HttpError {
    (StatusCode::NOT_FOUND, format!("{entity} not found"))
}

pub(crate) fn calculation_error(err: CalculationError) -> HttpError {
    let status = match &err {
        CalculationError::NotFound { .. } => StatusCode::NOT_FOUND,
        CalculationError::Validation(_) => StatusCode::BAD_REQUEST,
        CalculationError::Arithmetic(_) | CalculationError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!("charge calculation failed: {err}");
    }

    (status, err.to_string())
}

/// Unwraps a mandatory field; absent values are a 400.
pub(crate) fn required<T>(value: Option<T>, field: &str) -> Result<T, HttpError> {
    value.ok_or_else(|| (StatusCode::BAD_REQUEST, format!("{field} is required")))
}

/// Like [`required`], and rejects blank text.
pub(crate) fn required_text(value: Option<String>, field: &str) -> Result<String, HttpError> {
    let text = required(value, field)?.trim().to_string();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, format!("{field} is required")));
    }

    Ok(text)
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub(crate) async fn ensure_exists(
    pool: &PgPool,
    table: &'static str,
    entity: &str,
    id: Uuid,
) -> Result<(), HttpError> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1 AND is_active = TRUE)");
    let exists = sqlx::query_scalar::<_, bool>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(internal_error)?;

    if !exists {
        return Err(not_found(entity));
    }

    Ok(())
}

/// Active charge by id, 404 otherwise.
pub(crate) async fn fetch_charge(pool: &PgPool, charge_id: Uuid) -> Result<Charge, HttpError> {
    let sql = format!("SELECT {CHARGE_COLUMNS} FROM charges WHERE id = $1 AND is_active = TRUE");
    let row = sqlx::query(&sql)
        .bind(charge_id)
        .fetch_optional(pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("charge"))?;

    charge_from_row(&row).map_err(internal_error)
}
