use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use condo_core::{EconomicIndex, EconomicIndexValue};
use condo_platform::{IndexValueRequest, Listing, UpsertIndexRequest};
use condo_store::rows::{collect_rows, index_from_row, index_value_from_row};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    http::{HttpError, internal_error, not_found, optional_text, required},
};

const INDEX_COLUMNS: &str = "id, name, description";
const VALUE_COLUMNS: &str = "id, index_id, reference_date, value";

pub(crate) async fn list_indices(
    State(state): State<AppState>,
) -> Result<Json<Listing<EconomicIndex>>, HttpError> {
    let sql = format!("SELECT {INDEX_COLUMNS} FROM economic_indices ORDER BY name ASC");
    let rows = sqlx::query(&sql)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;

    let indices = collect_rows(&rows, index_from_row).map_err(internal_error)?;
    Ok(Json(indices.into()))
}

pub(crate) async fn create_index(
    State(state): State<AppState>,
    Json(payload): Json<UpsertIndexRequest>,
) -> Result<(StatusCode, Json<EconomicIndex>), HttpError> {
    let name = index_name(&payload)?;

    let sql = format!(
        "INSERT INTO economic_indices (id, name, description, created_at)
         VALUES ($1, $2, $3, $4)
         RETURNING {INDEX_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(optional_text(payload.description))
        .bind(Utc::now())
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    let index = index_from_row(&row).map_err(internal_error)?;
    info!(index_id = %index.id, name = %index.name, "economic index created");
    Ok((StatusCode::CREATED, Json(index)))
}

pub(crate) async fn get_index(
    State(state): State<AppState>,
    Path(index_id): Path<Uuid>,
) -> Result<Json<EconomicIndex>, HttpError> {
    let sql = format!("SELECT {INDEX_COLUMNS} FROM economic_indices WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(index_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("economic index"))?;

    Ok(Json(index_from_row(&row).map_err(internal_error)?))
}

pub(crate) async fn update_index(
    State(state): State<AppState>,
    Path(index_id): Path<Uuid>,
    Json(payload): Json<UpsertIndexRequest>,
) -> Result<Json<EconomicIndex>, HttpError> {
    let name = index_name(&payload)?;

    let sql = format!(
        "UPDATE economic_indices SET name = $2, description = $3
         WHERE id = $1
         RETURNING {INDEX_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(index_id)
        .bind(&name)
        .bind(optional_text(payload.description))
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("economic index"))?;

    Ok(Json(index_from_row(&row).map_err(internal_error)?))
}

/// Hard delete; the index's values go with it.
pub(crate) async fn delete_index(
    State(state): State<AppState>,
    Path(index_id): Path<Uuid>,
) -> Result<StatusCode, HttpError> {
    let result = sqlx::query("DELETE FROM economic_indices WHERE id = $1")
        .bind(index_id)
        .execute(&state.pool)
        .await
        .map_err(internal_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("economic index"));
    }

    info!(%index_id, "economic index deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_values(
    State(state): State<AppState>,
    Path(index_id): Path<Uuid>,
) -> Result<Json<Listing<EconomicIndexValue>>, HttpError> {
    ensure_index(&state.pool, index_id).await?;

    let sql = format!(
        "SELECT {VALUE_COLUMNS} FROM economic_index_values
         WHERE index_id = $1
         ORDER BY reference_date ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(index_id)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;

    let values = collect_rows(&rows, index_value_from_row).map_err(internal_error)?;
    Ok(Json(values.into()))
}

pub(crate) async fn add_value(
    State(state): State<AppState>,
    Path(index_id): Path<Uuid>,
    Json(payload): Json<IndexValueRequest>,
) -> Result<(StatusCode, Json<EconomicIndexValue>), HttpError> {
    let reference_date = required(payload.reference_date, "referenceDate")?;
    let value = required(payload.value, "value")?;
    ensure_index(&state.pool, index_id).await?;

    let sql = format!(
        "INSERT INTO economic_index_values (id, index_id, reference_date, value, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {VALUE_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(index_id)
        .bind(reference_date)
        .bind(value)
        .bind(Utc::now())
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(index_value_from_row(&row).map_err(internal_error)?),
    ))
}

pub(crate) async fn update_value(
    State(state): State<AppState>,
    Path(value_id): Path<Uuid>,
    Json(payload): Json<IndexValueRequest>,
) -> Result<Json<EconomicIndexValue>, HttpError> {
    let reference_date = required(payload.reference_date, "referenceDate")?;
    let value = required(payload.value, "value")?;

    let sql = format!(
        "UPDATE economic_index_values SET reference_date = $2, value = $3
         WHERE id = $1
         RETURNING {VALUE_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(value_id)
        .bind(reference_date)
        .bind(value)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("index value"))?;

    Ok(Json(index_value_from_row(&row).map_err(internal_error)?))
}

pub(crate) async fn delete_value(
    State(state): State<AppState>,
    Path(value_id): Path<Uuid>,
) -> Result<StatusCode, HttpError> {
    let result = sqlx::query("DELETE FROM economic_index_values WHERE id = $1")
        .bind(value_id)
        .execute(&state.pool)
        .await
        .map_err(internal_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("index value"));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_index(pool: &PgPool, index_id: Uuid) -> Result<(), HttpError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM economic_indices WHERE id = $1)")
            .bind(index_id)
            .fetch_one(pool)
            .await
            .map_err(internal_error)?;

    if !exists {
        return Err(not_found("economic index"));
    }

    Ok(())
}

fn index_name(payload: &UpsertIndexRequest) -> Result<String, HttpError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name is required".to_string()));
    }

    Ok(name.to_string())
}
