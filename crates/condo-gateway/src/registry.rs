use std::collections::HashMap;

use anyhow::Result as AnyResult;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use condo_core::{CalculationParameter, ChargeStatus, Client, Person, Unit, UnitOwner};
use condo_platform::{
    AddOwnerRequest, ClientSummary, CreateClientRequest, CreateParameterRequest,
    CreatePersonRequest, CreateUnitRequest, Listing, PageQuery, PageWindow, Paged,
    UnitWithOwners, success_rate,
};
use condo_store::rows::{
    CLIENT_COLUMNS, PARAMETER_COLUMNS, PERSON_COLUMNS, UNIT_COLUMNS, client_from_row,
    collect_rows, owner_from_row, parameter_from_row, person_from_row, unit_from_row,
};
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    http::{
        HttpError, ensure_exists, internal_error, invalid_request, not_found, optional_text,
        required, required_text,
    },
};

pub(crate) async fn create_person(
    State(state): State<AppState>,
    Json(payload): Json<CreatePersonRequest>,
) -> Result<(StatusCode, Json<Person>), HttpError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name is required".to_string()));
    }

    let sql = format!(
        "INSERT INTO people (id, name, document, email, phone, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
         RETURNING {PERSON_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(optional_text(payload.document))
        .bind(optional_text(payload.email))
        .bind(optional_text(payload.phone))
        .bind(Utc::now())
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    let person = person_from_row(&row).map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(person)))
}

pub(crate) async fn list_people(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<Person>>, HttpError> {
    let window = PageWindow::new(query.page, query.limit);
    let pattern = search_pattern(query.search.as_deref());

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM people
        WHERE is_active = TRUE
          AND ($1::text IS NULL OR name ILIKE $1 OR document ILIKE $1)
        "#,
    )
    .bind(&pattern)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;

    let sql = format!(
        "SELECT {PERSON_COLUMNS} FROM people
         WHERE is_active = TRUE
           AND ($1::text IS NULL OR name ILIKE $1 OR document ILIKE $1)
         ORDER BY name ASC
         LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(window.limit)
        .bind(window.offset())
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;

    let people = collect_rows(&rows, person_from_row).map_err(internal_error)?;
    Ok(Json(Paged::new(people, total, window)))
}

pub(crate) async fn get_person(
    State(state): State<AppState>,
    Path(person_id): Path<Uuid>,
) -> Result<Json<Person>, HttpError> {
    let sql = format!("SELECT {PERSON_COLUMNS} FROM people WHERE id = $1 AND is_active = TRUE");
    let row = sqlx::query(&sql)
        .bind(person_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("person"))?;

    Ok(Json(person_from_row(&row).map_err(internal_error)?))
}

pub(crate) async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paged<ClientSummary>>, HttpError> {
    let window = PageWindow::new(query.page, query.limit);
    let pattern = search_pattern(query.search.as_deref());

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM clients c
        JOIN people p ON p.id = c.person_id
        WHERE c.is_active = TRUE
          AND ($1::text IS NULL OR p.name ILIKE $1 OR c.client_code ILIKE $1 OR p.document ILIKE $1)
        "#,
    )
    .bind(&pattern)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;

    let rows = sqlx::query(
        r#"
        SELECT
            c.id,
            c.person_id,
            c.client_code,
            c.contract_start_date,
            c.contract_end_date,
            c.is_active,
            c.created_at,
            p.name AS person_name,
            p.document AS person_document,
            (SELECT COUNT(*) FROM units u
              WHERE u.client_id = c.id AND u.is_active = TRUE) AS total_units,
            (SELECT COUNT(*) FROM charges ch
              WHERE ch.client_id = c.id AND ch.is_active = TRUE
                AND ch.status = ANY($4)) AS active_charges,
            (SELECT COALESCE(SUM(ch.balance_amount), 0) FROM charges ch
              WHERE ch.client_id = c.id AND ch.is_active = TRUE) AS total_debt,
            (SELECT COUNT(*) FROM charges ch
              WHERE ch.client_id = c.id AND ch.is_active = TRUE
                AND ch.status = 'PAID') AS paid_charges,
            (SELECT COUNT(*) FROM charges ch
              WHERE ch.client_id = c.id AND ch.is_active = TRUE) AS all_charges
        FROM clients c
        JOIN people p ON p.id = c.person_id
        WHERE c.is_active = TRUE
          AND ($1::text IS NULL OR p.name ILIKE $1 OR c.client_code ILIKE $1 OR p.document ILIKE $1)
        ORDER BY c.client_code ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&pattern)
    .bind(window.limit)
    .bind(window.offset())
    .bind(open_statuses())
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let mut clients = Vec::with_capacity(rows.len());
    for row in rows {
        let paid_charges: i64 = row.try_get("paid_charges").map_err(internal_error)?;
        let all_charges: i64 = row.try_get("all_charges").map_err(internal_error)?;
        clients.push(ClientSummary {
            client: client_from_row(&row).map_err(internal_error)?,
            person_name: row.try_get("person_name").map_err(internal_error)?,
            person_document: row.try_get("person_document").map_err(internal_error)?,
            total_units: row.try_get("total_units").map_err(internal_error)?,
            active_charges: row.try_get("active_charges").map_err(internal_error)?,
            total_debt: row.try_get("total_debt").map_err(internal_error)?,
            success_rate: success_rate(paid_charges, all_charges),
        });
    }

    Ok(Json(Paged::new(clients, total, window)))
}

pub(crate) async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Client>, HttpError> {
    let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1 AND is_active = TRUE");
    let row = sqlx::query(&sql)
        .bind(client_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("client"))?;

    Ok(Json(client_from_row(&row).map_err(internal_error)?))
}

pub(crate) async fn create_client(
    State(state): State<AppState>,
    Json(payload): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), HttpError> {
    let person_id = required(payload.person_id, "personId")?;
    let client_code = required_text(payload.client_code, "clientCode")?;
    let contract_start_date = required(payload.contract_start_date, "contractStartDate")?;
    if let Some(end) = payload.contract_end_date {
        if end < contract_start_date {
            return Err((
                StatusCode::BAD_REQUEST,
                "contractEndDate must not precede contractStartDate".to_string(),
            ));
        }
    }

    ensure_exists(&state.pool, "people", "person", person_id).await?;

    let duplicate = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM clients WHERE client_code = $1)",
    )
    .bind(&client_code)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;
    if duplicate {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("client code {client_code} already exists"),
        ));
    }

    let sql = format!(
        "INSERT INTO clients (
            id, person_id, client_code, contract_start_date, contract_end_date,
            is_active, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
         RETURNING {CLIENT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(person_id)
        .bind(&client_code)
        .bind(contract_start_date)
        .bind(payload.contract_end_date)
        .bind(Utc::now())
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    let client = client_from_row(&row).map_err(internal_error)?;
    info!(client_id = %client.id, %client_code, "client registered");
    Ok((StatusCode::CREATED, Json(client)))
}

pub(crate) async fn list_units(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Listing<UnitWithOwners>>, HttpError> {
    ensure_exists(&state.pool, "clients", "client", client_id).await?;

    let sql = format!(
        "SELECT {UNIT_COLUMNS} FROM units
         WHERE client_id = $1 AND is_active = TRUE
         ORDER BY unit_code ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(client_id)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;
    let units = collect_rows(&rows, unit_from_row).map_err(internal_error)?;

    let unit_ids: Vec<Uuid> = units.iter().map(|unit| unit.id).collect();
    let owner_rows = sqlx::query(
        r#"
        SELECT o.id, o.unit_id, o.person_id, p.name AS person_name, o.ownership_type, o.is_active
        FROM unit_owners o
        JOIN people p ON p.id = o.person_id
        WHERE o.unit_id = ANY($1) AND o.is_active = TRUE
        ORDER BY o.created_at ASC
        "#,
    )
    .bind(&unit_ids)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;
    let owners = collect_rows(&owner_rows, owner_from_row).map_err(internal_error)?;

    Ok(Json(group_owners(units, owners).into()))
}

pub(crate) async fn create_unit(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<CreateUnitRequest>,
) -> Result<(StatusCode, Json<Unit>), HttpError> {
    ensure_exists(&state.pool, "clients", "client", client_id).await?;

    let unit_code = required_text(payload.unit_code, "unitCode")?;
    let unit_type = required_text(payload.unit_type, "unitType")?;
    let number = required_text(payload.number, "number")?;
    let status = optional_text(payload.status)
        .map(|status| status.to_ascii_uppercase())
        .unwrap_or_else(|| "ACTIVE".to_string());

    let duplicate = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM units WHERE client_id = $1 AND unit_code = $2)",
    )
    .bind(client_id)
    .bind(&unit_code)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;
    if duplicate {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("unit code {unit_code} already exists for this client"),
        ));
    }

    let sql = format!(
        "INSERT INTO units (
            id, client_id, unit_code, unit_type, block, floor, number, area, ideal_fraction,
            status, is_active, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11, $11)
         RETURNING {UNIT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(&unit_code)
        .bind(&unit_type)
        .bind(optional_text(payload.block))
        .bind(optional_text(payload.floor))
        .bind(&number)
        .bind(payload.area)
        .bind(payload.ideal_fraction)
        .bind(&status)
        .bind(Utc::now())
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(unit_from_row(&row).map_err(internal_error)?),
    ))
}

pub(crate) async fn add_owner(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Json(payload): Json<AddOwnerRequest>,
) -> Result<(StatusCode, Json<UnitOwner>), HttpError> {
    ensure_exists(&state.pool, "units", "unit", unit_id).await?;
    ensure_exists(&state.pool, "people", "person", payload.person_id).await?;

    let ownership_type = payload.ownership_type.trim().to_ascii_uppercase();
    if ownership_type.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "ownershipType is required".to_string(),
        ));
    }

    let row = sqlx::query(
        r#"
        WITH inserted AS (
            INSERT INTO unit_owners (id, unit_id, person_id, ownership_type, is_active, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING id, unit_id, person_id, ownership_type, is_active
        )
        SELECT inserted.*, p.name AS person_name
        FROM inserted
        JOIN people p ON p.id = inserted.person_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(unit_id)
    .bind(payload.person_id)
    .bind(&ownership_type)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(owner_from_row(&row).map_err(internal_error)?),
    ))
}

pub(crate) async fn list_parameters(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Listing<CalculationParameter>>, HttpError> {
    ensure_exists(&state.pool, "clients", "client", client_id).await?;

    let sql = format!(
        "SELECT {PARAMETER_COLUMNS} FROM calculation_parameters
         WHERE client_id = $1 AND is_active = TRUE
         ORDER BY start_date DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(client_id)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;

    let parameters = collect_rows(&rows, parameter_from_row).map_err(internal_error)?;
    Ok(Json(parameters.into()))
}

pub(crate) async fn create_parameter(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<CreateParameterRequest>,
) -> Result<(StatusCode, Json<CalculationParameter>), HttpError> {
    let correction_index = validate_parameter_request(&payload).map_err(invalid_request)?;

    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    // serialises parameter writes per client so the overlap check holds
    sqlx::query("SELECT id FROM clients WHERE id = $1 AND is_active = TRUE FOR UPDATE")
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("client"))?;

    let sql = format!(
        "SELECT {PARAMETER_COLUMNS} FROM calculation_parameters
         WHERE client_id = $1 AND is_active = TRUE"
    );
    let rows = sqlx::query(&sql)
        .bind(client_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(internal_error)?;
    let existing = collect_rows(&rows, parameter_from_row).map_err(internal_error)?;

    if let Some(conflict) = overlapping_parameter(&existing, payload.start_date, payload.end_date) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "validity window overlaps calculation parameter {} starting {}",
                conflict.id, conflict.start_date
            ),
        ));
    }

    let sql = format!(
        "INSERT INTO calculation_parameters (
            id, client_id, start_date, end_date, fine_rate, interest_rate,
            extrajudicial_fees_rate, execution_fees_rate, art_523_fine_rate, correction_index,
            is_active, created_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11)
         RETURNING {PARAMETER_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(payload.start_date)
        .bind(payload.end_date)
        .bind(payload.fine_rate)
        .bind(payload.interest_rate)
        .bind(payload.extrajudicial_fees_rate)
        .bind(payload.execution_fees_rate)
        .bind(payload.art_523_fine_rate)
        .bind(&correction_index)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(internal_error)?;
    let parameter = parameter_from_row(&row).map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    info!(
        %client_id,
        parameter_id = %parameter.id,
        start_date = %parameter.start_date,
        "calculation parameters recorded"
    );
    Ok((StatusCode::CREATED, Json(parameter)))
}

/// Returns the normalised correction index name.
fn validate_parameter_request(payload: &CreateParameterRequest) -> AnyResult<String> {
    let rates = [
        ("fineRate", payload.fine_rate),
        ("interestRate", payload.interest_rate),
        ("extrajudicialFeesRate", payload.extrajudicial_fees_rate),
        ("executionFeesRate", payload.execution_fees_rate),
        ("art523FineRate", payload.art_523_fine_rate),
    ];
    for (field, rate) in rates {
        if rate < Decimal::ZERO {
            anyhow::bail!("{field} must be non-negative");
        }
    }

    if let Some(end) = payload.end_date {
        if end < payload.start_date {
            anyhow::bail!("endDate must not precede startDate");
        }
    }

    let correction_index = payload.correction_index.trim().to_ascii_uppercase();
    if correction_index.is_empty() {
        anyhow::bail!("correctionIndex is required");
    }

    Ok(correction_index)
}

fn overlapping_parameter(
    existing: &[CalculationParameter],
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Option<&CalculationParameter> {
    existing.iter().find(|record| record.overlaps(start, end))
}

fn group_owners(units: Vec<Unit>, owners: Vec<UnitOwner>) -> Vec<UnitWithOwners> {
    let mut by_unit: HashMap<Uuid, Vec<UnitOwner>> = HashMap::new();
    for owner in owners {
        by_unit.entry(owner.unit_id).or_default().push(owner);
    }

    units
        .into_iter()
        .map(|unit| UnitWithOwners {
            owners: by_unit.remove(&unit.id).unwrap_or_default(),
            unit,
        })
        .collect()
}

pub(crate) fn open_statuses() -> Vec<String> {
    ChargeStatus::OPEN
        .iter()
        .map(|status| status.as_str().to_string())
        .collect()
}

fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| format!("%{term}%"))
}
