use anyhow::Result as AnyResult;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use condo_calculator::{
    CalculatorConfig, ChargeCalculation, DebtBreakdown, ResolvedParameters, calculate_charge,
    render_csv,
};
use condo_core::{
    CalculationError, Charge, ChargeFees, ChargeItem, ChargeSnapshot, ChargeStatus, ItemCategory,
};
use condo_platform::{
    AsOfQuery, BulkCreateRequest, BulkCreateResponse, BulkSummary, ChargeDetail,
    ChargeItemInput, ChargeListQuery, CreateChargeRequest, FeeOverrideRequest, NegotiateRequest,
    PageWindow, Paged, PaymentRequest, SkippedUnit, UnitChargeStatus, UnitHistoryResponse,
    UnitStatistics,
};
use condo_store::rows::{
    CHARGE_COLUMNS, FEE_COLUMNS, ITEM_COLUMNS, UNIT_COLUMNS, charge_from_row, collect_rows,
    fee_from_row, item_from_row, unit_from_row,
};
use rust_decimal::Decimal;
use sqlx::PgExecutor;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    http::{
        HttpError, calculation_error, ensure_exists, fetch_charge, internal_error,
        invalid_request, not_found, optional_text, required, required_text,
    },
    registry::open_statuses,
};

/// Header fields shared by single and bulk creation.
struct ChargeHeader {
    client_id: Uuid,
    debtor_id: Uuid,
    unit_id: Option<Uuid>,
    charge_date: NaiveDate,
    due_date: NaiveDate,
    category: String,
    description: String,
    reference_period: Option<String>,
}

pub(crate) async fn check_unit_status(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<Json<UnitChargeStatus>, HttpError> {
    ensure_exists(&state.pool, "units", "unit", unit_id).await?;

    let active_charges = open_unit_charges(&state.pool, unit_id).await?;
    let can_create_new_charge = active_charges.is_empty();
    let message = if can_create_new_charge {
        "unit can receive a new charge".to_string()
    } else {
        format!(
            "unit has {} open charge(s); settle or cancel them first",
            active_charges.len()
        )
    };

    Ok(Json(UnitChargeStatus {
        unit_id,
        can_create_new_charge,
        active_charges,
        message,
    }))
}

pub(crate) async fn create_charge(
    State(state): State<AppState>,
    Json(payload): Json<CreateChargeRequest>,
) -> Result<(StatusCode, Json<ChargeDetail>), HttpError> {
    let header = ChargeHeader {
        client_id: required(payload.client_id, "clientId")?,
        debtor_id: required(payload.debtor_id, "debtorId")?,
        unit_id: payload.unit_id,
        charge_date: required(payload.charge_date, "chargeDate")?,
        due_date: required(payload.due_date, "dueDate")?,
        category: required_text(payload.category, "category")?,
        description: required_text(payload.description, "description")?,
        reference_period: optional_text(payload.reference_period),
    };

    ensure_exists(&state.pool, "clients", "client", header.client_id).await?;
    ensure_exists(&state.pool, "people", "debtor", header.debtor_id).await?;

    let now = Utc::now();
    let today = now.date_naive();
    let mut snapshot = draft_snapshot(&header, &payload.items, now).map_err(invalid_request)?;
    let parameters = state
        .calculator
        .resolve_parameters(header.client_id, today)
        .await
        .map_err(calculation_error)?;
    price_snapshot(&mut snapshot, &parameters, today, state.calculator.config())
        .map_err(calculation_error)?;

    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    if let Some(unit_id) = header.unit_id {
        if !lock_unit(&mut tx, unit_id, header.client_id).await? {
            return Err(not_found("unit"));
        }
        let blocking = open_unit_charges(&mut *tx, unit_id).await?;
        if !blocking.is_empty() {
            let codes: Vec<&str> = blocking
                .iter()
                .map(|charge| charge.charge_code.as_str())
                .collect();
            return Err((
                StatusCode::BAD_REQUEST,
                format!(
                    "unit already has open charges: {}; settle or cancel them first",
                    codes.join(", ")
                ),
            ));
        }
    }

    insert_snapshot(&mut tx, &snapshot)
        .await
        .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    info!(
        charge_id = %snapshot.charge.id,
        charge_code = %snapshot.charge.charge_code,
        total = %snapshot.charge.total_amount,
        "charge created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ChargeDetail {
            charge: snapshot.charge,
            items: snapshot.items,
            fees: snapshot.fees,
        }),
    ))
}

pub(crate) async fn bulk_create(
    State(state): State<AppState>,
    Json(payload): Json<BulkCreateRequest>,
) -> Result<(StatusCode, Json<BulkCreateResponse>), HttpError> {
    let client_id = required(payload.client_id, "clientId")?;
    let charge_date = required(payload.charge_date, "chargeDate")?;
    let due_date = required(payload.due_date, "dueDate")?;
    let category = required_text(payload.category, "category")?;
    let description = required_text(payload.description, "description")?;
    let reference_period = optional_text(payload.reference_period);
    if payload.units.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "units is required".to_string()));
    }

    ensure_exists(&state.pool, "clients", "client", client_id).await?;

    let now = Utc::now();
    let today = now.date_naive();
    let parameters = state
        .calculator
        .resolve_parameters(client_id, today)
        .await
        .map_err(calculation_error)?;

    let mut created_charges = Vec::new();
    let mut skipped_units = Vec::new();
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    for unit in &payload.units {
        let skip = |reason: String| SkippedUnit {
            unit_id: unit.unit_id,
            reason,
        };

        if unit.amount <= Decimal::ZERO {
            skipped_units.push(skip("amount must be positive".to_string()));
            continue;
        }
        if !lock_unit(&mut tx, unit.unit_id, client_id).await? {
            skipped_units.push(skip("unit not found for this client".to_string()));
            continue;
        }
        let debtor_known = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM people WHERE id = $1 AND is_active = TRUE)",
        )
        .bind(unit.debtor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal_error)?;
        if !debtor_known {
            skipped_units.push(skip("debtor not found".to_string()));
            continue;
        }
        if !open_unit_charges(&mut *tx, unit.unit_id).await?.is_empty() {
            skipped_units.push(skip("unit has pending or negotiated charges".to_string()));
            continue;
        }

        let header = ChargeHeader {
            client_id,
            debtor_id: unit.debtor_id,
            unit_id: Some(unit.unit_id),
            charge_date,
            due_date,
            category: category.clone(),
            description: description.clone(),
            reference_period: reference_period.clone(),
        };
        let items = [ChargeItemInput {
            category: ItemCategory::Principal.as_str().to_string(),
            due_date,
            description: description.clone(),
            nominal_amount: unit.amount,
        }];
        let mut snapshot = draft_snapshot(&header, &items, now).map_err(invalid_request)?;
        price_snapshot(&mut snapshot, &parameters, today, state.calculator.config())
            .map_err(calculation_error)?;

        insert_snapshot(&mut tx, &snapshot)
            .await
            .map_err(internal_error)?;
        created_charges.push(snapshot.charge);
    }

    tx.commit().await.map_err(internal_error)?;

    let summary = BulkSummary {
        created: created_charges.len(),
        skipped: skipped_units.len(),
        total: payload.units.len(),
    };
    info!(
        %client_id,
        created = summary.created,
        skipped = summary.skipped,
        "bulk charge creation finished"
    );

    Ok((
        StatusCode::CREATED,
        Json(BulkCreateResponse {
            created_charges,
            skipped_units,
            summary,
        }),
    ))
}

pub(crate) async fn list_charges(
    State(state): State<AppState>,
    Query(query): Query<ChargeListQuery>,
) -> Result<Json<Paged<Charge>>, HttpError> {
    let window = PageWindow::new(query.page, query.limit);
    let status = query
        .status
        .as_deref()
        .filter(|status| !status.trim().is_empty())
        .map(ChargeStatus::parse)
        .transpose()
        .map_err(invalid_request)?
        .map(|status| status.as_str());

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM charges
        WHERE is_active = TRUE
          AND ($1::uuid IS NULL OR client_id = $1)
          AND ($2::text IS NULL OR status = $2)
        "#,
    )
    .bind(query.client_id)
    .bind(status)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;

    let sql = format!(
        "SELECT {CHARGE_COLUMNS} FROM charges
         WHERE is_active = TRUE
           AND ($1::uuid IS NULL OR client_id = $1)
           AND ($2::text IS NULL OR status = $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query(&sql)
        .bind(query.client_id)
        .bind(status)
        .bind(window.limit)
        .bind(window.offset())
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;

    let charges = collect_rows(&rows, charge_from_row).map_err(internal_error)?;
    Ok(Json(Paged::new(charges, total, window)))
}

pub(crate) async fn get_charge(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
) -> Result<Json<ChargeDetail>, HttpError> {
    let charge = fetch_charge(&state.pool, charge_id).await?;

    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM charge_items
         WHERE charge_id = $1 AND is_active = TRUE
         ORDER BY due_date ASC, created_at ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(charge_id)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;
    let items = collect_rows(&rows, item_from_row).map_err(internal_error)?;

    let sql = format!(
        "SELECT {FEE_COLUMNS} FROM charge_fees
         WHERE charge_id = $1 AND is_active = TRUE
         ORDER BY created_at ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(charge_id)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;
    let fees = collect_rows(&rows, fee_from_row).map_err(internal_error)?;

    Ok(Json(ChargeDetail {
        charge,
        items,
        fees,
    }))
}

pub(crate) async fn recalculate_charge(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<ChargeCalculation>, HttpError> {
    let calculation = state
        .calculator
        .calculate(charge_id, query.date())
        .await
        .map_err(calculation_error)?;

    Ok(Json(calculation))
}

pub(crate) async fn negotiate_charge(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Json(payload): Json<NegotiateRequest>,
) -> Result<Json<Charge>, HttpError> {
    let charge = fetch_charge(&state.pool, charge_id).await?;
    if charge.status.is_closed() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("a {} charge cannot be negotiated", charge.status.as_str()),
        ));
    }

    let now = Utc::now();
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let sql = format!(
        "UPDATE charges SET status = $2, updated_at = $3
         WHERE id = $1 AND is_active = TRUE
         RETURNING {CHARGE_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(charge_id)
        .bind(ChargeStatus::Negotiated.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal_error)?;
    let updated = charge_from_row(&row).map_err(internal_error)?;

    let description = optional_text(payload.notes)
        .unwrap_or_else(|| format!("Charge {} moved to negotiation", charge.charge_code));
    sqlx::query(
        r#"
        INSERT INTO charge_progress (
            id, charge_id, progress_date, progress_type, title, description,
            responsible_name, priority, is_milestone, is_active, created_at
        )
        VALUES ($1, $2, $3, 'NEGOTIATION', 'Negotiation started', $4, $5, 'HIGH', TRUE, TRUE, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(charge_id)
    .bind(now)
    .bind(&description)
    .bind(optional_text(payload.responsible_name))
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    info!(%charge_id, "charge moved to negotiation");
    Ok(Json(updated))
}

pub(crate) async fn register_payment(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<Charge>, HttpError> {
    if payload.amount <= Decimal::ZERO {
        return Err((
            StatusCode::BAD_REQUEST,
            "amount must be positive".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let sql = format!(
        "SELECT {CHARGE_COLUMNS} FROM charges WHERE id = $1 AND is_active = TRUE FOR UPDATE"
    );
    let row = sqlx::query(&sql)
        .bind(charge_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("charge"))?;
    let charge = charge_from_row(&row).map_err(internal_error)?;
    if charge.status == ChargeStatus::Cancelled {
        return Err((
            StatusCode::BAD_REQUEST,
            "payments cannot be registered on a cancelled charge".to_string(),
        ));
    }

    let settlement = settle(&charge, payload.amount);
    let paid_at = payload.payment_date.unwrap_or_else(Utc::now);

    let sql = format!(
        "UPDATE charges
         SET paid_amount = $2, balance_amount = $3, status = $4, updated_at = $5
         WHERE id = $1
         RETURNING {CHARGE_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(charge_id)
        .bind(settlement.paid_amount)
        .bind(settlement.balance_amount)
        .bind(settlement.status.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(internal_error)?;
    let updated = charge_from_row(&row).map_err(internal_error)?;

    let description = optional_text(payload.notes)
        .unwrap_or_else(|| format!("Payment of {} received", payload.amount));
    sqlx::query(
        r#"
        INSERT INTO charge_progress (
            id, charge_id, progress_date, progress_type, title, description,
            priority, is_milestone, is_active, created_at
        )
        VALUES ($1, $2, $3, 'PAYMENT', 'Payment registered', $4, 'MEDIUM', $5, TRUE, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(charge_id)
    .bind(paid_at)
    .bind(&description)
    .bind(settlement.status == ChargeStatus::Paid)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    info!(
        %charge_id,
        amount = %payload.amount,
        balance = %updated.balance_amount,
        status = updated.status.as_str(),
        "payment registered"
    );
    Ok(Json(updated))
}

pub(crate) async fn upsert_fee(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Json(payload): Json<FeeOverrideRequest>,
) -> Result<Json<ChargeFees>, HttpError> {
    let value = payload
        .rule
        .percentage_rate()
        .or(payload.rule.fixed_amount())
        .unwrap_or_default();
    if value < Decimal::ZERO {
        return Err((
            StatusCode::BAD_REQUEST,
            "fee rate or amount must be non-negative".to_string(),
        ));
    }

    ensure_exists(&state.pool, "charges", "charge", charge_id).await?;

    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    sqlx::query(
        r#"
        UPDATE charge_fees SET is_active = FALSE
        WHERE charge_id = $1 AND fee_type = $2 AND is_active = TRUE
        "#,
    )
    .bind(charge_id)
    .bind(payload.fee_type.as_str())
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    let sql = format!(
        "INSERT INTO charge_fees (
            id, charge_id, fee_type, calculation_type, percentage_rate, fixed_amount,
            is_active, created_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
         RETURNING {FEE_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(charge_id)
        .bind(payload.fee_type.as_str())
        .bind(payload.rule.calculation_type())
        .bind(payload.rule.percentage_rate())
        .bind(payload.rule.fixed_amount())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(internal_error)?;
    let fee = fee_from_row(&row).map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    info!(
        %charge_id,
        fee_type = payload.fee_type.as_str(),
        calculation_type = payload.rule.calculation_type(),
        "fee override stored"
    );
    Ok(Json(fee))
}

pub(crate) async fn cancel_charge(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
) -> Result<StatusCode, HttpError> {
    let result = sqlx::query(
        r#"
        UPDATE charges
        SET is_active = FALSE, status = $2, updated_at = $3
        WHERE id = $1 AND is_active = TRUE
        "#,
    )
    .bind(charge_id)
    .bind(ChargeStatus::Cancelled.as_str())
    .bind(Utc::now())
    .execute(&state.pool)
    .await
    .map_err(internal_error)?;

    if result.rows_affected() == 0 {
        return Err(not_found("charge"));
    }

    info!(%charge_id, "charge cancelled");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn debt_spreadsheet(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<DebtBreakdown>, HttpError> {
    let statement = state
        .calculator
        .generate_debt_breakdown(charge_id, query.date())
        .await
        .map_err(calculation_error)?;

    Ok(Json(statement))
}

pub(crate) async fn debt_spreadsheet_csv(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let statement = state
        .calculator
        .generate_debt_breakdown(charge_id, query.date())
        .await
        .map_err(calculation_error)?;
    let body = render_csv(&statement).map_err(internal_error)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                spreadsheet_disposition(&statement.charge.charge_code),
            ),
        ],
        body,
    ))
}

pub(crate) async fn unit_history(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<Json<UnitHistoryResponse>, HttpError> {
    let sql = format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = $1 AND is_active = TRUE");
    let row = sqlx::query(&sql)
        .bind(unit_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("unit"))?;
    let unit = unit_from_row(&row).map_err(internal_error)?;

    let sql = format!(
        "SELECT {CHARGE_COLUMNS} FROM charges
         WHERE unit_id = $1 AND is_active = TRUE
         ORDER BY created_at DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(unit_id)
        .fetch_all(&state.pool)
        .await
        .map_err(internal_error)?;
    let charges = collect_rows(&rows, charge_from_row).map_err(internal_error)?;
    let statistics = UnitStatistics::from_charges(&charges);

    Ok(Json(UnitHistoryResponse {
        unit,
        charges,
        statistics,
    }))
}

async fn open_unit_charges<'e, E>(executor: E, unit_id: Uuid) -> Result<Vec<Charge>, HttpError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {CHARGE_COLUMNS} FROM charges
         WHERE unit_id = $1 AND is_active = TRUE AND status = ANY($2)
         ORDER BY created_at DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(unit_id)
        .bind(open_statuses())
        .fetch_all(executor)
        .await
        .map_err(internal_error)?;

    collect_rows(&rows, charge_from_row).map_err(internal_error)
}

/// Row lock on the unit so concurrent creations see each other's charges.
/// False when the unit is unknown or belongs to another client.
async fn lock_unit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    unit_id: Uuid,
    client_id: Uuid,
) -> Result<bool, HttpError> {
    let row = sqlx::query(
        "SELECT id FROM units WHERE id = $1 AND client_id = $2 AND is_active = TRUE FOR UPDATE",
    )
    .bind(unit_id)
    .bind(client_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(internal_error)?;

    Ok(row.is_some())
}

async fn insert_snapshot(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    snapshot: &ChargeSnapshot,
) -> AnyResult<()> {
    insert_charge(tx, &snapshot.charge).await?;
    for item in &snapshot.items {
        insert_item(tx, item).await?;
    }

    Ok(())
}

async fn insert_charge(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    charge: &Charge,
) -> AnyResult<()> {
    sqlx::query(
        r#"
        INSERT INTO charges (
            id, charge_code, client_id, debtor_id, unit_id, charge_date, due_date,
            category, description, reference_period, status, principal_amount,
            expenses_amount, extrajudicial_fees, execution_fees, art_523_fine,
            total_amount, paid_amount, balance_amount, is_active, created_at, updated_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
        )
        "#,
    )
    .bind(charge.id)
    .bind(&charge.charge_code)
    .bind(charge.client_id)
    .bind(charge.debtor_id)
    .bind(charge.unit_id)
    .bind(charge.charge_date)
    .bind(charge.due_date)
    .bind(&charge.category)
    .bind(&charge.description)
    .bind(&charge.reference_period)
    .bind(charge.status.as_str())
    .bind(charge.principal_amount)
    .bind(charge.expenses_amount)
    .bind(charge.extrajudicial_fees)
    .bind(charge.execution_fees)
    .bind(charge.art_523_fine)
    .bind(charge.total_amount)
    .bind(charge.paid_amount)
    .bind(charge.balance_amount)
    .bind(charge.is_active)
    .bind(charge.created_at)
    .bind(charge.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_item(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    item: &ChargeItem,
) -> AnyResult<()> {
    sqlx::query(
        r#"
        INSERT INTO charge_items (
            id, charge_id, category, due_date, description, nominal_amount,
            monetary_correction, interest_amount, fine_amount, subtotal, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(item.id)
    .bind(item.charge_id)
    .bind(item.category.as_str())
    .bind(item.due_date)
    .bind(&item.description)
    .bind(item.nominal_amount)
    .bind(item.monetary_correction)
    .bind(item.interest_amount)
    .bind(item.fine_amount)
    .bind(item.subtotal)
    .bind(item.is_active)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// `COB` + creation date + six upper-case hex digits.
fn charge_code(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("COB{}{}", now.format("%Y%m%d"), suffix.to_ascii_uppercase())
}

/// Builds an unpriced charge with its items; every derived amount is zero.
fn draft_snapshot(
    header: &ChargeHeader,
    inputs: &[ChargeItemInput],
    now: DateTime<Utc>,
) -> AnyResult<ChargeSnapshot> {
    let charge_id = Uuid::new_v4();

    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.nominal_amount < Decimal::ZERO {
            anyhow::bail!("nominalAmount must be non-negative");
        }
        let description = input.description.trim();
        if description.is_empty() {
            anyhow::bail!("item description is required");
        }

        items.push(ChargeItem {
            id: Uuid::new_v4(),
            charge_id,
            category: ItemCategory::parse(&input.category)?,
            due_date: input.due_date,
            description: description.to_string(),
            nominal_amount: input.nominal_amount,
            monetary_correction: Decimal::ZERO,
            interest_amount: Decimal::ZERO,
            fine_amount: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            is_active: true,
        });
    }

    Ok(ChargeSnapshot {
        charge: Charge {
            id: charge_id,
            charge_code: charge_code(now),
            client_id: header.client_id,
            debtor_id: header.debtor_id,
            unit_id: header.unit_id,
            charge_date: header.charge_date,
            due_date: header.due_date,
            category: header.category.clone(),
            description: header.description.clone(),
            reference_period: header.reference_period.clone(),
            status: ChargeStatus::Pending,
            principal_amount: Decimal::ZERO,
            expenses_amount: Decimal::ZERO,
            extrajudicial_fees: Decimal::ZERO,
            execution_fees: Decimal::ZERO,
            art_523_fine: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            balance_amount: Decimal::ZERO,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
        items,
        fees: Vec::new(),
    })
}

fn price_snapshot(
    snapshot: &mut ChargeSnapshot,
    parameters: &ResolvedParameters,
    calculation_date: NaiveDate,
    config: &CalculatorConfig,
) -> Result<(), CalculationError> {
    let calculation = calculate_charge(snapshot, parameters, calculation_date, config)?;
    apply_calculation(snapshot, &calculation);
    Ok(())
}

/// Copies derived amounts onto the snapshot's charge and items.
fn apply_calculation(snapshot: &mut ChargeSnapshot, calculation: &ChargeCalculation) {
    for item in &mut snapshot.items {
        if let Some(result) = calculation
            .items
            .iter()
            .find(|result| result.item_id == item.id)
        {
            item.monetary_correction = result.monetary_correction;
            item.interest_amount = result.interest_amount;
            item.fine_amount = result.fine_amount;
            item.subtotal = result.subtotal;
        }
    }

    let totals = &calculation.totals;
    let charge = &mut snapshot.charge;
    charge.principal_amount = totals.principal_amount;
    charge.expenses_amount = totals.expenses_amount;
    charge.extrajudicial_fees = totals.extrajudicial_fees;
    charge.execution_fees = totals.execution_fees;
    charge.art_523_fine = totals.art_523_fine;
    charge.total_amount = totals.total_amount;
    charge.balance_amount = totals.total_amount - charge.paid_amount;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settlement {
    paid_amount: Decimal,
    balance_amount: Decimal,
    status: ChargeStatus,
}

fn settle(charge: &Charge, amount: Decimal) -> Settlement {
    let paid_amount = charge.paid_amount + amount;
    let balance_amount = charge.total_amount - paid_amount;
    let status = if balance_amount <= Decimal::ZERO {
        ChargeStatus::Paid
    } else {
        charge.status
    };

    Settlement {
        paid_amount,
        balance_amount,
        status,
    }
}

fn spreadsheet_disposition(charge_code: &str) -> String {
    format!("attachment; filename=\"planilha_debito_{charge_code}.csv\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use condo_calculator::resolve_parameters;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn charge_header() -> ChargeHeader {
        ChargeHeader {
            client_id: Uuid::new_v4(),
            debtor_id: Uuid::new_v4(),
            unit_id: None,
            charge_date: date(2024, 4, 1),
            due_date: date(2024, 4, 10),
            category: "CONDOMINIUM_FEE".to_string(),
            description: "April fee".to_string(),
            reference_period: Some("2024-04".to_string()),
        }
    }

    fn input(category: &str, nominal: Decimal) -> ChargeItemInput {
        ChargeItemInput {
            category: category.to_string(),
            due_date: date(2024, 4, 10),
            description: "April".to_string(),
            nominal_amount: nominal,
        }
    }

    #[test]
    fn charge_code_shape() {
        let now = Utc.with_ymd_and_hms(2024, 4, 10, 12, 0, 0).unwrap();
        let code = charge_code(now);

        assert_eq!(code.len(), 17);
        assert!(code.starts_with("COB20240410"));
        assert!(
            code[11..]
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }

    #[test]
    fn new_charge_is_priced_before_insertion() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let config = CalculatorConfig::default();
        let parameters = resolve_parameters(&[], now.date_naive(), &config);

        let mut snapshot =
            draft_snapshot(&charge_header(), &[input("principal", dec!(1000))], now).unwrap();
        price_snapshot(&mut snapshot, &parameters, now.date_naive(), &config).unwrap();

        assert_eq!(snapshot.items[0].charge_id, snapshot.charge.id);
        assert_eq!(snapshot.items[0].subtotal, dec!(1035.05));
        assert_eq!(snapshot.charge.principal_amount, dec!(1035.05));
        assert_eq!(snapshot.charge.total_amount, dec!(1366.28));
        assert_eq!(snapshot.charge.balance_amount, dec!(1366.28));
        assert_eq!(snapshot.charge.status, ChargeStatus::Pending);
    }

    #[test]
    fn charge_without_items_totals_zero() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let config = CalculatorConfig::default();
        let parameters = resolve_parameters(&[], now.date_naive(), &config);

        let mut snapshot = draft_snapshot(&charge_header(), &[], now).unwrap();
        price_snapshot(&mut snapshot, &parameters, now.date_naive(), &config).unwrap();

        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.charge.total_amount, Decimal::ZERO);
    }

    #[test]
    fn malformed_items_are_rejected() {
        let now = Utc::now();
        assert!(draft_snapshot(&charge_header(), &[input("RENT", dec!(10))], now).is_err());
        assert!(draft_snapshot(&charge_header(), &[input("PRINCIPAL", dec!(-1))], now).is_err());
    }

    #[test]
    fn payment_settles_when_balance_reaches_zero() {
        let now = Utc::now();
        let mut charge = draft_snapshot(&charge_header(), &[], now).unwrap().charge;
        charge.status = ChargeStatus::Overdue;
        charge.total_amount = dec!(500.00);
        charge.paid_amount = dec!(200.00);

        let partial = settle(&charge, dec!(100.00));
        assert_eq!(partial.paid_amount, dec!(300.00));
        assert_eq!(partial.balance_amount, dec!(200.00));
        assert_eq!(partial.status, ChargeStatus::Overdue);

        let overpaid = settle(&charge, dec!(350.00));
        assert_eq!(overpaid.balance_amount, dec!(-50.00));
        assert_eq!(overpaid.status, ChargeStatus::Paid);
    }

    #[test]
    fn csv_download_is_named_after_the_charge() {
        assert_eq!(
            spreadsheet_disposition("COB20240410ABC123"),
            "attachment; filename=\"planilha_debito_COB20240410ABC123.csv\""
        );
    }
}
