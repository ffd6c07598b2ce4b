use std::path::{Path as FsPath, PathBuf};

use anyhow::Result as AnyResult;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use condo_core::{
    ChargeDocument, ChargeProgress, ChargeStatus, WhatsAppMessage, build_timeline,
    contact_summary,
};
use condo_platform::{
    ChargeTrail, CreateProgressRequest, InboundWhatsAppMessage, RegisterDocumentRequest,
    TimelineResponse, TimelineSummary, WebhookOutcome, WhatsAppWebhook,
};
use condo_store::rows::{
    DOCUMENT_COLUMNS, PROGRESS_COLUMNS, WHATSAPP_COLUMNS, collect_rows, document_from_row,
    progress_from_row, whatsapp_from_row,
};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    AppState,
    http::{HttpError, ensure_exists, internal_error, optional_text, required_text},
};

const WEBHOOK_RESPONSIBLE: &str = "WhatsApp System";

pub(crate) async fn list_progress(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
) -> Result<Json<ChargeTrail<ChargeProgress>>, HttpError> {
    ensure_exists(&state.pool, "charges", "charge", charge_id).await?;
    let progress = charge_progress(&state.pool, charge_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(ChargeTrail::new(charge_id, progress)))
}

pub(crate) async fn add_progress(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Json(payload): Json<CreateProgressRequest>,
) -> Result<(StatusCode, Json<ChargeProgress>), HttpError> {
    ensure_exists(&state.pool, "charges", "charge", charge_id).await?;

    let progress_type = required_text(payload.progress_type, "progressType")?.to_ascii_uppercase();
    let title = required_text(payload.title, "title")?;
    let description = required_text(payload.description, "description")?;
    let priority = optional_text(payload.priority)
        .map(|priority| priority.to_ascii_uppercase())
        .unwrap_or_else(|| "MEDIUM".to_string());
    let now = Utc::now();

    let sql = format!(
        "INSERT INTO charge_progress (
            id, charge_id, progress_date, progress_type, title, description, user_id,
            responsible_name, whatsapp_message_id, email_id, phone_number, priority,
            is_milestone, is_active, created_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, TRUE, $14)
         RETURNING {PROGRESS_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(charge_id)
        .bind(payload.progress_date.unwrap_or(now))
        .bind(&progress_type)
        .bind(&title)
        .bind(&description)
        .bind(payload.user_id)
        .bind(optional_text(payload.responsible_name))
        .bind(optional_text(payload.whatsapp_message_id))
        .bind(optional_text(payload.email_id))
        .bind(optional_text(payload.phone_number))
        .bind(&priority)
        .bind(payload.is_milestone)
        .bind(now)
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    let progress = progress_from_row(&row).map_err(internal_error)?;
    info!(%charge_id, progress_type = %progress.progress_type, "progress recorded");
    Ok((StatusCode::CREATED, Json(progress)))
}

pub(crate) async fn list_documents(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
) -> Result<Json<ChargeTrail<ChargeDocument>>, HttpError> {
    ensure_exists(&state.pool, "charges", "charge", charge_id).await?;
    let documents = charge_documents(&state.pool, charge_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(ChargeTrail::new(charge_id, documents)))
}

pub(crate) async fn register_document(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
    Json(payload): Json<RegisterDocumentRequest>,
) -> Result<(StatusCode, Json<ChargeDocument>), HttpError> {
    ensure_exists(&state.pool, "charges", "charge", charge_id).await?;

    let file_name = payload.file_name.trim().to_string();
    if file_name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "fileName is required".to_string()));
    }
    if payload.file_size < 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "fileSize must be non-negative".to_string(),
        ));
    }

    if let Some(progress_id) = payload.progress_id {
        let linked = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM charge_progress WHERE id = $1 AND charge_id = $2)",
        )
        .bind(progress_id)
        .bind(charge_id)
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;
        if !linked {
            return Err((
                StatusCode::BAD_REQUEST,
                "progressId does not belong to this charge".to_string(),
            ));
        }
    }

    let document_id = Uuid::new_v4();
    let file_path = document_path(&state.upload_dir, charge_id, document_id, &file_name);
    let document_type = optional_text(payload.document_type)
        .map(|kind| kind.to_ascii_uppercase())
        .unwrap_or_else(|| "OTHER".to_string());
    let title = optional_text(payload.title).unwrap_or_else(|| file_name.clone());

    let sql = format!(
        "INSERT INTO charge_documents (
            id, charge_id, progress_id, document_type, title, description, file_name,
            file_path, file_size, file_type, uploaded_by_id, upload_date, is_active
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE)
         RETURNING {DOCUMENT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(document_id)
        .bind(charge_id)
        .bind(payload.progress_id)
        .bind(&document_type)
        .bind(&title)
        .bind(optional_text(payload.description))
        .bind(&file_name)
        .bind(file_path.to_string_lossy().into_owned())
        .bind(payload.file_size)
        .bind(optional_text(payload.file_type))
        .bind(payload.uploaded_by_id)
        .bind(Utc::now())
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(document_from_row(&row).map_err(internal_error)?),
    ))
}

pub(crate) async fn list_whatsapp(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
) -> Result<Json<ChargeTrail<WhatsAppMessage>>, HttpError> {
    ensure_exists(&state.pool, "charges", "charge", charge_id).await?;
    let messages = charge_messages(&state.pool, charge_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(ChargeTrail::new(charge_id, messages)))
}

pub(crate) async fn charge_timeline(
    State(state): State<AppState>,
    Path(charge_id): Path<Uuid>,
) -> Result<Json<TimelineResponse>, HttpError> {
    ensure_exists(&state.pool, "charges", "charge", charge_id).await?;

    let progress = charge_progress(&state.pool, charge_id)
        .await
        .map_err(internal_error)?;
    let messages = charge_messages(&state.pool, charge_id)
        .await
        .map_err(internal_error)?;
    let documents = charge_documents(&state.pool, charge_id)
        .await
        .map_err(internal_error)?;

    let timeline = build_timeline(&progress, &messages, &documents).map_err(internal_error)?;
    let summary = TimelineSummary {
        progress_entries: progress.len(),
        whatsapp_messages: messages.len(),
        documents: documents.len(),
        total_events: timeline.len(),
    };

    Ok(Json(TimelineResponse {
        charge_id,
        timeline,
        summary,
    }))
}

/// Each message is stored in its own transaction. Any failure turns the
/// response into a 500 so the provider redelivers; stored messages are then
/// skipped as duplicates.
pub(crate) async fn whatsapp_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WhatsAppWebhook>,
) -> (StatusCode, Json<WebhookOutcome>) {
    let mut outcome = WebhookOutcome {
        received: payload.messages.len(),
        duplicates: 0,
        linked: 0,
        failed: 0,
    };

    for message in &payload.messages {
        let result = record_inbound(&state.pool, message).await;
        if let Err(err) = &result {
            error!(message_id = %message.id, "whatsapp webhook message failed: {err:#}");
        }
        tally(&mut outcome, &result);
    }

    info!(
        received = outcome.received,
        duplicates = outcome.duplicates,
        linked = outcome.linked,
        failed = outcome.failed,
        "whatsapp webhook processed"
    );
    (webhook_status(&outcome), Json(outcome))
}

fn tally(outcome: &mut WebhookOutcome, result: &AnyResult<Inbound>) {
    match result {
        Ok(Inbound::Duplicate) => outcome.duplicates += 1,
        Ok(Inbound::Stored { charge_id: Some(_) }) => outcome.linked += 1,
        Ok(Inbound::Stored { charge_id: None }) => {}
        Err(_) => outcome.failed += 1,
    }
}

fn webhook_status(outcome: &WebhookOutcome) -> StatusCode {
    if outcome.failed > 0 {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

enum Inbound {
    Duplicate,
    Stored { charge_id: Option<Uuid> },
}

/// Stores one inbound message and, when the sender is the debtor of an open
/// charge, links it and logs the contact on that charge.
async fn record_inbound(pool: &PgPool, message: &InboundWhatsAppMessage) -> AnyResult<Inbound> {
    let phone_number = message.phone_number();
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let charge_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT c.id
        FROM charges c
        JOIN people p ON p.id = c.debtor_id
        WHERE p.phone = $1
          AND c.is_active = TRUE
          AND c.status = ANY($2)
        ORDER BY c.created_at ASC
        LIMIT 1
        "#,
    )
    .bind(&phone_number)
    .bind(contactable_statuses())
    .fetch_optional(&mut *tx)
    .await?;

    let inserted = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO whatsapp_messages (
            id, message_id, charge_id, phone_number, contact_name, message_type, direction,
            content, media_url, media_type, status, sent_at, webhook_data, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'INBOUND', $7, $8, $9, 'RECEIVED', $10, $11, TRUE)
        ON CONFLICT (message_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&message.id)
    .bind(charge_id)
    .bind(&phone_number)
    .bind(&message.profile.name)
    .bind(message.message_type.trim().to_ascii_uppercase())
    .bind(&message.body)
    .bind(&message.media_url)
    .bind(&message.media_type)
    .bind(now)
    .bind(serde_json::to_value(message)?)
    .fetch_optional(&mut *tx)
    .await?;

    if inserted.is_none() {
        tx.rollback().await?;
        return Ok(Inbound::Duplicate);
    }

    if let Some(charge_id) = charge_id {
        sqlx::query(
            r#"
            INSERT INTO charge_progress (
                id, charge_id, progress_date, progress_type, title, description,
                responsible_name, whatsapp_message_id, phone_number, priority,
                is_milestone, is_active, created_at
            )
            VALUES ($1, $2, $3, 'WHATSAPP_CONTACT', $4, $5, $6, $7, $8, 'MEDIUM', FALSE, TRUE, $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(charge_id)
        .bind(now)
        .bind(format!("WhatsApp message received from {phone_number}"))
        .bind(contact_summary(&message.body))
        .bind(WEBHOOK_RESPONSIBLE)
        .bind(&message.id)
        .bind(&phone_number)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(Inbound::Stored { charge_id })
}

async fn charge_progress(pool: &PgPool, charge_id: Uuid) -> AnyResult<Vec<ChargeProgress>> {
    let sql = format!(
        "SELECT {PROGRESS_COLUMNS} FROM charge_progress
         WHERE charge_id = $1 AND is_active = TRUE
         ORDER BY progress_date DESC"
    );
    let rows = sqlx::query(&sql).bind(charge_id).fetch_all(pool).await?;
    collect_rows(&rows, progress_from_row)
}

async fn charge_documents(pool: &PgPool, charge_id: Uuid) -> AnyResult<Vec<ChargeDocument>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM charge_documents
         WHERE charge_id = $1 AND is_active = TRUE
         ORDER BY upload_date DESC"
    );
    let rows = sqlx::query(&sql).bind(charge_id).fetch_all(pool).await?;
    collect_rows(&rows, document_from_row)
}

async fn charge_messages(pool: &PgPool, charge_id: Uuid) -> AnyResult<Vec<WhatsAppMessage>> {
    let sql = format!(
        "SELECT {WHATSAPP_COLUMNS} FROM whatsapp_messages
         WHERE charge_id = $1 AND is_active = TRUE
         ORDER BY sent_at DESC"
    );
    let rows = sqlx::query(&sql).bind(charge_id).fetch_all(pool).await?;
    collect_rows(&rows, whatsapp_from_row)
}

/// Charges an inbound message may be attached to.
fn contactable_statuses() -> Vec<String> {
    [
        ChargeStatus::Pending,
        ChargeStatus::Overdue,
        ChargeStatus::Negotiating,
    ]
    .iter()
    .map(|status| status.as_str().to_string())
    .collect()
}

/// `<upload_dir>/charges/<charge>/<document><.ext>`, keeping the original extension.
fn document_path(
    upload_dir: &FsPath,
    charge_id: Uuid,
    document_id: Uuid,
    file_name: &str,
) -> PathBuf {
    let stored_name = match FsPath::new(file_name).extension() {
        Some(ext) => format!("{document_id}.{}", ext.to_string_lossy()),
        None => document_id.to_string(),
    };

    upload_dir
        .join("charges")
        .join(charge_id.to_string())
        .join(stored_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_path_keeps_extension() {
        let charge_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        let path = document_path(FsPath::new("uploads"), charge_id, document_id, "notice.PDF");
        assert_eq!(
            path,
            PathBuf::from(format!("uploads/charges/{charge_id}/{document_id}.PDF"))
        );

        let bare = document_path(FsPath::new("/srv/files"), charge_id, document_id, "README");
        assert_eq!(bare.file_name().unwrap().to_string_lossy(), document_id.to_string());
    }

    #[test]
    fn failed_messages_are_counted_and_fail_the_delivery() {
        let mut outcome = WebhookOutcome {
            received: 4,
            duplicates: 0,
            linked: 0,
            failed: 0,
        };

        tally(&mut outcome, &Ok(Inbound::Duplicate));
        tally(&mut outcome, &Ok(Inbound::Stored { charge_id: Some(Uuid::new_v4()) }));
        tally(&mut outcome, &Ok(Inbound::Stored { charge_id: None }));
        assert_eq!(webhook_status(&outcome), StatusCode::OK);

        tally(&mut outcome, &Err(anyhow::anyhow!("connection reset")));

        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.linked, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(webhook_status(&outcome), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn negotiated_charges_do_not_receive_contacts() {
        let statuses = contactable_statuses();
        assert_eq!(statuses, vec!["PENDING", "OVERDUE", "NEGOTIATING"]);
        assert!(!statuses.contains(&"NEGOTIATED".to_string()));
    }
}
