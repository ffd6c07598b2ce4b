use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const CONTACT_SUMMARY_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeProgress {
    pub id: Uuid,
    pub charge_id: Uuid,
    pub progress_date: DateTime<Utc>,
    pub progress_type: String,
    pub title: String,
    pub description: String,
    pub user_id: Option<Uuid>,
    pub responsible_name: Option<String>,
    pub whatsapp_message_id: Option<String>,
    pub email_id: Option<String>,
    pub phone_number: Option<String>,
    pub priority: String,
    pub is_milestone: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDocument {
    pub id: Uuid,
    pub charge_id: Uuid,
    pub progress_id: Option<Uuid>,
    pub document_type: String,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub uploaded_by_id: Option<Uuid>,
    pub upload_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppMessage {
    pub id: Uuid,
    pub message_id: String,
    pub charge_id: Option<Uuid>,
    pub phone_number: String,
    pub contact_name: Option<String>,
    pub message_type: String,
    pub direction: String,
    pub content: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub webhook_data: Value,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineKind {
    Progress,
    Whatsapp,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "type")]
    pub kind: TimelineKind,
    pub date: DateTime<Utc>,
    pub data: Value,
}

/// Merges the three trails of a charge, newest first.
pub fn build_timeline(
    progress: &[ChargeProgress],
    messages: &[WhatsAppMessage],
    documents: &[ChargeDocument],
) -> anyhow::Result<Vec<TimelineEntry>> {
    let mut timeline = Vec::with_capacity(progress.len() + messages.len() + documents.len());

    for entry in progress {
        timeline.push(TimelineEntry {
            kind: TimelineKind::Progress,
            date: entry.progress_date,
            data: serde_json::to_value(entry)?,
        });
    }
    for message in messages {
        timeline.push(TimelineEntry {
            kind: TimelineKind::Whatsapp,
            date: message.sent_at,
            data: serde_json::to_value(message)?,
        });
    }
    for document in documents {
        timeline.push(TimelineEntry {
            kind: TimelineKind::Document,
            date: document.upload_date,
            data: serde_json::to_value(document)?,
        });
    }

    // stable: equal timestamps keep progress, whatsapp, document order
    timeline.sort_by(|left, right| right.date.cmp(&left.date));
    Ok(timeline)
}

/// Progress description recorded for an inbound contact.
pub fn contact_summary(content: &str) -> String {
    if content.chars().count() > CONTACT_SUMMARY_CHARS {
        let head: String = content.chars().take(CONTACT_SUMMARY_CHARS).collect();
        format!("Content: {head}...")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn progress_at(at: DateTime<Utc>) -> ChargeProgress {
        ChargeProgress {
            id: Uuid::new_v4(),
            charge_id: Uuid::nil(),
            progress_date: at,
            progress_type: "NOTE".to_string(),
            title: "call".to_string(),
            description: "called debtor".to_string(),
            user_id: None,
            responsible_name: None,
            whatsapp_message_id: None,
            email_id: None,
            phone_number: None,
            priority: "MEDIUM".to_string(),
            is_milestone: false,
            is_active: true,
            created_at: at,
        }
    }

    fn document_at(at: DateTime<Utc>) -> ChargeDocument {
        ChargeDocument {
            id: Uuid::new_v4(),
            charge_id: Uuid::nil(),
            progress_id: None,
            document_type: "OTHER".to_string(),
            title: "notice".to_string(),
            description: None,
            file_name: "notice.pdf".to_string(),
            file_path: "uploads/notice.pdf".to_string(),
            file_size: 1024,
            file_type: Some("application/pdf".to_string()),
            uploaded_by_id: None,
            upload_date: at,
            is_active: true,
        }
    }

    #[test]
    fn timeline_is_newest_first() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let progress = vec![progress_at(base), progress_at(base + Duration::days(2))];
        let documents = vec![document_at(base + Duration::days(1))];

        let timeline = build_timeline(&progress, &[], &documents).unwrap();

        let kinds: Vec<TimelineKind> = timeline.iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TimelineKind::Progress,
                TimelineKind::Document,
                TimelineKind::Progress
            ]
        );
        assert_eq!(timeline[0].date, base + Duration::days(2));
        assert_eq!(timeline[1].data["fileName"], "notice.pdf");
    }

    #[test]
    fn short_contact_kept_verbatim() {
        assert_eq!(contact_summary("ok, I will pay"), "ok, I will pay");
    }

    #[test]
    fn long_contact_truncated_on_characters() {
        let content = "é".repeat(150);
        let summary = contact_summary(&content);
        assert!(summary.starts_with("Content: "));
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().filter(|c| *c == 'é').count(), 100);
    }
}
