use chrono::{DateTime, NaiveDate, Utc};
use condo_core::{
    Charge, ChargeFees, ChargeItem, ChargeStatus, Client, FeeRule, FeeType, Unit, UnitOwner,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Normalised paging window: page is 1-based, limit clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
}

impl PageWindow {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl<T> Paged<T> {
    pub fn new(data: Vec<T>, total: i64, window: PageWindow) -> Self {
        Self {
            data,
            total,
            page: window.page,
            limit: window.limit,
            pages: window.pages(total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub data: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(data: Vec<T>) -> Self {
        let total = data.len();
        Self { data, total }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonRequest {
    pub name: String,
    pub document: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub person_id: Option<Uuid>,
    pub client_code: Option<String>,
    pub contract_start_date: Option<NaiveDate>,
    pub contract_end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    #[serde(flatten)]
    pub client: Client,
    pub person_name: String,
    pub person_document: Option<String>,
    pub total_units: i64,
    pub active_charges: i64,
    pub total_debt: Decimal,
    pub success_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUnitRequest {
    pub unit_code: Option<String>,
    pub unit_type: Option<String>,
    pub number: Option<String>,
    pub block: Option<String>,
    pub floor: Option<String>,
    pub area: Option<Decimal>,
    pub ideal_fraction: Option<Decimal>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitWithOwners {
    #[serde(flatten)]
    pub unit: Unit,
    pub owners: Vec<UnitOwner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOwnerRequest {
    pub person_id: Uuid,
    #[serde(default = "default_ownership_type")]
    pub ownership_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParameterRequest {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub fine_rate: Decimal,
    pub interest_rate: Decimal,
    pub extrajudicial_fees_rate: Decimal,
    pub execution_fees_rate: Decimal,
    pub art_523_fine_rate: Decimal,
    #[serde(default = "default_correction_index")]
    pub correction_index: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeItemInput {
    pub category: String,
    pub due_date: NaiveDate,
    pub description: String,
    pub nominal_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChargeRequest {
    pub client_id: Option<Uuid>,
    pub debtor_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub charge_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub reference_period: Option<String>,
    #[serde(default)]
    pub items: Vec<ChargeItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitChargeStatus {
    pub unit_id: Uuid,
    pub can_create_new_charge: bool,
    pub active_charges: Vec<Charge>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUnitInput {
    pub unit_id: Uuid,
    pub debtor_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateRequest {
    pub client_id: Option<Uuid>,
    pub charge_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub reference_period: Option<String>,
    #[serde(default)]
    pub units: Vec<BulkUnitInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedUnit {
    pub unit_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BulkSummary {
    pub created: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateResponse {
    pub created_charges: Vec<Charge>,
    pub skipped_units: Vec<SkippedUnit>,
    pub summary: BulkSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeListQuery {
    pub client_id: Option<Uuid>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

impl AsOfQuery {
    /// The requested calculation date, today (UTC) when absent.
    pub fn date(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDetail {
    #[serde(flatten)]
    pub charge: Charge,
    pub items: Vec<ChargeItem>,
    pub fees: Vec<ChargeFees>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateRequest {
    pub notes: Option<String>,
    pub responsible_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeOverrideRequest {
    pub fee_type: FeeType,
    #[serde(flatten)]
    pub rule: FeeRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatistics {
    pub total_charges: usize,
    pub paid_charges: usize,
    pub negotiated_charges: usize,
    pub pending_charges: usize,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub success_rate: Decimal,
}

impl UnitStatistics {
    pub fn from_charges(charges: &[Charge]) -> Self {
        let count = |wanted: &[ChargeStatus]| {
            charges
                .iter()
                .filter(|charge| wanted.contains(&charge.status))
                .count()
        };
        let paid_charges = count(&[ChargeStatus::Paid]);
        let total_amount: Decimal = charges.iter().map(|charge| charge.total_amount).sum();
        let paid_amount: Decimal = charges.iter().map(|charge| charge.paid_amount).sum();

        Self {
            total_charges: charges.len(),
            paid_charges,
            negotiated_charges: count(&[ChargeStatus::Negotiated]),
            pending_charges: count(&[ChargeStatus::Pending, ChargeStatus::Overdue]),
            total_amount,
            paid_amount,
            balance_amount: total_amount - paid_amount,
            success_rate: success_rate(paid_charges as i64, charges.len() as i64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitHistoryResponse {
    pub unit: Unit,
    pub charges: Vec<Charge>,
    pub statistics: UnitStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProgressRequest {
    pub progress_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub progress_date: Option<DateTime<Utc>>,
    pub priority: Option<String>,
    pub user_id: Option<Uuid>,
    pub responsible_name: Option<String>,
    pub whatsapp_message_id: Option<String>,
    pub email_id: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_milestone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDocumentRequest {
    pub file_name: String,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub document_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub progress_id: Option<Uuid>,
    pub uploaded_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeTrail<T> {
    pub charge_id: Uuid,
    pub entries: Vec<T>,
    pub total: usize,
}

impl<T> ChargeTrail<T> {
    pub fn new(charge_id: Uuid, entries: Vec<T>) -> Self {
        let total = entries.len();
        Self {
            charge_id,
            entries,
            total,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhatsAppWebhook {
    #[serde(default)]
    pub messages: Vec<InboundWhatsAppMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhatsAppProfile {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundWhatsAppMessage {
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub profile: WhatsAppProfile,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

impl InboundWhatsAppMessage {
    /// Sender number without the provider's `whatsapp:` prefix.
    pub fn phone_number(&self) -> String {
        self.from.replace("whatsapp:", "").trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub received: usize,
    pub duplicates: usize,
    pub linked: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSummary {
    pub progress_entries: usize,
    pub whatsapp_messages: usize,
    pub documents: usize,
    pub total_events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineResponse {
    pub charge_id: Uuid,
    pub timeline: Vec<condo_core::TimelineEntry>,
    pub summary: TimelineSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertIndexRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexValueRequest {
    pub reference_date: Option<NaiveDate>,
    pub value: Option<Decimal>,
}

/// Share of paid charges as a percentage with two decimals; 0 without charges.
pub fn success_rate(paid: i64, total: i64) -> Decimal {
    if total <= 0 {
        return Decimal::ZERO;
    }

    (Decimal::from(paid) * Decimal::ONE_HUNDRED / Decimal::from(total))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn default_ownership_type() -> String {
    "OWNER".to_string()
}

fn default_correction_index() -> String {
    "INPC".to_string()
}

fn default_message_type() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn charge(status: ChargeStatus, total: Decimal, paid: Decimal) -> Charge {
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        Charge {
            id: Uuid::new_v4(),
            charge_code: "COB20240110ABC123".to_string(),
            client_id: Uuid::nil(),
            debtor_id: Uuid::nil(),
            unit_id: None,
            charge_date: date,
            due_date: date,
            category: "CONDOMINIUM_FEE".to_string(),
            description: "fee".to_string(),
            reference_period: None,
            status,
            principal_amount: total,
            expenses_amount: Decimal::ZERO,
            extrajudicial_fees: Decimal::ZERO,
            execution_fees: Decimal::ZERO,
            art_523_fine: Decimal::ZERO,
            total_amount: total,
            paid_amount: paid,
            balance_amount: total - paid,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn page_window_clamps() {
        let window = PageWindow::new(Some(0), Some(1000));
        assert_eq!(window, PageWindow { page: 1, limit: 100 });
        assert_eq!(window.offset(), 0);

        let third = PageWindow::new(Some(3), None);
        assert_eq!(third.offset(), 20);
        assert_eq!(third.pages(21), 3);
        assert_eq!(third.pages(0), 0);
    }

    #[test]
    fn success_rate_rounds_to_cents() {
        assert_eq!(success_rate(1, 3), dec!(33.33));
        assert_eq!(success_rate(2, 3), dec!(66.67));
        assert_eq!(success_rate(0, 0), Decimal::ZERO);
    }

    #[test]
    fn unit_statistics_group_statuses() {
        let charges = vec![
            charge(ChargeStatus::Paid, dec!(500), dec!(500)),
            charge(ChargeStatus::Overdue, dec!(300), Decimal::ZERO),
            charge(ChargeStatus::Pending, dec!(200), Decimal::ZERO),
            charge(ChargeStatus::Negotiated, dec!(1000), dec!(250)),
        ];

        let statistics = UnitStatistics::from_charges(&charges);

        assert_eq!(statistics.total_charges, 4);
        assert_eq!(statistics.paid_charges, 1);
        assert_eq!(statistics.pending_charges, 2);
        assert_eq!(statistics.negotiated_charges, 1);
        assert_eq!(statistics.total_amount, dec!(2000));
        assert_eq!(statistics.paid_amount, dec!(750));
        assert_eq!(statistics.balance_amount, dec!(1250));
        assert_eq!(statistics.success_rate, dec!(25.00));
    }

    #[test]
    fn webhook_sender_prefix_is_stripped() {
        let payload = r#"{"messages":[{"id":"wamid.1","from":"whatsapp:+5511999990000","body":"hi"}]}"#;
        let webhook: WhatsAppWebhook = serde_json::from_str(payload).unwrap();

        let message = &webhook.messages[0];
        assert_eq!(message.phone_number(), "+5511999990000");
        assert_eq!(message.message_type, "text");
        assert!(message.profile.name.is_none());
    }

    #[test]
    fn fee_override_reads_flat_rule() {
        let payload = r#"{"feeType":"EXECUTION","calculationType":"FIXED","fixedAmount":"750.00"}"#;
        let request: FeeOverrideRequest = serde_json::from_str(payload).unwrap();

        assert_eq!(request.fee_type, FeeType::Execution);
        assert_eq!(request.rule, FeeRule::Fixed { amount: dec!(750.00) });
    }
}
