use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Pending,
    Overdue,
    Negotiating,
    Negotiated,
    Paid,
    Cancelled,
}

impl ChargeStatus {
    /// Statuses that keep a unit from receiving another charge.
    pub const OPEN: [ChargeStatus; 4] = [
        ChargeStatus::Pending,
        ChargeStatus::Overdue,
        ChargeStatus::Negotiated,
        ChargeStatus::Negotiating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Overdue => "OVERDUE",
            Self::Negotiating => "NEGOTIATING",
            Self::Negotiated => "NEGOTIATED",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "OVERDUE" => Ok(Self::Overdue),
            "NEGOTIATING" => Ok(Self::Negotiating),
            "NEGOTIATED" => Ok(Self::Negotiated),
            "PAID" => Ok(Self::Paid),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => anyhow::bail!(
                "status must be one of PENDING, OVERDUE, NEGOTIATING, NEGOTIATED, PAID, CANCELLED"
            ),
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    Principal,
    CollectionExpenses,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Principal => "PRINCIPAL",
            Self::CollectionExpenses => "COLLECTION_EXPENSES",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PRINCIPAL" => Ok(Self::Principal),
            "COLLECTION_EXPENSES" => Ok(Self::CollectionExpenses),
            _ => anyhow::bail!("item category must be PRINCIPAL or COLLECTION_EXPENSES"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeType {
    Extrajudicial,
    Execution,
}

impl FeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extrajudicial => "EXTRAJUDICIAL",
            Self::Execution => "EXECUTION",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EXTRAJUDICIAL" => Ok(Self::Extrajudicial),
            "EXECUTION" => Ok(Self::Execution),
            _ => anyhow::bail!("fee_type must be EXTRAJUDICIAL or EXECUTION"),
        }
    }
}

/// How a charge-specific fee override is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "calculationType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeRule {
    Percentage {
        #[serde(rename = "percentageRate")]
        rate: Decimal,
    },
    Fixed {
        #[serde(rename = "fixedAmount")]
        amount: Decimal,
    },
}

impl FeeRule {
    pub fn calculation_type(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "PERCENTAGE",
            Self::Fixed { .. } => "FIXED",
        }
    }

    /// Rebuilds a rule from its stored columns.
    pub fn from_columns(
        calculation_type: &str,
        percentage_rate: Option<Decimal>,
        fixed_amount: Option<Decimal>,
    ) -> anyhow::Result<Self> {
        match calculation_type.trim().to_ascii_uppercase().as_str() {
            "PERCENTAGE" => {
                let rate = percentage_rate
                    .ok_or_else(|| anyhow::anyhow!("percentage fee requires percentage_rate"))?;
                Ok(Self::Percentage { rate })
            }
            "FIXED" => {
                let amount = fixed_amount
                    .ok_or_else(|| anyhow::anyhow!("fixed fee requires fixed_amount"))?;
                Ok(Self::Fixed { amount })
            }
            _ => anyhow::bail!("calculation_type must be PERCENTAGE or FIXED"),
        }
    }

    pub fn percentage_rate(&self) -> Option<Decimal> {
        match self {
            Self::Percentage { rate } => Some(*rate),
            Self::Fixed { .. } => None,
        }
    }

    pub fn fixed_amount(&self) -> Option<Decimal> {
        match self {
            Self::Fixed { amount } => Some(*amount),
            Self::Percentage { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub id: Uuid,
    pub charge_code: String,
    pub client_id: Uuid,
    pub debtor_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub charge_date: NaiveDate,
    pub due_date: NaiveDate,
    pub category: String,
    pub description: String,
    pub reference_period: Option<String>,
    pub status: ChargeStatus,
    pub principal_amount: Decimal,
    pub expenses_amount: Decimal,
    pub extrajudicial_fees: Decimal,
    pub execution_fees: Decimal,
    pub art_523_fine: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeItem {
    pub id: Uuid,
    pub charge_id: Uuid,
    pub category: ItemCategory,
    pub due_date: NaiveDate,
    pub description: String,
    pub nominal_amount: Decimal,
    pub monetary_correction: Decimal,
    pub interest_amount: Decimal,
    pub fine_amount: Decimal,
    pub subtotal: Decimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeFees {
    pub id: Uuid,
    pub charge_id: Uuid,
    pub fee_type: FeeType,
    #[serde(flatten)]
    pub rule: FeeRule,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Monthly percentages and the correction index applied to a client's charges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateSet {
    pub fine_rate: Decimal,
    pub interest_rate: Decimal,
    pub extrajudicial_fees_rate: Decimal,
    pub execution_fees_rate: Decimal,
    pub art_523_fine_rate: Decimal,
    pub correction_index: String,
}

impl RateSet {
    pub fn fee_rate(&self, fee_type: FeeType) -> Decimal {
        match fee_type {
            FeeType::Extrajudicial => self.extrajudicial_fees_rate,
            FeeType::Execution => self.execution_fees_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationParameter {
    pub id: Uuid,
    pub client_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub rates: RateSet,
    pub is_active: bool,
}

impl CalculationParameter {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.is_active && self.start_date <= date && self.end_date.is_none_or(|end| end >= date)
    }

    /// Whether `[start, end]` shares at least one day with this record's window.
    /// An open end extends indefinitely.
    pub fn overlaps(&self, start: NaiveDate, end: Option<NaiveDate>) -> bool {
        if !self.is_active {
            return false;
        }

        let starts_before_other_ends = end.is_none_or(|end| self.start_date <= end);
        let other_starts_before_self_ends = self.end_date.is_none_or(|own_end| start <= own_end);
        starts_before_other_ends && other_starts_before_self_ends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parameter(start: NaiveDate, end: Option<NaiveDate>) -> CalculationParameter {
        CalculationParameter {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            start_date: start,
            end_date: end,
            rates: RateSet {
                fine_rate: dec!(2),
                interest_rate: dec!(1),
                extrajudicial_fees_rate: dec!(10),
                execution_fees_rate: dec!(10),
                art_523_fine_rate: dec!(10),
                correction_index: "INPC".to_string(),
            },
            is_active: true,
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn window_covers_inclusive_bounds() {
        let record = parameter(date(2024, 1, 1), Some(date(2024, 6, 30)));
        assert!(record.covers(date(2024, 1, 1)));
        assert!(record.covers(date(2024, 6, 30)));
        assert!(!record.covers(date(2023, 12, 31)));
        assert!(!record.covers(date(2024, 7, 1)));
    }

    #[test]
    fn open_window_never_expires() {
        let record = parameter(date(2024, 1, 1), None);
        assert!(record.covers(date(2099, 1, 1)));
    }

    #[test]
    fn inactive_record_neither_covers_nor_overlaps() {
        let mut record = parameter(date(2024, 1, 1), None);
        record.is_active = false;
        assert!(!record.covers(date(2024, 2, 1)));
        assert!(!record.overlaps(date(2024, 2, 1), None));
    }

    #[test]
    fn overlap_detection() {
        let record = parameter(date(2024, 1, 1), Some(date(2024, 6, 30)));
        assert!(record.overlaps(date(2024, 6, 30), None));
        assert!(record.overlaps(date(2023, 1, 1), Some(date(2024, 1, 1))));
        assert!(!record.overlaps(date(2024, 7, 1), None));
        assert!(!record.overlaps(date(2023, 1, 1), Some(date(2023, 12, 31))));

        let open = parameter(date(2024, 1, 1), None);
        assert!(open.overlaps(date(2030, 1, 1), Some(date(2030, 2, 1))));
        assert!(!open.overlaps(date(2020, 1, 1), Some(date(2023, 12, 31))));
    }

    #[test]
    fn fee_rule_from_columns() {
        let rule = FeeRule::from_columns("percentage", Some(dec!(15)), None).unwrap();
        assert_eq!(rule, FeeRule::Percentage { rate: dec!(15) });

        let fixed = FeeRule::from_columns("FIXED", None, Some(dec!(500))).unwrap();
        assert_eq!(fixed.fixed_amount(), Some(dec!(500)));

        assert!(FeeRule::from_columns("FIXED", Some(dec!(1)), None).is_err());
        assert!(FeeRule::from_columns("HOURLY", None, None).is_err());
    }

    #[test]
    fn open_statuses_block_new_charges() {
        assert!(ChargeStatus::Negotiated.is_open());
        assert!(!ChargeStatus::Paid.is_open());
        assert!(ChargeStatus::Cancelled.is_closed());
        assert_eq!(ChargeStatus::parse(" overdue ").unwrap(), ChargeStatus::Overdue);
    }
}
