use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CalculationParameter, Charge, ChargeFees, ChargeItem};

/// Everything the calculator reads for one charge: the charge row with its
/// active items and active fee overrides.
#[derive(Debug, Clone)]
pub struct ChargeSnapshot {
    pub charge: Charge,
    pub items: Vec<ChargeItem>,
    pub fees: Vec<ChargeFees>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAmounts {
    pub item_id: Uuid,
    pub monetary_correction: Decimal,
    pub interest_amount: Decimal,
    pub fine_amount: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeAmounts {
    pub principal_amount: Decimal,
    pub expenses_amount: Decimal,
    pub extrajudicial_fees: Decimal,
    pub execution_fees: Decimal,
    pub art_523_fine: Decimal,
    pub total_amount: Decimal,
}

/// Derived values written back by one recalculation pass.
#[derive(Debug, Clone)]
pub struct RecalculationUpdate {
    pub charge_id: Uuid,
    pub amounts: ChargeAmounts,
    pub items: Vec<ItemAmounts>,
}

#[async_trait]
pub trait ChargeStore: Send + Sync {
    async fn load_charge(&self, charge_id: Uuid) -> anyhow::Result<Option<ChargeSnapshot>>;

    async fn client_parameters(&self, client_id: Uuid)
    -> anyhow::Result<Vec<CalculationParameter>>;

    /// Writes every derived field in one transaction. The balance is taken
    /// against the paid amount stored at commit time. Nothing is written when
    /// any step fails, and `None` means the charge was cancelled or removed
    /// after it was loaded.
    async fn save_recalculation(
        &self,
        update: &RecalculationUpdate,
    ) -> anyhow::Result<Option<Charge>>;
}
