use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use condo_core::{
    CalculationParameter, Charge, ChargeFees, ChargeItem, ChargeSnapshot, ChargeStore,
    RecalculationUpdate,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    charges: HashMap<Uuid, Charge>,
    items: HashMap<Uuid, Vec<ChargeItem>>,
    fees: HashMap<Uuid, Vec<ChargeFees>>,
    parameters: HashMap<Uuid, Vec<CalculationParameter>>,
}

/// Process-local store. Saves are staged on a copy and swapped in whole, so a
/// failed save leaves every table untouched.
#[derive(Default)]
pub struct InMemoryChargeStore {
    tables: RwLock<Tables>,
    fail_saves: AtomicBool,
}

impl InMemoryChargeStore {
    pub async fn insert_charge(&self, charge: Charge) {
        let mut tables = self.tables.write().await;
        tables.charges.insert(charge.id, charge);
    }

    pub async fn insert_item(&self, item: ChargeItem) {
        let mut tables = self.tables.write().await;
        tables.items.entry(item.charge_id).or_default().push(item);
    }

    pub async fn insert_fee(&self, fee: ChargeFees) {
        let mut tables = self.tables.write().await;
        tables.fees.entry(fee.charge_id).or_default().push(fee);
    }

    pub async fn insert_parameter(&self, parameter: CalculationParameter) {
        let mut tables = self.tables.write().await;
        tables
            .parameters
            .entry(parameter.client_id)
            .or_default()
            .push(parameter);
    }

    pub async fn set_paid_amount(&self, charge_id: Uuid, paid_amount: Decimal) -> Result<()> {
        let mut tables = self.tables.write().await;
        let charge = tables
            .charges
            .get_mut(&charge_id)
            .ok_or_else(|| anyhow::anyhow!("charge {charge_id} not found"))?;
        charge.paid_amount = paid_amount;
        Ok(())
    }

    pub async fn charge(&self, charge_id: Uuid) -> Option<Charge> {
        self.tables.read().await.charges.get(&charge_id).cloned()
    }

    pub async fn items(&self, charge_id: Uuid) -> Vec<ChargeItem> {
        let tables = self.tables.read().await;
        tables.items.get(&charge_id).cloned().unwrap_or_default()
    }

    /// Makes every following save fail after staging its writes.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChargeStore for InMemoryChargeStore {
    async fn load_charge(&self, charge_id: Uuid) -> Result<Option<ChargeSnapshot>> {
        let tables = self.tables.read().await;
        let Some(charge) = tables.charges.get(&charge_id).filter(|charge| charge.is_active) else {
            return Ok(None);
        };

        let active_items = |items: &Vec<ChargeItem>| {
            items
                .iter()
                .filter(|item| item.is_active)
                .cloned()
                .collect::<Vec<_>>()
        };
        let mut fees: Vec<ChargeFees> = tables
            .fees
            .get(&charge_id)
            .map(|fees| fees.iter().filter(|fee| fee.is_active).cloned().collect())
            .unwrap_or_default();
        fees.sort_by_key(|fee| fee.created_at);

        Ok(Some(ChargeSnapshot {
            charge: charge.clone(),
            items: tables.items.get(&charge_id).map(active_items).unwrap_or_default(),
            fees,
        }))
    }

    async fn client_parameters(&self, client_id: Uuid) -> Result<Vec<CalculationParameter>> {
        let tables = self.tables.read().await;
        Ok(tables
            .parameters
            .get(&client_id)
            .map(|records| records.iter().filter(|record| record.is_active).cloned().collect())
            .unwrap_or_default())
    }

    async fn save_recalculation(&self, update: &RecalculationUpdate) -> Result<Option<Charge>> {
        let mut tables = self.tables.write().await;

        let Some(mut charge) = tables
            .charges
            .get(&update.charge_id)
            .filter(|charge| charge.is_active)
            .cloned()
        else {
            return Ok(None);
        };
        let mut items = tables.items.get(&update.charge_id).cloned().unwrap_or_default();

        for computed in &update.items {
            let item = items
                .iter_mut()
                .find(|item| item.id == computed.item_id)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "charge item {} does not belong to charge {}",
                        computed.item_id,
                        update.charge_id
                    )
                })?;
            item.monetary_correction = computed.monetary_correction;
            item.interest_amount = computed.interest_amount;
            item.fine_amount = computed.fine_amount;
            item.subtotal = computed.subtotal;
        }

        let amounts = &update.amounts;
        charge.principal_amount = amounts.principal_amount;
        charge.expenses_amount = amounts.expenses_amount;
        charge.extrajudicial_fees = amounts.extrajudicial_fees;
        charge.execution_fees = amounts.execution_fees;
        charge.art_523_fine = amounts.art_523_fine;
        charge.total_amount = amounts.total_amount;
        charge.balance_amount = amounts.total_amount - charge.paid_amount;
        charge.updated_at = Utc::now();

        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("simulated storage failure while saving charge {}", charge.id);
        }

        tables.items.insert(update.charge_id, items);
        tables.charges.insert(update.charge_id, charge.clone());
        Ok(Some(charge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use condo_core::{ChargeAmounts, ChargeStatus, ItemAmounts, ItemCategory};
    use rust_decimal_macros::dec;

    fn charge(paid_amount: Decimal) -> Charge {
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        Charge {
            id: Uuid::new_v4(),
            charge_code: "COB20240210FFFFFF".to_string(),
            client_id: Uuid::new_v4(),
            debtor_id: Uuid::new_v4(),
            unit_id: None,
            charge_date: date,
            due_date: date,
            category: "CONDOMINIUM_FEE".to_string(),
            description: "February fee".to_string(),
            reference_period: None,
            status: ChargeStatus::Pending,
            principal_amount: Decimal::ZERO,
            expenses_amount: Decimal::ZERO,
            extrajudicial_fees: Decimal::ZERO,
            execution_fees: Decimal::ZERO,
            art_523_fine: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            paid_amount,
            balance_amount: Decimal::ZERO,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(charge_id: Uuid) -> ChargeItem {
        ChargeItem {
            id: Uuid::new_v4(),
            charge_id,
            category: ItemCategory::Principal,
            due_date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            description: "February fee".to_string(),
            nominal_amount: dec!(500),
            monetary_correction: Decimal::ZERO,
            interest_amount: Decimal::ZERO,
            fine_amount: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            is_active: true,
        }
    }

    fn update(charge_id: Uuid, item_id: Uuid, total: Decimal) -> RecalculationUpdate {
        RecalculationUpdate {
            charge_id,
            amounts: ChargeAmounts {
                principal_amount: total,
                expenses_amount: Decimal::ZERO,
                extrajudicial_fees: Decimal::ZERO,
                execution_fees: Decimal::ZERO,
                art_523_fine: Decimal::ZERO,
                total_amount: total,
            },
            items: vec![ItemAmounts {
                item_id,
                monetary_correction: dec!(2.50),
                interest_amount: dec!(5.03),
                fine_amount: dec!(10.00),
                subtotal: total,
            }],
        }
    }

    #[tokio::test]
    async fn save_applies_balance_against_stored_payment() {
        let store = InMemoryChargeStore::default();
        let charge = charge(dec!(100));
        let line = item(charge.id);
        store.insert_charge(charge.clone()).await;
        store.insert_item(line.clone()).await;

        let saved = store
            .save_recalculation(&update(charge.id, line.id, dec!(517.53)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.total_amount, dec!(517.53));
        assert_eq!(saved.balance_amount, dec!(417.53));
        assert_eq!(store.items(charge.id).await[0].subtotal, dec!(517.53));
    }

    #[tokio::test]
    async fn unknown_item_writes_nothing() {
        let store = InMemoryChargeStore::default();
        let charge = charge(Decimal::ZERO);
        let line = item(charge.id);
        store.insert_charge(charge.clone()).await;
        store.insert_item(line).await;

        let result = store
            .save_recalculation(&update(charge.id, Uuid::new_v4(), dec!(517.53)))
            .await;

        assert!(result.is_err());
        assert_eq!(store.charge(charge.id).await.unwrap().total_amount, Decimal::ZERO);
        assert_eq!(store.items(charge.id).await[0].subtotal, Decimal::ZERO);
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_state() {
        let store = InMemoryChargeStore::default();
        let charge = charge(Decimal::ZERO);
        let line = item(charge.id);
        store.insert_charge(charge.clone()).await;
        store.insert_item(line.clone()).await;
        store.fail_saves(true);

        assert!(
            store
                .save_recalculation(&update(charge.id, line.id, dec!(517.53)))
                .await
                .is_err()
        );
        assert_eq!(store.items(charge.id).await[0].subtotal, Decimal::ZERO);
    }

    #[tokio::test]
    async fn cancelled_charge_is_not_saved() {
        let store = InMemoryChargeStore::default();
        let mut retired = charge(Decimal::ZERO);
        retired.is_active = false;
        let line = item(retired.id);
        store.insert_charge(retired.clone()).await;
        store.insert_item(line.clone()).await;

        let saved = store
            .save_recalculation(&update(retired.id, line.id, dec!(517.53)))
            .await
            .unwrap();

        assert!(saved.is_none());
        assert_eq!(store.items(retired.id).await[0].subtotal, Decimal::ZERO);
    }

    #[tokio::test]
    async fn cancelled_charge_is_not_loaded() {
        let store = InMemoryChargeStore::default();
        let mut retired = charge(Decimal::ZERO);
        retired.is_active = false;
        store.insert_charge(retired.clone()).await;

        assert!(store.load_charge(retired.id).await.unwrap().is_none());
    }
}
