use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use condo_core::{CalculationParameter, Charge, ChargeSnapshot, ChargeStore, RecalculationUpdate};
use sqlx::PgPool;
use uuid::Uuid;

use crate::rows::{
    CHARGE_COLUMNS, FEE_COLUMNS, ITEM_COLUMNS, PARAMETER_COLUMNS, charge_from_row, collect_rows,
    fee_from_row, item_from_row, parameter_from_row,
};

#[derive(Clone)]
pub struct PgChargeStore {
    pool: PgPool,
}

impl PgChargeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ChargeStore for PgChargeStore {
    async fn load_charge(&self, charge_id: Uuid) -> Result<Option<ChargeSnapshot>> {
        let charge_sql =
            format!("SELECT {CHARGE_COLUMNS} FROM charges WHERE id = $1 AND is_active = TRUE");
        let Some(row) = sqlx::query(&charge_sql)
            .bind(charge_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let charge = charge_from_row(&row)?;

        let item_sql = format!(
            "SELECT {ITEM_COLUMNS} FROM charge_items
             WHERE charge_id = $1 AND is_active = TRUE
             ORDER BY due_date ASC, created_at ASC"
        );
        let item_rows = sqlx::query(&item_sql)
            .bind(charge_id)
            .fetch_all(&self.pool)
            .await?;

        let fee_sql = format!(
            "SELECT {FEE_COLUMNS} FROM charge_fees
             WHERE charge_id = $1 AND is_active = TRUE
             ORDER BY created_at ASC"
        );
        let fee_rows = sqlx::query(&fee_sql)
            .bind(charge_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(ChargeSnapshot {
            charge,
            items: collect_rows(&item_rows, item_from_row)?,
            fees: collect_rows(&fee_rows, fee_from_row)?,
        }))
    }

    async fn client_parameters(&self, client_id: Uuid) -> Result<Vec<CalculationParameter>> {
        let sql = format!(
            "SELECT {PARAMETER_COLUMNS} FROM calculation_parameters
             WHERE client_id = $1 AND is_active = TRUE
             ORDER BY start_date DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;

        collect_rows(&rows, parameter_from_row)
    }

    async fn save_recalculation(&self, update: &RecalculationUpdate) -> Result<Option<Charge>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for item in &update.items {
            let result = sqlx::query(
                r#"
                UPDATE charge_items
                SET monetary_correction = $3,
                    interest_amount = $4,
                    fine_amount = $5,
                    subtotal = $6,
                    updated_at = $7
                WHERE id = $1 AND charge_id = $2
                "#,
            )
            .bind(item.item_id)
            .bind(update.charge_id)
            .bind(item.monetary_correction)
            .bind(item.interest_amount)
            .bind(item.fine_amount)
            .bind(item.subtotal)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            // dropping the transaction rolls back the items already written
            if result.rows_affected() == 0 {
                anyhow::bail!(
                    "charge item {} does not belong to charge {}",
                    item.item_id,
                    update.charge_id
                );
            }
        }

        let amounts = &update.amounts;
        let charge_sql = format!(
            "UPDATE charges
             SET principal_amount = $2,
                 expenses_amount = $3,
                 extrajudicial_fees = $4,
                 execution_fees = $5,
                 art_523_fine = $6,
                 total_amount = $7,
                 balance_amount = $7 - paid_amount,
                 updated_at = $8
             WHERE id = $1 AND is_active = TRUE
             RETURNING {CHARGE_COLUMNS}"
        );
        let row = sqlx::query(&charge_sql)
            .bind(update.charge_id)
            .bind(amounts.principal_amount)
            .bind(amounts.expenses_amount)
            .bind(amounts.extrajudicial_fees)
            .bind(amounts.execution_fees)
            .bind(amounts.art_523_fine)
            .bind(amounts.total_amount)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        // cancelled since it was loaded; the item writes roll back with the tx
        let Some(row) = row else {
            return Ok(None);
        };
        let charge = charge_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(charge))
    }
}
