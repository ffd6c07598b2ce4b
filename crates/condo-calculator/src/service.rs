use std::sync::Arc;

use chrono::NaiveDate;
use condo_core::{CalculationError, ChargeItem, ChargeSnapshot, ChargeStore, ItemCategory};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    breakdown::{DebtBreakdown, payee_breakdown},
    config::CalculatorConfig,
    engine::{ChargeCalculation, calculate_charge},
    parameters::{ResolvedParameters, resolve_parameters},
};

/// Loads a charge, runs the pure calculation and persists the result as one
/// atomic write.
#[derive(Clone)]
pub struct ChargeCalculatorService<S> {
    store: S,
    config: Arc<CalculatorConfig>,
}

impl<S: ChargeStore> ChargeCalculatorService<S> {
    pub fn new(store: S, config: CalculatorConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub async fn resolve_parameters(
        &self,
        client_id: Uuid,
        calculation_date: NaiveDate,
    ) -> Result<ResolvedParameters, CalculationError> {
        let records = self.store.client_parameters(client_id).await?;
        let resolved = resolve_parameters(&records, calculation_date, &self.config);
        if resolved.source.is_default() {
            warn!(
                %client_id,
                %calculation_date,
                "no calculation parameters cover this date; using default rates"
            );
        }

        Ok(resolved)
    }

    pub async fn calculate(
        &self,
        charge_id: Uuid,
        calculation_date: NaiveDate,
    ) -> Result<ChargeCalculation, CalculationError> {
        let (calculation, _) = self.recalculate(charge_id, calculation_date).await?;
        Ok(calculation)
    }

    /// Recalculates, then assembles the itemised view used for debt statements.
    pub async fn generate_debt_breakdown(
        &self,
        charge_id: Uuid,
        calculation_date: NaiveDate,
    ) -> Result<DebtBreakdown, CalculationError> {
        let (calculation, snapshot) = self.recalculate(charge_id, calculation_date).await?;
        let (breakdown, percentages) = payee_breakdown(&calculation.totals);

        let (principal_items, expense_items): (Vec<ChargeItem>, Vec<ChargeItem>) = snapshot
            .items
            .into_iter()
            .partition(|item| item.category == ItemCategory::Principal);

        Ok(DebtBreakdown {
            charge: snapshot.charge,
            calculation_date,
            parameter_source: calculation.parameter_source,
            principal_items,
            expense_items,
            fees: snapshot.fees,
            totals: calculation.totals,
            breakdown,
            percentages,
        })
    }

    /// Returns the calculation and the snapshot as it stands after the write.
    async fn recalculate(
        &self,
        charge_id: Uuid,
        calculation_date: NaiveDate,
    ) -> Result<(ChargeCalculation, ChargeSnapshot), CalculationError> {
        let mut snapshot = self
            .store
            .load_charge(charge_id)
            .await?
            .ok_or_else(|| CalculationError::charge_not_found(charge_id))?;

        let parameters = self
            .resolve_parameters(snapshot.charge.client_id, calculation_date)
            .await?;
        let mut calculation =
            calculate_charge(&snapshot, &parameters, calculation_date, &self.config)?;

        let saved = self
            .store
            .save_recalculation(&calculation.update())
            .await?
            .ok_or_else(|| CalculationError::charge_not_found(charge_id))?;
        calculation.totals.balance_amount = saved.balance_amount;

        snapshot.items.retain(|item| item.is_active);
        for (item, computed) in snapshot.items.iter_mut().zip(&calculation.items) {
            item.monetary_correction = computed.monetary_correction;
            item.interest_amount = computed.interest_amount;
            item.fine_amount = computed.fine_amount;
            item.subtotal = computed.subtotal;
        }
        snapshot.fees.retain(|fee| fee.is_active);
        snapshot.charge = saved;

        info!(
            %charge_id,
            %calculation_date,
            total = %calculation.totals.total_amount,
            balance = %calculation.totals.balance_amount,
            "charge recalculated"
        );

        Ok((calculation, snapshot))
    }
}
