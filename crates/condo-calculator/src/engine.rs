//! Debt recalculation: monetary correction, interest and fine per item, then
//! fees on the principal, then the Art. 523 penalty on everything.
//!
//! Every money value is rounded to cents where it is produced, so the totals
//! are exact sums of the figures shown to the debtor.

use chrono::NaiveDate;
use condo_core::{
    CalculationError, ChargeAmounts, ChargeFees, ChargeItem, ChargeSnapshot, FeeRule, FeeType,
    ItemAmounts, ItemCategory, RateSet, RecalculationUpdate,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::CalculatorConfig,
    months::elapsed_months,
    parameters::{ParameterSource, ResolvedParameters},
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCalculation {
    pub item_id: Uuid,
    pub category: ItemCategory,
    pub elapsed_months: u32,
    pub nominal_amount: Decimal,
    pub monetary_correction: Decimal,
    pub interest_amount: Decimal,
    pub fine_amount: Decimal,
    pub subtotal: Decimal,
}

impl ItemCalculation {
    pub fn amounts(&self) -> ItemAmounts {
        ItemAmounts {
            item_id: self.item_id,
            monetary_correction: self.monetary_correction,
            interest_amount: self.interest_amount,
            fine_amount: self.fine_amount,
            subtotal: self.subtotal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationTotals {
    pub principal_amount: Decimal,
    pub expenses_amount: Decimal,
    pub subtotal_base: Decimal,
    pub extrajudicial_fees: Decimal,
    pub execution_fees: Decimal,
    pub subtotal_with_fees: Decimal,
    pub art_523_fine: Decimal,
    pub total_amount: Decimal,
    pub balance_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeCalculation {
    pub charge_id: Uuid,
    pub calculation_date: NaiveDate,
    pub parameter_source: ParameterSource,
    pub rates: RateSet,
    pub items: Vec<ItemCalculation>,
    pub totals: CalculationTotals,
}

impl ChargeCalculation {
    pub fn update(&self) -> RecalculationUpdate {
        RecalculationUpdate {
            charge_id: self.charge_id,
            amounts: ChargeAmounts {
                principal_amount: self.totals.principal_amount,
                expenses_amount: self.totals.expenses_amount,
                extrajudicial_fees: self.totals.extrajudicial_fees,
                execution_fees: self.totals.execution_fees,
                art_523_fine: self.totals.art_523_fine,
                total_amount: self.totals.total_amount,
            },
            items: self.items.iter().map(ItemCalculation::amounts).collect(),
        }
    }
}

/// Recalculates a charge from its snapshot. Pure: nothing is persisted.
pub fn calculate_charge(
    snapshot: &ChargeSnapshot,
    parameters: &ResolvedParameters,
    calculation_date: NaiveDate,
    config: &CalculatorConfig,
) -> Result<ChargeCalculation, CalculationError> {
    let rates = &parameters.rates;
    let index_rate = config.monthly_index_rate(&rates.correction_index);

    let mut items = Vec::with_capacity(snapshot.items.len());
    for item in snapshot.items.iter().filter(|item| item.is_active) {
        items.push(calculate_item(item, rates, index_rate, calculation_date)?);
    }

    let principal_amount = category_total(&items, ItemCategory::Principal)?;
    let expenses_amount = category_total(&items, ItemCategory::CollectionExpenses)?;
    let subtotal_base = sum(principal_amount, expenses_amount)?;

    let extrajudicial_fees =
        fee_amount(FeeType::Extrajudicial, principal_amount, &snapshot.fees, rates)?;
    let execution_fees = fee_amount(FeeType::Execution, principal_amount, &snapshot.fees, rates)?;
    let subtotal_with_fees = sum(sum(subtotal_base, extrajudicial_fees)?, execution_fees)?;

    let art_523_fine = money(product(subtotal_with_fees, rates.art_523_fine_rate / HUNDRED)?);
    let total_amount = sum(subtotal_with_fees, art_523_fine)?;
    let balance_amount = total_amount
        .checked_sub(snapshot.charge.paid_amount)
        .ok_or_else(|| {
            CalculationError::Arithmetic(format!(
                "{total_amount} - {} overflows",
                snapshot.charge.paid_amount
            ))
        })?;

    Ok(ChargeCalculation {
        charge_id: snapshot.charge.id,
        calculation_date,
        parameter_source: parameters.source,
        rates: rates.clone(),
        items,
        totals: CalculationTotals {
            principal_amount,
            expenses_amount,
            subtotal_base,
            extrajudicial_fees,
            execution_fees,
            subtotal_with_fees,
            art_523_fine,
            total_amount,
            balance_amount,
        },
    })
}

pub fn calculate_item(
    item: &ChargeItem,
    rates: &RateSet,
    monthly_index_rate: Decimal,
    calculation_date: NaiveDate,
) -> Result<ItemCalculation, CalculationError> {
    if item.nominal_amount < Decimal::ZERO {
        return Err(CalculationError::Validation(format!(
            "item {} has a negative nominal amount",
            item.id
        )));
    }

    let months = elapsed_months(item.due_date, calculation_date);
    let nominal = item.nominal_amount;

    let (correction, interest, fine) = if months == 0 {
        (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    } else {
        let factor = compound_factor(monthly_index_rate, months)?;
        let correction = money(product(nominal, factor)?);
        let monthly_interest = product(sum(nominal, correction)?, rates.interest_rate / HUNDRED)?;
        let interest = money(product(monthly_interest, Decimal::from(months))?);
        let fine = match item.category {
            ItemCategory::Principal => money(product(nominal, rates.fine_rate / HUNDRED)?),
            ItemCategory::CollectionExpenses => Decimal::ZERO,
        };
        (correction, interest, fine)
    };

    let subtotal = sum(sum(sum(nominal, correction)?, interest)?, fine)?;

    Ok(ItemCalculation {
        item_id: item.id,
        category: item.category,
        elapsed_months: months,
        nominal_amount: nominal,
        monetary_correction: correction,
        interest_amount: interest,
        fine_amount: fine,
        subtotal,
    })
}

/// Override for `fee_type` if one is active, otherwise the client rate.
/// Percentages apply to the principal only.
pub fn fee_amount(
    fee_type: FeeType,
    principal_amount: Decimal,
    overrides: &[ChargeFees],
    rates: &RateSet,
) -> Result<Decimal, CalculationError> {
    let rule = overrides
        .iter()
        .find(|fee| fee.is_active && fee.fee_type == fee_type)
        .map(|fee| fee.rule);

    let rate = match rule {
        Some(FeeRule::Fixed { amount }) => return Ok(amount),
        Some(FeeRule::Percentage { rate }) => rate,
        None => rates.fee_rate(fee_type),
    };

    Ok(money(product(principal_amount, rate / HUNDRED)?))
}

/// `(1 + rate)^months - 1`
fn compound_factor(rate: Decimal, months: u32) -> Result<Decimal, CalculationError> {
    let base = Decimal::ONE + rate;
    let mut growth = Decimal::ONE;
    for _ in 0..months {
        growth = product(growth, base)?;
    }

    growth
        .checked_sub(Decimal::ONE)
        .ok_or_else(|| CalculationError::Arithmetic("compound factor underflows".to_string()))
}

fn product(left: Decimal, right: Decimal) -> Result<Decimal, CalculationError> {
    left.checked_mul(right)
        .ok_or_else(|| CalculationError::Arithmetic(format!("{left} * {right} overflows")))
}

fn sum(left: Decimal, right: Decimal) -> Result<Decimal, CalculationError> {
    left.checked_add(right)
        .ok_or_else(|| CalculationError::Arithmetic(format!("{left} + {right} overflows")))
}

fn category_total(
    items: &[ItemCalculation],
    category: ItemCategory,
) -> Result<Decimal, CalculationError> {
    items
        .iter()
        .filter(|item| item.category == category)
        .try_fold(Decimal::ZERO, |total, item| sum(total, item.subtotal))
}

pub(crate) fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
