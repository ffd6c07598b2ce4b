use chrono::NaiveDate;
use condo_core::{Charge, ChargeFees, ChargeItem};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    engine::{CalculationTotals, money},
    parameters::ParameterSource,
};

/// Who receives each part of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeBreakdown {
    /// Principal plus collection expenses, owed to the condominium.
    pub client_amount: Decimal,
    /// Extrajudicial and execution fees, owed to the collector.
    pub collector_amount: Decimal,
    /// Art. 523 penalty.
    pub court_amount: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeePercentages {
    pub client_percentage: Decimal,
    pub collector_percentage: Decimal,
    pub court_percentage: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtBreakdown {
    pub charge: Charge,
    pub calculation_date: NaiveDate,
    pub parameter_source: ParameterSource,
    pub principal_items: Vec<ChargeItem>,
    pub expense_items: Vec<ChargeItem>,
    pub fees: Vec<ChargeFees>,
    pub totals: CalculationTotals,
    pub breakdown: PayeeBreakdown,
    pub percentages: PayeePercentages,
}

/// Splits the total among payees. A zero total yields zero percentages.
pub fn payee_breakdown(totals: &CalculationTotals) -> (PayeeBreakdown, PayeePercentages) {
    let breakdown = PayeeBreakdown {
        client_amount: totals.principal_amount + totals.expenses_amount,
        collector_amount: totals.extrajudicial_fees + totals.execution_fees,
        court_amount: totals.art_523_fine,
        total_amount: totals.total_amount,
    };

    let share = |amount: Decimal| {
        if totals.total_amount.is_zero() {
            Decimal::ZERO
        } else {
            money(amount / totals.total_amount * Decimal::ONE_HUNDRED)
        }
    };

    let percentages = PayeePercentages {
        client_percentage: share(breakdown.client_amount),
        collector_percentage: share(breakdown.collector_amount),
        court_percentage: share(breakdown.court_amount),
    };

    (breakdown, percentages)
}
