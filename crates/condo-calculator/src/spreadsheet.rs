//! CSV rendering of a debt statement, section by section.

use anyhow::Context;
use condo_core::ChargeItem;
use csv::{Writer, WriterBuilder};
use rust_decimal::Decimal;

use crate::{breakdown::DebtBreakdown, parameters::ParameterSource};

const ITEM_HEADER: [&str; 7] = [
    "Due date",
    "Description",
    "Nominal amount",
    "Correction",
    "Interest",
    "Fine",
    "Subtotal",
];

pub fn render_csv(statement: &DebtBreakdown) -> anyhow::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let charge = &statement.charge;
    let totals = &statement.totals;

    writer.write_record(["DEBT CALCULATION STATEMENT"])?;
    writer.write_record(["Charge code", charge.charge_code.as_str()])?;
    writer.write_record(["Client", &charge.client_id.to_string()])?;
    writer.write_record(["Debtor", &charge.debtor_id.to_string()])?;
    writer.write_record(["Due date", &charge.due_date.to_string()])?;
    writer.write_record(["Calculation date", &statement.calculation_date.to_string()])?;
    writer.write_record([
        "Reference period",
        charge.reference_period.as_deref().unwrap_or("N/A"),
    ])?;
    writer.write_record(["Rates", rate_origin(&statement.parameter_source)])?;
    blank(&mut writer)?;

    writer.write_record(["1. PRINCIPAL DEBT"])?;
    item_section(
        &mut writer,
        &statement.principal_items,
        "Total principal",
        totals.principal_amount,
    )?;
    blank(&mut writer)?;

    writer.write_record(["2. COLLECTION EXPENSES"])?;
    item_section(
        &mut writer,
        &statement.expense_items,
        "Total expenses",
        totals.expenses_amount,
    )?;
    blank(&mut writer)?;

    writer.write_record(["3. FEES"])?;
    writer.write_record(["Type", "Base", "Amount"])?;
    let principal = totals.principal_amount.to_string();
    writer.write_record([
        "Extrajudicial fees",
        principal.as_str(),
        &totals.extrajudicial_fees.to_string(),
    ])?;
    writer.write_record([
        "Execution fees",
        principal.as_str(),
        &totals.execution_fees.to_string(),
    ])?;
    writer.write_record([
        "Total fees",
        "",
        &(totals.extrajudicial_fees + totals.execution_fees).to_string(),
    ])?;
    writer.write_record(["Subtotal with fees", "", &totals.subtotal_with_fees.to_string()])?;
    blank(&mut writer)?;

    writer.write_record(["4. ART. 523 PENALTY"])?;
    writer.write_record(["Base", "Amount"])?;
    writer.write_record([
        totals.subtotal_with_fees.to_string(),
        totals.art_523_fine.to_string(),
    ])?;
    blank(&mut writer)?;

    writer.write_record(["5. PAYEE SUMMARY"])?;
    writer.write_record(["Payee", "Amount", "Percentage"])?;
    let breakdown = &statement.breakdown;
    let percentages = &statement.percentages;
    payee_row(
        &mut writer,
        "Client (principal + expenses)",
        breakdown.client_amount,
        percentages.client_percentage,
    )?;
    payee_row(
        &mut writer,
        "Collector (fees)",
        breakdown.collector_amount,
        percentages.collector_percentage,
    )?;
    payee_row(
        &mut writer,
        "Court (Art. 523)",
        breakdown.court_amount,
        percentages.court_percentage,
    )?;
    writer.write_record(["TOTAL", &breakdown.total_amount.to_string()])?;
    writer.write_record(["Paid", &charge.paid_amount.to_string()])?;
    writer.write_record(["Balance", &totals.balance_amount.to_string()])?;

    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("{err}"))
        .context("failed to flush debt statement")
}

fn item_section(
    writer: &mut Writer<Vec<u8>>,
    items: &[ChargeItem],
    total_label: &str,
    total: Decimal,
) -> anyhow::Result<()> {
    writer.write_record(ITEM_HEADER)?;
    for item in items {
        writer.write_record([
            item.due_date.to_string(),
            item.description.clone(),
            item.nominal_amount.to_string(),
            item.monetary_correction.to_string(),
            item.interest_amount.to_string(),
            item.fine_amount.to_string(),
            item.subtotal.to_string(),
        ])?;
    }
    writer.write_record([total_label, "", "", "", "", "", &total.to_string()])?;
    Ok(())
}

fn payee_row(
    writer: &mut Writer<Vec<u8>>,
    payee: &str,
    amount: Decimal,
    percentage: Decimal,
) -> anyhow::Result<()> {
    writer.write_record([payee, &amount.to_string(), &percentage.to_string()])?;
    Ok(())
}

fn blank(writer: &mut Writer<Vec<u8>>) -> anyhow::Result<()> {
    writer.write_record([""])?;
    Ok(())
}

fn rate_origin(source: &ParameterSource) -> &'static str {
    if source.is_default() {
        "default rates"
    } else {
        "client parameters"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{breakdown::payee_breakdown, engine::CalculationTotals};
    use chrono::{NaiveDate, Utc};
    use condo_core::{Charge, ChargeStatus, ItemCategory};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn statement() -> DebtBreakdown {
        let now = Utc::now();
        let due = NaiveDate::from_ymd_opt(2024, 4, 10).unwrap();
        let totals = CalculationTotals {
            principal_amount: dec!(1035.05),
            expenses_amount: Decimal::ZERO,
            subtotal_base: dec!(1035.05),
            extrajudicial_fees: dec!(103.51),
            execution_fees: dec!(103.51),
            subtotal_with_fees: dec!(1242.07),
            art_523_fine: dec!(124.21),
            total_amount: dec!(1366.28),
            balance_amount: dec!(1366.28),
        };
        let (breakdown, percentages) = payee_breakdown(&totals);
        let charge_id = Uuid::new_v4();

        DebtBreakdown {
            charge: Charge {
                id: charge_id,
                charge_code: "COB20240510A1B2C3".to_string(),
                client_id: Uuid::new_v4(),
                debtor_id: Uuid::new_v4(),
                unit_id: None,
                charge_date: due,
                due_date: due,
                category: "CONDOMINIUM_FEE".to_string(),
                description: "April fee".to_string(),
                reference_period: None,
                status: ChargeStatus::Overdue,
                principal_amount: totals.principal_amount,
                expenses_amount: Decimal::ZERO,
                extrajudicial_fees: totals.extrajudicial_fees,
                execution_fees: totals.execution_fees,
                art_523_fine: totals.art_523_fine,
                total_amount: totals.total_amount,
                paid_amount: Decimal::ZERO,
                balance_amount: totals.balance_amount,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
            calculation_date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            parameter_source: ParameterSource::Defaults,
            principal_items: vec![ChargeItem {
                id: Uuid::new_v4(),
                charge_id,
                category: ItemCategory::Principal,
                due_date: due,
                description: "April fee, unit 101".to_string(),
                nominal_amount: dec!(1000),
                monetary_correction: dec!(5.00),
                interest_amount: dec!(10.05),
                fine_amount: dec!(20.00),
                subtotal: dec!(1035.05),
                is_active: true,
            }],
            expense_items: vec![],
            fees: vec![],
            totals,
            breakdown,
            percentages,
        }
    }

    #[test]
    fn renders_every_section() {
        let bytes = render_csv(&statement()).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        for heading in [
            "1. PRINCIPAL DEBT",
            "2. COLLECTION EXPENSES",
            "3. FEES",
            "4. ART. 523 PENALTY",
            "5. PAYEE SUMMARY",
        ] {
            assert!(text.contains(heading), "missing {heading}");
        }
        assert!(text.contains("Charge code,COB20240510A1B2C3"));
        assert!(text.contains("2024-04-10,\"April fee, unit 101\",1000,5.00,10.05,20.00,1035.05"));
        assert!(text.contains("Total principal,,,,,,1035.05"));
        assert!(text.contains("Rates,default rates"));
        assert!(text.contains("TOTAL,1366.28"));
    }
}
