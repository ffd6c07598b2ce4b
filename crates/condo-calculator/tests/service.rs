use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use condo_calculator::{CalculatorConfig, ChargeCalculatorService, ParameterSource, render_csv};
use condo_core::{
    CalculationError, CalculationParameter, Charge, ChargeFees, ChargeItem, ChargeSnapshot,
    ChargeStatus, ChargeStore, FeeRule, FeeType, ItemCategory, RateSet, RecalculationUpdate,
};
use condo_store::InMemoryChargeStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn charge(client_id: Uuid) -> Charge {
    let now = Utc::now();
    Charge {
        id: Uuid::new_v4(),
        charge_code: "COB20240410C0FFEE".to_string(),
        client_id,
        debtor_id: Uuid::new_v4(),
        unit_id: Some(Uuid::new_v4()),
        charge_date: date(2024, 4, 1),
        due_date: date(2024, 4, 10),
        category: "CONDOMINIUM_FEE".to_string(),
        description: "April fee".to_string(),
        reference_period: Some("2024-04".to_string()),
        status: ChargeStatus::Overdue,
        principal_amount: Decimal::ZERO,
        expenses_amount: Decimal::ZERO,
        extrajudicial_fees: Decimal::ZERO,
        execution_fees: Decimal::ZERO,
        art_523_fine: Decimal::ZERO,
        total_amount: Decimal::ZERO,
        paid_amount: Decimal::ZERO,
        balance_amount: Decimal::ZERO,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn item(charge_id: Uuid, category: ItemCategory, nominal: Decimal) -> ChargeItem {
    ChargeItem {
        id: Uuid::new_v4(),
        charge_id,
        category,
        due_date: date(2024, 4, 10),
        description: "April".to_string(),
        nominal_amount: nominal,
        monetary_correction: Decimal::ZERO,
        interest_amount: Decimal::ZERO,
        fine_amount: Decimal::ZERO,
        subtotal: Decimal::ZERO,
        is_active: true,
    }
}

async fn seeded(nominal: Decimal) -> (ChargeCalculatorService<InMemoryChargeStore>, Charge) {
    let store = InMemoryChargeStore::default();
    let charge = charge(Uuid::new_v4());
    store.insert_charge(charge.clone()).await;
    store
        .insert_item(item(charge.id, ItemCategory::Principal, nominal))
        .await;

    (
        ChargeCalculatorService::new(store, CalculatorConfig::default()),
        charge,
    )
}

#[tokio::test]
async fn unknown_charge_is_not_found() {
    let service = ChargeCalculatorService::new(
        InMemoryChargeStore::default(),
        CalculatorConfig::default(),
    );

    let err = service
        .calculate(Uuid::new_v4(), date(2024, 5, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, CalculationError::NotFound { entity: "charge", .. }));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn calculation_is_persisted() {
    let (service, charge) = seeded(dec!(1000)).await;

    let calculation = service.calculate(charge.id, date(2024, 5, 10)).await.unwrap();

    assert_eq!(calculation.items[0].subtotal, dec!(1035.05));
    assert_eq!(calculation.totals.principal_amount, dec!(1035.05));
    assert_eq!(calculation.totals.extrajudicial_fees, dec!(103.51));
    assert_eq!(calculation.totals.total_amount, dec!(1366.28));

    let stored = service.store().charge(charge.id).await.unwrap();
    assert_eq!(stored.total_amount, dec!(1366.28));
    assert_eq!(stored.balance_amount, dec!(1366.28));

    let items = service.store().items(charge.id).await;
    assert_eq!(items[0].monetary_correction, dec!(5.00));
    assert_eq!(items[0].interest_amount, dec!(10.05));
    assert_eq!(items[0].fine_amount, dec!(20.00));
    assert_eq!(items[0].subtotal, dec!(1035.05));
}

#[tokio::test]
async fn recalculation_overwrites_instead_of_accumulating() {
    let (service, charge) = seeded(dec!(1000)).await;

    let first = service.calculate(charge.id, date(2024, 7, 22)).await.unwrap();
    let second = service.calculate(charge.id, date(2024, 7, 22)).await.unwrap();

    assert_eq!(first.totals, second.totals);
    assert_eq!(first.items, second.items);
}

#[tokio::test]
async fn balance_tracks_payments_recorded_between_passes() {
    let (service, charge) = seeded(dec!(1000)).await;
    service
        .store()
        .set_paid_amount(charge.id, dec!(366.28))
        .await
        .unwrap();

    let calculation = service.calculate(charge.id, date(2024, 5, 10)).await.unwrap();

    assert_eq!(calculation.totals.total_amount, dec!(1366.28));
    assert_eq!(calculation.totals.balance_amount, dec!(1000.00));
}

#[tokio::test]
async fn fixed_fee_override_applies_with_zero_principal() {
    let (service, charge) = seeded(Decimal::ZERO).await;
    service
        .store()
        .insert_fee(ChargeFees {
            id: Uuid::new_v4(),
            charge_id: charge.id,
            fee_type: FeeType::Extrajudicial,
            rule: FeeRule::Fixed { amount: dec!(350) },
            is_active: true,
            created_at: Utc::now(),
        })
        .await;

    let totals = service
        .calculate(charge.id, date(2024, 5, 10))
        .await
        .unwrap()
        .totals;

    assert_eq!(totals.principal_amount, Decimal::ZERO);
    assert_eq!(totals.extrajudicial_fees, dec!(350));
    assert_eq!(totals.execution_fees, Decimal::ZERO);
    assert_eq!(totals.art_523_fine, dec!(35.00));
    assert_eq!(totals.total_amount, dec!(385.00));
}

#[tokio::test]
async fn earliest_active_override_wins() {
    let (service, charge) = seeded(dec!(1000)).await;
    let created = Utc::now();
    for (rate, offset) in [(dec!(30), 1), (dec!(15), 0)] {
        service
            .store()
            .insert_fee(ChargeFees {
                id: Uuid::new_v4(),
                charge_id: charge.id,
                fee_type: FeeType::Execution,
                rule: FeeRule::Percentage { rate },
                is_active: true,
                created_at: created + Duration::seconds(offset),
            })
            .await;
    }

    let totals = service
        .calculate(charge.id, date(2024, 5, 10))
        .await
        .unwrap()
        .totals;

    // 1035.05 * 15%
    assert_eq!(totals.execution_fees, dec!(155.26));
}

#[tokio::test]
async fn configured_parameters_are_reported() {
    let (service, charge) = seeded(dec!(1000)).await;
    let parameter = CalculationParameter {
        id: Uuid::new_v4(),
        client_id: charge.client_id,
        start_date: date(2024, 1, 1),
        end_date: None,
        rates: RateSet {
            fine_rate: dec!(2),
            interest_rate: dec!(1),
            extrajudicial_fees_rate: dec!(20),
            execution_fees_rate: dec!(0),
            art_523_fine_rate: dec!(10),
            correction_index: "IPCA".to_string(),
        },
        is_active: true,
    };
    service.store().insert_parameter(parameter.clone()).await;

    let calculation = service.calculate(charge.id, date(2024, 5, 10)).await.unwrap();

    assert_eq!(
        calculation.parameter_source,
        ParameterSource::Configured {
            parameter_id: parameter.id
        }
    );
    // IPCA 0.4%: 4.00 correction, 10.04 interest
    assert_eq!(calculation.items[0].subtotal, dec!(1034.04));
    assert_eq!(calculation.totals.extrajudicial_fees, dec!(206.81));
    assert_eq!(calculation.totals.execution_fees, Decimal::ZERO);
}

#[tokio::test]
async fn missing_parameters_are_flagged_as_defaults() {
    let (service, charge) = seeded(dec!(1000)).await;

    let resolved = service
        .resolve_parameters(charge.client_id, date(2024, 5, 10))
        .await
        .unwrap();

    assert_eq!(resolved.source, ParameterSource::Defaults);
    assert_eq!(resolved.rates, service.config().default_rates);
}

#[tokio::test]
async fn failed_save_surfaces_persistence_error_and_writes_nothing() {
    let (service, charge) = seeded(dec!(1000)).await;
    service.store().fail_saves(true);

    let err = service
        .calculate(charge.id, date(2024, 5, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, CalculationError::Persistence(_)));
    assert!(!err.is_client_error());
    let stored = service.store().charge(charge.id).await.unwrap();
    assert_eq!(stored.total_amount, Decimal::ZERO);
    assert_eq!(service.store().items(charge.id).await[0].subtotal, Decimal::ZERO);
}

/// Cancels every charge right after handing out its snapshot.
struct CancelledAfterLoad(InMemoryChargeStore);

#[async_trait]
impl ChargeStore for CancelledAfterLoad {
    async fn load_charge(&self, charge_id: Uuid) -> anyhow::Result<Option<ChargeSnapshot>> {
        let snapshot = self.0.load_charge(charge_id).await?;
        if let Some(snapshot) = &snapshot {
            let mut cancelled = snapshot.charge.clone();
            cancelled.status = ChargeStatus::Cancelled;
            cancelled.is_active = false;
            self.0.insert_charge(cancelled).await;
        }
        Ok(snapshot)
    }

    async fn client_parameters(
        &self,
        client_id: Uuid,
    ) -> anyhow::Result<Vec<CalculationParameter>> {
        self.0.client_parameters(client_id).await
    }

    async fn save_recalculation(
        &self,
        update: &RecalculationUpdate,
    ) -> anyhow::Result<Option<Charge>> {
        self.0.save_recalculation(update).await
    }
}

#[tokio::test]
async fn charge_cancelled_during_recalculation_is_not_found() {
    let store = InMemoryChargeStore::default();
    let charge = charge(Uuid::new_v4());
    store.insert_charge(charge.clone()).await;
    store
        .insert_item(item(charge.id, ItemCategory::Principal, dec!(1000)))
        .await;
    let service =
        ChargeCalculatorService::new(CancelledAfterLoad(store), CalculatorConfig::default());

    let err = service
        .calculate(charge.id, date(2024, 5, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, CalculationError::NotFound { entity: "charge", .. }));
    let stored = service.store().0.charge(charge.id).await.unwrap();
    assert_eq!(stored.total_amount, Decimal::ZERO);
    assert_eq!(service.store().0.items(charge.id).await[0].subtotal, Decimal::ZERO);
}

#[tokio::test]
async fn breakdown_partitions_items_and_payees() {
    let (service, charge) = seeded(dec!(1000)).await;
    service
        .store()
        .insert_item(item(charge.id, ItemCategory::CollectionExpenses, dec!(200)))
        .await;

    let breakdown = service
        .generate_debt_breakdown(charge.id, date(2024, 5, 10))
        .await
        .unwrap();

    assert_eq!(breakdown.principal_items.len(), 1);
    assert_eq!(breakdown.expense_items.len(), 1);
    assert_eq!(breakdown.expense_items[0].subtotal, dec!(203.01));
    assert_eq!(breakdown.totals.total_amount, dec!(1589.59));
    assert_eq!(breakdown.charge.total_amount, dec!(1589.59));
    assert_eq!(breakdown.breakdown.client_amount, dec!(1238.06));
    assert_eq!(breakdown.breakdown.collector_amount, dec!(207.02));
    assert_eq!(breakdown.breakdown.court_amount, dec!(144.51));
    assert!(breakdown.parameter_source.is_default());

    let percentages = breakdown.percentages;
    let sum = percentages.client_percentage
        + percentages.collector_percentage
        + percentages.court_percentage;
    assert!((sum - dec!(100)).abs() <= dec!(0.02));

    let csv = String::from_utf8(render_csv(&breakdown).unwrap()).unwrap();
    assert!(csv.contains("Total expenses,,,,,,203.01"));
}

#[tokio::test]
async fn breakdown_of_empty_charge_has_zero_percentages() {
    let store = InMemoryChargeStore::default();
    let charge = charge(Uuid::new_v4());
    store.insert_charge(charge.clone()).await;
    let service = ChargeCalculatorService::new(store, CalculatorConfig::default());

    let breakdown = service
        .generate_debt_breakdown(charge.id, date(2024, 5, 10))
        .await
        .unwrap();

    assert_eq!(breakdown.totals.total_amount, Decimal::ZERO);
    assert_eq!(breakdown.percentages.client_percentage, Decimal::ZERO);
    assert_eq!(breakdown.percentages.court_percentage, Decimal::ZERO);
}
