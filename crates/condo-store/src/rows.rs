//! Column lists and row mappers shared by the store and the HTTP handlers.

use anyhow::Result;
use condo_core::{
    CalculationParameter, Charge, ChargeDocument, ChargeFees, ChargeItem, ChargeProgress,
    ChargeStatus, Client, EconomicIndex, EconomicIndexValue, FeeRule, FeeType, ItemCategory,
    Person, RateSet, Unit, UnitOwner, WhatsAppMessage,
};
use sqlx::{Row, postgres::PgRow};

pub const CHARGE_COLUMNS: &str = "id, charge_code, client_id, debtor_id, unit_id, charge_date, \
    due_date, category, description, reference_period, status, principal_amount, expenses_amount, \
    extrajudicial_fees, execution_fees, art_523_fine, total_amount, paid_amount, balance_amount, \
    is_active, created_at, updated_at";

pub const ITEM_COLUMNS: &str = "id, charge_id, category, due_date, description, nominal_amount, \
    monetary_correction, interest_amount, fine_amount, subtotal, is_active";

pub const FEE_COLUMNS: &str = "id, charge_id, fee_type, calculation_type, percentage_rate, \
    fixed_amount, is_active, created_at";

pub const PARAMETER_COLUMNS: &str = "id, client_id, start_date, end_date, fine_rate, \
    interest_rate, extrajudicial_fees_rate, execution_fees_rate, art_523_fine_rate, \
    correction_index, is_active";

pub const PERSON_COLUMNS: &str = "id, name, document, email, phone, is_active, created_at";

pub const CLIENT_COLUMNS: &str =
    "id, person_id, client_code, contract_start_date, contract_end_date, is_active, created_at";

pub const UNIT_COLUMNS: &str = "id, client_id, unit_code, unit_type, block, floor, number, area, \
    ideal_fraction, status, is_active, created_at";

pub const PROGRESS_COLUMNS: &str = "id, charge_id, progress_date, progress_type, title, \
    description, user_id, responsible_name, whatsapp_message_id, email_id, phone_number, \
    priority, is_milestone, is_active, created_at";

pub const DOCUMENT_COLUMNS: &str = "id, charge_id, progress_id, document_type, title, \
    description, file_name, file_path, file_size, file_type, uploaded_by_id, upload_date, is_active";

pub const WHATSAPP_COLUMNS: &str = "id, message_id, charge_id, phone_number, contact_name, \
    message_type, direction, content, media_url, media_type, status, sent_at, webhook_data, \
    is_active";

pub fn charge_from_row(row: &PgRow) -> Result<Charge> {
    let status: String = row.try_get("status")?;

    Ok(Charge {
        id: row.try_get("id")?,
        charge_code: row.try_get("charge_code")?,
        client_id: row.try_get("client_id")?,
        debtor_id: row.try_get("debtor_id")?,
        unit_id: row.try_get("unit_id")?,
        charge_date: row.try_get("charge_date")?,
        due_date: row.try_get("due_date")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        reference_period: row.try_get("reference_period")?,
        status: ChargeStatus::parse(&status)?,
        principal_amount: row.try_get("principal_amount")?,
        expenses_amount: row.try_get("expenses_amount")?,
        extrajudicial_fees: row.try_get("extrajudicial_fees")?,
        execution_fees: row.try_get("execution_fees")?,
        art_523_fine: row.try_get("art_523_fine")?,
        total_amount: row.try_get("total_amount")?,
        paid_amount: row.try_get("paid_amount")?,
        balance_amount: row.try_get("balance_amount")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn item_from_row(row: &PgRow) -> Result<ChargeItem> {
    let category: String = row.try_get("category")?;

    Ok(ChargeItem {
        id: row.try_get("id")?,
        charge_id: row.try_get("charge_id")?,
        category: ItemCategory::parse(&category)?,
        due_date: row.try_get("due_date")?,
        description: row.try_get("description")?,
        nominal_amount: row.try_get("nominal_amount")?,
        monetary_correction: row.try_get("monetary_correction")?,
        interest_amount: row.try_get("interest_amount")?,
        fine_amount: row.try_get("fine_amount")?,
        subtotal: row.try_get("subtotal")?,
        is_active: row.try_get("is_active")?,
    })
}

pub fn fee_from_row(row: &PgRow) -> Result<ChargeFees> {
    let fee_type: String = row.try_get("fee_type")?;
    let calculation_type: String = row.try_get("calculation_type")?;

    Ok(ChargeFees {
        id: row.try_get("id")?,
        charge_id: row.try_get("charge_id")?,
        fee_type: FeeType::parse(&fee_type)?,
        rule: FeeRule::from_columns(
            &calculation_type,
            row.try_get("percentage_rate")?,
            row.try_get("fixed_amount")?,
        )?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub fn parameter_from_row(row: &PgRow) -> Result<CalculationParameter> {
    Ok(CalculationParameter {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        rates: RateSet {
            fine_rate: row.try_get("fine_rate")?,
            interest_rate: row.try_get("interest_rate")?,
            extrajudicial_fees_rate: row.try_get("extrajudicial_fees_rate")?,
            execution_fees_rate: row.try_get("execution_fees_rate")?,
            art_523_fine_rate: row.try_get("art_523_fine_rate")?,
            correction_index: row.try_get("correction_index")?,
        },
        is_active: row.try_get("is_active")?,
    })
}

pub fn person_from_row(row: &PgRow) -> Result<Person> {
    Ok(Person {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        document: row.try_get("document")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub fn client_from_row(row: &PgRow) -> Result<Client> {
    Ok(Client {
        id: row.try_get("id")?,
        person_id: row.try_get("person_id")?,
        client_code: row.try_get("client_code")?,
        contract_start_date: row.try_get("contract_start_date")?,
        contract_end_date: row.try_get("contract_end_date")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub fn unit_from_row(row: &PgRow) -> Result<Unit> {
    Ok(Unit {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        unit_code: row.try_get("unit_code")?,
        unit_type: row.try_get("unit_type")?,
        block: row.try_get("block")?,
        floor: row.try_get("floor")?,
        number: row.try_get("number")?,
        area: row.try_get("area")?,
        ideal_fraction: row.try_get("ideal_fraction")?,
        status: row.try_get("status")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Expects `person_name` joined in from `people`.
pub fn owner_from_row(row: &PgRow) -> Result<UnitOwner> {
    Ok(UnitOwner {
        id: row.try_get("id")?,
        unit_id: row.try_get("unit_id")?,
        person_id: row.try_get("person_id")?,
        person_name: row.try_get("person_name")?,
        ownership_type: row.try_get("ownership_type")?,
        is_active: row.try_get("is_active")?,
    })
}

pub fn progress_from_row(row: &PgRow) -> Result<ChargeProgress> {
    Ok(ChargeProgress {
        id: row.try_get("id")?,
        charge_id: row.try_get("charge_id")?,
        progress_date: row.try_get("progress_date")?,
        progress_type: row.try_get("progress_type")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        user_id: row.try_get("user_id")?,
        responsible_name: row.try_get("responsible_name")?,
        whatsapp_message_id: row.try_get("whatsapp_message_id")?,
        email_id: row.try_get("email_id")?,
        phone_number: row.try_get("phone_number")?,
        priority: row.try_get("priority")?,
        is_milestone: row.try_get("is_milestone")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub fn document_from_row(row: &PgRow) -> Result<ChargeDocument> {
    Ok(ChargeDocument {
        id: row.try_get("id")?,
        charge_id: row.try_get("charge_id")?,
        progress_id: row.try_get("progress_id")?,
        document_type: row.try_get("document_type")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        file_size: row.try_get("file_size")?,
        file_type: row.try_get("file_type")?,
        uploaded_by_id: row.try_get("uploaded_by_id")?,
        upload_date: row.try_get("upload_date")?,
        is_active: row.try_get("is_active")?,
    })
}

pub fn whatsapp_from_row(row: &PgRow) -> Result<WhatsAppMessage> {
    Ok(WhatsAppMessage {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        charge_id: row.try_get("charge_id")?,
        phone_number: row.try_get("phone_number")?,
        contact_name: row.try_get("contact_name")?,
        message_type: row.try_get("message_type")?,
        direction: row.try_get("direction")?,
        content: row.try_get("content")?,
        media_url: row.try_get("media_url")?,
        media_type: row.try_get("media_type")?,
        status: row.try_get("status")?,
        sent_at: row.try_get("sent_at")?,
        webhook_data: row.try_get("webhook_data")?,
        is_active: row.try_get("is_active")?,
    })
}

pub fn index_from_row(row: &PgRow) -> Result<EconomicIndex> {
    Ok(EconomicIndex {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

pub fn index_value_from_row(row: &PgRow) -> Result<EconomicIndexValue> {
    Ok(EconomicIndexValue {
        id: row.try_get("id")?,
        index_id: row.try_get("index_id")?,
        reference_date: row.try_get("reference_date")?,
        value: row.try_get("value")?,
    })
}

/// Maps every row, stopping at the first malformed one.
pub fn collect_rows<T>(rows: &[PgRow], map: fn(&PgRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}
