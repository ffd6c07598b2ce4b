pub mod error;
pub mod indices;
pub mod models;
pub mod parties;
pub mod storage;
pub mod trail;

pub use error::CalculationError;
pub use indices::{EconomicIndex, EconomicIndexValue};
pub use models::{
    CalculationParameter, Charge, ChargeFees, ChargeItem, ChargeStatus, FeeRule, FeeType,
    ItemCategory, RateSet,
};
pub use parties::{Client, Person, Unit, UnitOwner};
pub use storage::{ChargeAmounts, ChargeSnapshot, ChargeStore, ItemAmounts, RecalculationUpdate};
pub use trail::{
    ChargeDocument, ChargeProgress, TimelineEntry, TimelineKind, WhatsAppMessage, build_timeline,
    contact_summary,
};
