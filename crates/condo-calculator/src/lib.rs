pub mod breakdown;
pub mod config;
pub mod engine;
pub mod months;
pub mod parameters;
pub mod service;
pub mod spreadsheet;

pub use breakdown::{DebtBreakdown, PayeeBreakdown, PayeePercentages, payee_breakdown};
pub use config::{CalculatorConfig, parse_index_rates};
pub use engine::{CalculationTotals, ChargeCalculation, ItemCalculation, calculate_charge};
pub use months::elapsed_months;
pub use parameters::{ParameterSource, ResolvedParameters, resolve_parameters};
pub use service::ChargeCalculatorService;
pub use spreadsheet::render_csv;
