use chrono::NaiveDate;
use condo_core::{CalculationParameter, RateSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CalculatorConfig;

/// Where the rates of a calculation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterSource {
    Configured {
        #[serde(rename = "parameterId")]
        parameter_id: Uuid,
    },
    Defaults,
}

impl ParameterSource {
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Defaults)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameters {
    pub rates: RateSet,
    pub source: ParameterSource,
}

/// Picks the active record covering `calculation_date`. Among several, the
/// latest start wins. Falls back to the configured defaults and says so.
pub fn resolve_parameters(
    records: &[CalculationParameter],
    calculation_date: NaiveDate,
    config: &CalculatorConfig,
) -> ResolvedParameters {
    records
        .iter()
        .filter(|record| record.covers(calculation_date))
        .max_by_key(|record| record.start_date)
        .map(|record| ResolvedParameters {
            rates: record.rates.clone(),
            source: ParameterSource::Configured {
                parameter_id: record.id,
            },
        })
        .unwrap_or_else(|| ResolvedParameters {
            rates: config.default_rates.clone(),
            source: ParameterSource::Defaults,
        })
}
