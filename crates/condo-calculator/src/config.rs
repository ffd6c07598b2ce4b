use std::collections::BTreeMap;

use anyhow::Context;
use condo_core::RateSet;
use rust_decimal::Decimal;

/// Rate tables consulted by the calculator. Built once at start-up and passed
/// into every calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatorConfig {
    /// Monthly correction rate per index name, as a fraction (0.005 = 0.5%).
    pub index_rates: BTreeMap<String, Decimal>,
    /// Used for index names missing from `index_rates`.
    pub fallback_index_rate: Decimal,
    /// Applied when a client has no parameter record covering the date.
    pub default_rates: RateSet,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        let index_rates = BTreeMap::from([
            ("INPC".to_string(), Decimal::new(5, 3)),
            ("IGPM".to_string(), Decimal::new(6, 3)),
            ("IPCA".to_string(), Decimal::new(4, 3)),
            ("CDI".to_string(), Decimal::new(8, 3)),
        ]);

        Self {
            index_rates,
            fallback_index_rate: Decimal::new(5, 3),
            default_rates: RateSet {
                fine_rate: Decimal::new(20, 1),
                interest_rate: Decimal::new(10, 1),
                extrajudicial_fees_rate: Decimal::new(100, 1),
                execution_fees_rate: Decimal::new(100, 1),
                art_523_fine_rate: Decimal::new(100, 1),
                correction_index: "INPC".to_string(),
            },
        }
    }
}

impl CalculatorConfig {
    pub fn monthly_index_rate(&self, index_name: &str) -> Decimal {
        self.index_rates
            .get(&index_name.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.fallback_index_rate)
    }

    pub fn with_index_rates(mut self, overrides: BTreeMap<String, Decimal>) -> Self {
        self.index_rates.extend(overrides);
        self
    }
}

/// Parses `NAME=rate` pairs separated by commas, e.g. `INPC=0.005,SELIC=0.009`.
pub fn parse_index_rates(raw: &str) -> anyhow::Result<BTreeMap<String, Decimal>> {
    let mut rates = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (name, rate) = pair
            .split_once('=')
            .with_context(|| format!("index rate `{pair}` must look like NAME=rate"))?;
        let name = name.trim().to_ascii_uppercase();
        if name.is_empty() {
            anyhow::bail!("index rate `{pair}` has an empty name");
        }
        let rate: Decimal = rate
            .trim()
            .parse()
            .with_context(|| format!("index rate for {name} is not a decimal"))?;
        if rate < Decimal::ZERO {
            anyhow::bail!("index rate for {name} must be non-negative");
        }
        rates.insert(name, rate);
    }

    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_index_table() {
        let config = CalculatorConfig::default();
        assert_eq!(config.monthly_index_rate("INPC"), dec!(0.005));
        assert_eq!(config.monthly_index_rate("igpm"), dec!(0.006));
        assert_eq!(config.monthly_index_rate("IPCA"), dec!(0.004));
        assert_eq!(config.monthly_index_rate("CDI"), dec!(0.008));
        assert_eq!(config.monthly_index_rate("SELIC"), dec!(0.005));
    }

    #[test]
    fn overrides_extend_the_table() {
        let overrides = parse_index_rates("selic=0.009, INPC=0.0045").unwrap();
        let config = CalculatorConfig::default().with_index_rates(overrides);
        assert_eq!(config.monthly_index_rate("SELIC"), dec!(0.009));
        assert_eq!(config.monthly_index_rate("INPC"), dec!(0.0045));
        assert_eq!(config.monthly_index_rate("CDI"), dec!(0.008));
    }

    #[test]
    fn malformed_rates_rejected() {
        assert!(parse_index_rates("INPC").is_err());
        assert!(parse_index_rates("=0.1").is_err());
        assert!(parse_index_rates("INPC=abc").is_err());
        assert!(parse_index_rates("INPC=-0.1").is_err());
        assert!(parse_index_rates("").unwrap().is_empty());
    }
}
