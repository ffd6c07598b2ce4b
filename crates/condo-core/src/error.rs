use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by a recalculation pass.
///
/// `Validation` is caller-caused; the remaining variants are server faults.
#[derive(Debug, Error)]
pub enum CalculationError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("arithmetic fault: {0}")]
    Arithmetic(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl CalculationError {
    pub fn charge_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "charge",
            id,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Validation(_))
    }
}
