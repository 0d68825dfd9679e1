pub mod allocate;
pub mod estimate;
pub mod recommend;
pub mod replan;
pub mod risk;
pub mod score;
pub mod status;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    /// Storage and transaction errors propagate unmodified.
    #[error(transparent)]
    Store(#[from] kairos_store::StoreError),

    #[error("validation: {0}")]
    Validation(String),
}

pub type PlanResult<T> = Result<T, PlanError>;
