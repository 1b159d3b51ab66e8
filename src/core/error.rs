use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("degenerate estimate: {0}")]
    NumericDegenerate(String),

    #[error(
        "no work-years value in [{min_work_years}, {max_work_years}] reaches confidence {confidence_level} (best success rate {best_success_rate})"
    )]
    SearchExhausted {
        min_work_years: u32,
        max_work_years: u32,
        best_success_rate: f64,
        confidence_level: f64,
    },
}

pub type SimResult<T> = Result<T, SimError>;
