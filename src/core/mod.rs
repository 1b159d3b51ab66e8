mod engine;
mod error;
mod policy;
mod returns;
mod solver;
mod types;

pub use engine::{
    TrialOutcome, binomial_ci_half_width, estimate_success, estimate_success_with, percentile,
    percentile_bands, policy_for, simulate_paths, simulate_trial, summarize_cash_switch,
};
pub use error::{SimError, SimResult};
pub use policy::{MonthlyPolicy, PensionCashPolicy, SimplePolicy, TrialState};
pub use returns::{NormalReturns, ReturnSource, derive_seed};
pub use solver::{YearSearch, find_min_work_years, search_min_years};
pub use types::{
    CashSwitchSummary, EstimationResult, MonthlyRates, PathReport, PercentileBands,
    PercentileSeries, Scenario, SearchProbe, SearchResult, SearchStrategy, SimulationParameters,
};
