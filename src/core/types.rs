use serde::Serialize;

use super::error::SimError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    Simple,
    PensionCash,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStrategy {
    Linear,
    Binary,
}

/// Longest supported horizon between `start_age` and `end_age`.
pub const MAX_HORIZON_YEARS: u32 = 150;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub start_age: u32,
    pub end_age: u32,
    pub initial_asset: f64,
    pub monthly_investment: f64,
    pub mean_return_annual: f64,
    pub volatility_annual: f64,
    pub monthly_withdrawal: f64,
    pub monthly_pension: f64,
    pub pension_start_age: Option<u32>,
    pub target_final_asset: f64,
    pub confidence_level: f64,
    pub trial_count: u32,
    pub path_trial_count: u32,
    pub seed: u64,
    pub scenario: Scenario,
    pub percentiles: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyRates {
    pub mean: f64,
    pub volatility: f64,
}

impl SimulationParameters {
    pub fn horizon_months(&self) -> u32 {
        self.max_work_years().saturating_mul(12)
    }

    pub fn max_work_years(&self) -> u32 {
        self.end_age.saturating_sub(self.start_age)
    }

    /// Geometric conversion of the annual mean, square-root-of-time scaling of the volatility.
    pub fn monthly_rates(&self) -> MonthlyRates {
        MonthlyRates {
            mean: (1.0 + self.mean_return_annual).powf(1.0 / 12.0) - 1.0,
            volatility: self.volatility_annual / 12_f64.sqrt(),
        }
    }

    /// Month index from which the pension offsets withdrawals, if any.
    pub fn pension_start_month(&self) -> Option<u32> {
        if self.monthly_pension <= 0.0 {
            return None;
        }
        self.pension_start_age
            .map(|age| age.saturating_sub(self.start_age).saturating_mul(12))
    }

    /// The simple scenario has no pension leg, so a configured pension has no effect.
    pub fn ignores_pension(&self) -> bool {
        self.scenario == Scenario::Simple && self.monthly_pension > 0.0
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.start_age >= self.end_age {
            return Err(SimError::InvalidConfiguration(format!(
                "start_age ({}) must be < end_age ({})",
                self.start_age, self.end_age
            )));
        }
        if self.end_age - self.start_age > MAX_HORIZON_YEARS {
            return Err(SimError::InvalidConfiguration(format!(
                "end_age - start_age must be <= {MAX_HORIZON_YEARS} years, got {}",
                self.end_age - self.start_age
            )));
        }

        for (name, value) in [
            ("initial_asset", self.initial_asset),
            ("monthly_investment", self.monthly_investment),
            ("monthly_withdrawal", self.monthly_withdrawal),
            ("monthly_pension", self.monthly_pension),
            ("target_final_asset", self.target_final_asset),
            ("volatility_annual", self.volatility_annual),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidConfiguration(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }

        if !self.mean_return_annual.is_finite() || self.mean_return_annual <= -1.0 {
            return Err(SimError::InvalidConfiguration(format!(
                "mean_return_annual must be finite and > -1, got {}",
                self.mean_return_annual
            )));
        }

        if !(0.0..=1.0).contains(&self.confidence_level) {
            return Err(SimError::InvalidConfiguration(format!(
                "confidence_level must be between 0 and 1, got {}",
                self.confidence_level
            )));
        }

        if self.monthly_pension > 0.0 {
            match self.pension_start_age {
                None => {
                    return Err(SimError::InvalidConfiguration(
                        "pension_start_age is required when monthly_pension > 0".to_string(),
                    ));
                }
                Some(age) if age >= self.end_age => {
                    return Err(SimError::InvalidConfiguration(format!(
                        "pension_start_age ({age}) must be < end_age ({})",
                        self.end_age
                    )));
                }
                Some(_) => {}
            }
        }

        if let Some(bad) = self
            .percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(SimError::InvalidConfiguration(format!(
                "percentiles must be between 0 and 100, got {bad}"
            )));
        }

        if self.trial_count == 0 {
            return Err(SimError::NumericDegenerate(
                "trial_count must be > 0".to_string(),
            ));
        }
        if self.path_trial_count == 0 {
            return Err(SimError::NumericDegenerate(
                "path_trial_count must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationResult {
    pub work_years: u32,
    pub trial_count: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub success_ci_half_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchProbe {
    pub work_years: u32,
    pub lower_bound: u32,
    pub upper_bound: u32,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub strategy: SearchStrategy,
    pub min_work_years: u32,
    pub max_work_years: u32,
    pub confidence_level: f64,
    pub required_work_years: Option<u32>,
    pub retirement_age: Option<u32>,
    pub achieved_success_rate: Option<f64>,
    pub probes: Vec<SearchProbe>,
    pub message: String,
}

impl SearchResult {
    pub fn is_found(&self) -> bool {
        self.required_work_years.is_some()
    }

    /// The found work-years, or `SearchExhausted` carrying the best rate seen.
    pub fn require(&self) -> Result<u32, SimError> {
        self.required_work_years
            .ok_or_else(|| SimError::SearchExhausted {
                min_work_years: self.min_work_years,
                max_work_years: self.max_work_years,
                best_success_rate: self
                    .probes
                    .iter()
                    .map(|p| p.success_rate)
                    .fold(0.0, f64::max),
                confidence_level: self.confidence_level,
            })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileSeries {
    pub percentile: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileBands {
    pub months: Vec<u32>,
    pub ages: Vec<u32>,
    pub series: Vec<PercentileSeries>,
}

impl PercentileBands {
    pub fn series_for(&self, percentile: f64) -> Option<&PercentileSeries> {
        self.series
            .iter()
            .find(|s| (s.percentile - percentile).abs() < 1e-9)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashSwitchSummary {
    pub switched_trials: u32,
    pub switched_fraction: f64,
    pub mean_age: f64,
    pub median_age: f64,
    pub min_age: u32,
    pub max_age: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathReport {
    pub work_years: u32,
    pub retirement_age: u32,
    pub trial_count: u32,
    pub median_terminal_wealth: f64,
    pub depleted_fraction: f64,
    pub bands: PercentileBands,
    pub cash_switch: Option<CashSwitchSummary>,
}
