use rayon::prelude::*;
use tracing::{debug, info};

use super::error::{SimError, SimResult};
use super::policy::{MonthlyPolicy, PensionCashPolicy, SimplePolicy, TrialState};
use super::returns::{NormalReturns, PATH_STREAM, ReturnSource, derive_seed};
use super::types::{
    CashSwitchSummary, EstimationResult, PathReport, PercentileBands, PercentileSeries, Scenario,
    SimulationParameters,
};

const ESTIMATOR_STREAM: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    pub terminal_wealth: f64,
    pub cash_switch_month: Option<u32>,
    pub depleted_month: Option<u32>,
}

/// Evolves one trajectory over `horizon_months`.
///
/// Stops drawing returns once the policy absorbs the trial at zero. When a
/// path buffer is given it is cleared and always ends up `horizon_months`
/// long, padded with zeros after depletion.
pub fn simulate_trial<P, S>(
    policy: &P,
    horizon_months: u32,
    initial_wealth: f64,
    returns: &mut S,
    mut path: Option<&mut Vec<f64>>,
) -> TrialOutcome
where
    P: MonthlyPolicy + ?Sized,
    S: ReturnSource + ?Sized,
{
    if let Some(p) = path.as_mut() {
        p.clear();
    }

    let mut state = TrialState::new(initial_wealth);
    let mut depleted_month = None;
    for month in 0..horizon_months {
        state = policy.apply_month(state, month, returns.next_return());
        if let Some(p) = path.as_mut() {
            p.push(state.wealth);
        }
        if state.absorbed {
            depleted_month = Some(month);
            break;
        }
    }

    if let Some(p) = path {
        p.resize(horizon_months as usize, 0.0);
    }

    TrialOutcome {
        terminal_wealth: state.wealth,
        cash_switch_month: state.cash_mode_month,
        depleted_month,
    }
}

pub fn policy_for(params: &SimulationParameters, work_years: u32) -> Box<dyn MonthlyPolicy> {
    match params.scenario {
        Scenario::Simple => Box::new(SimplePolicy::new(params, work_years)),
        Scenario::PensionCash => Box::new(PensionCashPolicy::new(params, work_years)),
    }
}

/// Fraction of `trial_count` trials ending at or above the target, using
/// the seeded normal return model.
pub fn estimate_success(
    params: &SimulationParameters,
    work_years: u32,
) -> SimResult<EstimationResult> {
    let rates = params.monthly_rates();
    estimate_success_with(params, work_years, |trial_id| {
        NormalReturns::new(rates, derive_seed(params.seed, ESTIMATOR_STREAM, trial_id))
    })
}

/// Same as [`estimate_success`] with a caller-supplied return source per trial.
pub fn estimate_success_with<S, F>(
    params: &SimulationParameters,
    work_years: u32,
    make_source: F,
) -> SimResult<EstimationResult>
where
    S: ReturnSource,
    F: Fn(u32) -> SimResult<S> + Sync,
{
    params.validate()?;
    check_work_years(params, work_years)?;

    let policy = policy_for(params, work_years);
    let horizon_months = params.horizon_months();

    let successes = (0..params.trial_count)
        .into_par_iter()
        .map(|trial_id| -> SimResult<u32> {
            let mut returns = make_source(trial_id)?;
            let outcome = simulate_trial(
                policy.as_ref(),
                horizon_months,
                params.initial_asset,
                &mut returns,
                None,
            );
            Ok(u32::from(outcome.terminal_wealth >= params.target_final_asset))
        })
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    let success_rate = successes as f64 / params.trial_count as f64;
    debug!(
        work_years,
        trial_count = params.trial_count,
        successes,
        success_rate,
        "estimated success rate"
    );

    Ok(EstimationResult {
        work_years,
        trial_count: params.trial_count,
        successes,
        success_rate,
        success_ci_half_width: binomial_ci_half_width(success_rate, params.trial_count),
    })
}

/// Re-runs `path_trial_count` trials keeping every monthly value and
/// summarises them for charting.
pub fn simulate_paths(params: &SimulationParameters, work_years: u32) -> SimResult<PathReport> {
    params.validate()?;
    check_work_years(params, work_years)?;

    let rates = params.monthly_rates();
    let policy = policy_for(params, work_years);
    let horizon_months = params.horizon_months();

    let trials = (0..params.path_trial_count)
        .into_par_iter()
        .map(|trial_id| -> SimResult<(Vec<f64>, TrialOutcome)> {
            let mut returns =
                NormalReturns::new(rates, derive_seed(params.seed, PATH_STREAM, trial_id))?;
            let mut path = Vec::with_capacity(horizon_months as usize);
            let outcome = simulate_trial(
                policy.as_ref(),
                horizon_months,
                params.initial_asset,
                &mut returns,
                Some(&mut path),
            );
            Ok((path, outcome))
        })
        .collect::<SimResult<Vec<_>>>()?;

    let report = aggregate_paths(params, work_years, &trials);
    info!(
        work_years,
        trials = report.trial_count,
        median_terminal_wealth = report.median_terminal_wealth,
        depleted_fraction = report.depleted_fraction,
        "aggregated wealth paths"
    );
    Ok(report)
}

fn aggregate_paths(
    params: &SimulationParameters,
    work_years: u32,
    trials: &[(Vec<f64>, TrialOutcome)],
) -> PathReport {
    let paths = trials.iter().map(|(path, _)| path.as_slice()).collect::<Vec<_>>();
    let bands = percentile_bands(
        &paths,
        params.horizon_months(),
        params.start_age,
        &params.percentiles,
    );

    let mut terminal = trials
        .iter()
        .map(|(_, o)| o.terminal_wealth)
        .collect::<Vec<_>>();
    let depleted = trials
        .iter()
        .filter(|(_, o)| o.depleted_month.is_some())
        .count();
    let switch_ages = trials
        .iter()
        .filter_map(|(_, o)| o.cash_switch_month)
        .map(|month| params.start_age + month / 12)
        .collect::<Vec<_>>();

    PathReport {
        work_years,
        retirement_age: params.start_age + work_years,
        trial_count: trials.len() as u32,
        median_terminal_wealth: percentile(&mut terminal, 50.0),
        depleted_fraction: fraction(depleted, trials.len()),
        bands,
        cash_switch: summarize_cash_switch(&switch_ages, trials.len()),
    }
}

/// Per-month percentiles across equally long paths.
pub fn percentile_bands(
    paths: &[&[f64]],
    horizon_months: u32,
    start_age: u32,
    percentiles: &[f64],
) -> PercentileBands {
    let months = (0..horizon_months).collect::<Vec<_>>();
    let ages = months.iter().map(|m| start_age + m / 12).collect::<Vec<_>>();
    let mut series = percentiles
        .iter()
        .map(|&p| PercentileSeries {
            percentile: p,
            values: Vec::with_capacity(horizon_months as usize),
        })
        .collect::<Vec<_>>();

    let mut column = Vec::with_capacity(paths.len());
    for month in 0..horizon_months as usize {
        column.clear();
        column.extend(paths.iter().map(|p| p.get(month).copied().unwrap_or(0.0)));
        column.sort_by(|a, b| a.total_cmp(b));
        for s in &mut series {
            s.values.push(percentile_sorted(&column, s.percentile));
        }
    }

    PercentileBands {
        months,
        ages,
        series,
    }
}

pub fn summarize_cash_switch(switch_ages: &[u32], trial_count: usize) -> Option<CashSwitchSummary> {
    let min_age = *switch_ages.iter().min()?;
    let max_age = *switch_ages.iter().max()?;
    let mut ages = switch_ages.iter().map(|&a| a as f64).collect::<Vec<_>>();
    let mean_age = ages.iter().sum::<f64>() / ages.len() as f64;

    Some(CashSwitchSummary {
        switched_trials: switch_ages.len() as u32,
        switched_fraction: fraction(switch_ages.len(), trial_count),
        mean_age,
        median_age: percentile(&mut ages, 50.0),
        min_age,
        max_age,
    })
}

fn check_work_years(params: &SimulationParameters, work_years: u32) -> SimResult<()> {
    let max = params.max_work_years();
    if work_years > max {
        return Err(SimError::InvalidConfiguration(format!(
            "work_years ({work_years}) must be <= end_age - start_age ({max})"
        )));
    }
    Ok(())
}

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64
}

pub fn binomial_ci_half_width(p: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    percentile_sorted(values, p)
}

fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
