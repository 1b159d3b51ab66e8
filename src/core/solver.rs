use tracing::{info, warn};

use super::engine::estimate_success;
use super::error::{SimError, SimResult};
use super::types::{SearchProbe, SearchResult, SearchStrategy, SimulationParameters};

/// Probes visited by a search and the first qualifying value, if any.
#[derive(Debug, Clone)]
pub struct YearSearch {
    pub found: Option<(u32, f64)>,
    pub probes: Vec<SearchProbe>,
}

/// Smallest `years` in `[min_years, max_years]` whose probed success rate
/// reaches `threshold`.
///
/// The binary strategy assumes the rate is non-decreasing in `years`. Both
/// strategies report `found: None` when nothing in range qualifies; the
/// binary search confirms its final candidate instead of returning the
/// upper bound unchecked.
pub fn search_min_years<F>(
    strategy: SearchStrategy,
    min_years: u32,
    max_years: u32,
    threshold: f64,
    mut probe: F,
) -> SimResult<YearSearch>
where
    F: FnMut(u32) -> SimResult<f64>,
{
    validate_range(min_years, max_years, threshold)?;

    let mut probes = Vec::new();
    let mut run_probe = |years: u32, lower: u32, upper: u32| -> SimResult<f64> {
        let success_rate = probe(years)?;
        info!(
            work_years = years,
            lower_bound = lower,
            upper_bound = upper,
            success_rate,
            "search probe"
        );
        probes.push(SearchProbe {
            work_years: years,
            lower_bound: lower,
            upper_bound: upper,
            success_rate,
        });
        Ok(success_rate)
    };

    let found = match strategy {
        SearchStrategy::Linear => {
            let mut found = None;
            for years in min_years..=max_years {
                let rate = run_probe(years, years, max_years)?;
                if rate >= threshold {
                    found = Some((years, rate));
                    break;
                }
            }
            found
        }
        SearchStrategy::Binary => {
            let mut lo = min_years;
            let mut hi = max_years;
            let mut confirmed = None;
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let rate = run_probe(mid, lo, hi)?;
                if rate >= threshold {
                    hi = mid;
                    confirmed = Some((mid, rate));
                } else {
                    lo = mid + 1;
                }
            }

            match confirmed {
                Some((years, rate)) if years == lo => Some((years, rate)),
                _ => {
                    let rate = run_probe(lo, lo, hi)?;
                    (rate >= threshold).then_some((lo, rate))
                }
            }
        }
    };

    Ok(YearSearch { found, probes })
}

/// Minimal work-years for which the estimated success rate reaches
/// `params.confidence_level`, searched over `[1, end_age - start_age]`.
pub fn find_min_work_years(
    params: &SimulationParameters,
    strategy: SearchStrategy,
) -> SimResult<SearchResult> {
    params.validate()?;
    if params.ignores_pension() {
        warn!(
            monthly_pension = params.monthly_pension,
            "pension is ignored by the simple scenario"
        );
    }

    let min_work_years = 1;
    let max_work_years = params.max_work_years();
    let search = search_min_years(
        strategy,
        min_work_years,
        max_work_years,
        params.confidence_level,
        |work_years| estimate_success(params, work_years).map(|e| e.success_rate),
    )?;

    let required_work_years = search.found.map(|(years, _)| years);
    let message = match required_work_years {
        Some(years) => format!(
            "Working {years} years (retiring at {}) reaches the confidence level.",
            params.start_age + years
        ),
        None => format!(
            "No work-years value between {min_work_years} and {max_work_years} reaches the confidence level."
        ),
    };
    info!(
        ?strategy,
        ?required_work_years,
        probes = search.probes.len(),
        "work-years search finished"
    );

    Ok(SearchResult {
        strategy,
        min_work_years,
        max_work_years,
        confidence_level: params.confidence_level,
        required_work_years,
        retirement_age: required_work_years.map(|years| params.start_age + years),
        achieved_success_rate: search.found.map(|(_, rate)| rate),
        probes: search.probes,
        message,
    })
}

fn validate_range(min_years: u32, max_years: u32, threshold: f64) -> SimResult<()> {
    if max_years < 1 {
        return Err(SimError::InvalidConfiguration(
            "max work years must be >= 1".to_string(),
        ));
    }
    if min_years > max_years {
        return Err(SimError::InvalidConfiguration(format!(
            "min work years ({min_years}) must be <= max work years ({max_years})"
        )));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SimError::InvalidConfiguration(format!(
            "confidence threshold must be between 0 and 1, got {threshold}"
        )));
    }
    Ok(())
}
