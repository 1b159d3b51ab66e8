use clap::{Args, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::core::{
    PathReport, Scenario, SearchResult, SearchStrategy, SimError, SimulationParameters,
    find_min_work_years, simulate_paths,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum CliScenario {
    #[serde(alias = "plain")]
    Simple,
    #[serde(alias = "pensionCash", alias = "pension_cash", alias = "pension")]
    PensionCash,
}

impl From<CliScenario> for Scenario {
    fn from(value: CliScenario) -> Self {
        match value {
            CliScenario::Simple => Scenario::Simple,
            CliScenario::PensionCash => Scenario::PensionCash,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum CliSearchStrategy {
    #[serde(alias = "scan")]
    Linear,
    #[serde(alias = "bisect")]
    Binary,
}

impl From<CliSearchStrategy> for SearchStrategy {
    fn from(value: CliSearchStrategy) -> Self {
        match value {
            CliSearchStrategy::Linear => SearchStrategy::Linear,
            CliSearchStrategy::Binary => SearchStrategy::Binary,
        }
    }
}

/// Parameter overrides shared by the JSON config file and the command line.
#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct ParamOverrides {
    #[arg(long)]
    start_age: Option<u32>,
    #[arg(long)]
    end_age: Option<u32>,
    #[arg(long, help = "Sets end age to start age + years")]
    years_horizon: Option<u32>,
    #[arg(long)]
    initial_asset: Option<f64>,
    #[arg(long)]
    monthly_investment: Option<f64>,
    #[arg(long, help = "Annual mean return as a fraction (0.0678 = 6.78%)")]
    mean_return_annual: Option<f64>,
    #[arg(long, help = "Annual volatility as a fraction")]
    volatility_annual: Option<f64>,
    #[arg(long)]
    monthly_withdrawal: Option<f64>,
    #[arg(long)]
    monthly_pension: Option<f64>,
    #[arg(long)]
    pension_start_age: Option<u32>,
    #[arg(long)]
    target_final_asset: Option<f64>,
    #[arg(long, help = "Required success probability between 0 and 1")]
    confidence_level: Option<f64>,
    #[arg(long)]
    trial_count: Option<u32>,
    #[arg(long, help = "Trials recorded for percentile bands")]
    path_trial_count: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum)]
    scenario: Option<CliScenario>,
    #[arg(long, value_enum)]
    strategy: Option<CliSearchStrategy>,
    #[arg(long, value_delimiter = ',', help = "Comma separated band percentiles")]
    percentiles: Option<Vec<f64>>,
}

#[derive(Parser, Debug)]
#[command(
    name = "fire-mc",
    about = "Monte Carlo estimate of the working years needed to retire with a target confidence"
)]
pub struct Cli {
    #[arg(long, help = "JSON file with camelCase parameter overrides")]
    config: Option<PathBuf>,
    #[arg(long, help = "Write the full JSON report (search probes and bands) here")]
    report: Option<PathBuf>,
    #[arg(long, default_value_t = false, help = "Skip path recording and bands")]
    skip_paths: bool,
    #[command(flatten)]
    overrides: ParamOverrides,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to read config {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write report {}: {source}", path.display())]
    WriteReport {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode report: {0}")]
    EncodeReport(#[from] serde_json::Error),
    #[error(transparent)]
    Sim(#[from] SimError),
}

#[derive(Debug, Clone)]
struct RunConfig {
    params: SimulationParameters,
    years_horizon: Option<u32>,
    strategy: SearchStrategy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    parameters: &'a SimulationParameters,
    search: &'a SearchResult,
    paths: Option<&'a PathReport>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub search: SearchResult,
    pub paths: Option<PathReport>,
}

impl RunOutcome {
    pub fn found(&self) -> bool {
        self.search.is_found()
    }
}

pub fn run(cli: Cli) -> Result<RunOutcome, CliError> {
    let file_overrides = match &cli.config {
        Some(path) => Some(load_overrides(path)?),
        None => None,
    };
    let config = resolve_config(file_overrides, cli.overrides)?;
    let params = &config.params;
    info!(
        start_age = params.start_age,
        end_age = params.end_age,
        scenario = ?params.scenario,
        strategy = ?config.strategy,
        trial_count = params.trial_count,
        seed = params.seed,
        "starting work-years search"
    );

    let search = find_min_work_years(params, config.strategy)?;
    let paths = match search.required_work_years {
        Some(years) if !cli.skip_paths => Some(simulate_paths(params, years)?),
        _ => None,
    };

    print!("{}", format_summary(params, &search, paths.as_ref()));

    if let Some(path) = &cli.report {
        write_report(path, params, &search, paths.as_ref())?;
        info!(path = %path.display(), "wrote report");
    }

    Ok(RunOutcome { search, paths })
}

fn load_overrides(path: &Path) -> Result<ParamOverrides, CliError> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_config(
    file_overrides: Option<ParamOverrides>,
    cli_overrides: ParamOverrides,
) -> Result<RunConfig, CliError> {
    let mut config = default_config();
    if let Some(overrides) = file_overrides {
        apply_overrides(&mut config, overrides);
    }
    apply_overrides(&mut config, cli_overrides);
    Ok(build_config(config)?)
}

fn default_config() -> RunConfig {
    RunConfig {
        params: SimulationParameters {
            start_age: 25,
            end_age: 90,
            initial_asset: 5_000_000.0,
            monthly_investment: 150_000.0,
            mean_return_annual: 0.0678,
            volatility_annual: 0.2081,
            monthly_withdrawal: 200_000.0,
            monthly_pension: 0.0,
            pension_start_age: None,
            target_final_asset: 10_000_000.0,
            confidence_level: 0.95,
            trial_count: 10_000,
            path_trial_count: 1_000,
            seed: 42,
            scenario: Scenario::Simple,
            percentiles: vec![5.0, 50.0, 95.0],
        },
        years_horizon: None,
        strategy: SearchStrategy::Binary,
    }
}

fn apply_overrides(config: &mut RunConfig, overrides: ParamOverrides) {
    let params = &mut config.params;
    if let Some(v) = overrides.start_age {
        params.start_age = v;
    }
    if let Some(v) = overrides.end_age {
        params.end_age = v;
    }
    if let Some(v) = overrides.years_horizon {
        config.years_horizon = Some(v);
    }
    if let Some(v) = overrides.initial_asset {
        params.initial_asset = v;
    }
    if let Some(v) = overrides.monthly_investment {
        params.monthly_investment = v;
    }
    if let Some(v) = overrides.mean_return_annual {
        params.mean_return_annual = v;
    }
    if let Some(v) = overrides.volatility_annual {
        params.volatility_annual = v;
    }
    if let Some(v) = overrides.monthly_withdrawal {
        params.monthly_withdrawal = v;
    }
    if let Some(v) = overrides.monthly_pension {
        params.monthly_pension = v;
    }
    if let Some(v) = overrides.pension_start_age {
        params.pension_start_age = Some(v);
    }
    if let Some(v) = overrides.target_final_asset {
        params.target_final_asset = v;
    }
    if let Some(v) = overrides.confidence_level {
        params.confidence_level = v;
    }
    if let Some(v) = overrides.trial_count {
        params.trial_count = v;
    }
    if let Some(v) = overrides.path_trial_count {
        params.path_trial_count = v;
    }
    if let Some(v) = overrides.seed {
        params.seed = v;
    }
    if let Some(v) = overrides.scenario {
        params.scenario = v.into();
    }
    if let Some(v) = overrides.strategy {
        config.strategy = v.into();
    }
    if let Some(v) = overrides.percentiles {
        params.percentiles = v;
    }
}

fn build_config(mut config: RunConfig) -> Result<RunConfig, SimError> {
    if let Some(years) = config.years_horizon {
        if years == 0 {
            return Err(SimError::InvalidConfiguration(
                "years_horizon must be > 0".to_string(),
            ));
        }
        config.params.end_age = config.params.start_age.checked_add(years).ok_or_else(|| {
            SimError::InvalidConfiguration(format!(
                "start_age ({}) + years_horizon ({years}) is out of range",
                config.params.start_age
            ))
        })?;
    }

    config.params.validate()?;
    Ok(config)
}

fn write_report(
    path: &Path,
    params: &SimulationParameters,
    search: &SearchResult,
    paths: Option<&PathReport>,
) -> Result<(), CliError> {
    let json = report_json(params, search, paths)?;
    fs::write(path, json).map_err(|source| CliError::WriteReport {
        path: path.to_path_buf(),
        source,
    })
}

fn report_json(
    params: &SimulationParameters,
    search: &SearchResult,
    paths: Option<&PathReport>,
) -> Result<String, serde_json::Error> {
    let report = RunReport {
        parameters: params,
        search,
        paths,
    };
    Ok(format!("{}\n", serde_json::to_string_pretty(&report)?))
}

struct Summary<'a> {
    params: &'a SimulationParameters,
    search: &'a SearchResult,
    paths: Option<&'a PathReport>,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (params, search) = (self.params, self.search);
        match (search.required_work_years, search.retirement_age) {
            (Some(years), Some(age)) => {
                writeln!(f, "Required work years: {years}")?;
                writeln!(f, "Retirement age: {age}")?;
                if let Some(rate) = search.achieved_success_rate {
                    writeln!(
                        f,
                        "Success rate: {:.2}% (target {:.2}%)",
                        rate * 100.0,
                        params.confidence_level * 100.0
                    )?;
                }
            }
            _ => {
                writeln!(f, "Required work years: not found")?;
                writeln!(f, "{}", search.message)?;
            }
        }
        writeln!(f, "Probes: {}", search.probes.len())?;

        let Some(paths) = self.paths else {
            return Ok(());
        };

        if let Some(cash) = paths.cash_switch {
            writeln!(
                f,
                "Cash mode switch age ({} of {} trials): mean {:.2}, median {:.2}, min {}, max {}",
                cash.switched_trials,
                paths.trial_count,
                cash.mean_age,
                cash.median_age,
                cash.min_age,
                cash.max_age
            )?;
        }
        writeln!(f, "Depleted trials: {:.2}%", paths.depleted_fraction * 100.0)?;

        let bands = &paths.bands;
        write!(f, "{:>5}", "age")?;
        for s in &bands.series {
            write!(f, " {:>16}", format!("p{}", s.percentile))?;
        }
        writeln!(f)?;
        let horizon = bands.months.len();
        for year in (0..params.max_work_years()).step_by(5) {
            let month = ((year as usize) * 12).min(horizon.saturating_sub(1));
            write!(f, "{:>5}", params.start_age + year)?;
            for s in &bands.series {
                write!(f, " {:>16.0}", s.values.get(month).copied().unwrap_or(0.0))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn format_summary(
    params: &SimulationParameters,
    search: &SearchResult,
    paths: Option<&PathReport>,
) -> String {
    Summary {
        params,
        search,
        paths,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn overrides_from_json(json: &str) -> ParamOverrides {
        serde_json::from_str(json).expect("json should parse")
    }

    fn quick_config() -> RunConfig {
        let mut config = default_config();
        config.params.start_age = 60;
        config.params.end_age = 75;
        config.params.trial_count = 200;
        config.params.path_trial_count = 50;
        config.params.monthly_withdrawal = 100_000.0;
        config
    }

    #[test]
    fn defaults_match_reference_scenario() {
        let config = resolve_config(None, ParamOverrides::default()).expect("valid defaults");
        let params = config.params;
        assert_eq!(params.start_age, 25);
        assert_eq!(params.end_age, 90);
        assert_eq!(params.horizon_months(), 780);
        assert_eq!(params.max_work_years(), 65);
        assert_approx(params.initial_asset, 5_000_000.0);
        assert_approx(params.confidence_level, 0.95);
        assert_eq!(params.scenario, Scenario::Simple);
        assert_eq!(config.strategy, SearchStrategy::Binary);

        let rates = params.monthly_rates();
        assert!((rates.mean - 0.0054817).abs() < 1e-6);
        assert!((rates.volatility - 0.060073).abs() < 1e-6);
    }

    #[test]
    fn json_overrides_use_camel_case_keys() {
        let overrides = overrides_from_json(
            r#"{
              "startAge": 30,
              "endAge": 85,
              "initialAsset": 10000000,
              "monthlyPension": 200000,
              "pensionStartAge": 70,
              "targetFinalAsset": 20000000,
              "scenario": "pension-cash",
              "strategy": "linear",
              "percentiles": [10, 50, 90]
            }"#,
        );
        let config = resolve_config(Some(overrides), ParamOverrides::default())
            .expect("valid config");
        let params = config.params;
        assert_eq!(params.start_age, 30);
        assert_eq!(params.end_age, 85);
        assert_approx(params.initial_asset, 10_000_000.0);
        assert_eq!(params.pension_start_age, Some(70));
        assert_eq!(params.pension_start_month(), Some(480));
        assert_eq!(params.scenario, Scenario::PensionCash);
        assert_eq!(config.strategy, SearchStrategy::Linear);
        assert_eq!(params.percentiles, vec![10.0, 50.0, 90.0]);
    }

    #[test]
    fn json_rejects_unknown_keys() {
        let err = serde_json::from_str::<ParamOverrides>(r#"{"monthlyInvestmnet": 1}"#)
            .expect_err("typo must be rejected");
        assert!(err.to_string().contains("monthlyInvestmnet"));
    }

    #[test]
    fn command_line_overrides_config_file() {
        let file = overrides_from_json(r#"{"trialCount": 500, "seed": 9, "startAge": 40}"#);
        let cli = Cli::try_parse_from([
            "fire-mc",
            "--trial-count",
            "250",
            "--scenario",
            "pension-cash",
            "--percentiles",
            "1,50,99",
        ])
        .expect("valid flags");
        let config = resolve_config(Some(file), cli.overrides).expect("valid config");
        assert_eq!(config.params.trial_count, 250);
        assert_eq!(config.params.seed, 9);
        assert_eq!(config.params.start_age, 40);
        assert_eq!(config.params.scenario, Scenario::PensionCash);
        assert_eq!(config.params.percentiles, vec![1.0, 50.0, 99.0]);
    }

    #[test]
    fn years_horizon_sets_end_age() {
        let overrides = overrides_from_json(r#"{"startAge": 35, "yearsHorizon": 30}"#);
        let config = resolve_config(Some(overrides), ParamOverrides::default())
            .expect("valid config");
        assert_eq!(config.params.end_age, 65);
        assert_eq!(config.params.horizon_months(), 360);
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let overrides = overrides_from_json(r#"{"confidenceLevel": 1.5}"#);
        let err = resolve_config(Some(overrides), ParamOverrides::default())
            .expect_err("must reject confidence");
        assert!(matches!(err, CliError::Sim(SimError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_start_age_not_before_end_age() {
        let overrides = overrides_from_json(r#"{"startAge": 90, "endAge": 90}"#);
        let err = resolve_config(Some(overrides), ParamOverrides::default())
            .expect_err("must reject ages");
        assert!(err.to_string().contains("start_age"));
    }

    #[test]
    fn rejects_pension_without_start_age() {
        let overrides = overrides_from_json(r#"{"monthlyPension": 1000}"#);
        let err = resolve_config(Some(overrides), ParamOverrides::default())
            .expect_err("must require pension start age");
        assert!(err.to_string().contains("pension_start_age"));
    }

    #[test]
    fn rejects_pension_start_after_horizon() {
        let overrides =
            overrides_from_json(r#"{"monthlyPension": 1000, "pensionStartAge": 95}"#);
        let err = resolve_config(Some(overrides), ParamOverrides::default())
            .expect_err("must reject pension age");
        assert!(err.to_string().contains("pension_start_age"));
        assert!(!err.to_string().contains("--"));
    }

    #[test]
    fn late_pension_start_age_without_pension_is_accepted() {
        let overrides = overrides_from_json(r#"{"pensionStartAge": 95}"#);
        let config = resolve_config(Some(overrides), ParamOverrides::default())
            .expect("unused pension age is fine");
        assert_eq!(config.params.pension_start_month(), None);
    }

    #[test]
    fn rejects_ages_that_overflow_the_horizon() {
        let overrides = overrides_from_json(r#"{"endAge": 400000000, "trialCount": 1}"#);
        let err = resolve_config(Some(overrides), ParamOverrides::default())
            .expect_err("must reject huge horizon");
        assert!(matches!(err, CliError::Sim(SimError::InvalidConfiguration(_))));

        let overrides = overrides_from_json(r#"{"startAge": 4294967290, "yearsHorizon": 10}"#);
        let err = resolve_config(Some(overrides), ParamOverrides::default())
            .expect_err("must reject overflowing end age");
        assert!(err.to_string().contains("years_horizon"));
    }

    #[test]
    fn rejects_non_finite_and_negative_amounts() {
        let mut config = default_config();
        config.params.monthly_withdrawal = -1.0;
        assert!(build_config(config).is_err());

        let mut config = default_config();
        config.params.mean_return_annual = f64::NAN;
        assert!(build_config(config).is_err());
    }

    #[test]
    fn zero_trials_are_degenerate() {
        let overrides = overrides_from_json(r#"{"trialCount": 0}"#);
        let err = resolve_config(Some(overrides), ParamOverrides::default())
            .expect_err("must reject zero trials");
        assert!(matches!(err, CliError::Sim(SimError::NumericDegenerate(_))));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let path = std::env::temp_dir().join("fire-mc-missing-config.json");
        let _ = fs::remove_file(&path);
        let err = load_overrides(&path).expect_err("missing file");
        assert!(matches!(err, CliError::ReadConfig { .. }));
    }

    #[test]
    fn summary_and_report_describe_found_search() {
        let config = build_config(quick_config()).expect("valid config");
        let params = &config.params;
        let search = find_min_work_years(params, SearchStrategy::Binary).expect("search runs");
        let years = search.require().expect("reachable target");
        let paths = simulate_paths(params, years).expect("valid paths");

        let summary = format_summary(params, &search, Some(&paths));
        assert!(summary.contains("Required work years:"));
        assert!(summary.contains(&format!("Retirement age: {}", 60 + years)));
        assert!(summary.contains("p50"));

        let json = report_json(params, &search, Some(&paths)).expect("report encodes");
        assert!(json.contains("\"requiredWorkYears\""));
        assert!(json.contains("\"retirementAge\""));
        assert!(json.contains("\"probes\""));
        assert!(json.contains("\"series\""));
        assert!(json.contains("\"targetFinalAsset\""));
        assert!(json.contains("\"scenario\": \"simple\""));
    }

    #[test]
    fn summary_reports_not_found() {
        let mut config = quick_config();
        config.params.target_final_asset = 1e15;
        let config = build_config(config).expect("valid config");
        let search =
            find_min_work_years(&config.params, SearchStrategy::Linear).expect("search runs");
        let summary = format_summary(&config.params, &search, None);
        assert!(summary.contains("not found"));

        let json = report_json(&config.params, &search, None).expect("report encodes");
        assert!(json.contains("\"requiredWorkYears\": null"));
        assert!(json.contains("\"paths\": null"));
    }

    #[test]
    fn run_writes_report_file() {
        let path = std::env::temp_dir().join(format!("fire-mc-report-{}.json", std::process::id()));
        let path_arg = path.to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "fire-mc",
            "--start-age",
            "60",
            "--end-age",
            "75",
            "--trial-count",
            "200",
            "--path-trial-count",
            "40",
            "--monthly-withdrawal",
            "100000",
            "--strategy",
            "linear",
            "--report",
            path_arg.as_str(),
        ])
        .expect("valid flags");

        let outcome = run(cli).expect("run succeeds");
        assert!(outcome.found());
        assert_eq!(
            outcome.paths.as_ref().map(|p| p.trial_count),
            Some(40)
        );

        let written = fs::read_to_string(&path).expect("report written");
        let value: serde_json::Value = serde_json::from_str(&written).expect("valid json");
        assert_eq!(value["search"]["strategy"], "linear");
        assert_eq!(
            value["paths"]["bands"]["months"].as_array().map(|m| m.len()),
            Some(180)
        );
        let _ = fs::remove_file(&path);
    }
}
