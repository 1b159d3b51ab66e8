use super::types::SimulationParameters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialState {
    pub wealth: f64,
    pub cash_mode_month: Option<u32>,
    pub absorbed: bool,
}

impl TrialState {
    pub fn new(initial_wealth: f64) -> Self {
        Self {
            wealth: initial_wealth,
            cash_mode_month: None,
            absorbed: false,
        }
    }

    pub fn in_cash_mode(&self) -> bool {
        self.cash_mode_month.is_some()
    }
}

/// One month of wealth evolution. Implementations must leave an absorbed
/// state untouched.
pub trait MonthlyPolicy: Sync {
    fn apply_month(&self, state: TrialState, month: u32, monthly_return: f64) -> TrialState;
}

#[derive(Debug, Clone, Copy)]
pub struct SimplePolicy {
    pub work_months: u32,
    pub contribution: f64,
    pub withdrawal: f64,
}

impl SimplePolicy {
    pub fn new(params: &SimulationParameters, work_years: u32) -> Self {
        Self {
            work_months: work_years * 12,
            contribution: params.monthly_investment,
            withdrawal: params.monthly_withdrawal,
        }
    }
}

impl MonthlyPolicy for SimplePolicy {
    fn apply_month(&self, mut state: TrialState, month: u32, monthly_return: f64) -> TrialState {
        if state.absorbed {
            return state;
        }

        let grown = state.wealth * (1.0 + monthly_return);
        if month < self.work_months {
            state.wealth = grown + self.contribution;
        } else {
            state.wealth = grown - self.withdrawal;
            absorb_if_depleted(&mut state);
        }
        state
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PensionCashPolicy {
    pub work_months: u32,
    pub horizon_months: u32,
    pub contribution: f64,
    pub withdrawal: f64,
    pub pension: f64,
    pub pension_start_month: Option<u32>,
}

impl PensionCashPolicy {
    pub fn new(params: &SimulationParameters, work_years: u32) -> Self {
        Self {
            work_months: work_years * 12,
            horizon_months: params.horizon_months(),
            contribution: params.monthly_investment,
            withdrawal: params.monthly_withdrawal,
            pension: params.monthly_pension,
            pension_start_month: params.pension_start_month(),
        }
    }

    pub fn effective_withdrawal(&self, month: u32) -> f64 {
        let pension = match self.pension_start_month {
            Some(start) if month >= start => self.pension,
            _ => 0.0,
        };
        (self.withdrawal - pension).max(0.0)
    }
}

impl MonthlyPolicy for PensionCashPolicy {
    fn apply_month(&self, mut state: TrialState, month: u32, monthly_return: f64) -> TrialState {
        if state.absorbed {
            return state;
        }

        let grown = state.wealth * (1.0 + monthly_return);
        if month < self.work_months {
            state.wealth = grown + self.contribution;
            return state;
        }

        let withdrawal = self.effective_withdrawal(month);
        let remaining_months = self.horizon_months.saturating_sub(month) as f64;
        if !state.in_cash_mode() && grown >= withdrawal * remaining_months {
            state.cash_mode_month = Some(month);
        }

        // Cash mode does not change the arithmetic; only the switch month is kept.
        state.wealth = grown - withdrawal;
        absorb_if_depleted(&mut state);
        state
    }
}

fn absorb_if_depleted(state: &mut TrialState) {
    if state.wealth <= 0.0 {
        state.wealth = 0.0;
        state.absorbed = true;
    }
}
