use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::drivers::{CircularityMethod, CircularitySettings, DividendPolicy};
use crate::types::{Money, Rate};

// The loop being solved: interest reduces net income, net income drives cash,
// a cash shortfall draws the revolver, and the revolver balance feeds the
// next interest computation. This is a numerical fixed point over plain
// values, not a cyclic object graph.

/// Everything one period's solve needs. All balances are beginning-of-period.
#[derive(Debug, Clone)]
pub struct PeriodSolveInput {
    pub period: u32,
    /// Pre-interest earnings.
    pub ebit: Money,
    /// Non-cash charges added back to operating cash flow.
    pub depreciation: Money,
    pub change_in_nwc: Money,
    pub capex: Money,
    pub beginning_cash: Money,
    pub tax_rate: Rate,
    pub dividend_policy: DividendPolicy,
    pub term_beginning: Money,
    pub term_rate: Rate,
    /// Scheduled amortization for this period (clamped to the balance).
    pub scheduled_repayment: Money,
    pub revolver_beginning: Money,
    pub revolver_capacity: Money,
    pub revolver_rate: Rate,
    pub minimum_cash: Money,
}

/// The solved per-period values, consistent with the reported interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSolution {
    pub period: u32,
    pub interest_expense: Money,
    pub term_interest: Money,
    pub revolver_interest: Money,
    pub ebt: Money,
    pub taxes: Money,
    pub net_income: Money,
    pub dividends: Money,
    pub operating_cash_flow: Money,
    pub free_cash_flow: Money,
    pub beginning_cash: Money,
    pub ending_cash: Money,
    pub term_beginning: Money,
    pub term_repayment: Money,
    pub term_ending: Money,
    pub revolver_beginning: Money,
    pub revolver_draw: Money,
    pub revolver_repayment: Money,
    pub revolver_ending: Money,
}

/// One solver step, appended to the convergence log and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceEntry {
    pub iteration: u32,
    pub cash: Money,
    pub revolver: Money,
    pub interest: Money,
    pub error: Money,
}

/// Audit trail of the solve, retained even on non-convergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircularityResult {
    pub converged: bool,
    pub iterations: u32,
    /// Absolute interest delta at exit.
    pub final_error: Money,
    pub convergence_log: Vec<ConvergenceEntry>,
}

#[derive(Debug, Clone)]
pub struct PeriodSolveOutput {
    pub solution: PeriodSolution,
    pub circularity: CircularityResult,
}

/// Solve one period's interest / cash / revolver fixed point.
pub fn solve_period(input: &PeriodSolveInput, settings: &CircularitySettings) -> PeriodSolveOutput {
    match settings.method {
        CircularityMethod::Iterative => solve_iterative(input, settings),
        CircularityMethod::ClosedForm => solve_closed_form(input),
    }
}

fn solve_iterative(input: &PeriodSolveInput, settings: &CircularitySettings) -> PeriodSolveOutput {
    let term = TermPosition::from_input(input);

    // Revolver assumed zero: the seed is term interest alone.
    let mut interest = term.interest;
    let mut log = Vec::new();
    let mut converged = false;
    let mut error = Decimal::ZERO;

    for iteration in 1..=settings.max_iterations {
        let step = run_step(input, &term, interest);
        error = (step.total_interest - interest).abs();
        log.push(ConvergenceEntry {
            iteration,
            cash: step.ending_cash,
            revolver: step.revolver_ending,
            interest: step.total_interest,
            error,
        });
        interest = step.total_interest;
        if error < settings.tolerance {
            converged = true;
            break;
        }
    }

    // Final pass with the exit interest so every reported line ties to it.
    // On non-convergence these are the best-effort values at the cap.
    let solution = assemble(input, &term, interest);

    PeriodSolveOutput {
        solution,
        circularity: CircularityResult {
            converged,
            iterations: log.len() as u32,
            final_error: error,
            convergence_log: log,
        },
    }
}

/// One pass assuming a zero average revolver balance, then a single interest
/// refinement from the resulting draw. Always reports converged with one
/// iteration; the residual between the refined interest and the pass's cash
/// flows is the accepted approximation.
fn solve_closed_form(input: &PeriodSolveInput) -> PeriodSolveOutput {
    let term = TermPosition::from_input(input);

    let pass = run_step(input, &term, term.interest);
    let refined_interest = pass.total_interest;
    let error = (refined_interest - term.interest).abs();

    // Income statement restated at the refined interest; cash flows and the
    // revolver plug retain the pre-refinement pass.
    let income = income_lines(input, refined_interest);
    let solution = PeriodSolution {
        period: input.period,
        interest_expense: refined_interest,
        term_interest: term.interest,
        revolver_interest: refined_interest - term.interest,
        ebt: income.ebt,
        taxes: income.taxes,
        net_income: income.net_income,
        dividends: income.dividends,
        operating_cash_flow: pass.operating_cash_flow,
        free_cash_flow: pass.free_cash_flow,
        beginning_cash: input.beginning_cash,
        ending_cash: pass.ending_cash,
        term_beginning: input.term_beginning,
        term_repayment: term.repayment,
        term_ending: term.ending,
        revolver_beginning: input.revolver_beginning,
        revolver_draw: pass.revolver_draw,
        revolver_repayment: pass.revolver_repayment,
        revolver_ending: pass.revolver_ending,
    };

    PeriodSolveOutput {
        solution,
        circularity: CircularityResult {
            converged: true,
            iterations: 1,
            final_error: error,
            convergence_log: vec![ConvergenceEntry {
                iteration: 1,
                cash: pass.ending_cash,
                revolver: pass.revolver_ending,
                interest: refined_interest,
                error,
            }],
        },
    }
}

// ---------------------------------------------------------------------------
// Fixed-point step
// ---------------------------------------------------------------------------

struct TermPosition {
    repayment: Money,
    ending: Money,
    interest: Money,
}

impl TermPosition {
    fn from_input(input: &PeriodSolveInput) -> Self {
        let repayment = input.scheduled_repayment.min(input.term_beginning);
        let ending = input.term_beginning - repayment;
        let average = (input.term_beginning + ending) / dec!(2);
        TermPosition {
            repayment,
            ending,
            interest: average * input.term_rate,
        }
    }
}

struct IncomeLines {
    ebt: Money,
    taxes: Money,
    net_income: Money,
    dividends: Money,
}

fn income_lines(input: &PeriodSolveInput, interest: Money) -> IncomeLines {
    let ebt = input.ebit - interest;
    // Tax floored at zero: losses carry no benefit under a single
    // effective rate.
    let taxes = if ebt > Decimal::ZERO {
        ebt * input.tax_rate
    } else {
        Decimal::ZERO
    };
    let net_income = ebt - taxes;
    let dividends = match input.dividend_policy {
        DividendPolicy::None => Decimal::ZERO,
        DividendPolicy::PayoutRatio { ratio } => {
            if net_income > Decimal::ZERO {
                net_income * ratio
            } else {
                Decimal::ZERO
            }
        }
        DividendPolicy::FixedAmount { amount } => amount,
    };
    IncomeLines {
        ebt,
        taxes,
        net_income,
        dividends,
    }
}

struct StepOutcome {
    operating_cash_flow: Money,
    free_cash_flow: Money,
    ending_cash: Money,
    revolver_draw: Money,
    revolver_repayment: Money,
    revolver_ending: Money,
    total_interest: Money,
}

fn run_step(input: &PeriodSolveInput, term: &TermPosition, interest_guess: Money) -> StepOutcome {
    let income = income_lines(input, interest_guess);

    let operating_cash_flow = income.net_income + input.depreciation - input.change_in_nwc;
    let free_cash_flow = operating_cash_flow - input.capex;
    let cash_before_revolver =
        input.beginning_cash + free_cash_flow - term.repayment - income.dividends;

    let (revolver_draw, revolver_repayment) = if cash_before_revolver < input.minimum_cash {
        let shortfall = input.minimum_cash - cash_before_revolver;
        let headroom = (input.revolver_capacity - input.revolver_beginning).max(Decimal::ZERO);
        (shortfall.min(headroom), Decimal::ZERO)
    } else {
        let excess = cash_before_revolver - input.minimum_cash;
        (Decimal::ZERO, excess.min(input.revolver_beginning))
    };

    let revolver_ending = input.revolver_beginning + revolver_draw - revolver_repayment;
    let ending_cash = cash_before_revolver + revolver_draw - revolver_repayment;

    let average_revolver = (input.revolver_beginning + revolver_ending) / dec!(2);
    let revolver_interest = average_revolver * input.revolver_rate;

    StepOutcome {
        operating_cash_flow,
        free_cash_flow,
        ending_cash,
        revolver_draw,
        revolver_repayment,
        revolver_ending,
        total_interest: term.interest + revolver_interest,
    }
}

/// Run the step once more at the exit interest and report every line against
/// that figure, so the income statement ties to the interest it shows.
fn assemble(input: &PeriodSolveInput, term: &TermPosition, interest: Money) -> PeriodSolution {
    let income = income_lines(input, interest);
    let step = run_step(input, term, interest);

    PeriodSolution {
        period: input.period,
        interest_expense: interest,
        term_interest: term.interest,
        revolver_interest: interest - term.interest,
        ebt: income.ebt,
        taxes: income.taxes,
        net_income: income.net_income,
        dividends: income.dividends,
        operating_cash_flow: step.operating_cash_flow,
        free_cash_flow: step.free_cash_flow,
        beginning_cash: input.beginning_cash,
        ending_cash: step.ending_cash,
        term_beginning: input.term_beginning,
        term_repayment: term.repayment,
        term_ending: term.ending,
        revolver_beginning: input.revolver_beginning,
        revolver_draw: step.revolver_draw,
        revolver_repayment: step.revolver_repayment,
        revolver_ending: step.revolver_ending,
    }
}
