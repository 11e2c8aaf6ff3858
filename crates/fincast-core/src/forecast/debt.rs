use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::drivers::{CashSweepPolicy, DebtDrivers, SweepPriority};
use crate::forecast::circularity::PeriodSolution;
use crate::forecast::RollForwardCheck;
use crate::types::Money;

/// One forecast period of the combined debt roll-forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPeriod {
    pub period: u32,
    pub term_beginning: Money,
    /// No new term issuance in current scope.
    pub term_drawdown: Money,
    /// Scheduled amortization plus any sweep paydown.
    pub term_repayment: Money,
    pub term_ending: Money,
    pub term_interest: Money,
    pub revolver_beginning: Money,
    pub revolver_drawdown: Money,
    /// Cash-signal paydown plus any sweep paydown.
    pub revolver_repayment: Money,
    pub revolver_ending: Money,
    pub revolver_interest: Money,
    /// Fee on undrawn revolver capacity, zero unless configured.
    pub commitment_fee: Money,
    /// Portion of the repayments above that came from the cash sweep.
    pub sweep_paydown: Money,
    pub ending_cash: Money,
    pub total_debt: Money,
    pub total_interest: Money,
}

/// Roll term debt and the revolver across the whole horizon, using the
/// solver's per-period outputs as the cash signal and applying the optional
/// excess-cash sweep. Sweep paydowns shift balances after the solve; the
/// solver's income-statement interest is not re-opened here.
pub fn build_debt_schedule(solutions: &[PeriodSolution], drivers: &DebtDrivers) -> Vec<DebtPeriod> {
    let mut schedule = Vec::with_capacity(solutions.len());

    let mut term_balance = solutions
        .first()
        .map(|s| s.term_beginning)
        .unwrap_or(Decimal::ZERO);
    let mut revolver_balance = solutions
        .first()
        .map(|s| s.revolver_beginning)
        .unwrap_or(Decimal::ZERO);
    let mut cash = solutions
        .first()
        .map(|s| s.beginning_cash)
        .unwrap_or(Decimal::ZERO);

    let (capacity, revolver_rate, minimum_cash, fee_rate) = match &drivers.revolver {
        Some(r) => (
            r.capacity,
            r.rate,
            r.minimum_cash,
            r.commitment_fee.unwrap_or(Decimal::ZERO),
        ),
        None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
    };
    let term_rate = drivers
        .term_debt
        .as_ref()
        .map(|t| t.rate)
        .unwrap_or(Decimal::ZERO);

    for (idx, sol) in solutions.iter().enumerate() {
        let term_beginning = term_balance;
        let revolver_beginning = revolver_balance;

        let scheduled = scheduled_amortization(drivers, idx).min(term_beginning);

        // Cash signal from the solver: free cash flow and dividends are
        // taken as solved; only the balances differ once sweeps accumulate.
        let cash_before_revolver = cash + sol.free_cash_flow - scheduled - sol.dividends;

        let (revolver_drawdown, cash_repayment) = if cash_before_revolver < minimum_cash {
            let shortfall = minimum_cash - cash_before_revolver;
            let headroom = (capacity - revolver_beginning).max(Decimal::ZERO);
            (shortfall.min(headroom), Decimal::ZERO)
        } else {
            let excess = cash_before_revolver - minimum_cash;
            (Decimal::ZERO, excess.min(revolver_beginning))
        };

        let mut term_ending = term_beginning - scheduled;
        let mut revolver_ending = revolver_beginning + revolver_drawdown - cash_repayment;
        let mut ending_cash = cash_before_revolver + revolver_drawdown - cash_repayment;

        let (term_sweep, revolver_sweep) = apply_sweep(
            drivers.cash_sweep.as_ref(),
            ending_cash,
            term_ending,
            revolver_ending,
        );
        term_ending -= term_sweep;
        revolver_ending -= revolver_sweep;
        ending_cash -= term_sweep + revolver_sweep;

        let term_interest = (term_beginning + term_ending) / dec!(2) * term_rate;
        let revolver_interest = (revolver_beginning + revolver_ending) / dec!(2) * revolver_rate;
        let average_drawn = (revolver_beginning + revolver_ending) / dec!(2);
        let commitment_fee = (capacity - average_drawn).max(Decimal::ZERO) * fee_rate;

        schedule.push(DebtPeriod {
            period: sol.period,
            term_beginning,
            term_drawdown: Decimal::ZERO,
            term_repayment: scheduled + term_sweep,
            term_ending,
            term_interest,
            revolver_beginning,
            revolver_drawdown,
            revolver_repayment: cash_repayment + revolver_sweep,
            revolver_ending,
            revolver_interest,
            commitment_fee,
            sweep_paydown: term_sweep + revolver_sweep,
            ending_cash,
            total_debt: term_ending + revolver_ending,
            total_interest: term_interest + revolver_interest,
        });

        term_balance = term_ending;
        revolver_balance = revolver_ending;
        cash = ending_cash;
    }

    schedule
}

fn scheduled_amortization(drivers: &DebtDrivers, period_idx: usize) -> Money {
    drivers
        .term_debt
        .as_ref()
        .and_then(|t| t.amortization.get(period_idx).copied())
        .unwrap_or(Decimal::ZERO)
}

/// Returns (term paydown, revolver paydown) from sweeping excess cash.
fn apply_sweep(
    policy: Option<&CashSweepPolicy>,
    ending_cash: Money,
    term_balance: Money,
    revolver_balance: Money,
) -> (Money, Money) {
    let Some(policy) = policy else {
        return (Decimal::ZERO, Decimal::ZERO);
    };
    if !policy.enabled || ending_cash <= policy.cash_threshold {
        return (Decimal::ZERO, Decimal::ZERO);
    }

    let sweepable = (ending_cash - policy.cash_threshold) * policy.sweep_pct;
    match policy.priority {
        SweepPriority::RevolverFirst => {
            let revolver_paydown = sweepable.min(revolver_balance);
            let term_paydown = (sweepable - revolver_paydown).min(term_balance);
            (term_paydown, revolver_paydown)
        }
        SweepPriority::TermFirst => {
            let term_paydown = sweepable.min(term_balance);
            let revolver_paydown = (sweepable - term_paydown).min(revolver_balance);
            (term_paydown, revolver_paydown)
        }
    }
}

/// Recompute the debt roll-forward identities and the revolver bounds,
/// reporting the worst discrepancy across all periods.
pub fn verify_debt_schedule(schedule: &[DebtPeriod], drivers: &DebtDrivers) -> RollForwardCheck {
    let capacity = drivers
        .revolver
        .as_ref()
        .map(|r| r.capacity)
        .unwrap_or(Decimal::ZERO);

    let mut max_error = Decimal::ZERO;
    for p in schedule {
        let term_error = (p.term_ending
            - (p.term_beginning + p.term_drawdown - p.term_repayment))
            .abs();
        let revolver_error = (p.revolver_ending
            - (p.revolver_beginning + p.revolver_drawdown - p.revolver_repayment))
            .abs();
        let total_error = (p.total_debt - (p.term_ending + p.revolver_ending)).abs();
        max_error = max_error.max(term_error).max(revolver_error).max(total_error);

        if p.revolver_ending < Decimal::ZERO {
            max_error = max_error.max(p.revolver_ending.abs());
        }
        if p.revolver_ending > capacity {
            max_error = max_error.max(p.revolver_ending - capacity);
        }
    }
    RollForwardCheck::from_max_error(max_error)
}
