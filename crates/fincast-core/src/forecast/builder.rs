use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::drivers::{ForecastAssumptions, HistoricalBaseline, SharesAssumptions};
use crate::forecast::circularity::{
    solve_period, CircularityResult, PeriodSolution, PeriodSolveInput,
};
use crate::forecast::costs::{project_costs, CostKind};
use crate::forecast::debt::{build_debt_schedule, verify_debt_schedule, DebtPeriod};
use crate::forecast::ppe::{build_ppe_schedule, verify_ppe_schedule, PpeOpening, PpePeriod};
use crate::forecast::revenue::project_revenue;
use crate::forecast::working_capital::{
    build_working_capital_schedule, WcOpening, WorkingCapitalPeriod,
};
use crate::forecast::RollForwardCheck;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ForecastResult;

// ---------------------------------------------------------------------------
// Assembled statement views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub period: u32,
    pub revenue: Money,
    pub cogs: Money,
    pub gross_profit: Money,
    pub gross_margin: Rate,
    pub sga: Money,
    pub ebitda: Money,
    pub ebitda_margin: Rate,
    pub depreciation: Money,
    pub ebit: Money,
    pub interest_expense: Money,
    pub ebt: Money,
    pub taxes: Money,
    pub net_income: Money,
    pub net_margin: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eps: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub period: u32,
    pub cash: Money,
    pub receivables: Money,
    pub inventory: Money,
    pub other_current_assets: Money,
    pub total_current_assets: Money,
    pub net_ppe: Money,
    pub total_assets: Money,
    pub payables: Money,
    pub other_current_liabilities: Money,
    pub term_debt: Money,
    pub revolver: Money,
    pub total_debt: Money,
    pub total_liabilities: Money,
    pub retained_earnings: Money,
    pub shareholders_equity: Money,
    pub total_liabilities_and_equity: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub period: u32,
    pub net_income: Money,
    pub depreciation: Money,
    pub change_in_nwc: Money,
    pub cash_from_operations: Money,
    pub capex: Money,
    pub cash_from_investing: Money,
    pub term_repayment: Money,
    pub revolver_draw: Money,
    pub revolver_repayment: Money,
    pub dividends: Money,
    pub cash_from_financing: Money,
    pub net_change_in_cash: Money,
    pub beginning_cash: Money,
    pub ending_cash: Money,
    pub free_cash_flow: Money,
}

/// Retained-earnings roll-forward, cumulative from the forecast start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPeriod {
    pub period: u32,
    pub beginning_retained_earnings: Money,
    pub net_income: Money,
    pub dividends: Money,
    pub ending_retained_earnings: Money,
    pub shareholders_equity: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceSummary {
    pub all_converged: bool,
    /// Worst per-period final error across the horizon.
    pub worst_error: Money,
    pub non_converged_periods: Vec<u32>,
}

/// Consistency checks over the assembled output. Failures are reported
/// here, never thrown: an almost-balancing forecast beats no forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastChecks {
    pub ppe_roll_forward: RollForwardCheck,
    pub debt_roll_forward: RollForwardCheck,
    pub circularity: ConvergenceSummary,
}

/// The engine's sole contract surface: statements, component schedules,
/// per-period circularity evidence, and the check results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullForecastOutput {
    pub income_statements: Vec<IncomeStatement>,
    pub balance_sheets: Vec<BalanceSheet>,
    pub cash_flow_statements: Vec<CashFlowStatement>,
    pub working_capital_schedule: Vec<WorkingCapitalPeriod>,
    pub ppe_schedule: Vec<PpePeriod>,
    pub debt_schedule: Vec<DebtPeriod>,
    pub equity_schedule: Vec<EquityPeriod>,
    pub circularity_results: Vec<CircularityResult>,
    pub checks: ForecastChecks,
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Run one full forecast: every schedule in dependency order, a strict
/// in-order solve per period, one debt-schedule pass, then assembly.
pub fn build_forecast(
    baseline: &HistoricalBaseline,
    assumptions: &ForecastAssumptions,
) -> ForecastResult<ComputationOutput<FullForecastOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    assumptions.validate()?;

    let periods = assumptions.periods;
    let revenue = project_revenue(
        baseline.base_revenue(),
        periods,
        &assumptions.revenue,
        &mut warnings,
    )?;
    let cogs = project_costs(&revenue, &assumptions.cogs, CostKind::Cogs)?;
    let sga = project_costs(&revenue, &assumptions.sga, CostKind::Sga)?;

    let ppe_schedule = build_ppe_schedule(
        &revenue,
        PpeOpening {
            gross: baseline.opening_gross_ppe,
            accumulated_depreciation: baseline.opening_accumulated_depreciation,
        },
        &assumptions.capex,
        &assumptions.depreciation,
    )?;

    let wc_schedule = build_working_capital_schedule(
        &revenue,
        &cogs,
        &assumptions.working_capital,
        WcOpening {
            receivables: baseline.opening_receivables,
            inventory: baseline.opening_inventory,
            other_current_assets: baseline.opening_other_current_assets,
            payables: baseline.opening_payables,
            other_current_liabilities: baseline.opening_other_current_liabilities,
        },
    );

    // -----------------------------------------------------------------
    // Per-period solve, strictly in order: each period's inputs are the
    // prior period's ending balances.
    // -----------------------------------------------------------------
    let debt_seed = seed_debt_positions(baseline, assumptions, &mut warnings);

    let mut solutions: Vec<PeriodSolution> = Vec::with_capacity(periods as usize);
    let mut circularity_results: Vec<CircularityResult> = Vec::with_capacity(periods as usize);
    let mut cash = baseline.opening_cash;
    let mut term_balance = debt_seed.term_opening;
    let mut revolver_balance = debt_seed.revolver_opening;

    for idx in 0..periods as usize {
        let period = (idx + 1) as u32;
        let ppe = &ppe_schedule[idx];
        let wc = &wc_schedule[idx];
        let ebit = revenue[idx] - cogs[idx] - sga[idx] - ppe.depreciation_expense;

        let input = PeriodSolveInput {
            period,
            ebit,
            depreciation: ppe.depreciation_expense,
            change_in_nwc: wc.change_in_nwc,
            capex: ppe.capex,
            beginning_cash: cash,
            tax_rate: assumptions.tax.effective_rate,
            dividend_policy: assumptions.dividends.clone(),
            term_beginning: term_balance,
            term_rate: debt_seed.term_rate,
            scheduled_repayment: scheduled_amortization(assumptions, idx),
            revolver_beginning: revolver_balance,
            revolver_capacity: debt_seed.revolver_capacity,
            revolver_rate: debt_seed.revolver_rate,
            minimum_cash: debt_seed.minimum_cash,
        };

        let solved = solve_period(&input, &assumptions.circularity);
        if !solved.circularity.converged {
            warnings.push(format!(
                "Period {period}: circularity solver did not converge after {} iterations (residual {})",
                solved.circularity.iterations, solved.circularity.final_error
            ));
        }
        if solved.solution.free_cash_flow < Decimal::ZERO {
            warnings.push(format!(
                "Period {period}: negative free cash flow ({})",
                solved.solution.free_cash_flow
            ));
        }

        cash = solved.solution.ending_cash;
        term_balance = solved.solution.term_ending;
        revolver_balance = solved.solution.revolver_ending;

        solutions.push(solved.solution);
        circularity_results.push(solved.circularity);
    }

    // The revolver/cash signal the scheduler needs exists only now, after
    // every period's solve is complete.
    let debt_schedule = build_debt_schedule(&solutions, &assumptions.debt);

    let output = assemble_output(
        baseline,
        assumptions,
        &revenue,
        &cogs,
        &sga,
        ppe_schedule,
        wc_schedule,
        debt_schedule,
        solutions,
        circularity_results,
        &mut warnings,
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Three-Statement Forecast with Circularity Resolution",
        assumptions,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Debt seeding
// ---------------------------------------------------------------------------

struct DebtSeed {
    term_opening: Money,
    term_rate: Rate,
    revolver_opening: Money,
    revolver_capacity: Money,
    revolver_rate: Rate,
    minimum_cash: Money,
}

fn seed_debt_positions(
    baseline: &HistoricalBaseline,
    assumptions: &ForecastAssumptions,
    warnings: &mut Vec<String>,
) -> DebtSeed {
    let (term_opening, term_rate) = match &assumptions.debt.term_debt {
        Some(term) => {
            if baseline.opening_term_debt != Decimal::ZERO
                && baseline.opening_term_debt != term.opening_balance
            {
                warnings.push(format!(
                    "Baseline term debt {} differs from configured opening balance {}; using the configured value",
                    baseline.opening_term_debt, term.opening_balance
                ));
            }
            (term.opening_balance, term.rate)
        }
        None => {
            if baseline.opening_term_debt > Decimal::ZERO {
                warnings.push(format!(
                    "Baseline carries term debt {} but no term-debt terms are configured; ignoring it",
                    baseline.opening_term_debt
                ));
            }
            (Decimal::ZERO, Decimal::ZERO)
        }
    };

    let (revolver_opening, revolver_capacity, revolver_rate, minimum_cash) =
        match &assumptions.debt.revolver {
            Some(rev) => {
                let mut opening = baseline.opening_revolver;
                if opening > rev.capacity {
                    warnings.push(format!(
                        "Baseline revolver {} exceeds capacity {}; clamping to capacity",
                        opening, rev.capacity
                    ));
                    opening = rev.capacity;
                }
                (opening, rev.capacity, rev.rate, rev.minimum_cash)
            }
            None => {
                if baseline.opening_revolver > Decimal::ZERO {
                    warnings.push(format!(
                        "Baseline carries a revolver balance {} but no revolver terms are configured; ignoring it",
                        baseline.opening_revolver
                    ));
                }
                (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
            }
        };

    DebtSeed {
        term_opening,
        term_rate,
        revolver_opening,
        revolver_capacity,
        revolver_rate,
        minimum_cash,
    }
}

fn scheduled_amortization(assumptions: &ForecastAssumptions, period_idx: usize) -> Money {
    assumptions
        .debt
        .term_debt
        .as_ref()
        .and_then(|t| t.amortization.get(period_idx).copied())
        .unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn assemble_output(
    baseline: &HistoricalBaseline,
    assumptions: &ForecastAssumptions,
    revenue: &[Money],
    cogs: &[Money],
    sga: &[Money],
    ppe_schedule: Vec<PpePeriod>,
    wc_schedule: Vec<WorkingCapitalPeriod>,
    debt_schedule: Vec<DebtPeriod>,
    solutions: Vec<PeriodSolution>,
    circularity_results: Vec<CircularityResult>,
    warnings: &mut Vec<String>,
) -> FullForecastOutput {
    let n = solutions.len();
    let mut income_statements = Vec::with_capacity(n);
    let mut balance_sheets = Vec::with_capacity(n);
    let mut cash_flow_statements = Vec::with_capacity(n);
    let mut equity_schedule = Vec::with_capacity(n);

    let mut retained = Decimal::ZERO;

    for idx in 0..n {
        let sol = &solutions[idx];
        let ppe = &ppe_schedule[idx];
        let wc = &wc_schedule[idx];
        let debt = &debt_schedule[idx];
        let period = sol.period;

        let gross_profit = revenue[idx] - cogs[idx];
        let ebitda = gross_profit - sga[idx];
        let ebit = ebitda - ppe.depreciation_expense;

        income_statements.push(IncomeStatement {
            period,
            revenue: revenue[idx],
            cogs: cogs[idx],
            gross_profit,
            gross_margin: safe_divide(gross_profit, revenue[idx]),
            sga: sga[idx],
            ebitda,
            ebitda_margin: safe_divide(ebitda, revenue[idx]),
            depreciation: ppe.depreciation_expense,
            ebit,
            interest_expense: sol.interest_expense,
            ebt: sol.ebt,
            taxes: sol.taxes,
            net_income: sol.net_income,
            net_margin: safe_divide(sol.net_income, revenue[idx]),
            eps: eps(sol.net_income, assumptions.shares.as_ref()),
        });

        let beginning_retained = retained;
        retained += sol.net_income - sol.dividends;
        let shareholders_equity = baseline.opening_equity + retained;
        equity_schedule.push(EquityPeriod {
            period,
            beginning_retained_earnings: beginning_retained,
            net_income: sol.net_income,
            dividends: sol.dividends,
            ending_retained_earnings: retained,
            shareholders_equity,
        });

        // Balances come from the debt schedule, which owns the post-sweep
        // view of cash and debt.
        let total_current_assets =
            debt.ending_cash + wc.receivables + wc.inventory + wc.other_current_assets;
        let total_assets = total_current_assets + ppe.net_ppe;
        let total_liabilities = wc.payables + wc.other_current_liabilities + debt.total_debt;

        balance_sheets.push(BalanceSheet {
            period,
            cash: debt.ending_cash,
            receivables: wc.receivables,
            inventory: wc.inventory,
            other_current_assets: wc.other_current_assets,
            total_current_assets,
            net_ppe: ppe.net_ppe,
            total_assets,
            payables: wc.payables,
            other_current_liabilities: wc.other_current_liabilities,
            term_debt: debt.term_ending,
            revolver: debt.revolver_ending,
            total_debt: debt.total_debt,
            total_liabilities,
            retained_earnings: retained,
            shareholders_equity,
            total_liabilities_and_equity: total_liabilities + shareholders_equity,
        });

        let cash_from_financing = -debt.term_repayment + debt.revolver_drawdown
            - debt.revolver_repayment
            - sol.dividends;
        let net_change = sol.operating_cash_flow - ppe.capex + cash_from_financing;
        let beginning_cash = if idx == 0 {
            baseline.opening_cash
        } else {
            debt_schedule[idx - 1].ending_cash
        };

        cash_flow_statements.push(CashFlowStatement {
            period,
            net_income: sol.net_income,
            depreciation: ppe.depreciation_expense,
            change_in_nwc: wc.change_in_nwc,
            cash_from_operations: sol.operating_cash_flow,
            capex: ppe.capex,
            cash_from_investing: -ppe.capex,
            term_repayment: debt.term_repayment,
            revolver_draw: debt.revolver_drawdown,
            revolver_repayment: debt.revolver_repayment,
            dividends: sol.dividends,
            cash_from_financing,
            net_change_in_cash: net_change,
            beginning_cash,
            ending_cash: debt.ending_cash,
            free_cash_flow: sol.free_cash_flow,
        });
    }

    let ppe_check = verify_ppe_schedule(&ppe_schedule);
    if !ppe_check.passed {
        warnings.push(format!(
            "PP&E roll-forward check failed (max discrepancy {})",
            ppe_check.max_error
        ));
    }
    let debt_check = verify_debt_schedule(&debt_schedule, &assumptions.debt);
    if !debt_check.passed {
        warnings.push(format!(
            "Debt roll-forward check failed (max discrepancy {})",
            debt_check.max_error
        ));
    }

    let non_converged: Vec<u32> = circularity_results
        .iter()
        .zip(solutions.iter())
        .filter(|(c, _)| !c.converged)
        .map(|(_, s)| s.period)
        .collect();
    let worst_error = circularity_results
        .iter()
        .map(|c| c.final_error)
        .max()
        .unwrap_or(Decimal::ZERO);

    FullForecastOutput {
        income_statements,
        balance_sheets,
        cash_flow_statements,
        working_capital_schedule: wc_schedule,
        ppe_schedule,
        debt_schedule,
        equity_schedule,
        checks: ForecastChecks {
            ppe_roll_forward: ppe_check,
            debt_roll_forward: debt_check,
            circularity: ConvergenceSummary {
                all_converged: non_converged.is_empty(),
                worst_error,
                non_converged_periods: non_converged,
            },
        },
        circularity_results,
    }
}

fn safe_divide(numerator: Money, denominator: Money) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

fn eps(net_income: Money, shares: Option<&SharesAssumptions>) -> Option<Decimal> {
    shares.and_then(|s| {
        if s.basic_shares.is_zero() {
            None
        } else {
            Some(net_income / s.basic_shares)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn flat_wc() -> WorkingCapitalDrivers {
        WorkingCapitalDrivers {
            receivables: ReceivablesMethod::Dso { days: dec!(0) },
            inventory: InventoryMethod::Dio { days: dec!(0) },
            payables: PayablesMethod::Dpo { days: dec!(0) },
            other_current_assets: OtherCurrentMethod::Fixed { amount: dec!(0) },
            other_current_liabilities: OtherCurrentMethod::Fixed { amount: dec!(0) },
        }
    }

    fn baseline() -> HistoricalBaseline {
        HistoricalBaseline {
            revenue: vec![dec!(90), dec!(100)],
            cogs: vec![dec!(54), dec!(60)],
            opening_receivables: Decimal::ZERO,
            opening_inventory: Decimal::ZERO,
            opening_other_current_assets: Decimal::ZERO,
            opening_payables: Decimal::ZERO,
            opening_other_current_liabilities: Decimal::ZERO,
            opening_gross_ppe: Decimal::ZERO,
            opening_accumulated_depreciation: Decimal::ZERO,
            opening_term_debt: Decimal::ZERO,
            opening_revolver: Decimal::ZERO,
            opening_cash: dec!(20),
            opening_equity: dec!(20),
        }
    }

    /// Spec scenario A: no debt, no capex, flat revenue, net income 10/period.
    fn steady_state_assumptions() -> ForecastAssumptions {
        ForecastAssumptions {
            periods: 3,
            revenue: RevenueDrivers::GrowthRate {
                annual_rate: dec!(0.0),
                period_overrides: BTreeMap::new(),
                basis: GrowthBasis::Compound,
            },
            cogs: CostMethod::PercentOfRevenue { pct: dec!(0.60) },
            sga: CostMethod::PercentOfRevenue { pct: dec!(0.30) },
            working_capital: flat_wc(),
            capex: CapexMethod::Fixed { amount: dec!(0) },
            depreciation: DepreciationMethod::PercentOfGross { rate: dec!(0.0) },
            debt: DebtDrivers::default(),
            tax: TaxAssumptions {
                effective_rate: dec!(0.0),
            },
            dividends: DividendPolicy::None,
            shares: None,
            circularity: CircularitySettings::default(),
            metadata: None,
        }
    }

    #[test]
    fn test_steady_state_cash_accumulation() {
        let result = build_forecast(&baseline(), &steady_state_assumptions()).unwrap();
        let out = &result.result;

        for (idx, cf) in out.cash_flow_statements.iter().enumerate() {
            let t = Decimal::from(idx as u32 + 1);
            assert_eq!(cf.ending_cash, dec!(20) + dec!(10) * t);
        }
        for bs in &out.balance_sheets {
            assert_eq!(bs.revolver, Decimal::ZERO);
        }
        for c in &out.circularity_results {
            assert!(c.converged);
            assert_eq!(c.iterations, 1);
        }
    }

    #[test]
    fn test_compounding_revenue_forecast() {
        // Spec scenario B: 5% compounding from 100 over 3 periods
        let mut assumptions = steady_state_assumptions();
        assumptions.revenue = RevenueDrivers::GrowthRate {
            annual_rate: dec!(0.05),
            period_overrides: BTreeMap::new(),
            basis: GrowthBasis::Compound,
        };

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let revenues: Vec<Money> = result
            .result
            .income_statements
            .iter()
            .map(|is| is.revenue)
            .collect();
        assert_eq!(revenues, vec![dec!(105), dec!(110.25), dec!(115.7625)]);
    }

    #[test]
    fn test_statement_counts_match_periods() {
        let result = build_forecast(&baseline(), &steady_state_assumptions()).unwrap();
        let out = &result.result;
        assert_eq!(out.income_statements.len(), 3);
        assert_eq!(out.balance_sheets.len(), 3);
        assert_eq!(out.cash_flow_statements.len(), 3);
        assert_eq!(out.working_capital_schedule.len(), 3);
        assert_eq!(out.ppe_schedule.len(), 3);
        assert_eq!(out.debt_schedule.len(), 3);
        assert_eq!(out.equity_schedule.len(), 3);
        assert_eq!(out.circularity_results.len(), 3);
    }

    #[test]
    fn test_balance_sheet_balances() {
        let mut assumptions = steady_state_assumptions();
        assumptions.revenue = RevenueDrivers::GrowthRate {
            annual_rate: dec!(0.06),
            period_overrides: BTreeMap::new(),
            basis: GrowthBasis::Compound,
        };
        assumptions.working_capital = WorkingCapitalDrivers::default();
        assumptions.capex = CapexMethod::PercentOfRevenue { pct: dec!(0.05) };
        assumptions.depreciation = DepreciationMethod::StraightLine {
            useful_life_years: dec!(10),
        };
        assumptions.tax = TaxAssumptions {
            effective_rate: dec!(0.25),
        };

        // Balanced opening: cash 20 = equity 20, everything else zero
        let result = build_forecast(&baseline(), &assumptions).unwrap();
        for bs in &result.result.balance_sheets {
            let gap = (bs.total_assets - bs.total_liabilities_and_equity).abs();
            assert!(
                gap < dec!(0.01),
                "Period {}: assets {} vs L+E {}",
                bs.period,
                bs.total_assets,
                bs.total_liabilities_and_equity
            );
        }
    }

    #[test]
    fn test_cash_flow_ties_to_balance_sheet() {
        let mut assumptions = steady_state_assumptions();
        assumptions.working_capital = WorkingCapitalDrivers::default();
        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let out = &result.result;

        for (cf, bs) in out.cash_flow_statements.iter().zip(out.balance_sheets.iter()) {
            assert_eq!(cf.ending_cash, bs.cash);
            let expected =
                cf.cash_from_operations + cf.cash_from_investing + cf.cash_from_financing;
            assert_eq!(cf.net_change_in_cash, expected);
            assert_eq!(cf.ending_cash, cf.beginning_cash + cf.net_change_in_cash);
        }
    }

    #[test]
    fn test_revolver_draw_and_interest_flow_through() {
        let mut assumptions = steady_state_assumptions();
        // Heavy fixed capex forces a shortfall against the cash minimum
        assumptions.capex = CapexMethod::Fixed { amount: dec!(50) };
        assumptions.debt.revolver = Some(RevolverTerms {
            capacity: dec!(500),
            rate: dec!(0.06),
            minimum_cash: dec!(15),
            commitment_fee: None,
        });

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let out = &result.result;

        assert!(out.debt_schedule[0].revolver_drawdown > Decimal::ZERO);
        assert!(out.income_statements[0].interest_expense > Decimal::ZERO);
        for p in &out.debt_schedule {
            assert!(p.revolver_ending >= Decimal::ZERO);
            assert!(p.revolver_ending <= dec!(500));
        }
        assert!(out.checks.circularity.all_converged);
    }

    #[test]
    fn test_term_debt_amortizes_and_accrues_interest() {
        let mut assumptions = steady_state_assumptions();
        assumptions.debt.term_debt = Some(TermDebtTerms {
            opening_balance: dec!(100),
            rate: dec!(0.08),
            maturity_periods: 3,
            amortization: vec![dec!(20), dec!(20), dec!(20)],
        });

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let out = &result.result;

        assert_eq!(out.debt_schedule[0].term_ending, dec!(80));
        assert_eq!(out.debt_schedule[2].term_ending, dec!(40));
        // Period 1 average balance (100+80)/2 = 90 at 8%
        assert_eq!(out.income_statements[0].interest_expense, dec!(7.20));
    }

    #[test]
    fn test_checks_reported_not_thrown_on_non_convergence() {
        let mut assumptions = steady_state_assumptions();
        assumptions.capex = CapexMethod::Fixed { amount: dec!(50) };
        assumptions.debt.revolver = Some(RevolverTerms {
            capacity: dec!(500),
            rate: dec!(0.06),
            minimum_cash: dec!(15),
            commitment_fee: None,
        });
        assumptions.circularity.max_iterations = 1;

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let out = &result.result;

        assert!(!out.checks.circularity.all_converged);
        assert!(!out.checks.circularity.non_converged_periods.is_empty());
        assert!(out.checks.circularity.worst_error > Decimal::ZERO);
        // Output is still fully assembled
        assert_eq!(out.income_statements.len(), 3);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("did not converge")));
    }

    #[test]
    fn test_roll_forward_checks_pass() {
        let mut assumptions = steady_state_assumptions();
        assumptions.working_capital = WorkingCapitalDrivers::default();
        assumptions.capex = CapexMethod::PercentOfRevenue { pct: dec!(0.08) };
        assumptions.depreciation = DepreciationMethod::DecliningBalance { rate: dec!(0.15) };
        assumptions.debt.term_debt = Some(TermDebtTerms {
            opening_balance: dec!(50),
            rate: dec!(0.07),
            maturity_periods: 3,
            amortization: vec![dec!(10), dec!(10), dec!(10)],
        });

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let checks = &result.result.checks;
        assert!(checks.ppe_roll_forward.passed);
        assert!(checks.debt_roll_forward.passed);
    }

    #[test]
    fn test_equity_rolls_retained_earnings() {
        let mut assumptions = steady_state_assumptions();
        assumptions.dividends = DividendPolicy::PayoutRatio { ratio: dec!(0.50) };

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let eq = &result.result.equity_schedule;

        // NI 10/period, half paid out
        assert_eq!(eq[0].beginning_retained_earnings, Decimal::ZERO);
        assert_eq!(eq[0].ending_retained_earnings, dec!(5.00));
        assert_eq!(eq[2].ending_retained_earnings, dec!(15.00));
        assert_eq!(eq[2].shareholders_equity, dec!(35.00));
    }

    #[test]
    fn test_eps_when_shares_supplied() {
        let mut assumptions = steady_state_assumptions();
        assumptions.shares = Some(SharesAssumptions {
            basic_shares: dec!(5),
        });

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        assert_eq!(result.result.income_statements[0].eps, Some(dec!(2)));
    }

    #[test]
    fn test_invalid_assumptions_abort() {
        let mut assumptions = steady_state_assumptions();
        assumptions.tax.effective_rate = dec!(2.0);
        assert!(build_forecast(&baseline(), &assumptions).is_err());
    }

    #[test]
    fn test_non_positive_base_revenue_warns_not_errors() {
        let mut base = baseline();
        base.revenue = vec![dec!(0)];
        let result = build_forecast(&base, &steady_state_assumptions()).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("not positive")));
        assert_eq!(result.result.income_statements.len(), 3);
    }

    #[test]
    fn test_baseline_debt_without_terms_warns() {
        let mut base = baseline();
        base.opening_term_debt = dec!(75);
        let result = build_forecast(&base, &steady_state_assumptions()).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("ignoring it")));
        assert_eq!(result.result.debt_schedule[0].term_beginning, Decimal::ZERO);
    }

    #[test]
    fn test_deterministic_output() {
        let mut assumptions = steady_state_assumptions();
        assumptions.working_capital = WorkingCapitalDrivers::default();
        assumptions.debt.revolver = Some(RevolverTerms {
            capacity: dec!(300),
            rate: dec!(0.05),
            minimum_cash: dec!(25),
            commitment_fee: None,
        });

        let first = build_forecast(&baseline(), &assumptions).unwrap();
        let second = build_forecast(&baseline(), &assumptions).unwrap();

        for (a, b) in first
            .result
            .circularity_results
            .iter()
            .zip(second.result.circularity_results.iter())
        {
            assert_eq!(a.iterations, b.iterations);
            assert_eq!(a.final_error, b.final_error);
        }
        for (a, b) in first
            .result
            .income_statements
            .iter()
            .zip(second.result.income_statements.iter())
        {
            assert_eq!(a.net_income, b.net_income);
        }
    }

    #[test]
    fn test_cash_sweep_pays_down_term_debt() {
        let mut assumptions = steady_state_assumptions();
        assumptions.debt.term_debt = Some(TermDebtTerms {
            opening_balance: dec!(100),
            rate: dec!(0.0),
            maturity_periods: 3,
            amortization: vec![],
        });
        assumptions.debt.cash_sweep = Some(CashSweepPolicy {
            enabled: true,
            cash_threshold: dec!(25),
            sweep_pct: dec!(1.0),
            priority: SweepPriority::TermFirst,
        });

        let result = build_forecast(&baseline(), &assumptions).unwrap();
        let out = &result.result;

        // Period 1: cash 30 pre-sweep, 5 above threshold, all swept to term
        assert_eq!(out.debt_schedule[0].sweep_paydown, dec!(5));
        assert_eq!(out.debt_schedule[0].term_ending, dec!(95));
        assert_eq!(out.balance_sheets[0].cash, dec!(25));
        assert!(out.checks.debt_roll_forward.passed);
    }
}
