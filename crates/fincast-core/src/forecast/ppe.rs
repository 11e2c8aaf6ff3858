use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::drivers::{CapexMethod, DepreciationMethod};
use crate::forecast::RollForwardCheck;
use crate::types::Money;
use crate::ForecastResult;

/// Opening fixed-asset balances carried in from the historical baseline.
/// Both default to zero when the baseline supplies nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PpeOpening {
    pub gross: Money,
    pub accumulated_depreciation: Money,
}

/// One forecast period of the PP&E roll-forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpePeriod {
    pub period: u32,
    pub beginning_gross: Money,
    pub capex: Money,
    /// Always zero in current scope; the column exists so a disposal driver
    /// extension changes the scheduler, not the data model.
    pub disposals: Money,
    pub ending_gross: Money,
    pub beginning_accumulated_depreciation: Money,
    pub depreciation_expense: Money,
    pub depreciation_on_disposals: Money,
    pub ending_accumulated_depreciation: Money,
    pub net_ppe: Money,
}

/// Roll gross PP&E and accumulated depreciation across the forecast horizon.
///
/// `base_revenue` is the most recent historical revenue, used only to size
/// growth-linked capex after the first period.
pub fn build_ppe_schedule(
    revenue: &[Money],
    opening: PpeOpening,
    capex_method: &CapexMethod,
    depreciation_method: &DepreciationMethod,
) -> ForecastResult<Vec<PpePeriod>> {
    let mut schedule = Vec::with_capacity(revenue.len());
    let mut gross = opening.gross;
    let mut accumulated = opening.accumulated_depreciation;
    let mut prior_revenue: Option<Money> = None;

    for (idx, period_revenue) in revenue.iter().enumerate() {
        let period = (idx + 1) as u32;
        let beginning_gross = gross;
        let beginning_accumulated = accumulated;
        let beginning_net = beginning_gross - beginning_accumulated;

        let capex = period_capex(capex_method, *period_revenue, prior_revenue);
        let disposals = Decimal::ZERO;
        let depreciation_on_disposals = Decimal::ZERO;

        let depreciation_expense = match depreciation_method {
            DepreciationMethod::StraightLine { useful_life_years } => {
                beginning_gross / useful_life_years
            }
            DepreciationMethod::DecliningBalance { rate } => beginning_net * rate,
            DepreciationMethod::PercentOfGross { rate } => beginning_gross * rate,
        };
        // Never depreciate below a zero net book value.
        let depreciation_expense = depreciation_expense.min(beginning_net.max(Decimal::ZERO));

        let ending_gross = beginning_gross + capex - disposals;
        let ending_accumulated =
            beginning_accumulated + depreciation_expense - depreciation_on_disposals;

        schedule.push(PpePeriod {
            period,
            beginning_gross,
            capex,
            disposals,
            ending_gross,
            beginning_accumulated_depreciation: beginning_accumulated,
            depreciation_expense,
            depreciation_on_disposals,
            ending_accumulated_depreciation: ending_accumulated,
            net_ppe: ending_gross - ending_accumulated,
        });

        gross = ending_gross;
        accumulated = ending_accumulated;
        prior_revenue = Some(*period_revenue);
    }

    Ok(schedule)
}

fn period_capex(method: &CapexMethod, revenue: Money, prior_revenue: Option<Money>) -> Money {
    match method {
        CapexMethod::PercentOfRevenue { pct } => revenue * pct,
        CapexMethod::Fixed { amount } => *amount,
        CapexMethod::GrowthLinked { base, multiplier } => match prior_revenue {
            // First forecast period: no prior forecast revenue yet.
            None => *base,
            Some(prior) if prior.is_zero() => *base,
            Some(prior) => {
                let growth = revenue / prior - Decimal::ONE;
                base * (Decimal::ONE + growth * multiplier)
            }
        },
    }
}

/// Recompute every roll-forward identity and report the worst discrepancy.
pub fn verify_ppe_schedule(schedule: &[PpePeriod]) -> RollForwardCheck {
    let mut max_error = Decimal::ZERO;
    for p in schedule {
        let gross_error =
            (p.ending_gross - (p.beginning_gross + p.capex - p.disposals)).abs();
        let accum_error = (p.ending_accumulated_depreciation
            - (p.beginning_accumulated_depreciation + p.depreciation_expense
                - p.depreciation_on_disposals))
            .abs();
        let net_error =
            (p.net_ppe - (p.ending_gross - p.ending_accumulated_depreciation)).abs();
        max_error = max_error.max(gross_error).max(accum_error).max(net_error);
    }
    RollForwardCheck::from_max_error(max_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn opening() -> PpeOpening {
        PpeOpening {
            gross: dec!(1000),
            accumulated_depreciation: dec!(400),
        }
    }

    #[test]
    fn test_straight_line_depreciation() {
        let revenue = vec![dec!(500), dec!(500)];
        let schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::Fixed { amount: dec!(0) },
            &DepreciationMethod::StraightLine {
                useful_life_years: dec!(10),
            },
        )
        .unwrap();

        // Gross stays 1000; depreciation = 1000/10 each period
        assert_eq!(schedule[0].depreciation_expense, dec!(100));
        assert_eq!(schedule[0].net_ppe, dec!(500));
        assert_eq!(schedule[1].beginning_accumulated_depreciation, dec!(500));
        assert_eq!(schedule[1].net_ppe, dec!(400));
    }

    #[test]
    fn test_declining_balance_uses_net_book_value() {
        let revenue = vec![dec!(500)];
        let schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::Fixed { amount: dec!(0) },
            &DepreciationMethod::DecliningBalance { rate: dec!(0.20) },
        )
        .unwrap();

        // Net book value 600 * 20% = 120
        assert_eq!(schedule[0].depreciation_expense, dec!(120.00));
    }

    #[test]
    fn test_percent_of_gross() {
        let revenue = vec![dec!(500)];
        let schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::Fixed { amount: dec!(0) },
            &DepreciationMethod::PercentOfGross { rate: dec!(0.10) },
        )
        .unwrap();

        assert_eq!(schedule[0].depreciation_expense, dec!(100.00));
    }

    #[test]
    fn test_capex_percent_of_revenue() {
        let revenue = vec![dec!(500), dec!(600)];
        let schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::PercentOfRevenue { pct: dec!(0.10) },
            &DepreciationMethod::PercentOfGross { rate: dec!(0.0) },
        )
        .unwrap();

        assert_eq!(schedule[0].capex, dec!(50.0));
        assert_eq!(schedule[0].ending_gross, dec!(1050.0));
        assert_eq!(schedule[1].capex, dec!(60.0));
        assert_eq!(schedule[1].ending_gross, dec!(1110.0));
    }

    #[test]
    fn test_growth_linked_first_period_uses_base() {
        let revenue = vec![dec!(500), dec!(550)];
        let schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::GrowthLinked {
                base: dec!(40),
                multiplier: dec!(2),
            },
            &DepreciationMethod::PercentOfGross { rate: dec!(0.0) },
        )
        .unwrap();

        // Period 1: base amount directly
        assert_eq!(schedule[0].capex, dec!(40));
        // Period 2: growth 10%, scaled by multiplier 2 -> 40 * 1.2 = 48
        assert_eq!(schedule[1].capex, dec!(48.0));
    }

    #[test]
    fn test_depreciation_capped_at_net_book_value() {
        let revenue = vec![dec!(500)];
        let schedule = build_ppe_schedule(
            &revenue,
            PpeOpening {
                gross: dec!(1000),
                accumulated_depreciation: dec!(950),
            },
            &CapexMethod::Fixed { amount: dec!(0) },
            &DepreciationMethod::PercentOfGross { rate: dec!(0.10) },
        )
        .unwrap();

        // 10% of gross would be 100, but only 50 of net book value remains
        assert_eq!(schedule[0].depreciation_expense, dec!(50));
        assert_eq!(schedule[0].net_ppe, dec!(0));
    }

    #[test]
    fn test_disposals_always_zero() {
        let revenue = vec![dec!(500), dec!(500), dec!(500)];
        let schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::PercentOfRevenue { pct: dec!(0.05) },
            &DepreciationMethod::PercentOfGross { rate: dec!(0.08) },
        )
        .unwrap();

        for p in &schedule {
            assert_eq!(p.disposals, Decimal::ZERO);
            assert_eq!(p.depreciation_on_disposals, Decimal::ZERO);
        }
    }

    #[test]
    fn test_verification_passes_for_built_schedule() {
        let revenue = vec![dec!(500), dec!(525), dec!(551.25)];
        let schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::PercentOfRevenue { pct: dec!(0.08) },
            &DepreciationMethod::DecliningBalance { rate: dec!(0.15) },
        )
        .unwrap();

        let check = verify_ppe_schedule(&schedule);
        assert!(check.passed);
        assert_eq!(check.max_error, Decimal::ZERO);
    }

    #[test]
    fn test_verification_detects_broken_identity() {
        let revenue = vec![dec!(500)];
        let mut schedule = build_ppe_schedule(
            &revenue,
            opening(),
            &CapexMethod::Fixed { amount: dec!(10) },
            &DepreciationMethod::PercentOfGross { rate: dec!(0.10) },
        )
        .unwrap();

        schedule[0].ending_gross += dec!(5);
        let check = verify_ppe_schedule(&schedule);
        assert!(!check.passed);
        assert!(check.max_error >= dec!(5));
    }

    #[test]
    fn test_zero_opening_balances() {
        let revenue = vec![dec!(500)];
        let schedule = build_ppe_schedule(
            &revenue,
            PpeOpening::default(),
            &CapexMethod::PercentOfRevenue { pct: dec!(0.10) },
            &DepreciationMethod::StraightLine {
                useful_life_years: dec!(5),
            },
        )
        .unwrap();

        // Nothing to depreciate in period 1; capex builds the gross balance
        assert_eq!(schedule[0].depreciation_expense, Decimal::ZERO);
        assert_eq!(schedule[0].ending_gross, dec!(50.0));
    }
}
