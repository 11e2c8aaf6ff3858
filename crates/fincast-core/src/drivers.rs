use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::types::{Money, Rate};
use crate::ForecastResult;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Industry-default turnover days, used when a working-capital method is not
/// configured. Business defaults, not engine requirements.
pub const DEFAULT_DSO_DAYS: Decimal = dec!(45);
pub const DEFAULT_DIO_DAYS: Decimal = dec!(60);
pub const DEFAULT_DPO_DAYS: Decimal = dec!(30);

/// Iteration cap for the circularity solver.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Convergence tolerance: absolute interest delta between iterations.
pub const DEFAULT_TOLERANCE: Decimal = dec!(0.01);

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_tolerance() -> Decimal {
    DEFAULT_TOLERANCE
}

// ---------------------------------------------------------------------------
// Revenue drivers
// ---------------------------------------------------------------------------

/// How the revenue series is projected forward from its historical base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RevenueDrivers {
    /// Single annual growth rate, optionally overridden per period.
    GrowthRate {
        annual_rate: Rate,
        /// Period index (1-based) -> rate; takes precedence over annual_rate.
        #[serde(default)]
        period_overrides: BTreeMap<u32, Rate>,
        #[serde(default)]
        basis: GrowthBasis,
    },
    /// Price and volume grown independently, then multiplied.
    PriceVolume {
        base_price: Money,
        base_volume: Decimal,
        /// Per-period growth rates; the last entry persists past the end.
        price_growth: Vec<Rate>,
        volume_growth: Vec<Rate>,
    },
    /// Named segments, each compounding from its own base; summed.
    Segments { segments: Vec<RevenueSegment> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthBasis {
    /// Multiply the running revenue by (1 + rate) each period.
    #[default]
    Compound,
    /// Scale the original base by (1 + rate * periods elapsed).
    Simple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueSegment {
    pub name: String,
    pub base_revenue: Money,
    pub growth_rate: Rate,
}

// ---------------------------------------------------------------------------
// Cost drivers (COGS and SG&A share the same method shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CostMethod {
    PercentOfRevenue { pct: Rate },
    /// Fixed amount plus a variable component. The variable component comes
    /// from unit_volumes * unit_variable_cost when a volume series is
    /// supplied; for COGS without volumes it falls back to 50% of revenue.
    FixedPlusVariable {
        fixed: Money,
        #[serde(default)]
        unit_variable_cost: Option<Money>,
        #[serde(default)]
        unit_volumes: Option<Vec<Decimal>>,
    },
    /// Explicit sub-lines, one amount per forecast period, summed.
    Detailed { lines: Vec<CostLine> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLine {
    pub name: String,
    pub amounts: Vec<Money>,
}

// ---------------------------------------------------------------------------
// Working capital drivers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingCapitalDrivers {
    pub receivables: ReceivablesMethod,
    pub inventory: InventoryMethod,
    pub payables: PayablesMethod,
    pub other_current_assets: OtherCurrentMethod,
    pub other_current_liabilities: OtherCurrentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ReceivablesMethod {
    Dso { days: Decimal },
    PercentOfRevenue { pct: Rate },
}

impl Default for ReceivablesMethod {
    fn default() -> Self {
        ReceivablesMethod::Dso {
            days: DEFAULT_DSO_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum InventoryMethod {
    Dio { days: Decimal },
    PercentOfCogs { pct: Rate },
}

impl Default for InventoryMethod {
    fn default() -> Self {
        InventoryMethod::Dio {
            days: DEFAULT_DIO_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PayablesMethod {
    Dpo { days: Decimal },
    PercentOfCogs { pct: Rate },
}

impl Default for PayablesMethod {
    fn default() -> Self {
        PayablesMethod::Dpo {
            days: DEFAULT_DPO_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OtherCurrentMethod {
    PercentOfRevenue { pct: Rate },
    Fixed { amount: Money },
}

impl Default for OtherCurrentMethod {
    fn default() -> Self {
        OtherCurrentMethod::Fixed {
            amount: Decimal::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Capex and depreciation drivers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CapexMethod {
    PercentOfRevenue { pct: Rate },
    Fixed { amount: Money },
    /// Base amount scaled by (1 + revenue growth * multiplier). The first
    /// forecast period has no prior forecast revenue and uses the base
    /// amount directly.
    GrowthLinked { base: Money, multiplier: Decimal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DepreciationMethod {
    /// Beginning gross balance / useful life.
    StraightLine { useful_life_years: Decimal },
    /// Rate applied to beginning net book value.
    DecliningBalance { rate: Rate },
    /// Rate applied to beginning gross balance.
    PercentOfGross { rate: Rate },
}

// ---------------------------------------------------------------------------
// Debt drivers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtDrivers {
    pub term_debt: Option<TermDebtTerms>,
    pub revolver: Option<RevolverTerms>,
    pub cash_sweep: Option<CashSweepPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermDebtTerms {
    pub opening_balance: Money,
    pub rate: Rate,
    pub maturity_periods: u32,
    /// Explicit scheduled amortization, one amount per forecast period.
    /// Periods past the end of the schedule amortize nothing.
    #[serde(default)]
    pub amortization: Vec<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevolverTerms {
    pub capacity: Money,
    pub rate: Rate,
    /// Ending cash below this threshold triggers a draw.
    pub minimum_cash: Money,
    /// Optional fee rate accrued on undrawn capacity.
    #[serde(default)]
    pub commitment_fee: Option<Rate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashSweepPolicy {
    pub enabled: bool,
    /// Ending cash above this threshold is swept.
    pub cash_threshold: Money,
    /// Fraction of the excess applied to debt paydown.
    pub sweep_pct: Rate,
    #[serde(default)]
    pub priority: SweepPriority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPriority {
    #[default]
    RevolverFirst,
    TermFirst,
}

// ---------------------------------------------------------------------------
// Tax, dividend, shares, circularity policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxAssumptions {
    /// Single effective rate; taxes are floored at zero (no benefit on losses).
    pub effective_rate: Rate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DividendPolicy {
    #[default]
    None,
    /// Fraction of positive net income paid out.
    PayoutRatio { ratio: Rate },
    /// Fixed amount per period, paid regardless of earnings.
    FixedAmount { amount: Money },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharesAssumptions {
    pub basic_shares: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircularityMethod {
    /// Iterate the interest <-> cash <-> revolver fixed point to tolerance.
    #[default]
    Iterative,
    /// Single pass assuming a zero average revolver balance, with one
    /// interest refinement. Always reports converged; a documented
    /// approximation, not a convergence guarantee.
    ClosedForm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircularitySettings {
    pub method: CircularityMethod,
    pub max_iterations: u32,
    pub tolerance: Decimal,
}

impl Default for CircularitySettings {
    fn default() -> Self {
        CircularitySettings {
            method: CircularityMethod::default(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

// ---------------------------------------------------------------------------
// Assumptions and baseline
// ---------------------------------------------------------------------------

/// Free-form metadata attached to an assumption set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumptionsMetadata {
    pub version: String,
    pub created: Option<DateTime<Utc>>,
    pub notes: String,
}

/// Historical closing state that seeds the forecast. Supplied by the data
/// curation layer; this engine does not source or validate its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalBaseline {
    /// Chronological revenue series; the last entry is the forecast base.
    pub revenue: Vec<Money>,
    /// Chronological COGS series aligned with `revenue`.
    pub cogs: Vec<Money>,
    #[serde(default)]
    pub opening_receivables: Money,
    #[serde(default)]
    pub opening_inventory: Money,
    #[serde(default)]
    pub opening_other_current_assets: Money,
    #[serde(default)]
    pub opening_payables: Money,
    #[serde(default)]
    pub opening_other_current_liabilities: Money,
    #[serde(default)]
    pub opening_gross_ppe: Money,
    #[serde(default)]
    pub opening_accumulated_depreciation: Money,
    #[serde(default)]
    pub opening_term_debt: Money,
    #[serde(default)]
    pub opening_revolver: Money,
    #[serde(default)]
    pub opening_cash: Money,
    #[serde(default)]
    pub opening_equity: Money,
}

impl HistoricalBaseline {
    /// Most recent historical revenue, or zero when the series is empty.
    pub fn base_revenue(&self) -> Money {
        self.revenue.last().copied().unwrap_or(Decimal::ZERO)
    }

    pub fn base_cogs(&self) -> Money {
        self.cogs.last().copied().unwrap_or(Decimal::ZERO)
    }
}

/// The full declarative driver tree for one forecast run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastAssumptions {
    /// Number of forecast periods (1-based period indices 1..=periods).
    pub periods: u32,
    pub revenue: RevenueDrivers,
    pub cogs: CostMethod,
    pub sga: CostMethod,
    #[serde(default)]
    pub working_capital: WorkingCapitalDrivers,
    pub capex: CapexMethod,
    pub depreciation: DepreciationMethod,
    #[serde(default)]
    pub debt: DebtDrivers,
    pub tax: TaxAssumptions,
    #[serde(default)]
    pub dividends: DividendPolicy,
    #[serde(default)]
    pub shares: Option<SharesAssumptions>,
    #[serde(default)]
    pub circularity: CircularitySettings,
    #[serde(default)]
    pub metadata: Option<AssumptionsMetadata>,
}

impl ForecastAssumptions {
    /// Reject malformed configurations before any schedule runs. Parameter
    /// errors abort the run; numerical conditions never reach this path.
    pub fn validate(&self) -> ForecastResult<()> {
        if self.periods == 0 {
            return Err(ForecastError::InvalidInput {
                field: "periods".into(),
                reason: "Must forecast at least one period".into(),
            });
        }

        validate_rate("tax.effective_rate", self.tax.effective_rate)?;

        if let DividendPolicy::PayoutRatio { ratio } = self.dividends {
            validate_rate("dividends.ratio", ratio)?;
        }
        if let DividendPolicy::FixedAmount { amount } = self.dividends {
            validate_non_negative("dividends.amount", amount)?;
        }

        self.validate_working_capital()?;
        self.validate_ppe()?;
        self.validate_debt()?;

        if self.circularity.max_iterations == 0 {
            return Err(ForecastError::InvalidInput {
                field: "circularity.max_iterations".into(),
                reason: "Iteration cap must be at least 1".into(),
            });
        }
        if self.circularity.tolerance <= Decimal::ZERO {
            return Err(ForecastError::InvalidInput {
                field: "circularity.tolerance".into(),
                reason: "Tolerance must be positive".into(),
            });
        }

        Ok(())
    }

    fn validate_working_capital(&self) -> ForecastResult<()> {
        let wc = &self.working_capital;
        match &wc.receivables {
            ReceivablesMethod::Dso { days } => validate_non_negative("receivables.days", *days)?,
            ReceivablesMethod::PercentOfRevenue { pct } => validate_rate("receivables.pct", *pct)?,
        }
        match &wc.inventory {
            InventoryMethod::Dio { days } => validate_non_negative("inventory.days", *days)?,
            InventoryMethod::PercentOfCogs { pct } => validate_rate("inventory.pct", *pct)?,
        }
        match &wc.payables {
            PayablesMethod::Dpo { days } => validate_non_negative("payables.days", *days)?,
            PayablesMethod::PercentOfCogs { pct } => validate_rate("payables.pct", *pct)?,
        }
        for (field, method) in [
            ("other_current_assets", &wc.other_current_assets),
            ("other_current_liabilities", &wc.other_current_liabilities),
        ] {
            match method {
                OtherCurrentMethod::PercentOfRevenue { pct } => validate_rate(field, *pct)?,
                OtherCurrentMethod::Fixed { amount } => validate_non_negative(field, *amount)?,
            }
        }
        Ok(())
    }

    fn validate_ppe(&self) -> ForecastResult<()> {
        match &self.capex {
            CapexMethod::PercentOfRevenue { pct } => validate_rate("capex.pct", *pct)?,
            CapexMethod::Fixed { amount } => validate_non_negative("capex.amount", *amount)?,
            CapexMethod::GrowthLinked { base, .. } => validate_non_negative("capex.base", *base)?,
        }
        match &self.depreciation {
            DepreciationMethod::StraightLine { useful_life_years } => {
                if *useful_life_years <= Decimal::ZERO {
                    return Err(ForecastError::MissingDriverParameter {
                        driver: "depreciation.straight_line".into(),
                        parameter: "a positive useful_life_years".into(),
                    });
                }
            }
            DepreciationMethod::DecliningBalance { rate } => {
                validate_rate("depreciation.rate", *rate)?
            }
            DepreciationMethod::PercentOfGross { rate } => {
                validate_rate("depreciation.rate", *rate)?
            }
        }
        Ok(())
    }

    fn validate_debt(&self) -> ForecastResult<()> {
        if let Some(term) = &self.debt.term_debt {
            validate_non_negative("term_debt.opening_balance", term.opening_balance)?;
            validate_rate("term_debt.rate", term.rate)?;
            if term.maturity_periods == 0 {
                return Err(ForecastError::InvalidInput {
                    field: "term_debt.maturity_periods".into(),
                    reason: "Maturity must be at least 1 period".into(),
                });
            }
            for amount in &term.amortization {
                validate_non_negative("term_debt.amortization", *amount)?;
            }
        }
        if let Some(rev) = &self.debt.revolver {
            validate_non_negative("revolver.capacity", rev.capacity)?;
            validate_rate("revolver.rate", rev.rate)?;
            validate_non_negative("revolver.minimum_cash", rev.minimum_cash)?;
            if let Some(fee) = rev.commitment_fee {
                validate_rate("revolver.commitment_fee", fee)?;
            }
        }
        if let Some(sweep) = &self.debt.cash_sweep {
            validate_non_negative("cash_sweep.cash_threshold", sweep.cash_threshold)?;
            validate_rate("cash_sweep.sweep_pct", sweep.sweep_pct)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

pub(crate) fn validate_rate(field: &str, value: Rate) -> ForecastResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ForecastError::InvalidInput {
            field: field.into(),
            reason: format!("Rate must be between 0 and 1, got {value}"),
        });
    }
    Ok(())
}

pub(crate) fn validate_non_negative(field: &str, value: Money) -> ForecastResult<()> {
    if value < Decimal::ZERO {
        return Err(ForecastError::InvalidInput {
            field: field.into(),
            reason: format!("Value must be non-negative, got {value}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn minimal_assumptions() -> ForecastAssumptions {
        ForecastAssumptions {
            periods: 3,
            revenue: RevenueDrivers::GrowthRate {
                annual_rate: dec!(0.05),
                period_overrides: BTreeMap::new(),
                basis: GrowthBasis::Compound,
            },
            cogs: CostMethod::PercentOfRevenue { pct: dec!(0.60) },
            sga: CostMethod::PercentOfRevenue { pct: dec!(0.15) },
            working_capital: WorkingCapitalDrivers::default(),
            capex: CapexMethod::PercentOfRevenue { pct: dec!(0.05) },
            depreciation: DepreciationMethod::PercentOfGross { rate: dec!(0.10) },
            debt: DebtDrivers::default(),
            tax: TaxAssumptions {
                effective_rate: dec!(0.25),
            },
            dividends: DividendPolicy::None,
            shares: None,
            circularity: CircularitySettings::default(),
            metadata: None,
        }
    }

    #[test]
    fn test_minimal_assumptions_validate() {
        assert!(minimal_assumptions().validate().is_ok());
    }

    #[test]
    fn test_zero_periods_rejected() {
        let mut a = minimal_assumptions();
        a.periods = 0;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_tax_rate_above_one_rejected() {
        let mut a = minimal_assumptions();
        a.tax.effective_rate = dec!(1.5);
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_negative_dso_rejected() {
        let mut a = minimal_assumptions();
        a.working_capital.receivables = ReceivablesMethod::Dso { days: dec!(-5) };
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_zero_useful_life_is_missing_parameter() {
        let mut a = minimal_assumptions();
        a.depreciation = DepreciationMethod::StraightLine {
            useful_life_years: Decimal::ZERO,
        };
        match a.validate().unwrap_err() {
            ForecastError::MissingDriverParameter { driver, .. } => {
                assert_eq!(driver, "depreciation.straight_line");
            }
            e => panic!("Expected MissingDriverParameter, got {e:?}"),
        }
    }

    #[test]
    fn test_zero_maturity_rejected() {
        let mut a = minimal_assumptions();
        a.debt.term_debt = Some(TermDebtTerms {
            opening_balance: dec!(100),
            rate: dec!(0.05),
            maturity_periods: 0,
            amortization: vec![],
        });
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_working_capital_defaults() {
        let wc = WorkingCapitalDrivers::default();
        match wc.receivables {
            ReceivablesMethod::Dso { days } => assert_eq!(days, dec!(45)),
            _ => panic!("default receivables method should be DSO"),
        }
        match wc.inventory {
            InventoryMethod::Dio { days } => assert_eq!(days, dec!(60)),
            _ => panic!("default inventory method should be DIO"),
        }
        match wc.payables {
            PayablesMethod::Dpo { days } => assert_eq!(days, dec!(30)),
            _ => panic!("default payables method should be DPO"),
        }
    }

    #[test]
    fn test_circularity_defaults() {
        let c = CircularitySettings::default();
        assert_eq!(c.method, CircularityMethod::Iterative);
        assert_eq!(c.max_iterations, 20);
        assert_eq!(c.tolerance, dec!(0.01));
    }

    #[test]
    fn test_driver_json_round_trip() {
        let a = minimal_assumptions();
        let json = serde_json::to_string(&a).unwrap();
        let back: ForecastAssumptions = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.periods, 3);
    }

    #[test]
    fn test_unknown_method_tag_rejected_at_parse() {
        let json = r#"{ "method": "percent_of_ebitda", "pct": "0.5" }"#;
        let parsed: Result<CostMethod, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }
}
