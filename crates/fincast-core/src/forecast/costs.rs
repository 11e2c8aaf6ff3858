use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::drivers::CostMethod;
use crate::error::ForecastError;
use crate::types::Money;
use crate::ForecastResult;

/// COGS without a volume series assumes this share of revenue is variable.
/// A business default carried from the source model, not an engine constant.
const COGS_VARIABLE_FALLBACK_PCT: Decimal = dec!(0.50);

/// Which cost line a method is applied to. COGS and SG&A share the same
/// method shape but not the same fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostKind {
    Cogs,
    Sga,
}

impl CostKind {
    fn driver_name(self) -> &'static str {
        match self {
            CostKind::Cogs => "cogs.fixed_plus_variable",
            CostKind::Sga => "sga.fixed_plus_variable",
        }
    }
}

/// Derive a cost series from the revenue series. One value per forecast
/// period, aligned with `revenue`.
pub fn project_costs(
    revenue: &[Money],
    method: &CostMethod,
    kind: CostKind,
) -> ForecastResult<Vec<Money>> {
    match method {
        CostMethod::PercentOfRevenue { pct } => Ok(revenue.iter().map(|r| r * pct).collect()),

        CostMethod::FixedPlusVariable {
            fixed,
            unit_variable_cost,
            unit_volumes,
        } => {
            let mut out = Vec::with_capacity(revenue.len());
            match unit_volumes {
                Some(volumes) => {
                    let unit_cost =
                        unit_variable_cost.ok_or_else(|| ForecastError::MissingDriverParameter {
                            driver: kind.driver_name().into(),
                            parameter: "unit_variable_cost when unit_volumes is supplied".into(),
                        })?;
                    if volumes.len() < revenue.len() {
                        return Err(ForecastError::InvalidInput {
                            field: format!("{}.unit_volumes", kind.driver_name()),
                            reason: format!(
                                "Volume series covers {} of {} forecast periods",
                                volumes.len(),
                                revenue.len()
                            ),
                        });
                    }
                    for (volume, _) in volumes.iter().zip(revenue.iter()) {
                        out.push(fixed + volume * unit_cost);
                    }
                }
                None => {
                    // Documented fallback exists only for COGS.
                    if kind == CostKind::Sga {
                        return Err(ForecastError::MissingDriverParameter {
                            driver: kind.driver_name().into(),
                            parameter: "unit_volumes (no variable-cost fallback for SG&A)".into(),
                        });
                    }
                    for r in revenue {
                        out.push(fixed + r * COGS_VARIABLE_FALLBACK_PCT);
                    }
                }
            }
            Ok(out)
        }

        CostMethod::Detailed { lines } => {
            if lines.is_empty() {
                return Err(ForecastError::MissingDriverParameter {
                    driver: match kind {
                        CostKind::Cogs => "cogs.detailed".into(),
                        CostKind::Sga => "sga.detailed".into(),
                    },
                    parameter: "at least one cost line".into(),
                });
            }
            let mut out = vec![Decimal::ZERO; revenue.len()];
            for line in lines {
                if line.amounts.len() < revenue.len() {
                    return Err(ForecastError::InvalidInput {
                        field: format!("detailed line '{}'", line.name),
                        reason: format!(
                            "Line covers {} of {} forecast periods",
                            line.amounts.len(),
                            revenue.len()
                        ),
                    });
                }
                for (slot, amount) in out.iter_mut().zip(line.amounts.iter()) {
                    *slot += amount;
                }
            }
            Ok(out)
        }
    }
}
