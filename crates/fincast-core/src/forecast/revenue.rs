use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::drivers::{GrowthBasis, RevenueDrivers};
use crate::types::{Money, Rate};
use crate::ForecastResult;

/// Flat per-period revenue used when the historical base is zero or negative.
/// Growth math on a non-positive base produces artifacts, so the forecaster
/// degrades to a flat series and reports a warning instead.
pub const FLAT_FALLBACK_REVENUE: Decimal = dec!(1000);

/// Project revenue over `periods` forecast periods from the historical base.
///
/// Returns one value per forecast period, aligned with 1-based period
/// indices 1..=periods.
pub fn project_revenue(
    base_revenue: Money,
    periods: u32,
    drivers: &RevenueDrivers,
    warnings: &mut Vec<String>,
) -> ForecastResult<Vec<Money>> {
    if base_revenue <= Decimal::ZERO {
        if !matches!(drivers, RevenueDrivers::Segments { .. }) {
            warnings.push(format!(
                "Base revenue {base_revenue} is not positive; forecasting flat at {FLAT_FALLBACK_REVENUE} per period"
            ));
            return Ok(vec![FLAT_FALLBACK_REVENUE; periods as usize]);
        }
        // Segments carry their own bases; the aggregate base is not used.
    }

    let series = match drivers {
        RevenueDrivers::GrowthRate {
            annual_rate,
            period_overrides,
            basis,
        } => {
            let mut out = Vec::with_capacity(periods as usize);
            let mut running = base_revenue;
            for period in 1..=periods {
                let rate = period_overrides.get(&period).copied().unwrap_or(*annual_rate);
                let value = match basis {
                    GrowthBasis::Compound => running * (Decimal::ONE + rate),
                    GrowthBasis::Simple => {
                        base_revenue * (Decimal::ONE + rate * Decimal::from(period))
                    }
                };
                out.push(value);
                running = value;
            }
            out
        }
        RevenueDrivers::PriceVolume {
            base_price,
            base_volume,
            price_growth,
            volume_growth,
        } => {
            let mut out = Vec::with_capacity(periods as usize);
            let mut price = *base_price;
            let mut volume = *base_volume;
            for period in 1..=periods {
                price *= Decimal::ONE + rate_at(price_growth, period);
                volume *= Decimal::ONE + rate_at(volume_growth, period);
                out.push(price * volume);
            }
            out
        }
        RevenueDrivers::Segments { segments } => {
            let mut out = vec![Decimal::ZERO; periods as usize];
            for segment in segments {
                let mut running = segment.base_revenue;
                for slot in out.iter_mut() {
                    running *= Decimal::ONE + segment.growth_rate;
                    *slot += running;
                }
            }
            out
        }
    };

    Ok(series)
}

/// Per-period growth rate for 1-based period indices; an empty series grows
/// nothing and the last entry persists past the end.
fn rate_at(rates: &[Rate], period: u32) -> Rate {
    if rates.is_empty() {
        return Decimal::ZERO;
    }
    let idx = (period as usize - 1).min(rates.len() - 1);
    rates[idx]
}

/// Period-over-period growth rates of any revenue series, for diagnostics.
/// The first entry compares against nothing and is omitted; periods following
/// a zero value report zero growth rather than dividing by zero.
pub fn growth_rates(series: &[Money]) -> Vec<Rate> {
    series
        .windows(2)
        .map(|pair| {
            if pair[0].is_zero() {
                Decimal::ZERO
            } else {
                pair[1] / pair[0] - Decimal::ONE
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::RevenueSegment;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn growth_drivers(rate: Decimal, basis: GrowthBasis) -> RevenueDrivers {
        RevenueDrivers::GrowthRate {
            annual_rate: rate,
            period_overrides: BTreeMap::new(),
            basis,
        }
    }

    #[test]
    fn test_compound_growth() {
        let mut warnings = Vec::new();
        let series = project_revenue(
            dec!(100),
            3,
            &growth_drivers(dec!(0.05), GrowthBasis::Compound),
            &mut warnings,
        )
        .unwrap();

        // 5% compounding from 100: spec scenario B
        assert_eq!(series, vec![dec!(105), dec!(110.25), dec!(115.7625)]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_simple_growth_scales_base() {
        let mut warnings = Vec::new();
        let series = project_revenue(
            dec!(100),
            3,
            &growth_drivers(dec!(0.10), GrowthBasis::Simple),
            &mut warnings,
        )
        .unwrap();

        // base * (1 + rate * t)
        assert_eq!(series, vec![dec!(110), dec!(120.0), dec!(130.0)]);
    }

    #[test]
    fn test_period_override_takes_precedence() {
        let mut overrides = BTreeMap::new();
        overrides.insert(2, dec!(0.50));
        let drivers = RevenueDrivers::GrowthRate {
            annual_rate: dec!(0.0),
            period_overrides: overrides,
            basis: GrowthBasis::Compound,
        };

        let mut warnings = Vec::new();
        let series = project_revenue(dec!(100), 3, &drivers, &mut warnings).unwrap();
        assert_eq!(series, vec![dec!(100), dec!(150.0), dec!(150.0)]);
    }

    #[test]
    fn test_price_volume() {
        let drivers = RevenueDrivers::PriceVolume {
            base_price: dec!(10),
            base_volume: dec!(100),
            price_growth: vec![dec!(0.10)],
            volume_growth: vec![dec!(0.0)],
        };

        let mut warnings = Vec::new();
        let series = project_revenue(dec!(1000), 2, &drivers, &mut warnings).unwrap();

        // Price grows 10%/period (last rate persists), volume flat
        assert_eq!(series, vec![dec!(1100.0), dec!(1210.00)]);
    }

    #[test]
    fn test_segments_sum_independently() {
        let drivers = RevenueDrivers::Segments {
            segments: vec![
                RevenueSegment {
                    name: "hardware".into(),
                    base_revenue: dec!(100),
                    growth_rate: dec!(0.10),
                },
                RevenueSegment {
                    name: "services".into(),
                    base_revenue: dec!(50),
                    growth_rate: dec!(0.0),
                },
            ],
        };

        let mut warnings = Vec::new();
        let series = project_revenue(dec!(150), 2, &drivers, &mut warnings).unwrap();
        assert_eq!(series, vec![dec!(160.0), dec!(171.00)]);
    }

    #[test]
    fn test_non_positive_base_falls_back_flat() {
        let mut warnings = Vec::new();
        let series = project_revenue(
            dec!(0),
            3,
            &growth_drivers(dec!(0.05), GrowthBasis::Compound),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(series, vec![FLAT_FALLBACK_REVENUE; 3]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("not positive"));
    }

    #[test]
    fn test_negative_base_falls_back_flat() {
        let mut warnings = Vec::new();
        let series = project_revenue(
            dec!(-500),
            2,
            &growth_drivers(dec!(0.05), GrowthBasis::Compound),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(series, vec![FLAT_FALLBACK_REVENUE; 2]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_growth_rates_diagnostic() {
        let rates = growth_rates(&[dec!(100), dec!(110), dec!(121)]);
        assert_eq!(rates, vec![dec!(0.1), dec!(0.1)]);
    }

    #[test]
    fn test_growth_rates_zero_prior_reports_zero() {
        let rates = growth_rates(&[dec!(0), dec!(50)]);
        assert_eq!(rates, vec![Decimal::ZERO]);
    }

    #[test]
    fn test_exact_period_count() {
        let mut warnings = Vec::new();
        for n in [1u32, 5, 10] {
            let series = project_revenue(
                dec!(100),
                n,
                &growth_drivers(dec!(0.03), GrowthBasis::Compound),
                &mut warnings,
            )
            .unwrap();
            assert_eq!(series.len(), n as usize);
        }
    }
}
