pub mod builder;
pub mod circularity;
pub mod costs;
pub mod debt;
pub mod ppe;
pub mod revenue;
pub mod working_capital;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Money;

pub(crate) const DAYS_IN_YEAR: Decimal = dec!(365);

/// Roll-forward identities are recomputed independently and must agree with
/// the schedule to within one unit of currency.
pub(crate) const ROLL_FORWARD_TOLERANCE: Decimal = dec!(1);

/// Result of recomputing a schedule's roll-forward identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollForwardCheck {
    pub passed: bool,
    /// Maximum absolute discrepancy found across all periods.
    pub max_error: Money,
}

impl RollForwardCheck {
    pub(crate) fn from_max_error(max_error: Money) -> Self {
        RollForwardCheck {
            passed: max_error <= ROLL_FORWARD_TOLERANCE,
            max_error,
        }
    }
}
