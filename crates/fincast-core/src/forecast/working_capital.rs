use serde::{Deserialize, Serialize};

use crate::drivers::{
    InventoryMethod, OtherCurrentMethod, PayablesMethod, ReceivablesMethod, WorkingCapitalDrivers,
};
use crate::forecast::DAYS_IN_YEAR;
use crate::types::Money;

/// Historical closing balances seeding the period-1 change computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct WcOpening {
    pub receivables: Money,
    pub inventory: Money,
    pub other_current_assets: Money,
    pub payables: Money,
    pub other_current_liabilities: Money,
}

impl WcOpening {
    pub fn net_working_capital(&self) -> Money {
        self.receivables + self.inventory + self.other_current_assets
            - self.payables
            - self.other_current_liabilities
    }
}

/// One forecast period of working-capital balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingCapitalPeriod {
    pub period: u32,
    pub receivables: Money,
    pub inventory: Money,
    pub other_current_assets: Money,
    pub payables: Money,
    pub other_current_liabilities: Money,
    /// AR + Inventory + OtherCA - AP - OtherCL. Definitional; holds exactly.
    pub net_working_capital: Money,
    /// NWC(t) - NWC(t-1); period 1 compares against the opening balances.
    pub change_in_nwc: Money,
}

/// Compute working-capital balances for every forecast period.
pub fn build_working_capital_schedule(
    revenue: &[Money],
    cogs: &[Money],
    drivers: &WorkingCapitalDrivers,
    opening: WcOpening,
) -> Vec<WorkingCapitalPeriod> {
    let mut schedule = Vec::with_capacity(revenue.len());
    let mut prior_nwc = opening.net_working_capital();

    for (idx, (period_revenue, period_cogs)) in revenue.iter().zip(cogs.iter()).enumerate() {
        let receivables = match &drivers.receivables {
            ReceivablesMethod::Dso { days } => period_revenue / DAYS_IN_YEAR * days,
            ReceivablesMethod::PercentOfRevenue { pct } => period_revenue * pct,
        };
        let inventory = match &drivers.inventory {
            InventoryMethod::Dio { days } => period_cogs / DAYS_IN_YEAR * days,
            InventoryMethod::PercentOfCogs { pct } => period_cogs * pct,
        };
        let payables = match &drivers.payables {
            PayablesMethod::Dpo { days } => period_cogs / DAYS_IN_YEAR * days,
            PayablesMethod::PercentOfCogs { pct } => period_cogs * pct,
        };
        let other_current_assets =
            other_current(&drivers.other_current_assets, *period_revenue);
        let other_current_liabilities =
            other_current(&drivers.other_current_liabilities, *period_revenue);

        let net_working_capital =
            receivables + inventory + other_current_assets - payables - other_current_liabilities;
        let change_in_nwc = net_working_capital - prior_nwc;

        schedule.push(WorkingCapitalPeriod {
            period: (idx + 1) as u32,
            receivables,
            inventory,
            other_current_assets,
            payables,
            other_current_liabilities,
            net_working_capital,
            change_in_nwc,
        });

        prior_nwc = net_working_capital;
    }

    schedule
}

fn other_current(method: &OtherCurrentMethod, revenue: Money) -> Money {
    match method {
        OtherCurrentMethod::PercentOfRevenue { pct } => revenue * pct,
        OtherCurrentMethod::Fixed { amount } => *amount,
    }
}
