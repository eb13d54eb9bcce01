//! Battery and tariff CLI arguments.

use clap::Parser;
use horizon::{
    core::parameters::{BatteryParameters, Tariff},
    quantity::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

#[must_use]
#[derive(Copy, Clone, Parser)]
pub struct BatteryArgs {
    /// Usable battery capacity in kilowatt-hours.
    #[clap(
        long = "capacity-kilowatt-hours",
        default_value = "1000",
        env = "CAPACITY_KILOWATT_HOURS"
    )]
    pub capacity: KilowattHours,

    /// Maximum charging and discharging power in kilowatts.
    #[clap(long = "max-power-kilowatts", default_value = "500", env = "MAX_POWER_KILOWATTS")]
    pub max_power: Kilowatts,

    /// One-way efficiency, applied in both directions.
    #[clap(long = "efficiency", default_value = "0.9", env = "EFFICIENCY")]
    pub efficiency: f64,
}

impl BatteryArgs {
    pub fn parameters(self) -> BatteryParameters {
        BatteryParameters::builder()
            .capacity(self.capacity)
            .max_power(self.max_power)
            .efficiency(self.efficiency)
            .build()
    }
}

#[must_use]
#[derive(Copy, Clone, Parser)]
pub struct TariffArgs {
    /// Fee added to every purchased kilowatt-hour.
    #[clap(long = "grid-fee-per-kwh", default_value = "0.04", env = "GRID_FEE_PER_KWH")]
    pub grid_fee: KilowattHourRate,

    /// Battery wear cost per kilowatt-hour moved in either direction.
    #[clap(
        long = "degradation-cost-per-kwh",
        default_value = "0.01",
        env = "DEGRADATION_COST_PER_KWH"
    )]
    pub degradation_cost: KilowattHourRate,
}

impl TariffArgs {
    pub fn tariff(self) -> Tariff {
        Tariff::builder().grid_fee(self.grid_fee).degradation_cost(self.degradation_cost).build()
    }
}
