use chrono::TimeDelta;
use thiserror::Error;

use crate::quantity::{
    energy::KilowattHours,
    power::Kilowatts,
    rate::KilowattHourRate,
};

/// Relative numerical tolerance for accepting the solver output.
const RELATIVE_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("capacity must be positive and finite, got {0}")]
    Capacity(KilowattHours),

    #[error("maximum power must be positive and finite, got {0}")]
    MaxPower(Kilowatts),

    #[error("efficiency must be within (0, 1], got {0}")]
    Efficiency(f64),

    #[error("grid fee must be non-negative and finite, got {0}")]
    GridFee(KilowattHourRate),

    #[error("degradation cost must be non-negative and finite, got {0}")]
    DegradationCost(KilowattHourRate),

    #[error("disclosure hour must be within 0..=23, got {0}")]
    DisclosureHour(u32),
}

/// Physical battery parameters.
#[must_use]
#[derive(Copy, Clone, Debug, bon::Builder)]
pub struct BatteryParameters {
    pub capacity: KilowattHours,

    /// Maximum charging and discharging power.
    pub max_power: Kilowatts,

    /// One-way efficiency, applied both when charging and discharging.
    ///
    /// The round-trip efficiency is its square.
    pub efficiency: f64,
}

impl BatteryParameters {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(self.capacity.is_finite() && self.capacity > KilowattHours::ZERO) {
            return Err(ParameterError::Capacity(self.capacity));
        }
        if !(self.max_power.is_finite() && self.max_power > Kilowatts::ZERO) {
            return Err(ParameterError::MaxPower(self.max_power));
        }
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return Err(ParameterError::Efficiency(self.efficiency));
        }
        Ok(())
    }

    /// The battery starts half-full.
    pub fn initial_residual_energy(&self) -> KilowattHours {
        self.capacity * 0.5
    }

    /// Maximum energy that can be charged or discharged within a single one-hour step.
    pub fn max_energy_per_step(&self) -> KilowattHours {
        self.max_power * TimeDelta::hours(1)
    }

    /// Residual energy after charging and discharging the specified amounts of external energy.
    pub fn residual_energy_after(
        &self,
        residual_energy: KilowattHours,
        charge: KilowattHours,
        discharge: KilowattHours,
    ) -> KilowattHours {
        residual_energy + charge * self.efficiency - discharge / self.efficiency
    }

    /// Absolute tolerance for the solver output, scaled to the battery size.
    pub fn tolerance(&self) -> KilowattHours {
        KilowattHours::from(
            RELATIVE_TOLERANCE * self.capacity.0.max(self.max_energy_per_step().0).max(1.0),
        )
    }
}

/// Costs attached to the energy flows, on top of the market price.
#[must_use]
#[derive(Copy, Clone, Debug, bon::Builder)]
pub struct Tariff {
    /// Added to every purchased kilowatt-hour.
    pub grid_fee: KilowattHourRate,

    /// Wear cost per kilowatt-hour of throughput, charged in both directions.
    pub degradation_cost: KilowattHourRate,
}

impl Tariff {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(self.grid_fee.is_finite() && self.grid_fee >= KilowattHourRate::ZERO) {
            return Err(ParameterError::GridFee(self.grid_fee));
        }
        if !(self.degradation_cost.is_finite() && self.degradation_cost >= KilowattHourRate::ZERO)
        {
            return Err(ParameterError::DegradationCost(self.degradation_cost));
        }
        Ok(())
    }
}
