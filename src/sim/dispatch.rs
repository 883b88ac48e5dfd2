//! Charge/discharge pair exchanged between controller, constraints and equipment.

use crate::error::InvariantViolation;

/// Energy into (`charge`) or out of (`discharge`) the asset during one interval.
///
/// At most one leg is non-zero for a well-formed dispatch. Positive
/// [`Dispatch::net_value`] relieves metered demand.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dispatch {
    pub charge: f64,
    pub discharge: f64,
}

impl Dispatch {
    pub const IDLE: Dispatch = Dispatch {
        charge: 0.0,
        discharge: 0.0,
    };

    pub fn charge(energy: f64) -> Self {
        Self {
            charge: energy,
            discharge: 0.0,
        }
    }

    pub fn discharge(energy: f64) -> Self {
        Self {
            charge: 0.0,
            discharge: energy,
        }
    }

    /// Splits a signed proposal: negative values charge, positive values discharge.
    pub fn from_raw(x: f64) -> Self {
        if x < 0.0 {
            Self::charge(-x)
        } else if x > 0.0 {
            Self::discharge(x)
        } else {
            Self::IDLE
        }
    }

    /// `discharge - charge`.
    pub fn net_value(&self) -> f64 {
        self.discharge - self.charge
    }

    pub fn is_idle(&self) -> bool {
        self.charge == 0.0 && self.discharge == 0.0
    }

    /// Checks non-negativity and mutual exclusivity.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if self.charge < 0.0 || self.discharge < 0.0 {
            return Err(InvariantViolation::NegativeDispatch {
                charge: self.charge,
                discharge: self.discharge,
            });
        }
        if self.charge > 0.0 && self.discharge > 0.0 {
            return Err(InvariantViolation::SimultaneousChargeDischarge {
                charge: self.charge,
                discharge: self.discharge,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_negative_becomes_charge() {
        let d = Dispatch::from_raw(-3.0);
        assert_eq!(d, Dispatch::charge(3.0));
        assert_eq!(d.net_value(), -3.0);
    }

    #[test]
    fn raw_positive_becomes_discharge() {
        let d = Dispatch::from_raw(2.5);
        assert_eq!(d, Dispatch::discharge(2.5));
        assert_eq!(d.net_value(), 2.5);
    }

    #[test]
    fn raw_zero_is_idle() {
        assert!(Dispatch::from_raw(0.0).is_idle());
        assert!(Dispatch::from_raw(-0.0).is_idle());
    }

    #[test]
    fn validate_rejects_both_legs() {
        let d = Dispatch {
            charge: 1.0,
            discharge: 1.0,
        };
        assert!(matches!(
            d.validate(),
            Err(InvariantViolation::SimultaneousChargeDischarge { .. })
        ));
    }

    #[test]
    fn validate_rejects_negative_leg() {
        let d = Dispatch {
            charge: -1.0,
            discharge: 0.0,
        };
        assert!(matches!(
            d.validate(),
            Err(InvariantViolation::NegativeDispatch { .. })
        ));
    }

    #[test]
    fn validate_accepts_single_leg() {
        assert!(Dispatch::charge(4.0).validate().is_ok());
        assert!(Dispatch::IDLE.validate().is_ok());
    }
}
