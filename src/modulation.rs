//! Per-step parameter modulation.
//!
//! A [`Modulation`] rewrites the daily rates for one integration step. It is
//! evaluated once at the start of every step, and all update rules of that
//! step use its result.

use crate::config::DailyRates;
use serde::{Deserialize, Serialize};

pub trait Modulation {
    fn modulate(&self, step: usize, rates: &DailyRates) -> DailyRates;
}

/// Leaves the rates untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Modulation for Identity {
    fn modulate(&self, _step: usize, rates: &DailyRates) -> DailyRates {
        *rates
    }
}

/// Scales the mosquito birth rate outside a window of steps.
///
/// Inside `first_step..=last_step` a control measure is active and the base
/// birth rate applies; every other step uses `factor` times the base rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seasonal {
    pub factor: f64,
    pub first_step: usize,
    pub last_step: usize,
}

impl Seasonal {
    pub fn is_controlled(&self, step: usize) -> bool {
        (self.first_step..=self.last_step).contains(&step)
    }
}

impl Modulation for Seasonal {
    fn modulate(&self, step: usize, rates: &DailyRates) -> DailyRates {
        if self.is_controlled(step) {
            return *rates;
        }
        DailyRates {
            mosquito_birth_rate: rates.mosquito_birth_rate * self.factor,
            ..*rates
        }
    }
}

impl<F> Modulation for F
where
    F: Fn(usize, &DailyRates) -> DailyRates,
{
    fn modulate(&self, step: usize, rates: &DailyRates) -> DailyRates {
        self(step, rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> DailyRates {
        DailyRates {
            villager_birth_rate: 0.019 / 365.0,
            villager_death_rate: 0.008 / 365.0,
            malaria_death_rate: 0.001986,
            recovery_rate: 0.3,
            immunity_rate: 0.01,
            mosquito_birth_rate: 0.01,
            mosquito_death_rate: 0.01,
            bite_rate: 0.3,
        }
    }

    #[test]
    fn identity_keeps_rates() {
        assert_eq!(Identity.modulate(42, &rates()), rates());
    }

    #[test]
    fn seasonal_boosts_births_outside_window() {
        let seasonal = Seasonal {
            factor: 4.0,
            first_step: 80,
            last_step: 200,
        };

        for step in [0, 79, 201, 729] {
            let modulated = seasonal.modulate(step, &rates());
            assert_eq!(modulated.mosquito_birth_rate, 0.04, "step {step}");
            assert_eq!(modulated.bite_rate, 0.3);
        }
        for step in [80, 150, 200] {
            assert_eq!(seasonal.modulate(step, &rates()), rates(), "step {step}");
        }
    }

    #[test]
    fn closures_are_policies() {
        let halve_bites = |_step: usize, rates: &DailyRates| DailyRates {
            bite_rate: rates.bite_rate / 2.0,
            ..*rates
        };
        assert_eq!(halve_bites.modulate(3, &rates()).bite_rate, 0.15);
    }
}
