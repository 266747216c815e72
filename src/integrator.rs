//! Explicit fixed-step integration of the villager/mosquito model.

use crate::config::{BirthSource, DailyRates, LagPolicy, SimulationConfig};
use crate::error::ModelError;
use crate::model::{Population, SimulationState};
use crate::modulation::Modulation;

/// Run a simulation with the modulation described by the configuration.
///
/// # Errors
/// Returns [`ModelError::InvalidConfig`] before allocating any state if the
/// configuration is rejected, and [`ModelError::ModelDegeneracy`] as soon as a
/// population total used as a divisor reaches zero. No partial state is
/// returned in either case.
pub fn run(cfg: &SimulationConfig) -> Result<SimulationState, ModelError> {
    let modulation = cfg.modulation();
    run_with(cfg, &*modulation)
}

/// Run a simulation with an injected modulation policy.
///
/// The policy replaces whatever `cfg.seasonal` describes.
pub fn run_with<M>(cfg: &SimulationConfig, modulation: &M) -> Result<SimulationState, ModelError>
where
    M: Modulation + ?Sized,
{
    cfg.validate()?;

    let mut integrator = Integrator::new(cfg, modulation);
    log::debug!(
        "integrating {} steps of {} days",
        integrator.state.n_steps,
        cfg.time.time_step
    );

    for i in 0..integrator.state.n_steps {
        integrator.perform_step(i)?;
    }

    log::debug!("integration finished at day {}", integrator.state.time[integrator.state.n_steps]);

    Ok(integrator.state)
}

struct Integrator<'a, M: ?Sized> {
    cfg: &'a SimulationConfig,
    rates: DailyRates,
    modulation: &'a M,
    state: SimulationState,
}

impl<'a, M> Integrator<'a, M>
where
    M: Modulation + ?Sized,
{
    fn new(cfg: &'a SimulationConfig, modulation: &'a M) -> Self {
        Self {
            cfg,
            rates: cfg.rates.to_daily(),
            modulation,
            state: SimulationState::seed(cfg),
        }
    }

    fn perform_step(&mut self, i: usize) -> Result<(), ModelError> {
        // Both totals are divisors below.
        self.check_totals(i)?;

        // Every rule of the step sees the same modulated rates.
        let rates = self.modulation.modulate(i, &self.rates);

        self.state.time[i + 1] = self.state.time[i] + self.cfg.time.time_step;

        self.update_villagers(i, &rates);

        self.update_mosquitoes(i, &rates);

        self.update_totals(i);

        self.update_deaths(i, &rates);

        log::trace!(
            "step {i}: villagers {} mosquitoes {}",
            self.state.total_villagers[i + 1],
            self.state.total_mosquitoes[i + 1]
        );

        Ok(())
    }

    fn check_totals(&self, i: usize) -> Result<(), ModelError> {
        if self.state.total_mosquitoes[i] == 0.0 {
            return Err(ModelError::ModelDegeneracy {
                step: i,
                population: Population::Mosquitoes,
            });
        }
        if self.state.total_villagers[i] == 0.0 {
            return Err(ModelError::ModelDegeneracy {
                step: i,
                population: Population::Villagers,
            });
        }
        Ok(())
    }

    fn update_villagers(&mut self, i: usize, r: &DailyRates) {
        let s = &mut self.state;

        let healthy = s.healthy_villagers[i];
        let sick = s.sick_villagers[i];
        let immune = s.immune_villagers[i];

        let infections =
            healthy * r.bite_rate * (s.infected_mosquitoes[i] / s.total_mosquitoes[i]);

        s.healthy_villagers[i + 1] = healthy + healthy * r.villager_birth_rate
            + sick * r.recovery_rate
            - healthy * r.villager_death_rate
            - infections;

        s.sick_villagers[i + 1] = sick
            - sick
                * (r.recovery_rate
                    + r.immunity_rate
                    + r.villager_death_rate
                    + r.malaria_death_rate)
            + infections;

        s.immune_villagers[i + 1] =
            immune - immune * r.villager_death_rate + sick * r.immunity_rate;
    }

    fn update_mosquitoes(&mut self, i: usize, r: &DailyRates) {
        let s = &mut self.state;

        let healthy = s.healthy_mosquitoes[i];
        let infected = s.infected_mosquitoes[i];

        let infection_rate = r.bite_rate * (s.sick_villagers[i] / s.total_villagers[i]);

        s.healthy_mosquitoes[i + 1] = match self.cfg.policy.birth_source {
            BirthSource::Healthy => {
                (1.0 + r.mosquito_birth_rate - r.mosquito_death_rate - infection_rate) * healthy
            }
            BirthSource::TotalPopulation => {
                healthy + r.mosquito_birth_rate * s.total_mosquitoes[i]
                    - r.mosquito_death_rate * healthy
                    - infection_rate * healthy
            }
        };

        s.infected_mosquitoes[i + 1] = (1.0 + infection_rate - r.mosquito_death_rate) * infected;
    }

    fn update_totals(&mut self, i: usize) {
        let s = &mut self.state;

        let src = match self.cfg.policy.lag {
            LagPolicy::Legacy => i,
            LagPolicy::Corrected => i + 1,
        };

        s.total_villagers[i + 1] =
            s.healthy_villagers[src] + s.sick_villagers[src] + s.immune_villagers[src];
        s.total_mosquitoes[i + 1] = s.healthy_mosquitoes[src] + s.infected_mosquitoes[src];
    }

    fn update_deaths(&mut self, i: usize, r: &DailyRates) {
        let s = &mut self.state;
        let Some(deaths) = s.cumulative_deaths.as_mut() else {
            return;
        };

        let sick = s.sick_villagers[i];
        let villagers = sick + s.healthy_villagers[i] + s.immune_villagers[i];

        deaths[i + 1] =
            deaths[i] + r.villager_death_rate * villagers + sick * r.malaria_death_rate;
    }
}
