use crate::error::ModelError;
use crate::modulation::{Identity, Modulation, Seasonal};
use crate::scenario::Scenario;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Days per year, used to turn annualized villager rates into daily ones.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Upper bound on the number of integration steps of a single run.
pub const MAX_STEPS: usize = 10_000_000;

/// Time grid of a run, in days.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeConfig {
    pub time_step: f64,
    pub start_time: f64,
    pub end_time: f64,
}

/// Initial compartment sizes.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    pub healthy_mosquitoes: f64,
    pub infected_mosquitoes: f64,
    pub healthy_villagers: f64,
    pub sick_villagers: f64,
    pub immune_villagers: f64,
}

/// Rate parameters as configured.
///
/// `villager_birth_rate` and `villager_death_rate` are annual rates; every
/// other rate is a per-day fraction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rates {
    pub villager_birth_rate: f64,
    pub villager_death_rate: f64,
    pub malaria_death_rate: f64,
    pub recovery_rate: f64,
    pub immunity_rate: f64,
    pub mosquito_birth_rate: f64,
    pub mosquito_death_rate: f64,
    pub bite_rate: f64,
}

/// Rate parameters with every rate expressed per day.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct DailyRates {
    pub villager_birth_rate: f64,
    pub villager_death_rate: f64,
    pub malaria_death_rate: f64,
    pub recovery_rate: f64,
    pub immunity_rate: f64,
    pub mosquito_birth_rate: f64,
    pub mosquito_death_rate: f64,
    pub bite_rate: f64,
}

impl Rates {
    /// Convert the annual villager rates to daily ones.
    pub fn to_daily(&self) -> DailyRates {
        DailyRates {
            villager_birth_rate: self.villager_birth_rate / DAYS_PER_YEAR,
            villager_death_rate: self.villager_death_rate / DAYS_PER_YEAR,
            malaria_death_rate: self.malaria_death_rate,
            recovery_rate: self.recovery_rate,
            immunity_rate: self.immunity_rate,
            mosquito_birth_rate: self.mosquito_birth_rate,
            mosquito_death_rate: self.mosquito_death_rate,
            bite_rate: self.bite_rate,
        }
    }
}

/// Population that newborn healthy mosquitoes are recruited from.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum BirthSource {
    /// Births proportional to the healthy mosquitoes only.
    #[default]
    #[serde(rename = "self")]
    Healthy,
    /// Births proportional to the whole mosquito population.
    #[serde(rename = "total_population")]
    TotalPopulation,
}

/// Which compartment values the population totals are recomputed from.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagPolicy {
    /// `total[i + 1]` is the sum of the compartments at step `i`.
    #[default]
    Legacy,
    /// `total[i + 1]` is the sum of the compartments at step `i + 1`.
    Corrected,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default)]
    pub birth_source: BirthSource,
    #[serde(default)]
    pub lag: LagPolicy,
    #[serde(default)]
    pub track_deaths: bool,
}

/// Complete input of one simulation run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub time: TimeConfig,
    pub init: InitConfig,
    pub rates: Rates,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub seasonal: Option<Seasonal>,
}

impl SimulationConfig {
    /// Number of integration steps, `floor((end_time - start_time) / time_step)`.
    pub fn n_steps(&self) -> usize {
        let time = &self.time;
        ((time.end_time - time.start_time) / time.time_step).floor() as usize
    }

    /// Parameter modulation described by this configuration.
    pub fn modulation(&self) -> Box<dyn Modulation> {
        match self.seasonal {
            Some(seasonal) => Box::new(seasonal),
            None => Box::new(Identity),
        }
    }

    /// Check every parameter, reporting the first offending field.
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidConfig`] for a non-positive time step, an
    /// empty time span, negative initial counts or non-finite rates.
    pub fn validate(&self) -> Result<(), ModelError> {
        let time = &self.time;
        check_num("time.time_step", time.time_step, FINITE)?;
        if time.time_step <= 0.0 {
            return Err(ModelError::invalid(
                "time.time_step",
                format!("time step must be positive, but is {:?}", time.time_step),
            ));
        }
        check_num("time.start_time", time.start_time, FINITE)?;
        check_num("time.end_time", time.end_time, FINITE)?;
        if time.end_time <= time.start_time {
            return Err(ModelError::invalid(
                "time.end_time",
                format!(
                    "end time must be greater than start time {:?}, but is {:?}",
                    time.start_time, time.end_time
                ),
            ));
        }
        check_num("number of steps", self.n_steps(), 0..=MAX_STEPS)?;

        let init = &self.init;
        check_num("init.healthy_mosquitoes", init.healthy_mosquitoes, COUNT)?;
        check_num("init.infected_mosquitoes", init.infected_mosquitoes, COUNT)?;
        check_num("init.healthy_villagers", init.healthy_villagers, COUNT)?;
        check_num("init.sick_villagers", init.sick_villagers, COUNT)?;
        check_num("init.immune_villagers", init.immune_villagers, COUNT)?;

        let rates = &self.rates;
        check_num("rates.villager_birth_rate", rates.villager_birth_rate, FINITE)?;
        check_num("rates.villager_death_rate", rates.villager_death_rate, FINITE)?;
        check_num("rates.malaria_death_rate", rates.malaria_death_rate, FINITE)?;
        check_num("rates.recovery_rate", rates.recovery_rate, FINITE)?;
        check_num("rates.immunity_rate", rates.immunity_rate, FINITE)?;
        check_num("rates.mosquito_birth_rate", rates.mosquito_birth_rate, FINITE)?;
        check_num("rates.mosquito_death_rate", rates.mosquito_death_rate, FINITE)?;
        check_num("rates.bite_rate", rates.bite_rate, FINITE)?;

        if let Some(seasonal) = &self.seasonal {
            check_num("seasonal.factor", seasonal.factor, FINITE)?;
            if seasonal.factor <= 0.0 {
                return Err(ModelError::invalid(
                    "seasonal.factor",
                    format!("factor must be positive, but is {:?}", seasonal.factor),
                ));
            }
            check_num("seasonal.last_step", seasonal.last_step, seasonal.first_step..)?;
        }

        Ok(())
    }
}

const FINITE: std::ops::RangeInclusive<f64> = f64::MIN..=f64::MAX;
const COUNT: std::ops::RangeInclusive<f64> = 0.0..=f64::MAX;

fn check_num<T, R>(field: &'static str, num: T, range: R) -> Result<(), ModelError>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        return Err(ModelError::invalid(
            field,
            format!("number must be in the range {range:?}, but is {num:?}"),
        ));
    }
    Ok(())
}

/// Contents of a simulation directory's `config.toml`.
///
/// The base run is described by the `[time]`, `[init]`, `[rates]`,
/// `[policy]` and `[seasonal]` tables. An optional `[sweep]` and each
/// `[[scenarios]]` entry derive further runs from it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub time: TimeConfig,
    pub init: InitConfig,
    pub rates: Rates,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub seasonal: Option<Seasonal>,
    #[serde(default)]
    pub sweep: Option<Sweep>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// Sweep over the initial villager split.
///
/// Either `population` is given and each run has `population - sick`
/// healthy villagers, or `healthy_villagers` lists the healthy count of
/// every run alongside `sick_villagers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sweep {
    pub sick_villagers: Vec<f64>,
    #[serde(default)]
    pub healthy_villagers: Option<Vec<f64>>,
    #[serde(default)]
    pub population: Option<f64>,
}

impl Sweep {
    /// Check that exactly one way of choosing the healthy count is given.
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidConfig`] if both or neither of
    /// `healthy_villagers` and `population` are set, or if the two lists
    /// differ in length.
    pub fn validate(&self) -> Result<(), ModelError> {
        match (&self.healthy_villagers, self.population) {
            (Some(_), Some(_)) | (None, None) => Err(ModelError::invalid(
                "sweep",
                "exactly one of healthy_villagers or population must be set",
            )),
            (Some(healthy), None) if healthy.len() != self.sick_villagers.len() => {
                Err(ModelError::invalid(
                    "sweep.healthy_villagers",
                    format!(
                        "expected {} entries to match sick_villagers, but got {}",
                        self.sick_villagers.len(),
                        healthy.len()
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl ConfigFile {
    /// Load a [`ConfigFile`] from a TOML file.
    ///
    /// Validates the base configuration before returning; scenario
    /// configurations are validated when they are built.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or deserialized,
    /// or if the base configuration is invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: ConfigFile = toml::from_str(&contents)
            .with_context(|| format!("failed to deserialize {file:?}"))?;

        config
            .base()
            .validate()
            .context("failed to validate base config")?;
        if let Some(sweep) = &config.sweep {
            sweep.validate().context("failed to validate sweep")?;
        }

        Ok(config)
    }

    /// The base simulation configuration.
    pub fn base(&self) -> SimulationConfig {
        SimulationConfig {
            time: self.time.clone(),
            init: self.init.clone(),
            rates: self.rates.clone(),
            policy: self.policy.clone(),
            seasonal: self.seasonal,
        }
    }
}
