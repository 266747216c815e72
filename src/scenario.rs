//! Batch runs derived from a base configuration.

use crate::config::{SimulationConfig, Sweep};
use crate::error::ModelError;
use crate::integrator;
use crate::model::SimulationState;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_value::Value;
use std::collections::BTreeMap;

/// Named set of overrides applied on top of a base configuration.
///
/// Overrides mirror the layout of [`SimulationConfig`], e.g.
/// `{ init = { sick_villagers = 50 } }`. Only existing fields can be
/// overridden, except that a missing `seasonal` table can be supplied whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "empty_table")]
    pub overrides: Value,
}

fn empty_table() -> Value {
    Value::Map(BTreeMap::new())
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overrides: empty_table(),
        }
    }

    /// Add an override at a dotted path such as `"init.sick_villagers"`.
    pub fn with_override<T: Serialize>(mut self, path: &str, value: T) -> Result<Self> {
        let value = serde_value::to_value(value)
            .with_context(|| format!("failed to serialize override {path:?}"))?;

        let mut node = &mut self.overrides;
        for key in path.split('.') {
            let Value::Map(table) = node else {
                bail!("override {path:?} conflicts with an existing override");
            };
            node = table
                .entry(Value::String(key.to_string()))
                .or_insert_with(empty_table);
        }
        *node = value;

        Ok(self)
    }

    /// Build this scenario's configuration from `base`.
    ///
    /// # Errors
    /// Returns an error if an override names an unknown field, has the wrong
    /// type, or yields an invalid configuration.
    pub fn apply(&self, base: &SimulationConfig) -> Result<SimulationConfig> {
        let mut value = serde_value::to_value(base).context("failed to serialize base config")?;

        merge(&mut value, self.overrides.clone(), "")
            .with_context(|| format!("failed to apply overrides of {:?}", self.name))?;

        let cfg: SimulationConfig = value
            .deserialize_into()
            .with_context(|| format!("failed to deserialize config of {:?}", self.name))?;

        cfg.validate()
            .with_context(|| format!("failed to validate config of {:?}", self.name))?;

        Ok(cfg)
    }
}

fn merge(node: &mut Value, patch: Value, path: &str) -> Result<()> {
    let Value::Map(entries) = patch else {
        *node = patch;
        return Ok(());
    };

    match node {
        Value::Map(table) => {
            for (key, val) in entries {
                let Value::String(name) = &key else {
                    bail!("override keys under {path:?} must be strings, found {key:?}");
                };
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}.{name}")
                };
                let child = table
                    .get_mut(&key)
                    .with_context(|| format!("unknown config field {child_path:?}"))?;
                merge(child, val, &child_path)?;
            }
            Ok(())
        }
        Value::Option(Some(inner)) => merge(inner, Value::Map(entries), path),
        Value::Option(None) => {
            *node = Value::Option(Some(Box::new(Value::Map(entries))));
            Ok(())
        }
        _ => bail!("config field {path:?} is not a table"),
    }
}

/// Result of running one scenario.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub name: String,
    pub config: SimulationConfig,
    pub result: Result<SimulationState, ModelError>,
}

/// Runs a base configuration under each of a list of scenarios.
///
/// Runs share nothing; a failing scenario does not affect the others.
#[derive(Debug, Clone)]
pub struct ScenarioDriver {
    base: SimulationConfig,
    scenarios: Vec<Scenario>,
}

impl ScenarioDriver {
    pub fn new(base: SimulationConfig) -> Self {
        Self {
            base,
            scenarios: Vec::new(),
        }
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_scenarios<I: IntoIterator<Item = Scenario>>(self, scenarios: I) -> Self {
        scenarios.into_iter().fold(self, Self::with_scenario)
    }

    /// Build the runs described by a `[sweep]` table.
    ///
    /// # Errors
    /// Fails if the sweep is invalid or an override cannot be built.
    pub fn from_sweep(base: SimulationConfig, sweep: &Sweep) -> Result<Self> {
        sweep.validate()?;
        match (&sweep.healthy_villagers, sweep.population) {
            (Some(healthy), None) => {
                let splits: Vec<_> = healthy
                    .iter()
                    .copied()
                    .zip(sweep.sick_villagers.iter().copied())
                    .collect();
                Self::sweep_villagers(base, &splits)
            }
            (None, Some(population)) => {
                Self::sweep_sick_villagers(base, &sweep.sick_villagers, population)
            }
            _ => bail!("sweep needs exactly one of healthy_villagers or population"),
        }
    }

    /// Vary the initial healthy and sick villager counts independently.
    ///
    /// Each `(healthy, sick)` pair yields one scenario; the total population
    /// may differ between runs.
    pub fn sweep_villagers(base: SimulationConfig, splits: &[(f64, f64)]) -> Result<Self> {
        splits
            .iter()
            .try_fold(Self::new(base), |driver, &(healthy, sick)| {
                driver.with_split(format!("healthy-{healthy}-sick-{sick}"), healthy, sick)
            })
    }

    /// Vary the initial split between healthy and sick villagers.
    ///
    /// Each count `c` yields a scenario with `c` sick and `population - c`
    /// healthy villagers.
    pub fn sweep_sick_villagers(
        base: SimulationConfig,
        counts: &[f64],
        population: f64,
    ) -> Result<Self> {
        counts.iter().try_fold(Self::new(base), |driver, &count| {
            driver.with_split(format!("sick-{count}"), population - count, count)
        })
    }

    fn with_split(self, name: String, healthy: f64, sick: f64) -> Result<Self> {
        let scenario = Scenario::new(name)
            .with_override("init.healthy_villagers", healthy)?
            .with_override("init.sick_villagers", sick)?;
        Ok(self.with_scenario(scenario))
    }

    /// Named configuration of every run, or of the base alone when there are
    /// no scenarios.
    pub fn build_configs(&self) -> Result<Vec<(String, SimulationConfig)>> {
        if self.scenarios.is_empty() {
            self.base.validate().context("failed to validate base config")?;
            return Ok(vec![("base".to_string(), self.base.clone())]);
        }
        self.scenarios
            .iter()
            .map(|scenario| Ok((scenario.name.clone(), scenario.apply(&self.base)?)))
            .collect()
    }

    /// Build every configuration and run each through the integrator.
    ///
    /// # Errors
    /// Fails before running anything if a configuration cannot be built.
    /// Failures of individual runs are reported in their outcome.
    pub fn run_all(&self) -> Result<Vec<ScenarioOutcome>> {
        let configs = self.build_configs()?;
        let n_runs = configs.len();

        let outcomes = configs
            .into_iter()
            .enumerate()
            .map(|(i_run, (name, config))| {
                let result = integrator::run(&config);
                match &result {
                    Ok(state) => log::info!(
                        "completed scenario {name:?} ({}/{n_runs}, {} steps)",
                        i_run + 1,
                        state.n_steps
                    ),
                    Err(error) => log::warn!("scenario {name:?} failed: {error}"),
                }
                ScenarioOutcome {
                    name,
                    config,
                    result,
                }
            })
            .collect();

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::reference_config;
    use crate::config::LagPolicy;
    use crate::model::Population;
    use crate::modulation::Seasonal;

    #[test]
    fn override_changes_only_named_fields() {
        let base = reference_config();
        let cfg = Scenario::new("more-sick")
            .with_override("init.sick_villagers", 250)
            .and_then(|s| s.with_override("policy.lag", LagPolicy::Corrected))
            .and_then(|s| s.apply(&base))
            .expect("failed to apply scenario");

        assert_eq!(cfg.init.sick_villagers, 250.0);
        assert_eq!(cfg.policy.lag, LagPolicy::Corrected);
        assert_eq!(cfg.init.healthy_villagers, base.init.healthy_villagers);
        assert_eq!(cfg.rates, base.rates);
    }

    #[test]
    fn override_can_enable_seasonal_modulation() {
        let seasonal = Seasonal {
            factor: 4.0,
            first_step: 1,
            last_step: 2,
        };

        let cfg = Scenario::new("seasonal")
            .with_override("seasonal", seasonal)
            .and_then(|s| s.apply(&reference_config()))
            .expect("failed to apply scenario");

        assert_eq!(cfg.seasonal, Some(seasonal));
    }

    #[test]
    fn unknown_override_is_rejected() {
        let result = Scenario::new("typo")
            .with_override("init.sick_villager", 1.0)
            .and_then(|s| s.apply(&reference_config()));

        let error = result.expect_err("unknown field must be rejected");
        assert!(format!("{error:#}").contains("init.sick_villager"));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let result = Scenario::new("negative")
            .with_override("init.sick_villagers", -5.0)
            .and_then(|s| s.apply(&reference_config()));

        let error = result.expect_err("negative count must be rejected");
        let model_error = error
            .downcast_ref::<ModelError>()
            .expect("validation error is preserved");
        assert!(matches!(
            model_error,
            ModelError::InvalidConfig {
                field: "init.sick_villagers",
                ..
            }
        ));
    }

    #[test]
    fn driver_without_scenarios_runs_base() {
        let outcomes = ScenarioDriver::new(reference_config())
            .run_all()
            .expect("failed to run");

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].name, "base");
        assert!(outcomes[0].result.is_ok());
    }

    #[test]
    fn sweep_keeps_population_constant() {
        let counts = [25.0, 50.0, 75.0, 100.0];
        let driver = ScenarioDriver::sweep_sick_villagers(reference_config(), &counts, 1000.0)
            .expect("failed to build sweep");

        let configs = driver.build_configs().expect("failed to build configs");
        assert_eq!(configs.len(), 4);
        for ((name, cfg), count) in configs.iter().zip(counts) {
            assert_eq!(name, &format!("sick-{count}"));
            assert_eq!(cfg.init.sick_villagers, count);
            assert_eq!(cfg.init.healthy_villagers + cfg.init.sick_villagers, 1000.0);
        }
    }

    #[test]
    fn sweep_moves_healthy_and_sick_independently() {
        let sweep = Sweep {
            sick_villagers: vec![25.0, 50.0, 75.0, 100.0],
            healthy_villagers: Some(vec![750.0, 500.0, 250.0, 0.0]),
            population: None,
        };
        let driver =
            ScenarioDriver::from_sweep(reference_config(), &sweep).expect("failed to build sweep");

        let configs = driver.build_configs().expect("failed to build configs");
        let splits: Vec<_> = configs
            .iter()
            .map(|(_, cfg)| (cfg.init.healthy_villagers, cfg.init.sick_villagers))
            .collect();
        assert_eq!(
            splits,
            vec![(750.0, 25.0), (500.0, 50.0), (250.0, 75.0), (0.0, 100.0)]
        );
        assert_eq!(configs[0].0, "healthy-750-sick-25");
        assert_eq!(configs[0].1.init.immune_villagers, 0.0);
    }

    #[test]
    fn sweep_from_population_matches_sick_sweep() {
        let sweep = Sweep {
            sick_villagers: vec![25.0, 50.0],
            healthy_villagers: None,
            population: Some(1000.0),
        };
        let from_table = ScenarioDriver::from_sweep(reference_config(), &sweep)
            .and_then(|driver| driver.build_configs())
            .expect("failed to build sweep");
        let direct = ScenarioDriver::sweep_sick_villagers(reference_config(), &[25.0, 50.0], 1000.0)
            .and_then(|driver| driver.build_configs())
            .expect("failed to build sweep");
        assert_eq!(from_table, direct);
    }

    #[test]
    fn invalid_sweep_is_rejected() {
        let sweep = Sweep {
            sick_villagers: vec![25.0, 50.0],
            healthy_villagers: Some(vec![750.0]),
            population: None,
        };
        assert!(ScenarioDriver::from_sweep(reference_config(), &sweep).is_err());
    }

    #[test]
    fn runs_are_independent() {
        let degenerate = Scenario::new("no-mosquitoes")
            .with_override("init.healthy_mosquitoes", 0.0)
            .and_then(|s| s.with_override("init.infected_mosquitoes", 0.0))
            .expect("failed to build scenario");

        let driver = ScenarioDriver::new(reference_config())
            .with_scenario(Scenario::new("first"))
            .with_scenario(degenerate)
            .with_scenario(Scenario::new("last"));

        let outcomes = driver.run_all().expect("failed to run");

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[1].result,
            Err(ModelError::ModelDegeneracy {
                step: 0,
                population: Population::Mosquitoes
            })
        );
        let first = outcomes[0].result.as_ref().expect("first run succeeds");
        let last = outcomes[2].result.as_ref().expect("last run succeeds");
        assert_eq!(first, last);
    }
}
