//! Simulation state types.

use crate::config::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host or vector population, used to report which total degenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
    Villagers,
    Mosquitoes,
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Population::Villagers => f.write_str("villager"),
            Population::Mosquitoes => f.write_str("mosquito"),
        }
    }
}

/// Trajectories of every compartment over one simulation run.
///
/// All sequences have length `n_steps + 1` and are index-aligned with `time`.
/// The state is only ever written by the integrator, strictly forward from
/// index `i` to `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Number of integration steps.
    pub n_steps: usize,

    /// Time in days.
    pub time: Vec<f64>,

    pub total_villagers: Vec<f64>,
    pub healthy_villagers: Vec<f64>,
    pub sick_villagers: Vec<f64>,
    pub immune_villagers: Vec<f64>,

    pub total_mosquitoes: Vec<f64>,
    pub healthy_mosquitoes: Vec<f64>,
    pub infected_mosquitoes: Vec<f64>,

    /// Cumulative villager deaths, present only when death tracking is enabled.
    pub cumulative_deaths: Option<Vec<f64>>,
}

impl SimulationState {
    /// Allocate all sequences and seed index 0 from the initial compartments.
    pub fn seed(cfg: &SimulationConfig) -> Self {
        let n_steps = cfg.n_steps();
        let len = n_steps + 1;

        let init = &cfg.init;
        let seeded = |val: f64| {
            let mut seq = vec![0.0; len];
            seq[0] = val;
            seq
        };

        Self {
            n_steps,
            time: seeded(cfg.time.start_time),
            total_villagers: seeded(
                init.healthy_villagers + init.sick_villagers + init.immune_villagers,
            ),
            healthy_villagers: seeded(init.healthy_villagers),
            sick_villagers: seeded(init.sick_villagers),
            immune_villagers: seeded(init.immune_villagers),
            total_mosquitoes: seeded(init.healthy_mosquitoes + init.infected_mosquitoes),
            healthy_mosquitoes: seeded(init.healthy_mosquitoes),
            infected_mosquitoes: seeded(init.infected_mosquitoes),
            cumulative_deaths: cfg.policy.track_deaths.then(|| seeded(0.0)),
        }
    }

    /// Number of recorded points, `n_steps + 1`.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Named compartment series, in reporting order.
    pub fn series(&self) -> Vec<(&'static str, &[f64])> {
        vec![
            ("total_villagers", self.total_villagers.as_slice()),
            ("healthy_villagers", self.healthy_villagers.as_slice()),
            ("sick_villagers", self.sick_villagers.as_slice()),
            ("immune_villagers", self.immune_villagers.as_slice()),
            ("total_mosquitoes", self.total_mosquitoes.as_slice()),
            ("healthy_mosquitoes", self.healthy_mosquitoes.as_slice()),
            ("infected_mosquitoes", self.infected_mosquitoes.as_slice()),
        ]
    }
}
