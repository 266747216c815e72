use crate::model::SimulationState;
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

pub trait Obs {
    fn add(&mut self, time: f64, val: f64);
    fn report(&self) -> ObsReport;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObsReport {
    Compartment(CompartmentReport),
    Deaths(DeathsReport),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompartmentReport {
    pub name: String,
    pub summary: AccumulatorReport,
    pub peak_value: f64,
    pub peak_time: f64,
    /// Days from the start of the run to the peak.
    pub time_to_peak: f64,
    pub final_value: f64,
}

/// Size of one compartment over a run.
pub struct CompartmentObs {
    name: &'static str,
    acc: Accumulator,
    start_time: f64,
    final_value: f64,
}

impl CompartmentObs {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            acc: Accumulator::new(),
            start_time: f64::NAN,
            final_value: f64::NAN,
        }
    }
}

impl Obs for CompartmentObs {
    fn add(&mut self, time: f64, val: f64) {
        if self.start_time.is_nan() {
            self.start_time = time;
        }
        self.acc.add(time, val);
        self.final_value = val;
    }

    fn report(&self) -> ObsReport {
        let summary = self.acc.report();
        ObsReport::Compartment(CompartmentReport {
            name: self.name.to_string(),
            peak_value: summary.max_value,
            peak_time: summary.max_time,
            time_to_peak: summary.max_time - self.start_time,
            final_value: self.final_value,
            summary,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathsReport {
    pub total: f64,
    pub mean_daily: f64,
    pub max_daily: f64,
    pub max_daily_time: f64,
}

/// Villager deaths from a cumulative death series.
pub struct DeathsObs {
    start: Option<(f64, f64)>,
    last: (f64, f64),
    max_daily: (f64, f64),
}

impl DeathsObs {
    pub fn new() -> Self {
        Self {
            start: None,
            last: (f64::NAN, 0.0),
            max_daily: (f64::NAN, f64::NAN),
        }
    }
}

impl Obs for DeathsObs {
    fn add(&mut self, time: f64, val: f64) {
        if self.start.is_none() {
            self.start = Some((time, val));
        } else {
            let (last_time, last_val) = self.last;
            let daily = (val - last_val) / (time - last_time);
            if self.max_daily.1.is_nan() || daily > self.max_daily.1 {
                self.max_daily = (time, daily);
            }
        }
        self.last = (time, val);
    }

    fn report(&self) -> ObsReport {
        let (start_time, start_val) = self.start.unwrap_or((f64::NAN, f64::NAN));
        let (last_time, last_val) = self.last;
        ObsReport::Deaths(DeathsReport {
            total: last_val - start_val,
            mean_daily: (last_val - start_val) / (last_time - start_time),
            max_daily: self.max_daily.1,
            max_daily_time: self.max_daily.0,
        })
    }
}

/// Observables of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub scenario: String,
    pub n_steps: usize,
    /// Share of the final villagers that are sick.
    pub final_sick_share: f64,
    /// Share of the final villagers that are immune.
    pub final_immune_share: f64,
    pub observables: Vec<ObsReport>,
}

impl AnalysisReport {
    pub fn compartment(&self, name: &str) -> Option<&CompartmentReport> {
        self.observables.iter().find_map(|obs| match obs {
            ObsReport::Compartment(report) if report.name == name => Some(report),
            _ => None,
        })
    }

    pub fn deaths(&self) -> Option<&DeathsReport> {
        self.observables.iter().find_map(|obs| match obs {
            ObsReport::Deaths(report) => Some(report),
            _ => None,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write_named(&mut writer, self).context("failed to serialize report")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

/// Feeds every point of a trajectory to its observables.
pub struct Analyzer<'a> {
    state: &'a SimulationState,
    obs_vec: Vec<(Box<dyn Obs>, &'a [f64])>,
}

impl<'a> Analyzer<'a> {
    pub fn new(state: &'a SimulationState) -> Self {
        let mut obs_vec: Vec<(Box<dyn Obs>, &'a [f64])> = Vec::new();
        for (name, series) in state.series() {
            obs_vec.push((Box::new(CompartmentObs::new(name)), series));
        }
        if let Some(deaths) = &state.cumulative_deaths {
            obs_vec.push((Box::new(DeathsObs::new()), deaths));
        }
        Self { state, obs_vec }
    }

    pub fn analyze(mut self, scenario: &str) -> AnalysisReport {
        for (i, &time) in self.state.time.iter().enumerate() {
            for (obs, series) in &mut self.obs_vec {
                obs.add(time, series[i]);
            }
        }

        // Shares use the compartments, not the possibly lagged total.
        let state = self.state;
        let last = state.n_steps;
        let villagers =
            state.healthy_villagers[last] + state.sick_villagers[last] + state.immune_villagers[last];

        AnalysisReport {
            scenario: scenario.to_string(),
            n_steps: state.n_steps,
            final_sick_share: state.sick_villagers[last] / villagers,
            final_immune_share: state.immune_villagers[last] / villagers,
            observables: self.obs_vec.iter().map(|(obs, _)| obs.report()).collect(),
        }
    }
}
