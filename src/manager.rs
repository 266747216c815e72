use crate::analysis::Analyzer;
use crate::config::{ConfigFile, SimulationConfig};
use crate::model::SimulationState;
use crate::scenario::ScenarioDriver;
use anyhow::{Context, Result, bail};
use glob::glob;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Trajectory of one scenario as handed to plotting tools.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub name: String,
    pub config: SimulationConfig,
    pub state: SimulationState,
}

impl ScenarioRecord {
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write_named(&mut writer, self).context("failed to serialize record")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let reader = BufReader::new(file);
        let record = decode::from_read(reader).context("failed to deserialize record")?;
        Ok(record)
    }
}

/// Owns a simulation directory: `config.toml` plus one `scenario-NNNN`
/// directory per run.
pub struct Manager {
    sim_dir: PathBuf,
    cfg: ConfigFile,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            ConfigFile::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn run_scenarios(&self) -> Result<()> {
        let driver = match &self.cfg.sweep {
            Some(sweep) => ScenarioDriver::from_sweep(self.cfg.base(), sweep)
                .context("failed to build sweep")?,
            None => ScenarioDriver::new(self.cfg.base()),
        };
        let driver = driver.with_scenarios(self.cfg.scenarios.clone());
        let outcomes = driver.run_all().context("failed to run scenarios")?;

        self.clean_scenarios()
            .context("failed to remove previous scenarios")?;

        let n_runs = outcomes.len();
        let mut failed = Vec::new();
        for (run_idx, outcome) in outcomes.into_iter().enumerate() {
            let state = match outcome.result {
                Ok(state) => state,
                Err(error) => {
                    log::error!("scenario {:?} failed: {error}", outcome.name);
                    failed.push(outcome.name);
                    continue;
                }
            };

            let scenario_dir = self.scenario_dir(run_idx);
            fs::create_dir_all(&scenario_dir)
                .with_context(|| format!("failed to create {scenario_dir:?}"))?;

            let record = ScenarioRecord {
                name: outcome.name,
                config: outcome.config,
                state,
            };
            let trajectory_file = self.trajectory_file(run_idx);
            record
                .save(&trajectory_file)
                .with_context(|| format!("failed to save {trajectory_file:?}"))?;
            log::info!("saved {trajectory_file:?}");
        }

        if !failed.is_empty() {
            bail!("{} of {n_runs} scenarios failed: {failed:?}", failed.len());
        }

        Ok(())
    }

    pub fn analyze_scenarios(&self) -> Result<()> {
        let scenario_dirs = self.scenario_dirs().context("failed to list scenario dirs")?;
        if scenario_dirs.is_empty() {
            bail!("no scenarios found in {:?}", self.sim_dir);
        }

        for scenario_dir in scenario_dirs {
            let trajectory_file = scenario_dir.join(TRAJECTORY_FILE);
            let record = ScenarioRecord::load(&trajectory_file)
                .with_context(|| format!("failed to load {trajectory_file:?}"))?;

            let report = Analyzer::new(&record.state).analyze(&record.name);

            if let Some(sick) = report.compartment("sick_villagers") {
                log::info!(
                    "scenario {:?}: sick villagers peak at {:.2} on day {}",
                    record.name,
                    sick.peak_value,
                    sick.peak_time
                );
            }

            let results_file = scenario_dir.join(RESULTS_FILE);
            report
                .save(&results_file)
                .with_context(|| format!("failed to save {results_file:?}"))?;
            log::info!("saved {results_file:?}");
        }

        Ok(())
    }

    pub fn clean_scenarios(&self) -> Result<()> {
        for scenario_dir in self.scenario_dirs().context("failed to list scenario dirs")? {
            fs::remove_dir_all(&scenario_dir)
                .with_context(|| format!("failed to remove {scenario_dir:?}"))?;
            log::info!("removed {scenario_dir:?}");
        }
        Ok(())
    }

    fn scenario_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("scenario-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let dirs = glob(pattern)
            .context("failed to glob scenario dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        Ok(dirs)
    }

    fn scenario_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("scenario-{run_idx:04}"))
    }

    fn trajectory_file(&self, run_idx: usize) -> PathBuf {
        self.scenario_dir(run_idx).join(TRAJECTORY_FILE)
    }
}

const TRAJECTORY_FILE: &str = "trajectory.msgpack";
const RESULTS_FILE: &str = "results.msgpack";
