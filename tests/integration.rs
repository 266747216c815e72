use std::{env, fs, path::PathBuf, process::Command};

const CONFIG: &str = r#"
[time]
time_step = 1.0
start_time = 0.0
end_time = 365.0

[init]
healthy_mosquitoes = 1000.0
infected_mosquitoes = 1000.0
healthy_villagers = 750.0
sick_villagers = 25.0
immune_villagers = 0.0

[rates]
villager_birth_rate = 0.019
villager_death_rate = 0.008
malaria_death_rate = 0.0019986
recovery_rate = 0.3
immunity_rate = 0.01
mosquito_birth_rate = 0.01
mosquito_death_rate = 0.01
bite_rate = 0.3

[policy]
track_deaths = true

[[scenarios]]
name = "baseline"

[[scenarios]]
name = "seasonal"
overrides = { seasonal = { factor = 4.0, first_step = 80, last_step = 200 } }

[[scenarios]]
name = "total-population-births"
overrides = { policy = { birth_source = "total_population" } }
"#;

fn run_bin(args: &[&str]) -> bool {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_malsim"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");
    println!("{args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n");

    output.status.success()
}

fn setup(name: &str, config: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    fs::write(test_dir.join("config.toml"), config).expect("failed to write config file");

    test_dir
}

#[test]
fn basic_workflow() {
    let test_dir = setup("basic_workflow", CONFIG);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(run_bin(&["--sim-dir", test_dir_str, "run"]));
    for idx in 0..3 {
        let trajectory = test_dir.join(format!("scenario-{idx:04}/trajectory.msgpack"));
        assert!(trajectory.is_file(), "missing {trajectory:?}");
    }

    assert!(run_bin(&["--sim-dir", test_dir_str, "analyze"]));
    for idx in 0..3 {
        let results = test_dir.join(format!("scenario-{idx:04}/results.msgpack"));
        assert!(results.is_file(), "missing {results:?}");
    }

    assert!(run_bin(&["--sim-dir", test_dir_str, "clean"]));
    assert!(!test_dir.join("scenario-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn sweep_workflow() {
    let config = CONFIG.replace(
        "[policy]",
        "[sweep]\nsick_villagers = [25, 50, 75, 100]\npopulation = 1000\n\n[policy]",
    );
    let test_dir = setup("sweep_workflow", &config);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(run_bin(&["--sim-dir", test_dir_str, "run"]));
    assert!(test_dir.join("scenario-0006/trajectory.msgpack").is_file());
    assert!(!test_dir.join("scenario-0007").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn degenerate_scenario_fails_run() {
    let config = format!(
        "{CONFIG}\n[[scenarios]]\nname = \"no-mosquitoes\"\n\
         overrides = {{ init = {{ healthy_mosquitoes = 0, infected_mosquitoes = 0 }} }}\n"
    );
    let test_dir = setup("degenerate_scenario_fails_run", &config);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(!run_bin(&["--sim-dir", test_dir_str, "run"]));
    // The healthy scenarios are still written.
    assert!(test_dir.join("scenario-0002/trajectory.msgpack").is_file());
    assert!(!test_dir.join("scenario-0003").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_is_rejected() {
    let config = CONFIG.replace("time_step = 1.0", "time_step = 0.0");
    let test_dir = setup("invalid_config_is_rejected", &config);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(!run_bin(&["--sim-dir", test_dir_str, "run"]));
    assert!(!test_dir.join("scenario-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn independent_sweep_workflow() {
    let config = CONFIG.replace(
        "[policy]",
        "[sweep]\nsick_villagers = [25, 50, 75, 100]\n\
         healthy_villagers = [750, 500, 250, 0]\n\n[policy]",
    );
    let test_dir = setup("independent_sweep_workflow", &config);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(run_bin(&["--sim-dir", test_dir_str, "run"]));
    assert!(test_dir.join("scenario-0006/trajectory.msgpack").is_file());
    assert!(!test_dir.join("scenario-0007").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn bad_override_keeps_previous_outputs() {
    let test_dir = setup("bad_override_keeps_previous_outputs", CONFIG);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(run_bin(&["--sim-dir", test_dir_str, "run"]));
    let trajectory = test_dir.join("scenario-0000/trajectory.msgpack");
    assert!(trajectory.is_file());

    let config = format!(
        "{CONFIG}\n[[scenarios]]\nname = \"typo\"\n\
         overrides = {{ init = {{ sick_villager = 50 }} }}\n"
    );
    fs::write(test_dir.join("config.toml"), config).expect("failed to write config file");

    assert!(!run_bin(&["--sim-dir", test_dir_str, "run"]));
    assert!(trajectory.is_file(), "previous outputs were removed");

    fs::remove_dir_all(&test_dir).ok();
}
