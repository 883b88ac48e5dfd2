use std::process::Command;

#[derive(Debug)]
struct Kpis {
    peak_reduction: f64,
    total_charge: f64,
    total_discharge: f64,
    steps: f64,
}

#[test]
fn scenario_files_run_via_cli_and_produce_distinct_dynamics() {
    let peak_shave = run_and_parse_kpis(&["--scenario", "scenarios/peak_shave.toml"]);
    let thermal = run_and_parse_kpis(&["--scenario", "scenarios/thermal_pcm.toml"]);
    let wholesale = run_and_parse_kpis(&["--scenario", "scenarios/wholesale.toml"]);
    let sub_load = run_and_parse_kpis(&["--scenario", "scenarios/sub_load.toml"]);

    assert_eq!(peak_shave.steps, 168.0);
    assert_eq!(thermal.steps, 144.0);
    assert_eq!(wholesale.steps, 120.0);
    assert_eq!(sub_load.steps, 96.0);

    assert!(
        peak_shave.peak_reduction > 1.0,
        "expected peak shaving to lower the peak: {peak_shave:?}"
    );
    assert!(
        thermal.total_discharge > 0.0,
        "expected the thermal store to discharge: {thermal:?}"
    );
    assert!(
        wholesale.total_discharge > 0.0,
        "expected wholesale arbitrage to discharge: {wholesale:?}"
    );
    assert!(
        (peak_shave.total_discharge - sub_load.total_discharge).abs() > 1.0,
        "expected peak_shave and sub_load to differ: peak_shave={:.3}, sub_load={:.3}",
        peak_shave.total_discharge,
        sub_load.total_discharge
    );
}

#[test]
fn presets_run_via_cli() {
    for preset in ["baseline", "tou_shift", "conservative"] {
        let kpis = run_and_parse_kpis(&["--preset", preset, "--days", "2", "--summary-only"]);
        assert_eq!(kpis.steps, 48.0, "{preset}");
    }
}

#[test]
fn unknown_preset_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_flex-dispatch"))
        .args(["--preset", "does_not_exist"])
        .output()
        .expect("flex-dispatch process should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown preset"), "stderr={stderr}");
}

#[test]
fn load_flexing_scenarios_run_via_cli() {
    let settings = run_and_parse_kpis(&["--scenario", "scenarios/settings_market.toml", "--summary-only"]);
    let heat_pump = run_and_parse_kpis(&["--scenario", "scenarios/heat_pump.toml", "--summary-only"]);

    assert_eq!(settings.steps, 192.0);
    assert_eq!(heat_pump.steps, 288.0);
    assert!(settings.total_discharge > 0.0, "expected shedding: {settings:?}");
    assert!(settings.total_charge > 0.0, "expected repayment: {settings:?}");
    assert!(heat_pump.total_charge > 0.0, "expected the heat pump to run: {heat_pump:?}");
    assert_eq!(heat_pump.total_discharge, 0.0);
}

#[test]
fn cli_writes_requested_csv_files() {
    let dir = std::env::temp_dir().join(format!("flex-dispatch-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let records = dir.join("records.csv");
    let flexed = dir.join("flexed.csv");

    run_and_parse_kpis(&[
        "--preset",
        "baseline",
        "--days",
        "1",
        "--summary-only",
        "--record-out",
        records.to_str().unwrap_or_default(),
        "--flexed-out",
        flexed.to_str().unwrap_or_default(),
    ]);

    let records = std::fs::read_to_string(&records).expect("record csv written");
    let flexed = std::fs::read_to_string(&flexed).expect("flexed csv written");
    assert_eq!(records.lines().count(), 25);
    assert_eq!(flexed.lines().count(), 25);
    assert!(records.starts_with("timestamp,demand,flexed_demand,"));
    assert!(flexed.starts_with("timestamp,demand_energy,"));
    std::fs::remove_dir_all(&dir).ok();
}

fn run_and_parse_kpis(args: &[&str]) -> Kpis {
    let output = Command::new(env!("CARGO_BIN_EXE_flex-dispatch"))
        .args(args)
        .output()
        .expect("flex-dispatch process should run");

    assert!(
        output.status.success(),
        "run failed for {args:?}: stderr={} ",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    parse_kpis(&stdout)
}

fn parse_kpis(stdout: &str) -> Kpis {
    Kpis {
        peak_reduction: parse_metric(stdout, "Peak reduction:"),
        total_charge: parse_metric(stdout, "Total charge:"),
        total_discharge: parse_metric(stdout, "Total discharge:"),
        steps: parse_metric(stdout, "Steps:"),
    }
}

fn parse_metric(stdout: &str, label: &str) -> f64 {
    let line = stdout
        .lines()
        .find(|line| line.trim_start().starts_with(label))
        .unwrap_or_else(|| panic!("missing KPI line `{label}` in output: {stdout}"));

    let raw = line
        .split_once(':')
        .map(|(_, right)| right.trim())
        .unwrap_or_else(|| panic!("invalid KPI format for line `{line}`"));

    // "Total discharge" carries a trailing "(n equiv. cycles)"
    let numeric = raw.split_whitespace().next().unwrap_or(raw);
    numeric
        .parse::<f64>()
        .unwrap_or_else(|_| panic!("failed parsing `{numeric}` from KPI line `{line}`"))
}
